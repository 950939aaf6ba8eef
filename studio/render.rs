/// Central template renderer for the Grad-CAM studio.
///
/// The studio uses a single HTML template (`studio/assets/studio.html`) with
/// placeholder tokens like `{{TOKEN}}`. The template is embedded at compile
/// time; `render_page` fills the global tokens and hands the rest to a
/// closure. Tokens the closure leaves alone are blanked.

const TEMPLATE: &str = include_str!("assets/studio.html");

/// Renders the full studio page.
///
/// `network` fills the header summary; `fill` replaces request-specific
/// placeholders.
pub fn render_page<F>(network: &str, fill: F) -> String
where
    F: FnOnce(String) -> String,
{
    let mut html = TEMPLATE.to_owned();
    html = html.replace("{{NETWORK}}", &html_escape(network));
    html = fill(html);
    blank_remaining(html)
}

/// Replaces any `{{UPPERCASE_TOKEN}}` that wasn't already substituted with an
/// empty string.
fn blank_remaining(mut html: String) -> String {
    let mut cursor = 0;
    while let Some(start) = html[cursor..].find("{{").map(|p| p + cursor) {
        match html[start..].find("}}") {
            Some(end) if is_token(&html[start + 2..start + end]) => {
                html.replace_range(start..start + end + 2, "");
                cursor = start;
            }
            _ => cursor = start + 2,
        }
    }
    html
}

fn is_token(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
     .replace('<', "&lt;")
     .replace('>', "&gt;")
     .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn unfilled_tokens_are_blanked() {
        assert_eq!(blank_remaining("a{{ONE}}b{{TWO_2}}c".into()), "abc");
    }

    #[rstest]
    fn braces_that_are_not_tokens_survive() {
        let js = "function f() {{ return {{x: 1}}; }}";
        assert_eq!(blank_remaining(js.into()), js);
    }

    #[rstest]
    fn page_has_no_leftover_tokens() {
        let html = render_page("tiny", |t| t);
        assert!(!html.contains("{{NETWORK}}"));
        assert!(html.contains("tiny"));
    }

    #[rstest]
    fn escapes_markup() {
        assert_eq!(html_escape("<a href=\"x\">&</a>"), "&lt;a href=&quot;x&quot;&gt;&amp;&lt;/a&gt;");
    }
}
