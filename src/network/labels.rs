use std::collections::BTreeMap;
use std::path::Path;

use tracing::info;

use crate::error::{CamError, Result};

/// Class vocabulary of the classifier head.
#[derive(Debug, Clone, PartialEq)]
pub struct Labels {
    names: Vec<String>,
}

impl Labels {
    pub fn from_names<I, S>(names: I) -> Labels
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Labels { names: names.into_iter().map(Into::into).collect() }
    }

    /// Parses the Keras `imagenet_class_index.json` layout:
    /// `{"0": ["n01440764", "tench"], "1": [...], ...}`.
    pub fn from_class_index_json(json: &str) -> Result<Labels> {
        let raw: BTreeMap<String, (String, String)> = serde_json::from_str(json).map_err(CamError::Labels)?;
        let mut indexed = Vec::with_capacity(raw.len());
        for (key, (_wnid, name)) in raw {
            let index: usize = key
                .parse()
                .map_err(|_| CamError::Config(format!("label key \"{}\" is not a class index", key)))?;
            indexed.push((index, name));
        }
        indexed.sort_by_key(|(i, _)| *i);
        for (expected, (actual, _)) in indexed.iter().enumerate() {
            if *actual != expected {
                return Err(CamError::Config(format!("label vocabulary is missing class {}", expected)));
            }
        }
        Ok(Labels { names: indexed.into_iter().map(|(_, n)| n).collect() })
    }

    pub fn load(path: &Path) -> Result<Labels> {
        let json = std::fs::read_to_string(path)
            .map_err(|source| CamError::Io { path: path.to_owned(), source })?;
        let labels = Labels::from_class_index_json(&json)?;
        info!(path = %path.display(), classes = labels.len(), "loaded label vocabulary");
        Ok(labels)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Raw vocabulary entry, e.g. `tiger_cat`.
    pub fn raw(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    /// Display form of a class, e.g. `Tiger Cat`. Unknown indices render as
    /// `Class <n>`.
    pub fn display(&self, index: usize) -> String {
        match self.raw(index) {
            Some(name) => display_label(name),
            None => format!("Class {}", index),
        }
    }

    pub fn ensure_matches(&self, num_classes: usize) -> Result<()> {
        if self.len() != num_classes {
            return Err(CamError::LabelCount { expected: num_classes, actual: self.len() });
        }
        Ok(())
    }
}

/// Replaces underscores with spaces and title-cases the result: a letter is
/// upper-cased when the character before it is not a letter, lower-cased
/// otherwise.
pub fn display_label(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut prev_is_letter = false;
    for ch in raw.chars().map(|c| if c == '_' { ' ' } else { c }) {
        if ch.is_alphabetic() {
            if prev_is_letter {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
            prev_is_letter = true;
        } else {
            out.push(ch);
            prev_is_letter = false;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("tabby", "Tabby")]
    #[case("tiger_cat", "Tiger Cat")]
    #[case("German_short-haired_pointer", "German Short-Haired Pointer")]
    #[case("jack-o'-lantern", "Jack-O'-Lantern")]
    #[case("CD_player", "Cd Player")]
    #[case("4x4_truck", "4X4 Truck")]
    fn formats_like_title_case(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(display_label(raw), expected);
    }

    #[rstest]
    fn parses_the_class_index_layout() {
        let json = r#"{"1": ["n01443537", "goldfish"], "0": ["n01440764", "tench"]}"#;
        let labels = Labels::from_class_index_json(json).expect("labels");
        assert_eq!(labels.raw(0), Some("tench"));
        assert_eq!(labels.display(1), "Goldfish");
    }

    #[rstest]
    fn rejects_gaps_in_the_vocabulary() {
        let json = r#"{"0": ["a", "x"], "2": ["b", "y"]}"#;
        assert!(Labels::from_class_index_json(json).is_err());
    }

    #[rstest]
    fn size_must_match_the_network() {
        let labels = Labels::from_names(["a", "b"]);
        assert!(matches!(labels.ensure_matches(3), Err(CamError::LabelCount { expected: 3, actual: 2 })));
    }
}
