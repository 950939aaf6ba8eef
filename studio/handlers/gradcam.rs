use tiny_http::Request;
use tracing::{info, warn};

use ferrite_cam::gradcam::decode_image;
use ferrite_cam::{CamError, ClassSelection, Explanation, LayerIndex, Prediction, LAYER_CATALOG};

use crate::render::{html_escape, render_page};
use crate::routes::{html_response, HttpResponse};
use crate::state::StudioState;
use crate::util::form::{form_get, parse_form};
use crate::util::image::{decode_base64_field, png_base64};
use crate::util::multipart::{extract_boundary, multipart_extract_file_by_name};

/// Request-specific page fragments.
#[derive(Default)]
struct Sections {
    error: String,
    image: String,
    predictions: String,
    controls: String,
    result: String,
}

/// A failed request: HTTP status plus a message for the error box.
struct Failure {
    status: u16,
    message: String,
}

impl Failure {
    fn bad_request(message: impl Into<String>) -> Failure {
        Failure { status: 400, message: message.into() }
    }
}

impl From<CamError> for Failure {
    fn from(e: CamError) -> Failure {
        let status = match e {
            CamError::Decode(_)
            | CamError::LayerOutOfRange { .. }
            | CamError::RankOutOfRange { .. }
            | CamError::RankUnavailable { .. } => 400,
            _ => 500,
        };
        Failure { status, message: e.to_string() }
    }
}

// ---------------------------------------------------------------------------
// GET /
// ---------------------------------------------------------------------------

pub fn handle_get(state: &StudioState) -> HttpResponse {
    html_response(200, build_page(state, Sections::default()))
}

// ---------------------------------------------------------------------------
// POST /predict
// ---------------------------------------------------------------------------

pub fn handle_predict(request: &mut Request, state: &StudioState) -> HttpResponse {
    respond(state, predict(request, state))
}

fn predict(request: &mut Request, state: &StudioState) -> Result<Sections, Failure> {
    let content_type = header(request, "Content-Type");
    let boundary = extract_boundary(&content_type)
        .ok_or_else(|| Failure::bad_request("Expected a multipart/form-data upload."))?;
    let body = read_body(request)?;
    let bytes = match multipart_extract_file_by_name(&body, &boundary, "image") {
        Some(b) if !b.is_empty() => b,
        _ => return Err(Failure::bad_request("No image file was uploaded.")),
    };

    let image = decode_image(&bytes)?;
    let prepared = state.engine.prepare(&image);
    let predictions = state.engine.predict_prepared(&prepared);
    let field = png_base64(&prepared.rgb)?;
    if let Some(top) = predictions.first() {
        info!(label = %top.label, confidence = top.confidence, "prediction");
    }

    Ok(Sections {
        image: image_card("Input", &field),
        predictions: prediction_table(&predictions, None),
        controls: controls(&field, LayerIndex::DEFAULT),
        ..Sections::default()
    })
}

// ---------------------------------------------------------------------------
// POST /gradcam
// ---------------------------------------------------------------------------

pub fn handle_gradcam(request: &mut Request, state: &StudioState) -> HttpResponse {
    respond(state, gradcam(request, state))
}

fn gradcam(request: &mut Request, state: &StudioState) -> Result<Sections, Failure> {
    let body = read_body(request)?;
    let pairs = parse_form(&String::from_utf8_lossy(&body));

    let field = form_get(&pairs, "image")
        .filter(|v| !v.is_empty())
        .ok_or_else(|| Failure::bad_request("The form did not carry an image. Upload one first."))?;
    let layer = match form_get(&pairs, "layer") {
        Some(raw) => LayerIndex::new(parse_index(raw, "layer")?)?,
        None => LayerIndex::DEFAULT,
    };
    let rank = match form_get(&pairs, "rank").filter(|v| !v.is_empty()) {
        Some(raw) => Some(parse_index(raw, "rank")?),
        None => None,
    };
    let selection = ClassSelection::from_rank(rank)?;

    let bytes = decode_base64_field(field)
        .ok_or_else(|| Failure::bad_request("The image field is not valid base64."))?;
    let image = decode_image(&bytes)?;
    let explanation = state.engine.explain(&image, layer, selection)?;
    info!(
        layer = %layer,
        class_index = explanation.class_index,
        label = %explanation.label,
        "grad-cam"
    );

    let input_field = png_base64(&explanation.input)?;
    let overlay_field = png_base64(&explanation.overlay)?;
    Ok(Sections {
        image: image_card("Input", &input_field),
        predictions: prediction_table(&explanation.predictions, rank),
        controls: controls(&input_field, layer),
        result: result_card(&explanation, &overlay_field),
        ..Sections::default()
    })
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

fn header(request: &Request, name: &'static str) -> String {
    request.headers().iter()
        .find(|h| h.field.equiv(name))
        .map(|h| h.value.as_str().to_owned())
        .unwrap_or_default()
}

fn read_body(request: &mut Request) -> Result<Vec<u8>, Failure> {
    let mut body = Vec::new();
    request
        .as_reader()
        .read_to_end(&mut body)
        .map_err(|e| Failure::bad_request(format!("Could not read the request body: {}", e)))?;
    Ok(body)
}

fn parse_index(raw: &str, what: &str) -> Result<usize, Failure> {
    raw.trim()
        .parse()
        .map_err(|_| Failure::bad_request(format!("{} must be a non-negative integer, got \"{}\"", what, raw)))
}

fn respond(state: &StudioState, outcome: Result<Sections, Failure>) -> HttpResponse {
    match outcome {
        Ok(sections) => html_response(200, build_page(state, sections)),
        Err(failure) => {
            warn!(status = failure.status, error = %failure.message, "request failed");
            let sections = Sections { error: error_html(&failure.message), ..Sections::default() };
            html_response(failure.status, build_page(state, sections))
        }
    }
}

// ---------------------------------------------------------------------------
// Page builder
// ---------------------------------------------------------------------------

fn build_page(state: &StudioState, sections: Sections) -> String {
    render_page(&state.network_summary(), |tmpl| {
        tmpl
            .replace("{{ERROR_SECTION}}", &sections.error)
            .replace("{{IMAGE_SECTION}}", &sections.image)
            .replace("{{PREDICTION_SECTION}}", &sections.predictions)
            .replace("{{CONTROL_SECTION}}", &sections.controls)
            .replace("{{RESULT_SECTION}}", &sections.result)
    })
}

fn image_card(title: &str, png_base64: &str) -> String {
    format!(
        r#"<div class="card"><h2>{title}</h2><img class="shot" alt="{title}" src="data:image/png;base64,{src}"></div>"#,
        title = html_escape(title),
        src = png_base64,
    )
}

fn prediction_table(predictions: &[Prediction], selected: Option<usize>) -> String {
    let top_checked = if selected.is_none() { " checked" } else { "" };
    let mut rows = format!(
        r#"<tr><td><input type="radio" name="rank" value="" form="gradcam-form"{checked}></td><td colspan="3" class="hint">Highest-scoring class</td></tr>"#,
        checked = top_checked,
    );
    for p in predictions {
        let checked = if selected == Some(p.rank) { " checked" } else { "" };
        rows.push_str(&format!(
            r#"<tr><td><input type="radio" name="rank" value="{rank}" form="gradcam-form"{checked}></td><td>{label}</td><td><div class="bar-wrap"><div class="bar-fill" style="width:{width}px"></div></div></td><td class="prob-pct">{conf:.3}</td></tr>"#,
            rank = p.rank,
            checked = checked,
            label = html_escape(&p.label),
            width = (p.confidence * 200.0) as u32,
            conf = p.display_confidence(),
        ));
    }
    format!(
        r#"<div class="card"><h2>Top-5 predictions</h2>
<table class="prob-table">
  <thead><tr><th></th><th>Class</th><th></th><th>Confidence</th></tr></thead>
  <tbody>{rows}</tbody>
</table>
<p class="hint">Pick a row to explain that class instead of the top one.</p></div>"#,
        rows = rows,
    )
}

fn controls(image_field: &str, layer: LayerIndex) -> String {
    let marks: String = LAYER_CATALOG
        .iter()
        .map(|e| format!(r#"<option value="{}" label="{}"></option>"#, e.index, html_escape(e.display_name)))
        .collect();
    let names: Vec<String> = LAYER_CATALOG.iter().map(|e| format!("\"{}\"", e.display_name)).collect();
    format!(
        r#"<div class="card"><h2>Grad-CAM</h2>
<form id="gradcam-form" method="POST" action="/gradcam">
  <input type="hidden" name="image" value="{image}">
  <label for="layer">Layer <span id="layer-name">{current}</span></label>
  <input type="range" id="layer" name="layer" min="0" max="{max}" step="1" value="{value}" list="layer-marks">
  <datalist id="layer-marks">{marks}</datalist>
  <p class="hint">Earlier layers are finer and less semantic; later layers are coarser and more class-specific.</p>
  <button type="submit" class="btn btn-primary">Explain</button>
</form>
<script>
var LAYER_NAMES = [{names}];
document.getElementById('layer').addEventListener('input', function () {{
  document.getElementById('layer-name').textContent = LAYER_NAMES[this.value];
}});
</script></div>"#,
        image = image_field,
        current = html_escape(layer.entry().display_name),
        max = LAYER_CATALOG.len() - 1,
        value = layer.get(),
        marks = marks,
        names = names.join(","),
    )
}

fn result_card(explanation: &Explanation, overlay_base64: &str) -> String {
    format!(
        r#"<div class="card"><h2>Heatmap</h2>
<img class="shot" alt="Grad-CAM overlay" src="data:image/png;base64,{src}">
<p class="prediction-sub">Explaining <strong>{label}</strong> (class {class}) at layer <strong>{layer}</strong> ({name}), {w}&times;{h} map.</p></div>"#,
        src = overlay_base64,
        label = html_escape(&explanation.label),
        class = explanation.class_index,
        layer = html_escape(explanation.layer.display_name),
        name = explanation.layer.name,
        w = explanation.heatmap.width,
        h = explanation.heatmap.height,
    )
}

fn error_html(msg: &str) -> String {
    format!(r#"<div class="card"><h2>Error</h2><div class="error-box">{}</div></div>"#, html_escape(msg))
}
