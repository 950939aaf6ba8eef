use ferrite_cam::LAYER_CATALOG;

use crate::routes::{json_response, text_response, HttpResponse};

/// `GET /api/layers`: the layer catalog as `[{index, name, display_name}]`.
pub fn handle_layers() -> HttpResponse {
    match serde_json::to_string(&LAYER_CATALOG[..]) {
        Ok(body) => json_response(body),
        Err(e) => text_response(500, &e.to_string()),
    }
}

/// `GET /api/health`
pub fn handle_health() -> HttpResponse {
    text_response(200, "ok")
}
