use std::io::Cursor;
use std::time::Instant;

use tiny_http::{Header, Method, Request, Response, StatusCode};
use tracing::{debug, warn};

use crate::handlers;
use crate::state::SharedState;

pub type HttpResponse = Response<Cursor<Vec<u8>>>;

// ---------------------------------------------------------------------------
// Response helpers
// ---------------------------------------------------------------------------

fn response(status: u16, content_type: &str, body: Vec<u8>) -> HttpResponse {
    let len = body.len();
    let headers = Header::from_bytes(&b"Content-Type"[..], content_type.as_bytes())
        .into_iter()
        .collect();
    Response::new(StatusCode(status), headers, Cursor::new(body), Some(len), None)
}

pub fn html_response(status: u16, body: String) -> HttpResponse {
    response(status, "text/html; charset=utf-8", body.into_bytes())
}

pub fn json_response(body: String) -> HttpResponse {
    response(200, "application/json", body.into_bytes())
}

pub fn text_response(status: u16, body: &str) -> HttpResponse {
    response(status, "text/plain; charset=utf-8", body.as_bytes().to_vec())
}

pub fn not_found() -> HttpResponse {
    text_response(404, "404 Not Found")
}

// ---------------------------------------------------------------------------
// Request dispatcher
// ---------------------------------------------------------------------------

/// Dispatches one request to its handler and sends the response.
///
/// Handlers receive a `&mut Request` so that the dispatcher retains
/// ownership and can call `request.respond(response)` at the end.
pub fn dispatch(mut request: Request, state: SharedState) {
    let started = Instant::now();
    let method = request.method().clone();
    let url = request.url().to_owned();
    let path = url.split('?').next().unwrap_or("").to_owned();

    let response = match (&method, path.as_str()) {
        (Method::Get,  "/")            => handlers::gradcam::handle_get(&state),
        (Method::Post, "/predict")     => handlers::gradcam::handle_predict(&mut request, &state),
        (Method::Post, "/gradcam")     => handlers::gradcam::handle_gradcam(&mut request, &state),
        (Method::Get,  "/api/layers")  => handlers::api::handle_layers(),
        (Method::Get,  "/api/health")  => handlers::api::handle_health(),
        _ => not_found(),
    };

    let status = response.status_code().0;
    debug!(%method, %path, status, elapsed = ?started.elapsed(), "request");
    if let Err(e) = request.respond(response) {
        warn!(%path, error = %e, "failed to send response");
    }
}
