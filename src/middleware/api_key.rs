use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;
use std::sync::Arc;

use crate::error::AppError;
use crate::state::AppState;

/// Step 1 of the admission pipeline. Every inbound request must carry
/// `X-API-Key` — via the header normally, or via a query parameter for
/// WebSocket upgrades, which cannot reliably set custom headers during the
/// browser handshake. Two public exceptions bypass this gate entirely: the
/// webhook trigger path (authenticated by its own token) and the health/
/// docs surface, neither of which this gateway exposes as OpenAPI docs.
///
/// Missing key -> 406 (distinguishes "you forgot the header" from "you
/// guessed wrong", which is 401). Wrong key -> 401.
pub async fn require_api_key(
    State(state): State<Arc<AppState>>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let path = req.uri().path();
    if path.starts_with("/webhooks/trigger/") || path == "/health" {
        return Ok(next.run(req).await);
    }

    let header_key = req
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    let query_key = req.uri().query().and_then(|q| query_param(q, "X-API-Key"));

    let presented = header_key.or(query_key).ok_or(AppError::MissingApiKey)?;

    if presented != state.config.api_key {
        return Err(AppError::InvalidApiKey);
    }

    Ok(next.run(req).await)
}

fn query_param(query: &str, name: &str) -> Option<String> {
    query.split('&').find_map(|pair| {
        let mut it = pair.splitn(2, '=');
        let k = it.next()?;
        let v = it.next().unwrap_or("");
        if k.eq_ignore_ascii_case(name) {
            Some(urlencoding_decode(v))
        } else {
            None
        }
    })
}

/// Minimal percent-decoding for the handful of query values this gateway
/// reads before the router's own extractors run (API keys, WS tokens).
fn urlencoding_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                if let Ok(byte) = u8::from_str_radix(&s[i + 1..i + 3], 16) {
                    out.push(byte);
                    i += 3;
                    continue;
                }
                out.push(bytes[i]);
                i += 1;
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}
