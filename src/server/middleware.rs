use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};

use crate::error::AppError;

use super::AppState;

const API_KEY_HEADER: &str = "X-API-Key";

/// Guards the publish trigger with the shared key in `api.key`.
///
/// With no key configured every request passes, which is how local
/// development runs.
pub async fn api_key_auth(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let Some(expected) = state.settings.api.key.as_deref() else {
        return Ok(next.run(req).await);
    };

    let provided = req
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());

    match provided {
        Some(key) if keys_match(key, expected) => Ok(next.run(req).await),
        Some(_) => {
            tracing::warn!(path = %req.uri().path(), "Rejected publish with invalid API key");
            Err(AppError::Auth("Invalid API key".to_string()))
        }
        None => {
            tracing::warn!(path = %req.uri().path(), "Rejected publish without API key");
            Err(AppError::Auth(format!("Missing {} header", API_KEY_HEADER)))
        }
    }
}

/// Compare without short-circuiting on the first differing byte. Only the
/// length leaks.
fn keys_match(provided: &str, expected: &str) -> bool {
    let (a, b) = (provided.as_bytes(), expected.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |diff, (x, y)| diff | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_match() {
        assert!(keys_match("s3cret-key", "s3cret-key"));
        assert!(!keys_match("s3cret-kez", "s3cret-key"));
        assert!(!keys_match("s3cret", "s3cret-key"));
        assert!(!keys_match("", "s3cret-key"));
    }
}
