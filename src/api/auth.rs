use std::net::SocketAddr;

use subtle::ConstantTimeEq;

use super::error::ApiError;

/// Check the `?token=` query value against the configured secret.
///
/// Runners and browsers cannot set headers on a WebSocket upgrade, so the
/// token rides in the query string on both endpoints. Comparison is
/// constant-time; rejections are logged with the peer address when the
/// transport provided one.
pub fn check_token(
    expected: &str,
    provided: Option<&str>,
    peer: Option<SocketAddr>,
    endpoint: &'static str,
) -> Result<(), ApiError> {
    match provided {
        Some(token) if bool::from(token.as_bytes().ct_eq(expected.as_bytes())) => Ok(()),
        Some(_) => {
            tracing::warn!(peer = ?peer, endpoint, "rejected connection: invalid token");
            Err(ApiError::AuthInvalid)
        }
        None => {
            tracing::warn!(peer = ?peer, endpoint, "rejected connection: missing token");
            Err(ApiError::AuthRequired)
        }
    }
}
