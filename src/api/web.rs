use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use rust_embed::Embed;

#[derive(Embed)]
#[folder = "web-dist/"]
struct ViewerAssets;

/// Serve the embedded viewer bundle. Unknown paths fall back to the
/// viewer page so a bare session URL opens the terminal; asset paths
/// (`.js`, `.wasm`, ...) get their conventional content types.
pub async fn viewer_asset(uri: axum::http::Uri) -> impl IntoResponse {
    let path = uri.path().trim_start_matches('/');

    let file = if path.is_empty() {
        ViewerAssets::get("viewer.html")
    } else {
        ViewerAssets::get(path).or_else(|| ViewerAssets::get("viewer.html"))
    };

    match file {
        Some(content) => {
            let mime = if path.is_empty() || ViewerAssets::get(path).is_none() {
                "text/html".to_string()
            } else {
                mime_guess::from_path(path)
                    .first_or_text_plain()
                    .to_string()
            };
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, mime)],
                content.data.to_vec(),
            )
                .into_response()
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
