//! `GET /static/*` (spec §4.10). Falls back to axum's router for anything
//! under `/api` or `/events` that reaches this handler unmatched.

use axum::http::{Method, Uri};
use axum::response::{IntoResponse, Response};

#[cfg(feature = "embed-ui")]
#[derive(rust_embed::Embed)]
#[folder = "static"]
struct StaticAssets;

pub async fn serve_static(method: Method, uri: Uri) -> Response {
    let raw_path = match dashboard_ui::validate_ui_request(&method, &uri, &["/api", "/events"]) {
        Ok(path) => path,
        Err(err) => return err.into_response(),
    };

    #[cfg(feature = "embed-ui")]
    {
        return dashboard_ui::serve_embedded_ui::<StaticAssets>(raw_path);
    }

    #[cfg(not(feature = "embed-ui"))]
    {
        let _ = raw_path;
        dashboard_ui::non_embedded_placeholder("Ralphex Dashboard")
    }
}
