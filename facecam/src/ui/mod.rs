//! Built-in UI, used when no pre-built UI bundle is deployed.
//!
//! Pages are rendered on the server. The browser scripts under `/assets` do the camera
//! capture and draw detections fetched from the API onto a canvas over the video or image.
use axum::{
    extract::Path,
    http::{header, StatusCode, Uri},
    response::{Html, IntoResponse, Redirect, Response},
};

use crate::error::{ApiError, ApiResult};

pub mod pages;
pub mod routes;
pub mod shell;

use routes::{resolve, Page, Route};

/// Static assets of the built-in UI: name, content type and content.
const ASSETS: [(&str, &str, &str); 4] = [
    ("app.css", "text/css; charset=utf-8", include_str!("../../assets/app.css")),
    (
        "overlay.js",
        "text/javascript; charset=utf-8",
        include_str!("../../assets/overlay.js"),
    ),
    (
        "webcam.js",
        "text/javascript; charset=utf-8",
        include_str!("../../assets/webcam.js"),
    ),
    (
        "image.js",
        "text/javascript; charset=utf-8",
        include_str!("../../assets/image.js"),
    ),
];

/// Render a page with the shell around it.
pub fn render_page(page: Page) -> String {
    shell::render(page.title(), Some(page), pages::body(page), pages::scripts(page))
}

/// Serve the page matching the request path.
pub async fn ui_page(uri: Uri) -> Response {
    let route = resolve(uri.path());
    match route {
        Route::Redirect(page) => Redirect::temporary(page.path()).into_response(),
        Route::Page(page) => Html(render_page(page)).into_response(),
        Route::Fallback => {
            log::debug!("No route for {}, showing {}", uri.path(), Page::ENTRY);
            Html(render_page(Page::ENTRY)).into_response()
        }
    }
}

/// Serve one of the built-in assets.
pub async fn asset(Path(name): Path<String>) -> ApiResult<impl IntoResponse> {
    let (_, content_type, content) = ASSETS
        .iter()
        .find(|(asset, _, _)| *asset == name)
        .ok_or_else(|| ApiError::not_found(format!("asset {name}")))?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, *content_type),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        *content,
    ))
}
