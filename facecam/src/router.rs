//! HTTP routes of the application.
//!
use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Extension, Router,
};

use crate::{
    endpoints::{
        annotate, detect, healthcheck, load_models, toggle_webcam, webcam_detections,
        webcam_status, webcam_stream, AppState,
    },
    spa::SpaBundle,
    ui::{asset, ui_page},
};

/// Build the application router.
///
/// With a UI bundle every path not handled by the API is served from the bundle. Without
/// one the built-in UI answers those paths.
pub fn build_app(state: Arc<AppState>, bundle: Option<SpaBundle>) -> Router {
    let api = Router::new()
        .route("/healthcheck", get(healthcheck))
        .route("/api/models/load", post(load_models))
        .route("/api/detect", post(detect))
        .route("/api/annotate", post(annotate))
        .route("/api/webcam", get(webcam_status).post(toggle_webcam))
        .route("/api/webcam/stream", get(webcam_stream))
        .route("/api/webcam/detections", get(webcam_detections));

    let app = match bundle {
        Some(bundle) => {
            log::info!("Serving UI bundle from {}", bundle.dir().display());
            api.fallback_service(bundle.service())
        }
        None => {
            log::info!("No UI bundle found, serving the built-in UI");
            api.route("/assets/:name", get(asset)).fallback(ui_page)
        }
    };

    app.layer(DefaultBodyLimit::max(state.max_upload_bytes))
        .layer(Extension(state))
}
