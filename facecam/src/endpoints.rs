//! HTTP endpoints.
//!
use std::{future, sync::Arc};

use anyhow::Context;
use axum::{
    body::{Bytes, StreamBody},
    extract::{rejection::QueryRejection, Multipart, Query},
    http::header,
    response::IntoResponse,
    Extension, Json,
};
use common::detection::{DetectionResponse, Dimensions, FaceDetection};
use futures::StreamExt;
use image::RgbImage;
use serde::Deserialize;
use tokio_stream::wrappers::BroadcastStream;

use crate::{
    config::ServerConfig,
    error::{ApiError, ApiResult},
    meter::METER,
    models::ModelStore,
    overlay::{encode_jpeg, Painter},
    pipeline::{PipelineLoader, Stages},
    webcam::{CameraFactory, WebcamSession, WebcamStatus},
};

const ANNOTATED_JPEG_QUALITY: u8 = 90;

/// State shared by all handlers.
pub struct AppState {
    pub loader: Arc<PipelineLoader>,
    pub painter: Arc<Painter>,
    pub webcam: Option<Arc<WebcamSession>>,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(loader: PipelineLoader, painter: Painter, max_upload_bytes: usize) -> Self {
        Self {
            loader: Arc::new(loader),
            painter: Arc::new(painter),
            webcam: None,
            max_upload_bytes,
        }
    }

    /// Attach a server camera, driven by a webcam session polling every `period`.
    pub fn with_camera(mut self, camera: Arc<dyn CameraFactory>, period: std::time::Duration) -> Self {
        self.webcam = Some(Arc::new(WebcamSession::new(
            camera,
            Arc::clone(&self.loader),
            Arc::clone(&self.painter),
            period,
        )));
        self
    }

    pub fn from_config(config: &ServerConfig) -> anyhow::Result<Self> {
        let store = ModelStore::new(
            &config.models_dir,
            config.offline,
            config.landmarks_url.clone(),
        );
        let painter = Painter::from_font_path(config.font.as_deref())?;
        let state = Self::new(
            PipelineLoader::new(store, config.detector),
            painter,
            config.max_upload_bytes,
        );

        #[cfg(feature = "v4l")]
        let state = match &config.camera_device {
            Some(device) => {
                log::info!("Server camera at {device}");
                state.with_camera(
                    Arc::new(crate::sensors::V4lCameraFactory::new(device.as_str())),
                    config.poll_interval,
                )
            }
            None => state,
        };

        Ok(state)
    }

    fn webcam(&self) -> ApiResult<&Arc<WebcamSession>> {
        self.webcam
            .as_ref()
            .ok_or_else(|| ApiError::unavailable("no camera is attached to the server"))
    }
}

/// Health check endpoint.
pub async fn healthcheck() -> &'static str {
    "healthy"
}

/// Load all models, if not yet loaded, and report the available stages.
pub async fn load_models(Extension(state): Extension<Arc<AppState>>) -> ApiResult<Json<Stages>> {
    let pipeline = state
        .loader
        .get()
        .await
        .map_err(|e| ApiError::unavailable(format!("failed to load models: {e:#}")))?;

    Ok(Json(pipeline.stages()))
}

/// Display size the detections are resized to.
#[derive(Debug, Deserialize)]
pub struct DetectParams {
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
}

impl DetectParams {
    fn display_size(&self) -> ApiResult<Option<Dimensions>> {
        let size = match (self.width, self.height) {
            (None, None) => return Ok(None),
            (Some(width), Some(height)) => Dimensions::new(width, height),
            _ => return Err(ApiError::bad_request("width and height must both be given")),
        };
        if size.is_empty() {
            return Err(ApiError::bad_request("width and height must be positive"));
        }
        Ok(Some(size))
    }
}

/// Detect all faces in the image of the request body.
pub async fn detect(
    Extension(state): Extension<Arc<AppState>>,
    params: Result<Query<DetectParams>, QueryRejection>,
    body: Bytes,
) -> ApiResult<Json<DetectionResponse>> {
    let Query(params) = params.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let display_size = params.display_size()?;
    let image = decode_image(body).await?;
    let dimensions = Dimensions::new(image.width(), image.height());

    let pipeline = state
        .loader
        .get()
        .await
        .map_err(|e| ApiError::unavailable(format!("failed to load models: {e:#}")))?;
    let (_, faces) = pipeline.detect_blocking(image).await?;
    METER.tick_detected(faces.len());

    let response = DetectionResponse::new(dimensions, faces);
    Ok(Json(match display_size {
        Some(size) => response.resized(size),
        None => response,
    }))
}

/// Detect all faces in the uploaded `image` field and return it with the detections drawn.
pub async fn annotate(
    Extension(state): Extension<Arc<AppState>>,
    mut multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    let mut data = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("invalid multipart body: {e}")))?
    {
        if field.name() == Some("image") {
            data = Some(
                field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("failed to read image: {e}")))?,
            );
            break;
        }
    }
    let data = data.ok_or_else(|| ApiError::bad_request("missing multipart field `image`"))?;
    let image = decode_image(data).await?;

    let pipeline = state
        .loader
        .get()
        .await
        .map_err(|e| ApiError::unavailable(format!("failed to load models: {e:#}")))?;
    let (mut image, faces) = pipeline.detect_blocking(image).await?;
    METER.tick_detected(faces.len());

    let painter = Arc::clone(&state.painter);
    let jpeg = tokio::task::spawn_blocking(move || {
        painter.draw_all(&mut image, &faces);
        encode_jpeg(&image, ANNOTATED_JPEG_QUALITY)
    })
    .await
    .context("annotation task failed")??;

    Ok(([(header::CONTENT_TYPE, "image/jpeg")], jpeg))
}

/// Toggle request of the server webcam.
#[derive(Debug, Deserialize)]
pub struct WebcamToggle {
    active: bool,
}

pub async fn webcam_status(
    Extension(state): Extension<Arc<AppState>>,
) -> ApiResult<Json<WebcamStatus>> {
    Ok(Json(state.webcam()?.status().await))
}

pub async fn toggle_webcam(
    Extension(state): Extension<Arc<AppState>>,
    Json(toggle): Json<WebcamToggle>,
) -> ApiResult<Json<WebcamStatus>> {
    let status = state
        .webcam()?
        .toggle(toggle.active)
        .await
        .map_err(|e| ApiError::unavailable(format!("{e:#}")))?;

    Ok(Json(status))
}

/// Annotated frames of the server webcam as MJPEG stream.
pub async fn webcam_stream(
    Extension(state): Extension<Arc<AppState>>,
) -> ApiResult<impl IntoResponse> {
    let rx = state.webcam()?.subscribe();
    log::info!("Webcam stream requested");

    let stream = BroadcastStream::new(rx).filter_map(|item| {
        future::ready(match item {
            Ok(frame) => {
                METER.tick_streamed();
                Some(Ok::<_, std::io::Error>(frame))
            }
            Err(e) => {
                log::debug!("Webcam stream fell behind: {e}");
                None
            }
        })
    });

    // Set body and headers for multipart streaming
    let body = StreamBody::new(stream);
    let headers = [(
        header::CONTENT_TYPE,
        "multipart/x-mixed-replace; boundary=frame",
    )];

    Ok((headers, body))
}

pub async fn webcam_detections(
    Extension(state): Extension<Arc<AppState>>,
) -> ApiResult<Json<Vec<FaceDetection>>> {
    Ok(Json(state.webcam()?.latest_detections()))
}

async fn decode_image(data: Bytes) -> ApiResult<RgbImage> {
    if data.is_empty() {
        return Err(ApiError::bad_request("empty image"));
    }

    tokio::task::spawn_blocking(move || {
        image::load_from_memory(&data)
            .map(|image| image.to_rgb8())
            .map_err(|e| ApiError::bad_request(format!("invalid image: {e}")))
    })
    .await
    .context("image decoding task failed")?
}
