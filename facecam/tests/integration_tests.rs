use std::{io::Cursor, sync::Arc, time::Duration};

use anyhow::Result;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    response::Response,
    Router,
};
use common::detection::{
    DetectionResponse, Dimensions, FaceBox, FaceExpressions, FaceLandmarks, Gender,
};
use facecam::{
    endpoints::AppState,
    nn::{AgeGender, AgeGenderModel, ExpressionModel, FaceDetector, LandmarkModel},
    overlay::{OverlayStyle, Painter},
    pipeline::{Pipeline, PipelineLoader},
    router::build_app,
    spa::SpaBundle,
    webcam::{CameraFactory, FrameSource},
};
use image::{DynamicImage, ImageOutputFormat, RgbImage};
use tower::ServiceExt;

struct OneFace;

impl FaceDetector for OneFace {
    fn detect(&self, _image: &RgbImage) -> Result<Vec<(FaceBox, f32)>> {
        Ok(vec![(FaceBox::new(10.0, 20.0, 40.0, 40.0), 0.93)])
    }
}

struct CornerLandmarks;

impl LandmarkModel for CornerLandmarks {
    fn landmarks(&self, _image: &RgbImage, face: &FaceBox) -> Result<FaceLandmarks> {
        Ok(FaceLandmarks::new(vec![
            face.top_left();
            FaceLandmarks::NUM_POINTS
        ]))
    }
}

struct Surprised;

impl ExpressionModel for Surprised {
    fn expressions(&self, _image: &RgbImage, _face: &FaceBox) -> Result<FaceExpressions> {
        Ok(FaceExpressions::from_probabilities([
            0.1, 0.0, 0.9, 0.0, 0.0, 0.0, 0.0, 0.0,
        ]))
    }
}

struct Thirties;

impl AgeGenderModel for Thirties {
    fn age_gender(&self, _image: &RgbImage, _face: &FaceBox) -> Result<AgeGender> {
        Ok(AgeGender {
            age: 31.4,
            gender: Gender::Female,
            gender_probability: 0.97,
        })
    }
}

struct GrayCamera;

impl FrameSource for GrayCamera {
    fn dimensions(&self) -> Dimensions {
        Dimensions::new(80, 60)
    }

    fn capture(&mut self) -> Result<RgbImage> {
        Ok(RgbImage::from_pixel(80, 60, image::Rgb([128, 128, 128])))
    }
}

struct GrayCameraFactory;

impl CameraFactory for GrayCameraFactory {
    fn open(&self) -> Result<Box<dyn FrameSource>> {
        Ok(Box::new(GrayCamera))
    }
}

fn fake_state() -> AppState {
    let pipeline = Pipeline::new(Box::new(OneFace))
        .with_landmarks(Box::new(CornerLandmarks))
        .with_expressions(Box::new(Surprised))
        .with_age_and_gender(Box::new(Thirties));

    AppState::new(
        PipelineLoader::ready(pipeline),
        Painter::new(None, OverlayStyle::default()),
        1024 * 1024,
    )
}

fn app() -> Router {
    build_app(Arc::new(fake_state()), None)
}

fn png(width: u32, height: u32) -> Vec<u8> {
    let mut data = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(RgbImage::new(width, height))
        .write_to(&mut data, ImageOutputFormat::Png)
        .unwrap();
    data.into_inner()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_bytes(response: Response) -> Vec<u8> {
    hyper::body::to_bytes(response.into_body())
        .await
        .unwrap()
        .to_vec()
}

async fn body_text(response: Response) -> String {
    String::from_utf8(body_bytes(response).await).unwrap()
}

#[tokio::test]
async fn test_root_redirects_to_webcam_detection() {
    let response = app().oneshot(get("/")).await.unwrap();

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(response.headers()[header::LOCATION], "/webcam-detection");
}

#[tokio::test]
async fn test_pages_render_with_shell() {
    for (uri, title) in [
        ("/webcam-detection", "Webcam Detection"),
        ("/image-detection", "Image Detection"),
    ] {
        let response = app().oneshot(get(uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let html = body_text(response).await;
        assert!(html.contains(&format!("<title>{title} | facecam</title>")));
        assert!(html.contains("<nav class=\"navbar\">"));
        assert!(html.contains("<footer>"));
    }
}

#[tokio::test]
async fn test_unknown_path_serves_entry_page() {
    let response = app().oneshot(get("/does/not/exist")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("Webcam Detection"));
}

#[tokio::test]
async fn test_healthcheck_and_assets() {
    let response = app().oneshot(get("/healthcheck")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "healthy");

    let response = app().oneshot(get("/assets/webcam.js")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/javascript"));
    assert!(body_text(response).await.contains("Webcam stopped"));
}

#[tokio::test]
async fn test_models_load() -> Result<()> {
    let request = Request::post("/api/models/load").body(Body::empty())?;
    let response = app().oneshot(request).await?;
    assert_eq!(response.status(), StatusCode::OK);

    let stages: serde_json::Value = serde_json::from_slice(&body_bytes(response).await)?;
    assert_eq!(stages["detector"], true);
    assert_eq!(stages["age_gender"], true);
    Ok(())
}

#[tokio::test]
async fn test_detect_resizes_to_display_size() -> Result<()> {
    let request = Request::post("/api/detect?width=200&height=100").body(Body::from(png(100, 50)))?;
    let response = app().oneshot(request).await?;
    assert_eq!(response.status(), StatusCode::OK);

    let detections: DetectionResponse = serde_json::from_slice(&body_bytes(response).await)?;
    assert_eq!(detections.dimensions, Dimensions::new(200, 100));
    assert_eq!(detections.faces.len(), 1);

    let face = &detections.faces[0];
    assert_eq!(face.bbox, FaceBox::new(20.0, 40.0, 80.0, 80.0));
    assert_eq!(
        face.age_gender_label().as_deref(),
        Some("31 years old female (97%)")
    );
    assert_eq!(face.expression_labels(0.1), vec!["surprised (0.90)".to_string()]);
    Ok(())
}

#[tokio::test]
async fn test_detect_without_display_size() -> Result<()> {
    let request = Request::post("/api/detect").body(Body::from(png(64, 48)))?;
    let response = app().oneshot(request).await?;
    assert_eq!(response.status(), StatusCode::OK);

    let detections: DetectionResponse = serde_json::from_slice(&body_bytes(response).await)?;
    assert_eq!(detections.dimensions, Dimensions::new(64, 48));
    assert_eq!(detections.faces[0].bbox, FaceBox::new(10.0, 20.0, 40.0, 40.0));
    Ok(())
}

#[tokio::test]
async fn test_detect_rejects_bad_input() -> Result<()> {
    let request = Request::post("/api/detect").body(Body::from("definitely not an image"))?;
    let response = app().oneshot(request).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error: serde_json::Value = serde_json::from_slice(&body_bytes(response).await)?;
    assert!(error["detail"].as_str().unwrap().contains("invalid image"));

    let request = Request::post("/api/detect?width=100").body(Body::from(png(8, 8)))?;
    let response = app().oneshot(request).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn test_detect_rejects_malformed_query_as_json() -> Result<()> {
    for uri in ["/api/detect?width=abc&height=10", "/api/detect?width=-5&height=10"] {
        let request = Request::post(uri).body(Body::from(png(8, 8)))?;
        let response = app().oneshot(request).await?;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(response.headers()[header::CONTENT_TYPE]
            .to_str()?
            .starts_with("application/json"));

        let error: serde_json::Value = serde_json::from_slice(&body_bytes(response).await)?;
        assert!(error["detail"]
            .as_str()
            .unwrap()
            .contains("Failed to deserialize query string"));
    }
    Ok(())
}

#[tokio::test]
async fn test_upload_limit() -> Result<()> {
    let request = Request::post("/api/detect").body(Body::from(vec![0_u8; 2 * 1024 * 1024]))?;
    let response = app().oneshot(request).await?;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    Ok(())
}

#[tokio::test]
async fn test_annotate_returns_jpeg() -> Result<()> {
    let boundary = "facecam-boundary";
    let mut body = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"face.png\"\r\nContent-Type: image/png\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(&png(64, 64));
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

    let request = Request::post("/api/annotate")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))?;
    let response = app().oneshot(request).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/jpeg");

    let jpeg = body_bytes(response).await;
    let annotated = image::load_from_memory(&jpeg)?.to_rgb8();
    assert_eq!(annotated.dimensions(), (64, 64));
    // The box is drawn in blue onto the black image
    let pixel = annotated.get_pixel(10, 40);
    assert!(pixel[2] > 60 && pixel[2] > pixel[0]);
    assert!(annotated.get_pixel(30, 40)[2] < 30);
    Ok(())
}

#[tokio::test]
async fn test_annotate_requires_image_field() -> Result<()> {
    let boundary = "facecam-boundary";
    let body = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"other\"\r\n\r\nvalue\r\n--{boundary}--\r\n"
    );
    let request = Request::post("/api/annotate")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))?;
    let response = app().oneshot(request).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn test_webcam_unavailable_without_camera() {
    for uri in ["/api/webcam", "/api/webcam/stream", "/api/webcam/detections"] {
        let response = app().oneshot(get(uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE, "{uri}");
    }
}

#[tokio::test]
async fn test_webcam_toggle() -> Result<()> {
    let state = fake_state().with_camera(Arc::new(GrayCameraFactory), Duration::from_millis(10));
    let app = build_app(Arc::new(state), None);

    let toggle = |active: bool| {
        Request::post("/api/webcam")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(format!("{{\"active\": {active}}}")))
    };

    let response = app.clone().oneshot(toggle(true)?).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let status: serde_json::Value = serde_json::from_slice(&body_bytes(response).await)?;
    assert_eq!(status["active"], true);
    assert_eq!(status["interval_ms"], 10);

    // Wait for the first processed frame
    let mut faces = Vec::new();
    for _ in 0..100 {
        let response = app.clone().oneshot(get("/api/webcam/detections")).await?;
        faces = serde_json::from_slice::<Vec<serde_json::Value>>(&body_bytes(response).await)?;
        if !faces.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(faces.len(), 1);

    let response = app.clone().oneshot(toggle(false)?).await?;
    let status: serde_json::Value = serde_json::from_slice(&body_bytes(response).await)?;
    assert_eq!(status["active"], false);

    let response = app.oneshot(get("/api/webcam/detections")).await?;
    assert_eq!(body_text(response).await, "[]");
    Ok(())
}

#[tokio::test]
async fn test_spa_bundle_with_index_fallback() -> Result<()> {
    let scratch = tempfile::TempDir::new()?;
    let dir = scratch.path();
    std::fs::create_dir_all(dir.join("assets"))?;
    std::fs::write(dir.join("index.html"), "<app-root></app-root>")?;
    std::fs::write(dir.join("assets").join("main.js"), "console.log('main');")?;

    let bundle = SpaBundle::detect(dir).unwrap();
    let app = build_app(Arc::new(fake_state()), Some(bundle));

    let response = app.clone().oneshot(get("/assets/main.js")).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "console.log('main');");

    let response = app.clone().oneshot(get("/image-detection")).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "<app-root></app-root>");

    // The API is still served next to the bundle
    let response = app.oneshot(get("/healthcheck")).await?;
    assert_eq!(body_text(response).await, "healthy");
    Ok(())
}
