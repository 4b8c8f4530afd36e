//! Webcam session for a camera attached to the server.
//!
//! While active, the session captures a frame on every tick of a fixed interval, runs the
//! detection pipeline on it, draws the results and broadcasts the annotated frame as an item
//! of a MJPEG stream. A tick is skipped while the previous frame is still being processed.
use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use anyhow::Result;
use bytes::Bytes;
use common::detection::{Dimensions, FaceDetection};
use image::RgbImage;
use serde::Serialize;
use tokio::{
    sync::{broadcast, oneshot},
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};

use crate::{
    meter::METER,
    overlay::{as_jpeg_stream_item, encode_jpeg, Painter},
    pipeline::{Pipeline, PipelineLoader},
};

const JPEG_QUALITY: u8 = 80;

/// An opened camera delivering frames.
pub trait FrameSource: Send {
    fn dimensions(&self) -> Dimensions;

    /// Capture the next frame. Blocks until it is available.
    fn capture(&mut self) -> Result<RgbImage>;
}

/// Opens cameras. Every session start opens a new one, dropping it stops the capture.
pub trait CameraFactory: Send + Sync {
    fn open(&self) -> Result<Box<dyn FrameSource>>;
}

pub type FrameReceiver = broadcast::Receiver<Bytes>;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WebcamStatus {
    pub active: bool,
    pub interval_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<Dimensions>,
}

struct ActiveCapture {
    task: JoinHandle<()>,
    stop_tx: oneshot::Sender<()>,
    dimensions: Dimensions,
}

pub struct WebcamSession {
    camera: Arc<dyn CameraFactory>,
    loader: Arc<PipelineLoader>,
    painter: Arc<Painter>,
    period: Duration,
    capture: tokio::sync::Mutex<Option<ActiveCapture>>,
    frames_tx: broadcast::Sender<Bytes>,
    latest: Arc<Mutex<Vec<FaceDetection>>>,
}

impl WebcamSession {
    pub fn new(
        camera: Arc<dyn CameraFactory>,
        loader: Arc<PipelineLoader>,
        painter: Arc<Painter>,
        period: Duration,
    ) -> Self {
        let (frames_tx, _) = broadcast::channel(20);
        Self {
            camera,
            loader,
            painter,
            period,
            capture: tokio::sync::Mutex::new(None),
            frames_tx,
            latest: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Start or stop the session depending on `active`.
    pub async fn toggle(&self, active: bool) -> Result<WebcamStatus> {
        if active {
            self.start().await
        } else {
            Ok(self.stop().await)
        }
    }

    /// Load the models, open the camera and start the detection interval.
    ///
    /// Starting an active session does nothing. The session lock is only taken once the
    /// models are loaded, so status requests are answered during a slow first load.
    pub async fn start(&self) -> Result<WebcamStatus> {
        let pipeline = self.loader.get().await?;

        let mut capture = self.capture.lock().await;
        if is_running(capture.as_ref()) {
            return Ok(self.status_of(capture.as_ref()));
        }

        let factory = Arc::clone(&self.camera);
        let camera = match tokio::task::spawn_blocking(move || factory.open()).await? {
            Ok(camera) => camera,
            Err(e) => {
                log::error!("Error accessing the camera: {e:#}");
                *capture = None;
                return Err(e);
            }
        };
        let dimensions = camera.dimensions();

        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(run_detection_loop(
            camera,
            pipeline,
            Arc::clone(&self.painter),
            self.period,
            stop_rx,
            self.frames_tx.clone(),
            Arc::clone(&self.latest),
        ));
        *capture = Some(ActiveCapture {
            task,
            stop_tx,
            dimensions,
        });
        log::info!("Webcam started with {dimensions}");

        Ok(self.status_of(capture.as_ref()))
    }

    /// Stop capturing, clear the detection interval and the last detections.
    ///
    /// Returns once the detection loop has ended and the camera is released. A frame that is
    /// being processed is finished first and then discarded.
    pub async fn stop(&self) -> WebcamStatus {
        let mut capture = self.capture.lock().await;
        if let Some(active) = capture.take() {
            // The loop may already have ended on its own
            let _ = active.stop_tx.send(());
            if let Err(e) = active.task.await {
                log::error!("Webcam detection loop failed: {e}");
            }
        }
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        log::info!("Webcam stopped");

        self.status_of(None)
    }

    pub async fn status(&self) -> WebcamStatus {
        let capture = self.capture.lock().await;
        self.status_of(capture.as_ref())
    }

    pub async fn is_active(&self) -> bool {
        self.status().await.active
    }

    /// Subscribe to the annotated MJPEG stream items.
    pub fn subscribe(&self) -> FrameReceiver {
        self.frames_tx.subscribe()
    }

    /// Detections of the most recent frame, empty while inactive.
    pub fn latest_detections(&self) -> Vec<FaceDetection> {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn status_of(&self, capture: Option<&ActiveCapture>) -> WebcamStatus {
        let active = is_running(capture);
        WebcamStatus {
            active,
            interval_ms: self.period.as_millis() as u64,
            dimensions: capture.filter(|_| active).map(|c| c.dimensions),
        }
    }
}

fn is_running(capture: Option<&ActiveCapture>) -> bool {
    capture.map_or(false, |c| !c.task.is_finished())
}

/// Runs until `stop_rx` fires or its sender is dropped. The camera is dropped on return.
async fn run_detection_loop(
    mut camera: Box<dyn FrameSource>,
    pipeline: Arc<Pipeline>,
    painter: Arc<Painter>,
    period: Duration,
    mut stop_rx: oneshot::Receiver<()>,
    frames_tx: broadcast::Sender<Bytes>,
    latest: Arc<Mutex<Vec<FaceDetection>>>,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = &mut stop_rx => break,
            _ = ticker.tick() => {}
        }

        let pipeline = Arc::clone(&pipeline);
        let painter = Arc::clone(&painter);
        let processed = tokio::task::spawn_blocking(move || {
            let outcome = detect_frame(camera.as_mut(), &pipeline, &painter);
            (camera, outcome)
        })
        .await;

        let outcome = match processed {
            Ok((returned, outcome)) => {
                camera = returned;
                outcome
            }
            Err(e) => {
                log::error!("Detection task failed: {e}");
                break;
            }
        };

        // Results of a frame that finished after the stop request are dropped
        if !matches!(stop_rx.try_recv(), Err(oneshot::error::TryRecvError::Empty)) {
            break;
        }

        match outcome {
            Ok((jpeg, faces)) => {
                METER.tick_detected(faces.len());
                *latest.lock().unwrap_or_else(PoisonError::into_inner) = faces;
                if frames_tx.send(as_jpeg_stream_item(&jpeg)).is_err() {
                    log::trace!("No listener for webcam frames");
                }
            }
            Err(e) => log::warn!("Skipping webcam frame: {e:#}"),
        }
    }
    log::debug!("Webcam detection loop ended");
}

/// Capture a frame, detect faces and draw them onto a fresh copy of the frame.
fn detect_frame(
    camera: &mut dyn FrameSource,
    pipeline: &Pipeline,
    painter: &Painter,
) -> Result<(Vec<u8>, Vec<FaceDetection>)> {
    let mut frame = camera.capture()?;
    let faces = pipeline.detect_all_faces(&frame)?;
    painter.draw_all(&mut frame, &faces);

    Ok((encode_jpeg(&frame, JPEG_QUALITY)?, faces))
}
