//! Video4Linux cameras.
//!
use anyhow::{anyhow, Context, Result};
use common::detection::Dimensions;
use image::RgbImage;
use rscam::{Camera, Config};

use crate::webcam::{CameraFactory, FrameSource};

const FORMAT: &[u8] = b"MJPG";

/// Opens a video device of a Linux machine with its highest resolution and frame rate.
pub struct V4lCameraFactory {
    device: String,
}

impl V4lCameraFactory {
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
        }
    }
}

impl CameraFactory for V4lCameraFactory {
    fn open(&self) -> Result<Box<dyn FrameSource>> {
        let mut cam = Camera::new(&self.device)
            .with_context(|| format!("failed to open camera {}", self.device))?;
        log_supported_formats(&cam);

        let resolution = get_max_resolution(&cam)?;
        let interval = get_max_frame_rate(&cam, resolution)?;

        cam.start(&Config {
            interval,
            resolution,
            format: FORMAT,
            ..Default::default()
        })
        .with_context(|| format!("failed to start camera {}", self.device))?;
        log::info!("Using camera {} at {:?}", self.device, resolution);

        Ok(Box::new(V4lCamera {
            cam,
            dimensions: Dimensions::new(resolution.0, resolution.1),
        }))
    }
}

/// Started camera delivering MJPG frames. Capturing stops when it is dropped.
pub struct V4lCamera {
    cam: Camera,
    dimensions: Dimensions,
}

impl FrameSource for V4lCamera {
    fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    fn capture(&mut self) -> Result<RgbImage> {
        let frame = self.cam.capture().context("error capturing frame")?;
        let image = image::load_from_memory_with_format(&frame, image::ImageFormat::Jpeg)
            .context("failed to decode camera frame")?;
        Ok(image.to_rgb8())
    }
}

/// Get the maximum supported resolution in terms of number of pixels.
fn get_max_resolution(cam: &Camera) -> Result<(u32, u32)> {
    let resolution_info = cam.resolutions(FORMAT)?;
    log::debug!("Found resolutions: {:?}", &resolution_info);
    match resolution_info {
        rscam::ResolutionInfo::Discretes(resolutions) => resolutions
            .into_iter()
            .max_by_key(|(width, height)| width * height),
        rscam::ResolutionInfo::Stepwise { max, .. } => Some(max),
    }
    .ok_or_else(|| anyhow!("No resolution found"))
}

/// Get the frame interval with the highest frame rate for the given resolution.
fn get_max_frame_rate(cam: &Camera, resolution: (u32, u32)) -> Result<(u32, u32)> {
    let interval_info = cam.intervals(FORMAT, resolution)?;
    log::debug!("Found frame intervals: {:?}", &interval_info);
    match interval_info {
        // Intervals are (numerator, denominator) in seconds
        rscam::IntervalInfo::Discretes(intervals) => intervals
            .into_iter()
            .filter(|(numerator, _)| *numerator > 0)
            .max_by(|a, b| {
                let rate_a = a.1 as f32 / a.0 as f32;
                let rate_b = b.1 as f32 / b.0 as f32;
                rate_a.total_cmp(&rate_b)
            }),
        rscam::IntervalInfo::Stepwise { min, .. } => Some(min),
    }
    .ok_or_else(|| anyhow!("No frame rate found"))
}

fn log_supported_formats(cam: &Camera) {
    let formats: Vec<_> = cam.formats().filter_map(|fmt| fmt.ok()).collect();
    log::debug!(
        "Supported formats: {:?}, using format {:?}",
        formats,
        String::from_utf8_lossy(FORMAT)
    );
}
