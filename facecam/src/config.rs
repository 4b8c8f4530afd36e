//! Command line and environment configuration.
//!
use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::PathBuf,
    time::Duration,
};

use anyhow::{bail, Result};
use clap::Parser;

use crate::{models::default_models_dir, pipeline::DetectorOptions};

#[derive(Parser, Debug)]
#[clap(author, version, about = "Face detection web application")]
pub struct Args {
    /// Port on which to serve
    #[clap(short, long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Bind to all IP addresses
    #[clap(short, long)]
    pub bindall: bool,

    /// Directory of a pre-built UI bundle, served with `index.html` as fallback
    #[clap(long, env = "STATIC_DIR", default_value = "dist/facecam-app")]
    pub static_dir: PathBuf,

    /// Directory of the ONNX models
    #[clap(long, env = "MODELS_DIR")]
    pub models_dir: Option<PathBuf>,

    /// Never download missing models
    #[clap(long)]
    pub offline: bool,

    /// Download URL of the 68-point landmark model
    #[clap(long, env = "LANDMARKS_URL")]
    pub landmarks_url: Option<String>,

    /// Minimum confidence of a detected face
    #[clap(long, default_value_t = 0.5)]
    pub min_confidence: f32,

    /// Maximum overlap of two detected faces before the weaker one is dropped
    #[clap(long, default_value_t = 0.5)]
    pub max_iou: f32,

    /// Detection interval of the webcam in milliseconds
    #[clap(long, default_value_t = 100)]
    pub poll_interval_ms: u64,

    /// TrueType font for overlay text
    #[clap(long)]
    pub font: Option<PathBuf>,

    /// Maximum size of an uploaded image in bytes
    #[clap(long, default_value_t = 16 * 1024 * 1024)]
    pub max_upload_bytes: usize,

    /// Video device of a camera attached to the server
    #[cfg(feature = "v4l")]
    #[clap(long, env = "CAMERA_DEVICE")]
    pub camera_device: Option<String>,
}

/// Validated server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    pub static_dir: PathBuf,
    pub models_dir: PathBuf,
    pub offline: bool,
    pub landmarks_url: Option<String>,
    pub detector: DetectorOptions,
    pub poll_interval: Duration,
    pub font: Option<PathBuf>,
    pub max_upload_bytes: usize,
    pub camera_device: Option<String>,
}

impl Args {
    pub fn into_config(self) -> Result<ServerConfig> {
        if !(0.0..=1.0).contains(&self.min_confidence) {
            bail!("--min-confidence must be within [0, 1], got {}", self.min_confidence);
        }
        if !(0.0..=1.0).contains(&self.max_iou) {
            bail!("--max-iou must be within [0, 1], got {}", self.max_iou);
        }
        if self.poll_interval_ms == 0 {
            bail!("--poll-interval-ms must be positive");
        }
        if self.max_upload_bytes == 0 {
            bail!("--max-upload-bytes must be positive");
        }

        let bind_ip = match self.bindall {
            true => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            false => IpAddr::V4(Ipv4Addr::LOCALHOST),
        };

        #[cfg(feature = "v4l")]
        let camera_device = self.camera_device;
        #[cfg(not(feature = "v4l"))]
        let camera_device = None;

        Ok(ServerConfig {
            addr: SocketAddr::new(bind_ip, self.port),
            static_dir: self.static_dir,
            models_dir: self.models_dir.unwrap_or_else(default_models_dir),
            offline: self.offline,
            landmarks_url: self.landmarks_url,
            detector: DetectorOptions {
                min_confidence: self.min_confidence,
                max_iou: self.max_iou,
            },
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            font: self.font,
            max_upload_bytes: self.max_upload_bytes,
            camera_device,
        })
    }
}
