pub mod config;
pub mod endpoints;
pub mod error;
pub mod meter;
pub mod models;
pub mod nn;
pub mod overlay;
pub mod pipeline;
pub mod router;
#[cfg(feature = "v4l")]
pub mod sensors;
pub mod spa;
pub mod ui;
pub mod utils;
pub mod webcam;
