use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant},
};

use tokio::{task::JoinHandle, time::interval};

pub static METER: Meter = Meter::new();

/// Counters of processed and streamed frames.
#[derive(Default)]
pub struct Meter {
    detected_frames: AtomicU64,
    detected_faces: AtomicU64,
    streamed_frames: AtomicU64,
}

impl Meter {
    pub const fn new() -> Meter {
        Meter {
            detected_frames: AtomicU64::new(0),
            detected_faces: AtomicU64::new(0),
            streamed_frames: AtomicU64::new(0),
        }
    }

    pub fn tick_detected(&self, num_faces: usize) {
        self.detected_frames.fetch_add(1, Ordering::Relaxed);
        self.detected_faces
            .fetch_add(num_faces as u64, Ordering::Relaxed);
    }

    pub fn tick_streamed(&self) {
        self.streamed_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_reset_detected(&self) -> (u64, u64) {
        (
            self.detected_frames.swap(0, Ordering::Relaxed),
            self.detected_faces.swap(0, Ordering::Relaxed),
        )
    }

    pub fn get_reset_streamed(&self) -> u64 {
        self.streamed_frames.swap(0, Ordering::Relaxed)
    }
}

pub fn spawn_meter_logger() -> JoinHandle<()> {
    tokio::spawn(async {
        let mut log_interval = interval(Duration::from_secs(2));
        log_interval.tick().await;

        loop {
            let start = Instant::now();
            log_interval.tick().await;

            let (detected_frames, detected_faces) = METER.get_reset_detected();
            let streamed_frames = METER.get_reset_streamed();
            let elapsed = start.elapsed().as_secs_f32();
            let fps_detected = detected_frames as f32 / elapsed;
            let fps_streamed = streamed_frames as f32 / elapsed;

            if detected_frames > 0 {
                log::info!(
                    "Detection frames per second: {fps_detected:.2} ({detected_faces} faces)"
                )
            }
            if streamed_frames > 0 {
                log::info!("Streamed frames per second: {fps_streamed:.2}")
            }
        }
    })
}
