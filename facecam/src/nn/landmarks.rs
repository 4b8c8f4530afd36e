//! 68-point landmark regression.
//!
//! Built for PFLD (Guo et al., "PFLD: A Practical Facial Landmark Detector", 2019) trained on
//! the 68-point 300W annotation and exported to ONNX with a single `1x3x112x112` input. The
//! network sees a square RGB crop around the detected face, enlarged by [`CROP_SCALE`] and
//! scaled to `[0, 1]`, and returns 136 values: the `(x, y)` pairs of all landmarks normalized
//! to the crop. Any regressor with this contract can be dropped in as `landmarks-68.onnx`.
use std::path::Path;

use anyhow::{ensure, Result};
use common::detection::{FaceBox, FaceLandmarks, Point};
use image::RgbImage;
use tract_onnx::prelude::*;

use super::{crop_face, load_onnx, run_model, LandmarkModel, NnModel};

const INPUT_SIZE: u32 = 112;

/// Side of the square crop relative to the longer side of the detected box.
const CROP_SCALE: f32 = 1.2;

pub struct Landmark68Net {
    model: NnModel,
}

impl Landmark68Net {
    pub fn new(path: &Path) -> Result<Self> {
        let model = load_onnx(path, [1, 3, INPUT_SIZE as usize, INPUT_SIZE as usize])?;
        Ok(Self { model })
    }

    fn preproc(crop: &RgbImage) -> Tensor {
        let resized = image::imageops::resize(
            crop,
            INPUT_SIZE,
            INPUT_SIZE,
            image::imageops::FilterType::Triangle,
        );

        tract_ndarray::Array4::from_shape_fn(
            (1, 3, INPUT_SIZE as usize, INPUT_SIZE as usize),
            |(_, c, y, x)| resized[(x as _, y as _)][c] as f32 / 255.0,
        )
        .into()
    }
}

impl LandmarkModel for Landmark68Net {
    fn landmarks(&self, image: &RgbImage, face: &FaceBox) -> Result<FaceLandmarks> {
        let (crop, region) = crop_face(image, &landmark_region(face))?;
        let outputs = run_model(&self.model, Self::preproc(&crop))?;
        let coordinates = outputs.first().map(Vec::as_slice).unwrap_or_default();

        decode_landmarks(coordinates, &region)
    }
}

/// Square region around the center of a detected face that the landmark model expects.
///
/// Detector boxes are tight around the face. The enlarged square also covers the jaw line.
pub(crate) fn landmark_region(face: &FaceBox) -> FaceBox {
    let side = face.width.max(face.height) * CROP_SCALE;
    let center_x = face.x + face.width / 2.0;
    let center_y = face.y + face.height / 2.0;
    FaceBox::new(center_x - side / 2.0, center_y - side / 2.0, side, side)
}

/// Map landmarks normalized to the face crop back into image coordinates.
pub(crate) fn decode_landmarks(coordinates: &[f32], region: &FaceBox) -> Result<FaceLandmarks> {
    ensure!(
        coordinates.len() >= 2 * FaceLandmarks::NUM_POINTS,
        "expected {} landmark coordinates, got {}",
        2 * FaceLandmarks::NUM_POINTS,
        coordinates.len()
    );

    let points = coordinates
        .chunks_exact(2)
        .take(FaceLandmarks::NUM_POINTS)
        .map(|xy| {
            Point::new(
                region.x + xy[0] * region.width,
                region.y + xy[1] * region.height,
            )
        })
        .collect();

    Ok(FaceLandmarks::new(points))
}
