//! Ultraface face detector.
//!
//! The network takes a `1x3x240x320` image and returns two outputs:
//! - confidences `[1, N, 2]` with background/face scores per prior box
//! - boxes `[1, N, 4]` as `[x_top_left, y_top_left, x_bottom_right, y_bottom_right]`, normalized
//!   to the image size
use std::path::Path;

use anyhow::{bail, Result};
use common::detection::FaceBox;
use image::RgbImage;
use ndarray::s;
use tract_onnx::prelude::*;

use super::{load_onnx, FaceDetector, NnModel};

const INPUT_WIDTH: u32 = 320;
const INPUT_HEIGHT: u32 = 240;

pub struct UltrafaceDetector {
    model: NnModel,
    max_iou: f32,
    min_confidence: f32,
}

impl UltrafaceDetector {
    pub fn new(path: &Path, max_iou: f32, min_confidence: f32) -> Result<Self> {
        let model = load_onnx(
            path,
            [1, 3, INPUT_HEIGHT as usize, INPUT_WIDTH as usize],
        )?;
        Ok(Self {
            model,
            max_iou,
            min_confidence,
        })
    }

    fn preproc(&self, input: &RgbImage) -> Tensor {
        let resized: RgbImage = image::imageops::resize(
            input,
            INPUT_WIDTH,
            INPUT_HEIGHT,
            image::imageops::FilterType::Triangle,
        );

        tract_ndarray::Array4::from_shape_fn(
            (1, 3, INPUT_HEIGHT as usize, INPUT_WIDTH as usize),
            |(_, c, y, x)| {
                // Mean/std are from MobileNet, not from Ultraface, but work well
                let mean = [0.485, 0.456, 0.406][c];
                let std = [0.229, 0.224, 0.225][c];
                (resized[(x as _, y as _)][c] as f32 / 255.0 - mean) / std
            },
        )
        .into()
    }
}

impl FaceDetector for UltrafaceDetector {
    fn detect(&self, image: &RgbImage) -> Result<Vec<(FaceBox, f32)>> {
        let (width, height) = image.dimensions();
        let raw_nn_out = self.model.run(tvec!(self.preproc(image).into()))?;
        if raw_nn_out.len() < 2 {
            bail!("expected confidences and boxes from the detector");
        }

        let confidences: Vec<f32> = raw_nn_out[0]
            .to_array_view::<f32>()?
            .into_dimensionality::<tract_ndarray::Ix3>()?
            .slice(s![0, .., 1])
            .to_vec();
        let bboxes: Vec<f32> = raw_nn_out[1]
            .to_array_view::<f32>()?
            .iter()
            .copied()
            .collect();

        Ok(decode_detections(
            &confidences,
            &bboxes,
            self.min_confidence,
            self.max_iou,
        )
        .into_iter()
        .map(|(bbox, confidence)| (bbox.scaled(width as f32, height as f32), confidence))
        .collect())
    }
}

/// Turn raw network output into selected, normalized boxes with their confidences.
pub(crate) fn decode_detections(
    confidences: &[f32],
    bboxes: &[f32],
    min_confidence: f32,
    max_iou: f32,
) -> Vec<(FaceBox, f32)> {
    let mut candidates: Vec<(FaceBox, f32)> = confidences
        .iter()
        .zip(bboxes.chunks_exact(4))
        .filter(|(confidence, _)| **confidence > min_confidence)
        .map(|(confidence, corners)| {
            (
                FaceBox::from_corners(corners[0], corners[1], corners[2], corners[3]),
                *confidence,
            )
        })
        .collect();

    candidates.sort_by(|a, b| a.1.total_cmp(&b.1));

    non_maximum_suppression(candidates, max_iou)
}

/// Run non-maximum-suppression on candidate bounding boxes.
///
/// Start with the most confident bounding box and iterate over all other bounding boxes in the
/// order of sinking confidence. Grow the vector of selected bounding boxes by adding only those
/// candidates which do not have an IoU above `max_iou` with already chosen bounding boxes.
/// The candidates are expected in ascending order of confidence.
pub fn non_maximum_suppression(
    mut sorted_bboxes_with_confidences: Vec<(FaceBox, f32)>,
    max_iou: f32,
) -> Vec<(FaceBox, f32)> {
    let mut selected: Vec<(FaceBox, f32)> = vec![];
    'candidates: loop {
        // Get next most confident bbox from the back of ascending-sorted vector.
        match sorted_bboxes_with_confidences.pop() {
            Some((bbox, confidence)) => {
                for (selected_bbox, _) in selected.iter() {
                    if bbox.iou(selected_bbox) > max_iou {
                        continue 'candidates;
                    }
                }

                selected.push((bbox, confidence))
            }
            None => break 'candidates,
        }
    }

    selected
}
