//! Facial expression classification with the FER+ network.
use std::path::Path;

use anyhow::{ensure, Result};
use common::detection::{FaceBox, FaceExpressions};
use image::{GrayImage, RgbImage};
use tract_onnx::prelude::*;

use super::{crop_face, load_onnx, run_model, softmax, ExpressionModel, NnModel};

const INPUT_SIZE: u32 = 64;
const NUM_CLASSES: usize = 8;

pub struct FerPlusNet {
    model: NnModel,
}

impl FerPlusNet {
    pub fn new(path: &Path) -> Result<Self> {
        let model = load_onnx(path, [1, 1, INPUT_SIZE as usize, INPUT_SIZE as usize])?;
        Ok(Self { model })
    }

    /// The network expects unnormalized grayscale values in `[0, 255]`.
    fn preproc(crop: &RgbImage) -> Tensor {
        let gray: GrayImage = image::imageops::grayscale(crop);
        let resized = image::imageops::resize(
            &gray,
            INPUT_SIZE,
            INPUT_SIZE,
            image::imageops::FilterType::Triangle,
        );

        tract_ndarray::Array4::from_shape_fn(
            (1, 1, INPUT_SIZE as usize, INPUT_SIZE as usize),
            |(_, _, y, x)| resized[(x as _, y as _)][0] as f32,
        )
        .into()
    }
}

impl ExpressionModel for FerPlusNet {
    fn expressions(&self, image: &RgbImage, face: &FaceBox) -> Result<FaceExpressions> {
        let (crop, _) = crop_face(image, face)?;
        let outputs = run_model(&self.model, Self::preproc(&crop))?;
        let logits = outputs.first().map(Vec::as_slice).unwrap_or_default();

        decode_expressions(logits)
    }
}

pub(crate) fn decode_expressions(logits: &[f32]) -> Result<FaceExpressions> {
    ensure!(
        logits.len() == NUM_CLASSES,
        "expected {} expression scores, got {}",
        NUM_CLASSES,
        logits.len()
    );

    let mut probabilities = [0.0; NUM_CLASSES];
    probabilities.copy_from_slice(&softmax(logits));

    Ok(FaceExpressions::from_probabilities(probabilities))
}
