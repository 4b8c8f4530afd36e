//! Neural network models of the detection pipeline.
//!
//! Every stage sits behind a small trait, so the pipeline can run with any subset of the
//! ONNX models, or with stand-ins in tests.
use std::path::Path;

use anyhow::{Context, Result};
use common::detection::{Dimensions, FaceBox, FaceExpressions, FaceLandmarks, Gender};
use image::RgbImage;
use tract_onnx::prelude::*;

mod age_gender;
mod detector;
mod expressions;
mod landmarks;

pub use age_gender::AgeGenderNet;
pub use detector::{non_maximum_suppression, UltrafaceDetector};
pub use expressions::FerPlusNet;
pub use landmarks::Landmark68Net;

pub(crate) type NnModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Find all faces in an image.
pub trait FaceDetector: Send + Sync {
    /// Bounding boxes in pixels of `image` with their confidences.
    fn detect(&self, image: &RgbImage) -> Result<Vec<(FaceBox, f32)>>;
}

/// Regress 68 landmarks on a face.
pub trait LandmarkModel: Send + Sync {
    fn landmarks(&self, image: &RgbImage, face: &FaceBox) -> Result<FaceLandmarks>;
}

/// Classify the facial expression of a face.
pub trait ExpressionModel: Send + Sync {
    fn expressions(&self, image: &RgbImage, face: &FaceBox) -> Result<FaceExpressions>;
}

/// Estimate age and gender of a face.
pub trait AgeGenderModel: Send + Sync {
    fn age_gender(&self, image: &RgbImage, face: &FaceBox) -> Result<AgeGender>;
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AgeGender {
    pub age: f32,
    pub gender: Gender,
    pub gender_probability: f32,
}

/// Load an ONNX model with a fixed input shape and make it runnable.
pub(crate) fn load_onnx(path: &Path, input_shape: [usize; 4]) -> Result<NnModel> {
    let input_fact = InferenceFact::dt_shape(f32::datum_type(), tvec!(
        input_shape[0],
        input_shape[1],
        input_shape[2],
        input_shape[3]
    ));
    let model = tract_onnx::onnx()
        .model_for_path(path)
        .with_context(|| format!("failed to read model {}", path.display()))?
        .with_input_fact(0, input_fact)?
        .into_optimized()?
        .into_runnable()?;

    log::debug!("Loaded model {}", path.display());
    Ok(model)
}

/// Run a model on a single input and copy all outputs into plain vectors.
pub(crate) fn run_model(model: &NnModel, input: Tensor) -> Result<Vec<Vec<f32>>> {
    let outputs = model.run(tvec!(input.into()))?;
    outputs
        .iter()
        .map(|output| Ok(output.to_array_view::<f32>()?.iter().copied().collect()))
        .collect()
}

/// Cut the face out of the image. The box is clamped to the image first.
pub(crate) fn crop_face(image: &RgbImage, face: &FaceBox) -> Result<(RgbImage, FaceBox)> {
    let (width, height) = image.dimensions();
    let region = face
        .clamped(Dimensions::new(width, height))
        .context("face box lies outside of the image")?;

    let crop = image::imageops::crop_imm(
        image,
        region.x as u32,
        region.y as u32,
        (region.width as u32).max(1),
        (region.height as u32).max(1),
    )
    .to_image();

    Ok((crop, region))
}

pub(crate) fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::MIN, f32::max);
    let exps: Vec<f32> = logits.iter().map(|x| (x - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.iter().map(|x| x / sum).collect()
}
