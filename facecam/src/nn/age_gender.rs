//! Age and gender estimation with the GoogLeNet age/gender classifiers.
//!
//! Both networks take a `224x224` BGR crop with the per-channel means subtracted. The age
//! network classifies into eight age ranges; the continuous age is the expectation over the
//! range midpoints. The gender network returns male/female scores.
use std::path::Path;

use anyhow::{ensure, Result};
use common::detection::{FaceBox, Gender};
use image::RgbImage;
use tract_onnx::prelude::*;

use super::{crop_face, load_onnx, run_model, softmax, AgeGender, AgeGenderModel, NnModel};

const INPUT_SIZE: u32 = 224;
const BGR_MEAN: [f32; 3] = [104.0, 117.0, 123.0];

/// Midpoints of the age ranges 0-2, 4-6, 8-12, 15-20, 25-32, 38-43, 48-53, 60-100.
const AGE_BUCKET_MIDPOINTS: [f32; 8] = [1.0, 5.0, 10.0, 17.5, 28.5, 40.5, 50.5, 80.0];

pub struct AgeGenderNet {
    age_model: NnModel,
    gender_model: NnModel,
}

impl AgeGenderNet {
    pub fn new(age_path: &Path, gender_path: &Path) -> Result<Self> {
        let shape = [1, 3, INPUT_SIZE as usize, INPUT_SIZE as usize];
        Ok(Self {
            age_model: load_onnx(age_path, shape)?,
            gender_model: load_onnx(gender_path, shape)?,
        })
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
            |(_, c, y, x)| {
                // Channel order is BGR
                resized[(x as _, y as _)][2 - c] as f32 - BGR_MEAN[c]
            },
        )
        .into()
    }
}

impl AgeGenderModel for AgeGenderNet {
    fn age_gender(&self, image: &RgbImage, face: &FaceBox) -> Result<AgeGender> {
        let (crop, _) = crop_face(image, face)?;
        let input = Self::preproc(&crop);

        let age_out = run_model(&self.age_model, input.clone())?;
        let gender_out = run_model(&self.gender_model, input)?;

        decode_age_gender(
            age_out.first().map(Vec::as_slice).unwrap_or_default(),
            gender_out.first().map(Vec::as_slice).unwrap_or_default(),
        )
    }
}

/// Scores forming a distribution are kept as they are, anything else goes through a softmax.
fn normalized(scores: &[f32]) -> Vec<f32> {
    let sum: f32 = scores.iter().sum();
    if scores.iter().all(|s| *s >= 0.0) && (sum - 1.0).abs() < 1e-3 {
        scores.to_vec()
    } else {
        softmax(scores)
    }
}

pub(crate) fn decode_age_gender(age_scores: &[f32], gender_scores: &[f32]) -> Result<AgeGender> {
    ensure!(
        age_scores.len() == AGE_BUCKET_MIDPOINTS.len(),
        "expected {} age scores, got {}",
        AGE_BUCKET_MIDPOINTS.len(),
        age_scores.len()
    );
    ensure!(
        gender_scores.len() == 2,
        "expected 2 gender scores, got {}",
        gender_scores.len()
    );

    let age: f32 = normalized(age_scores)
        .iter()
        .zip(AGE_BUCKET_MIDPOINTS.iter())
        .map(|(probability, midpoint)| probability * midpoint)
        .sum();

    let gender_probabilities = normalized(gender_scores);
    let (gender, gender_probability) = if gender_probabilities[0] >= gender_probabilities[1] {
        (Gender::Male, gender_probabilities[0])
    } else {
        (Gender::Female, gender_probabilities[1])
    };

    Ok(AgeGender {
        age,
        gender,
        gender_probability,
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_age_is_expectation_over_buckets() -> Result<()> {
        let age_scores = [0.0, 0.0, 0.0, 0.0, 0.5, 0.5, 0.0, 0.0];
        let estimate = decode_age_gender(&age_scores, &[0.2, 0.8])?;

        assert!((estimate.age - 34.5).abs() < 1e-4);
        assert_eq!(estimate.gender, Gender::Female);
        assert!((estimate.gender_probability - 0.8).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn test_logits_are_normalized() -> Result<()> {
        let mut age_logits = [-10.0; 8];
        age_logits[0] = 10.0;
        let estimate = decode_age_gender(&age_logits, &[3.0, -3.0])?;

        assert!((estimate.age - 1.0).abs() < 1e-3);
        assert_eq!(estimate.gender, Gender::Male);
        assert!(estimate.gender_probability > 0.99);
        Ok(())
    }

    #[test]
    fn test_rejects_unexpected_output() {
        assert!(decode_age_gender(&[0.5; 4], &[0.5, 0.5]).is_err());
        assert!(decode_age_gender(&[0.125; 8], &[1.0]).is_err());
    }

    #[test]
    fn test_preproc_swaps_to_bgr() {
        let crop = RgbImage::from_pixel(4, 4, image::Rgb([10, 20, 30]));
        let tensor = AgeGenderNet::preproc(&crop);
        let values = tensor.as_slice::<f32>().unwrap();
        let plane = 224 * 224;

        assert_eq!(tensor.shape(), &[1, 3, 224, 224]);
        assert!((values[0] - (30.0 - 104.0)).abs() < 1e-4);
        assert!((values[2 * plane] - (10.0 - 123.0)).abs() < 1e-4);
    }
}
