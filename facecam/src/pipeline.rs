//! Detection pipeline.
//!
//! Faces are found by the detector first. Every further stage runs on each found face and
//! fills in its part of the [`FaceDetection`]. Stages without a model are skipped.
use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use common::detection::{FaceDetection, FaceLandmarks};
use image::RgbImage;
use serde::Serialize;
use tokio::sync::OnceCell;

use crate::{
    models::{ModelKind, ModelStore},
    nn::{
        AgeGenderModel, AgeGenderNet, ExpressionModel, FaceDetector, FerPlusNet, Landmark68Net,
        LandmarkModel, UltrafaceDetector,
    },
};

/// Options of the face detector stage.
#[derive(Clone, Copy, Debug)]
pub struct DetectorOptions {
    pub min_confidence: f32,
    pub max_iou: f32,
}

impl Default for DetectorOptions {
    fn default() -> Self {
        Self {
            min_confidence: 0.5,
            max_iou: 0.5,
        }
    }
}

/// Stages available in a loaded pipeline.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub struct Stages {
    pub detector: bool,
    pub landmarks: bool,
    pub expressions: bool,
    pub age_gender: bool,
}

pub struct Pipeline {
    detector: Box<dyn FaceDetector>,
    landmarks: Option<Box<dyn LandmarkModel>>,
    expressions: Option<Box<dyn ExpressionModel>>,
    age_gender: Option<Box<dyn AgeGenderModel>>,
}

impl Pipeline {
    pub fn new(detector: Box<dyn FaceDetector>) -> Self {
        Self {
            detector,
            landmarks: None,
            expressions: None,
            age_gender: None,
        }
    }

    pub fn with_landmarks(mut self, model: Box<dyn LandmarkModel>) -> Self {
        self.landmarks = Some(model);
        self
    }

    pub fn with_expressions(mut self, model: Box<dyn ExpressionModel>) -> Self {
        self.expressions = Some(model);
        self
    }

    pub fn with_age_and_gender(mut self, model: Box<dyn AgeGenderModel>) -> Self {
        self.age_gender = Some(model);
        self
    }

    pub fn stages(&self) -> Stages {
        Stages {
            detector: true,
            landmarks: self.landmarks.is_some(),
            expressions: self.expressions.is_some(),
            age_gender: self.age_gender.is_some(),
        }
    }

    /// Find all faces and run the enabled stages on each of them.
    ///
    /// A failing detector fails the whole call. A failing later stage only leaves its fields
    /// of the affected face empty.
    pub fn detect_all_faces(&self, image: &RgbImage) -> Result<Vec<FaceDetection>> {
        let faces = self.detector.detect(image)?;
        log::debug!("Found {} faces in image", faces.len());

        Ok(faces
            .into_iter()
            .map(|(bbox, score)| {
                let mut face = FaceDetection::new(score, bbox);

                if let Some(model) = &self.landmarks {
                    match model.landmarks(image, &bbox) {
                        Ok(landmarks) if landmarks.is_complete() => {
                            face.landmarks = Some(landmarks)
                        }
                        Ok(landmarks) => log::warn!(
                            "Dropping {} landmarks, expected {}",
                            landmarks.points.len(),
                            FaceLandmarks::NUM_POINTS
                        ),
                        Err(e) => log::warn!("Landmark regression failed: {e:#}"),
                    }
                }
                if let Some(model) = &self.expressions {
                    match model.expressions(image, &bbox) {
                        Ok(expressions) => face.expressions = Some(expressions),
                        Err(e) => log::warn!("Expression classification failed: {e:#}"),
                    }
                }
                if let Some(model) = &self.age_gender {
                    match model.age_gender(image, &bbox) {
                        Ok(estimate) => {
                            face.age = Some(estimate.age);
                            face.gender = Some(estimate.gender);
                            face.gender_probability = Some(estimate.gender_probability);
                        }
                        Err(e) => log::warn!("Age and gender estimation failed: {e:#}"),
                    }
                }

                face
            })
            .collect())
    }

    /// Run [`Pipeline::detect_all_faces`] on a blocking thread and hand the image back.
    pub async fn detect_blocking(
        self: Arc<Self>,
        image: RgbImage,
    ) -> Result<(RgbImage, Vec<FaceDetection>)> {
        tokio::task::spawn_blocking(move || {
            let faces = self.detect_all_faces(&image)?;
            Ok((image, faces))
        })
        .await?
    }

    /// Load all models from the store concurrently.
    ///
    /// The face detector is required. Any other model that cannot be provided disables its
    /// stage.
    pub async fn load(store: &ModelStore, options: DetectorOptions) -> Result<Self> {
        let (detector, landmarks, expressions, age_gender) = tokio::join!(
            load_model(store, ModelKind::FaceDetector, move |path| {
                UltrafaceDetector::new(&path, options.max_iou, options.min_confidence)
            }),
            load_model(store, ModelKind::Landmarks, |path| Landmark68Net::new(&path)),
            load_model(store, ModelKind::Expressions, |path| FerPlusNet::new(&path)),
            async {
                let (age_path, gender_path) = tokio::try_join!(
                    store.ensure(ModelKind::Age),
                    store.ensure(ModelKind::Gender)
                )?;
                tokio::task::spawn_blocking(move || AgeGenderNet::new(&age_path, &gender_path))
                    .await?
            },
        );

        let mut pipeline = Pipeline::new(Box::new(detector?));
        match landmarks {
            Ok(model) => pipeline = pipeline.with_landmarks(Box::new(model)),
            Err(e) => log::warn!("Landmarks disabled: {e:#}"),
        }
        match expressions {
            Ok(model) => pipeline = pipeline.with_expressions(Box::new(model)),
            Err(e) => log::warn!("Expressions disabled: {e:#}"),
        }
        match age_gender {
            Ok(model) => pipeline = pipeline.with_age_and_gender(Box::new(model)),
            Err(e) => log::warn!("Age and gender disabled: {e:#}"),
        }

        log::info!("Models loaded successfully: {:?}", pipeline.stages());
        Ok(pipeline)
    }
}

async fn load_model<M, F>(store: &ModelStore, kind: ModelKind, build: F) -> Result<M>
where
    M: Send + 'static,
    F: FnOnce(PathBuf) -> Result<M> + Send + 'static,
{
    let path = store.ensure(kind).await?;
    tokio::task::spawn_blocking(move || build(path)).await?
}

/// Loads the pipeline once, on first use, and shares it afterwards.
///
/// Concurrent first uses wait for the same load. A failed load is attempted again on the
/// next use.
pub struct PipelineLoader {
    store: Option<ModelStore>,
    options: DetectorOptions,
    pipeline: OnceCell<Arc<Pipeline>>,
}

impl PipelineLoader {
    pub fn new(store: ModelStore, options: DetectorOptions) -> Self {
        Self {
            store: Some(store),
            options,
            pipeline: OnceCell::new(),
        }
    }

    /// Loader around an already built pipeline.
    pub fn ready(pipeline: Pipeline) -> Self {
        Self {
            store: None,
            options: DetectorOptions::default(),
            pipeline: OnceCell::new_with(Some(Arc::new(pipeline))),
        }
    }

    pub async fn get(&self) -> Result<Arc<Pipeline>> {
        let pipeline = self
            .pipeline
            .get_or_try_init(|| async {
                let store = self
                    .store
                    .as_ref()
                    .ok_or_else(|| anyhow::anyhow!("no model store configured"))?;
                log::info!("Loading models from {}", store.dir().display());
                match Pipeline::load(store, self.options).await {
                    Ok(pipeline) => Ok(Arc::new(pipeline)),
                    Err(e) => {
                        log::error!("Failed to load models: {e:#}");
                        Err(e)
                    }
                }
            })
            .await?;

        Ok(Arc::clone(pipeline))
    }
}
