//! Model files of the detection pipeline.
//!
//! Models live in a models directory. Missing files are fetched from the ONNX model zoo on
//! first use unless the store is offline.
use std::{
    fmt,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use reqwest::Client;

use crate::utils::download_file;

const ONNX_ZOO: &str = "https://github.com/onnx/models/raw/main/validated/vision/body_analysis";

/// Models used by the pipeline.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ModelKind {
    FaceDetector,
    Landmarks,
    Expressions,
    Age,
    Gender,
}

impl ModelKind {
    pub const ALL: [ModelKind; 5] = [
        ModelKind::FaceDetector,
        ModelKind::Landmarks,
        ModelKind::Expressions,
        ModelKind::Age,
        ModelKind::Gender,
    ];

    pub fn file_name(&self) -> &'static str {
        match self {
            ModelKind::FaceDetector => "version-RFB-320.onnx",
            ModelKind::Landmarks => "landmarks-68.onnx",
            ModelKind::Expressions => "emotion-ferplus-8.onnx",
            ModelKind::Age => "age_googlenet.onnx",
            ModelKind::Gender => "gender_googlenet.onnx",
        }
    }

    /// Where to get the model from if it is not available locally.
    ///
    /// The landmark model is not part of the model zoo. It is the PFLD 68-point regressor
    /// trained on 300W, exported to ONNX; see [`crate::nn::Landmark68Net`] for its contract.
    /// Its location is configured with `--landmarks-url` or by placing the file.
    pub fn default_url(&self) -> Option<String> {
        match self {
            ModelKind::FaceDetector => Some(format!(
                "{ONNX_ZOO}/ultraface/models/{}",
                self.file_name()
            )),
            ModelKind::Landmarks => None,
            ModelKind::Expressions => Some(format!(
                "{ONNX_ZOO}/emotion_ferplus/model/{}",
                self.file_name()
            )),
            ModelKind::Age | ModelKind::Gender => Some(format!(
                "{ONNX_ZOO}/age_gender/models/{}",
                self.file_name()
            )),
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModelKind::FaceDetector => "face detector",
            ModelKind::Landmarks => "landmark model",
            ModelKind::Expressions => "expression model",
            ModelKind::Age => "age model",
            ModelKind::Gender => "gender model",
        };
        f.write_str(name)
    }
}

/// Default location of the models directory.
pub fn default_models_dir() -> PathBuf {
    dirs::cache_dir()
        .map(|dir| dir.join("facecam").join("models"))
        .unwrap_or_else(|| PathBuf::from("models"))
}

/// Local model directory with optional download of missing files.
#[derive(Clone, Debug)]
pub struct ModelStore {
    dir: PathBuf,
    offline: bool,
    landmarks_url: Option<String>,
    client: Client,
}

impl ModelStore {
    pub fn new(dir: impl Into<PathBuf>, offline: bool, landmarks_url: Option<String>) -> Self {
        Self {
            dir: dir.into(),
            offline,
            landmarks_url,
            client: Client::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, kind: ModelKind) -> PathBuf {
        self.dir.join(kind.file_name())
    }

    pub fn url(&self, kind: ModelKind) -> Option<String> {
        match kind {
            ModelKind::Landmarks => self.landmarks_url.clone(),
            _ => kind.default_url(),
        }
    }

    /// Make sure the model file exists locally and return its path.
    pub async fn ensure(&self, kind: ModelKind) -> Result<PathBuf> {
        let path = self.path(kind);
        if path.exists() {
            return Ok(path);
        }

        if self.offline {
            bail!("{} not found at {} (offline)", kind, path.display());
        }
        let url = self.url(kind).with_context(|| {
            format!(
                "{} not found at {} and no download URL is configured",
                kind,
                path.display()
            )
        })?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("failed to create {}", self.dir.display()))?;

        log::info!("Downloading {} from {}", kind, &url);
        download_file(&self.client, &url, &path)
            .await
            .with_context(|| format!("failed to download {kind} from {url}"))?;
        log::info!("Stored {} at {}", kind, path.display());

        Ok(path)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_every_model_has_a_distinct_file() {
        let mut names: Vec<_> = ModelKind::ALL.iter().map(|kind| kind.file_name()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), ModelKind::ALL.len());
    }

    #[test]
    fn test_urls() {
        let store = ModelStore::new("models", false, None);
        assert!(store
            .url(ModelKind::FaceDetector)
            .unwrap()
            .ends_with("/ultraface/models/version-RFB-320.onnx"));
        assert_eq!(store.url(ModelKind::Landmarks), None);

        let store = ModelStore::new("models", false, Some("http://localhost/lm.onnx".into()));
        assert_eq!(
            store.url(ModelKind::Landmarks).as_deref(),
            Some("http://localhost/lm.onnx")
        );
    }

    #[tokio::test]
    async fn test_existing_file_is_used() -> Result<()> {
        let dir = tempfile::TempDir::new()?;
        std::fs::write(dir.path().join(ModelKind::Expressions.file_name()), b"onnx")?;

        let store = ModelStore::new(dir.path(), true, None);
        let path = store.ensure(ModelKind::Expressions).await?;
        assert_eq!(path, dir.path().join("emotion-ferplus-8.onnx"));
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_file_offline_or_without_url() -> Result<()> {
        let dir = tempfile::TempDir::new()?;

        let offline = ModelStore::new(dir.path(), true, None);
        let err = offline.ensure(ModelKind::Age).await.unwrap_err();
        assert!(err.to_string().contains("offline"));

        let online = ModelStore::new(dir.path(), false, None);
        let err = online.ensure(ModelKind::Landmarks).await.unwrap_err();
        assert!(err.to_string().contains("no download URL"));
        Ok(())
    }
}
