//! Hosting of a pre-built single-page application bundle.
//!
use std::path::{Path, PathBuf};

use tower_http::services::{ServeDir, ServeFile};

const INDEX: &str = "index.html";

/// A UI bundle directory containing an `index.html`.
#[derive(Clone, Debug)]
pub struct SpaBundle {
    dir: PathBuf,
}

impl SpaBundle {
    /// Use `dir` as bundle if it holds an `index.html`.
    pub fn detect(dir: impl AsRef<Path>) -> Option<Self> {
        let dir = dir.as_ref();
        if dir.join(INDEX).is_file() {
            Some(Self {
                dir: dir.to_path_buf(),
            })
        } else {
            None
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn index(&self) -> PathBuf {
        self.dir.join(INDEX)
    }

    /// Serve files of the bundle. Paths without a file get the `index.html` with status 200.
    pub fn service(&self) -> ServeDir<ServeFile> {
        ServeDir::new(&self.dir)
            .append_index_html_on_directories(true)
            .fallback(ServeFile::new(self.index()))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_detect_requires_index() -> std::io::Result<()> {
        let scratch = tempfile::TempDir::new()?;
        let dir = scratch.path();
        assert!(SpaBundle::detect(dir).is_none());

        std::fs::write(dir.join(INDEX), "<html></html>")?;
        let bundle = SpaBundle::detect(dir).unwrap();
        assert_eq!(bundle.index(), dir.join("index.html"));

        assert!(SpaBundle::detect("/does/not/exist").is_none());
        Ok(())
    }
}
