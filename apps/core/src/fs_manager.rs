use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// On-disk layout rooted at the data directory.
///
/// ```text
/// data/
///   db/faqdesk.sqlite
///   vectors/          LanceDB FAQ table
///   embeddings/       fastembed model cache
/// ```
#[derive(Debug, Clone)]
pub struct PortablePathManager {
    data_dir: PathBuf,
}

impl PortablePathManager {
    /// Uses `data_dir` when given, otherwise `./data` next to the executable.
    pub fn new(data_dir: Option<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.unwrap_or_else(|| Self::root_dir().join("data")),
        }
    }

    /// Directory holding the executable, or the working directory when unknown.
    pub fn root_dir() -> PathBuf {
        match std::env::current_exe() {
            Ok(mut path) => {
                path.pop();
                path
            }
            Err(e) => {
                error!("Failed to get current exe path: {}. Falling back to current_dir.", e);
                std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
            }
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn db_dir(&self) -> PathBuf {
        self.data_dir.join("db")
    }

    pub fn db_path(&self) -> PathBuf {
        self.db_dir().join("faqdesk.sqlite")
    }

    pub fn vectors_dir(&self) -> PathBuf {
        self.data_dir.join("vectors")
    }

    pub fn embeddings_dir(&self) -> PathBuf {
        self.data_dir.join("embeddings")
    }

    /// Creates every directory of the layout that does not exist yet.
    pub fn init(&self) -> Result<(), std::io::Error> {
        for dir in [self.data_dir.clone(), self.db_dir(), self.vectors_dir(), self.embeddings_dir()] {
            if !dir.exists() {
                info!("Creating directory: {:?}", dir);
                fs::create_dir_all(&dir)?;
            }
        }
        Ok(())
    }
}
