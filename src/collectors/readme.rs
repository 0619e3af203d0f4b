//! Project README contents.

use std::path::{Path, PathBuf};

use serde_json::json;
use tracing::{debug, warn};

use crate::collectors::{BlockingCollector, CollectorArgs, fragment_of};
use crate::context::Fragment;
use crate::error::CollectorError;

const CANDIDATES: &[&str] = &["README.md", "README.rst"];

pub struct ReadmeCollector {
    root: PathBuf,
}

impl ReadmeCollector {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Option `root` overrides the working directory.
    pub fn from_args(args: &CollectorArgs) -> Result<Self, CollectorError> {
        let root = args
            .options()
            .string("root")?
            .map(PathBuf::from)
            .unwrap_or_else(|| args.workdir.clone());
        Ok(Self::new(root))
    }

    fn read_first(&self) -> Option<String> {
        CANDIDATES.iter().find_map(|name| read_candidate(&self.root.join(name)))
    }
}

fn read_candidate(path: &Path) -> Option<String> {
    if !path.is_file() {
        return None;
    }
    match std::fs::read_to_string(path) {
        Ok(content) => {
            debug!("Read {}", path.display());
            Some(content)
        }
        Err(e) => {
            warn!("Could not read {}: {}", path.display(), e);
            None
        }
    }
}

impl BlockingCollector for ReadmeCollector {
    fn collect(&self) -> Result<Fragment, CollectorError> {
        let readme = self.read_first().unwrap_or_default();
        Ok(fragment_of("readme", json!(readme)))
    }
}
