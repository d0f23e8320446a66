//! Loading batches from manifest files.
//!
//! JSON manifests are either an array of items or an object with `items`
//! and an optional `max_concurrency`. Each item is one command string or a
//! list of them. Any other file is read as plain text: blocks separated by
//! blank lines, one command per line, `#` starting a comment line.

use crate::domain::{Batch, WorkItem};
use crate::error::{ManifestError, ManifestResult};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ItemSpec {
    One(String),
    Many(Vec<String>),
}

impl ItemSpec {
    fn into_work_item(self) -> WorkItem {
        match self {
            ItemSpec::One(command) => WorkItem::single(command),
            ItemSpec::Many(commands) => commands.into_iter().collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ManifestFile {
    Items(Vec<ItemSpec>),
    Document {
        #[serde(default)]
        max_concurrency: Option<usize>,
        items: Vec<ItemSpec>,
    },
}

/// A batch loaded from disk
#[derive(Debug, Clone)]
pub struct Manifest {
    pub path: PathBuf,
    pub batch: Batch,
    /// Concurrency requested by the file itself
    pub max_concurrency: Option<usize>,
}

impl Manifest {
    /// Load a manifest, choosing the format from the file extension
    pub fn load(path: &Path) -> ManifestResult<Self> {
        if !path.exists() {
            return Err(ManifestError::NotFound(path.to_path_buf()));
        }
        let content = fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        let manifest = if is_json {
            Self::parse_json(path, &content)?
        } else {
            Self::parse_text(path, &content)
        };
        tracing::debug!(
            path = %path.display(),
            items = manifest.batch.len(),
            "loaded manifest"
        );
        Ok(manifest)
    }

    pub fn parse_json(path: &Path, content: &str) -> ManifestResult<Self> {
        let file: ManifestFile =
            serde_json::from_str(content).map_err(|e| ManifestError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        let (max_concurrency, items) = match file {
            ManifestFile::Items(items) => (None, items),
            ManifestFile::Document {
                max_concurrency,
                items,
            } => (max_concurrency, items),
        };
        if max_concurrency == Some(0) {
            return Err(ManifestError::ZeroConcurrency(path.to_path_buf()));
        }

        Ok(Self {
            path: path.to_path_buf(),
            batch: items.into_iter().map(ItemSpec::into_work_item).collect(),
            max_concurrency,
        })
    }

    pub fn parse_text(path: &Path, content: &str) -> Self {
        let mut batch = Batch::default();
        let mut current: Vec<String> = Vec::new();

        for line in content.lines().map(str::trim) {
            if line.is_empty() {
                if !current.is_empty() {
                    batch.push(std::mem::take(&mut current).into_iter().collect());
                }
            } else if !line.starts_with('#') {
                current.push(line.to_string());
            }
        }
        if !current.is_empty() {
            batch.push(current.into_iter().collect());
        }

        Self {
            path: path.to_path_buf(),
            batch,
            max_concurrency: None,
        }
    }
}
