//! On-disk snapshots of the document store and vector index
//!
//! Layout inside the snapshot directory:
//! - `documents.json`   every ingested document, in ingestion order
//! - `documents.sha256` hex SHA-256 of `documents.json`
//! - `index.json`       embedding model, dimension and flat index rows
//!   (only when the index was built)
//!
//! Every file is written to a `.tmp` sibling and renamed into place.

use super::index::FlatL2Index;
use super::Document;
use crate::error::AssistantError;
use crate::Result;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const DOCUMENTS_FILE: &str = "documents.json";
const CHECKSUM_FILE: &str = "documents.sha256";
const INDEX_FILE: &str = "index.json";

pub struct Snapshot {
    pub documents: Vec<Document>,
    pub index: Option<FlatL2Index>,
}

/// Index as persisted, tagged with the model that produced its rows
#[derive(Debug, Serialize, Deserialize)]
struct IndexFile {
    model: String,
    dimension: usize,
    index: FlatL2Index,
}

pub fn checksum(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

pub fn exists(dir: &Path) -> bool {
    dir.join(DOCUMENTS_FILE).is_file()
}

fn temp_path(path: &Path) -> Result<PathBuf> {
    let name = path
        .file_name()
        .ok_or_else(|| AssistantError::SnapshotError(format!("invalid path {}", path.display())))?;
    let mut tmp = name.to_os_string();
    tmp.push(".tmp");
    Ok(path.with_file_name(tmp))
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = temp_path(path)?;
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

/// Persist documents and, when given, the index built by `model`
pub async fn write(
    dir: &Path,
    documents: &[Document],
    index: Option<(&str, &FlatL2Index)>,
) -> Result<()> {
    tokio::fs::create_dir_all(dir).await?;

    let bytes = serde_json::to_vec_pretty(documents)?;
    write_atomic(&dir.join(DOCUMENTS_FILE), &bytes).await?;
    write_atomic(&dir.join(CHECKSUM_FILE), checksum(&bytes).as_bytes()).await?;

    let index_path = dir.join(INDEX_FILE);
    match index {
        Some((model, index)) => {
            let file = IndexFile {
                model: model.to_string(),
                dimension: index.dimension(),
                index: index.clone(),
            };
            write_atomic(&index_path, &serde_json::to_vec(&file)?).await?;
        }
        None => {
            // a stale index from an earlier save would no longer line up
            if tokio::fs::try_exists(&index_path).await? {
                tokio::fs::remove_file(&index_path).await?;
            }
        }
    }

    info!(
        dir = %dir.display(),
        documents = documents.len(),
        indexed = index.map(|(_, i)| i.len()).unwrap_or(0),
        "Snapshot written"
    );
    Ok(())
}

/// Load a snapshot. The index is kept only when it was built by `model`,
/// its rows have the recorded dimension and it covers every document.
pub async fn read(dir: &Path, model: Option<&str>) -> Result<Snapshot> {
    let bytes = tokio::fs::read(dir.join(DOCUMENTS_FILE)).await?;

    let checksum_path = dir.join(CHECKSUM_FILE);
    if tokio::fs::try_exists(&checksum_path).await? {
        let expected = tokio::fs::read_to_string(&checksum_path).await?;
        let actual = checksum(&bytes);
        if expected.trim() != actual {
            return Err(AssistantError::SnapshotError(format!(
                "checksum mismatch for {}: expected {}, found {}",
                DOCUMENTS_FILE,
                expected.trim(),
                actual
            )));
        }
    } else {
        warn!(dir = %dir.display(), "Snapshot has no checksum file, skipping verification");
    }

    let documents: Vec<Document> = serde_json::from_slice(&bytes)?;

    let index_path = dir.join(INDEX_FILE);
    let has_index = tokio::fs::try_exists(&index_path).await?;
    let index = match model {
        Some(model) if has_index => {
            let raw = tokio::fs::read(&index_path).await?;
            match serde_json::from_slice::<IndexFile>(&raw) {
                Ok(file) => usable_index(file, model, documents.len()),
                Err(e) => {
                    warn!("Unreadable snapshot index, it will be rebuilt: {}", e);
                    None
                }
            }
        }
        _ => None,
    };

    Ok(Snapshot { documents, index })
}

fn usable_index(file: IndexFile, model: &str, documents: usize) -> Option<FlatL2Index> {
    if file.model != model {
        warn!(
            saved = %file.model,
            current = model,
            "Snapshot index was built by another embedding model, it will be rebuilt"
        );
        return None;
    }
    if file.index.dimension() != file.dimension {
        warn!(
            recorded = file.dimension,
            actual = file.index.dimension(),
            "Snapshot index dimension is inconsistent, it will be rebuilt"
        );
        return None;
    }
    if file.index.len() != documents {
        warn!(
            rows = file.index.len(),
            documents,
            "Snapshot index does not match documents, it will be rebuilt"
        );
        return None;
    }
    Some(file.index)
}
