/*!
 * Artifact storage for document bytes.
 *
 * Input and output documents are kept outside the job record and referenced
 * by content address. The filesystem implementation hashes the bytes with
 * SHA-256 and files them under a two-level directory layout; writes go
 * through a temp file and an atomic rename so a crashed worker never leaves
 * a partial artifact behind.
 */

use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use log::debug;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Content-addressed reference to a stored artifact
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactRef(pub String);

impl std::fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Byte store for input and output documents
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store bytes, returning their content address
    async fn put(&self, bytes: Bytes) -> Result<ArtifactRef>;

    /// Fetch the bytes behind a reference
    async fn get(&self, artifact: &ArtifactRef) -> Result<Bytes>;

    /// Remove the bytes behind a reference, if present
    async fn delete(&self, artifact: &ArtifactRef) -> Result<()>;
}

/// Filesystem-backed, content-addressed artifact store
#[derive(Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    /// Create a store rooted at the given directory, creating it if needed
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create artifact directory: {:?}", root))?;
        Ok(Self { root })
    }

    fn path_for(&self, artifact: &ArtifactRef) -> PathBuf {
        // Two-level fanout keeps directories small.
        let (prefix, rest) = artifact.0.split_at(2.min(artifact.0.len()));
        self.root.join(prefix).join(rest)
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn put(&self, bytes: Bytes) -> Result<ArtifactRef> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || {
            let digest = Sha256::digest(&bytes);
            let artifact = ArtifactRef(format!("{:x}", digest));

            let (prefix, rest) = artifact.0.split_at(2);
            let dir = root.join(prefix);
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create artifact shard: {:?}", dir))?;

            let path = dir.join(rest);
            if !path.exists() {
                let mut tmp = tempfile::NamedTempFile::new_in(&root)
                    .context("Failed to create temp artifact file")?;
                std::io::Write::write_all(&mut tmp, &bytes)
                    .context("Failed to write artifact bytes")?;
                tmp.persist(&path)
                    .with_context(|| format!("Failed to persist artifact: {:?}", path))?;
                debug!("stored artifact {} ({} bytes)", artifact, bytes.len());
            }

            Ok(artifact)
        })
        .await
        .context("artifact write task panicked")?
    }

    async fn get(&self, artifact: &ArtifactRef) -> Result<Bytes> {
        let path = self.path_for(artifact);
        let bytes = tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read artifact: {}", artifact))?;
        Ok(Bytes::from(bytes))
    }

    async fn delete(&self, artifact: &ArtifactRef) -> Result<()> {
        let path = self.path_for(artifact);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to delete artifact: {}", artifact)),
        }
    }
}
