use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::canonical::canonical_key_for;
use crate::error::DigestError;
use crate::model::FileDigest;

/// Read size used while hashing.
const CHUNK_SIZE: usize = 8192;

/// Computes content digests for local files.
#[async_trait]
pub trait Digester: Send + Sync {
    async fn digest(&self, path: &Path) -> Result<FileDigest, DigestError>;
}

/// MD5 digester. Hashing runs on the blocking pool so large files do not
/// stall the ingestion task's runtime thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct Md5Digester;

#[async_trait]
impl Digester for Md5Digester {
    async fn digest(&self, path: &Path) -> Result<FileDigest, DigestError> {
        let owned: PathBuf = path.to_path_buf();
        tokio::task::spawn_blocking(move || digest_file(&owned))
            .await
            .map_err(|err| DigestError::Io {
                path: path.to_path_buf(),
                source: std::io::Error::other(err),
            })?
    }
}

/// Hash a file synchronously in fixed-size chunks.
pub fn digest_file(path: &Path) -> Result<FileDigest, DigestError> {
    let mut file = File::open(path).map_err(|e| DigestError::from_io(path.to_path_buf(), e))?;
    let metadata = file
        .metadata()
        .map_err(|e| DigestError::from_io(path.to_path_buf(), e))?;
    if metadata.is_dir() {
        return Err(DigestError::Io {
            path: path.to_path_buf(),
            source: std::io::Error::other("is a directory"),
        });
    }

    let mut context = md5::Context::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut size_bytes = 0u64;
    loop {
        let read = file
            .read(&mut buf)
            .map_err(|e| DigestError::from_io(path.to_path_buf(), e))?;
        if read == 0 {
            break;
        }
        context.consume(&buf[..read]);
        size_bytes += read as u64;
    }

    Ok(FileDigest {
        canonical_key: canonical_key_for(path),
        content_hash: context.compute().0,
        size_bytes,
    })
}

/// Derives a digest from the path itself, without touching the filesystem.
#[cfg(test)]
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct PathDigester;

#[cfg(test)]
#[async_trait]
impl Digester for PathDigester {
    async fn digest(&self, path: &Path) -> Result<FileDigest, DigestError> {
        let text = path.to_string_lossy();
        Ok(FileDigest {
            canonical_key: canonical_key_for(path),
            content_hash: md5::compute(text.as_bytes()).0,
            size_bytes: text.len() as u64,
        })
    }
}
