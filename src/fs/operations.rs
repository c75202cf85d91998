use std::path::Path;

use anyhow::{Context, Result};
use fs4::tokio::AsyncFileExt;
use serde::{de::DeserializeOwned, Serialize};
use tokio::{
    fs::File,
    io::{AsyncRead, AsyncReadExt, AsyncSeekExt, AsyncWriteExt},
};
use tracing::trace;

/// Reads a whole JSON document. A missing or empty file is an empty document.
pub async fn read_document<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    let mut file = match File::open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(T::default()),
        Err(e) => return Err(e.into()),
    };
    file.lock_shared()?;
    let result = parse_document(&mut file, path).await;
    file.unlock_async().await?;
    result
}

/// Read-modify-write of a JSON document under an exclusive lock, so that the cli and the daemon
/// can't interleave their writes. `change` returns whatever the caller needs back.
pub async fn update_document<T, R>(path: &Path, change: impl FnOnce(&mut T) -> R) -> Result<R>
where
    T: DeserializeOwned + Serialize + Default,
{
    let mut file = File::options()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .await?;

    // Semi-safe acquire-release for a file
    file.lock_exclusive()?;
    let result = rewrite_document(&mut file, path, change).await;
    file.unlock_async().await?;
    result
}

async fn parse_document<T: DeserializeOwned + Default>(
    file: &mut (impl AsyncRead + Unpin),
    path: &Path,
) -> Result<T> {
    let mut content = String::new();
    file.read_to_string(&mut content).await?;
    if content.trim().is_empty() {
        return Ok(T::default());
    }
    serde_json::from_str(&content).with_context(|| format!("Document {path:?} is corrupted"))
}

async fn rewrite_document<T, R>(
    file: &mut File,
    path: &Path,
    change: impl FnOnce(&mut T) -> R,
) -> Result<R>
where
    T: DeserializeOwned + Serialize + Default,
{
    let mut document: T = parse_document(&mut *file, path).await?;
    let result = change(&mut document);

    let buffer = serde_json::to_vec_pretty(&document)?;
    file.rewind().await?;
    file.set_len(0).await?;
    file.write_all(&buffer).await?;
    file.flush().await?;
    file.sync_data().await?;
    trace!("Rewrote {path:?} with {} bytes", buffer.len());
    Ok(result)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use anyhow::Result;
    use tempfile::tempdir;

    use crate::fs::operations::{read_document, update_document};

    #[tokio::test]
    async fn test_missing_document_is_empty() -> Result<()> {
        let dir = tempdir()?;
        let document: BTreeMap<String, u32> = read_document(&dir.path().join("nothing")).await?;
        assert!(document.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_update_document_persists() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("doc.json");

        let previous = update_document(&path, |doc: &mut BTreeMap<String, u32>| {
            doc.insert("a".into(), 1)
        })
        .await?;
        assert_eq!(previous, None);

        let previous = update_document(&path, |doc: &mut BTreeMap<String, u32>| {
            doc.insert("a".into(), 2)
        })
        .await?;
        assert_eq!(previous, Some(1));

        update_document(&path, |doc: &mut BTreeMap<String, u32>| {
            doc.insert("b".into(), 3);
        })
        .await?;

        let document: BTreeMap<String, u32> = read_document(&path).await?;
        assert_eq!(
            document,
            BTreeMap::from([("a".to_string(), 2), ("b".to_string(), 3)])
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_shrinking_document_leaves_no_tail() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("doc.json");

        update_document(&path, |doc: &mut BTreeMap<String, String>| {
            doc.insert("long".into(), "x".repeat(100));
        })
        .await?;
        update_document(&path, |doc: &mut BTreeMap<String, String>| {
            doc.clear();
        })
        .await?;

        let document: BTreeMap<String, String> = read_document(&path).await?;
        assert!(document.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_corrupted_document_is_an_error() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("doc.json");
        tokio::fs::write(&path, "{ not json").await?;

        let result: Result<BTreeMap<String, u32>> = read_document(&path).await;
        assert!(result.is_err());

        let result = update_document(&path, |doc: &mut BTreeMap<String, u32>| doc.len()).await;
        assert!(result.is_err());
        assert_eq!(tokio::fs::read_to_string(&path).await?, "{ not json");
        Ok(())
    }
}
