use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;

use crate::error::Result;

/// Named-object storage. `put` replaces the whole object.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, body: Vec<u8>) -> Result<()>;
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
}

/// Blobs as files under one directory. Writes go to a temp file that is renamed
/// over the target, so readers see either the old or the new object.
pub struct FsBlobStore {
    dir: PathBuf,
}

impl FsBlobStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, key: &str, body: Vec<u8>) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let target = self.dir.join(key);
        let tmp = self.dir.join(format!(".{key}.tmp"));
        let len = body.len();
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &target).await?;
        debug!(path = %target.display(), bytes = len, "Blob written");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.dir.join(key)).await {
            Ok(body) => Ok(Some(body)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("blob-{name}-{}", std::process::id()))
    }

    #[tokio::test]
    async fn put_overwrites_and_get_reads_back() {
        let dir = temp_dir("overwrite");
        let store = FsBlobStore::new(&dir);

        assert_eq!(store.get("markets.json").await.unwrap(), None);
        store.put("markets.json", b"first".to_vec()).await.unwrap();
        store.put("markets.json", b"second".to_vec()).await.unwrap();
        assert_eq!(store.get("markets.json").await.unwrap().as_deref(), Some(&b"second"[..]));
        assert!(!dir.join(".markets.json.tmp").exists());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
