use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use error_stack::{Report, ResultExt};
use futures::future::BoxFuture;
use tracing::{debug, warn};

use crate::cache::BarCache;
use crate::config::CacheConfig;
use crate::error::CacheError;
use crate::model::Bar;

/// One JSON file per key under `dir`; freshness is the file's modification age.
///
/// Expired files are left on disk and overwritten by the next `put`.
#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
    ttl: Duration,
}

impl FileCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            dir: PathBuf::from(&config.dir),
            ttl: config.ttl(),
        }
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(key)))
    }

    async fn read_fresh(&self, key: &str) -> Result<Option<Vec<Bar>>, Report<CacheError>> {
        let path = self.entry_path(key);
        let metadata = match tokio::fs::metadata(&path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(Report::new(e)
                    .change_context(CacheError::Io)
                    .attach(format!("path: {}", path.display())));
            }
        };

        let modified = metadata.modified().change_context(CacheError::Io)?;
        let age = SystemTime::now()
            .duration_since(modified)
            .unwrap_or_default();
        if age >= self.ttl {
            debug!(key, age_secs = age.as_secs(), "cache entry expired");
            return Ok(None);
        }

        let body = tokio::fs::read(&path)
            .await
            .change_context(CacheError::Io)
            .attach_with(|| format!("path: {}", path.display()))?;
        let bars = serde_json::from_slice(&body)
            .change_context(CacheError::Decode)
            .attach_with(|| format!("path: {}", path.display()))?;
        Ok(Some(bars))
    }

    async fn write(&self, key: &str, bars: &[Bar]) -> Result<(), Report<CacheError>> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .change_context(CacheError::Io)
            .attach_with(|| format!("dir: {}", self.dir.display()))?;

        let path = self.entry_path(key);
        let body = serde_json::to_vec(bars).change_context(CacheError::Encode)?;
        tokio::fs::write(&path, body)
            .await
            .change_context(CacheError::Io)
            .attach_with(|| format!("path: {}", path.display()))?;
        Ok(())
    }
}

/// Injective file-name encoding of a cache key.
///
/// `[A-Za-z0-9.-]` pass through, `_` becomes `__` and every other byte
/// becomes `_XX` (uppercase hex), so distinct keys never share a file.
fn file_stem(key: &str) -> String {
    let mut stem = String::with_capacity(key.len());
    for byte in key.bytes() {
        match byte {
            b'_' => stem.push_str("__"),
            b if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.') => stem.push(char::from(b)),
            b => stem.push_str(&format!("_{b:02X}")),
        }
    }
    stem
}

impl BarCache for FileCache {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Option<Vec<Bar>>> {
        Box::pin(async move {
            match self.read_fresh(key).await {
                Ok(hit) => hit,
                Err(e) => {
                    debug!(key, error = ?e, "cache read failed, treating as miss");
                    None
                }
            }
        })
    }

    fn put<'a>(&'a self, key: &'a str, bars: &'a [Bar]) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            if let Err(e) = self.write(key, bars).await {
                warn!(key, error = ?e, "cache write failed");
            }
        })
    }
}
