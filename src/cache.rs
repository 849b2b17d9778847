// Keeps compressed layer blobs in a size-bounded LRU cache on disk so slow
// layers (remote, freshly built) are only drained once.
//
// Blobs are plain files named by digest hex; recency is tracked in memory
// and seeded from file mtimes when the cache is opened.
use crate::error::{Error, Result};
use crate::hash::{Hash, HashAndWrite};
use crate::layer::{Layer, Stream};
use crate::media_type::MediaType;
use lru::LruCache;
use std::fs::{self, File};
use std::io::{self, BufReader, Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

fn cache_err(e: io::Error) -> Error {
    Error::Cache(e.to_string())
}

/// A directory of blobs holding at most `capacity` bytes. Least recently
/// used blobs are deleted to make room.
pub struct DiskCache {
    root: PathBuf,
    capacity: u64,
    size: u64,
    lru: LruCache<String, u64>,
}

impl DiskCache {
    /// Opens (or creates) `root`, picking up blobs left by earlier runs.
    pub fn new(root: &Path, capacity: u64) -> Result<DiskCache> {
        fs::create_dir_all(root).map_err(cache_err)?;
        let mut existing = Vec::new();
        for entry in fs::read_dir(root).map_err(cache_err)? {
            let entry = entry.map_err(cache_err)?;
            let meta = entry.metadata().map_err(cache_err)?;
            let name = entry.file_name().to_string_lossy().into_owned();
            // skip anything that isn't a finished blob, e.g. staging files
            if !meta.is_file() || name.starts_with('.') {
                continue;
            }
            let mtime = meta.modified().map_err(cache_err)?;
            existing.push((mtime, name, meta.len()));
        }
        existing.sort();

        let mut cache = DiskCache {
            root: root.to_path_buf(),
            capacity,
            size: 0,
            lru: LruCache::unbounded(),
        };
        for (_, name, len) in existing {
            cache.size += len;
            cache.lru.put(name, len);
        }
        cache.evict_to(capacity)?;
        debug!("opened cache {:?} with {} blobs, {} bytes", root, cache.len(), cache.size);
        Ok(cache)
    }

    pub fn len(&self) -> usize {
        self.lru.len()
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lru.contains(key)
    }

    /// Opens the blob for `key` and marks it as recently used. A blob whose
    /// file has gone away is forgotten and reported as a miss.
    pub fn get(&mut self, key: &str) -> Option<File> {
        self.lru.get(key)?;
        match File::open(self.root.join(key)) {
            Ok(file) => Some(file),
            Err(e) => {
                warn!("dropping cache entry {}: {}", key, e);
                self.forget(key);
                None
            }
        }
    }

    /// Stores `bytes` under `key`. The file is written aside and renamed into
    /// place, so readers of a previous copy are not disturbed.
    pub fn insert(&mut self, key: &str, bytes: &[u8]) -> Result<()> {
        let len = bytes.len() as u64;
        if len > self.capacity {
            return Err(Error::Cache(format!(
                "blob of {} bytes exceeds cache capacity of {}",
                len, self.capacity
            )));
        }
        self.forget(key);
        self.evict_to(self.capacity - len)?;

        let mut staging = tempfile::NamedTempFile::new_in(&self.root).map_err(cache_err)?;
        staging.write_all(bytes).map_err(cache_err)?;
        staging
            .persist(self.root.join(key))
            .map_err(|e| cache_err(e.error))?;
        self.lru.put(key.to_string(), len);
        self.size += len;
        Ok(())
    }

    fn forget(&mut self, key: &str) {
        if let Some(len) = self.lru.pop(key) {
            self.size -= len;
        }
    }

    fn evict_to(&mut self, limit: u64) -> Result<()> {
        while self.size > limit {
            let (key, len) = match self.lru.pop_lru() {
                Some(oldest) => oldest,
                None => break,
            };
            debug!("evicting {} ({} bytes)", key, len);
            self.size -= len;
            match fs::remove_file(self.root.join(&key)) {
                Err(ref e) if e.kind() == io::ErrorKind::NotFound => {}
                other => other.map_err(cache_err)?,
            }
        }
        Ok(())
    }
}

pub type SharedCache = Arc<Mutex<DiskCache>>;

/// Opens (or creates) a cache directory holding at most `max_bytes`.
pub fn layer_cache(dir: &Path, max_bytes: u64) -> Result<SharedCache> {
    Ok(Arc::new(Mutex::new(DiskCache::new(dir, max_bytes)?)))
}

fn lock(cache: &SharedCache) -> MutexGuard<'_, DiskCache> {
    cache.lock().unwrap_or_else(|e| e.into_inner())
}

/// Wraps another layer and serves its compressed stream from the cache.
/// Blobs are checked against the inner digest and size before they are
/// admitted, so a hit can be trusted.
pub struct CachedLayer {
    inner: Arc<dyn Layer>,
    cache: SharedCache,
}

impl CachedLayer {
    pub fn new(inner: Arc<dyn Layer>, cache: SharedCache) -> CachedLayer {
        CachedLayer { inner, cache }
    }

    pub fn is_cached(&self) -> Result<bool> {
        let key = self.inner.digest()?.hex();
        Ok(lock(&self.cache).contains(&key))
    }

    fn fill(&self, digest: Hash) -> Result<Vec<u8>> {
        info!("caching layer {}", digest);
        let mut haw = HashAndWrite::new(Vec::new());
        io::copy(&mut self.inner.compressed()?, &mut haw).map_err(Error::HashComputationFailed)?;
        let (blob, actual, size) = haw.finish();
        if actual != digest {
            return Err(Error::DigestMismatch {
                expected: digest,
                actual,
            });
        }
        let expected = self.inner.size()?;
        if size != expected {
            return Err(Error::SizeMismatch {
                expected,
                actual: size,
            });
        }
        Ok(blob)
    }
}

impl Layer for CachedLayer {
    fn digest(&self) -> Result<Hash> {
        self.inner.digest()
    }

    fn diff_id(&self) -> Result<Hash> {
        self.inner.diff_id()
    }

    fn compressed(&self) -> Result<Stream> {
        let digest = self.inner.digest()?;
        let key = digest.hex();

        if let Some(file) = lock(&self.cache).get(&key) {
            debug!("cache hit for {}", digest);
            return Ok(Box::new(BufReader::new(file)));
        }

        // the lock isn't held while the inner layer is drained
        let blob = self.fill(digest)?;
        lock(&self.cache).insert(&key, &blob)?;
        Ok(Box::new(Cursor::new(blob)))
    }

    fn uncompressed(&self) -> Result<Stream> {
        self.inner.uncompressed()
    }

    fn size(&self) -> Result<u64> {
        self.inner.size()
    }

    fn media_type(&self) -> Result<MediaType> {
        self.inner.media_type()
    }
}
