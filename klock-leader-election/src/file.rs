//! File-backed lease store
//!
//! Each lease is a JSON document at `<root>/<namespace>/<name>.json`. Every
//! request holds an exclusive `flock` on `<root>/<namespace>/.<name>.lock`
//! for the duration of its read-modify-write, so processes sharing the root
//! directory (on one host, or on a shared filesystem with working advisory
//! locks) see a single-writer store.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use fs2::FileExt;
use ulid::Ulid;

use crate::client::{conflict, not_found, prepare_create, prepare_update, LeaseClient};
use crate::error::{ElectionError, Result};
use crate::record::{LeaseRecord, Preconditions};

/// Lease store rooted at a directory
#[derive(Debug, Clone)]
pub struct FileLeaseClient {
    root: PathBuf,
}

impl FileLeaseClient {
    /// Use `root` as the store directory, creating it if needed
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|e| ElectionError::io(&root, e))?;
        Ok(Self { root })
    }

    /// The store directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the document for a lease
    pub fn lease_path(&self, namespace: &str, name: &str) -> PathBuf {
        self.root.join(namespace).join(format!("{}.json", name))
    }

    fn lock_path(&self, namespace: &str, name: &str) -> PathBuf {
        self.root.join(namespace).join(format!(".{}.lock", name))
    }

    /// Run `op` on the lease document while holding its lock
    async fn locked<T, F>(&self, namespace: &str, name: &str, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Path) -> Result<T> + Send + 'static,
    {
        validate_key(namespace)?;
        validate_key(name)?;
        let lock_path = self.lock_path(namespace, name);
        let lease_path = self.lease_path(namespace, name);

        tokio::task::spawn_blocking(move || {
            let lock = acquire_lock(&lock_path)?;
            let result = op(&lease_path);
            if let Err(e) = FileExt::unlock(&lock) {
                tracing::warn!("Failed to unlock {}: {}", lock_path.display(), e);
            }
            result
        })
        .await
        .map_err(|e| ElectionError::Task(e.to_string()))?
    }
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty()
        || key == "."
        || key == ".."
        || key.starts_with('.')
        || key.contains(['/', '\\', '\0'])
    {
        return Err(ElectionError::InvalidName(key.to_string()));
    }
    Ok(())
}

fn acquire_lock(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| ElectionError::io(parent, e))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .read(true)
        .write(true)
        .open(path)
        .map_err(|e| ElectionError::io(path, e))?;
    file.lock_exclusive().map_err(|e| ElectionError::io(path, e))?;
    Ok(file)
}

fn read_lease(path: &Path) -> Result<Option<LeaseRecord>> {
    match fs::read_to_string(path) {
        Ok(content) => serde_json::from_str(&content)
            .map(Some)
            .map_err(|source| ElectionError::Serialization {
                path: path.to_path_buf(),
                source,
            }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ElectionError::io(path, e)),
    }
}

fn write_lease(path: &Path, lease: &LeaseRecord) -> Result<()> {
    let content =
        serde_json::to_string_pretty(lease).map_err(|source| ElectionError::Serialization {
            path: path.to_path_buf(),
            source,
        })?;
    // Readers never observe a partially written document
    let tmp = path.with_extension(format!("json.{}.tmp", Ulid::new()));
    fs::write(&tmp, content).map_err(|e| ElectionError::io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        ElectionError::io(path, e)
    })
}

#[async_trait]
impl LeaseClient for FileLeaseClient {
    async fn get(&self, namespace: &str, name: &str) -> Result<LeaseRecord> {
        let (ns, n) = (namespace.to_string(), name.to_string());
        self.locked(namespace, name, move |path| {
            read_lease(path)?.ok_or_else(|| not_found(&ns, &n))
        })
        .await
    }

    async fn create(&self, lease: LeaseRecord) -> Result<LeaseRecord> {
        let (namespace, name) = (lease.namespace.clone(), lease.name.clone());
        self.locked(&namespace, &name, move |path| {
            if read_lease(path)?.is_some() {
                return Err(ElectionError::AlreadyExists {
                    namespace: lease.namespace,
                    name: lease.name,
                });
            }
            let lease = prepare_create(lease);
            write_lease(path, &lease)?;
            Ok(lease)
        })
        .await
    }

    async fn update(&self, lease: LeaseRecord) -> Result<LeaseRecord> {
        let (namespace, name) = (lease.namespace.clone(), lease.name.clone());
        self.locked(&namespace, &name, move |path| {
            let stored =
                read_lease(path)?.ok_or_else(|| not_found(&lease.namespace, &lease.name))?;
            let lease = prepare_update(&stored, lease)?;
            write_lease(path, &lease)?;
            Ok(lease)
        })
        .await
    }

    async fn delete(
        &self,
        namespace: &str,
        name: &str,
        preconditions: Preconditions,
    ) -> Result<()> {
        let (ns, n) = (namespace.to_string(), name.to_string());
        self.locked(namespace, name, move |path| {
            let stored = read_lease(path)?.ok_or_else(|| not_found(&ns, &n))?;
            if let Some(reason) = preconditions.violation(&stored) {
                return Err(conflict(&ns, &n, reason));
            }
            fs::remove_file(path).map_err(|e| ElectionError::io(path, e))
        })
        .await
    }
}
