//! Resource locations and byte transport.
//!
//! Local paths are read with `std::fs`; `http(s)://` and `s3://` locations
//! go through `object_store`. The extraction engine is synchronous, so
//! async store calls are driven with [`TokioBlockOn`], the same bridge the
//! Zarr storage adapter uses.

use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::http::HttpBuilder;
use object_store::path::Path as StorePath;
use object_store::ObjectStore;
use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::runtime::{Builder, Handle, Runtime};
use tracing::debug;
use zarrs_storage::storage_adapter::async_to_sync::AsyncToSyncBlockOn;

use crate::error::{RasterError, Result};

/// Where a resource lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    Local(PathBuf),
    /// `base` is scheme and authority; `path` is the object path below it.
    Http { base: String, path: String },
    S3 { bucket: String, key: String },
}

impl Location {
    /// Parse a path or URL.
    pub fn parse(uri: &str) -> Result<Self> {
        if let Some(rest) = uri.strip_prefix("s3://") {
            let (bucket, key) = rest
                .split_once('/')
                .ok_or_else(|| RasterError::storage(format!("s3 URL without key: {uri}")))?;
            if bucket.is_empty() || key.is_empty() {
                return Err(RasterError::storage(format!("invalid s3 URL: {uri}")));
            }
            return Ok(Location::S3 {
                bucket: bucket.to_string(),
                key: key.to_string(),
            });
        }

        for scheme in ["http://", "https://"] {
            if let Some(rest) = uri.strip_prefix(scheme) {
                let (authority, path) = rest.split_once('/').unwrap_or((rest, ""));
                if authority.is_empty() {
                    return Err(RasterError::storage(format!("invalid URL: {uri}")));
                }
                return Ok(Location::Http {
                    base: format!("{scheme}{authority}"),
                    path: path.to_string(),
                });
            }
        }

        if let Some(path) = uri.strip_prefix("file://") {
            return Ok(Location::Local(PathBuf::from(path)));
        }
        if uri.contains("://") {
            return Err(RasterError::storage(format!("unsupported URL scheme: {uri}")));
        }
        Ok(Location::Local(PathBuf::from(uri)))
    }

    pub fn is_remote(&self) -> bool {
        !matches!(self, Location::Local(_))
    }

    /// Path of the object inside its store (remote locations only).
    pub fn object_path(&self) -> Option<&str> {
        match self {
            Location::Local(_) => None,
            Location::Http { path, .. } => Some(path),
            Location::S3 { key, .. } => Some(key),
        }
    }

    /// The location one level up (the directory holding this resource).
    pub fn parent(&self) -> Location {
        let up = |p: &str| p.rsplit_once('/').map_or(String::new(), |(dir, _)| dir.to_string());
        match self {
            Location::Local(path) => Location::Local(
                path.parent()
                    .map(|p| p.to_path_buf())
                    .unwrap_or_default(),
            ),
            Location::Http { base, path } => Location::Http {
                base: base.clone(),
                path: up(path),
            },
            Location::S3 { bucket, key } => Location::S3 {
                bucket: bucket.clone(),
                key: up(key),
            },
        }
    }

    /// A child of this location.
    pub fn join(&self, name: &str) -> Location {
        let name = name.trim_start_matches('/');
        let child = |p: &str| {
            if p.is_empty() {
                name.to_string()
            } else {
                format!("{}/{name}", p.trim_end_matches('/'))
            }
        };
        match self {
            Location::Local(path) => Location::Local(path.join(name)),
            Location::Http { base, path } => Location::Http {
                base: base.clone(),
                path: child(path),
            },
            Location::S3 { bucket, key } => Location::S3 {
                bucket: bucket.clone(),
                key: child(key),
            },
        }
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Location::Local(path) => write!(f, "{}", path.display()),
            Location::Http { base, path } => write!(f, "{base}/{path}"),
            Location::S3 { bucket, key } => write!(f, "s3://{bucket}/{key}"),
        }
    }
}

/// Blocking executor that works both inside and outside a tokio runtime.
///
/// Inside a multi-threaded runtime the current task is moved off the worker
/// with `block_in_place` before the runtime handle drives the future. With
/// no runtime around, a private single-worker runtime is created and kept
/// alive for as long as any clone of this value exists.
#[derive(Clone)]
pub struct TokioBlockOn {
    handle: Handle,
    _owned: Option<Arc<Runtime>>,
}

impl std::fmt::Debug for TokioBlockOn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokioBlockOn")
            .field("owned_runtime", &self._owned.is_some())
            .finish()
    }
}

impl TokioBlockOn {
    /// Use the current runtime, or start a private one.
    pub fn new() -> Result<Self> {
        if let Ok(handle) = Handle::try_current() {
            return Ok(Self {
                handle,
                _owned: None,
            });
        }
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .map_err(|e| RasterError::storage(format!("failed to start runtime: {e}")))?;
        Ok(Self {
            handle: runtime.handle().clone(),
            _owned: Some(Arc::new(runtime)),
        })
    }
}

impl AsyncToSyncBlockOn for TokioBlockOn {
    fn block_on<F: core::future::Future>(&self, future: F) -> F::Output {
        if Handle::try_current().is_ok() {
            tokio::task::block_in_place(|| self.handle.block_on(future))
        } else {
            self.handle.block_on(future)
        }
    }
}

/// Build an object store and object path for a remote location.
///
/// S3 credentials and region come from the standard `AWS_*` environment
/// variables.
pub fn remote_store(location: &Location) -> Result<(Arc<dyn ObjectStore>, StorePath)> {
    match location {
        Location::Local(_) => Err(RasterError::storage(format!(
            "{location} is not a remote location"
        ))),
        Location::Http { base, path } => {
            let store = HttpBuilder::new()
                .with_url(base.as_str())
                .build()
                .map_err(|e| RasterError::storage(format!("HTTP store for {base}: {e}")))?;
            Ok((Arc::new(store), StorePath::from(path.as_str())))
        }
        Location::S3 { bucket, key } => {
            let store = AmazonS3Builder::from_env()
                .with_bucket_name(bucket)
                .build()
                .map_err(|e| RasterError::storage(format!("S3 store for {bucket}: {e}")))?;
            Ok((Arc::new(store), StorePath::from(key.as_str())))
        }
    }
}

/// Fetches whole resources as bytes.
#[derive(Debug, Clone)]
pub struct Transport {
    block_on: TokioBlockOn,
}

impl Transport {
    pub fn new() -> Result<Self> {
        Ok(Self {
            block_on: TokioBlockOn::new()?,
        })
    }

    /// The executor used for remote calls.
    pub fn block_on(&self) -> &TokioBlockOn {
        &self.block_on
    }

    /// Read an entire resource.
    ///
    /// Local read failures surface as I/O errors; remote failures as
    /// [`RasterError::RemoteAccess`].
    pub fn fetch_bytes(&self, uri: &str) -> Result<Bytes> {
        let location = Location::parse(uri)?;
        self.fetch_location(&location)
    }

    /// Read an entire resource at a parsed location.
    pub fn fetch_location(&self, location: &Location) -> Result<Bytes> {
        match location {
            Location::Local(path) => Ok(Bytes::from(std::fs::read(path)?)),
            remote => {
                let (store, path) = remote_store(remote)?;
                debug!(location = %remote, "Fetching remote object");
                self.block_on.block_on(async move {
                    let result = store
                        .get(&path)
                        .await
                        .map_err(|e| RasterError::remote(remote.to_string(), e))?;
                    result
                        .bytes()
                        .await
                        .map_err(|e| RasterError::remote(remote.to_string(), e))
                })
            }
        }
    }

    /// Read `length` bytes starting at `offset`.
    pub fn fetch_range(&self, location: &Location, offset: u64, length: u64) -> Result<Bytes> {
        match location {
            Location::Local(path) => {
                let mut file = std::fs::File::open(path)?;
                file.seek(SeekFrom::Start(offset))?;
                let mut buf = vec![0; length as usize];
                file.read_exact(&mut buf)?;
                Ok(Bytes::from(buf))
            }
            remote => {
                let (store, path) = remote_store(remote)?;
                let range = offset as usize..(offset + length) as usize;
                debug!(location = %remote, ?range, "Fetching remote byte range");
                self.block_on.block_on(async move {
                    store
                        .get_range(&path, range)
                        .await
                        .map_err(|e| RasterError::remote(remote.to_string(), e))
                })
            }
        }
    }
}
