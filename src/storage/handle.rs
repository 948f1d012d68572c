use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use once_cell::sync::Lazy;

use crate::credential::Credential;
use crate::storage::{ClientOptions, StorageClient};
use crate::{Result, Violations};

static GLOBAL_HANDLES: Lazy<HandleCache> = Lazy::new(HandleCache::new);

/// A bucket name bound to an authenticated [`StorageClient`].
///
/// Handles are never mutated. Pointing at another bucket means building a
/// new handle.
#[derive(Debug)]
pub struct StorageHandle {
    bucket_name: String,
    client: StorageClient,
    spool_dir: PathBuf,
}

impl StorageHandle {
    /// Builds a standalone handle owned by the caller.
    ///
    /// The spool directory is created if it does not exist yet.
    pub fn new(
        bucket_name: impl Into<String>,
        credential: Credential,
        options: ClientOptions,
    ) -> Result<Self> {
        let bucket_name = bucket_name.into();
        validate_bucket(&bucket_name)?;

        let spool_dir = options.spool_dir.unwrap_or_else(std::env::temp_dir);
        std::fs::create_dir_all(&spool_dir)?;
        debug!("Spooling downloads in {:?}", &spool_dir);

        info!("Setting up storage client for bucket {}", &bucket_name);
        let client = StorageClient::setup_client(credential, options.endpoint);

        Ok(Self {
            bucket_name,
            client,
            spool_dir,
        })
    }

    /// Returns the process-wide handle for `bucket_name`.
    ///
    /// See [`HandleCache::build`], a handle for the same bucket is reused and
    /// `credential` is dropped unused.
    pub fn build(bucket_name: &str, credential: Credential) -> Result<Arc<Self>> {
        HandleCache::global().build(bucket_name, credential)
    }

    #[inline]
    pub fn bucket_name(&self) -> &str {
        &self.bucket_name
    }

    #[inline]
    pub fn client(&self) -> &StorageClient {
        &self.client
    }

    /// Where downloads are staged before decoding.
    #[inline]
    pub fn spool_dir(&self) -> &Path {
        &self.spool_dir
    }
}

fn validate_bucket(bucket_name: &str) -> Result<()> {
    let mut violations = Violations::new();
    violations.check(bucket_name.is_empty(), "Given bucket name was empty!");
    violations.into_result()
}

/// Holds at most one live [`StorageHandle`].
///
/// Asking for the bucket the cached handle already serves returns that very
/// handle. Asking for any other bucket replaces it wholesale, callers still
/// holding the old `Arc` keep a working handle but the cache forgets it.
#[derive(Debug, Default)]
pub struct HandleCache {
    current: RwLock<Option<Arc<StorageHandle>>>,
}

impl HandleCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cache behind [`StorageHandle::build`].
    pub fn global() -> &'static HandleCache {
        &GLOBAL_HANDLES
    }

    pub fn build(&self, bucket_name: &str, credential: Credential) -> Result<Arc<StorageHandle>> {
        self.build_with(bucket_name, credential, ClientOptions::default())
    }

    /// Like [`HandleCache::build`] with explicit client options.
    ///
    /// `credential` and `options` only matter when a new handle is created.
    pub fn build_with(
        &self,
        bucket_name: &str,
        credential: Credential,
        options: ClientOptions,
    ) -> Result<Arc<StorageHandle>> {
        validate_bucket(bucket_name)?;

        if let Some(handle) = self.cached_for(bucket_name) {
            debug!("Reusing storage handle for bucket {}", bucket_name);
            return Ok(handle);
        }

        let mut current = self.current
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        // Someone may have won the race while we waited for the lock.
        match current.as_ref() {
            Some(handle) if handle.bucket_name() == bucket_name => {
                return Ok(handle.clone());
            },
            Some(handle) => {
                info!(
                    "Replacing storage handle for bucket {} with bucket {}",
                    handle.bucket_name(),
                    bucket_name,
                );
            },
            None => {},
        }

        let handle = Arc::new(StorageHandle::new(bucket_name, credential, options)?);
        *current = Some(handle.clone());

        Ok(handle)
    }

    /// The handle currently cached, if any.
    pub fn current(&self) -> Option<Arc<StorageHandle>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Drops the cached handle, returning it.
    pub fn evict(&self) -> Option<Arc<StorageHandle>> {
        self.current
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn cached_for(&self, bucket_name: &str) -> Option<Arc<StorageHandle>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .filter(|handle| handle.bucket_name() == bucket_name)
            .cloned()
    }
}
