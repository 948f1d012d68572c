//! Image level operations on the objects of a bucket.
//!
//! Every operation validates all of its arguments before touching the
//! network and reports every problem it found in a single
//! [`Error::InvalidArgument`].

use std::fmt;
use std::ops::Deref;

use image::{DynamicImage, GenericImageView};
use tracing::instrument;

use crate::encoder;
use crate::format::ImageFormat;
use crate::storage::StorageHandle;
use crate::{Error, Result, Violations};

/// Longest object name the service accepts, in bytes.
pub const MAX_KEY_LEN: usize = 1024;

/// A validated object name.
///
/// Keys are flat strings to the service. A hierarchical path such as
/// `users/42/avatar.png` is simply a key that contains `/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectKey(String);

impl ObjectKey {
    pub fn new(key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        let mut violations = Violations::new();
        check_key(&mut violations, &key);
        violations.into_result()?;
        Ok(Self(key))
    }

    /// Joins path segments with `/` into a single key.
    pub fn from_segments<I, S>(segments: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let segments: Vec<S> = segments.into_iter().collect();

        let mut violations = Violations::new();
        for (i, segment) in segments.iter().enumerate() {
            let segment = segment.as_ref();
            violations.check(segment.is_empty(), format!("Given key segment {} was empty!", i));
            violations.check(
                segment.contains('/'),
                format!("Given key segment {} contains a '/'!", i),
            );
        }
        violations.into_result()?;

        let joined = segments
            .iter()
            .map(|s| s.as_ref())
            .collect::<Vec<_>>()
            .join("/");
        Self::new(joined)
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Deref for ObjectKey {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn check_key(violations: &mut Violations, key: &str) {
    if key.is_empty() {
        violations.push("Given key was empty!");
        return;
    }

    violations.check(
        key.len() > MAX_KEY_LEN,
        format!("Given key is {} bytes, longer than {} bytes!", key.len(), MAX_KEY_LEN),
    );
    violations.check(
        key.contains(|c: char| c == '\r' || c == '\n'),
        "Given key contains a carriage return or line feed!",
    );
    violations.check(key == "." || key == "..", "Given key cannot be '.' or '..'!");
}

fn check_image(violations: &mut Violations, img: &DynamicImage) {
    let (width, height) = img.dimensions();
    violations.check(
        width == 0 || height == 0,
        format!("Given image was empty ({}x{})!", width, height),
    );
}

/// Encodes `img` as `format` and uploads it as object `key`.
///
/// An existing object with the same key is overwritten by the service.
#[instrument(skip(handle, img), fields(bucket = handle.bucket_name()))]
pub async fn insert(
    handle: &StorageHandle,
    key: &str,
    img: &DynamicImage,
    format: ImageFormat,
) -> Result<()> {
    let mut violations = Violations::new();
    check_key(&mut violations, key);
    check_image(&mut violations, img);
    violations.into_result()?;

    store(handle, key, img, format).await
}

async fn store(
    handle: &StorageHandle,
    key: &str,
    img: &DynamicImage,
    format: ImageFormat,
) -> Result<()> {
    let owned = img.clone();
    let data = encoder::offload(move || encoder::encode(&owned, format)).await?;
    debug!("Encoded {} as {} ({} bytes)", key, format, data.len());

    handle.client()
        .insert(handle.bucket_name(), key, &format.content_type(), data)
        .await?;

    debug!("Executed upload of {}", key);
    Ok(())
}

/// Downloads and decodes object `key`.
///
/// A missing object fails with [`Error::NotFound`], any other failure is
/// propagated as is. The download is staged in a temporary file inside the
/// handle's spool directory which is removed whichever way this returns.
#[instrument(skip(handle), fields(bucket = handle.bucket_name()))]
pub async fn read(handle: &StorageHandle, key: &str) -> Result<DynamicImage> {
    let mut violations = Violations::new();
    check_key(&mut violations, key);
    violations.into_result()?;

    let spool = tempfile::Builder::new()
        .prefix("downloaded")
        .tempfile_in(handle.spool_dir())?;
    debug!("Created spool file @ {:?}", spool.path());

    let mut sink = tokio::fs::File::from_std(spool.reopen()?);
    handle.client()
        .get_to(handle.bucket_name(), key, &mut sink)
        .await?;
    drop(sink);

    // The spool file is removed once the worker drops it.
    let img = encoder::offload(move || encoder::decode(spool.reopen()?)).await?;
    debug!("Decoded {} ({}x{})", key, img.width(), img.height());

    Ok(img)
}

/// Like [`read`] but a missing object is `Ok(None)`.
///
/// Only the not-found case is absorbed, every other failure still propagates.
pub async fn try_read(handle: &StorageHandle, key: &str) -> Result<Option<DynamicImage>> {
    match read(handle, key).await {
        Ok(img) => Ok(Some(img)),
        Err(Error::NotFound { bucket, key }) => {
            warn!("Cloud object gs://{}/{} not found", bucket, key);
            Ok(None)
        },
        Err(other) => Err(other),
    }
}

/// Deletes object `key`.
///
/// Deleting a key that does not exist fails the way the service reports it.
#[instrument(skip(handle), fields(bucket = handle.bucket_name()))]
pub async fn delete(handle: &StorageHandle, key: &str) -> Result<()> {
    let mut violations = Violations::new();
    check_key(&mut violations, key);
    violations.into_result()?;

    debug!("Executing deletion of {}", key);
    handle.client()
        .delete(handle.bucket_name(), key)
        .await?;
    debug!("Executed deletion of {}", key);

    Ok(())
}

/// Replaces object `key` by deleting it and then inserting `img`.
///
/// This is not atomic. If the delete fails nothing else happens, but if the
/// upload fails afterwards the key is left empty and nothing is rolled back.
#[instrument(skip(handle, img), fields(bucket = handle.bucket_name()))]
pub async fn replace(
    handle: &StorageHandle,
    key: &str,
    img: &DynamicImage,
    format: ImageFormat,
) -> Result<()> {
    let mut violations = Violations::new();
    check_key(&mut violations, key);
    check_image(&mut violations, img);
    violations.into_result()?;

    delete(handle, key).await?;

    if let Err(e) = store(handle, key, img, format).await {
        warn!("Deleted {} but uploading its replacement failed, the key is now empty", key);
        return Err(e);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_validation_reports_everything() {
        let long = format!("{}\n", "a".repeat(MAX_KEY_LEN));
        let err = ObjectKey::new(long).unwrap_err();

        match err {
            Error::InvalidArgument(v) => {
                assert_eq!(v.messages().len(), 2);
                assert!(v.mentions("longer than"));
                assert!(v.mentions("line feed"));
            },
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_key_from_segments() {
        let key = ObjectKey::from_segments(["users", "42", "avatar.png"]).unwrap();
        assert_eq!(key.as_str(), "users/42/avatar.png");

        let err = ObjectKey::from_segments(["users", "", "a/b"]).unwrap_err();
        match err {
            Error::InvalidArgument(v) => {
                assert!(v.mentions("segment 1 was empty"));
                assert!(v.mentions("segment 2 contains"));
            },
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_dot_keys_rejected() {
        assert!(ObjectKey::new(".").is_err());
        assert!(ObjectKey::new("..").is_err());
        assert!(ObjectKey::new("...").is_ok());
    }
}
