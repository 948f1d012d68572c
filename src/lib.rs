//! Bucket-scoped image storage on Google Cloud Storage.
//!
//! The flow is always the same: assemble a [`Credential`] with a
//! [`CredentialBuilder`], turn it into a [`StorageHandle`] for a bucket and
//! hand that handle to the functions in [`crud`].
//!
//! ```no_run
//! # async fn run() -> cloud_images::Result<()> {
//! use cloud_images::{crud, CredentialBuilder, DirectoryResources, ImageFormat, StorageHandle, StorageScope};
//!
//! let resources = DirectoryResources::new("/etc/cloud-images");
//! let credential = CredentialBuilder::new(resources, "service-account.pem", "uploader@project.iam.gserviceaccount.com")?
//!     .with_scope(StorageScope::ReadWrite)
//!     .build()?;
//!
//! let handle = StorageHandle::build("avatars", credential)?;
//! let img = image::DynamicImage::new_rgba8(32, 32);
//! crud::insert(&handle, "users/42.png", &img, ImageFormat::Png).await?;
//! # Ok(())
//! # }
//! ```

#[macro_use]
extern crate tracing;

pub mod codec;
pub mod config;
pub mod credential;
pub mod crud;
pub mod encoder;
pub mod error;
pub mod format;
pub mod storage;
pub mod transport;


pub use crate::codec::{JsonCodec, SerdeJsonCodec};
pub use crate::config::StorageConfig;
pub use crate::credential::{
    Credential,
    CredentialBuilder,
    DirectoryResources,
    EmbeddedResources,
    ResourceContext,
    StorageScope,
};
pub use crate::crud::ObjectKey;
pub use crate::error::{Error, Result, Violations};
pub use crate::format::ImageFormat;
pub use crate::storage::{ClientOptions, HandleCache, StorageClient, StorageHandle};
pub use crate::transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport};
