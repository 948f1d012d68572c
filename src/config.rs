use std::fs::read_to_string;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;

use crate::credential::{CredentialBuilder, DirectoryResources, EmbeddedResources, StorageScope};
use crate::storage::{ClientOptions, HandleCache, StorageHandle};
use crate::Result;

/// Locator used for keys given inline in the config.
const INLINE_KEY_NAME: &str = "inline";

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// The bucket every object is stored in.
    pub bucket: String,

    /// The service account id, usually its email address.
    pub account_id: String,

    /// Where the service account's private key is read from.
    pub key: KeySource,

    #[serde(default)]
    /// The scope requested for the credential.
    ///
    /// Defaults to `full-control`.
    pub scope: StorageScope,

    #[serde(default)]
    /// An alternative JSON API endpoint, e.g. a local emulator.
    pub endpoint: Option<String>,

    #[serde(default)]
    /// An alternative OAuth token endpoint.
    pub token_uri: Option<String>,

    #[serde(default)]
    /// The directory downloads are staged in.
    ///
    /// Defaults to the system temp directory.
    pub spool_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "lowercase", tag = "type")]
pub enum KeySource {
    /// A PEM file inside `directory`.
    File {
        directory: PathBuf,
        name: String,
    },

    /// A base64 encoded PEM key held in the config itself.
    Inline {
        data: String,
    },
}

impl StorageConfig {
    pub fn from_file(file: impl AsRef<Path>) -> Result<Self> {
        let data = read_to_string(file)?;
        Self::from_yaml(&data)
    }

    pub fn from_yaml(data: &str) -> Result<Self> {
        Ok(serde_yaml::from_str::<Self>(data)?)
    }

    /// A credential builder with the configured key, scope and token endpoint.
    pub fn credential_builder(&self) -> Result<CredentialBuilder> {
        let builder = match &self.key {
            KeySource::File { directory, name } => {
                CredentialBuilder::new(DirectoryResources::new(directory), name, &self.account_id)?
            },
            KeySource::Inline { data } => {
                let resources = EmbeddedResources::new()
                    .with_base64_resource(INLINE_KEY_NAME, data)?;
                CredentialBuilder::new(resources, INLINE_KEY_NAME, &self.account_id)?
            },
        };

        let builder = builder.with_scope(self.scope);
        Ok(match &self.token_uri {
            Some(uri) => builder.with_token_uri(uri),
            None => builder,
        })
    }

    pub fn client_options(&self) -> Result<ClientOptions> {
        let mut options = ClientOptions::default();
        if let Some(endpoint) = &self.endpoint {
            options = options.with_endpoint(endpoint)?;
        }
        if let Some(dir) = &self.spool_dir {
            options = options.with_spool_dir(dir);
        }
        Ok(options)
    }

    /// Builds the credential and the process-wide handle for the bucket.
    pub fn connect(&self) -> Result<Arc<StorageHandle>> {
        self.connect_with(HandleCache::global())
    }

    pub fn connect_with(&self, cache: &HandleCache) -> Result<Arc<StorageHandle>> {
        let credential = self.credential_builder()?.build()?;
        cache.build_with(&self.bucket, credential, self.client_options()?)
    }
}
