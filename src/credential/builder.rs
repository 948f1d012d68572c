use std::io::Read;
use std::sync::Arc;

use bytes::Bytes;
use once_cell::sync::OnceCell;
use tracing::instrument;

use crate::codec::{JsonCodec, SerdeJsonCodec};
use crate::credential::{Credential, ResourceContext, StorageScope, DEFAULT_TOKEN_URI};
use crate::transport::{ReqwestTransport, Transport};
use crate::{Result, Violations};

static PROCESS_BUILDER: OnceCell<CredentialBuilder> = OnceCell::new();

/// Assembles a [`Credential`] from a key resource and an account id.
///
/// Every `with_*` call consumes the builder and returns the updated one, a
/// configured builder can be cloned and reused to build any number of
/// credentials.
#[derive(Clone)]
pub struct CredentialBuilder {
    context: Arc<dyn ResourceContext>,
    key_locator: String,
    account_id: String,
    transport: Option<Arc<dyn Transport>>,
    json_codec: Option<Arc<dyn JsonCodec>>,
    scopes: Vec<String>,
    token_uri: Option<String>,
}

impl CredentialBuilder {
    /// Creates a builder reading its private key from `key_locator` in `context`.
    ///
    /// # Errors
    ///
    /// Fails with [`crate::Error::InvalidArgument`] listing every problem if the
    /// account id is empty or the key resource cannot be resolved.
    pub fn new(
        context: impl ResourceContext,
        key_locator: impl Into<String>,
        account_id: impl Into<String>,
    ) -> Result<Self> {
        let key_locator = key_locator.into();
        let account_id = account_id.into();

        let mut violations = Violations::new();
        violations.check(account_id.is_empty(), "Given account id was empty!");
        violations.check(
            context.resource_name(&key_locator).is_none(),
            format!("Given key resource {:?} could not be resolved!", key_locator),
        );
        violations.into_result()?;

        Ok(Self {
            context: Arc::new(context),
            key_locator,
            account_id,
            transport: None,
            json_codec: None,
            scopes: Vec::new(),
            token_uri: None,
        })
    }

    /// Returns the process-wide builder, creating it on the first call.
    ///
    /// Only the first successful call is honoured: every later call returns a
    /// copy of that first builder and its own arguments are ignored, even if
    /// they differ. Use [`CredentialBuilder::new`] for independent builders.
    pub fn setup(
        context: impl ResourceContext,
        key_locator: impl Into<String>,
        account_id: impl Into<String>,
    ) -> Result<Self> {
        PROCESS_BUILDER
            .get_or_try_init(|| {
                info!("Initialising process-wide credential builder");
                Self::new(context, key_locator, account_id)
            })
            .map(Clone::clone)
    }

    pub fn with_transport(mut self, transport: impl Transport) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    pub fn with_json_codec(mut self, codec: impl JsonCodec) -> Self {
        self.json_codec = Some(Arc::new(codec));
        self
    }

    /// Sets the single scope the credential requests, replacing any earlier one.
    pub fn with_scope(mut self, scope: StorageScope) -> Self {
        self.scopes = vec![scope.uri().to_string()];
        self
    }

    /// Overrides the OAuth token endpoint, e.g. for an emulator.
    pub fn with_token_uri(mut self, token_uri: impl Into<String>) -> Self {
        self.token_uri = Some(token_uri.into());
        self
    }

    #[inline]
    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    /// Reads the key material and builds the credential.
    ///
    /// Unset options fall back to a fresh [`ReqwestTransport`], the
    /// [`SerdeJsonCodec`] and the full-control scope.
    ///
    /// # Errors
    ///
    /// [`crate::Error::Io`] if the key resource cannot be read,
    /// [`crate::Error::Security`] if its content is not a usable private key.
    #[instrument(skip(self), fields(account = %self.account_id), level = "debug")]
    pub fn build(&self) -> Result<Credential> {
        let mut key = Vec::new();
        self.context.open(&self.key_locator)?.read_to_end(&mut key)?;
        debug!("Read {} bytes of key material", key.len());

        let transport = match &self.transport {
            Some(transport) => transport.clone(),
            None => {
                debug!("Using stock transport (reqwest)");
                Arc::new(ReqwestTransport::new())
            },
        };

        let scopes = if self.scopes.is_empty() {
            debug!("Using stock scope ({})", StorageScope::FullControl);
            vec![StorageScope::FullControl.uri().to_string()]
        } else {
            self.scopes.clone()
        };

        let json_codec = match &self.json_codec {
            Some(codec) => codec.clone(),
            None => {
                debug!("Using stock JSON codec (serde_json)");
                Arc::new(SerdeJsonCodec)
            },
        };

        let token_uri = self.token_uri
            .clone()
            .unwrap_or_else(|| DEFAULT_TOKEN_URI.to_string());

        Credential::assemble(
            self.account_id.clone(),
            Bytes::from(key),
            scopes,
            token_uri,
            Some(transport),
            Some(json_codec),
        )
    }
}
