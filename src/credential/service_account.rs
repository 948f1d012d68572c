use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::Serialize;

use crate::codec::JsonCodec;
use crate::credential::{key_material, StorageScope};
use crate::transport::Transport;
use crate::{Error, Result, Violations};

/// Where service-account assertions are exchanged for access tokens.
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Lifetime requested for each signed assertion, in seconds.
const ASSERTION_LIFETIME: u64 = 3600;

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: String,
    aud: &'a str,
    iat: u64,
    exp: u64,
}

/// An authenticated service-account identity plus its granted scopes.
///
/// Immutable once built and cheap to clone.
#[derive(Clone)]
pub struct Credential {
    account_id: String,
    private_key: Bytes,
    signing_key: EncodingKey,
    scopes: Arc<[String]>,
    token_uri: String,
    transport: Option<Arc<dyn Transport>>,
    json_codec: Option<Arc<dyn JsonCodec>>,
}

impl Credential {
    /// Creates a full-control credential from an RSA private key, given as PEM
    /// or as a Google `.p12` bundle.
    ///
    /// No transport or JSON codec is attached, the storage client picks its
    /// own when it is built from this credential.
    pub fn new(account_id: impl Into<String>, private_key: impl Into<Bytes>) -> Result<Self> {
        let account_id = account_id.into();

        let mut violations = Violations::new();
        violations.check(account_id.is_empty(), "Given account id was empty!");
        violations.into_result()?;

        Self::assemble(
            account_id,
            private_key.into(),
            vec![StorageScope::FullControl.uri().to_string()],
            DEFAULT_TOKEN_URI.to_string(),
            None,
            None,
        )
    }

    pub(crate) fn assemble(
        account_id: String,
        private_key: Bytes,
        scopes: Vec<String>,
        token_uri: String,
        transport: Option<Arc<dyn Transport>>,
        json_codec: Option<Arc<dyn JsonCodec>>,
    ) -> Result<Self> {
        let signing_key = key_material::signing_key(&private_key)?;

        let credential = Self {
            account_id,
            private_key,
            signing_key,
            scopes: scopes.into(),
            token_uri,
            transport,
            json_codec,
        };

        // A key can parse and still be refused by the signer.
        credential.sign_assertion(unix_now())?;

        Ok(credential)
    }

    #[inline]
    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    #[inline]
    pub fn private_key_material(&self) -> &[u8] {
        &self.private_key
    }

    #[inline]
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    #[inline]
    pub fn token_uri(&self) -> &str {
        &self.token_uri
    }

    #[inline]
    pub fn transport(&self) -> Option<&Arc<dyn Transport>> {
        self.transport.as_ref()
    }

    #[inline]
    pub fn json_codec(&self) -> Option<&Arc<dyn JsonCodec>> {
        self.json_codec.as_ref()
    }

    /// Signs the RS256 JWT assertion exchanged for an access token.
    pub fn sign_assertion(&self, issued_at: u64) -> Result<String> {
        let claims = AssertionClaims {
            iss: &self.account_id,
            scope: self.scopes.join(" "),
            aud: &self.token_uri,
            iat: issued_at,
            exp: issued_at + ASSERTION_LIFETIME,
        };

        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &self.signing_key)
            .map_err(|e| Error::Security(format!("Unable to sign assertion: {}", e)))
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("account_id", &self.account_id)
            .field("private_key", &"***")
            .field("scopes", &self.scopes)
            .field("token_uri", &self.token_uri)
            .field("transport", &self.transport.is_some())
            .field("json_codec", &self.json_codec.is_some())
            .finish()
    }
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
