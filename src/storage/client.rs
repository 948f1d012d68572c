use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures::TryStreamExt;
use once_cell::sync::Lazy;
use reqwest::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde_json::Value;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::instrument;
use url::Url;

use crate::codec::{JsonCodec, SerdeJsonCodec};
use crate::credential::{unix_now, Credential};
use crate::transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport};
use crate::{Error, Result, Violations};

/// The public Cloud Storage JSON API.
pub const DEFAULT_ENDPOINT: &str = "https://storage.googleapis.com";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Tokens are refreshed this long before the service says they expire.
const TOKEN_REFRESH_MARGIN: u64 = 60;

static DEFAULT_ENDPOINT_URL: Lazy<Url> =
    Lazy::new(|| Url::parse(DEFAULT_ENDPOINT).expect("default endpoint is a valid url"));

/// Connection options for a [`StorageClient`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Base url of the JSON API, overridable for emulators.
    pub endpoint: Url,

    /// Directory downloads are staged in. Defaults to the system temp dir.
    pub spool_dir: Option<PathBuf>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT_URL.clone(),
            spool_dir: None,
        }
    }
}

impl ClientOptions {
    pub fn with_endpoint(mut self, endpoint: &str) -> Result<Self> {
        self.endpoint = Url::parse(endpoint)
            .map_err(|e| Error::Config(format!("Invalid endpoint {:?}: {}", endpoint, e)))?;
        if self.endpoint.cannot_be_a_base() {
            return Err(Error::Config(format!("Endpoint {:?} cannot be a base url", endpoint)));
        }
        Ok(self)
    }

    pub fn with_spool_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.spool_dir = Some(dir.into());
        self
    }
}

struct CachedToken {
    access_token: String,
    expiry: Instant,
}

/// Low-level client speaking the Cloud Storage JSON API.
///
/// Knows nothing about images: it moves opaque byte payloads in and out of a
/// bucket, authenticating every call with a bearer token obtained from the
/// credential.
pub struct StorageClient {
    transport: Arc<dyn Transport>,
    json_codec: Arc<dyn JsonCodec>,
    credential: Credential,
    endpoint: Url,
    token: Mutex<Option<CachedToken>>,
}

impl StorageClient {
    /// Binds a credential to a connection.
    ///
    /// The transport and JSON codec come from the credential when it carries
    /// them, otherwise the shared reqwest transport and the serde codec are used.
    pub fn setup_client(credential: Credential, endpoint: Url) -> Self {
        let transport = match credential.transport() {
            Some(transport) => transport.clone(),
            None => {
                debug!("Credential carries no transport, using the shared reqwest client");
                ReqwestTransport::shared()
            },
        };

        let json_codec: Arc<dyn JsonCodec> = match credential.json_codec() {
            Some(codec) => codec.clone(),
            None => Arc::new(SerdeJsonCodec),
        };

        Self {
            transport,
            json_codec,
            credential,
            endpoint,
            token: Mutex::new(None),
        }
    }

    #[inline]
    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    #[inline]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Uploads `data` as object `key`, overwriting whatever was there.
    #[instrument(skip(self, data), fields(size = data.len()), level = "debug")]
    pub async fn insert(
        &self,
        bucket: &str,
        key: &str,
        content_type: &str,
        data: Bytes,
    ) -> Result<()> {
        let content_type = HeaderValue::from_str(content_type).map_err(|_| {
            let mut violations = Violations::new();
            violations.push(format!("Given content type {:?} is not a valid header value!", content_type));
            Error::InvalidArgument(violations)
        })?;

        let mut url = self.api_url(&["upload", "storage", "v1", "b", bucket, "o"])?;
        url.query_pairs_mut()
            .append_pair("uploadType", "media")
            .append_pair("name", key);

        let request = HttpRequest::new(Method::POST, url)
            .header(AUTHORIZATION, self.bearer().await?)
            .header(CONTENT_TYPE, content_type)
            .body(data);

        let response = self.transport.execute(request).await?;
        if !response.status.is_success() {
            return Err(self.failure(response).await);
        }

        let body = response.bytes().await?;
        if let Ok(resource) = self.json_codec.decode(&body) {
            debug!(
                generation = ?resource.get("generation"),
                size = ?resource.get("size"),
                "Stored object gs://{}/{}",
                bucket,
                key,
            );
        }

        Ok(())
    }

    /// Downloads object `key` into `sink`, returning the number of bytes written.
    ///
    /// A missing object fails with [`Error::NotFound`].
    #[instrument(skip(self, sink), level = "debug")]
    pub async fn get_to<W>(&self, bucket: &str, key: &str, sink: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let mut url = self.api_url(&["storage", "v1", "b", bucket, "o", key])?;
        url.query_pairs_mut().append_pair("alt", "media");

        let request = HttpRequest::new(Method::GET, url)
            .header(AUTHORIZATION, self.bearer().await?);

        let response = self.transport.execute(request).await?;
        if response.status == StatusCode::NOT_FOUND {
            return Err(Error::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            });
        }
        if !response.status.is_success() {
            return Err(self.failure(response).await);
        }

        let content_type = response
            .headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<mime::Mime>().ok());
        if let Some(ct) = content_type.filter(|ct| ct.type_() != mime::IMAGE) {
            warn!("Object gs://{}/{} is stored as {}, not an image type", bucket, key, ct);
        }

        let mut written = 0u64;
        let mut body = response.into_stream();
        while let Some(chunk) = body.try_next().await? {
            sink.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        sink.flush().await?;

        debug!("Downloaded {} bytes", written);
        Ok(written)
    }

    /// Deletes object `key`. A missing object is reported as the service reports it.
    #[instrument(skip(self), level = "debug")]
    pub async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        let url = self.api_url(&["storage", "v1", "b", bucket, "o", key])?;
        let request = HttpRequest::new(Method::DELETE, url)
            .header(AUTHORIZATION, self.bearer().await?);

        let response = self.transport.execute(request).await?;
        if !response.status.is_success() {
            return Err(self.failure(response).await);
        }

        Ok(())
    }

    /// Joins `segments` onto the endpoint, percent-encoding each one whole.
    ///
    /// Object keys keep their `/` as `%2F`, the API addresses them as a
    /// single path segment.
    fn api_url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Config(format!("Endpoint {} cannot be a base url", self.endpoint)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn bearer(&self) -> Result<HeaderValue> {
        let token = self.access_token().await?;
        let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| Error::Security("Access token is not a valid header value".to_string()))?;
        value.set_sensitive(true);
        Ok(value)
    }

    /// Returns a cached access token, exchanging a fresh assertion when needed.
    async fn access_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expiry > Instant::now() {
                return Ok(token.access_token.clone());
            }
        }

        debug!("Requesting access token for {}", self.credential.account_id());
        let assertion = self.credential.sign_assertion(unix_now())?;
        let form = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("grant_type", JWT_BEARER_GRANT)
            .append_pair("assertion", &assertion)
            .finish();

        let token_uri = Url::parse(self.credential.token_uri())
            .map_err(|e| Error::Config(format!("Invalid token uri: {}", e)))?;
        let request = HttpRequest::new(Method::POST, token_uri)
            .header(CONTENT_TYPE, HeaderValue::from_static("application/x-www-form-urlencoded"))
            .body(form);

        let response = self.transport.execute(request).await?;
        let status = response.status;
        if matches!(status, StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            let body = response.bytes().await.unwrap_or_default();
            let reason = self.error_message(&body).unwrap_or_else(|| status.to_string());
            return Err(Error::Security(format!("Token exchange was refused: {}", reason)));
        }
        if !status.is_success() {
            return Err(self.failure(response).await);
        }

        let body = self.json_codec.decode(&response.bytes().await?)?;
        let access_token = body
            .get("access_token")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::transport(Some(status.as_u16()), "No access_token in token response"))?
            .to_string();
        let expires_in = body
            .get("expires_in")
            .and_then(Value::as_u64)
            .unwrap_or(3600);

        *cached = Some(CachedToken {
            access_token: access_token.clone(),
            expiry: Instant::now() + Duration::from_secs(expires_in.saturating_sub(TOKEN_REFRESH_MARGIN)),
        });

        Ok(access_token)
    }

    async fn failure(&self, response: HttpResponse) -> Error {
        let status = response.status;
        let message = match response.bytes().await {
            Ok(body) if body.is_empty() => status.to_string(),
            Ok(body) => self
                .error_message(&body)
                .unwrap_or_else(|| String::from_utf8_lossy(&body).into_owned()),
            Err(e) => e.to_string(),
        };

        Error::transport(Some(status.as_u16()), message)
    }

    /// Pulls the human readable message out of an API or OAuth error body.
    fn error_message(&self, body: &[u8]) -> Option<String> {
        let value = self.json_codec.decode(body).ok()?;
        value
            .pointer("/error/message")
            .or_else(|| value.get("error_description"))
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}

impl fmt::Debug for StorageClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageClient")
            .field("endpoint", &self.endpoint.as_str())
            .field("account_id", &self.credential.account_id())
            .finish()
    }
}
