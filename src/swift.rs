//! OpenStack Swift object store over HTTP
//!
//! Supports the three authentication flows the plugin accepts:
//! - `tempauth`: `GET auth_url` with `X-Auth-User` / `X-Auth-Key`
//! - `basic`: `GET auth_url` with HTTP basic authorization
//! - `keystone`: Keystone v2.0 `POST auth_url` with password credentials and a tenant
//!
//! Authentication happens on the first request and the token is cached. A 401
//! from the object API drops the cached token so the next attempt logs in again.

use crate::config::{AuthMethod, OutputConfig};
use crate::error::{Error, StoreError};
use crate::store::{ObjectStore, check_target};
use crate::types::UploadTarget;
use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::CONTENT_LENGTH;
use serde::Deserialize;
use std::time::Duration;
use tokio::fs::File;
use tokio::sync::Mutex;
use tokio_util::io::ReaderStream;
use url::Url;

const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";
const STORAGE_URL_HEADER: &str = "X-Storage-Url";

/// Longest response body quoted in an error message
const MAX_ERROR_BODY: usize = 512;

/// Account credentials for a Swift cluster
#[derive(Clone, Debug)]
pub struct SwiftCredentials {
    /// Authentication endpoint
    pub auth_url: String,
    /// User name
    pub username: String,
    /// Password or key
    pub password: String,
    /// How to authenticate
    pub method: AuthMethod,
}

impl SwiftCredentials {
    /// Extract credentials from a validated configuration
    pub fn from_config(config: &OutputConfig) -> crate::Result<Self> {
        Ok(Self {
            auth_url: config.auth_url.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
            method: config.auth_method()?,
        })
    }
}

/// Token and endpoint returned by authentication
#[derive(Clone, Debug)]
struct AuthSession {
    storage_url: Url,
    token: String,
}

#[derive(Deserialize)]
struct KeystoneResponse {
    access: KeystoneAccess,
}

#[derive(Deserialize)]
struct KeystoneAccess {
    token: KeystoneToken,
    #[serde(rename = "serviceCatalog", default)]
    service_catalog: Vec<KeystoneService>,
}

#[derive(Deserialize)]
struct KeystoneToken {
    id: String,
}

#[derive(Deserialize)]
struct KeystoneService {
    #[serde(rename = "type")]
    service_type: String,
    #[serde(default)]
    endpoints: Vec<KeystoneEndpoint>,
}

#[derive(Deserialize)]
struct KeystoneEndpoint {
    #[serde(rename = "publicURL")]
    public_url: String,
}

/// [`ObjectStore`] backed by a Swift cluster
pub struct SwiftStore {
    client: reqwest::Client,
    credentials: SwiftCredentials,
    session: Mutex<Option<AuthSession>>,
}

impl SwiftStore {
    /// Create a store; no request is made until the first operation
    pub fn new(credentials: SwiftCredentials, request_timeout: Duration) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| StoreError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            credentials,
            session: Mutex::new(None),
        })
    }

    /// Create a store from the plugin configuration
    pub fn from_config(config: &OutputConfig) -> crate::Result<Self> {
        config.validate()?;
        let credentials = SwiftCredentials::from_config(config)?;
        Self::new(credentials, config.request_timeout).map_err(Error::from)
    }

    /// Current session, authenticating if there is none
    async fn session(&self) -> Result<AuthSession, StoreError> {
        let mut guard = self.session.lock().await;
        if let Some(session) = guard.as_ref() {
            return Ok(session.clone());
        }

        let session = self.authenticate().await?;
        tracing::info!(
            storage_url = %session.storage_url,
            method = ?self.credentials.method,
            "Authenticated against Swift"
        );
        *guard = Some(session.clone());
        Ok(session)
    }

    async fn invalidate(&self) {
        self.session.lock().await.take();
    }

    async fn authenticate(&self) -> Result<AuthSession, StoreError> {
        let auth_url = Url::parse(&self.credentials.auth_url)
            .map_err(|e| StoreError::Config(format!("invalid auth_url: {e}")))?;

        match &self.credentials.method {
            AuthMethod::TempAuth => {
                let request = self
                    .client
                    .get(auth_url)
                    .header("X-Auth-User", &self.credentials.username)
                    .header("X-Auth-Key", &self.credentials.password);
                self.header_auth(request).await
            }
            AuthMethod::Basic => {
                let request = self.client.get(auth_url).basic_auth(
                    &self.credentials.username,
                    Some(&self.credentials.password),
                );
                self.header_auth(request).await
            }
            AuthMethod::Keystone {
                tenant_id,
                tenant_name,
            } => {
                self.keystone_auth(auth_url, tenant_id.as_deref(), tenant_name.as_deref())
                    .await
            }
        }
    }

    /// TempAuth and basic both answer with the session in response headers
    async fn header_auth(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<AuthSession, StoreError> {
        let response = auth_response(request.send().await?).await?;

        let header = |name: &str| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
                .ok_or_else(|| StoreError::Auth(format!("response is missing the {name} header")))
        };
        let storage_url = header(STORAGE_URL_HEADER)?;
        let token = header(AUTH_TOKEN_HEADER)?;

        Ok(AuthSession {
            storage_url: parse_storage_url(&storage_url)?,
            token,
        })
    }

    async fn keystone_auth(
        &self,
        auth_url: Url,
        tenant_id: Option<&str>,
        tenant_name: Option<&str>,
    ) -> Result<AuthSession, StoreError> {
        let mut auth = serde_json::json!({
            "passwordCredentials": {
                "username": self.credentials.username,
                "password": self.credentials.password,
            }
        });
        if let Some(id) = tenant_id {
            auth["tenantId"] = id.into();
        }
        if let Some(name) = tenant_name {
            auth["tenantName"] = name.into();
        }

        let response = self
            .client
            .post(auth_url)
            .json(&serde_json::json!({ "auth": auth }))
            .send()
            .await?;
        let body: KeystoneResponse = auth_response(response)
            .await?
            .json()
            .await
            .map_err(|e| StoreError::Auth(format!("unreadable keystone response: {e}")))?;

        let endpoint = body
            .access
            .service_catalog
            .iter()
            .find(|service| service.service_type == "object-store")
            .and_then(|service| service.endpoints.first())
            .ok_or_else(|| {
                StoreError::Config("keystone catalog has no object-store endpoint".to_string())
            })?;

        Ok(AuthSession {
            storage_url: parse_storage_url(&endpoint.public_url)?,
            token: body.access.token.id,
        })
    }

    /// Turn a non-success response into an error, dropping the token on 401
    async fn check(&self, response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::UNAUTHORIZED {
            self.invalidate().await;
            return Err(StoreError::Auth("token was rejected".to_string()));
        }
        Err(status_error(response).await)
    }
}

#[async_trait]
impl ObjectStore for SwiftStore {
    async fn ensure_container(&self, container: &str) -> Result<bool, StoreError> {
        let session = self.session().await?;
        let url = container_url(&session.storage_url, container)?;

        let response = self
            .client
            .head(url.clone())
            .header(AUTH_TOKEN_HEADER, &session.token)
            .send()
            .await?;
        if response.status() != StatusCode::NOT_FOUND {
            self.check(response).await?;
            return Ok(false);
        }

        let response = self
            .client
            .put(url)
            .header(AUTH_TOKEN_HEADER, &session.token)
            .header(CONTENT_LENGTH, 0)
            .send()
            .await?;
        self.check(response).await?;
        tracing::info!(container, "Created container");
        Ok(true)
    }

    async fn put_object(
        &self,
        target: &UploadTarget,
        body: File,
        len: u64,
    ) -> Result<(), StoreError> {
        check_target(target)?;
        let session = self.session().await?;
        let url = object_url(&session.storage_url, target)?;

        let response = self
            .client
            .put(url)
            .header(AUTH_TOKEN_HEADER, &session.token)
            .header(CONTENT_LENGTH, len)
            .body(reqwest::Body::wrap_stream(ReaderStream::new(body)))
            .send()
            .await?;
        self.check(response).await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "swift"
    }
}

async fn auth_response(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        Err(StoreError::Auth(format!(
            "authentication rejected with status {}",
            status.as_u16()
        )))
    } else {
        Err(status_error(response).await)
    }
}

async fn status_error(response: reqwest::Response) -> StoreError {
    let status = response.status();
    let mut message = response.text().await.unwrap_or_default();
    if message.is_empty() {
        message = status.canonical_reason().unwrap_or("unknown").to_string();
    }
    if message.len() > MAX_ERROR_BODY {
        let mut end = MAX_ERROR_BODY;
        while !message.is_char_boundary(end) {
            end -= 1;
        }
        message.truncate(end);
    }
    StoreError::Status {
        status: status.as_u16(),
        message,
    }
}

fn parse_storage_url(raw: &str) -> Result<Url, StoreError> {
    let url = Url::parse(raw)
        .map_err(|e| StoreError::Config(format!("invalid storage URL {raw:?}: {e}")))?;
    if url.cannot_be_a_base() {
        return Err(StoreError::Config(format!(
            "storage URL {raw:?} cannot hold object paths"
        )));
    }
    Ok(url)
}

fn container_url(storage_url: &Url, container: &str) -> Result<Url, StoreError> {
    let mut url = storage_url.clone();
    url.path_segments_mut()
        .map_err(|_| StoreError::InvalidTarget(format!("cannot address container {container}")))?
        .pop_if_empty()
        .push(container);
    Ok(url)
}

fn object_url(storage_url: &Url, target: &UploadTarget) -> Result<Url, StoreError> {
    let mut url = container_url(storage_url, &target.container)?;
    url.path_segments_mut()
        .map_err(|_| StoreError::InvalidTarget(format!("cannot address object {target}")))?
        .extend(target.key.split('/'));
    Ok(url)
}
