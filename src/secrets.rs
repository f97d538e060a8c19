use crate::error::PipelineError;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use google_cloud_auth::project::Config as AuthConfig;
use google_cloud_auth::token::DefaultTokenSourceProvider;
use google_cloud_token::{TokenSource as _, TokenSourceProvider as _};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

const SECRET_MANAGER_AUDIENCE: &str = "https://secretmanager.googleapis.com/";
const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

/// Vendor login pair. Lives in memory for one invocation only; never
/// persisted, never logged.
#[derive(Clone, Deserialize)]
pub struct Credentials {
    pub login: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("login", &self.login)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Source of vendor credentials, one fetch per invocation.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn credentials(&self) -> Result<Credentials, PipelineError>;
}

/// Secret Manager access: reads the latest version of the configured secret
/// and decodes its JSON login/password payload.
pub struct GcpSecretStore {
    http: Client,
    project_id: String,
    secret_id: String,
}

impl GcpSecretStore {
    pub fn new(http: Client, project_id: String, secret_id: String) -> Self {
        GcpSecretStore {
            http,
            project_id,
            secret_id,
        }
    }
}

#[async_trait]
impl SecretStore for GcpSecretStore {
    async fn credentials(&self) -> Result<Credentials, PipelineError> {
        fetch_credentials(&self.http, &self.project_id, &self.secret_id)
            .await
            .map_err(|e| PipelineError::Secrets(format!("{e:#}")))
    }
}

#[derive(Deserialize)]
struct AccessSecretVersionResponse {
    payload: SecretPayload,
}

#[derive(Deserialize)]
struct SecretPayload {
    data: String,
}

/// Access `projects/{project}/secrets/{secret}/versions/latest` over the
/// Secret Manager REST surface and decode the payload.
pub async fn fetch_credentials(
    http: &Client,
    project_id: &str,
    secret_id: &str,
) -> Result<Credentials> {
    let token = access_token().await?;
    let url = format!(
        "https://secretmanager.googleapis.com/v1/projects/{project_id}/secrets/{secret_id}/versions/latest:access"
    );
    debug!(%url, "accessing secret version");

    let body: AccessSecretVersionResponse = http
        .get(&url)
        .header(reqwest::header::AUTHORIZATION, token)
        .send()
        .await
        .with_context(|| format!("GET {url} failed"))?
        .error_for_status()
        .context("secret version access returned non-success status")?
        .json()
        .await
        .context("decoding secret version response")?;

    decode_payload(&body.payload.data)
}

/// Decode the base64 secret payload into a login/password pair.
fn decode_payload(data: &str) -> Result<Credentials> {
    let raw = STANDARD
        .decode(data.as_bytes())
        .context("secret payload is not valid base64")?;
    serde_json::from_slice(&raw).context("secret payload is not a login/password JSON document")
}

async fn access_token() -> Result<String> {
    let config = AuthConfig::default()
        .with_audience(SECRET_MANAGER_AUDIENCE)
        .with_scopes(&[CLOUD_PLATFORM_SCOPE]);
    let provider = DefaultTokenSourceProvider::new(config)
        .await
        .context("initializing Secret Manager token source")?;
    provider
        .token_source()
        .token()
        .await
        .map_err(|e| anyhow!("fetching access token: {e}"))
}
