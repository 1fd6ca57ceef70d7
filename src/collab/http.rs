use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

use super::{CollabError, Issuer, LoginGrant, PrincipalRoles, ProfileSource, RoleAssignmentRecord, RoleSource};
use crate::config::IssuerConfig;
use crate::types::{Credentials, Principal};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshResponse {
    access_token: String,
}

/// HTTP adapter for the issuer, profile and role-table services
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base: Url,
}

/// Classify a non-success status.
///
/// 401/403 are explicit credential rejections. Timeouts, throttling and server
/// errors are transient. Anything else is an unexpected response.
pub fn classify_status(status: StatusCode, body: &str) -> CollabError {
    let detail = if body.is_empty() {
        status.to_string()
    } else {
        format!("{}: {}", status, body.chars().take(200).collect::<String>())
    };

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => CollabError::AuthExpired(detail),
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => CollabError::Transient(detail),
        s if s.is_server_error() => CollabError::Transient(detail),
        _ => CollabError::Protocol(detail),
    }
}

fn classify_transport(err: reqwest::Error) -> CollabError {
    if err.is_decode() {
        CollabError::Protocol(err.to_string())
    } else {
        // Connect, timeout and body errors never prove the credentials are bad
        CollabError::Transient(err.to_string())
    }
}

impl HttpBackend {
    pub fn new(config: &IssuerConfig) -> anyhow::Result<Self> {
        let mut base = Url::parse(&config.base_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self { client, base })
    }

    fn endpoint(&self, path: &str) -> Result<Url, CollabError> {
        self.base
            .join(path)
            .map_err(|e| CollabError::Protocol(format!("invalid endpoint '{}': {}", path, e)))
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, CollabError> {
        let response = request.send().await.map_err(classify_transport)?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        response.json::<T>().await.map_err(classify_transport)
    }
}

#[async_trait]
impl Issuer for HttpBackend {
    async fn login(&self, credentials: &Credentials) -> Result<LoginGrant, CollabError> {
        let url = self.endpoint("api/login")?;
        self.send_json(self.client.post(url).json(credentials)).await
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<String, CollabError> {
        let url = self.endpoint("api/refresh-token")?;
        let response: RefreshResponse = self
            .send_json(self.client.post(url).json(&RefreshRequest { refresh_token }))
            .await?;

        if response.access_token.is_empty() {
            return Err(CollabError::Protocol("refresh response carried an empty access token".to_string()));
        }
        Ok(response.access_token)
    }
}

#[async_trait]
impl ProfileSource for HttpBackend {
    async fn get_profile(&self, access_token: &str) -> Result<Principal, CollabError> {
        let url = self.endpoint("api/user-profile")?;
        self.send_json(self.client.get(url).bearer_auth(access_token)).await
    }
}

#[async_trait]
impl RoleSource for HttpBackend {
    async fn get_role_assignments(&self) -> Result<Vec<RoleAssignmentRecord>, CollabError> {
        let url = self.endpoint("api/role-management")?;
        self.send_json(self.client.get(url)).await
    }

    async fn get_principal_roles(&self, principal_id: &str) -> Result<PrincipalRoles, CollabError> {
        let url = self.endpoint(&format!("api/user-roles/{}", principal_id))?;
        self.send_json(self.client.get(url)).await
    }
}
