//! # Auth API
//!
//! The hosted database ships its own auth service. We only need four calls:
//!
//! - `GET /user`: who does this access token belong to
//! - `POST /token?grant_type=refresh_token`: trade a refresh token for a new pair
//! - `POST /token?grant_type=password`: sign in
//! - `POST /logout`: revoke the session server side
//!
//! A rejected token is not a failure of the service. Those come back as
//! [`AuthError::Rejected`] so the caller can fall back to anonymous, while
//! transport and 5xx problems stay distinguishable through
//! [`AuthError::is_unavailable`].
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::json;
use tracing::debug;
use url::Url;

use crate::error::AuthError;

const AUTH_PATH: &str = "auth/v1/";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

/// Successful answer from the token endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: String,
    /// Lifetime of the access token in seconds
    #[serde(default)]
    pub expires_in: Option<i64>,
    pub user: AuthUser,
}

#[derive(Clone)]
pub struct AuthClient {
    client: Client,
    base: Url,
    api_key: String,
}

impl AuthClient {
    pub fn new(client: Client, project_url: &Url, api_key: impl Into<String>) -> Result<Self, url::ParseError> {
        Ok(Self {
            client,
            base: project_url.join(AUTH_PATH)?,
            api_key: api_key.into(),
        })
    }

    pub async fn get_user(&self, access_token: &str) -> Result<AuthUser, AuthError> {
        let response = self
            .client
            .get(self.endpoint("user")?)
            .header("apikey", &self.api_key)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(AuthError::Unreachable)?;

        decode(response).await
    }

    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, AuthError> {
        debug!("Refreshing session");

        self.token("refresh_token", json!({ "refresh_token": refresh_token }))
            .await
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<TokenGrant, AuthError> {
        self.token("password", json!({ "email": email, "password": password }))
            .await
    }

    /// Revokes the refresh tokens tied to `access_token`.
    pub async fn sign_out(&self, access_token: &str) -> Result<(), AuthError> {
        let response = self
            .client
            .post(self.endpoint("logout")?)
            .header("apikey", &self.api_key)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(AuthError::Unreachable)?;

        check(response).await.map(|_| ())
    }

    async fn token(&self, grant_type: &str, body: serde_json::Value) -> Result<TokenGrant, AuthError> {
        let response = self
            .client
            .post(self.endpoint("token")?)
            .query(&[("grant_type", grant_type)])
            .header("apikey", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(AuthError::Unreachable)?;

        decode(response).await
    }

    fn endpoint(&self, path: &str) -> Result<Url, AuthError> {
        self.base
            .join(path)
            .map_err(|e| AuthError::Decode(e.to_string()))
    }
}

async fn check(response: Response) -> Result<Response, AuthError> {
    let status = response.status();

    if status.is_success() {
        return Ok(response);
    }

    // the service answers 400 for a spent refresh token and 422 for bad sign-in payloads
    if matches!(
        status,
        StatusCode::BAD_REQUEST
            | StatusCode::UNAUTHORIZED
            | StatusCode::FORBIDDEN
            | StatusCode::NOT_FOUND
            | StatusCode::UNPROCESSABLE_ENTITY
    ) {
        return Err(AuthError::Rejected);
    }

    let message = response.text().await.unwrap_or_default();

    Err(AuthError::Service { status, message })
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, AuthError> {
    check(response)
        .await?
        .json()
        .await
        .map_err(|e| AuthError::Decode(e.to_string()))
}
