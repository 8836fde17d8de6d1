//! # Sessions
//!
//! Every page starts by turning the request's cookies into a [`Session`].
//! The session is an explicit value handed to the page controller; nothing
//! reads it from ambient state.
//!
//! ## Resolution
//!
//! - No cookies: anonymous, no round trip.
//! - Access token about to expire (within the configured leeway) and a refresh
//!   token present: refresh straight away.
//! - Otherwise ask the auth service who the token belongs to. A rejected token
//!   falls back to the refresh token, and a rejected refresh token clears both
//!   cookies.
//! - The auth service being down is [`SessionError::Unavailable`], never anonymous.
//!
//! Any new token pair (or a clear) comes back as a [`CookieUpdate`] that the
//! response writes no matter how the page ends.
use std::convert::Infallible;

use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, request::Parts},
};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use cookie::Cookie;
use serde::{Deserialize, Serialize};
use store::{AuthClient, AuthError, AuthUser, TokenGrant};
use thiserror::Error;
use tracing::{debug, info};

use crate::cookies::{ACCESS_COOKIE_NAME, CookieConfig, REFRESH_COOKIE_NAME, find_cookie};

/// Tokens carried by the request's cookies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

impl Credentials {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            access_token: find_cookie(headers, ACCESS_COOKIE_NAME),
            refresh_token: find_cookie(headers, REFRESH_COOKIE_NAME),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none()
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Credentials {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_headers(&parts.headers))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub id: String,
    pub email: Option<String>,
    pub role: Option<String>,
}

impl From<AuthUser> for Principal {
    fn from(user: AuthUser) -> Self {
        Self {
            id: user.id,
            email: user.email,
            role: user.role,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    principal: Option<Principal>,
    access_token: Option<String>,
}

impl Session {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn authenticated(principal: Principal, access_token: String) -> Self {
        Self {
            principal: Some(principal),
            access_token: Some(access_token),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.principal.is_some()
    }

    pub fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }
}

/// What the response must do to the browser's session cookies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CookieUpdate {
    Issue {
        access_token: String,
        refresh_token: String,
        expires_in: Option<i64>,
    },
    Clear,
}

impl CookieUpdate {
    pub fn cookies(&self, config: &CookieConfig) -> [Cookie<'static>; 2] {
        match self {
            Self::Issue {
                access_token,
                refresh_token,
                expires_in,
            } => config.session_cookies(access_token, refresh_token, *expires_in),
            Self::Clear => config.clear_cookies(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedSession {
    pub session: Session,
    pub cookies: Option<CookieUpdate>,
}

impl ResolvedSession {
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Anonymous, and the stale cookies go away.
    pub fn cleared() -> Self {
        Self {
            session: Session::anonymous(),
            cookies: Some(CookieUpdate::Clear),
        }
    }

    pub fn current(user: AuthUser, access_token: String) -> Self {
        Self {
            session: Session::authenticated(user.into(), access_token),
            cookies: None,
        }
    }

    pub fn issued(grant: TokenGrant) -> Self {
        let cookies = CookieUpdate::Issue {
            access_token: grant.access_token.clone(),
            refresh_token: grant.refresh_token,
            expires_in: grant.expires_in,
        };

        Self {
            session: Session::authenticated(grant.user.into(), grant.access_token),
            cookies: Some(cookies),
        }
    }
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session service unavailable: {0}")]
    Unavailable(#[source] AuthError),

    #[error("Invalid email or password")]
    Rejected,
}

/// The one way pages learn who is asking.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Never fails for a missing or stale session, only for an unreachable service.
    async fn resolve(&self, credentials: &Credentials) -> Result<ResolvedSession, SessionError>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<ResolvedSession, SessionError>;

    async fn sign_out(&self, access_token: &str) -> Result<(), SessionError>;
}

pub struct AuthServiceSessions {
    auth: AuthClient,
    refresh_leeway_secs: i64,
}

impl AuthServiceSessions {
    pub fn new(auth: AuthClient, refresh_leeway_secs: i64) -> Self {
        Self {
            auth,
            refresh_leeway_secs,
        }
    }

    async fn refresh(&self, refresh_token: &str) -> Result<ResolvedSession, SessionError> {
        match self.auth.refresh(refresh_token).await {
            Ok(grant) => {
                info!("Refreshed session for {}", grant.user.id);
                Ok(ResolvedSession::issued(grant))
            }
            Err(AuthError::Rejected) => {
                debug!("Refresh token rejected, clearing session");
                Ok(ResolvedSession::cleared())
            }
            Err(e) => Err(SessionError::Unavailable(e)),
        }
    }

    fn expires_soon(&self, access_token: &str) -> bool {
        token_expiry(access_token)
            .is_some_and(|exp| exp - chrono::Utc::now().timestamp() <= self.refresh_leeway_secs)
    }
}

#[async_trait]
impl SessionProvider for AuthServiceSessions {
    async fn resolve(&self, credentials: &Credentials) -> Result<ResolvedSession, SessionError> {
        let refresh_token = credentials.refresh_token.as_deref();

        let Some(access_token) = credentials.access_token.as_deref() else {
            // browser already dropped the expired access cookie
            return match refresh_token {
                Some(refresh_token) => self.refresh(refresh_token).await,
                None => Ok(ResolvedSession::anonymous()),
            };
        };

        if let Some(refresh_token) = refresh_token {
            if self.expires_soon(access_token) {
                return self.refresh(refresh_token).await;
            }
        }

        match self.auth.get_user(access_token).await {
            Ok(user) => Ok(ResolvedSession::current(user, access_token.to_string())),
            Err(AuthError::Rejected) => match refresh_token {
                Some(refresh_token) => self.refresh(refresh_token).await,
                None => Ok(ResolvedSession::cleared()),
            },
            Err(e) => Err(SessionError::Unavailable(e)),
        }
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<ResolvedSession, SessionError> {
        match self.auth.sign_in(email, password).await {
            Ok(grant) => {
                info!("Signed in {}", grant.user.id);
                Ok(ResolvedSession::issued(grant))
            }
            Err(AuthError::Rejected) => Err(SessionError::Rejected),
            Err(e) => Err(SessionError::Unavailable(e)),
        }
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), SessionError> {
        match self.auth.sign_out(access_token).await {
            // already gone server side
            Ok(()) | Err(AuthError::Rejected) => Ok(()),
            Err(e) => Err(SessionError::Unavailable(e)),
        }
    }
}

#[derive(Deserialize)]
struct Claims {
    exp: Option<i64>,
}

/// Reads `exp` out of a JWT without checking the signature. The auth service does
/// the real validation; this only decides whether to refresh early.
pub fn token_expiry(token: &str) -> Option<i64> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;

    serde_json::from_slice::<Claims>(&bytes).ok()?.exp
}
