//! # Session cookies
//!
//! The access token lives in a short-lived HttpOnly cookie, the refresh token in a
//! longer one. Both are rewritten together whenever the session is refreshed or
//! cleared.

use axum::http::{HeaderMap, HeaderValue, header::COOKIE, header::SET_COOKIE};
use cookie::{Cookie, SameSite, time::Duration};
use tracing::warn;

/// Cookie name for the access token
pub const ACCESS_COOKIE_NAME: &str = "sb-access-token";

/// Cookie name for the refresh token
pub const REFRESH_COOKIE_NAME: &str = "sb-refresh-token";

const REFRESH_MAX_AGE_DAYS: i64 = 30;
const DEFAULT_ACCESS_MAX_AGE_SECS: i64 = 3600;

#[derive(Debug, Clone)]
pub struct CookieConfig {
    /// Should be true anywhere behind HTTPS
    pub secure: bool,
    pub path: String,
    pub same_site: SameSite,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            secure: true,
            path: "/".to_string(),
            // Lax so links into /admin from elsewhere still carry the session
            same_site: SameSite::Lax,
        }
    }
}

impl CookieConfig {
    pub fn new(secure: bool) -> Self {
        Self {
            secure,
            ..Default::default()
        }
    }

    fn build(&self, name: &'static str, value: String, max_age: Duration) -> Cookie<'static> {
        Cookie::build((name, value))
            .path(self.path.clone())
            .http_only(true)
            .secure(self.secure)
            .same_site(self.same_site)
            .max_age(max_age)
            .build()
    }

    /// Both cookies for a fresh token pair.
    pub fn session_cookies(
        &self,
        access_token: &str,
        refresh_token: &str,
        expires_in: Option<i64>,
    ) -> [Cookie<'static>; 2] {
        let access_max_age = expires_in
            .filter(|secs| *secs > 0)
            .unwrap_or(DEFAULT_ACCESS_MAX_AGE_SECS);

        [
            self.build(
                ACCESS_COOKIE_NAME,
                access_token.to_string(),
                Duration::seconds(access_max_age),
            ),
            self.build(
                REFRESH_COOKIE_NAME,
                refresh_token.to_string(),
                Duration::days(REFRESH_MAX_AGE_DAYS),
            ),
        ]
    }

    /// Expired copies of both cookies, so the browser drops them.
    pub fn clear_cookies(&self) -> [Cookie<'static>; 2] {
        [
            self.build(ACCESS_COOKIE_NAME, String::new(), Duration::ZERO),
            self.build(REFRESH_COOKIE_NAME, String::new(), Duration::ZERO),
        ]
    }
}

/// Appends one `Set-Cookie` per cookie.
pub fn append_cookies<'a, I>(headers: &mut HeaderMap, cookies: I)
where
    I: IntoIterator<Item = &'a Cookie<'static>>,
{
    for cookie in cookies {
        match HeaderValue::from_str(&cookie.to_string()) {
            Ok(value) => {
                headers.append(SET_COOKIE, value);
            }
            Err(e) => warn!("Dropping unencodable cookie {}: {e}", cookie.name()),
        }
    }
}

/// Looks a cookie up across every `Cookie` header on the request.
pub fn find_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| Cookie::split_parse(value))
        .filter_map(Result::ok)
        .find(|c| c.name() == name && !c.value().is_empty())
        .map(|c| c.value().to_string())
}
