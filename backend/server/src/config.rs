use std::{env, fmt::Display, fs::read_to_string, str::FromStr};

use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::locale::Locale;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid {key} value: {message}")]
    Invalid { key: &'static str, message: String },

    #[error("Missing secret {0}")]
    MissingSecret(&'static str),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Project root shared by the row API and the auth service
    pub store_url: Url,
    pub anon_key: String,
    /// Every protected page sends anonymous visitors here
    pub login_path: String,
    pub cookie_secure: bool,
    /// Refresh access tokens this many seconds before they expire
    pub refresh_leeway_secs: i64,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let store_url: String = try_load("STORE_URL", "http://localhost:54321")?;

        Ok(Self {
            port: try_load("RUST_PORT", "3000")?,
            store_url: project_url(&store_url)?,
            anon_key: read_secret("STORE_ANON_KEY")?,
            login_path: login_path(try_load("LOGIN_PATH", "/auth/login")?)?,
            cookie_secure: try_load("COOKIE_SECURE", "true")?,
            refresh_leeway_secs: try_load("REFRESH_LEEWAY_SECS", "60")?,
        })
    }

    /// Local defaults, for tests and wiring against a mock project.
    pub fn for_project(store_url: &str, anon_key: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            port: 0,
            store_url: project_url(store_url)?,
            anon_key: anon_key.to_string(),
            login_path: "/auth/login".to_string(),
            cookie_secure: false,
            refresh_leeway_secs: 60,
        })
    }
}

fn var(key: &str) -> Result<String, ()> {
    env::var(key).map_err(|_| {
        warn!("Environment variable {key} not found, using default");
    })
}

fn try_load<T: FromStr>(key: &'static str, default: &str) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    var(key)
        .unwrap_or_else(|_| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e: T::Err| ConfigError::Invalid {
            key,
            message: e.to_string(),
        })
}

/// Docker secret first, plain environment second.
fn read_secret(secret_name: &'static str) -> Result<String, ConfigError> {
    let path = format!("/run/secrets/{secret_name}");

    read_to_string(&path)
        .map(|s| s.trim().to_string())
        .or_else(|e| {
            warn!("Failed to read {secret_name} from file: {e}");
            env::var(secret_name)
        })
        .map_err(|_| ConfigError::MissingSecret(secret_name))
}

/// Joins against the project URL only behave if its path ends in a slash.
fn project_url(raw: &str) -> Result<Url, ConfigError> {
    let mut url = Url::parse(raw).map_err(|e| ConfigError::Invalid {
        key: "STORE_URL",
        message: e.to_string(),
    })?;

    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }

    Ok(url)
}

/// Paths the router already owns; registering the login page on top of one panics.
const RESERVED_PATHS: &[&str] = &["/", "/healthz", "/auth/logout"];

fn login_path(path: String) -> Result<String, ConfigError> {
    let invalid = |message: String| ConfigError::Invalid {
        key: "LOGIN_PATH",
        message,
    };

    if !path.starts_with('/') || path.starts_with("//") {
        return Err(invalid(format!("{path:?} must be a local absolute path")));
    }

    if RESERVED_PATHS.contains(&path.as_str()) || path == "/admin" || path.starts_with("/admin/") {
        return Err(invalid(format!("{path:?} is already routed")));
    }

    if path.contains(&['{', '}', '*', ':'][..]) {
        return Err(invalid(format!("{path:?} must be a literal path")));
    }

    let first = path[1..].split('/').next().unwrap_or_default();
    if first.parse::<Locale>().is_ok() {
        return Err(invalid(format!("{path:?} would shadow the {first} site")));
    }

    Ok(path)
}
