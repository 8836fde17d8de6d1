use std::sync::Arc;

use reqwest::Client;
use store::{AuthClient, RestRowStore, RowStore};

use super::{
    config::Config,
    cookies::CookieConfig,
    session::{AuthServiceSessions, SessionProvider},
};

pub struct AppState {
    pub config: Config,
    pub cookies: CookieConfig,
    pub sessions: Arc<dyn SessionProvider>,
    pub store: Arc<dyn RowStore>,
}

impl AppState {
    /// Wires both remote services onto one shared connection pool.
    pub fn new(config: Config) -> anyhow::Result<Arc<Self>> {
        let client = Client::builder().build()?;

        let auth = AuthClient::new(client.clone(), &config.store_url, config.anon_key.clone())?;
        let store = RestRowStore::new(client, &config.store_url, config.anon_key.clone())?;
        let sessions = AuthServiceSessions::new(auth, config.refresh_leeway_secs);

        Ok(Self::with_parts(config, Arc::new(sessions), Arc::new(store)))
    }

    pub fn with_parts(
        config: Config,
        sessions: Arc<dyn SessionProvider>,
        store: Arc<dyn RowStore>,
    ) -> Arc<Self> {
        let cookies = CookieConfig::new(config.cookie_secure);

        Arc::new(Self {
            config,
            cookies,
            sessions,
            store,
        })
    }
}
