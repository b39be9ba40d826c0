use std::net::SocketAddr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub browserless_url: String,
    pub browserless_token: Option<String>,
    pub scraper_user_agent: String,
    pub scraper_nav_timeout_secs: u64,
    pub scraper_settle_delay_ms: u64,
    pub scraper_delay_min_ms: u64,
    pub scraper_delay_max_ms: u64,
    pub startup_scrape_delay_secs: u64,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("database_url", &"[redacted]")
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("browserless_url", &self.browserless_url)
            .field(
                "browserless_token",
                &self.browserless_token.as_ref().map(|_| "[redacted]"),
            )
            .field("scraper_user_agent", &self.scraper_user_agent)
            .field("scraper_nav_timeout_secs", &self.scraper_nav_timeout_secs)
            .field("scraper_settle_delay_ms", &self.scraper_settle_delay_ms)
            .field("scraper_delay_min_ms", &self.scraper_delay_min_ms)
            .field("scraper_delay_max_ms", &self.scraper_delay_max_ms)
            .field(
                "startup_scrape_delay_secs",
                &self.startup_scrape_delay_secs,
            )
            .finish()
    }
}
