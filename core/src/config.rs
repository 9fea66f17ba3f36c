//! Client configuration.

/// Name of the session cookie the server sets on register and login.
pub const DEFAULT_SESSION_COOKIE: &str = "nimbledb-test_token";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable `{0}`")]
    MissingVar(&'static str),
    #[error("invalid base URL `{0}`")]
    InvalidBaseUrl(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub base_url: String,
    pub session_cookie: String,
}

impl ClientConfig {
    /// Config for `base_url` with the default session cookie name. A
    /// trailing `/` is stripped so endpoints can be appended verbatim.
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            session_cookie: DEFAULT_SESSION_COOKIE.to_string(),
        }
    }

    /// Build config from environment variables.
    ///
    /// Required:
    /// - `API_URL`: base URL of the API, e.g. `http://127.0.0.1:3000`
    ///
    /// Optional:
    /// - `SESSION_COOKIE`: session cookie name (default `nimbledb-test_token`)
    pub fn from_env() -> Result<Self, ConfigError> {
        let base_url = std::env::var("API_URL").map_err(|_| ConfigError::MissingVar("API_URL"))?;
        let session_cookie = std::env::var("SESSION_COOKIE").ok();
        Self::from_parts(&base_url, session_cookie.as_deref())
    }

    fn from_parts(base_url: &str, session_cookie: Option<&str>) -> Result<Self, ConfigError> {
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ConfigError::InvalidBaseUrl(base_url.to_string()));
        }
        let mut config = Self::new(base_url);
        if let Some(name) = session_cookie.filter(|n| !n.trim().is_empty()) {
            config.session_cookie = name.trim().to_string();
        }
        Ok(config)
    }
}
