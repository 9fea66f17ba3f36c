//! Async API client: gateway plus transport.
//!
//! `ApiClient::request` is the one operation everything else is built on:
//! build the request, hand it to the transport, parse the response.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::gateway::{Gateway, Location, RequestOptions};
use crate::posts::PostsClient;
use crate::session::{SessionManager, SessionStore};
use crate::transport::{ReqwestTransport, Transport};

pub struct ApiClient<T> {
    gateway: Gateway,
    transport: T,
    location: Option<Arc<dyn Location>>,
    session_cookie: String,
}

impl<T: Transport> ApiClient<T> {
    pub fn new(config: &ClientConfig, transport: T) -> Self {
        Self {
            gateway: Gateway::new(&config.base_url),
            transport,
            location: None,
            session_cookie: config.session_cookie.clone(),
        }
    }

    /// Run as a browser-like host whose current page is reported by
    /// `location`. Enables the `ApiError::AuthRequired` outcome.
    pub fn with_location(mut self, location: impl Location + 'static) -> Self {
        self.location = Some(Arc::new(location));
        self
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn session_cookie(&self) -> &str {
        &self.session_cookie
    }

    /// Issue a request to `endpoint` (relative to the base URL) and return the
    /// parsed JSON body.
    pub async fn request(&self, endpoint: &str, options: RequestOptions) -> Result<Value, ApiError> {
        let request = self.gateway.build(endpoint, &options);
        debug!(method = %request.method, url = %request.url, "sending request");

        let response = self.transport.execute(request).await?;
        debug!(status = response.status, endpoint, "received response");

        let pathname = self.location.as_ref().map(|location| location.pathname());
        self.gateway.parse(response, &options, pathname.as_deref())
    }

    /// Auth operations recording their outcome in `store`.
    pub fn session<'a>(&'a self, store: &'a SessionStore) -> SessionManager<'a, T> {
        SessionManager::new(self, store)
    }

    pub fn posts(&self) -> PostsClient<'_, T> {
        PostsClient::new(self)
    }
}

impl ApiClient<ReqwestTransport> {
    /// Client speaking HTTP to `config.base_url`.
    pub fn connect(config: &ClientConfig) -> Result<Self, ApiError> {
        let transport = ReqwestTransport::new(&config.base_url)?;
        Ok(Self::new(config, transport))
    }
}

impl<T: fmt::Debug> fmt::Debug for ApiClient<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("gateway", &self.gateway)
            .field("transport", &self.transport)
            .field("has_location", &self.location.is_some())
            .field("session_cookie", &self.session_cookie)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::RwLock;

    use serde_json::json;

    use super::*;
    use crate::http::{HttpMethod, HttpResponse};
    use crate::transport::ScriptedTransport;

    fn client(transport: ScriptedTransport) -> ApiClient<ScriptedTransport> {
        ApiClient::new(&ClientConfig::new("http://api.test"), transport)
    }

    #[tokio::test]
    async fn request_sends_built_request_and_parses_body() {
        let api = client(ScriptedTransport::new().respond(HttpResponse::json(200, &json!({ "ok": true }))));

        let options = RequestOptions::new(HttpMethod::Post).json(&json!({ "a": 1 })).unwrap();
        let value = api.request("/api/things", options).await.unwrap();
        assert_eq!(value, json!({ "ok": true }));

        let sent = api.transport().requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].url, "http://api.test/api/things");
        assert_eq!(sent[0].method, HttpMethod::Post);
        assert!(sent[0].with_credentials);
        assert_eq!(sent[0].header("content-type"), Some("application/json"));
    }

    #[tokio::test]
    async fn request_without_location_never_requires_login() {
        let api = client(ScriptedTransport::new().respond(HttpResponse::json(401, &json!({ "error": "Unauthorized" }))));
        let err = api.request("/api/auth/me", RequestOptions::default()).await.unwrap_err();
        assert!(err.redirect_to().is_none());
        assert!(err.is_unauthorized());
    }

    #[tokio::test]
    async fn request_reads_location_at_response_time() {
        let page = Arc::new(RwLock::new("/login".to_string()));
        let current = Arc::clone(&page);
        let api = client(
            ScriptedTransport::new()
                .respond(HttpResponse::json(401, &json!({ "error": "Unauthorized" })))
                .respond(HttpResponse::json(401, &json!({ "error": "Unauthorized" }))),
        )
        .with_location(move || current.read().unwrap().clone());

        let err = api.request("/api/posts/my/posts", RequestOptions::default()).await.unwrap_err();
        assert!(err.redirect_to().is_none());

        *page.write().unwrap() = "/dashboard".to_string();
        let err = api.request("/api/posts/my/posts", RequestOptions::default()).await.unwrap_err();
        assert_eq!(err.redirect_to(), Some("/login"));
    }

    #[tokio::test]
    async fn transport_failure_propagates() {
        let api = client(ScriptedTransport::new());
        let err = api.request("/api/posts/", RequestOptions::default()).await.unwrap_err();
        assert!(matches!(err, ApiError::Transport(_)));
    }
}
