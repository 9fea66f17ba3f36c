//! Session manager: register, login, logout and current-user lookup.
//!
//! # Design
//! The "current user" lives in a `SessionStore` that the caller creates and
//! passes in, so several clients (or tests) can keep independent sessions.
//! The store is a `tokio::sync::watch` channel: every write replaces the
//! whole value and subscribers observe the latest one. Failed calls never
//! touch the store.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::watch;
use tracing::info;

use crate::client::ApiClient;
use crate::error::ApiError;
use crate::gateway::RequestOptions;
use crate::http::HttpMethod;
use crate::transport::Transport;
use crate::types::{LoginInput, RegisterInput, User, UserPayload};

pub const REGISTER_ENDPOINT: &str = "/api/auth/register";
pub const LOGIN_ENDPOINT: &str = "/api/auth/login";
pub const ME_ENDPOINT: &str = "/api/auth/me";

/// Observable holder of the currently authenticated user.
#[derive(Debug, Clone)]
pub struct SessionStore {
    tx: Arc<watch::Sender<Option<User>>>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    pub fn current(&self) -> Option<User> {
        self.tx.borrow().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// Receiver that observes every subsequent change.
    pub fn subscribe(&self) -> watch::Receiver<Option<User>> {
        self.tx.subscribe()
    }

    pub fn set(&self, user: Option<User>) {
        self.tx.send_replace(user);
    }

    pub fn clear(&self) {
        self.set(None);
    }
}

pub struct SessionManager<'a, T> {
    api: &'a ApiClient<T>,
    store: &'a SessionStore,
}

impl<'a, T: Transport> SessionManager<'a, T> {
    pub fn new(api: &'a ApiClient<T>, store: &'a SessionStore) -> Self {
        Self { api, store }
    }

    /// Create an account. A failed registration never asks for a login
    /// redirect.
    pub async fn register(&self, email: &str, password: &str, name: &str) -> Result<User, ApiError> {
        let options = RequestOptions::new(HttpMethod::Post)
            .json(&RegisterInput { email, password, name })?
            .without_auth_redirect();
        let user = self.authenticate(REGISTER_ENDPOINT, options).await?;
        info!(user_id = user.id, "registered");
        Ok(user)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<User, ApiError> {
        let options = RequestOptions::new(HttpMethod::Post)
            .json(&LoginInput { email, password })?
            .without_auth_redirect();
        let user = self.authenticate(LOGIN_ENDPOINT, options).await?;
        info!(user_id = user.id, "logged in");
        Ok(user)
    }

    /// Forget the session locally. The server is not contacted; the
    /// transport is asked to expire its copy of the session cookie.
    pub fn logout(&self) {
        self.api.transport().expire_cookie(self.api.session_cookie());
        self.store.clear();
        info!("logged out");
    }

    /// Fetch the user behind the current session cookie. A 401 here yields
    /// the auth-required outcome on browser-like hosts.
    pub async fn get_user(&self) -> Result<User, ApiError> {
        self.authenticate(ME_ENDPOINT, RequestOptions::new(HttpMethod::Get)).await
    }

    async fn authenticate(&self, endpoint: &str, options: RequestOptions) -> Result<User, ApiError> {
        let data = self.api.request(endpoint, options).await?;
        let user = parse_user(data)?;
        self.store.set(Some(user.clone()));
        Ok(user)
    }
}

/// Read a user from an auth response, bare or wrapped in `{"user": ...}`.
pub fn parse_user(data: Value) -> Result<User, ApiError> {
    serde_json::from_value::<UserPayload>(data)
        .map(User::from)
        .map_err(|e| ApiError::Deserialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::config::ClientConfig;
    use crate::http::HttpResponse;
    use crate::transport::ScriptedTransport;

    fn api(responses: Vec<HttpResponse>) -> ApiClient<ScriptedTransport> {
        let transport = responses
            .into_iter()
            .fold(ScriptedTransport::new(), ScriptedTransport::respond);
        ApiClient::new(&ClientConfig::new("http://api.test"), transport)
    }

    fn sample_user() -> User {
        User {
            id: 1,
            email: "a@b.com".to_string(),
            name: String::new(),
            image: None,
            role: None,
        }
    }

    #[tokio::test]
    async fn login_sets_session_and_returns_user() {
        let api = api(vec![HttpResponse::json(200, &json!({ "id": 1, "email": "a@b.com" }))]);
        let store = SessionStore::new();

        let user = api.session(&store).login("a@b.com", "pw").await.unwrap();
        assert_eq!(user, sample_user());
        assert_eq!(store.current(), Some(sample_user()));

        let sent = &api.transport().requests()[0];
        assert_eq!(sent.url, "http://api.test/api/auth/login");
        assert_eq!(sent.method, HttpMethod::Post);
        let body: Value = serde_json::from_str(sent.body.as_deref().unwrap()).unwrap();
        assert_eq!(body, json!({ "email": "a@b.com", "password": "pw" }));
    }

    #[tokio::test]
    async fn register_sends_name_and_skips_redirect() {
        let api = api(vec![HttpResponse::json(401, &json!({ "error": "nope" }))])
            .with_location(|| "/posts".to_string());
        let store = SessionStore::new();

        let err = api.session(&store).register("a@b.com", "pw", "Ann").await.unwrap_err();
        assert!(err.redirect_to().is_none());
        assert!(store.current().is_none());

        let sent = &api.transport().requests()[0];
        assert_eq!(sent.url, "http://api.test/api/auth/register");
        let body: Value = serde_json::from_str(sent.body.as_deref().unwrap()).unwrap();
        assert_eq!(body, json!({ "email": "a@b.com", "password": "pw", "name": "Ann" }));
    }

    #[tokio::test]
    async fn failed_login_leaves_session_unchanged() {
        let api = api(vec![HttpResponse::json(401, &json!({ "error": "Invalid credentials" }))]);
        let store = SessionStore::new();
        store.set(Some(sample_user()));

        let err = api.session(&store).login("a@b.com", "wrong").await.unwrap_err();
        assert_eq!(err.message().as_deref(), Some("Invalid credentials"));
        assert_eq!(store.current(), Some(sample_user()));
    }

    #[tokio::test]
    async fn get_user_unwraps_envelope() {
        let api = api(vec![HttpResponse::json(
            200,
            &json!({ "user": { "id": 4, "email": "d@e.f", "name": "D", "image": "x.svg", "role": "user" } }),
        )]);
        let store = SessionStore::new();

        let user = api.session(&store).get_user().await.unwrap();
        assert_eq!(user.id, 4);
        assert_eq!(store.current().map(|u| u.name), Some("D".to_string()));
        assert_eq!(api.transport().requests()[0].method, HttpMethod::Get);
    }

    #[tokio::test]
    async fn get_user_unauthorized_requires_login() {
        let api = api(vec![HttpResponse::json(401, &json!({ "error": "Unauthorized" }))])
            .with_location(|| "/my-posts".to_string());
        let store = SessionStore::new();

        let err = api.session(&store).get_user().await.unwrap_err();
        assert_eq!(err.redirect_to(), Some("/login"));
        assert!(store.current().is_none());
    }

    #[tokio::test]
    async fn logout_clears_session_and_expires_cookie() {
        let api = api(Vec::new());
        let store = SessionStore::new();
        store.set(Some(sample_user()));

        api.session(&store).logout();
        assert!(!store.is_authenticated());
        assert!(api.transport().requests().is_empty());
        assert_eq!(api.transport().expired_cookies(), ["nimbledb-test_token"]);
    }

    #[tokio::test]
    async fn subscribers_observe_transitions() {
        let api = api(vec![HttpResponse::json(200, &json!({ "id": 1, "email": "a@b.com" }))]);
        let store = SessionStore::new();
        let mut rx = store.subscribe();

        api.session(&store).login("a@b.com", "pw").await.unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().clone(), Some(sample_user()));

        api.session(&store).logout();
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().is_none());
    }

    #[test]
    fn parse_user_rejects_unknown_shape() {
        let err = parse_user(json!({ "message": "ok" })).unwrap_err();
        assert!(matches!(err, ApiError::Deserialization(_)));
    }
}
