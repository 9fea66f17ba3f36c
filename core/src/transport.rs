//! Transports execute `HttpRequest`s on behalf of the client.
//!
//! # Design
//! The gateway never performs I/O itself; a `Transport` is the host's half of
//! the host-does-IO split. `ReqwestTransport` talks to a real server and
//! keeps a cookie jar, so the HTTP-only session cookie set by register/login
//! rides along on every credentialed request. `ScriptedTransport` replays
//! canned responses and records what was sent.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::Url;

use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};

#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform the round-trip. Non-2xx statuses are responses, not errors;
    /// `Err` is reserved for requests that produced no response at all.
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ApiError>;

    /// Best-effort local expiry of cookie `name`. Transports without a
    /// cookie jar ignore it.
    fn expire_cookie(&self, _name: &str) {}
}

/// HTTP transport backed by `reqwest`, with a cookie jar shared by every
/// credentialed request.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    origin: Url,
    jar: Arc<Jar>,
    credentialed: reqwest::Client,
    anonymous: reqwest::Client,
}

impl ReqwestTransport {
    /// Transport for the API at `base_url`; cookies are scoped to it.
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        let origin = Url::parse(base_url).map_err(|e| ApiError::Transport(format!("invalid base URL: {e}")))?;
        let jar = Arc::new(Jar::default());
        let credentialed = reqwest::Client::builder()
            .cookie_provider(Arc::clone(&jar))
            .build()
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        let anonymous = reqwest::Client::builder()
            .build()
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        Ok(Self {
            origin,
            jar,
            credentialed,
            anonymous,
        })
    }

    /// Current value of cookie `name` in the jar, if any.
    pub fn cookie(&self, name: &str) -> Option<String> {
        let header = self.jar.cookies(&self.origin)?;
        let header = header.to_str().ok()?;
        header.split(';').find_map(|pair| {
            let (key, value) = pair.trim().split_once('=')?;
            (key == name).then(|| value.to_string())
        })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        let client = if request.with_credentials {
            &self.credentialed
        } else {
            &self.anonymous
        };
        let method = match request.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
        };

        let mut builder = client.request(method, request.url.as_str());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|e| ApiError::Transport(e.to_string()))?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
            .collect();
        let body = response.text().await.map_err(|e| ApiError::Transport(e.to_string()))?;

        Ok(HttpResponse { status, headers, body })
    }

    fn expire_cookie(&self, name: &str) {
        let expired = format!("{name}=; Expires=Thu, 01 Jan 1970 00:00:00 GMT; Path=/");
        self.jar.add_cookie_str(&expired, &self.origin);
    }
}

/// Transport that answers from a queue of canned responses and records every
/// request it receives. Runs out with `ApiError::Transport`.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    responses: Mutex<VecDeque<HttpResponse>>,
    requests: Mutex<Vec<HttpRequest>>,
    expired_cookies: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `response` as the answer to the next unanswered request.
    pub fn respond(self, response: HttpResponse) -> Self {
        self.push(response);
        self
    }

    pub fn push(&self, response: HttpResponse) {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(response);
    }

    /// Requests received so far, oldest first.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn expired_cookies(&self) -> Vec<String> {
        self.expired_cookies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        let url = request.url.clone();
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .ok_or_else(|| ApiError::Transport(format!("no scripted response for {url}")))
    }

    fn expire_cookie(&self, name: &str) {
        self.expired_cookies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(name.to_string());
    }
}
