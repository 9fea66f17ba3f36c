//! Request gateway: the single path every API call goes through.
//!
//! # Design
//! `Gateway` holds only the base URL. `build` turns an endpoint plus
//! `RequestOptions` into an `HttpRequest`; `parse` turns the resulting
//! `HttpResponse` into JSON or an `ApiError`. Neither touches the network, so
//! the 401 handling and error surfacing are testable without a server.
//!
//! A 401 does not navigate anywhere. When the caller runs with a location
//! (a browser-like host) and is not already on an auth page, the failure is
//! wrapped in `ApiError::AuthRequired` and the host decides what to do.

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};

/// Page the host should show when a request needs a fresh login.
pub const LOGIN_PATH: &str = "/login";

const AUTH_PAGE_PREFIXES: [&str; 2] = ["/login", "/register"];

/// The host's current page, for hosts that have one.
pub trait Location: Send + Sync {
    fn pathname(&self) -> String;
}

impl<F> Location for F
where
    F: Fn() -> String + Send + Sync,
{
    fn pathname(&self) -> String {
        self()
    }
}

/// True for pages that belong to the login/registration flow.
pub fn is_auth_page(pathname: &str) -> bool {
    AUTH_PAGE_PREFIXES.iter().any(|prefix| pathname.starts_with(prefix))
}

/// Whether the transport attaches its cookies to a request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Credentials {
    #[default]
    Include,
    Omit,
}

/// Per-request options. Defaults to a credentialed GET with no body, no
/// extra headers and the auth-required outcome enabled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOptions {
    pub method: HttpMethod,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    pub credentials: Credentials,
    /// Suppress `ApiError::AuthRequired` on 401; the plain failure is
    /// returned instead.
    pub skip_auth_redirect: bool,
}

impl RequestOptions {
    pub fn new(method: HttpMethod) -> Self {
        Self {
            method,
            ..Self::default()
        }
    }

    /// Serialize `body` as the JSON request body.
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, ApiError> {
        let body = serde_json::to_string(body).map_err(|e| ApiError::Serialization(e.to_string()))?;
        self.body = Some(body);
        Ok(self)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Send the request without the session cookie.
    pub fn without_credentials(mut self) -> Self {
        self.credentials = Credentials::Omit;
        self
    }

    pub fn without_auth_redirect(mut self) -> Self {
        self.skip_auth_redirect = true;
        self
    }
}

#[derive(Debug, Clone)]
pub struct Gateway {
    base_url: String,
}

impl Gateway {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build the request for `endpoint`. The request is credentialed unless
    /// the options omit credentials, and starts from
    /// `content-type: application/json`; caller headers replace defaults of
    /// the same name and are appended otherwise.
    pub fn build(&self, endpoint: &str, options: &RequestOptions) -> HttpRequest {
        let mut headers = vec![("content-type".to_string(), "application/json".to_string())];
        for (name, value) in &options.headers {
            match headers.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(name)) {
                Some(existing) => *existing = (name.clone(), value.clone()),
                None => headers.push((name.clone(), value.clone())),
            }
        }

        HttpRequest {
            method: options.method,
            url: format!("{}{endpoint}", self.base_url),
            headers,
            body: options.body.clone(),
            with_credentials: options.credentials == Credentials::Include,
        }
    }

    /// Interpret a response. `pathname` is the host's current page, or
    /// `None` when the host has no notion of pages.
    pub fn parse(
        &self,
        response: HttpResponse,
        options: &RequestOptions,
        pathname: Option<&str>,
    ) -> Result<Value, ApiError> {
        if response.is_success() {
            if response.body.trim().is_empty() {
                return Ok(Value::Null);
            }
            return serde_json::from_str(&response.body).map_err(|e| ApiError::Deserialization(e.to_string()));
        }

        let status = response.status;
        let failure = match serde_json::from_str::<Value>(&response.body) {
            Ok(body) => ApiError::Server { status, body },
            Err(_) => ApiError::Parse { status },
        };
        let content_type = response.header("content-type").unwrap_or("none");
        warn!(status, content_type, error = %failure, "request failed");

        if status == 401 && !options.skip_auth_redirect {
            if let Some(path) = pathname.filter(|p| !is_auth_page(p)) {
                debug!(from = path, to = LOGIN_PATH, "authentication required");
                return Err(ApiError::AuthRequired {
                    redirect_to: LOGIN_PATH.to_string(),
                    source: Box::new(failure),
                });
            }
        }

        Err(failure)
    }
}
