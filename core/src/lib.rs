//! Async client for the Nimble posts API.
//!
//! # Overview
//! Three layers, composed linearly:
//! - `Gateway` builds plain-data `HttpRequest`s and parses `HttpResponse`s
//!   (JSON headers, credentials, 401 handling, error surfacing).
//! - `SessionManager` registers, logs in and out, and tracks the current
//!   user in an injectable `SessionStore`.
//! - `PostsClient` does CRUD on `/api/posts`.
//!
//! # Design
//! - The gateway never does I/O; a `Transport` executes requests
//!   (host-does-IO). `ReqwestTransport` is the real one, `ScriptedTransport`
//!   replays canned responses.
//! - A 401 on a browser-like host surfaces as `ApiError::AuthRequired`
//!   instead of navigating; the host decides what to do with it.
//! - DTOs are defined independently from the mock-server crate; integration
//!   tests catch schema drift.

pub mod client;
pub mod config;
pub mod error;
pub mod gateway;
pub mod http;
pub mod posts;
pub mod session;
pub mod transport;
pub mod types;

pub use client::ApiClient;
pub use config::{ClientConfig, ConfigError, DEFAULT_SESSION_COOKIE};
pub use error::{ApiError, FALLBACK_MESSAGE};
pub use gateway::{is_auth_page, Credentials, Gateway, Location, RequestOptions, LOGIN_PATH};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use posts::PostsClient;
pub use session::{SessionManager, SessionStore};
pub use transport::{ReqwestTransport, ScriptedTransport, Transport};
pub use types::{Post, PostInput, User};
