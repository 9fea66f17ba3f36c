//! Domain DTOs for the posts API.
//!
//! # Design
//! These types mirror the server's JSON but are defined independently of the
//! mock-server crate; integration tests catch schema drift between the two.
//! Envelope types stay private to the crate: callers only ever see the
//! unwrapped `User` and `Post` values.

use serde::{Deserialize, Serialize};

/// The authenticated user as reported by the auth endpoints.
///
/// Register and login only return `id`, `email` and `name`; `/api/auth/me`
/// also fills in `image` and `role`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

/// A single post. Timestamps are kept as the RFC 3339 strings the server
/// sends.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Post {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub content: String,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_image: Option<String>,
}

/// Request payload for creating or replacing a post.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PostInput {
    pub title: String,
    pub content: String,
}

/// Request payload for `/api/auth/register`.
#[derive(Debug, Clone, Serialize)]
pub struct RegisterInput<'a> {
    pub email: &'a str,
    pub password: &'a str,
    pub name: &'a str,
}

/// Request payload for `/api/auth/login`.
#[derive(Debug, Clone, Serialize)]
pub struct LoginInput<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

/// `{"posts": [...]}`; a missing or `null` field reads as empty.
#[derive(Debug, Deserialize)]
pub(crate) struct PostList {
    #[serde(default)]
    pub posts: Option<Vec<Post>>,
}

/// `{"post": {...}}`
#[derive(Debug, Deserialize)]
pub(crate) struct PostEnvelope {
    pub post: Post,
}

/// `/api/auth/me` wraps the user in `{"user": ...}`; register and login do
/// not.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum UserPayload {
    Wrapped { user: User },
    Bare(User),
}

impl From<UserPayload> for User {
    fn from(payload: UserPayload) -> Self {
        match payload {
            UserPayload::Wrapped { user } | UserPayload::Bare(user) => user,
        }
    }
}
