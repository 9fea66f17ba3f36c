//! Resource client for `/api/posts`.
//!
//! Every operation is one gateway round-trip followed by unwrapping the
//! `{"post": ...}` / `{"posts": [...]}` envelope. Errors from the gateway
//! pass through untouched.

use serde_json::Value;

use crate::client::ApiClient;
use crate::error::ApiError;
use crate::gateway::RequestOptions;
use crate::http::HttpMethod;
use crate::transport::Transport;
use crate::types::{Post, PostEnvelope, PostInput, PostList};

pub const POSTS_ENDPOINT: &str = "/api/posts/";
pub const MY_POSTS_ENDPOINT: &str = "/api/posts/my/posts";

pub fn post_endpoint(id: i64) -> String {
    format!("/api/posts/{id}")
}

pub struct PostsClient<'a, T> {
    api: &'a ApiClient<T>,
}

impl<'a, T: Transport> PostsClient<'a, T> {
    pub fn new(api: &'a ApiClient<T>) -> Self {
        Self { api }
    }

    pub async fn list_all(&self) -> Result<Vec<Post>, ApiError> {
        let data = self.api.request(POSTS_ENDPOINT, RequestOptions::new(HttpMethod::Get)).await?;
        parse_post_list(data)
    }

    pub async fn get_one(&self, id: i64) -> Result<Post, ApiError> {
        let data = self.api.request(&post_endpoint(id), RequestOptions::new(HttpMethod::Get)).await?;
        parse_post(data)
    }

    /// Posts owned by the session user.
    pub async fn list_mine(&self) -> Result<Vec<Post>, ApiError> {
        let data = self.api.request(MY_POSTS_ENDPOINT, RequestOptions::new(HttpMethod::Get)).await?;
        parse_post_list(data)
    }

    pub async fn create(&self, title: &str, content: &str) -> Result<Post, ApiError> {
        let options = RequestOptions::new(HttpMethod::Post).json(&input(title, content))?;
        let data = self.api.request(POSTS_ENDPOINT, options).await?;
        parse_post(data)
    }

    pub async fn update(&self, id: i64, title: &str, content: &str) -> Result<Post, ApiError> {
        let options = RequestOptions::new(HttpMethod::Put).json(&input(title, content))?;
        let data = self.api.request(&post_endpoint(id), options).await?;
        parse_post(data)
    }

    /// The response body, if any, is ignored.
    pub async fn delete(&self, id: i64) -> Result<(), ApiError> {
        self.api.request(&post_endpoint(id), RequestOptions::new(HttpMethod::Delete)).await?;
        Ok(())
    }
}

fn input(title: &str, content: &str) -> PostInput {
    PostInput {
        title: title.to_string(),
        content: content.to_string(),
    }
}

/// Read the `posts` array of a list response. A missing or `null` field is
/// an empty list, not an error.
pub fn parse_post_list(data: Value) -> Result<Vec<Post>, ApiError> {
    let list: PostList = serde_json::from_value(data).map_err(|e| ApiError::Deserialization(e.to_string()))?;
    Ok(list.posts.unwrap_or_default())
}

/// Read the `post` field of a single-post response.
pub fn parse_post(data: Value) -> Result<Post, ApiError> {
    serde_json::from_value::<PostEnvelope>(data)
        .map(|envelope| envelope.post)
        .map_err(|e| ApiError::Deserialization(e.to_string()))
}
