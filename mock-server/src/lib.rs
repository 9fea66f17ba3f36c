use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use time::{format_description::well_known::Rfc3339, Duration, OffsetDateTime};
use tokio::{net::TcpListener, sync::RwLock};
use tower_http::trace::TraceLayer;
use tracing::debug;
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "nimbledb-test_token";

const SESSION_MAX_AGE_SECS: i64 = 24 * 60 * 60;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub image: String,
    pub role: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
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

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct PostRequest {
    pub title: String,
    pub content: String,
}

struct Account {
    user: User,
    password: String,
}

struct Session {
    user_id: i64,
    expires_at: OffsetDateTime,
}

/// In-memory backing store: accounts, posts keyed by id, and open sessions
/// keyed by cookie token.
#[derive(Default)]
pub struct Store {
    accounts: Vec<Account>,
    posts: BTreeMap<i64, Post>,
    sessions: HashMap<String, Session>,
    next_user_id: i64,
    next_post_id: i64,
}

impl Store {
    fn user(&self, id: i64) -> Option<&User> {
        self.accounts.iter().map(|a| &a.user).find(|u| u.id == id)
    }

    /// Issue a token living as long as the cookie's `Max-Age`. Expired
    /// tokens are dropped here, so the map stays bounded by live sessions.
    fn open_session(&mut self, user_id: i64) -> String {
        let now = OffsetDateTime::now_utc();
        self.sessions.retain(|_, session| session.expires_at > now);

        let token = Uuid::new_v4().to_string();
        let expires_at = now + Duration::seconds(SESSION_MAX_AGE_SECS);
        self.sessions.insert(token.clone(), Session { user_id, expires_at });
        token
    }

    fn with_author(&self, post: &Post) -> Post {
        let mut post = post.clone();
        if let Some(author) = self.user(post.user_id) {
            post.author_name = Some(author.name.clone());
            post.author_email = Some(author.email.clone());
            post.author_image = Some(author.image.clone());
        }
        post
    }

    /// Posts matching `keep`, newest first.
    fn list(&self, keep: impl Fn(&Post) -> bool) -> Vec<Post> {
        self.posts
            .values()
            .rev()
            .filter(|p| keep(*p))
            .map(|p| self.with_author(p))
            .collect()
    }
}

pub type Db = Arc<RwLock<Store>>;

type Failure = (StatusCode, Json<Value>);

fn failure(status: StatusCode, message: &str) -> Failure {
    (status, Json(json!({ "error": message })))
}

fn unauthorized() -> Failure {
    failure(StatusCode::UNAUTHORIZED, "Unauthorized")
}

fn not_found() -> Failure {
    failure(StatusCode::NOT_FOUND, "Post not found")
}

fn invalid_request() -> Failure {
    failure(StatusCode::BAD_REQUEST, "Invalid request")
}

/// Unwrap a JSON body, answering a malformed one with the API's own error
/// instead of axum's plain-text rejection.
fn json_body<T>(input: Result<Json<T>, JsonRejection>) -> Result<T, Failure> {
    input.map(|Json(body)| body).map_err(|_| invalid_request())
}

fn post_id(id: Result<Path<i64>, PathRejection>) -> Result<i64, Failure> {
    id.map(|Path(id)| id)
        .map_err(|_| failure(StatusCode::BAD_REQUEST, "Invalid post ID"))
}

fn now() -> String {
    OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default()
}

pub fn app() -> Router {
    let db: Db = Arc::new(RwLock::new(Store::default()));
    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/me", get(me))
        .route("/api/posts/", get(list_posts).post(create_post))
        .route("/api/posts/my/posts", get(my_posts))
        .route("/api/posts/{id}", get(get_post).put(update_post).delete(delete_post))
        .layer(TraceLayer::new_for_http())
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

/// Resolve the session cookie to a user id.
fn session_user(store: &Store, headers: &HeaderMap) -> Result<i64, Failure> {
    let token = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .find_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            (name == SESSION_COOKIE).then_some(value)
        })
        .ok_or_else(unauthorized)?;
    store
        .sessions
        .get(token)
        .filter(|session| session.expires_at > OffsetDateTime::now_utc())
        .map(|session| session.user_id)
        .ok_or_else(unauthorized)
}

fn signed_in(user: &User, token: &str) -> Response {
    let cookie = format!("{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={SESSION_MAX_AGE_SECS}");
    (
        [(header::SET_COOKIE, cookie)],
        Json(json!({ "id": user.id, "email": user.email, "name": user.name })),
    )
        .into_response()
}

async fn register(
    State(db): State<Db>,
    input: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Response, Failure> {
    let input = json_body(input)?;
    let mut store = db.write().await;
    if store.accounts.iter().any(|a| a.user.email == input.email) {
        return Err(failure(StatusCode::CONFLICT, "Email already registered"));
    }

    store.next_user_id += 1;
    let id = store.next_user_id;
    let user = User {
        id,
        email: input.email,
        name: input.name,
        image: format!("https://api.dicebear.com/7.x/bottts-neutral/svg?seed={id}"),
        role: "user".to_string(),
    };
    store.accounts.push(Account {
        user: user.clone(),
        password: input.password,
    });
    let token = store.open_session(id);
    debug!(user_id = id, "registered");
    Ok(signed_in(&user, &token))
}

async fn login(
    State(db): State<Db>,
    input: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Response, Failure> {
    let input = json_body(input)?;
    let mut store = db.write().await;
    let user = store
        .accounts
        .iter()
        .find(|a| a.user.email == input.email && a.password == input.password)
        .map(|a| a.user.clone())
        .ok_or_else(|| failure(StatusCode::UNAUTHORIZED, "Invalid credentials"))?;
    let token = store.open_session(user.id);
    Ok(signed_in(&user, &token))
}

async fn me(State(db): State<Db>, headers: HeaderMap) -> Result<Json<Value>, Failure> {
    let store = db.read().await;
    let user_id = session_user(&store, &headers)?;
    let user = store
        .user(user_id)
        .ok_or_else(|| failure(StatusCode::INTERNAL_SERVER_ERROR, "Failed to get user"))?;
    Ok(Json(json!({ "user": user })))
}

async fn list_posts(State(db): State<Db>) -> Json<Value> {
    let store = db.read().await;
    Json(json!({ "posts": store.list(|_| true) }))
}

async fn my_posts(State(db): State<Db>, headers: HeaderMap) -> Result<Json<Value>, Failure> {
    let store = db.read().await;
    let user_id = session_user(&store, &headers)?;
    Ok(Json(json!({ "posts": store.list(|p| p.user_id == user_id) })))
}

async fn get_post(State(db): State<Db>, id: Result<Path<i64>, PathRejection>) -> Result<Json<Value>, Failure> {
    let id = post_id(id)?;
    let store = db.read().await;
    let post = store.posts.get(&id).ok_or_else(not_found)?;
    Ok(Json(json!({ "post": store.with_author(post) })))
}

async fn create_post(
    State(db): State<Db>,
    headers: HeaderMap,
    input: Result<Json<PostRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), Failure> {
    let mut store = db.write().await;
    let user_id = session_user(&store, &headers)?;
    let input = json_body(input)?;

    store.next_post_id += 1;
    let created_at = now();
    let post = Post {
        id: store.next_post_id,
        user_id,
        title: input.title,
        content: input.content,
        created_at: created_at.clone(),
        updated_at: created_at,
        author_name: None,
        author_email: None,
        author_image: None,
    };
    store.posts.insert(post.id, post.clone());
    Ok((StatusCode::CREATED, Json(json!({ "post": store.with_author(&post) }))))
}

/// Check, in order, the session, the id and ownership of the post.
fn owned_post(
    store: &Store,
    headers: &HeaderMap,
    id: Result<Path<i64>, PathRejection>,
    action: &str,
) -> Result<i64, Failure> {
    let user_id = session_user(store, headers)?;
    let id = post_id(id)?;
    let post = store.posts.get(&id).ok_or_else(not_found)?;
    if post.user_id != user_id {
        return Err(failure(
            StatusCode::FORBIDDEN,
            &format!("You don't have permission to {action} this post"),
        ));
    }
    Ok(id)
}

async fn update_post(
    State(db): State<Db>,
    headers: HeaderMap,
    id: Result<Path<i64>, PathRejection>,
    input: Result<Json<PostRequest>, JsonRejection>,
) -> Result<Json<Value>, Failure> {
    let mut store = db.write().await;
    let id = owned_post(&store, &headers, id, "update")?;
    let input = json_body(input)?;

    let post = store.posts.get_mut(&id).ok_or_else(not_found)?;
    post.title = input.title;
    post.content = input.content;
    post.updated_at = now();
    let post = post.clone();
    Ok(Json(json!({ "post": store.with_author(&post) })))
}

async fn delete_post(
    State(db): State<Db>,
    headers: HeaderMap,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<Value>, Failure> {
    let mut store = db.write().await;
    let id = owned_post(&store, &headers, id, "delete")?;
    store.posts.remove(&id);
    Ok(Json(json!({ "message": "Post deleted successfully" })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_author() -> Store {
        let mut store = Store::default();
        store.accounts.push(Account {
            user: User {
                id: 1,
                email: "a@b.com".to_string(),
                name: "Ann".to_string(),
                image: "ann.svg".to_string(),
                role: "user".to_string(),
            },
            password: "pw".to_string(),
        });
        store
    }

    fn post(id: i64, user_id: i64) -> Post {
        Post {
            id,
            user_id,
            title: format!("post {id}"),
            content: String::new(),
            created_at: "2024-01-01T00:00:00Z".to_string(),
            updated_at: "2024-01-01T00:00:00Z".to_string(),
            author_name: None,
            author_email: None,
            author_image: None,
        }
    }

    #[test]
    fn post_without_author_omits_author_fields() {
        let json = serde_json::to_value(post(1, 1)).unwrap();
        assert!(json.get("author_name").is_none());
        assert_eq!(json["user_id"], 1);
    }

    #[test]
    fn list_is_newest_first_with_authors() {
        let mut store = store_with_author();
        store.posts.insert(1, post(1, 1));
        store.posts.insert(2, post(2, 1));
        let posts = store.list(|_| true);
        assert_eq!(posts.iter().map(|p| p.id).collect::<Vec<_>>(), [2, 1]);
        assert_eq!(posts[0].author_name.as_deref(), Some("Ann"));
    }

    #[test]
    fn session_user_reads_cookie_among_others() {
        let mut store = store_with_author();
        let token = store.open_session(1);
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            format!("theme=dark; {SESSION_COOKIE}={token}").parse().unwrap(),
        );
        assert_eq!(session_user(&store, &headers).unwrap(), 1);
    }

    #[test]
    fn session_user_rejects_unknown_token() {
        let store = store_with_author();
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, format!("{SESSION_COOKIE}=bogus").parse().unwrap());
        let (status, _) = session_user(&store, &headers).unwrap_err();
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn session_user_rejects_expired_token() {
        let mut store = store_with_author();
        store.sessions.insert(
            "stale".to_string(),
            Session {
                user_id: 1,
                expires_at: OffsetDateTime::now_utc() - Duration::seconds(1),
            },
        );
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, format!("{SESSION_COOKIE}=stale").parse().unwrap());
        let (status, _) = session_user(&store, &headers).unwrap_err();
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn open_session_drops_expired_tokens() {
        let mut store = store_with_author();
        store.sessions.insert(
            "stale".to_string(),
            Session {
                user_id: 1,
                expires_at: OffsetDateTime::now_utc() - Duration::seconds(1),
            },
        );
        let live = store.open_session(1);
        assert_eq!(store.sessions.len(), 1);
        assert!(store.sessions.contains_key(&live));
    }

    #[test]
    fn register_request_defaults_name() {
        let input: RegisterRequest = serde_json::from_str(r#"{"email":"a@b.com","password":"pw"}"#).unwrap();
        assert!(input.name.is_empty());
    }

    #[test]
    fn post_request_rejects_missing_content() {
        let result: Result<PostRequest, _> = serde_json::from_str(r#"{"title":"t"}"#);
        assert!(result.is_err());
    }
}
