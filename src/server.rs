//!
//! board HTTP server
//! -----------------
//! Axum application for the board: pages, posts, login/logout, uploads, search and
//! chat rooms.
//!
//! Responsibilities:
//! - Build the shared `AppState` (store, repositories, identity services, renderer).
//! - Compose the per-route stages at startup: the `_method` override (ahead of routing),
//!   CORS, request tracing, then session identity resolution for every route, then the
//!   login gate on gated routes, then the handler.
//! - Serve uploaded images and static files.
//! - Sweep expired sessions in the background.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use axum::extract::{DefaultBodyLimit, Request};
use axum::http::{header, Method};
use axum::response::Html;
use axum::routing::{delete, get, post, put, IntoMakeService};
use axum::{middleware, Router, ServiceExt};
use serde_json::Value;
use tokio::net::TcpListener;
use tower::util::MapRequest;
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::chat::ChatRepository;
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::identity::{scheme_from_name, CredentialVerifier, IdentityManager, PasswordScheme, SessionManager};
use crate::posts::PostRepository;
use crate::render::{HtmlRenderer, PageRenderer};
use crate::storage::{self, SharedStore};

pub mod middleware_stages;
mod auth_routes;
mod chat_routes;
mod pages;
mod post_routes;
mod shop_routes;
mod upload_routes;

pub use middleware_stages::{AuthUser, SESSION_COOKIE};

/// Shared server state injected into all handlers.
///
/// Every collaborator is an explicit dependency: the document store, the page
/// renderer and the password scheme are chosen by whoever builds the state.
#[derive(Clone)]
pub struct AppState {
    pub store: SharedStore,
    pub posts: PostRepository,
    pub chats: ChatRepository,
    pub verifier: CredentialVerifier,
    pub identities: IdentityManager,
    pub sessions: SessionManager,
    pub renderer: Arc<dyn PageRenderer>,
    pub upload_dir: PathBuf,
    pub public_dir: PathBuf,
    pub upload_limit: usize,
    /// Mark the session cookie `Secure` (only sent over HTTPS).
    pub secure_cookies: bool,
}

impl AppState {
    pub fn new(store: SharedStore, scheme: Arc<dyn PasswordScheme>) -> Self {
        let d = Config::default();
        Self {
            posts: PostRepository::new(store.clone()),
            chats: ChatRepository::new(store.clone()),
            verifier: CredentialVerifier::new(store.clone(), scheme),
            identities: IdentityManager::new(store.clone()),
            sessions: SessionManager::default(),
            renderer: Arc::new(HtmlRenderer),
            upload_dir: d.upload_dir,
            public_dir: d.public_dir,
            upload_limit: d.upload_limit,
            secure_cookies: d.secure_cookies,
            store,
        }
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn PageRenderer>) -> Self { self.renderer = renderer; self }
    pub fn with_sessions(mut self, sessions: SessionManager) -> Self { self.sessions = sessions; self }
    pub fn with_upload_dir(mut self, dir: impl Into<PathBuf>) -> Self { self.upload_dir = dir.into(); self }
    pub fn with_public_dir(mut self, dir: impl Into<PathBuf>) -> Self { self.public_dir = dir.into(); self }
    pub fn with_upload_limit(mut self, bytes: usize) -> Self { self.upload_limit = bytes; self }
    pub fn with_secure_cookies(mut self, secure: bool) -> Self { self.secure_cookies = secure; self }

    /// Open the configured store and build the full state from `cfg`.
    pub fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        let store = storage::open(&cfg.db_url).with_context(|| format!("While opening store '{}'", cfg.db_url))?;
        let scheme = scheme_from_name(&cfg.password_scheme)
            .ok_or_else(|| anyhow!("unknown password scheme '{}' (expected plain or argon2)", cfg.password_scheme))?;
        let state = AppState::new(store, scheme)
            .with_sessions(SessionManager::new(cfg.session_ttl))
            .with_upload_dir(&cfg.upload_dir)
            .with_public_dir(&cfg.public_dir)
            .with_upload_limit(cfg.upload_limit)
            .with_secure_cookies(cfg.secure_cookies);
        state.posts.ensure_counter().context("While initialising the post counter")?;
        std::fs::create_dir_all(&cfg.upload_dir)
            .with_context(|| format!("Failed to create or access upload dir: {}", cfg.upload_dir.display()))?;
        Ok(state)
    }

    /// Render `view` with `data` through the configured renderer.
    pub fn render(&self, view: &str, data: Value) -> AppResult<Html<String>> {
        self.renderer
            .render(view, &data)
            .map(Html)
            .map_err(|e| AppError::internal("render_failed", format!("view {view}: {e}")))
    }
}

/// A required form field: absent or blank is a validation error.
pub(crate) fn required(value: Option<String>, field: &str) -> AppResult<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(AppError::missing(field)),
    }
}

/// Run a store call off the async workers. File-backed stores rewrite a whole collection
/// file per mutation, so writes go through here.
pub(crate) async fn blocking<T, F>(f: F) -> AppResult<T>
where
    F: FnOnce() -> AppResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::internal("blocking_task", e.to_string()))?
}

pub(crate) fn parse_post_id(raw: &str) -> AppResult<i64> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| AppError::user("invalid_post_id", format!("post id '{raw}' is not an integer")))
}

/// Credentialed CORS: the caller's origin is echoed back, never `*`.
fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(AllowHeaders::list([header::CONTENT_TYPE]))
        .allow_credentials(true)
}

/// Build the application router.
///
/// Stage order per request: cors, trace, resolve identity, (gate), handler.
pub fn router(state: AppState) -> Router {
    let gate = || middleware::from_fn(middleware_stages::require_identity);

    let gated = Router::new()
        .route("/mypage", get(auth_routes::mypage))
        .route("/add", post(post_routes::add))
        .route("/delete", delete(post_routes::delete_post))
        .route("/chat", get(chat_routes::chat_page))
        .route("/chat/events", get(chat_routes::events))
        .route("/chatroom", post(chat_routes::create_room))
        .route_layer(gate());

    let shop = shop_routes::router().layer(gate());

    Router::new()
        .route("/", get(pages::index))
        .route("/write", get(pages::write))
        .route("/login", get(auth_routes::login_page).post(auth_routes::login))
        .route("/logout", post(auth_routes::logout))
        .route("/register", post(auth_routes::register))
        .route("/list", get(post_routes::list))
        .route("/detail/{id}", get(post_routes::detail))
        .route("/edit/{id}", get(post_routes::edit_page))
        .route("/edit", put(post_routes::edit))
        .route("/search", get(post_routes::search))
        .route(
            "/upload",
            get(upload_routes::upload_page)
                .post(upload_routes::upload)
                .layer(DefaultBodyLimit::max(state.upload_limit)),
        )
        .merge(gated)
        .nest("/shop", shop)
        .nest_service("/image", ServeDir::new(&state.upload_dir))
        .nest_service("/public", ServeDir::new(&state.public_dir))
        .layer(middleware::from_fn_with_state(state.clone(), middleware_stages::resolve_identity))
        .layer(TraceLayer::new_for_http())
        .layer(cors())
        .with_state(state)
}

/// Router wrapped with the stages that must see the request before routing.
pub type App = MapRequest<Router, fn(Request) -> Request>;

/// The servable application: `_method` override, then `router`.
pub fn app(state: AppState) -> IntoMakeService<App> {
    let overridden: App = MapRequest::new(router(state), middleware_stages::method_override as fn(Request) -> Request);
    overridden.into_make_service()
}

fn log_startup(cfg: &Config) {
    let cwd = std::env::current_dir().ok();
    info!(
        target: "startup",
        "board starting: cwd={:?}, port={}, db_url='{}', upload_dir={:?}, public_dir={:?}, session_ttl_secs={}, password_scheme={}",
        cwd, cfg.http_port, cfg.db_url, cfg.upload_dir, cfg.public_dir, cfg.session_ttl.as_secs(), cfg.password_scheme
    );
}

fn spawn_session_sweeper(sessions: SessionManager) {
    tokio::spawn(async move {
        loop {
            let removed = sessions.sweep();
            if removed > 0 { debug!(removed = removed, "session_sweep"); }
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
    });
}

/// Build state from `cfg`, bind the HTTP port and serve until the process exits.
pub async fn run(cfg: Config) -> anyhow::Result<()> {
    log_startup(&cfg);
    let state = AppState::from_config(&cfg)?;
    spawn_session_sweeper(state.sessions.clone());

    let service = app(state);
    let addr: SocketAddr = format!("0.0.0.0:{}", cfg.http_port).parse()?;
    info!("Starting server on {}", addr);
    let listener = TcpListener::bind(addr).await.with_context(|| format!("Failed to bind {addr}"))?;
    axum::serve(listener, service).await?;
    Ok(())
}
