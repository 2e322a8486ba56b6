//! HTTP integration tests: the full application served on an ephemeral port and driven
//! with reqwest. Covers the login gate, session lifecycle, post CRUD, `_method` override,
//! CORS, search, uploads, chat rooms and storage-failure mapping.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{COOKIE, SET_COOKIE};
use reqwest::{redirect, Client, Response, StatusCode};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use board::identity::{PlaintextScheme, SessionManager};
use board::server::{app, AppState, SESSION_COOKIE};
use board::storage::{Document, DocumentStore, Filter, MemoryStore, SearchHit, SharedStore, StoreError, StoreResult};

struct TestServer {
    base: String,
    client: Client,
    _upload: TempDir,
    upload_dir: std::path::PathBuf,
    sessions: SessionManager,
    handle: JoinHandle<()>,
}

impl Drop for TestServer {
    fn drop(&mut self) { self.handle.abort(); }
}

impl TestServer {
    fn url(&self, path: &str) -> String { format!("{}{}", self.base, path) }
}

async fn start_with_store(store: SharedStore) -> TestServer {
    let upload = tempfile::tempdir().expect("tempdir");
    let upload_dir = upload.path().to_path_buf();
    let state = AppState::new(store, Arc::new(PlaintextScheme)).with_upload_dir(&upload_dir);
    let sessions = state.sessions.clone();
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr: SocketAddr = listener.local_addr().expect("addr");
    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, app(state)).await;
    });
    let client = Client::builder().redirect(redirect::Policy::none()).build().expect("client");
    TestServer { base: format!("http://{addr}"), client, _upload: upload, upload_dir, sessions, handle }
}

async fn start() -> TestServer {
    start_with_store(Arc::new(MemoryStore::new())).await
}

/// `name=value` of the session cookie set by `resp`.
fn session_cookie(resp: &Response) -> Option<String> {
    resp.headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|s| s.starts_with(&format!("{SESSION_COOKIE}=")))
        .and_then(|s| s.split(';').next())
        .map(|s| s.to_string())
}

async fn register(srv: &TestServer, id: &str, pw: &str) {
    let resp = srv.client.post(srv.url("/register")).form(&[("id", id), ("pw", pw)]).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(resp.headers()["location"], "/");
}

async fn login(srv: &TestServer, id: &str, pw: &str) -> String {
    let resp = srv.client.post(srv.url("/login")).form(&[("id", id), ("pw", pw)]).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER, "login as {id}");
    session_cookie(&resp).expect("session cookie")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn gated_routes_reject_anonymous_requests() {
    let srv = start().await;
    for path in ["/mypage", "/chat", "/chat/events", "/shop/shirts", "/shop/pants"] {
        let resp = srv.client.get(srv.url(path)).send().await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED, "{path}");
        assert_eq!(resp.text().await.unwrap(), "Please log in first.", "{path}");
    }
    let resp = srv.client.post(srv.url("/add")).form(&[("title", "t"), ("date", "d")]).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    // public routes stay open
    for path in ["/", "/write", "/login", "/upload", "/list"] {
        let resp = srv.client.get(srv.url(path)).send().await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK, "{path}");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn login_admits_and_logout_revokes() {
    let srv = start().await;
    register(&srv, "alice", "pw1").await;

    let resp = srv.client.post(srv.url("/login")).form(&[("id", "alice"), ("pw", "wrong")]).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert!(session_cookie(&resp).is_none());
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Wrong password.");

    let resp = srv.client.post(srv.url("/login")).form(&[("id", "bob"), ("pw", "x")]).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "This account does not exist.");

    let cookie = login(&srv, "alice", "pw1").await;
    let resp = srv.client.get(srv.url("/mypage")).header(COOKIE, &cookie).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.text().await.unwrap().contains("alice"));

    let resp = srv.client.get(srv.url("/shop/shirts")).header(COOKIE, &cookie).send().await.unwrap();
    assert_eq!(resp.text().await.unwrap(), "Shirts");

    let resp = srv.client.post(srv.url("/logout")).header(COOKIE, &cookie).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    let cleared = resp.headers()[SET_COOKIE].to_str().unwrap().to_string();
    assert!(cleared.contains("Max-Age=0"));

    let resp = srv.client.get(srv.url("/mypage")).header(COOKIE, &cookie).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn deleted_credential_clears_session_on_next_request() {
    let store: SharedStore = Arc::new(MemoryStore::new());
    let srv = start_with_store(store.clone()).await;
    register(&srv, "alice", "pw1").await;
    let cookie = login(&srv, "alice", "pw1").await;
    assert_eq!(srv.sessions.len(), 1);

    assert_eq!(store.delete_one("login", &Filter::by("id", "alice")).unwrap(), 1);

    let resp = srv.client.get(srv.url("/mypage")).header(COOKIE, &cookie).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(resp.text().await.unwrap(), "Please log in first.");
    assert_eq!(srv.sessions.len(), 0);

    // re-registering does not revive the cleared session
    register(&srv, "alice", "pw1").await;
    let resp = srv.client.get(srv.url("/mypage")).header(COOKIE, &cookie).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

/// Memory store whose reads can be switched off mid-test.
struct FlakyStore {
    inner: MemoryStore,
    reads_fail: AtomicBool,
}

impl FlakyStore {
    fn check(&self) -> StoreResult<()> {
        if self.reads_fail.load(Ordering::SeqCst) { offline() } else { Ok(()) }
    }
}

impl DocumentStore for FlakyStore {
    fn find_one(&self, c: &str, f: &Filter) -> StoreResult<Option<Document>> { self.check()?; self.inner.find_one(c, f) }
    fn find(&self, c: &str, f: &Filter) -> StoreResult<Vec<Document>> { self.check()?; self.inner.find(c, f) }
    fn insert_one(&self, c: &str, d: Document) -> StoreResult<()> { self.inner.insert_one(c, d) }
    fn update_one(&self, c: &str, f: &Filter, d: Document) -> StoreResult<u64> { self.inner.update_one(c, f, d) }
    fn delete_one(&self, c: &str, f: &Filter) -> StoreResult<u64> { self.inner.delete_one(c, f) }
    fn increment(&self, c: &str, f: &Filter, field: &str, by: i64) -> StoreResult<i64> { self.inner.increment(c, f, field, by) }
    fn search_text(&self, c: &str, field: &str, q: &str, limit: usize) -> StoreResult<Vec<SearchHit>> {
        self.inner.search_text(c, field, q, limit)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn storage_fault_while_resolving_session_is_server_error() {
    let store = Arc::new(FlakyStore { inner: MemoryStore::new(), reads_fail: AtomicBool::new(false) });
    let srv = start_with_store(store.clone()).await;
    register(&srv, "alice", "pw1").await;
    let cookie = login(&srv, "alice", "pw1").await;

    store.reads_fail.store(true, Ordering::SeqCst);
    let resp = srv.client.get(srv.url("/mypage")).header(COOKIE, &cookie).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "storage_unavailable");
    // the session survives a transient fault
    assert_eq!(srv.sessions.len(), 1);

    store.reads_fail.store(false, Ordering::SeqCst);
    let resp = srv.client.get(srv.url("/mypage")).header(COOKIE, &cookie).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn html_forms_reach_put_and_delete_through_method_override() {
    let srv = start().await;
    register(&srv, "alice", "pw1").await;
    let cookie = login(&srv, "alice", "pw1").await;
    let resp = srv
        .client
        .post(srv.url("/add"))
        .header(COOKIE, &cookie)
        .form(&[("title", "draft"), ("date", "d1")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = srv
        .client
        .post(srv.url("/edit?_method=PUT"))
        .form(&[("id", "1"), ("title", "final"), ("date", "d2")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(resp.headers()["location"], "/list");
    assert!(srv.client.get(srv.url("/detail/1")).send().await.unwrap().text().await.unwrap().contains("final"));

    // without the override POST /edit has no handler
    let resp = srv.client.post(srv.url("/edit")).form(&[("id", "1")]).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);

    let resp = srv
        .client
        .post(srv.url("/delete?_method=DELETE"))
        .header(COOKIE, &cookie)
        .form(&[("_id", "1")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["message"], "Deleted.");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cors_allows_credentialed_requests_from_the_calling_origin() {
    let srv = start().await;
    let resp = srv
        .client
        .request(reqwest::Method::OPTIONS, srv.url("/add"))
        .header("origin", "http://localhost:8080")
        .header("access-control-request-method", "POST")
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    assert_eq!(resp.headers()["access-control-allow-origin"], "http://localhost:8080");
    assert_eq!(resp.headers()["access-control-allow-credentials"], "true");

    let resp = srv.client.get(srv.url("/list")).header("origin", "http://example.test").send().await.unwrap();
    assert_eq!(resp.headers()["access-control-allow-origin"], "http://example.test");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn writes_reach_a_file_backed_store() {
    let dir = tempfile::tempdir().unwrap();
    let store = board::storage::open(&format!("file://{}", dir.path().display())).unwrap();
    let srv = start_with_store(store).await;
    register(&srv, "alice", "pw1").await;
    let cookie = login(&srv, "alice", "pw1").await;
    let resp = srv
        .client
        .post(srv.url("/add"))
        .header(COOKIE, &cookie)
        .form(&[("title", "on disk"), ("date", "d")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let reopened = board::storage::open(&format!("file://{}", dir.path().display())).unwrap();
    let posts = reopened.find("post", &Filter::all()).unwrap();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0]["title"], "on disk");
    assert_eq!(reopened.find("login", &Filter::by("id", "alice")).unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn register_requires_identifier() {
    let srv = start().await;
    let resp = srv.client.post(srv.url("/register")).form(&[("pw", "x")]).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "validation_missing");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn posts_flow_through_add_list_edit_search_and_delete() {
    let srv = start().await;
    register(&srv, "alice", "pw1").await;
    register(&srv, "bob", "pw2").await;
    let alice = login(&srv, "alice", "pw1").await;
    let bob = login(&srv, "bob", "pw2").await;

    let resp = srv
        .client
        .post(srv.url("/add"))
        .header(COOKIE, &alice)
        .form(&[("title", "Learning Rust"), ("date", "2024-01-01")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.text().await.unwrap(), "Saved to server.");

    let resp = srv.client.post(srv.url("/add")).header(COOKIE, &alice).form(&[("date", "x")]).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let list = srv.client.get(srv.url("/list")).send().await.unwrap().text().await.unwrap();
    assert!(list.contains("Learning Rust"));

    let detail = srv.client.get(srv.url("/detail/1")).send().await.unwrap();
    assert_eq!(detail.status(), StatusCode::OK);
    assert!(detail.text().await.unwrap().contains("alice"));
    let resp = srv.client.get(srv.url("/detail/abc")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = srv
        .client
        .put(srv.url("/edit"))
        .form(&[("id", "1"), ("title", "Learning Axum"), ("date", "2024-02-02")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(resp.headers()["location"], "/list");
    let edit = srv.client.get(srv.url("/edit/1")).send().await.unwrap().text().await.unwrap();
    assert!(edit.contains("Learning Axum"));

    let found = srv.client.get(srv.url("/search?key=axum")).send().await.unwrap().text().await.unwrap();
    assert!(found.contains("Learning Axum"));
    let none = srv.client.get(srv.url("/search?key=python")).send().await.unwrap().text().await.unwrap();
    assert!(!none.contains("Learning"));

    // wrong owner: post stays
    let resp = srv.client.delete(srv.url("/delete")).header(COOKIE, &bob).form(&[("_id", "1")]).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert!(srv.client.get(srv.url("/list")).send().await.unwrap().text().await.unwrap().contains("Learning Axum"));

    let resp = srv.client.delete(srv.url("/delete")).header(COOKIE, &alice).form(&[("_id", "1")]).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["message"], "Deleted.");
    assert!(!srv.client.get(srv.url("/list")).send().await.unwrap().text().await.unwrap().contains("Learning Axum"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_adds_get_distinct_ids() {
    let store: SharedStore = Arc::new(MemoryStore::new());
    let srv = start_with_store(store.clone()).await;
    register(&srv, "alice", "pw1").await;
    let cookie = login(&srv, "alice", "pw1").await;

    let sends = (0..20).map(|i| {
        srv.client
            .post(srv.url("/add"))
            .header(COOKIE, &cookie)
            .form(&[("title", format!("post {i}")), ("date", "d".to_string())])
            .send()
    });
    for resp in futures::future::join_all(sends).await {
        assert_eq!(resp.unwrap().status(), StatusCode::OK);
    }

    let mut ids: Vec<i64> = store
        .find("post", &Filter::all())
        .unwrap()
        .iter()
        .filter_map(|d| d.get("_id").and_then(|v| v.as_i64()))
        .collect();
    ids.sort_unstable();
    assert_eq!(ids, (1..=20).collect::<Vec<_>>());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn upload_stores_file_under_its_base_name() {
    let srv = start().await;
    let part = reqwest::multipart::Part::bytes(b"hello image".to_vec()).file_name("../../cat.png");
    let form = reqwest::multipart::Form::new().part("fileupload", part);
    let resp = srv.client.post(srv.url("/upload")).multipart(form).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.text().await.unwrap(), "File upload complete.");
    assert_eq!(std::fs::read(srv.upload_dir.join("cat.png")).unwrap(), b"hello image");

    let served = srv.client.get(srv.url("/image/cat.png")).send().await.unwrap();
    assert_eq!(served.status(), StatusCode::OK);
    assert_eq!(served.bytes().await.unwrap().as_ref(), b"hello image");

    let form = reqwest::multipart::Form::new().text("other", "x");
    let resp = srv.client.post(srv.url("/upload")).multipart(form).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn chat_rooms_and_event_stream() {
    let srv = start().await;
    register(&srv, "alice", "pw1").await;
    let cookie = login(&srv, "alice", "pw1").await;

    let resp = srv
        .client
        .post(srv.url("/chatroom"))
        .header(COOKIE, &cookie)
        .form(&[("ohterId", "bob")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.text().await.unwrap(), "Entered the chat room.");

    let page = srv.client.get(srv.url("/chat")).header(COOKIE, &cookie).send().await.unwrap().text().await.unwrap();
    assert!(page.contains("bob"));
    assert!(page.contains("chatRoomTitle"));

    let mut resp = srv.client.get(srv.url("/chat/events")).header(COOKIE, &cookie).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers()["content-type"].to_str().unwrap().starts_with("text/event-stream"));
    let chunk = tokio::time::timeout(Duration::from_secs(5), resp.chunk()).await.unwrap().unwrap().unwrap();
    let text = String::from_utf8_lossy(&chunk);
    assert!(text.contains("event: test"));
    assert!(text.contains("data: test"));
}

/// Store that fails every call, standing in for an unreachable database.
struct OfflineStore;

fn offline<T>() -> StoreResult<T> { Err(StoreError::Unavailable("offline".into())) }

impl DocumentStore for OfflineStore {
    fn find_one(&self, _: &str, _: &Filter) -> StoreResult<Option<Document>> { offline() }
    fn find(&self, _: &str, _: &Filter) -> StoreResult<Vec<Document>> { offline() }
    fn insert_one(&self, _: &str, _: Document) -> StoreResult<()> { offline() }
    fn update_one(&self, _: &str, _: &Filter, _: Document) -> StoreResult<u64> { offline() }
    fn delete_one(&self, _: &str, _: &Filter) -> StoreResult<u64> { offline() }
    fn increment(&self, _: &str, _: &Filter, _: &str, _: i64) -> StoreResult<i64> { offline() }
    fn search_text(&self, _: &str, _: &str, _: &str, _: usize) -> StoreResult<Vec<SearchHit>> { offline() }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn storage_failures_are_server_errors() {
    let srv = start_with_store(Arc::new(OfflineStore)).await;

    let resp = srv.client.get(srv.url("/list")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "error");
    assert_eq!(body["code"], "storage_unavailable");

    let resp = srv.client.post(srv.url("/login")).form(&[("id", "alice"), ("pw", "pw1")]).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let resp = srv.client.post(srv.url("/register")).form(&[("id", "alice"), ("pw", "pw1")]).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

    // the static views never touch the store
    let resp = srv.client.get(srv.url("/")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}
