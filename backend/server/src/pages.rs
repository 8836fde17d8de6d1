//! # Page Controller
//!
//! Every GET page in the app is one [`Page`] value run through [`run_page`]:
//!
//! 1. resolve the session from the request's cookies
//! 2. protected page and nobody signed in: redirect to the login path, no query
//! 3. run the page's single fetch, if it has one
//! 4. single-row lookup came back empty: the page's [`NotFoundPolicy`]
//! 5. render
//!
//! The controller never loops and never retries. A failed collection read still
//! renders, but as [`Collection::Failed`] so the view can say so instead of
//! pretending the table is empty. Cookie updates from step 1 ride along on
//! whatever response comes out.
use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use cookie::Cookie;
use store::{QueryRequest, Row};
use tracing::warn;

use crate::{
    cookies::append_cookies,
    error::AppError,
    locale::Locale,
    session::{Credentials, Principal, Session},
    state::AppState,
    views,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Public,
    SignedIn,
}

/// What a single-row page does when the row is not there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotFoundPolicy {
    NotFound,
    RedirectTo(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetch {
    Nothing,
    Collection(QueryRequest),
    Record {
        request: QueryRequest,
        missing: NotFoundPolicy,
    },
}

/// How fetched data is handed to the client component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewKind {
    /// `{ data: rows, loadFailed }`
    Table,
    /// `{ data: row }`
    Detail,
    /// `{ initialData: row | null }`
    Form,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct View {
    pub component: String,
    pub title: String,
    pub locale: Locale,
    pub kind: ViewKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub access: Access,
    pub fetch: Fetch,
    pub view: View,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Collection {
    Loaded(Vec<Row>),
    Failed,
}

impl Collection {
    pub fn rows(&self) -> &[Row] {
        match self {
            Self::Loaded(rows) => rows,
            Self::Failed => &[],
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PageData {
    Empty,
    Collection(Collection),
    Record(Row),
}

#[derive(Debug)]
pub struct Rendered {
    pub view: View,
    pub principal: Option<Principal>,
    pub data: PageData,
}

#[derive(Debug)]
pub enum Outcome {
    Render(Rendered),
    Redirect(String),
    NotFound(Locale),
    Failed(AppError),
}

/// An [`Outcome`] plus the session cookies it must carry.
#[derive(Debug)]
pub struct PageResponse {
    pub outcome: Outcome,
    pub set_cookies: Vec<Cookie<'static>>,
}

impl PageResponse {
    pub fn new(outcome: Outcome) -> Self {
        Self {
            outcome,
            set_cookies: Vec::new(),
        }
    }
}

impl IntoResponse for PageResponse {
    fn into_response(self) -> Response {
        let response = match self.outcome {
            Outcome::Render(rendered) => match views::render_page(&rendered) {
                Ok(page) => page.into_response(),
                Err(e) => AppError::from(e).into_response(),
            },
            Outcome::Redirect(to) => Redirect::to(&to).into_response(),
            Outcome::NotFound(locale) => not_found(locale),
            Outcome::Failed(e) => e.into_response(),
        };

        with_cookies(response, &self.set_cookies)
    }
}

pub fn with_cookies(mut response: Response, cookies: &[Cookie<'static>]) -> Response {
    append_cookies(response.headers_mut(), cookies);
    response
}

pub fn not_found(locale: Locale) -> Response {
    match views::not_found_page(locale) {
        Ok(page) => (StatusCode::NOT_FOUND, page).into_response(),
        Err(e) => AppError::from(e).into_response(),
    }
}

/// Resolves the session, then decides what `page` turns into.
pub async fn run_page(state: &Arc<AppState>, credentials: &Credentials, page: Page) -> PageResponse {
    let (session, set_cookies) = resolve(state, credentials).await;

    PageResponse {
        outcome: decide(state, &session, page).await,
        set_cookies,
    }
}

/// An admin path with no page behind it. Anonymous visitors get the same login
/// redirect as on any other admin path; only signed-in ones see the 404.
pub async fn run_unknown_admin(state: &Arc<AppState>, credentials: &Credentials) -> PageResponse {
    let (session, set_cookies) = resolve(state, credentials).await;

    let outcome = if session.is_authenticated() {
        Outcome::NotFound(Locale::default())
    } else {
        Outcome::Redirect(state.config.login_path.clone())
    };

    PageResponse {
        outcome,
        set_cookies,
    }
}

async fn resolve(state: &AppState, credentials: &Credentials) -> (Session, Vec<Cookie<'static>>) {
    let (session, cookies) = match state.sessions.resolve(credentials).await {
        Ok(resolved) => (resolved.session, resolved.cookies),
        Err(e) => {
            // fail closed: protected pages will bounce to login
            warn!("{e}");
            (Session::anonymous(), None)
        }
    };

    let set_cookies = cookies
        .map(|update| update.cookies(&state.cookies).to_vec())
        .unwrap_or_default();

    (session, set_cookies)
}

async fn decide(state: &AppState, session: &Session, page: Page) -> Outcome {
    if page.access == Access::SignedIn && !session.is_authenticated() {
        return Outcome::Redirect(state.config.login_path.clone());
    }

    // public reads go out under the project key only
    let bearer = match page.access {
        Access::SignedIn => session.access_token(),
        Access::Public => None,
    };

    let data = match page.fetch {
        Fetch::Nothing => PageData::Empty,
        Fetch::Collection(request) => match state.store.fetch_all(&request, bearer).await {
            Ok(rows) => PageData::Collection(Collection::Loaded(rows)),
            Err(e) => {
                warn!("Failed to load {request}: {e}");
                PageData::Collection(Collection::Failed)
            }
        },
        Fetch::Record { request, missing } => match state.store.fetch_one(&request, bearer).await {
            Ok(Some(row)) => PageData::Record(row),
            Ok(None) => {
                return match missing {
                    NotFoundPolicy::NotFound => Outcome::NotFound(page.view.locale),
                    NotFoundPolicy::RedirectTo(path) => Outcome::Redirect(path),
                };
            }
            Err(e) => return Outcome::Failed(e.into()),
        },
    };

    Outcome::Render(Rendered {
        view: page.view,
        principal: session.principal().cloned(),
        data,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    use async_trait::async_trait;
    use serde_json::{Value, json};
    use store::{AuthError, QueryResult, RowStore, StoreError};

    use super::*;
    use crate::{
        config::Config,
        session::{CookieUpdate, ResolvedSession, SessionError, SessionProvider},
    };

    enum Who {
        Nobody,
        Admin,
        Refreshed,
        Down,
    }

    struct FakeSessions(Who);

    #[async_trait]
    impl SessionProvider for FakeSessions {
        async fn resolve(&self, _: &Credentials) -> Result<ResolvedSession, SessionError> {
            let admin = Principal {
                id: "u-1".to_string(),
                email: Some("admin@example.com".to_string()),
                role: None,
            };

            match self.0 {
                Who::Nobody => Ok(ResolvedSession::anonymous()),
                Who::Admin => Ok(ResolvedSession {
                    session: Session::authenticated(admin, "a-1".to_string()),
                    cookies: None,
                }),
                Who::Refreshed => Ok(ResolvedSession {
                    session: Session::authenticated(admin, "a-2".to_string()),
                    cookies: Some(CookieUpdate::Issue {
                        access_token: "a-2".to_string(),
                        refresh_token: "r-2".to_string(),
                        expires_in: Some(3600),
                    }),
                }),
                Who::Down => Err(SessionError::Unavailable(AuthError::Decode(
                    "connection reset".to_string(),
                ))),
            }
        }

        async fn sign_in(&self, _: &str, _: &str) -> Result<ResolvedSession, SessionError> {
            Err(SessionError::Rejected)
        }

        async fn sign_out(&self, _: &str) -> Result<(), SessionError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeStore {
        calls: AtomicUsize,
        fail: bool,
        bearer: Mutex<Option<String>>,
    }

    #[async_trait]
    impl RowStore for FakeStore {
        async fn fetch(
            &self,
            request: &QueryRequest,
            bearer: Option<&str>,
        ) -> Result<QueryResult, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.bearer.lock().unwrap() = bearer.map(str::to_string);

            if self.fail {
                return Err(StoreError::Decode("boom".to_string()));
            }

            let rows = match request.filter() {
                Some(filter) if filter.value == "123" => vec![row(json!({ "id": 123 }))],
                Some(_) => vec![],
                None => vec![row(json!({ "id": 1 })), row(json!({ "id": 2 }))],
            };

            QueryResult::from_rows(request, rows)
        }
    }

    fn row(value: Value) -> Row {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn state(who: Who, store: Arc<FakeStore>) -> Arc<AppState> {
        let config = Config::for_project("http://127.0.0.1:1", "anon").unwrap();

        AppState::with_parts(config, Arc::new(FakeSessions(who)), store)
    }

    fn view(kind: ViewKind) -> View {
        View {
            component: "posts".to_string(),
            title: "Posts".to_string(),
            locale: Locale::En,
            kind,
        }
    }

    fn list_page(access: Access) -> Page {
        Page {
            access,
            fetch: Fetch::Collection(QueryRequest::select("posts")),
            view: view(ViewKind::Table),
        }
    }

    fn record_page(id: &str, missing: NotFoundPolicy) -> Page {
        Page {
            access: Access::SignedIn,
            fetch: Fetch::Record {
                request: QueryRequest::select("posts").eq("id", id).single(),
                missing,
            },
            view: view(ViewKind::Form),
        }
    }

    #[tokio::test]
    async fn test_anonymous_is_redirected_without_query() {
        let store = Arc::new(FakeStore::default());
        let state = state(Who::Nobody, store.clone());

        let response = run_page(&state, &Credentials::default(), list_page(Access::SignedIn)).await;

        assert!(matches!(response.outcome, Outcome::Redirect(ref to) if to == "/auth/login"));
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_session_outage_fails_closed() {
        let store = Arc::new(FakeStore::default());
        let state = state(Who::Down, store.clone());

        let response = run_page(&state, &Credentials::default(), list_page(Access::SignedIn)).await;

        assert!(matches!(response.outcome, Outcome::Redirect(_)));
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_session_outage_on_public_page_renders() {
        let store = Arc::new(FakeStore::default());
        let state = state(Who::Down, store.clone());

        let response = run_page(&state, &Credentials::default(), list_page(Access::Public)).await;

        assert!(matches!(response.outcome, Outcome::Render(_)));
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_signed_in_reads_with_session_token() {
        let store = Arc::new(FakeStore::default());
        let state = state(Who::Admin, store.clone());

        let response = run_page(&state, &Credentials::default(), list_page(Access::SignedIn)).await;

        let Outcome::Render(rendered) = response.outcome else {
            panic!("expected a render");
        };
        assert_eq!(rendered.data, PageData::Collection(Collection::Loaded(vec![
            row(json!({ "id": 1 })),
            row(json!({ "id": 2 })),
        ])));
        assert_eq!(rendered.principal.unwrap().id, "u-1");
        assert_eq!(store.bearer.lock().unwrap().as_deref(), Some("a-1"));
    }

    #[tokio::test]
    async fn test_public_reads_without_session_token() {
        let store = Arc::new(FakeStore::default());
        let state = state(Who::Admin, store.clone());

        run_page(&state, &Credentials::default(), list_page(Access::Public)).await;

        assert_eq!(*store.bearer.lock().unwrap(), None);
    }

    #[tokio::test]
    async fn test_collection_failure_renders_failed_state() {
        let store = Arc::new(FakeStore {
            fail: true,
            ..Default::default()
        });
        let state = state(Who::Admin, store);

        let response = run_page(&state, &Credentials::default(), list_page(Access::SignedIn)).await;

        let Outcome::Render(rendered) = response.outcome else {
            panic!("expected a render");
        };
        assert_eq!(rendered.data, PageData::Collection(Collection::Failed));
    }

    #[tokio::test]
    async fn test_record_found() {
        let state = state(Who::Admin, Arc::new(FakeStore::default()));

        let response = run_page(
            &state,
            &Credentials::default(),
            record_page("123", NotFoundPolicy::NotFound),
        )
        .await;

        let Outcome::Render(rendered) = response.outcome else {
            panic!("expected a render");
        };
        assert_eq!(rendered.data, PageData::Record(row(json!({ "id": 123 }))));
    }

    #[tokio::test]
    async fn test_record_missing_follows_policy() {
        let state = state(Who::Admin, Arc::new(FakeStore::default()));

        let response = run_page(
            &state,
            &Credentials::default(),
            record_page("999", NotFoundPolicy::NotFound),
        )
        .await;
        assert!(matches!(response.outcome, Outcome::NotFound(Locale::En)));

        let response = run_page(
            &state,
            &Credentials::default(),
            record_page("999", NotFoundPolicy::RedirectTo("/admin/reviews".to_string())),
        )
        .await;
        assert!(matches!(response.outcome, Outcome::Redirect(ref to) if to == "/admin/reviews"));
    }

    #[tokio::test]
    async fn test_record_failure_is_not_a_not_found() {
        let store = Arc::new(FakeStore {
            fail: true,
            ..Default::default()
        });
        let state = state(Who::Admin, store);

        let response = run_page(
            &state,
            &Credentials::default(),
            record_page("123", NotFoundPolicy::NotFound),
        )
        .await;

        assert!(matches!(response.outcome, Outcome::Failed(AppError::Store(_))));
    }

    #[tokio::test]
    async fn test_refreshed_cookies_survive_redirect() {
        let state = state(Who::Refreshed, Arc::new(FakeStore::default()));

        let response = run_page(
            &state,
            &Credentials::default(),
            record_page("999", NotFoundPolicy::RedirectTo("/admin/reviews".to_string())),
        )
        .await;

        assert_eq!(response.set_cookies.len(), 2);

        let response = response.into_response();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response
                .headers()
                .get_all(axum::http::header::SET_COOKIE)
                .iter()
                .count(),
            2
        );
    }

    #[tokio::test]
    async fn test_unknown_admin_path_hides_behind_login() {
        let store = Arc::new(FakeStore::default());

        let anonymous = state(Who::Nobody, store.clone());
        let anonymous = run_unknown_admin(&anonymous, &Credentials::default()).await;
        assert!(matches!(anonymous.outcome, Outcome::Redirect(ref to) if to == "/auth/login"));

        let admin = state(Who::Refreshed, store.clone());
        let admin = run_unknown_admin(&admin, &Credentials::default()).await;
        assert!(matches!(admin.outcome, Outcome::NotFound(Locale::En)));
        assert_eq!(admin.set_cookies.len(), 2);

        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    }
}
