use std::sync::Arc;

use axum::{
    Form,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use store::{Direction, QueryRequest};
use tracing::warn;

use crate::{
    error::AppError,
    locale::Locale,
    pages::{
        Access, Fetch, NotFoundPolicy, Outcome, Page, PageResponse, View, ViewKind, not_found,
        run_page, run_unknown_admin, with_cookies,
    },
    session::{CookieUpdate, Credentials, SessionError},
    state::AppState,
    views::login_page,
};

const ADMIN_HOME: &str = "/admin";

/// What to do when an admin record id matches nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Missing {
    NotFound,
    BackToList,
}

/// One admin-managed table.
#[derive(Debug)]
pub struct Resource {
    pub slug: &'static str,
    pub table: &'static str,
    pub title: &'static str,
    pub order: (&'static str, Direction),
    /// Has `/new` and an edit form; otherwise records are read-only
    pub editable: bool,
    pub missing: Missing,
}

pub const RESOURCES: &[Resource] = &[
    Resource {
        slug: "posts",
        table: "posts",
        title: "Blog posts",
        order: ("created_at", Direction::Descending),
        editable: true,
        missing: Missing::NotFound,
    },
    Resource {
        slug: "jobs",
        table: "jobs",
        title: "Job listings",
        order: ("created_at", Direction::Descending),
        editable: true,
        missing: Missing::NotFound,
    },
    Resource {
        slug: "universities",
        table: "universities",
        title: "Universities",
        order: ("name", Direction::Ascending),
        editable: true,
        missing: Missing::NotFound,
    },
    Resource {
        slug: "programs",
        table: "programs",
        title: "Programs",
        order: ("name", Direction::Ascending),
        editable: true,
        missing: Missing::NotFound,
    },
    Resource {
        slug: "scholarships",
        table: "scholarships",
        title: "Scholarships",
        order: ("deadline", Direction::Ascending),
        editable: true,
        missing: Missing::NotFound,
    },
    Resource {
        slug: "reviews",
        table: "agent_reviews",
        title: "Agent reviews",
        order: ("created_at", Direction::Descending),
        editable: true,
        missing: Missing::BackToList,
    },
    Resource {
        slug: "messages",
        table: "contact_messages",
        title: "Contact messages",
        order: ("created_at", Direction::Descending),
        editable: false,
        missing: Missing::NotFound,
    },
    Resource {
        slug: "content",
        table: "content_blocks",
        title: "Page content",
        order: ("page", Direction::Ascending),
        editable: true,
        missing: Missing::NotFound,
    },
];

impl Resource {
    pub fn find(slug: &str) -> Option<&'static Resource> {
        RESOURCES.iter().find(|r| r.slug == slug)
    }

    fn list_path(&self) -> String {
        format!("{ADMIN_HOME}/{}", self.slug)
    }

    fn view(&self, kind: ViewKind) -> View {
        let suffix = match kind {
            ViewKind::Table => "table",
            ViewKind::Detail => "detail",
            ViewKind::Form => "form",
        };

        View {
            component: format!("{}-{suffix}", self.slug),
            title: self.title.to_string(),
            locale: Locale::default(),
            kind,
        }
    }

    pub fn list_page(&self) -> Page {
        let (column, direction) = self.order;

        Page {
            access: Access::SignedIn,
            fetch: Fetch::Collection(QueryRequest::select(self.table).order(column, direction)),
            view: self.view(ViewKind::Table),
        }
    }

    pub fn new_page(&self) -> Option<Page> {
        self.editable.then(|| Page {
            access: Access::SignedIn,
            fetch: Fetch::Nothing,
            view: self.view(ViewKind::Form),
        })
    }

    pub fn record_page(&self, id: &str) -> Page {
        let missing = match self.missing {
            Missing::NotFound => NotFoundPolicy::NotFound,
            Missing::BackToList => NotFoundPolicy::RedirectTo(self.list_path()),
        };

        let kind = if self.editable {
            ViewKind::Form
        } else {
            ViewKind::Detail
        };

        Page {
            access: Access::SignedIn,
            fetch: Fetch::Record {
                request: QueryRequest::select(self.table).eq("id", id).single(),
                missing,
            },
            view: self.view(kind),
        }
    }
}

/// One public, localized section of the marketing site.
#[derive(Debug)]
pub struct Section {
    /// Path segment after the locale; empty for the home page
    pub slug: &'static str,
    pub table: &'static str,
    pub title: &'static str,
    pub filter: Option<(&'static str, &'static str)>,
    pub order: Option<(&'static str, Direction)>,
    /// Column looked up by `/{locale}/{slug}/{key}`, if the section has detail pages
    pub key: Option<&'static str>,
}

const fn content(slug: &'static str, page: &'static str, title: &'static str) -> Section {
    Section {
        slug,
        table: "content_blocks",
        title,
        filter: Some(("page", page)),
        order: Some(("position", Direction::Ascending)),
        key: None,
    }
}

pub const SECTIONS: &[Section] = &[
    content("", "home", "Home"),
    content("about", "about", "About us"),
    content("contact", "contact", "Contact"),
    Section {
        slug: "blog",
        table: "posts",
        title: "Blog",
        filter: Some(("published", "true")),
        order: Some(("published_at", Direction::Descending)),
        key: Some("slug"),
    },
    Section {
        slug: "careers",
        table: "jobs",
        title: "Careers",
        filter: Some(("is_active", "true")),
        order: Some(("created_at", Direction::Descending)),
        key: Some("id"),
    },
    Section {
        slug: "universities",
        table: "universities",
        title: "Universities",
        filter: None,
        order: Some(("name", Direction::Ascending)),
        key: Some("id"),
    },
    Section {
        slug: "programs",
        table: "programs",
        title: "Programs",
        filter: None,
        order: Some(("name", Direction::Ascending)),
        key: Some("id"),
    },
    Section {
        slug: "scholarships",
        table: "scholarships",
        title: "Scholarships",
        filter: None,
        order: Some(("deadline", Direction::Ascending)),
        key: Some("id"),
    },
    Section {
        slug: "reviews",
        table: "agent_reviews",
        title: "Reviews",
        filter: Some(("approved", "true")),
        order: Some(("created_at", Direction::Descending)),
        key: None,
    },
];

impl Section {
    pub fn find(slug: &str) -> Option<&'static Section> {
        SECTIONS.iter().find(|s| s.slug == slug)
    }

    fn component(&self) -> &'static str {
        if self.slug.is_empty() { "home" } else { self.slug }
    }

    pub fn list_page(&self, locale: Locale) -> Page {
        let mut request = QueryRequest::select(self.table);

        if let Some((column, value)) = self.filter {
            request = request.eq(column, value);
        }

        if let Some((column, direction)) = self.order {
            request = request.order(column, direction);
        }

        Page {
            access: Access::Public,
            fetch: Fetch::Collection(request),
            view: View {
                component: self.component().to_string(),
                title: self.title.to_string(),
                locale,
                kind: ViewKind::Table,
            },
        }
    }

    pub fn record_page(&self, locale: Locale, key: &str) -> Option<Page> {
        let column = self.key?;

        Some(Page {
            access: Access::Public,
            fetch: Fetch::Record {
                request: QueryRequest::select(self.table).eq(column, key).single(),
                missing: NotFoundPolicy::NotFound,
            },
            view: View {
                component: format!("{}-detail", self.component()),
                title: self.title.to_string(),
                locale,
                kind: ViewKind::Detail,
            },
        })
    }
}

pub async fn healthz() -> &'static str {
    "ok"
}

pub async fn root() -> Redirect {
    Redirect::to(&format!("/{}", Locale::default()))
}

pub async fn fallback() -> Response {
    not_found(Locale::default())
}

pub async fn dashboard(State(state): State<Arc<AppState>>, credentials: Credentials) -> PageResponse {
    let page = Page {
        access: Access::SignedIn,
        fetch: Fetch::Nothing,
        view: View {
            component: "dashboard".to_string(),
            title: "Dashboard".to_string(),
            locale: Locale::default(),
            kind: ViewKind::Detail,
        },
    };

    run_page(&state, &credentials, page).await
}

pub async fn admin_list(
    State(state): State<Arc<AppState>>,
    credentials: Credentials,
    Path(resource): Path<String>,
) -> PageResponse {
    match Resource::find(&resource) {
        Some(resource) => run_page(&state, &credentials, resource.list_page()).await,
        None => run_unknown_admin(&state, &credentials).await,
    }
}

pub async fn admin_new(
    State(state): State<Arc<AppState>>,
    credentials: Credentials,
    Path(resource): Path<String>,
) -> PageResponse {
    match Resource::find(&resource).and_then(Resource::new_page) {
        Some(page) => run_page(&state, &credentials, page).await,
        None => run_unknown_admin(&state, &credentials).await,
    }
}

pub async fn admin_record(
    State(state): State<Arc<AppState>>,
    credentials: Credentials,
    Path((resource, id)): Path<(String, String)>,
) -> PageResponse {
    match Resource::find(&resource) {
        Some(resource) => run_page(&state, &credentials, resource.record_page(&id)).await,
        None => run_unknown_admin(&state, &credentials).await,
    }
}

pub async fn public_home(
    State(state): State<Arc<AppState>>,
    credentials: Credentials,
    Path(locale): Path<String>,
) -> PageResponse {
    public_list(state, credentials, locale, String::new()).await
}

pub async fn public_section(
    State(state): State<Arc<AppState>>,
    credentials: Credentials,
    Path((locale, section)): Path<(String, String)>,
) -> PageResponse {
    public_list(state, credentials, locale, section).await
}

async fn public_list(
    state: Arc<AppState>,
    credentials: Credentials,
    locale: String,
    section: String,
) -> PageResponse {
    let Ok(locale) = locale.parse::<Locale>() else {
        return PageResponse::new(Outcome::NotFound(Locale::default()));
    };

    match Section::find(&section) {
        Some(section) => run_page(&state, &credentials, section.list_page(locale)).await,
        None => PageResponse::new(Outcome::NotFound(locale)),
    }
}

pub async fn public_record(
    State(state): State<Arc<AppState>>,
    credentials: Credentials,
    Path((locale, section, key)): Path<(String, String, String)>,
) -> PageResponse {
    let Ok(locale) = locale.parse::<Locale>() else {
        return PageResponse::new(Outcome::NotFound(Locale::default()));
    };

    // the home page has no detail pages even though its slug is empty
    let page = Section::find(&section)
        .filter(|s| !s.slug.is_empty())
        .and_then(|s| s.record_page(locale, &key));

    match page {
        Some(page) => run_page(&state, &credentials, page).await,
        None => PageResponse::new(Outcome::NotFound(locale)),
    }
}

#[derive(Deserialize)]
pub struct LoginForm {
    email: String,
    password: String,
}

pub async fn login_form(State(state): State<Arc<AppState>>, credentials: Credentials) -> Response {
    let resolved = if credentials.is_empty() {
        Ok(Default::default())
    } else {
        state.sessions.resolve(&credentials).await
    };

    match resolved {
        Ok(resolved) => {
            let cookies = resolved
                .cookies
                .map(|update| update.cookies(&state.cookies).to_vec())
                .unwrap_or_default();

            let response = if resolved.session.is_authenticated() {
                Redirect::to(ADMIN_HOME).into_response()
            } else {
                login_response(&state, StatusCode::OK, "", "")
            };

            with_cookies(response, &cookies)
        }
        Err(e) => {
            warn!("{e}");
            login_response(&state, StatusCode::OK, "", "")
        }
    }
}

pub async fn login(State(state): State<Arc<AppState>>, Form(form): Form<LoginForm>) -> Response {
    match state.sessions.sign_in(form.email.trim(), &form.password).await {
        Ok(resolved) => {
            let cookies = resolved
                .cookies
                .map(|update| update.cookies(&state.cookies).to_vec())
                .unwrap_or_default();

            with_cookies(Redirect::to(ADMIN_HOME).into_response(), &cookies)
        }
        Err(SessionError::Rejected) => login_response(
            &state,
            StatusCode::UNAUTHORIZED,
            form.email.trim(),
            "Invalid email or password",
        ),
        Err(e) => AppError::from(e).into_response(),
    }
}

pub async fn logout(State(state): State<Arc<AppState>>, credentials: Credentials) -> Response {
    if let Some(access_token) = &credentials.access_token {
        if let Err(e) = state.sessions.sign_out(access_token).await {
            warn!("Sign out did not reach the auth service: {e}");
        }
    }

    with_cookies(
        Redirect::to(&state.config.login_path).into_response(),
        &CookieUpdate::Clear.cookies(&state.cookies),
    )
}

fn login_response(state: &AppState, status: StatusCode, email: &str, error: &str) -> Response {
    match login_page(&state.config.login_path, email, error) {
        Ok(page) => (status, page).into_response(),
        Err(e) => AppError::from(e).into_response(),
    }
}
