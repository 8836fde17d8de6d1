//! # Views
//!
//! Pages are a thin HTML shell. The tables and forms themselves are client
//! components; the shell only names the component and hands it its props as a
//! JSON island:
//!
//! ```html
//! <div id="app" data-component="posts-form"></div>
//! <script id="props" type="application/json">{"initialData":{...},"locale":"en"}</script>
//! ```
use askama::Template;
use axum::response::Html;
use serde_json::{Value, json};

use crate::{
    locale::Locale,
    pages::{Collection, PageData, Rendered, ViewKind},
};

#[derive(Template)]
#[template(path = "page.html")]
struct PageTemplate<'a> {
    lang: &'a str,
    dir: &'a str,
    title: &'a str,
    component: &'a str,
    signed_in_as: &'a str,
    props: String,
}

#[derive(Template)]
#[template(path = "login.html")]
struct LoginTemplate<'a> {
    lang: &'a str,
    dir: &'a str,
    title: &'a str,
    action: &'a str,
    email: &'a str,
    error: &'a str,
}

#[derive(Template)]
#[template(path = "not_found.html")]
struct NotFoundTemplate<'a> {
    lang: &'a str,
    dir: &'a str,
    title: &'a str,
    home: String,
}

#[derive(Template)]
#[template(path = "error.html")]
struct ErrorTemplate<'a> {
    lang: &'a str,
    dir: &'a str,
    title: &'a str,
}

pub fn render_page(rendered: &Rendered) -> Result<Html<String>, askama::Error> {
    let view = &rendered.view;
    let signed_in_as = rendered
        .principal
        .as_ref()
        .map(|p| p.email.as_deref().unwrap_or(&p.id))
        .unwrap_or_default();

    let page = PageTemplate {
        lang: view.locale.as_str(),
        dir: view.locale.dir(),
        title: &view.title,
        component: &view.component,
        signed_in_as,
        props: script_safe(&props(rendered)),
    };

    page.render().map(Html)
}

pub fn login_page(action: &str, email: &str, error: &str) -> Result<Html<String>, askama::Error> {
    let locale = Locale::default();

    LoginTemplate {
        lang: locale.as_str(),
        dir: locale.dir(),
        title: "Sign in",
        action,
        email,
        error,
    }
    .render()
    .map(Html)
}

pub fn not_found_page(locale: Locale) -> Result<Html<String>, askama::Error> {
    NotFoundTemplate {
        lang: locale.as_str(),
        dir: locale.dir(),
        title: "Page not found",
        home: format!("/{locale}"),
    }
    .render()
    .map(Html)
}

pub fn error_page() -> Result<Html<String>, askama::Error> {
    let locale = Locale::default();

    ErrorTemplate {
        lang: locale.as_str(),
        dir: locale.dir(),
        title: "Something went wrong",
    }
    .render()
    .map(Html)
}

/// Props handed to the client component.
pub fn props(rendered: &Rendered) -> Value {
    let mut props = json!({
        "locale": rendered.view.locale,
        "user": rendered.principal,
    });

    match (rendered.view.kind, &rendered.data) {
        (ViewKind::Form, PageData::Record(row)) => {
            props["initialData"] = Value::Object(row.clone());
        }
        (ViewKind::Form, _) => {
            props["initialData"] = Value::Null;
        }
        (_, PageData::Collection(collection)) => {
            props["data"] = Value::Array(
                collection
                    .rows()
                    .iter()
                    .cloned()
                    .map(Value::Object)
                    .collect(),
            );
            props["loadFailed"] = Value::Bool(collection.is_failed());
        }
        (_, PageData::Record(row)) => {
            props["data"] = Value::Object(row.clone());
        }
        (_, PageData::Empty) => {
            props["data"] = Value::Null;
        }
    }

    props
}

/// Serialized JSON that cannot close the surrounding `<script>` element.
fn script_safe(props: &Value) -> String {
    props.to_string().replace('<', "\\u003c")
}
