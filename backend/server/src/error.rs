use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use store::StoreError;
use thiserror::Error;
use tracing::error;

use crate::{session::SessionError, views::error_page};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Row store failure: {0}")]
    Store(#[from] StoreError),

    #[error("Session failure: {0}")]
    Session(#[from] SessionError),

    #[error("Template failure: {0}")]
    Render(#[from] askama::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Store(StoreError::InvalidIdentifier(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Store(_) | AppError::Session(_) => StatusCode::BAD_GATEWAY,
            AppError::Render(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Outermost failure boundary: one generic page, details only in the log.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        error!("Request failed with {status}: {self}");

        match error_page() {
            Ok(page) => (status, page).into_response(),
            Err(e) => {
                error!("Error page failed to render: {e}");
                (status, Html("Something went wrong")).into_response()
            }
        }
    }
}
