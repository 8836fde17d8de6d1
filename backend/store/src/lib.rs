//! # Store
//!
//! Client side of the hosted database: the row API for reads and the auth
//! service for sessions. Both live under one project URL and share one
//! project key.
//!
//! ```text
//! {project}/rest/v1/{table}?select=*&{column}=eq.{value}&order={column}.{asc|desc}
//! {project}/auth/v1/{user|token|logout}
//! ```
//!
//! Writes are not here. The admin forms talk to the row API directly.
pub mod auth;
pub mod error;
pub mod query;
pub mod rows;

pub use auth::{AuthClient, AuthUser, TokenGrant};
pub use error::{AuthError, StoreError};
pub use query::{Direction, QueryRequest, QueryResult, Row};
pub use rows::{RestRowStore, RowStore};
