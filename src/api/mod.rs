//! # HTTP Boundary
//!
//! axum router exposing the credential lifecycle, audit trail and vault
//! health operations, plus the request guards and response headers applied
//! to every call.

pub mod docs;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;

pub use error::{ApiError, ErrorBody};
pub use routes::build_router;
pub use server::start_api_server;
pub use state::{ApiState, Backends};
