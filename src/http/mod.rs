//! HTTP surface: routes, middleware and error mapping

pub mod middleware;
pub mod routes;

pub use routes::{build_router, AppError};
