//! Tenant-scoped data layer for the project dashboard
//!
//! Serves the same CRUD surface from two providers: a demo one over static
//! fixtures and a live one over Supabase. The route a client is on decides
//! which one it gets, and crossing from demo into live purges demo state first.

pub mod access;
pub mod app;
pub mod config;
pub mod data;
pub mod http;
pub mod session;
pub mod store;
pub mod util;
