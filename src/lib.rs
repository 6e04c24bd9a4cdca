//! HireMeBahamas listings API: TTL caching, rate limiting and dual
//! cursor/offset pagination behind an axum HTTP surface.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
pub mod rate_limit;
