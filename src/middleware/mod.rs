//! HTTP Middleware
//!
//! Request-path middleware applied in the router; currently the
//! sliding-window rate-limit gate.

pub mod rate_limit;

pub use rate_limit::rate_limit_middleware;
