//! Application Error Module
//!
//! Defines the error taxonomy shared by every subsystem and its
//! conversion into HTTP responses.
//!
//! - **`types`** - The `AppError` enum and constructor helpers
//! - **`conversion`** - `IntoResponse` implementation for Axum handlers

pub mod conversion;
pub mod types;

pub use types::AppError;
