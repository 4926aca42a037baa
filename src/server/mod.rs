//! Server Module
//!
//! Startup wiring for the HTTP/WebSocket surface:
//!
//! - **`state`** - The application state container and `FromRef`
//!   extractors
//! - **`init`** - Component construction, migrations, and background
//!   task spawning

pub mod init;
pub mod state;

pub use init::create_app;
pub use state::AppState;
