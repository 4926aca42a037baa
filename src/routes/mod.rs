//! Route Handlers
//!
//! - **`router`** - Assembles every route group and the middleware stack
//! - **`resources`** - Generic CRUD/filter routes, instantiated per kind
//! - **`ws`** - WebSocket upgrade endpoint and fabric stats
//! - **`tasks`** - Job submission and status polling
//! - **`webhooks`** - Subscription management, delivery logs, test fire

pub mod resources;
pub mod router;
pub mod tasks;
pub mod webhooks;
pub mod ws;

pub use router::create_router;
