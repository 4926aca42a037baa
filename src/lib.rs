//! # Ripple
//!
//! A real-time CRUD application server: a generic resource engine
//! coupled to a WebSocket broadcast fabric, a durable background-job
//! pipeline, webhook delivery with an audit trail, and a sliding-window
//! rate limiter, all coordinated through one shared key-value store.
//!
//! ## Architecture
//!
//! ```text
//! ripple/
//! ├── config       - Environment-driven settings
//! ├── error        - AppError taxonomy + HTTP rendering
//! ├── store        - Shared store handle and read-through cache
//! ├── channels     - WebSocket channel fabric
//! ├── resource     - Generic CRUD engine, filter compiler, adapters
//! ├── models       - Rows, schemas, and per-kind adapters
//! ├── webhooks     - Subscriptions, HMAC signing, delivery engine
//! ├── queue        - Job queue, worker, notification bridge
//! ├── jobs         - Built-in job families (media, email, webhooks)
//! ├── rate_limit   - Sliding-window admission control
//! ├── middleware   - Rate-limit HTTP gate
//! ├── routes       - HTTP/WS handlers and router assembly
//! └── server       - State container and startup wiring
//! ```
//!
//! Every mutation through a resource service fans out to the kind's
//! channel and the webhook dispatcher; workers publish progress back
//! through the store's pub/sub, which the notification bridge forwards
//! to connected clients.

pub mod channels;
pub mod config;
pub mod error;
pub mod jobs;
pub mod middleware;
pub mod models;
pub mod queue;
pub mod rate_limit;
pub mod resource;
pub mod routes;
pub mod server;
pub mod store;
pub mod webhooks;
