//! Webhook Dispatch Engine
//!
//! Turns in-process events into externally visible HTTP POST deliveries
//! with a durable audit trail.
//!
//! - **`signature`** - Canonical-JSON HMAC-SHA256 signing and
//!   constant-time verification
//! - **`service`** - Subscription management, the event catalog, and
//!   `trigger_event` matching/enqueueing
//! - **`delivery`** - The delivery attempt itself: request, outcome
//!   classification, retry scheduling, audit record

pub mod delivery;
pub mod service;
pub mod signature;

pub use delivery::{AttemptOutcome, WebhookTestResult};
pub use service::{WebhookService, EVENT_CATALOG};
