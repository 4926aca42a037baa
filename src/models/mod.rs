//! Data Models
//!
//! Row structs, input/update shapes, output projections, and the
//! resource adapters that bind each kind to the generic engine.

pub mod job;
pub mod media;
pub mod user;
pub mod webhook;

pub use job::{JobRecord, JobStatus};
pub use media::{Media, MediaAdapter, MediaCreate, MediaRead, MediaUpdate};
pub use user::{User, UserAdapter, UserCreate, UserRead, UserUpdate};
pub use webhook::{
    SubscriptionCreate, SubscriptionStats, SubscriptionUpdate, WebhookDelivery,
    WebhookSubscription,
};
