//! Channel Broadcast Fabric
//!
//! Multiplexes named broadcast channels over WebSocket connections. One
//! channel exists per registered resource kind plus the reserved `tasks`
//! channel for job progress notifications.
//!
//! # Architecture
//!
//! - **`envelope`** - The JSON frame format sent to clients
//! - **`manager`** - Connection registry and fan-out
//! - **`channel`** - Per-kind handles the resource engine broadcasts on
//!
//! # Delivery Semantics
//!
//! Best-effort, at-most-once per connected client. Each client owns a
//! bounded queue drained by a dedicated writer task; a slow consumer
//! loses its oldest pending frames rather than blocking the channel.
//! Frame order per client is preserved.

pub mod channel;
pub mod envelope;
pub mod manager;

pub use channel::Channel;
pub use envelope::Envelope;
pub use manager::{ConnectionManager, FabricStats};
