//! Generic Resource Engine
//!
//! One pluggable service per entity kind: CRUD, advanced filtering,
//! pagination, and automatic fan-out on mutation to the kind's channel
//! and the webhook dispatcher.
//!
//! # Architecture
//!
//! - **`adapter`** - The `ResourceAdapter` trait binding a kind's schema
//!   triple, column table, and output projection
//! - **`filters`** - Filter AST and its compilation into SQL
//! - **`service`** - The generic `ResourceService<A>` implementing every
//!   operation; kind-specific code never duplicates CRUD
//!
//! A new kind is declared by writing an adapter and constructing a
//! service with its channel handle; nothing else changes.

pub mod adapter;
pub mod filters;
pub mod service;

pub use adapter::{BindValue, ColumnDef, ColumnType, ResourceAdapter};
pub use filters::{Condition, ConditionGroup, FilterNode, FilterOperator, LogicalOperator, QueryFilter};
pub use service::{Paginated, ResourceService};
