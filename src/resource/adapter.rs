/**
 * Resource Adapter
 *
 * The seam between the generic engine and a concrete kind. An adapter
 * supplies the schema triple (stored row, accepted input, partial
 * update), the public output projection, the kind/channel name, the
 * webhook event prefix, and a static column table the filter compiler
 * validates fields against.
 *
 * Everything here is declarative; the adapter never touches the
 * database, the fabric, or the cache itself.
 */

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::postgres::PgRow;
use sqlx::{FromRow, Postgres, QueryBuilder};

use crate::error::AppError;

/// SQL-facing type of a column; keys the operator table in the filter
/// compiler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    BigInt,
    Double,
    Text,
    Boolean,
    Timestamp,
}

/// One entry in an adapter's column table
#[derive(Debug, Clone, Copy)]
pub struct ColumnDef {
    pub name: &'static str,
    pub ty: ColumnType,
}

impl ColumnDef {
    pub const fn new(name: &'static str, ty: ColumnType) -> Self {
        Self { name, ty }
    }
}

/// An owned value ready to be bound into a generated statement
#[derive(Debug, Clone, PartialEq)]
pub enum BindValue {
    BigInt(i64),
    Double(f64),
    Text(String),
    Boolean(bool),
    Timestamp(DateTime<Utc>),
    Null,
}

impl BindValue {
    /// Append this value to a query under construction, as a bind
    /// parameter (or a literal NULL).
    pub fn push(self, qb: &mut QueryBuilder<'_, Postgres>) {
        match self {
            Self::BigInt(v) => {
                qb.push_bind(v);
            }
            Self::Double(v) => {
                qb.push_bind(v);
            }
            Self::Text(v) => {
                qb.push_bind(v);
            }
            Self::Boolean(v) => {
                qb.push_bind(v);
            }
            Self::Timestamp(v) => {
                qb.push_bind(v);
            }
            Self::Null => {
                qb.push("NULL");
            }
        }
    }
}

impl From<Option<String>> for BindValue {
    fn from(value: Option<String>) -> Self {
        value.map(Self::Text).unwrap_or(Self::Null)
    }
}

/// Binding between the generic engine and one entity kind.
///
/// `Stored` is the persisted row, `Input` the accepted creation shape,
/// `Update` the partial-update shape, and `Output` the publicly visible
/// projection (what gets broadcast and returned; never the raw row).
pub trait ResourceAdapter: Send + Sync + 'static {
    type Stored: for<'r> FromRow<'r, PgRow> + Send + Unpin + 'static;
    type Input: DeserializeOwned + Send + 'static;
    type Update: DeserializeOwned + Send + 'static;
    type Output: Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Kind name; doubles as table name, channel name, and cache prefix
    fn kind(&self) -> &'static str;

    /// Webhook event family prefix (`users` -> `user`, so events read
    /// `user.created`)
    fn event_prefix(&self) -> &'static str;

    /// Static column table used for filter/order field validation
    fn columns(&self) -> &'static [ColumnDef];

    /// Validate a creation input; reject with the offending field path
    fn validate_input(&self, _input: &Self::Input) -> Result<(), AppError> {
        Ok(())
    }

    /// Validate a partial update
    fn validate_update(&self, _update: &Self::Update) -> Result<(), AppError> {
        Ok(())
    }

    /// Columns and values to insert for a new instance
    fn insert_values(&self, input: &Self::Input) -> Vec<(&'static str, BindValue)>;

    /// Columns and values for the supplied fields of a partial update;
    /// omitted fields must not appear
    fn update_values(&self, update: &Self::Update) -> Vec<(&'static str, BindValue)>;

    /// Project a stored row into the public output shape
    fn project(&self, stored: Self::Stored) -> Self::Output;
}
