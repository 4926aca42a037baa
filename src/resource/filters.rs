/**
 * Advanced Filtering
 *
 * Structured queries for any resource kind: a recursive condition tree,
 * single-field ordering, and bounded pagination, compiled into SQL
 * through `sqlx::QueryBuilder`.
 *
 * # Compilation Rules
 *
 * - Fields are validated against the adapter's static column table.
 *   Unknown fields are dropped with a warning; the rest of the query
 *   still runs.
 * - Values must be coercible to the column's SQL type for the chosen
 *   operator; non-coercible conditions are likewise dropped with a
 *   warning.
 * - An empty (or fully dropped) condition set matches everything.
 * - Ordering falls back to `id ASC` and every ordering gets an `id ASC`
 *   tie-break.
 *
 * Column names pushed into SQL always come from the static column
 * table, never from request input; user-supplied values travel as bind
 * parameters.
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::{Postgres, QueryBuilder};

use crate::error::AppError;
use crate::resource::adapter::{ColumnDef, ColumnType};

/// Pagination bounds for filtered queries
pub const DEFAULT_LIMIT: i64 = 100;
pub const MAX_LIMIT: i64 = 1000;

/// How conditions within a set combine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogicalOperator {
    #[default]
    And,
    Or,
}

impl LogicalOperator {
    fn sql(self) -> &'static str {
        match self {
            Self::And => " AND ",
            Self::Or => " OR ",
        }
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderDirection {
    #[default]
    Asc,
    Desc,
}

/// Comparison operators supported by leaf conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Contains,
    Icontains,
    Startswith,
    Endswith,
    In,
    NotIn,
    IsNull,
    IsNotNull,
}

/// A single field comparison
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Condition {
    pub field: String,
    pub operator: FilterOperator,
    #[serde(default)]
    pub value: serde_json::Value,
}

/// A node in the condition tree: a leaf comparison or a nested group
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum FilterNode {
    Condition(Condition),
    Group(ConditionGroup),
}

/// A group of conditions combined with one logical operator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConditionGroup {
    pub conditions: Vec<FilterNode>,
    #[serde(default)]
    pub operator: LogicalOperator,
}

/// A complete structured query: conditions, ordering, pagination
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct QueryFilter {
    #[serde(default)]
    pub conditions: Option<Vec<FilterNode>>,
    #[serde(default)]
    pub operator: LogicalOperator,
    #[serde(default)]
    pub order_by: Option<String>,
    #[serde(default)]
    pub order_direction: OrderDirection,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

impl QueryFilter {
    /// Effective limit with default and no clamping (validation rejects
    /// out-of-range values instead of silently adjusting them)
    pub fn effective_limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_LIMIT)
    }

    /// Effective offset with default
    pub fn effective_offset(&self) -> i64 {
        self.offset.unwrap_or(0)
    }

    /// Reject out-of-range pagination before compiling anything
    pub fn validate(&self) -> Result<(), AppError> {
        if let Some(limit) = self.limit {
            if !(1..=MAX_LIMIT).contains(&limit) {
                return Err(AppError::validation(
                    "limit",
                    format!("must be between 1 and {MAX_LIMIT}"),
                ));
            }
        }
        if let Some(offset) = self.offset {
            if offset < 0 {
                return Err(AppError::validation("offset", "must be >= 0"));
            }
        }
        Ok(())
    }

    /// Stable short hash of the whole filter, used as a cache key part
    pub fn cache_hash(&self) -> String {
        let canonical = serde_json::to_string(self).unwrap_or_default();
        let digest = Sha256::digest(canonical.as_bytes());
        hex::encode(&digest[..8])
    }
}

/// A value coerced to a column's SQL type, ready to bind
enum Scalar {
    BigInt(i64),
    Double(f64),
    Text(String),
    Boolean(bool),
    Timestamp(DateTime<Utc>),
}

impl Scalar {
    fn bind(self, qb: &mut QueryBuilder<'_, Postgres>) {
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
        }
    }
}

fn coerce(ty: ColumnType, value: &serde_json::Value) -> Option<Scalar> {
    match ty {
        ColumnType::BigInt => value.as_i64().map(Scalar::BigInt),
        ColumnType::Double => value.as_f64().map(Scalar::Double),
        ColumnType::Text => value.as_str().map(|s| Scalar::Text(s.to_string())),
        ColumnType::Boolean => value.as_bool().map(Scalar::Boolean),
        ColumnType::Timestamp => value
            .as_str()
            .and_then(|s| s.parse::<DateTime<Utc>>().ok())
            .map(Scalar::Timestamp),
    }
}

fn find_column(columns: &[ColumnDef], field: &str) -> Option<ColumnDef> {
    columns.iter().copied().find(|c| c.name == field)
}

/// Whether a leaf condition survives compilation for this column table
fn condition_is_valid(condition: &Condition, columns: &[ColumnDef]) -> bool {
    let Some(column) = find_column(columns, &condition.field) else {
        tracing::warn!(
            subsystem = "filters",
            field = %condition.field,
            "unknown filter field, dropping condition"
        );
        return false;
    };

    let valid = match condition.operator {
        FilterOperator::IsNull | FilterOperator::IsNotNull => true,
        FilterOperator::Contains
        | FilterOperator::Icontains
        | FilterOperator::Startswith
        | FilterOperator::Endswith => {
            column.ty == ColumnType::Text && condition.value.is_string()
        }
        FilterOperator::In | FilterOperator::NotIn => condition.value.is_array(),
        _ => coerce(column.ty, &condition.value).is_some(),
    };

    if !valid {
        tracing::warn!(
            subsystem = "filters",
            field = %condition.field,
            operator = ?condition.operator,
            "filter value not coercible for column, dropping condition"
        );
    }
    valid
}

/// Whether any leaf in a node list survives compilation
fn has_valid_condition(nodes: &[FilterNode], columns: &[ColumnDef]) -> bool {
    nodes.iter().any(|node| match node {
        FilterNode::Condition(c) => condition_is_valid(c, columns),
        FilterNode::Group(g) => has_valid_condition(&g.conditions, columns),
    })
}

fn push_condition(qb: &mut QueryBuilder<'_, Postgres>, condition: &Condition, column: ColumnDef) {
    let name = column.name;
    match condition.operator {
        FilterOperator::Eq
        | FilterOperator::Ne
        | FilterOperator::Gt
        | FilterOperator::Gte
        | FilterOperator::Lt
        | FilterOperator::Lte => {
            let op = match condition.operator {
                FilterOperator::Eq => " = ",
                FilterOperator::Ne => " != ",
                FilterOperator::Gt => " > ",
                FilterOperator::Gte => " >= ",
                FilterOperator::Lt => " < ",
                _ => " <= ",
            };
            qb.push(name);
            qb.push(op);
            match coerce(column.ty, &condition.value) {
                Some(scalar) => scalar.bind(qb),
                // Pre-validated; keep the expression well-formed regardless
                None => {
                    qb.push("NULL");
                }
            }
        }
        FilterOperator::Contains
        | FilterOperator::Icontains
        | FilterOperator::Startswith
        | FilterOperator::Endswith => {
            let needle = condition.value.as_str().unwrap_or_default();
            let (keyword, pattern) = match condition.operator {
                FilterOperator::Contains => (" LIKE ", format!("%{needle}%")),
                FilterOperator::Icontains => (" ILIKE ", format!("%{needle}%")),
                FilterOperator::Startswith => (" LIKE ", format!("{needle}%")),
                _ => (" LIKE ", format!("%{needle}")),
            };
            qb.push(name);
            qb.push(keyword);
            qb.push_bind(pattern);
        }
        FilterOperator::In | FilterOperator::NotIn => {
            let items: Vec<Scalar> = condition
                .value
                .as_array()
                .map(|values| {
                    values
                        .iter()
                        .filter_map(|v| coerce(column.ty, v))
                        .collect()
                })
                .unwrap_or_default();

            if items.is_empty() {
                // IN () is not SQL; an empty list matches nothing
                qb.push(match condition.operator {
                    FilterOperator::In => "FALSE",
                    _ => "TRUE",
                });
                return;
            }

            qb.push(name);
            qb.push(match condition.operator {
                FilterOperator::In => " IN (",
                _ => " NOT IN (",
            });
            for (i, item) in items.into_iter().enumerate() {
                if i > 0 {
                    qb.push(", ");
                }
                item.bind(qb);
            }
            qb.push(")");
        }
        FilterOperator::IsNull => {
            qb.push(name);
            qb.push(" IS NULL");
        }
        FilterOperator::IsNotNull => {
            qb.push(name);
            qb.push(" IS NOT NULL");
        }
    }
}

fn push_group(
    qb: &mut QueryBuilder<'_, Postgres>,
    nodes: &[FilterNode],
    operator: LogicalOperator,
    columns: &[ColumnDef],
) {
    let mut first = true;
    for node in nodes {
        match node {
            FilterNode::Condition(condition) => {
                let Some(column) = find_column(columns, &condition.field) else {
                    continue;
                };
                if !condition_is_valid(condition, columns) {
                    continue;
                }
                if !first {
                    qb.push(operator.sql());
                }
                push_condition(qb, condition, column);
                first = false;
            }
            FilterNode::Group(group) => {
                if !has_valid_condition(&group.conditions, columns) {
                    continue;
                }
                if !first {
                    qb.push(operator.sql());
                }
                qb.push("(");
                push_group(qb, &group.conditions, group.operator, columns);
                qb.push(")");
                first = false;
            }
        }
    }
}

/// Append a `WHERE` clause for the filter's conditions, when any survive
/// validation against the column table.
pub fn push_where_clause(
    qb: &mut QueryBuilder<'_, Postgres>,
    filter: &QueryFilter,
    columns: &[ColumnDef],
) {
    let Some(nodes) = &filter.conditions else {
        return;
    };
    if !has_valid_condition(nodes, columns) {
        return;
    }
    qb.push(" WHERE ");
    push_group(qb, nodes, filter.operator, columns);
}

/// Append ordering: the requested field (validated, defaulting to `id`)
/// with an `id ASC` tie-break.
pub fn push_order_clause(
    qb: &mut QueryBuilder<'_, Postgres>,
    filter: &QueryFilter,
    columns: &[ColumnDef],
) {
    let field = filter
        .order_by
        .as_deref()
        .and_then(|name| {
            let found = find_column(columns, name);
            if found.is_none() {
                tracing::warn!(
                    subsystem = "filters",
                    field = name,
                    "unknown ordering field, falling back to id"
                );
            }
            found
        })
        .map(|c| c.name)
        .unwrap_or("id");

    let direction = match filter.order_direction {
        OrderDirection::Asc => " ASC",
        OrderDirection::Desc => " DESC",
    };

    qb.push(" ORDER BY ");
    qb.push(field);
    qb.push(direction);
    if field != "id" {
        qb.push(", id ASC");
    }
}

/// Append `LIMIT`/`OFFSET` binds
pub fn push_pagination(qb: &mut QueryBuilder<'_, Postgres>, filter: &QueryFilter) {
    qb.push(" LIMIT ");
    qb.push_bind(filter.effective_limit());
    qb.push(" OFFSET ");
    qb.push_bind(filter.effective_offset());
}

#[cfg(test)]
mod tests {
    use super::*;

    const COLUMNS: &[ColumnDef] = &[
        ColumnDef::new("id", ColumnType::BigInt),
        ColumnDef::new("email", ColumnType::Text),
        ColumnDef::new("is_active", ColumnType::Boolean),
        ColumnDef::new("created_at", ColumnType::Timestamp),
    ];

    fn condition(field: &str, operator: FilterOperator, value: serde_json::Value) -> FilterNode {
        FilterNode::Condition(Condition {
            field: field.to_string(),
            operator,
            value,
        })
    }

    fn compile_where(filter: &QueryFilter) -> String {
        let mut qb = QueryBuilder::new("SELECT * FROM users");
        push_where_clause(&mut qb, filter, COLUMNS);
        qb.sql().to_string()
    }

    #[test]
    fn test_single_condition_compiles() {
        let filter = QueryFilter {
            conditions: Some(vec![condition(
                "email",
                FilterOperator::Icontains,
                serde_json::json!("gmail"),
            )]),
            ..Default::default()
        };
        assert_eq!(
            compile_where(&filter),
            "SELECT * FROM users WHERE email ILIKE $1"
        );
    }

    #[test]
    fn test_unknown_field_is_dropped_not_fatal() {
        let filter = QueryFilter {
            conditions: Some(vec![
                condition("no_such_field", FilterOperator::Eq, serde_json::json!(1)),
                condition("is_active", FilterOperator::Eq, serde_json::json!(true)),
            ]),
            ..Default::default()
        };
        assert_eq!(
            compile_where(&filter),
            "SELECT * FROM users WHERE is_active = $1"
        );
    }

    #[test]
    fn test_all_conditions_dropped_matches_everything() {
        let filter = QueryFilter {
            conditions: Some(vec![condition(
                "ghost",
                FilterOperator::Eq,
                serde_json::json!("x"),
            )]),
            ..Default::default()
        };
        assert_eq!(compile_where(&filter), "SELECT * FROM users");
    }

    #[test]
    fn test_or_group_nests_in_parentheses() {
        let filter = QueryFilter {
            conditions: Some(vec![
                condition("is_active", FilterOperator::Eq, serde_json::json!(true)),
                FilterNode::Group(ConditionGroup {
                    conditions: vec![
                        condition("email", FilterOperator::Endswith, serde_json::json!("@a.com")),
                        condition("email", FilterOperator::Endswith, serde_json::json!("@b.com")),
                    ],
                    operator: LogicalOperator::Or,
                }),
            ]),
            ..Default::default()
        };
        assert_eq!(
            compile_where(&filter),
            "SELECT * FROM users WHERE is_active = $1 AND (email LIKE $2 OR email LIKE $3)"
        );
    }

    #[test]
    fn test_in_operator_binds_each_member() {
        let filter = QueryFilter {
            conditions: Some(vec![condition(
                "id",
                FilterOperator::In,
                serde_json::json!([1, 2, 3]),
            )]),
            ..Default::default()
        };
        assert_eq!(
            compile_where(&filter),
            "SELECT * FROM users WHERE id IN ($1, $2, $3)"
        );
    }

    #[test]
    fn test_empty_in_list_matches_nothing() {
        let filter = QueryFilter {
            conditions: Some(vec![condition(
                "id",
                FilterOperator::In,
                serde_json::json!([]),
            )]),
            ..Default::default()
        };
        assert_eq!(compile_where(&filter), "SELECT * FROM users WHERE FALSE");
    }

    #[test]
    fn test_is_null_ignores_value() {
        let filter = QueryFilter {
            conditions: Some(vec![condition(
                "email",
                FilterOperator::IsNull,
                serde_json::Value::Null,
            )]),
            ..Default::default()
        };
        assert_eq!(
            compile_where(&filter),
            "SELECT * FROM users WHERE email IS NULL"
        );
    }

    #[test]
    fn test_type_mismatch_drops_condition() {
        // Boolean column compared against a string: dropped
        let filter = QueryFilter {
            conditions: Some(vec![condition(
                "is_active",
                FilterOperator::Eq,
                serde_json::json!("yes"),
            )]),
            ..Default::default()
        };
        assert_eq!(compile_where(&filter), "SELECT * FROM users");
    }

    #[test]
    fn test_ordering_adds_id_tiebreak() {
        let filter = QueryFilter {
            order_by: Some("email".to_string()),
            order_direction: OrderDirection::Desc,
            ..Default::default()
        };
        let mut qb = QueryBuilder::new("SELECT * FROM users");
        push_order_clause(&mut qb, &filter, COLUMNS);
        assert_eq!(qb.sql(), "SELECT * FROM users ORDER BY email DESC, id ASC");
    }

    #[test]
    fn test_unknown_order_field_falls_back_to_id() {
        let filter = QueryFilter {
            order_by: Some("ghost".to_string()),
            ..Default::default()
        };
        let mut qb = QueryBuilder::new("SELECT * FROM users");
        push_order_clause(&mut qb, &filter, COLUMNS);
        assert_eq!(qb.sql(), "SELECT * FROM users ORDER BY id ASC");
    }

    #[test]
    fn test_limit_bounds_are_enforced() {
        let filter = QueryFilter {
            limit: Some(MAX_LIMIT + 1),
            ..Default::default()
        };
        assert!(filter.validate().is_err());

        let filter = QueryFilter {
            limit: Some(0),
            ..Default::default()
        };
        assert!(filter.validate().is_err());

        let filter = QueryFilter {
            limit: Some(MAX_LIMIT),
            offset: Some(0),
            ..Default::default()
        };
        assert!(filter.validate().is_ok());
    }

    #[test]
    fn test_filter_deserializes_nested_groups() {
        let raw = serde_json::json!({
            "conditions": [
                {"field": "email", "operator": "icontains", "value": "gmail"},
                {"conditions": [
                    {"field": "is_active", "operator": "eq", "value": true},
                    {"field": "created_at", "operator": "is_not_null"}
                ], "operator": "or"}
            ],
            "order_by": "created_at",
            "order_direction": "desc",
            "limit": 50,
            "offset": 100
        });
        let filter: QueryFilter = serde_json::from_value(raw).unwrap();
        assert_eq!(filter.effective_limit(), 50);
        assert_eq!(filter.effective_offset(), 100);
        let nodes = filter.conditions.as_ref().unwrap();
        assert!(matches!(nodes[0], FilterNode::Condition(_)));
        assert!(matches!(nodes[1], FilterNode::Group(_)));
    }

    #[test]
    fn test_cache_hash_is_stable_and_sensitive() {
        let a = QueryFilter {
            limit: Some(10),
            ..Default::default()
        };
        let b = QueryFilter {
            limit: Some(10),
            ..Default::default()
        };
        let c = QueryFilter {
            limit: Some(11),
            ..Default::default()
        };
        assert_eq!(a.cache_hash(), b.cache_hash());
        assert_ne!(a.cache_hash(), c.cache_hash());
    }
}
