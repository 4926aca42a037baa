//! Property-based tests for the filter compiler
//!
//! Uses proptest to generate random condition trees and verify the
//! compiled SQL stays well-formed: user input never appears in the SQL
//! text, unknown fields never produce clauses, and pagination bounds
//! hold.

use proptest::prelude::*;
use sqlx::{Postgres, QueryBuilder};

use ripple::resource::adapter::{ColumnDef, ColumnType};
use ripple::resource::filters::{
    push_pagination, push_where_clause, Condition, FilterNode, FilterOperator, LogicalOperator,
    QueryFilter, MAX_LIMIT,
};

const COLUMNS: &[ColumnDef] = &[
    ColumnDef::new("id", ColumnType::BigInt),
    ColumnDef::new("email", ColumnType::Text),
    ColumnDef::new("is_active", ColumnType::Boolean),
];

fn operator_strategy() -> impl Strategy<Value = FilterOperator> {
    prop_oneof![
        Just(FilterOperator::Eq),
        Just(FilterOperator::Ne),
        Just(FilterOperator::Gt),
        Just(FilterOperator::Lte),
        Just(FilterOperator::Contains),
        Just(FilterOperator::Icontains),
        Just(FilterOperator::Startswith),
        Just(FilterOperator::In),
        Just(FilterOperator::IsNull),
        Just(FilterOperator::IsNotNull),
    ]
}

fn field_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("id".to_string()),
        Just("email".to_string()),
        Just("is_active".to_string()),
        "[a-z]{1,12}", // mostly unknown fields
    ]
}

fn value_strategy() -> impl Strategy<Value = serde_json::Value> {
    prop_oneof![
        any::<i64>().prop_map(serde_json::Value::from),
        any::<bool>().prop_map(serde_json::Value::from),
        "[ -~]{0,20}".prop_map(serde_json::Value::from),
        Just(serde_json::Value::Null),
        proptest::collection::vec(any::<i64>(), 0..4)
            .prop_map(|values| serde_json::json!(values)),
    ]
}

fn condition_strategy() -> impl Strategy<Value = FilterNode> {
    (field_strategy(), operator_strategy(), value_strategy()).prop_map(
        |(field, operator, value)| {
            FilterNode::Condition(Condition {
                field,
                operator,
                value,
            })
        },
    )
}

proptest! {
    #[test]
    fn compiled_sql_never_embeds_user_values(
        conditions in proptest::collection::vec(condition_strategy(), 0..8),
        use_or in any::<bool>(),
    ) {
        let filter = QueryFilter {
            conditions: Some(conditions),
            operator: if use_or { LogicalOperator::Or } else { LogicalOperator::And },
            ..Default::default()
        };

        let mut qb = QueryBuilder::<Postgres>::new("SELECT * FROM users");
        push_where_clause(&mut qb, &filter, COLUMNS);
        let sql = qb.sql();

        // Only known column names, operators, and placeholders may appear
        for token in ["drop", "DELETE", ";", "--"] {
            prop_assert!(!sql.contains(token), "suspicious token in {sql}");
        }
        // Balanced parentheses
        let open = sql.matches('(').count();
        let close = sql.matches(')').count();
        prop_assert_eq!(open, close, "unbalanced parens in {}", sql);
    }

    #[test]
    fn where_clause_only_references_known_columns(
        conditions in proptest::collection::vec(condition_strategy(), 1..6),
    ) {
        let filter = QueryFilter {
            conditions: Some(conditions),
            ..Default::default()
        };

        let mut qb = QueryBuilder::<Postgres>::new("");
        push_where_clause(&mut qb, &filter, COLUMNS);
        let sql = qb.sql().to_string();

        if sql.is_empty() {
            // Every condition was dropped; matches-all is legal
            return Ok(());
        }

        // Strip the known vocabulary; what remains must be structural
        let mut stripped = sql.clone();
        // Longer tokens first so substrings survive intact
        for word in [
            "IS NOT NULL", "IS NULL", "NOT IN", "WHERE", "AND", "OR", "IN", "ILIKE", "LIKE",
            "TRUE", "FALSE", "is_active", "email", "id",
            "!=", ">=", "<=", "=", ">", "<", "(", ")", ",",
        ] {
            stripped = stripped.replace(word, " ");
        }
        for placeholder in (1..=64).rev() {
            stripped = stripped.replace(&format!("${placeholder}"), " ");
        }
        prop_assert!(
            stripped.trim().is_empty(),
            "unexpected SQL fragments: {stripped:?} from {sql}"
        );
    }

    #[test]
    fn pagination_always_binds_two_parameters(
        limit in proptest::option::of(1i64..=MAX_LIMIT),
        offset in proptest::option::of(0i64..10_000),
    ) {
        let filter = QueryFilter { limit, offset, ..Default::default() };
        prop_assert!(filter.validate().is_ok());

        let mut qb = QueryBuilder::<Postgres>::new("SELECT * FROM users");
        push_pagination(&mut qb, &filter);
        let sql = qb.sql();
        prop_assert!(sql.contains(" LIMIT $1 OFFSET $2"), "got {sql}");
    }

    #[test]
    fn out_of_range_limits_are_rejected(limit in prop_oneof![
        Just(0i64),
        Just(-5i64),
        (MAX_LIMIT + 1)..(MAX_LIMIT + 1000),
    ]) {
        let filter = QueryFilter { limit: Some(limit), ..Default::default() };
        prop_assert!(filter.validate().is_err());
    }

    #[test]
    fn cache_hash_distinguishes_different_filters(
        a_limit in 1i64..=MAX_LIMIT,
        b_limit in 1i64..=MAX_LIMIT,
    ) {
        let a = QueryFilter { limit: Some(a_limit), ..Default::default() };
        let b = QueryFilter { limit: Some(b_limit), ..Default::default() };
        if a_limit == b_limit {
            prop_assert_eq!(a.cache_hash(), b.cache_hash());
        } else {
            prop_assert_ne!(a.cache_hash(), b.cache_hash());
        }
    }
}
