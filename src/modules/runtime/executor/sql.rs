//! Generic query to parameterized SQL

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use unibase_core::{GenericQuery, Operation, Result, UnibaseError};

use super::Plan;

/// Plain or schema-qualified identifier
static IDENTIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$").expect("valid identifier regex")
});

/// Stand-in LIMIT when only an OFFSET is given; every supported engine
/// requires one and accepts this value
const UNBOUNDED_LIMIT: i64 = i64::MAX;

fn identifier(name: &str) -> Result<&str> {
    if IDENTIFIER.is_match(name) {
        Ok(name)
    } else {
        Err(UnibaseError::query(format!("invalid SQL identifier: '{}'", name)))
    }
}

/// Payload columns in name order
fn sorted_data(data: &Map<String, Value>) -> Vec<(&String, &Value)> {
    let mut columns: Vec<_> = data.iter().collect();
    columns.sort_by(|a, b| a.0.cmp(b.0));
    columns
}

/// `WHERE a = ? AND b IS NULL`, pushing bound values onto `args`
fn where_clause(conditions: &BTreeMap<String, Value>, args: &mut Vec<Value>) -> Result<String> {
    if conditions.is_empty() {
        return Ok(String::new());
    }
    let mut predicates = Vec::with_capacity(conditions.len());
    for (field, value) in conditions {
        let column = identifier(field)?;
        if value.is_null() {
            predicates.push(format!("{} IS NULL", column));
        } else {
            predicates.push(format!("{} = ?", column));
            args.push(value.clone());
        }
    }
    Ok(format!(" WHERE {}", predicates.join(" AND ")))
}

pub(super) fn translate(query: &GenericQuery) -> Result<Plan> {
    let table = identifier(query.collection())?;
    let mut args = Vec::new();

    match query.operation() {
        Operation::Select => {
            let columns = if query.fields().is_empty() {
                "*".to_string()
            } else {
                query
                    .fields()
                    .iter()
                    .map(|f| identifier(f))
                    .collect::<Result<Vec<_>>>()?
                    .join(", ")
            };
            let mut sql = format!("SELECT {} FROM {}", columns, table);
            sql.push_str(&where_clause(query.conditions(), &mut args)?);
            match (query.limit(), query.offset()) {
                (Some(limit), Some(offset)) => {
                    sql.push_str(&format!(" LIMIT {} OFFSET {}", limit, offset))
                }
                (Some(limit), None) => sql.push_str(&format!(" LIMIT {}", limit)),
                (None, Some(offset)) => {
                    sql.push_str(&format!(" LIMIT {} OFFSET {}", UNBOUNDED_LIMIT, offset))
                }
                (None, None) => {}
            }
            Ok(Plan::query(sql, args))
        }
        Operation::Insert => {
            let data = query.require_data()?;
            let mut columns = Vec::with_capacity(data.len());
            for (column, value) in sorted_data(data) {
                columns.push(identifier(column)?);
                args.push(value.clone());
            }
            let placeholders = vec!["?"; columns.len()].join(", ");
            let sql = format!(
                "INSERT INTO {} ({}) VALUES ({})",
                table,
                columns.join(", "),
                placeholders
            );
            Ok(Plan::execute(sql, args))
        }
        Operation::Update => {
            let data = query.require_data()?;
            let mut assignments = Vec::with_capacity(data.len());
            for (column, value) in sorted_data(data) {
                assignments.push(format!("{} = ?", identifier(column)?));
                args.push(value.clone());
            }
            let mut sql = format!("UPDATE {} SET {}", table, assignments.join(", "));
            sql.push_str(&where_clause(query.conditions(), &mut args)?);
            Ok(Plan::execute(sql, args))
        }
        Operation::Delete => {
            let mut sql = format!("DELETE FROM {}", table);
            sql.push_str(&where_clause(query.conditions(), &mut args)?);
            Ok(Plan::execute(sql, args))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::Call;
    use serde_json::json;
    use unibase_core::ErrorKind;

    #[test]
    fn test_select_with_condition_and_limit() {
        let query = GenericQuery::select("users")
            .with_condition("name", "John")
            .with_limit(10);
        let plan = translate(&query).unwrap();
        assert_eq!(plan.call, Call::Query);
        assert_eq!(plan.statement, "SELECT * FROM users WHERE name = ? LIMIT 10");
        assert_eq!(plan.args, vec![json!("John")]);
    }

    #[test]
    fn test_select_fields_conditions_offset() {
        let query = GenericQuery::select("public.orders")
            .with_field("id")
            .with_field("total")
            .with_condition("status", "open")
            .with_condition("customer_id", 7)
            .with_condition("deleted_at", Value::Null)
            .with_limit(5)
            .with_offset(20);
        let plan = translate(&query).unwrap();
        assert_eq!(
            plan.statement,
            "SELECT id, total FROM public.orders WHERE customer_id = ? AND deleted_at IS NULL AND status = ? LIMIT 5 OFFSET 20"
        );
        assert_eq!(plan.args, vec![json!(7), json!("open")]);
    }

    #[test]
    fn test_offset_without_limit() {
        let plan = translate(&GenericQuery::select("t").with_offset(3)).unwrap();
        assert_eq!(
            plan.statement,
            format!("SELECT * FROM t LIMIT {} OFFSET 3", i64::MAX)
        );
    }

    #[test]
    fn test_insert() {
        let query = GenericQuery::insert("users")
            .with_value("name", "Ann")
            .with_value("age", 31);
        let plan = translate(&query).unwrap();
        assert_eq!(plan.call, Call::Execute);
        assert_eq!(plan.statement, "INSERT INTO users (age, name) VALUES (?, ?)");
        assert_eq!(plan.args, vec![json!(31), json!("Ann")]);
    }

    #[test]
    fn test_update_binds_set_before_where() {
        let query = GenericQuery::update("users")
            .with_value("age", 32)
            .with_condition("id", 1);
        let plan = translate(&query).unwrap();
        assert_eq!(plan.statement, "UPDATE users SET age = ? WHERE id = ?");
        assert_eq!(plan.args, vec![json!(32), json!(1)]);
    }

    #[test]
    fn test_delete_ignores_limit() {
        let query = GenericQuery::delete("users")
            .with_condition("id", 1)
            .with_limit(1);
        let plan = translate(&query).unwrap();
        assert_eq!(plan.statement, "DELETE FROM users WHERE id = ?");
    }

    #[test]
    fn test_rejects_unsafe_identifiers() {
        let cases = [
            GenericQuery::select("users; DROP TABLE users"),
            GenericQuery::select("users").with_field("name, password"),
            GenericQuery::select("users").with_condition("1=1 OR name", "x"),
            GenericQuery::insert("users").with_value("bad column", 1),
            GenericQuery::select("a.b.c"),
        ];
        for query in cases {
            let err = translate(&query).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Query, "{:?}", query);
        }
    }

    #[test]
    fn test_mutations_need_data() {
        for query in [GenericQuery::insert("users"), GenericQuery::update("users")] {
            let err = translate(&query).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Query);
        }
    }
}
