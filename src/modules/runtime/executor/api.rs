//! Generic query to HTTP GET / POST

use serde_json::{json, Map, Value};
use unibase_core::{GenericQuery, Operation, Result};

use super::Plan;

pub(super) fn translate(query: &GenericQuery) -> Result<Plan> {
    let path = query.collection();

    if query.operation() == Operation::Select {
        let mut params: Map<String, Value> = query
            .conditions()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if !query.fields().is_empty() {
            params.insert("fields".to_string(), Value::from(query.fields().join(",")));
        }
        if let Some(limit) = query.limit() {
            params.insert("limit".to_string(), Value::from(limit));
        }
        if let Some(offset) = query.offset() {
            params.insert("offset".to_string(), Value::from(offset));
        }
        let args = if params.is_empty() {
            Vec::new()
        } else {
            vec![Value::Object(params)]
        };
        return Ok(Plan::query(path, args));
    }

    let data = match query.operation() {
        Operation::Insert | Operation::Update => Value::Object(query.require_data()?.clone()),
        _ => Value::Null,
    };
    let body = json!({
        "operation": query.operation().as_str(),
        "conditions": query.conditions_object(),
        "data": data,
    });
    Ok(Plan::execute(path, vec![body]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::Call;

    #[test]
    fn test_select_becomes_query_params() {
        let query = GenericQuery::select("/users")
            .with_condition("name", "John")
            .with_field("id")
            .with_field("name")
            .with_limit(10);
        let plan = translate(&query).unwrap();
        assert_eq!(plan.call, Call::Query);
        assert_eq!(plan.statement, "/users");
        assert_eq!(
            plan.args,
            vec![json!({"name": "John", "fields": "id,name", "limit": 10})]
        );

        let plan = translate(&GenericQuery::select("status")).unwrap();
        assert!(plan.args.is_empty());
    }

    #[test]
    fn test_mutation_body() {
        let query = GenericQuery::update("/users")
            .with_condition("id", 3)
            .with_value("name", "Ann");
        let plan = translate(&query).unwrap();
        assert_eq!(plan.call, Call::Execute);
        assert_eq!(
            plan.args[0],
            json!({"operation": "update", "conditions": {"id": 3}, "data": {"name": "Ann"}})
        );

        let plan = translate(&GenericQuery::delete("/users").with_condition("id", 3)).unwrap();
        assert_eq!(plan.args[0]["data"], Value::Null);
    }
}
