//! Generic query to document-store find / write commands

use serde_json::{Map, Value};
use unibase_core::{GenericQuery, Operation, Result};

use super::Plan;

/// `{projection, limit, skip}` for a find, or `None` when nothing is set
fn find_options(query: &GenericQuery) -> Option<Value> {
    let mut options = Map::new();
    if !query.fields().is_empty() {
        let projection: Map<String, Value> = query
            .fields()
            .iter()
            .map(|field| (field.clone(), Value::from(1)))
            .collect();
        options.insert("projection".to_string(), Value::Object(projection));
    }
    if let Some(limit) = query.limit() {
        options.insert("limit".to_string(), Value::from(limit));
    }
    if let Some(offset) = query.offset() {
        options.insert("skip".to_string(), Value::from(offset));
    }
    (!options.is_empty()).then_some(Value::Object(options))
}

pub(super) fn translate(query: &GenericQuery) -> Result<Plan> {
    let collection = Value::String(query.collection().to_string());
    let filter = query.conditions_object();

    match query.operation() {
        Operation::Select => {
            let mut args = vec![filter];
            args.extend(find_options(query));
            Ok(Plan::query(query.collection(), args))
        }
        Operation::Insert => {
            let document = Value::Object(query.require_data()?.clone());
            Ok(Plan::execute("insert", vec![collection, document]))
        }
        Operation::Update => {
            let update = Value::Object(query.require_data()?.clone());
            Ok(Plan::execute("update", vec![collection, filter, update]))
        }
        Operation::Delete => Ok(Plan::execute("delete", vec![collection, filter])),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::Call;
    use serde_json::json;
    use unibase_core::ErrorKind;

    #[test]
    fn test_select_is_filtered_find() {
        let plan = translate(&GenericQuery::select("users").with_condition("age", 30)).unwrap();
        assert_eq!(plan.call, Call::Query);
        assert_eq!(plan.statement, "users");
        assert_eq!(plan.args, vec![json!({"age": 30})]);
    }

    #[test]
    fn test_select_options() {
        let query = GenericQuery::select("users")
            .with_field("name")
            .with_limit(5)
            .with_offset(10);
        let plan = translate(&query).unwrap();
        assert_eq!(plan.args[0], json!({}));
        assert_eq!(
            plan.args[1],
            json!({"projection": {"name": 1}, "limit": 5, "skip": 10})
        );
    }

    #[test]
    fn test_mutations() {
        let insert = translate(&GenericQuery::insert("users").with_value("name", "Ann")).unwrap();
        assert_eq!(insert.call, Call::Execute);
        assert_eq!(insert.statement, "insert");
        assert_eq!(insert.args, vec![json!("users"), json!({"name": "Ann"})]);

        let update = GenericQuery::update("users")
            .with_condition("name", "Ann")
            .with_value("age", 40);
        let update = translate(&update).unwrap();
        assert_eq!(update.statement, "update");
        assert_eq!(
            update.args,
            vec![json!("users"), json!({"name": "Ann"}), json!({"age": 40})]
        );

        let delete = translate(&GenericQuery::delete("users").with_condition("name", "Ann")).unwrap();
        assert_eq!(delete.args, vec![json!("users"), json!({"name": "Ann"})]);
    }

    #[test]
    fn test_insert_without_payload() {
        let err = translate(&GenericQuery::insert("users")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Query);
    }
}
