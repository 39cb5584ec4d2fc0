#[cfg(test)]
mod tests {
    use crate::db::{MirrorDb, match_all_fields, match_always};
    use crate::error::Error;
    use crate::swagger::Swagger;
    use crate::values::interface_equals;
    use serde_json::{Value, json};
    use std::sync::Arc;

    const SWAGGER: &str = r#"
swagger: "2.0"
host: petstore.example.com
basePath: /v2
definitions:
  Pet:
    type: object
    required: [name]
    properties:
      id: {type: integer}
      name: {type: string}
      tag: {type: string}
  Store:
    type: object
    required: [id]
    properties:
      id: {type: integer}
      petCount: {type: integer}
  Tags:
    type: array
    items: {type: string}
"#;

    fn mirror() -> MirrorDb {
        let swagger = Swagger::from_yaml(SWAGGER).unwrap();
        MirrorDb::new(Arc::new(swagger))
    }

    #[test]
    fn test_insert_then_find_returns_object() {
        let db = mirror();
        let obj = json!({"id": 1, "name": "rex"});
        db.insert("Pet", obj.clone()).unwrap();

        let found = db.find("Pet", &obj, &interface_equals, 1);
        assert_eq!(found, vec![obj]);
    }

    #[test]
    fn test_insert_delete_round_trip() {
        let db = mirror();
        db.insert("Pet", json!({"id": 1, "name": "a"})).unwrap();
        let before = db.find("Pet", &Value::Null, &match_always, -1).len();

        let obj = json!({"id": 2, "name": "b"});
        db.insert("Pet", obj.clone()).unwrap();
        let deleted = db.delete("Pet", &obj, &interface_equals, -1);

        assert!(deleted >= 1);
        let after = db.find("Pet", &Value::Null, &match_always, -1).len();
        assert_eq!(after, before);
    }

    #[test]
    fn test_delete_preserves_non_matching_objects() {
        let db = mirror();
        db.insert("Pet", json!({"id": 1, "name": "a"})).unwrap();
        db.insert("Pet", json!({"id": 2, "name": "b"})).unwrap();
        db.insert("Pet", json!({"id": 3, "name": "c"})).unwrap();

        let deleted = db.delete("Pet", &json!({"id": 2}), &match_all_fields, -1);
        assert_eq!(deleted, 1);

        let rest = db.find("Pet", &Value::Null, &match_always, -1);
        assert_eq!(rest.len(), 2);
        assert!(rest.contains(&json!({"id": 1, "name": "a"})));
        assert!(rest.contains(&json!({"id": 3, "name": "c"})));
    }

    #[test]
    fn test_delete_respects_desired_count() {
        let db = mirror();
        for i in 0..4 {
            db.insert("Pet", json!({"id": i, "name": "dup"})).unwrap();
        }
        let deleted = db.delete("Pet", &json!({"name": "dup"}), &match_all_fields, 2);
        assert_eq!(deleted, 2);
        assert_eq!(db.find("Pet", &Value::Null, &match_always, -1).len(), 2);
    }

    #[test]
    fn test_patch_update_merges_fields() {
        let db = mirror();
        db.insert("Pet", json!({"id": 0, "name": "rex"})).unwrap();

        let new_obj = json!({"id": 1, "tag": "brown"});
        let count = db.update(
            "Pet",
            &json!({"id": 0}),
            &match_all_fields,
            new_obj.as_object().unwrap(),
            1,
            true,
        );
        assert_eq!(count, 1);

        let found = db.find("Pet", &json!({"id": 1}), &match_all_fields, -1);
        assert_eq!(found, vec![json!({"id": 1, "name": "rex", "tag": "brown"})]);
    }

    #[test]
    fn test_replace_update_swaps_wholesale() {
        let db = mirror();
        db.insert("Pet", json!({"id": 0, "name": "rex", "tag": "x"}))
            .unwrap();

        let new_obj = json!({"id": 5, "name": "bob"});
        let count = db.update(
            "Pet",
            &json!({"id": 0}),
            &match_all_fields,
            new_obj.as_object().unwrap(),
            1,
            false,
        );
        assert_eq!(count, 1);

        let all = db.find("Pet", &Value::Null, &match_always, -1);
        assert_eq!(all, vec![json!({"id": 5, "name": "bob"})]);
    }

    #[test]
    fn test_update_skips_non_map_entries() {
        let db = mirror();
        db.insert("Tags", json!(["a", "b"])).unwrap();
        let count = db.update(
            "Tags",
            &Value::Null,
            &match_always,
            json!({"x": 1}).as_object().unwrap(),
            -1,
            true,
        );
        assert_eq!(count, 0);
    }

    #[test]
    fn test_insert_rejects_schema_mismatch() {
        let db = mirror();
        // required name is missing
        match db.insert("Pet", json!({"id": 1})) {
            Err(Error::Mismatch(_)) => {}
            other => panic!("expected Mismatch, got {other:?}"),
        }
        // wrong property type
        match db.insert("Pet", json!({"id": "str", "name": "rex"})) {
            Err(Error::Mismatch(_)) => {}
            other => panic!("expected Mismatch, got {other:?}"),
        }
        assert!(db.find("Pet", &Value::Null, &match_always, -1).is_empty());
    }

    #[test]
    fn test_insert_unknown_definition() {
        let db = mirror();
        match db.insert("Ghost", json!({})) {
            Err(Error::NotFound(_)) => {}
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_find_on_unknown_name_is_empty() {
        let db = mirror();
        assert!(db.find("Ghost", &Value::Null, &match_always, -1).is_empty());
        assert_eq!(db.delete("Ghost", &Value::Null, &match_always, -1), 0);
    }

    #[test]
    fn test_find_matching_schema_picks_the_fitting_definition() {
        let db = mirror();
        // Store requires id, so only Pet accepts this shape.
        let (name, _) = db.find_matching_schema(&json!({"name": "rex"})).unwrap();
        assert_eq!(name, "Pet");
    }

    #[test]
    fn test_find_desired_count_limits_results() {
        let db = mirror();
        for i in 0..5 {
            db.insert("Pet", json!({"id": i, "name": "p"})).unwrap();
        }
        assert_eq!(db.find("Pet", &Value::Null, &match_always, 3).len(), 3);
        assert_eq!(db.find("Pet", &Value::Null, &match_always, -1).len(), 5);
    }

    #[test]
    fn test_get_schema_returns_definition() {
        let db = mirror();
        assert!(db.get_schema("Pet").is_some());
        assert!(db.get_schema("Ghost").is_none());
    }
}
