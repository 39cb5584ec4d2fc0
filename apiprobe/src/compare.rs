//! Per-step comparison ledger rows.
//!
//! A `Comparison` links the pre-existing entity a step addresses (`old`),
//! the subset of its keys the request actually used (`old_used`), and the
//! proposed post-state (`new`). POST steps fill only `new`, GET and DELETE
//! fill `old`/`old_used`, PUT and PATCH fill both.

use serde_json::{Map, Value};

use crate::schema::Schema;
use crate::swagger::Method;

#[derive(Debug, Clone, Default)]
pub struct Comparison {
    pub old: Option<Map<String, Value>>,
    pub old_used: Option<Map<String, Value>>,
    pub new: Option<Map<String, Value>>,
    pub schema: Option<Schema>,
}

impl Comparison {
    /// Row for an object the step proposes to create or write.
    #[must_use]
    pub fn for_new(obj: Map<String, Value>, schema: Option<Schema>) -> Self {
        Comparison {
            new: Some(obj),
            schema,
            ..Comparison::default()
        }
    }

    /// Row for an entity pulled from the mirror to be referenced by the
    /// request; `old_used` starts empty and fills as keys are consumed.
    #[must_use]
    pub fn for_existing(obj: Map<String, Value>, schema: Option<Schema>) -> Self {
        Comparison {
            old: Some(obj),
            old_used: Some(Map::new()),
            schema,
            ..Comparison::default()
        }
    }

    /// `old_used` as a criteria value; null when nothing was used, which
    /// matches everything.
    #[must_use]
    pub fn old_used_criteria(&self) -> Value {
        match &self.old_used {
            Some(m) => Value::Object(m.clone()),
            None => Value::Null,
        }
    }

    /// Records `key = value` under the map the operation addresses: reads
    /// go to `old` (and are echoed into `old_used`), writes go to `new`.
    ///
    /// When the key is already taken on this row the step is addressing a
    /// second entity of the same class, so a fresh row is returned for the
    /// caller to append; two logical entities must not fuse.
    pub fn set_for_op(&mut self, op: Method, key: &str, value: Value) -> Option<Comparison> {
        let reads = op == Method::Get;
        let target = if reads {
            self.old.get_or_insert_with(Map::new)
        } else {
            self.new.get_or_insert_with(Map::new)
        };
        if target.contains_key(key) {
            let mut fresh = Comparison {
                schema: self.schema.clone(),
                ..Comparison::default()
            };
            let fresh_target = if reads {
                fresh.old.get_or_insert_with(Map::new)
            } else {
                fresh.new.get_or_insert_with(Map::new)
            };
            fresh_target.insert(key.to_owned(), value.clone());
            if reads {
                fresh
                    .old_used
                    .get_or_insert_with(Map::new)
                    .insert(key.to_owned(), value);
            }
            return Some(fresh);
        }
        target.insert(key.to_owned(), value.clone());
        if reads {
            self.old_used
                .get_or_insert_with(Map::new)
                .insert(key.to_owned(), value);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_get_records_old_and_old_used() {
        let mut comp = Comparison::default();
        let fresh = comp.set_for_op(Method::Get, "id", json!(7));
        assert!(fresh.is_none());
        assert_eq!(comp.old.as_ref().unwrap().get("id"), Some(&json!(7)));
        assert_eq!(comp.old_used.as_ref().unwrap().get("id"), Some(&json!(7)));
        assert!(comp.new.is_none());
    }

    #[test]
    fn test_write_records_new() {
        let mut comp = Comparison::default();
        comp.set_for_op(Method::Put, "name", json!("rex"));
        assert_eq!(comp.new.as_ref().unwrap().get("name"), Some(&json!("rex")));
        assert!(comp.old.is_none());
    }

    #[test]
    fn test_key_collision_yields_fresh_row() {
        let mut comp = Comparison::default();
        assert!(comp.set_for_op(Method::Put, "id", json!(1)).is_none());
        let fresh = comp.set_for_op(Method::Put, "id", json!(2)).unwrap();
        assert_eq!(comp.new.as_ref().unwrap().get("id"), Some(&json!(1)));
        assert_eq!(fresh.new.as_ref().unwrap().get("id"), Some(&json!(2)));
    }

    #[test]
    fn test_old_used_stays_subset_of_old() {
        let mut comp = Comparison::for_existing(
            serde_json::from_value(json!({"id": 5, "name": "rex"})).unwrap(),
            None,
        );
        comp.set_for_op(Method::Get, "kind", json!("dog"));
        let old = comp.old.as_ref().unwrap();
        let used = comp.old_used.as_ref().unwrap();
        for (k, v) in used {
            assert_eq!(old.get(k), Some(v));
        }
    }
}
