//! The in-memory mirror of the server's entity state.
//!
//! The store is organized around schema definition names. Each name keeps a
//! flat list of objects that matched the definition when inserted; lookups
//! are linear scans driven by an injected predicate, which keeps search
//! criteria flexible without indexes.

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};
use crate::schema::Schema;
use crate::swagger::Swagger;
use crate::values;

/// Predicate deciding whether a stored object satisfies the criteria. The
/// criteria value is opaque to the store. Predicates run while the store
/// lock is held and must not call back into the store.
pub type MatchFn = dyn Fn(&Value, &Value) -> bool;

/// Matches when every field of the criteria map equals the corresponding
/// field of the stored object.
#[must_use]
pub fn match_all_fields(criteria: &Value, existing: &Value) -> bool {
    let (Some(cm), Some(em)) = (criteria.as_object(), existing.as_object()) else {
        return false;
    };
    cm.iter()
        .all(|(k, v)| em.get(k).is_some_and(|ev| values::deep_equals(v, ev)))
}

/// Matches unconditionally.
#[must_use]
pub fn match_always(_criteria: &Value, _existing: &Value) -> bool {
    true
}

/// One definition's slice of the mirror: the schema and the objects the
/// engine believes the server holds for it.
#[derive(Debug, Clone)]
pub struct SchemaDb {
    pub name: String,
    pub schema: Schema,
    pub objects: Vec<Value>,
}

impl SchemaDb {
    fn find(&self, criteria: &Value, matches: &MatchFn, desired: i64) -> Vec<Value> {
        let mut result = Vec::new();
        for obj in &self.objects {
            if matches(criteria, obj) {
                result.push(obj.clone());
                if desired >= 0 && result.len() as i64 >= desired {
                    break;
                }
            }
        }
        result
    }

    fn delete(&mut self, criteria: &Value, matches: &MatchFn, desired: i64) -> usize {
        let mut count = 0usize;
        self.objects.retain(|obj| {
            if (desired < 0 || (count as i64) < desired) && matches(criteria, obj) {
                count += 1;
                false
            } else {
                true
            }
        });
        count
    }

    fn update(
        &mut self,
        criteria: &Value,
        matches: &MatchFn,
        new_obj: &Map<String, Value>,
        desired: i64,
        patch: bool,
    ) -> usize {
        let mut count = 0usize;
        for obj in &mut self.objects {
            if desired >= 0 && count as i64 >= desired {
                break;
            }
            if !matches(criteria, obj) {
                continue;
            }
            // Non-map entries have no fields to address and are skipped.
            let Value::Object(existing) = obj else {
                continue;
            };
            if patch {
                values::map_combine(existing, new_obj);
            } else {
                *obj = Value::Object(new_obj.clone());
            }
            count += 1;
        }
        count
    }
}

/// The mirror store. One coarse mutex guards the whole schema map: the six
/// public operations each take it once and never call each other, so there
/// is no lock-ordering concern even when plans share a store.
pub struct MirrorDb {
    schemas: Mutex<HashMap<String, SchemaDb>>,
    pub swagger: Arc<Swagger>,
}

impl MirrorDb {
    /// Creates a store with one [`SchemaDb`] per top-level definition.
    #[must_use]
    pub fn new(swagger: Arc<Swagger>) -> Self {
        let mut schemas = HashMap::new();
        for (name, schema) in &swagger.definitions {
            schemas.insert(
                name.clone(),
                SchemaDb {
                    name: name.clone(),
                    schema: schema.clone(),
                    objects: Vec::new(),
                },
            );
        }
        tracing::debug!("mirror store initialized with {} definitions", schemas.len());
        MirrorDb {
            schemas: Mutex::new(schemas),
            swagger,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, SchemaDb>> {
        // A poisoned lock means a predicate panicked; the data itself is
        // still a plain map of JSON values, so keep going.
        self.schemas
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Inserts an object under a definition name, lazily creating the
    /// per-name store from the swagger definition.
    ///
    /// # Errors
    /// Returns `Error::NotFound` when the name has no definition, and
    /// `Error::Mismatch` when the object fails the schema's structural
    /// check.
    pub fn insert(&self, name: &str, obj: Value) -> Result<()> {
        let mut schemas = self.lock();
        let entry = match schemas.entry(name.to_owned()) {
            std::collections::hash_map::Entry::Occupied(e) => e.into_mut(),
            std::collections::hash_map::Entry::Vacant(v) => {
                let Some(schema) = self.swagger.find_schema_by_name(name) else {
                    return Err(Error::NotFound(format!(
                        "no definition named {name} to insert under"
                    )));
                };
                v.insert(SchemaDb {
                    name: name.to_owned(),
                    schema: schema.clone(),
                    objects: Vec::new(),
                })
            }
        };
        if !entry.schema.matches(&obj, &self.swagger) {
            return Err(Error::Mismatch(format!(
                "object does not match schema {name}: {obj}"
            )));
        }
        entry.objects.push(obj);
        Ok(())
    }

    /// Returns up to `desired` matching objects; -1 means all.
    #[must_use]
    pub fn find(&self, name: &str, criteria: &Value, matches: &MatchFn, desired: i64) -> Vec<Value> {
        let schemas = self.lock();
        match schemas.get(name) {
            Some(db) => db.find(criteria, matches, desired),
            None => Vec::new(),
        }
    }

    /// Removes up to `desired` matching objects (-1 for all), preserving
    /// every non-matching object. Returns the number removed.
    pub fn delete(&self, name: &str, criteria: &Value, matches: &MatchFn, desired: i64) -> usize {
        let mut schemas = self.lock();
        match schemas.get_mut(name) {
            Some(db) => db.delete(criteria, matches, desired),
            None => 0,
        }
    }

    /// Rewrites up to `desired` matching objects (-1 for all). With
    /// `patch` the new fields are merged over the stored map; otherwise the
    /// stored object is replaced wholesale. Returns the number updated.
    pub fn update(
        &self,
        name: &str,
        criteria: &Value,
        matches: &MatchFn,
        new_obj: &Map<String, Value>,
        desired: i64,
        patch: bool,
    ) -> usize {
        let mut schemas = self.lock();
        match schemas.get_mut(name) {
            Some(db) => db.update(criteria, matches, new_obj, desired, patch),
            None => 0,
        }
    }

    /// Returns the first definition whose schema accepts the object.
    #[must_use]
    pub fn find_matching_schema(&self, obj: &Value) -> Option<(String, Schema)> {
        let schemas = self.lock();
        for (name, db) in schemas.iter() {
            if db.schema.matches(obj, &self.swagger) {
                tracing::debug!("found matching schema: {name}");
                return Some((name.clone(), db.schema.clone()));
            }
        }
        None
    }

    /// The definition schema registered under a name, if any.
    #[must_use]
    pub fn get_schema(&self, name: &str) -> Option<Schema> {
        self.lock().get(name).map(|db| db.schema.clone())
    }
}
