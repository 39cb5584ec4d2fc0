//! Swagger schema fragments and the walker that interprets them.
//!
//! Every schema handed to generation or comparison goes through the
//! resolution helpers here first: `$ref` chains are chased with a visited
//! set, `allOf` members are flattened into one property map, and arrays are
//! descended to find the object schema underneath.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::error::{Error, Result};
use crate::swagger::Swagger;
use crate::tag::{MeqaTag, get_meqa_tag};

pub const TYPE_BOOLEAN: &str = "boolean";
pub const TYPE_INTEGER: &str = "integer";
pub const TYPE_NUMBER: &str = "number";
pub const TYPE_STRING: &str = "string";
pub const TYPE_ARRAY: &str = "array";
pub const TYPE_OBJECT: &str = "object";
pub const TYPE_NULL: &str = "null";
pub const TYPE_FILE: &str = "file";

/// The `type` keyword: Swagger allows a single name or a list of names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeSet(pub Vec<String>);

impl TypeSet {
    #[must_use]
    pub fn single(name: &str) -> Self {
        TypeSet(vec![name.to_owned()])
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|t| t == name)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// First declared type name, which drives generation.
    #[must_use]
    pub fn primary(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }
}

impl Serialize for TypeSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        if self.0.len() == 1 {
            serializer.serialize_str(&self.0[0])
        } else {
            self.0.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for TypeSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            One(String),
            Many(Vec<String>),
        }
        Ok(match Repr::deserialize(deserializer)? {
            Repr::One(s) => TypeSet(vec![s]),
            Repr::Many(v) => TypeSet(v),
        })
    }
}

/// A JSON-Schema fragment as Swagger 2.0 uses it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Schema {
    #[serde(rename = "$ref", skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "TypeSet::is_empty")]
    pub schema_type: TypeSet,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(rename = "enum", skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<Value>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, Schema>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<Schema>>,
    #[serde(rename = "minItems", skip_serializing_if = "Option::is_none")]
    pub min_items: Option<u64>,
    #[serde(rename = "maxItems", skip_serializing_if = "Option::is_none")]
    pub max_items: Option<u64>,
    #[serde(rename = "uniqueItems")]
    pub unique_items: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    #[serde(rename = "exclusiveMinimum")]
    pub exclusive_minimum: bool,
    #[serde(rename = "exclusiveMaximum")]
    pub exclusive_maximum: bool,
    #[serde(rename = "allOf", skip_serializing_if = "Vec::is_empty")]
    pub all_of: Vec<Schema>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discriminator: Option<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl Schema {
    /// Chases a `$ref` chain to its final target.
    ///
    /// Returns the last referenced definition name (so callers can seed a
    /// class tag from it) together with the resolved schema. A visited set
    /// bounds pathological reference cycles.
    ///
    /// # Errors
    /// Returns `Error::NotFound` for dangling references and
    /// `Error::Invalid` for cyclic chains.
    pub fn resolve<'a>(&'a self, swagger: &'a Swagger) -> Result<(Option<&'a str>, &'a Schema)> {
        let mut current = self;
        let mut name = None;
        let mut visited = HashSet::new();
        while let Some(r) = &current.reference {
            if !visited.insert(r.clone()) {
                return Err(Error::Invalid(format!("cyclic $ref chain at {r}")));
            }
            let (n, target) = swagger.deref(r)?;
            name = Some(n);
            current = target;
        }
        Ok((name, current))
    }

    /// Merges the `allOf` members into a single object schema. Property
    /// maps merge left to right with later members winning; the
    /// discriminator is taken from whichever member declares one, looking
    /// through a single level of `$ref`.
    ///
    /// # Errors
    /// Propagates reference resolution failures.
    pub fn flatten_all_of(&self, swagger: &Swagger) -> Result<(Schema, Option<String>)> {
        let mut merged = Schema {
            schema_type: TypeSet::single(TYPE_OBJECT),
            description: self.description.clone(),
            ..Schema::default()
        };
        let mut discriminator = None;
        for member in &self.all_of {
            let (_, resolved) = member.resolve(swagger)?;
            let inner = if resolved.all_of.is_empty() {
                resolved.clone()
            } else {
                resolved.flatten_all_of(swagger)?.0
            };
            for (k, v) in &inner.properties {
                merged.properties.insert(k.clone(), v.clone());
            }
            for r in &inner.required {
                if !merged.required.contains(r) {
                    merged.required.push(r.clone());
                }
            }
            if let Some(d) = member.discriminator.clone().or_else(|| resolved.discriminator.clone())
            {
                discriminator = Some(d);
            }
        }
        Ok((merged, discriminator))
    }

    /// Finds the object schema a value of this schema would instantiate,
    /// descending through arrays. Returns `(None, None)` for primitives
    /// and enums. The tag closest to the object wins; a `$ref` hop seeds a
    /// class tag from the definition name when nothing closer claims one.
    #[must_use]
    pub fn root_type<'a>(
        &'a self,
        parent_tag: Option<&MeqaTag>,
        swagger: &'a Swagger,
    ) -> (Option<MeqaTag>, Option<&'a Schema>) {
        let mut tag = parent_tag.cloned();
        let mut current = self;
        let mut visited = HashSet::new();
        loop {
            if let Some(t) = get_meqa_tag(&current.description) {
                tag = Some(t);
            }
            if let Some(r) = &current.reference {
                if !visited.insert(r.clone()) {
                    return (None, None);
                }
                let Ok((name, target)) = swagger.deref(r) else {
                    tracing::warn!("unresolvable $ref: {r}");
                    return (None, None);
                };
                if tag.is_none() {
                    tag = Some(MeqaTag::for_class(name));
                }
                current = target;
                continue;
            }
            if !current.enum_values.is_empty() || current.schema_type.is_empty() {
                return (None, None);
            }
            if current.schema_type.contains(TYPE_ARRAY) {
                match &current.items {
                    Some(items) => {
                        current = items;
                        continue;
                    }
                    None => return (None, None),
                }
            }
            if current.schema_type.contains(TYPE_OBJECT) {
                return (tag, Some(current));
            }
            return (None, None);
        }
    }

    /// Structural typing predicate: does `value` look like an instance of
    /// this schema? Integer and number are interchangeable because JSON
    /// decoding loses the distinction. Objects may carry extra keys; enums
    /// without an explicit type are accepted.
    #[must_use]
    pub fn matches(&self, value: &Value, swagger: &Swagger) -> bool {
        let resolved = match self.resolve(swagger) {
            Ok((_, s)) => s,
            Err(e) => {
                tracing::warn!("{e}");
                return false;
            }
        };
        if !resolved.all_of.is_empty() {
            return match resolved.flatten_all_of(swagger) {
                Ok((merged, _)) => merged.matches(value, swagger),
                Err(e) => {
                    tracing::warn!("{e}");
                    false
                }
            };
        }
        if resolved.schema_type.is_empty() {
            return !resolved.enum_values.is_empty();
        }
        match value {
            Value::Null => resolved.schema_type.contains(TYPE_NULL),
            Value::Bool(_) => resolved.schema_type.contains(TYPE_BOOLEAN),
            Value::Number(_) => {
                resolved.schema_type.contains(TYPE_INTEGER)
                    || resolved.schema_type.contains(TYPE_NUMBER)
            }
            Value::String(_) => resolved.schema_type.contains(TYPE_STRING),
            Value::Array(items) => {
                if !resolved.schema_type.contains(TYPE_ARRAY) {
                    return false;
                }
                let Some(item_schema) = &resolved.items else {
                    return false;
                };
                items.iter().all(|item| item_schema.matches(item, swagger))
            }
            Value::Object(map) => {
                resolved.schema_type.contains(TYPE_OBJECT) && resolved.matches_map(map, swagger)
            }
        }
    }

    fn matches_map(&self, obj: &Map<String, Value>, swagger: &Swagger) -> bool {
        for required in &self.required {
            if obj.get(required).is_none_or(Value::is_null) {
                tracing::debug!("required field not present: {required}");
                return false;
            }
        }
        for (k, v) in obj {
            if let Some(prop) = self.properties.get(k)
                && !prop.matches(v, swagger)
            {
                tracing::debug!("property type mismatch: {k}");
                return false;
            }
        }
        true
    }

    /// Validates `value` against this schema while collecting, per class,
    /// every sub-object whose resolved schema carries a class tag. This is
    /// what turns a response body into typed entities for reconciliation.
    ///
    /// # Errors
    /// Returns `Error::Mismatch` when the value does not fit the schema,
    /// including a missing required field.
    pub fn parses(
        &self,
        field: &str,
        value: &Value,
        collection: &mut HashMap<String, Vec<Value>>,
        parent_tag: Option<MeqaTag>,
        swagger: &Swagger,
    ) -> Result<()> {
        let (ref_name, schema) = self.resolve(swagger)?;
        let tag = get_meqa_tag(&schema.description)
            .or_else(|| get_meqa_tag(&self.description))
            .or(if ref_name.is_some() { None } else { parent_tag })
            .or_else(|| ref_name.map(MeqaTag::for_class));

        if !schema.all_of.is_empty() {
            let (merged, _) = schema.flatten_all_of(swagger)?;
            return merged.parses(field, value, collection, tag, swagger);
        }
        if schema.schema_type.is_empty() {
            return Ok(());
        }

        let mismatch = |expected: &str| {
            Error::Mismatch(format!(
                "field '{field}' does not parse as {expected}: {value}"
            ))
        };
        match value {
            Value::Null => {
                if schema.schema_type.contains(TYPE_NULL) {
                    Ok(())
                } else {
                    Err(mismatch("null"))
                }
            }
            Value::Bool(_) => {
                if schema.schema_type.contains(TYPE_BOOLEAN) {
                    Ok(())
                } else {
                    Err(mismatch(TYPE_BOOLEAN))
                }
            }
            Value::Number(_) => {
                if schema.schema_type.contains(TYPE_INTEGER)
                    || schema.schema_type.contains(TYPE_NUMBER)
                {
                    Ok(())
                } else {
                    Err(mismatch(TYPE_NUMBER))
                }
            }
            Value::String(_) => {
                if schema.schema_type.contains(TYPE_STRING)
                    || schema.schema_type.contains(TYPE_FILE)
                {
                    Ok(())
                } else {
                    Err(mismatch(TYPE_STRING))
                }
            }
            Value::Array(items) => {
                if !schema.schema_type.contains(TYPE_ARRAY) {
                    return Err(mismatch(TYPE_ARRAY));
                }
                let Some(item_schema) = &schema.items else {
                    return Ok(());
                };
                for item in items {
                    item_schema.parses(field, item, collection, tag.clone(), swagger)?;
                }
                Ok(())
            }
            Value::Object(map) => {
                if !schema.schema_type.contains(TYPE_OBJECT) {
                    return Err(mismatch(TYPE_OBJECT));
                }
                for required in &schema.required {
                    if map.get(required).is_none_or(Value::is_null) {
                        return Err(Error::Mismatch(format!(
                            "required field missing in response object: {required}"
                        )));
                    }
                }
                for (k, v) in map {
                    if let Some(prop) = schema.properties.get(k) {
                        prop.parses(k, v, collection, None, swagger)?;
                    }
                }
                if let Some(t) = &tag
                    && !t.class.is_empty()
                {
                    collection
                        .entry(t.class.clone())
                        .or_default()
                        .push(value.clone());
                }
                Ok(())
            }
        }
    }
}
