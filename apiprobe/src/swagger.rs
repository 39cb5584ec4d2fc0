//! Serde model for the consumed subset of Swagger 2.0.
//!
//! The document is read-only after load: the engine walks definitions and
//! operations but never mutates them.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::schema::Schema;

/// Response-description tag classes with a fixed meaning.
pub const CLASS_SUCCESS: &str = "success";
pub const CLASS_FAIL: &str = "fail";

const DEFINITIONS_PREFIX: &str = "#/definitions/";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Method {
    #[default]
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
}

impl Method {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "get",
            Method::Post => "post",
            Method::Put => "put",
            Method::Delete => "delete",
            Method::Patch => "patch",
            Method::Head => "head",
            Method::Options => "options",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "get" => Ok(Method::Get),
            "post" => Ok(Method::Post),
            "put" => Ok(Method::Put),
            "delete" => Ok(Method::Delete),
            "patch" => Ok(Method::Patch),
            "head" => Ok(Method::Head),
            "options" => Ok(Method::Options),
            other => Err(Error::Invalid(format!("unknown method: {other}"))),
        }
    }
}

impl Serialize for Method {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Method {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Method::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// One formal parameter of an operation. Body parameters carry a full
/// schema; the others describe themselves with inline simple-schema fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "in")]
    pub location: String,
    pub description: String,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<Schema>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub param_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(rename = "enum", skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<Value>,
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
}

impl Parameter {
    /// Expands the inline simple-schema fields into a full [`Schema`] so the
    /// generator has a single input shape to work from.
    #[must_use]
    pub fn simple_schema(&self) -> Schema {
        Schema {
            schema_type: self
                .param_type
                .as_deref()
                .map(crate::schema::TypeSet::single)
                .unwrap_or_default(),
            format: self.format.clone(),
            pattern: self.pattern.clone(),
            enum_values: self.enum_values.clone(),
            items: self.items.clone(),
            min_items: self.min_items,
            max_items: self.max_items,
            unique_items: self.unique_items,
            minimum: self.minimum,
            maximum: self.maximum,
            exclusive_minimum: self.exclusive_minimum,
            exclusive_maximum: self.exclusive_maximum,
            ..Schema::default()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Response {
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<Schema>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Responses {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Response>,
    #[serde(flatten)]
    pub by_status: BTreeMap<String, Response>,
}

impl Responses {
    /// Picks the declared response for a status code, falling back to the
    /// `default` entry. The bool is true when the fallback was taken.
    #[must_use]
    pub fn for_status(&self, status: u16) -> (Option<&Response>, bool) {
        if let Some(r) = self.by_status.get(&status.to_string()) {
            return (Some(r), false);
        }
        (self.default.as_ref(), true)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Operation {
    pub description: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Parameter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub responses: Option<Responses>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PathItem {
    pub get: Option<Operation>,
    pub put: Option<Operation>,
    pub post: Option<Operation>,
    pub delete: Option<Operation>,
    pub patch: Option<Operation>,
    pub head: Option<Operation>,
    pub options: Option<Operation>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Parameter>,
}

impl PathItem {
    #[must_use]
    pub fn operation(&self, method: Method) -> Option<&Operation> {
        match method {
            Method::Get => self.get.as_ref(),
            Method::Put => self.put.as_ref(),
            Method::Post => self.post.as_ref(),
            Method::Delete => self.delete.as_ref(),
            Method::Patch => self.patch.as_ref(),
            Method::Head => self.head.as_ref(),
            Method::Options => self.options.as_ref(),
        }
    }
}

/// Merges `src` into `dst`, skipping parameters whose name is already
/// present. Used to fold path-level parameters into an operation.
#[must_use]
pub fn merge_parameters(mut dst: Vec<Parameter>, src: &[Parameter]) -> Vec<Parameter> {
    for entry in src {
        if !dst.iter().any(|p| p.name == entry.name) {
            dst.push(entry.clone());
        }
    }
    dst
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Swagger {
    pub swagger: String,
    pub host: String,
    #[serde(rename = "basePath")]
    pub base_path: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub schemes: Vec<String>,
    pub definitions: BTreeMap<String, Schema>,
    pub paths: BTreeMap<String, PathItem>,
}

impl Swagger {
    /// Parses a swagger document from YAML or JSON text.
    ///
    /// # Errors
    /// Returns `Error::Invalid` if the document does not deserialize.
    pub fn from_yaml(text: &str) -> Result<Swagger> {
        serde_yaml::from_str(text)
            .map_err(|e| Error::Invalid(format!("failed to parse swagger document: {e}")))
    }

    /// Reads and parses a swagger document from disk.
    ///
    /// # Errors
    /// Returns `Error::Invalid` when the file cannot be read or parsed.
    pub fn from_file(path: &str) -> Result<Swagger> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Invalid(format!("failed to read {path}: {e}")))?;
        Swagger::from_yaml(&text)
    }

    /// Assembles `scheme://host + basePath`, preferring http, then https,
    /// then the first declared scheme.
    #[must_use]
    pub fn base_url(&self) -> String {
        let mut scheme = "";
        for s in &self.schemes {
            if s == "http" {
                scheme = "http";
                break;
            } else if s == "https" {
                scheme = "https";
            }
        }
        if scheme.is_empty() {
            scheme = self.schemes.first().map_or("http", String::as_str);
        }
        format!("{scheme}://{}{}", self.host, self.base_path)
    }

    #[must_use]
    pub fn find_schema_by_name(&self, name: &str) -> Option<&Schema> {
        self.definitions.get(name)
    }

    /// Resolves a single `$ref` string to its definition.
    ///
    /// # Errors
    /// Returns `Error::NotFound` when the reference does not point into the
    /// document's definitions.
    pub fn deref<'a>(&'a self, reference: &str) -> Result<(&'a str, &'a Schema)> {
        let name = reference
            .strip_prefix(DEFINITIONS_PREFIX)
            .ok_or_else(|| Error::NotFound(format!("unsupported $ref: {reference}")))?;
        match self.definitions.get_key_value(name) {
            Some((k, v)) => Ok((k.as_str(), v)),
            None => Err(Error::NotFound(format!("$ref target not defined: {reference}"))),
        }
    }

    #[must_use]
    pub fn path_item(&self, path: &str) -> Option<&PathItem> {
        self.paths.get(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_parse_is_case_insensitive() {
        assert_eq!(Method::from_str("GET").unwrap(), Method::Get);
        assert_eq!(Method::from_str("Patch").unwrap(), Method::Patch);
        assert!(Method::from_str("subscribe").is_err());
    }

    #[test]
    fn test_base_url_prefers_http() {
        let doc = Swagger {
            host: "api.example.com".to_owned(),
            base_path: "/v2".to_owned(),
            schemes: vec!["https".to_owned(), "http".to_owned()],
            ..Swagger::default()
        };
        assert_eq!(doc.base_url(), "http://api.example.com/v2");
    }

    #[test]
    fn test_base_url_falls_back_to_https_then_first() {
        let mut doc = Swagger {
            host: "h".to_owned(),
            schemes: vec!["ws".to_owned(), "https".to_owned()],
            ..Swagger::default()
        };
        assert_eq!(doc.base_url(), "https://h");

        doc.schemes = vec!["ws".to_owned()];
        assert_eq!(doc.base_url(), "ws://h");

        doc.schemes.clear();
        assert_eq!(doc.base_url(), "http://h");
    }

    #[test]
    fn test_merge_parameters_dedups_by_name() {
        let dst = vec![Parameter {
            name: "id".to_owned(),
            location: "path".to_owned(),
            ..Parameter::default()
        }];
        let src = vec![
            Parameter {
                name: "id".to_owned(),
                location: "query".to_owned(),
                ..Parameter::default()
            },
            Parameter {
                name: "limit".to_owned(),
                ..Parameter::default()
            },
        ];
        let merged = merge_parameters(dst, &src);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].location, "path");
        assert_eq!(merged[1].name, "limit");
    }

    #[test]
    fn test_responses_for_status_fallback() {
        let text = r#"
responses:
  "200":
    description: ok
  default:
    description: fallback
"#;
        #[derive(Deserialize)]
        struct Holder {
            responses: Responses,
        }
        let holder: Holder = serde_yaml::from_str(text).unwrap();
        let (r, fell_back) = holder.responses.for_status(200);
        assert_eq!(r.unwrap().description, "ok");
        assert!(!fell_back);
        let (r, fell_back) = holder.responses.for_status(404);
        assert_eq!(r.unwrap().description, "fallback");
        assert!(fell_back);
    }

    #[test]
    fn test_deref_unknown_reference() {
        let doc = Swagger::default();
        match doc.deref("#/definitions/Pet") {
            Err(crate::error::Error::NotFound(_)) => {}
            other => panic!("expected NotFound, got {other:?}"),
        }
    }
}
