//! A single test step: parameter resolution, request dispatch, response
//! validation and mirror reconciliation.
//!
//! A step is deserialized from the plan as a template and duplicated before
//! each run, because running it fills the parameter bags and rewrites
//! `expect` with the observed result.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::client::{RestClient, RestRequest, RestResponse};
use crate::compare::Comparison;
use crate::db::MirrorDb;
use crate::error::{Error, Result};
use crate::generate::{
    generate_bool, generate_enum, generate_file_contents, generate_float, generate_int,
    generate_string,
};
use crate::plan::{TestCase, TestHistory};
use crate::schema::{
    Schema, TYPE_ARRAY, TYPE_BOOLEAN, TYPE_FILE, TYPE_INTEGER, TYPE_NUMBER, TYPE_OBJECT,
    TYPE_STRING,
};
use crate::swagger::{CLASS_FAIL, Method, Operation, Parameter, Response, merge_parameters};
use crate::tag::{MeqaTag, get_meqa_tag};
use crate::values;

pub const EXPECT_STATUS: &str = "status";
pub const EXPECT_BODY: &str = "body";

/// Which side of a comparison a history back-reference may read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryScope {
    Any,
    New,
    Old,
}

impl HistoryScope {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "any" => Some(HistoryScope::Any),
            "new" => Some(HistoryScope::New),
            "old" => Some(HistoryScope::Old),
            _ => None,
        }
    }
}

/// The five parameter bags a step or a test case may carry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TestParams {
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub path_params: Map<String, Value>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub query_params: Map<String, Value>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub header_params: Map<String, Value>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub form_params: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_params: Option<Value>,
}

impl TestParams {
    /// The bag a swagger parameter location maps to; body is handled
    /// separately.
    #[must_use]
    pub fn bag(&self, location: &str) -> Option<&Map<String, Value>> {
        match location {
            "path" => Some(&self.path_params),
            "query" => Some(&self.query_params),
            "header" => Some(&self.header_params),
            "formData" => Some(&self.form_params),
            _ => None,
        }
    }

    #[must_use]
    pub fn bag_mut(&mut self, location: &str) -> Option<&mut Map<String, Value>> {
        match location {
            "path" => Some(&mut self.path_params),
            "query" => Some(&mut self.query_params),
            "header" => Some(&mut self.header_params),
            "formData" => Some(&mut self.form_params),
            _ => None,
        }
    }
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// One step of a test case.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Test {
    pub name: String,
    pub path: String,
    pub method: Method,
    #[serde(rename = "ref", skip_serializing_if = "String::is_empty")]
    pub ref_name: String,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub expect: Map<String, Value>,
    #[serde(skip_serializing_if = "is_false")]
    pub strict: bool,
    #[serde(flatten)]
    pub params: TestParams,

    /// Class name to the comparison rows this run built up.
    #[serde(skip)]
    pub comparisons: HashMap<String, Vec<Comparison>>,
    #[serde(skip)]
    pub tag: Option<MeqaTag>,
    #[serde(skip)]
    pub op: Option<Operation>,
}

impl Test {
    /// Clone of the template with all run state reset.
    #[must_use]
    pub fn duplicate(&self) -> Test {
        let mut t = self.clone();
        t.comparisons = HashMap::new();
        t.tag = None;
        t.op = None;
        t
    }

    /// Folds a referenced template into this step: strict and expect come
    /// from the parent, parameter bags merge under our own values, and the
    /// body combines when both sides are maps.
    pub fn copy_parent(&mut self, parent: &Test) {
        if self.path.is_empty() {
            self.path = parent.path.clone();
            self.method = parent.method;
        }
        self.strict = parent.strict;
        if !parent.expect.is_empty() {
            self.expect = parent.expect.clone();
        }
        values::map_add(&mut self.params.query_params, &parent.params.query_params);
        values::map_add(&mut self.params.path_params, &parent.params.path_params);
        values::map_add(&mut self.params.header_params, &parent.params.header_params);
        values::map_add(&mut self.params.form_params, &parent.params.form_params);
        match (&mut self.params.body_params, &parent.params.body_params) {
            (own @ None, Some(p)) => *own = Some(p.clone()),
            (Some(Value::Object(own)), Some(Value::Object(p))) => values::map_combine(own, p),
            (Some(own), Some(p)) => {
                if std::mem::discriminant(own) == std::mem::discriminant(p) {
                    *own = p.clone();
                }
            }
            _ => {}
        }
    }

    /// Looks a field up in this step's comparison ledger, preferring the
    /// proposed post-state over the pre-state when the scope allows both.
    #[must_use]
    pub fn get_param_from_comparison(&self, name: &str, scope: HistoryScope) -> Option<Value> {
        for list in self.comparisons.values() {
            for comp in list {
                if scope != HistoryScope::Old
                    && let Some(m) = &comp.new
                    && let Some(v) = m.get(name)
                    && !v.is_null()
                {
                    return Some(v.clone());
                }
                if scope != HistoryScope::New
                    && let Some(m) = &comp.old
                    && let Some(v) = m.get(name)
                    && !v.is_null()
                {
                    return Some(v.clone());
                }
            }
        }
        None
    }

    /// Replaces `<stepName.field>` references (optionally suffixed with
    /// `:any|:new|:old`) in every parameter bag, including nested maps and
    /// arrays inside the body. Unresolvable references are left intact.
    pub fn resolve_history(&mut self, history: &TestHistory) {
        fn resolve_string(s: &str, history: &TestHistory) -> Option<Value> {
            let begin = s.find('<')?;
            let end = s[begin..].find('>')? + begin;
            let inner = &s[begin + 1..end];
            let (spec, scope) = match inner.rsplit_once(':') {
                Some((head, scope)) => (head, HistoryScope::parse(scope)?),
                None => (inner, HistoryScope::Any),
            };
            let (step, field) = spec.split_once('.')?;
            if field.contains('.') {
                tracing::warn!("invalid history reference: {inner}");
                return None;
            }
            history
                .get_test(step)?
                .get_param_from_comparison(field, scope)
        }

        fn resolve_value(v: &mut Value, history: &TestHistory) {
            match v {
                Value::String(s) => {
                    if let Some(resolved) = resolve_string(s, history) {
                        *v = resolved;
                    }
                }
                Value::Object(m) => {
                    for entry in m.values_mut() {
                        resolve_value(entry, history);
                    }
                }
                Value::Array(a) => {
                    for entry in a {
                        resolve_value(entry, history);
                    }
                }
                _ => {}
            }
        }

        for bag in [
            &mut self.params.path_params,
            &mut self.params.query_params,
            &mut self.params.header_params,
            &mut self.params.form_params,
        ] {
            for entry in bag.values_mut() {
                resolve_value(entry, history);
            }
        }
        if let Some(body) = self.params.body_params.as_mut() {
            resolve_value(body, history);
        }
    }

    /// Records what entity class and property a resolved basic value stands
    /// for. A collision on the last row of the class means the step is
    /// addressing another entity, so a fresh row is appended.
    pub fn add_basic_comparison(
        &mut self,
        tag: Option<&MeqaTag>,
        param: Option<&Parameter>,
        data: &Value,
        db: &MirrorDb,
    ) {
        let Some(param) = param else { return };
        let Some(tag) = tag else { return };
        if tag.class.is_empty() || tag.property.is_empty() {
            return;
        }

        let op = if !tag.operation.is_empty() {
            tag.operation.parse().unwrap_or(Method::Get)
        } else if param.location == "formData" || param.location == "body" {
            Method::Put
        } else {
            Method::Get
        };

        let schema = db.swagger.find_schema_by_name(&tag.class).cloned();
        let list = self.comparisons.entry(tag.class.clone()).or_default();
        if let Some(last) = list.last_mut() {
            if let Some(fresh) = last.set_for_op(op, &tag.property, data.clone()) {
                list.push(fresh);
            }
            return;
        }
        let mut comp = Comparison {
            schema,
            ..Comparison::default()
        };
        comp.set_for_op(op, &tag.property, data.clone());
        list.push(comp);
    }

    /// Registers a generated object under its class, inferring the class
    /// via the mirror when the tag does not name one. The object becomes
    /// the `new` side of the last open row, or starts a fresh row.
    pub fn add_object_comparison(
        &mut self,
        tag: &MeqaTag,
        obj: Map<String, Value>,
        schema: &Schema,
        db: &MirrorDb,
    ) {
        let method = if !tag.operation.is_empty() {
            tag.operation.parse().unwrap_or(self.method)
        } else if let Some(t) = &self.tag
            && !t.operation.is_empty()
        {
            t.operation.parse().unwrap_or(self.method)
        } else {
            self.method
        };

        let mut class = tag.class.clone();
        if class.is_empty() {
            match db.find_matching_schema(&Value::Object(obj.clone())) {
                Some((name, _)) => class = name,
                None => {
                    tracing::warn!("can't find a known schema for a generated object");
                    return;
                }
            }
        }

        if matches!(method, Method::Post | Method::Put | Method::Patch) {
            let list = self.comparisons.entry(class).or_default();
            if let Some(last) = list.last_mut()
                && last.new.is_none()
            {
                last.new = Some(obj);
                return;
            }
            list.push(Comparison::for_new(obj, Some(schema.clone())));
        } else {
            tracing::warn!("unexpected object generated for {method} of class {class}");
        }
    }

    /// Generates a value for one formal parameter of the operation.
    ///
    /// # Errors
    /// Propagates `Error::Invalid` from the underlying generators.
    pub fn generate_parameter(&mut self, param: &Parameter, db: &MirrorDb) -> Result<Value> {
        let tag = get_meqa_tag(&param.description);
        if let Some(schema) = &param.schema {
            return self.generate_schema(&param.name, tag.as_ref(), schema, db);
        }
        if !param.enum_values.is_empty() {
            return Ok(generate_enum(&param.enum_values));
        }
        if param.param_type.is_none() {
            return Err(Error::Invalid(format!(
                "parameter {} doesn't have a type",
                param.name
            )));
        }

        let schema = param.simple_schema();
        match schema.schema_type.primary() {
            Some(TYPE_OBJECT) => self.generate_object("param_", tag.as_ref(), &schema, db),
            Some(TYPE_ARRAY) => self.generate_array("param_", tag.as_ref(), &schema, db),
            _ => self.generate_by_type(
                &schema,
                &format!("{}_", param.name),
                tag.as_ref(),
                Some(param),
                db,
            ),
        }
    }

    /// Generates a value satisfying the schema. The tag closest to a node
    /// wins; a `$ref` hop re-seeds the class from the definition name.
    ///
    /// # Errors
    /// Returns `Error::Invalid` for untyped schemas, unresolvable refs and
    /// non-object `allOf` members.
    pub fn generate_schema(
        &mut self,
        name: &str,
        parent_tag: Option<&MeqaTag>,
        schema: &Schema,
        db: &MirrorDb,
    ) -> Result<Value> {
        let swagger = db.swagger.clone();
        let tag = get_meqa_tag(&schema.description).or_else(|| parent_tag.cloned());

        if let Some(r) = &schema.reference {
            let (ref_name, target) = swagger.deref(r)?;
            let seeded = MeqaTag::for_class(ref_name);
            return self.generate_schema(name, Some(&seeded), target, db);
        }

        if !schema.enum_values.is_empty() {
            return Ok(generate_enum(&schema.enum_values));
        }

        if !schema.all_of.is_empty() {
            let mut combined = Map::new();
            let mut discriminator = None;
            for member in &schema.all_of {
                let value = self.generate_schema(name, None, member, db)?;
                let Value::Object(m) = value else {
                    return Err(Error::Invalid(
                        "can't combine an allOf member that is not an object".to_owned(),
                    ));
                };
                values::map_combine(&mut combined, &m);
                if member.discriminator.is_some() {
                    discriminator = member.discriminator.clone();
                } else if let Ok((_, resolved)) = member.resolve(&swagger)
                    && resolved.discriminator.is_some()
                {
                    // The discriminator usually sits on a shared base object
                    // referred to from allOf.
                    discriminator = resolved.discriminator.clone();
                }
            }
            if let (Some(d), Some(t)) = (&discriminator, &tag)
                && !t.class.is_empty()
            {
                combined.insert(d.clone(), Value::String(t.class.clone()));
            }
            if let Some(t) = &tag {
                self.add_object_comparison(t, combined.clone(), schema, db);
            }
            return Ok(Value::Object(combined));
        }

        if schema.schema_type.is_empty() {
            return Err(Error::Invalid(format!("schema for {name} has no type")));
        }
        if schema.schema_type.contains(TYPE_OBJECT) {
            return self.generate_object(name, tag.as_ref(), schema, db);
        }
        if schema.schema_type.contains(TYPE_ARRAY) {
            return self.generate_array(name, tag.as_ref(), schema, db);
        }
        self.generate_by_type(schema, name, tag.as_ref(), None, db)
    }

    fn generate_object(
        &mut self,
        _name: &str,
        parent_tag: Option<&MeqaTag>,
        schema: &Schema,
        db: &MirrorDb,
    ) -> Result<Value> {
        let mut obj = Map::new();
        for (k, prop) in &schema.properties {
            let v = self.generate_schema(&format!("{k}_"), None, prop, db)?;
            obj.insert(k.clone(), v);
        }
        let tag = get_meqa_tag(&schema.description).or_else(|| parent_tag.cloned());
        if let Some(t) = &tag {
            self.add_object_comparison(t, obj.clone(), schema, db);
        }
        Ok(Value::Object(obj))
    }

    fn generate_array(
        &mut self,
        name: &str,
        parent_tag: Option<&MeqaTag>,
        schema: &Schema,
        db: &MirrorDb,
    ) -> Result<Value> {
        use rand::Rng;
        let n = if schema.min_items.is_some() || schema.max_items.is_some() {
            let lo = schema.min_items.unwrap_or(1).max(1);
            let hi = schema.max_items.unwrap_or(10).max(1).max(lo);
            rand::thread_rng().gen_range(lo..=hi)
        } else {
            rand::thread_rng().gen_range(0..10)
        };
        let Some(item_schema) = &schema.items else {
            return Err(Error::Invalid(format!(
                "array schema for {name} has no items"
            )));
        };
        let tag = get_meqa_tag(&schema.description).or_else(|| parent_tag.cloned());

        let mut ar = Vec::new();
        for _ in 0..n {
            let entry = self.generate_schema(name, tag.as_ref(), item_schema, db)?;
            if schema.unique_items && ar.contains(&entry) {
                continue;
            }
            ar.push(entry);
        }
        Ok(Value::Array(ar))
    }

    fn generate_by_type(
        &mut self,
        s: &Schema,
        prefix: &str,
        parent_tag: Option<&MeqaTag>,
        param: Option<&Parameter>,
        db: &MirrorDb,
    ) -> Result<Value> {
        use rand::Rng;
        let tag = get_meqa_tag(&s.description).or_else(|| parent_tag.cloned());

        if let Some(t) = &tag
            && !t.class.is_empty()
            && !t.property.is_empty()
        {
            // Prefer a key of an entity this step is already addressing;
            // the same lookup key must flow through the whole request.
            if let Some(list) = self.comparisons.get_mut(&t.class) {
                for comp in list.iter_mut() {
                    if let Some(old) = &comp.old {
                        let v = old.get(&t.property).cloned().unwrap_or(Value::Null);
                        comp.old_used
                            .get_or_insert_with(Map::new)
                            .insert(t.property.clone(), v.clone());
                        return Ok(v);
                    }
                }
            }
            // Otherwise borrow a real key from the mirror so the request
            // refers to an entity the server actually has.
            let candidates = db.find(&t.class, &Value::Null, &crate::db::match_always, 5);
            if !candidates.is_empty() {
                let pick = candidates[rand::thread_rng().gen_range(0..candidates.len())].clone();
                if let Value::Object(obj) = pick {
                    let v = obj.get(&t.property).cloned().unwrap_or(Value::Null);
                    let mut comp = Comparison::for_existing(obj, db.get_schema(&t.class));
                    if let Some(used) = comp.old_used.as_mut() {
                        used.insert(t.property.clone(), v.clone());
                    }
                    self.comparisons.entry(t.class.clone()).or_default().push(comp);
                    return Ok(v);
                }
            }
        }

        if !s.schema_type.is_empty() {
            let result = match s.schema_type.primary() {
                Some(TYPE_BOOLEAN) => generate_bool(),
                Some(TYPE_INTEGER) => Value::from(generate_int(s)?),
                Some(TYPE_NUMBER) => Value::from(generate_float(s)?),
                Some(TYPE_STRING) => Value::String(generate_string(s, prefix)?),
                Some(TYPE_FILE) => Value::String(generate_file_contents()),
                _ => {
                    return Err(Error::Invalid(format!(
                        "unrecognized type: {:?}",
                        s.schema_type.0
                    )));
                }
            };
            self.add_basic_comparison(tag.as_ref(), param, &result, db);
            return Ok(result);
        }

        Err(Error::Invalid(format!("schema for {prefix} has no type")))
    }

    /// Fills every formal parameter of the operation: supplied values are
    /// taken (and remembered as comparisons), case-level defaults fill the
    /// gaps, and the rest is generated against the schema.
    ///
    /// # Errors
    /// `Error::NotFound` when the path or operation is missing from the
    /// swagger; generation errors propagate.
    pub fn resolve_parameters(&mut self, case: &TestCase, db: &MirrorDb) -> Result<()> {
        let swagger = db.swagger.clone();
        let Some(item) = swagger.path_item(&self.path) else {
            return Err(Error::NotFound(format!(
                "path {} not found in the swagger document",
                self.path
            )));
        };
        let Some(op) = item.operation(self.method) else {
            return Err(Error::NotFound(format!(
                "no {} operation under {}",
                self.method, self.path
            )));
        };
        let mut op = op.clone();
        op.parameters = merge_parameters(op.parameters, &item.parameters);
        self.tag = get_meqa_tag(&op.description);
        let parameters = op.parameters.clone();
        self.op = Some(op);

        for param in &parameters {
            if param.location == "body" {
                self.resolve_body_parameter(param, case, db)?;
            } else {
                self.resolve_simple_parameter(param, case, db)?;
            }
        }
        Ok(())
    }

    fn resolve_body_parameter(
        &mut self,
        param: &Parameter,
        case: &TestCase,
        db: &MirrorDb,
    ) -> Result<()> {
        let swagger = db.swagger.clone();
        let body_is_map = matches!(self.params.body_params, Some(Value::Object(_)));
        if let Some(body) = self.params.body_params.clone()
            && !body_is_map
        {
            // A non-map body is used as supplied; just remember which
            // entities an array of objects is writing.
            let ptag = get_meqa_tag(&param.description);
            if let Some(schema) = &param.schema {
                let (root_tag, root_schema) = schema.root_type(ptag.as_ref(), &swagger);
                if let (Some(rt), Some(rs)) = (root_tag, root_schema)
                    && let Value::Array(items) = &body
                {
                    for item in items {
                        if let Value::Object(m) = item {
                            self.add_object_comparison(&rt, m.clone(), rs, db);
                        }
                    }
                }
            }
            return Ok(());
        }

        let generated = self.generate_parameter(param, db)?;
        if let Value::Object(mut template) = generated {
            let before_overlay = template.clone();
            let mut overlay = match self.params.body_params.take() {
                Some(Value::Object(m)) => m,
                _ => Map::new(),
            };
            if let Some(Value::Object(case_body)) = &case.params.body_params {
                values::map_add(&mut overlay, case_body);
            }
            values::map_replace(&mut template, &overlay);
            // The ledger recorded the raw template as the proposed
            // post-state; the overlaid body is what actually goes out.
            for list in self.comparisons.values_mut() {
                for comp in list.iter_mut() {
                    if comp.new.as_ref() == Some(&before_overlay) {
                        comp.new = Some(template.clone());
                    }
                }
            }
            self.params.body_params = Some(Value::Object(template));
        } else {
            self.params.body_params = Some(generated);
        }
        Ok(())
    }

    fn resolve_simple_parameter(
        &mut self,
        param: &Parameter,
        case: &TestCase,
        db: &MirrorDb,
    ) -> Result<()> {
        let loc = param.location.as_str();
        if self.params.bag(loc).is_none() {
            tracing::warn!("unknown parameter location: {loc}");
            return Ok(());
        }

        let mut existing = self
            .params
            .bag(loc)
            .and_then(|bag| bag.get(&param.name))
            .cloned();
        if existing.is_none()
            && let Some(v) = case.params.bag(loc).and_then(|bag| bag.get(&param.name))
        {
            let v = v.clone();
            if let Some(bag) = self.params.bag_mut(loc) {
                bag.insert(param.name.clone(), v.clone());
            }
            existing = Some(v);
        }

        if let Some(v) = existing {
            let ptag = get_meqa_tag(&param.description);
            self.add_basic_comparison(ptag.as_ref(), Some(param), &v, db);
            return Ok(());
        }

        let generated = self.generate_parameter(param, db)?;
        if let Some(bag) = self.params.bag_mut(loc) {
            bag.insert(param.name.clone(), generated);
        }
        Ok(())
    }

    /// The resolved request: path parameters substituted, bags coerced to
    /// strings, body attached.
    #[must_use]
    pub fn build_request(&self, base_url: &str, username: &str, password: &str) -> RestRequest {
        let mut path = self.path.clone();
        for (k, v) in &self.params.path_params {
            path = path.replace(&format!("{{{k}}}"), &values::value_to_string(v));
        }
        RestRequest {
            method: self.method,
            url: format!("{base_url}{path}"),
            query: values::to_string_pairs(&self.params.query_params),
            headers: values::to_string_pairs(&self.params.header_params),
            form: values::to_string_pairs(&self.params.form_params),
            body: self.params.body_params.clone(),
            basic_auth: if username.is_empty() {
                None
            } else {
                Some((username.to_owned(), password.to_owned()))
            },
        }
    }

    /// Resolves parameters, performs the HTTP round-trip and reconciles the
    /// result. This is the only suspension point of a step.
    ///
    /// # Errors
    /// Any of the five error kinds; the mirror is left untouched when the
    /// transport fails.
    pub async fn run(&mut self, case: &TestCase, db: &MirrorDb, client: &RestClient) -> Result<()> {
        tracing::info!("--- {}", self.name);
        self.resolve_parameters(case, db)?;
        let req = self.build_request(&db.swagger.base_url(), &case.username, &case.password);
        tracing::debug!("{} {}", req.method, req.url);
        let resp = client.execute(req).await?;
        tracing::info!("{} -> {}", self.name, resp.status);
        self.process_result(&resp, db)
    }

    fn effective_method(&self) -> Method {
        if let Some(t) = &self.tag
            && !t.operation.is_empty()
            && let Ok(m) = t.operation.parse::<Method>()
        {
            return m;
        }
        self.method
    }

    /// Validates the response against the declared spec and expectation,
    /// then applies the operation's semantics to the mirror.
    ///
    /// # Errors
    /// `Error::Expect` on expectation failures, `Error::Mismatch` when the
    /// body does not parse against the schema (unless the response spec fell
    /// back to default on a successful call), `Error::Http` when a GET
    /// result contradicts the request criteria or the mirror.
    pub fn process_result(&mut self, resp: &RestResponse, db: &MirrorDb) -> Result<()> {
        let swagger = db.swagger.clone();
        let status = resp.status;
        let op = self.op.clone().unwrap_or_default();
        let (resp_spec, use_default) = match &op.responses {
            Some(responses) => {
                let (spec, fell_back) = responses.for_status(status);
                (spec.cloned().unwrap_or_default(), fell_back)
            }
            None => (Response::default(), true),
        };

        let result_obj: Option<Value> = if resp.body.is_empty() {
            None
        } else {
            serde_json::from_slice(&resp.body).ok()
        };

        let mut success = (200..300).contains(&status);
        if let Some(t) = get_meqa_tag(&resp_spec.description)
            && t.class == CLASS_FAIL
        {
            success = false;
        }

        let mut test_success = success;
        if let Some(expected) = self.expect.get(EXPECT_STATUS) {
            if expected.as_str() == Some("fail") {
                test_success = !success;
            } else if let Some(n) = expected.as_i64() {
                test_success = n == i64::from(status);
            }
            if test_success && let Some(expected_body) = self.expect.get(EXPECT_BODY) {
                let actual = result_obj.clone().unwrap_or(Value::Null);
                if !values::deep_equals(expected_body, &actual) {
                    return Err(Error::Expect(format!(
                        "expecting body:\n{}\ngot body:\n{}",
                        pretty(expected_body),
                        pretty(&actual)
                    )));
                }
            }
        }
        if !test_success {
            return Err(Error::Expect(format!("test failed, response code {status}")));
        }

        let mut collection: HashMap<String, Vec<Value>> = HashMap::new();
        if let (Some(obj), Some(schema)) = (&result_obj, &resp_spec.schema) {
            if let Err(e) = schema.parses("", obj, &mut collection, None, &swagger) {
                tracing::warn!("server response doesn't match the swagger schema: {e}");
                // A successful call matched against the default spec is a
                // strong hint the author never wrote out the success case.
                if !(use_default && success) {
                    return Err(e);
                }
            }
        }
        if let Some(schema) = &resp_spec.schema {
            if !resp.body.is_empty() {
                if result_obj.is_none() && !schema.schema_type.contains(TYPE_STRING) {
                    tracing::warn!("response body is not JSON but the schema expects one");
                }
            } else if !schema.schema_type.contains(TYPE_ARRAY) {
                tracing::warn!("spec expects a non-empty response, but the body is empty");
            }
        }

        let method = self.effective_method();

        // The server may have replaced fields the client proposed (ids,
        // timestamps). For creates, what the server returned wins.
        if method == Method::Post {
            let classes: Vec<String> = collection.keys().cloned().collect();
            for class in classes {
                let replace = self
                    .comparisons
                    .get(&class)
                    .is_some_and(|l| !l.is_empty() && l[0].new.is_some());
                if replace {
                    let entries = collection.remove(&class).unwrap_or_default();
                    let fresh: Vec<Comparison> = entries
                        .into_iter()
                        .filter_map(|e| match e {
                            Value::Object(m) => Some(Comparison::for_new(m, None)),
                            _ => None,
                        })
                        .collect();
                    self.comparisons.insert(class, fresh);
                }
            }
        }

        // Cross-entity keys scoping this operation. Only classes addressed
        // by exactly one comparison contribute; multi-entity steps lose the
        // scoping, which operators should hear about.
        let mut associations: HashMap<String, Map<String, Value>> = HashMap::new();
        for (class, list) in &self.comparisons {
            if list.len() == 1 {
                if let Some(used) = &list[0].old_used {
                    associations.insert(class.clone(), used.clone());
                }
            } else if list.iter().filter(|c| c.old_used.is_some()).count() > 1 {
                tracing::warn!(
                    "class {class} has multiple lookup comparisons; association scoping dropped"
                );
            }
        }
        if !associations.is_empty() {
            tracing::debug!(
                "association keys for this step: {:?}",
                associations.keys().collect::<Vec<_>>()
            );
        }

        if method == Method::Get {
            for (class, result_array) in &collection {
                self.compare_get_result(class, result_array, db)?;
            }
        } else {
            for (class, list) in &self.comparisons {
                for comp in list {
                    self.process_one_comparison(class, method, comp, db)?;
                }
            }
        }

        if !self.strict {
            for (class, entries) in &collection {
                for entry in entries {
                    if let Err(e) = db.insert(class, entry.clone()) {
                        tracing::warn!("could not mirror observed {class}: {e}");
                    }
                }
            }
        }

        // Keep the observed outcome so the executed plan can be diffed
        // against its template.
        self.expect = Map::new();
        self.expect
            .insert(EXPECT_STATUS.to_owned(), Value::from(status));
        if let Some(obj) = result_obj {
            self.expect.insert(EXPECT_BODY.to_owned(), obj);
        }
        Ok(())
    }

    fn process_one_comparison(
        &self,
        class: &str,
        method: Method,
        comp: &Comparison,
        db: &MirrorDb,
    ) -> Result<()> {
        match method {
            Method::Delete => {
                let criteria = comp.old_used_criteria();
                let n = db.delete(class, &criteria, &values::interface_equals, -1);
                tracing::debug!("deleted {n} {class} entries from the mirror");
                Ok(())
            }
            Method::Post => match &comp.new {
                Some(obj) => db.insert(class, Value::Object(obj.clone())),
                None => Ok(()),
            },
            Method::Put | Method::Patch => {
                if let Some(new_obj) = &comp.new {
                    let criteria = comp.old_used_criteria();
                    let count = db.update(
                        class,
                        &criteria,
                        &values::interface_equals,
                        new_obj,
                        1,
                        method == Method::Patch,
                    );
                    if count != 1 {
                        tracing::warn!("failed to find a {class} entry to update");
                    }
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn compare_get_result(&self, class: &str, result_array: &[Value], db: &MirrorDb) -> Result<()> {
        let comps = self
            .comparisons
            .get(class)
            .map(Vec::as_slice)
            .unwrap_or_default();
        let mut mirrored = Vec::new();
        if comps.is_empty() {
            mirrored = db.find(class, &Value::Null, &values::interface_equals, -1);
        } else {
            for comp in comps {
                mirrored.extend(db.find(
                    class,
                    &comp.old_used_criteria(),
                    &values::interface_equals,
                    -1,
                ));
            }
        }
        tracing::debug!("got {} {class} entries from the mirror", mirrored.len());

        for entry in result_array {
            if !entry.is_object() {
                // Arrays of non-map values have nothing to reconcile; the
                // schema check already covered them.
                continue;
            }
            if !comps.is_empty() {
                let matched = comps
                    .iter()
                    .any(|c| values::interface_equals(&c.old_used_criteria(), entry));
                if !matched {
                    return Err(Error::Http(format!(
                        "result returned doesn't match query parameters:\n{}",
                        pretty(entry)
                    )));
                }
            }
            if !self.strict {
                continue;
            }
            let found = mirrored
                .iter()
                .any(|m| m.is_object() && values::interface_equals(m, entry));
            if !found {
                return Err(Error::Http(format!(
                    "result returned is not known to the client:\n{}",
                    pretty(entry)
                )));
            }
        }
        Ok(())
    }
}

fn pretty(v: &Value) -> String {
    serde_json::to_string_pretty(v).unwrap_or_default()
}
