//! JSON state documents.
//!
//! A document is either a list of states or `{ "states": [...] }`. States may
//! nest their children; a child's `name` is then a single segment under the
//! enclosing state.
//!
//! ```json
//! [
//!   { "name": "home", "url": "/", "component": "Home", "children": [
//!       { "name": "item", "url": "item/{id:int}", "params": { "id": { "value": 1, "squash": true } } }
//!   ] },
//!   { "name": "search", "url": "/search?q", "params": { "q": { "dynamic": true } },
//!     "resolve": { "pageSize": 20 }, "resolvePolicy": "eager" }
//! ]
//! ```

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

use crate::api::Router;
use crate::error::ConfigError;
use crate::params::{ArrayMode, ParamDeclaration, Squash};
use crate::resolve::{ResolvePolicy, Resolvable};
use crate::state::{StateDeclaration, StateRegistration, ViewDeclaration};
use crate::{ParamValue, ParamValues};

/// One state as written in a JSON document.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateDocument {
    pub name: String,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default, rename = "abstract")]
    pub is_abstract: bool,
    #[serde(default)]
    pub params: BTreeMap<String, ParamDocument>,
    #[serde(default)]
    pub views: BTreeMap<String, ViewDocument>,
    #[serde(default)]
    pub component: Option<String>,
    /// Constant resolvables: token to JSON value.
    #[serde(default)]
    pub resolve: BTreeMap<String, Value>,
    #[serde(default)]
    pub resolve_policy: Option<String>,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub children: Vec<StateDocument>,
}

/// A parameter declaration, or just its default value.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ParamDocument {
    Declared(ParamSpec),
    Default(Value),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParamSpec {
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default, rename = "type")]
    pub type_name: Option<String>,
    /// `true`, `false` or `"auto"`.
    #[serde(default)]
    pub array: Option<Value>,
    #[serde(default)]
    pub squash: Option<Value>,
    #[serde(default)]
    pub dynamic: Option<bool>,
    #[serde(default)]
    pub inherit: Option<bool>,
    #[serde(default)]
    pub raw: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ViewDocument {
    #[serde(default)]
    pub component: Option<String>,
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub config: Value,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Document {
    List(Vec<StateDocument>),
    Wrapped { states: Vec<StateDocument> },
}

/// Parse a document into state documents without registering anything.
pub fn parse_states(json: &str) -> Result<Vec<StateDocument>, ConfigError> {
    let document: Document = serde_json::from_str(json).map_err(|e| ConfigError::InvalidDocument(e.to_string()))?;
    Ok(match document {
        Document::List(states) | Document::Wrapped { states } => states,
    })
}

/// Register every state of a JSON document, parents before children.
pub fn load_states(router: &Router, json: &str) -> Result<Vec<StateRegistration>, ConfigError> {
    let mut declarations = Vec::new();
    for doc in parse_states(json)? {
        doc.flatten_into(None, &mut declarations)?;
    }
    tracing::debug!(states = declarations.len(), "state document loaded");

    let mut registrations = Vec::with_capacity(declarations.len());
    for decl in declarations {
        registrations.push(router.register(decl)?);
    }
    Ok(registrations)
}

impl StateDocument {
    /// Build the declaration for this state alone (children are ignored).
    pub fn to_declaration(&self, parent: Option<&str>) -> Result<StateDeclaration, ConfigError> {
        let mut decl = StateDeclaration::new(self.name.clone()).data(self.data.clone());
        decl.parent = parent.map(str::to_string).or_else(|| self.parent.clone());
        decl.url = self.url.clone();
        decl.is_abstract = self.is_abstract;
        decl.component = self.component.clone();

        for (id, param) in &self.params {
            decl = decl.param(id.clone(), param.to_declaration(id)?);
        }
        for (target, view) in &self.views {
            let declaration = ViewDeclaration {
                component: view.component.clone(),
                template: view.template.clone(),
                config: view.config.clone(),
            };
            decl = decl.view(target.clone(), declaration);
        }
        for (token, value) in &self.resolve {
            decl = decl.resolve(Resolvable::value(token.clone(), value.clone()));
        }
        if let Some(policy) = &self.resolve_policy {
            let policy: ResolvePolicy = policy
                .parse()
                .map_err(|e: String| ConfigError::InvalidDocument(format!("state '{}': {e}", self.name)))?;
            decl = decl.resolve_policy(policy);
        }
        Ok(decl)
    }

    fn full_name(&self, parent: Option<&str>) -> String {
        match parent {
            Some(parent) if !parent.is_empty() => format!("{parent}.{}", self.name),
            _ => self.name.clone(),
        }
    }

    fn flatten_into(&self, parent: Option<&str>, out: &mut Vec<StateDeclaration>) -> Result<(), ConfigError> {
        if parent.is_some() && self.parent.is_some() {
            return Err(ConfigError::InvalidDocument(format!(
                "nested state '{}' may not declare its own parent",
                self.name
            )));
        }
        out.push(self.to_declaration(parent)?);
        let name = self.full_name(parent.or(self.parent.as_deref()));
        for child in &self.children {
            child.flatten_into(Some(&name), out)?;
        }
        Ok(())
    }
}

impl ParamDocument {
    fn to_declaration(&self, id: &str) -> Result<ParamDeclaration, ConfigError> {
        let spec = match self {
            ParamDocument::Default(value) => return Ok(ParamDeclaration::with_default(json_param(value))),
            ParamDocument::Declared(spec) => spec,
        };

        let mut decl = ParamDeclaration::new();
        if let Some(value) = &spec.value {
            decl = decl.default_value(json_param(value));
        }
        if let Some(type_name) = &spec.type_name {
            decl = decl.type_name(type_name.clone());
        }
        if let Some(array) = &spec.array {
            decl = decl.array(match array {
                Value::Bool(true) => ArrayMode::On,
                Value::Bool(false) => ArrayMode::Off,
                Value::String(s) if s == "auto" => ArrayMode::Auto,
                other => {
                    return Err(ConfigError::InvalidDocument(format!("param '{id}': invalid array mode {other}")));
                }
            });
        }
        if let Some(squash) = &spec.squash {
            decl = decl.squash(Squash::from_json(squash)?);
        }
        if let Some(dynamic) = spec.dynamic {
            decl = decl.dynamic(dynamic);
        }
        if let Some(inherit) = spec.inherit {
            decl = decl.inherit(inherit);
        }
        if let Some(raw) = spec.raw {
            decl = decl.raw(raw);
        }
        Ok(decl)
    }
}

/// Convert plain JSON into a parameter value. Scalars and arrays map to their
/// typed variants; objects stay JSON.
pub fn json_param(value: &Value) -> ParamValue {
    match value {
        Value::Null => ParamValue::Null,
        Value::Bool(b) => ParamValue::Bool(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => ParamValue::Int(i),
            None => ParamValue::Json(value.clone()),
        },
        Value::String(s) => ParamValue::String(s.clone()),
        Value::Array(items) => ParamValue::Array(items.iter().map(json_param).collect()),
        Value::Object(_) => ParamValue::Json(value.clone()),
    }
}

/// Read a JSON object of parameter values.
pub fn json_params(json: &str) -> Result<ParamValues, ConfigError> {
    let value: Value = serde_json::from_str(json).map_err(|e| ConfigError::InvalidDocument(e.to_string()))?;
    let Value::Object(map) = value else {
        return Err(ConfigError::InvalidDocument(format!("expected a JSON object of params, got {value}")));
    };
    let mut params = ParamValues::new();
    for (id, value) in &map {
        params.insert(id.clone(), json_param(value));
    }
    Ok(params)
}

#[cfg(test)]
mod tests {
    use futures::executor::block_on;

    use super::*;
    use crate::injector::downcast;

    const DOCUMENT: &str = r#"{
        "states": [
            { "name": "home", "url": "/", "component": "Home", "data": { "title": "Home" }, "children": [
                { "name": "item", "url": "item/{id:int}", "params": { "id": { "value": 1, "squash": true } },
                  "resolve": { "pageSize": 20 }, "resolvePolicy": "eager" }
            ] },
            { "name": "search", "url": "/search?q&tag", "params": { "q": { "dynamic": true }, "tag": "all" },
              "views": { "main@": { "component": "Results" } } },
            { "name": "detail", "parent": "search", "url": "/:ref" }
        ]
    }"#;

    #[test]
    fn documents_register_nested_and_parented_states() {
        let router = Router::new().unwrap();
        let registrations = load_states(&router, DOCUMENT).unwrap();
        let names: Vec<&str> = registrations.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["home", "home.item", "search", "search.detail"]);
        assert!(router.pending_states().is_empty());

        let item = router.get("home.item").unwrap();
        assert_eq!(item.data["title"], "Home");
        assert!(router.get("search").unwrap().param("q").unwrap().dynamic);
        assert_eq!(router.href("home.item", ParamValues::new()).as_deref(), Some("#/item"));
        assert_eq!(router.href("home.item", params! { "id" => 4 }).as_deref(), Some("#/item/4"));
        assert_eq!(router.get("search").unwrap().views[0].target(), "main@");
    }

    #[test]
    fn document_resolvables_are_available_after_navigation() {
        let router = Router::new().unwrap();
        load_states(&router, DOCUMENT).unwrap();
        block_on(router.go("home.item", params! { "id" => 2 })).unwrap();

        let transition = router.last_success().unwrap();
        let value = transition.context().value("pageSize", None).unwrap();
        assert_eq!(*downcast::<Value>("pageSize", &value).unwrap(), serde_json::json!(20));
    }

    #[test]
    fn bare_param_values_are_defaults() {
        let docs = parse_states(r#"[{ "name": "a", "params": { "x": [1, "two"], "y": { "value": null, "array": "auto" } } }]"#)
            .unwrap();
        let decl = docs[0].to_declaration(None).unwrap();
        assert_eq!(decl.params.len(), 2);
        assert!(matches!(docs[0].params["x"], ParamDocument::Default(_)));
        assert_eq!(decl.params["y"].array, Some(ArrayMode::Auto));
    }

    #[test]
    fn malformed_documents_are_rejected() {
        let router = Router::new().unwrap();
        assert!(matches!(load_states(&router, "{ not json"), Err(ConfigError::InvalidDocument(_))));
        assert!(matches!(
            load_states(&router, r#"[{ "name": "a", "resolvePolicy": "sometimes" }]"#),
            Err(ConfigError::InvalidDocument(_))
        ));
        assert!(matches!(
            load_states(&router, r#"[{ "name": "b", "params": { "x": { "array": 3 } } }]"#),
            Err(ConfigError::InvalidDocument(_))
        ));
        assert!(matches!(
            load_states(&router, r#"[{ "name": "c", "params": { "x": { "squash": 3 } } }]"#),
            Err(ConfigError::InvalidSquash(_))
        ));
    }

    #[test]
    fn params_parse_from_json_objects() {
        let params = json_params(r#"{ "id": 5, "tags": ["a", "b"], "q": "x", "meta": { "k": 1 } }"#).unwrap();
        assert_eq!(params.get("id"), Some(&ParamValue::Int(5)));
        assert_eq!(params.get("tags"), Some(&ParamValue::from(vec!["a", "b"])));
        assert_eq!(params.get("q"), Some(&ParamValue::from("x")));
        assert!(matches!(params.get("meta"), Some(ParamValue::Json(_))));
        assert!(json_params("[1]").is_err());
    }
}
