use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::rc::Rc;

use chrono::NaiveDate;
use regex::Captures;

use super::types::{ParamType, ParamTypeDefinition};
use crate::ParamValue;
use crate::error::ConfigError;
use crate::injector::Injector;

type DeferredDefinition = Box<dyn FnOnce(&Injector) -> ParamTypeDefinition>;

/// Registry of named parameter types.
///
/// Starts with the built-in types. Definitions that need runtime services can
/// be queued with [`define_deferred`](Self::define_deferred) and are compiled
/// by [`flush`](Self::flush) once an [`Injector`] is available.
pub struct ParamTypes {
    types: HashMap<String, Rc<ParamType>>,
    pending: VecDeque<(String, DeferredDefinition)>,
}

impl Default for ParamTypes {
    fn default() -> Self {
        Self::new()
    }
}

impl ParamTypes {
    pub fn new() -> Self {
        let mut types = HashMap::new();
        for (name, def) in builtin_types() {
            // Built-in patterns are literals; a failure here is a bug in this file.
            if let Ok(t) = ParamType::new(name, def) {
                types.insert(name.to_string(), Rc::new(t));
            }
        }
        ParamTypes { types, pending: VecDeque::new() }
    }

    /// Register a new type. Names must be identifiers and may not shadow an
    /// existing or queued type.
    pub fn define(&mut self, name: &str, def: ParamTypeDefinition) -> Result<Rc<ParamType>, ConfigError> {
        self.check_name(name)?;
        let t = Rc::new(ParamType::new(name, def)?);
        self.types.insert(name.to_string(), t.clone());
        tracing::trace!(type_name = name, "param type defined");
        Ok(t)
    }

    /// Queue a definition that is built from injected services on the next
    /// [`flush`](Self::flush).
    pub fn define_deferred(
        &mut self,
        name: &str,
        def: impl FnOnce(&Injector) -> ParamTypeDefinition + 'static,
    ) -> Result<(), ConfigError> {
        self.check_name(name)?;
        self.pending.push_back((name.to_string(), Box::new(def)));
        Ok(())
    }

    /// Build every queued definition. Returns how many types were added.
    pub fn flush(&mut self, injector: &Injector) -> Result<usize, ConfigError> {
        let mut added = 0;
        while let Some((name, def)) = self.pending.pop_front() {
            let t = ParamType::new(name.as_str(), def(injector))?;
            self.types.insert(name, Rc::new(t));
            added += 1;
        }
        Ok(added)
    }

    pub fn get(&self, name: &str) -> Option<Rc<ParamType>> {
        self.types.get(name).cloned()
    }

    pub fn type_of(&self, name: &str) -> Result<Rc<ParamType>, ConfigError> {
        self.get(name).ok_or_else(|| {
            if self.is_pending(name) {
                tracing::debug!(type_name = name, "param type requested before flush");
            }
            ConfigError::UnknownType(name.to_string())
        })
    }

    pub fn is_pending(&self, name: &str) -> bool {
        self.pending.iter().any(|(n, _)| n == name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.types.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    fn check_name(&self, name: &str) -> Result<(), ConfigError> {
        if !regex!(r"^[A-Za-z_][A-Za-z0-9_]*$").is_match(name) {
            return Err(ConfigError::InvalidTypeName(name.to_string()));
        }
        if self.types.contains_key(name) || self.is_pending(name) {
            return Err(ConfigError::DuplicateType(name.to_string()));
        }
        Ok(())
    }
}

impl fmt::Debug for ParamTypes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParamTypes").field("types", &self.names()).field("pending", &self.pending.len()).finish()
    }
}

fn is_string(v: &ParamValue) -> bool {
    matches!(v, ParamValue::String(_))
}

fn escape_slashes(s: &str) -> String {
    regex!("~|/").replace_all(s, |c: &Captures| if &c[0] == "~" { "~~" } else { "~2F" }).into_owned()
}

fn unescape_slashes(s: &str) -> String {
    regex!("~~|~2F").replace_all(s, |c: &Captures| if &c[0] == "~~" { "~" } else { "/" }).into_owned()
}

fn builtin_types() -> Vec<(&'static str, ParamTypeDefinition)> {
    let text = || ParamTypeDefinition::new().is(is_string);

    vec![
        (
            "string",
            text()
                .pattern("[^/]*")
                .encode(|v| v.as_str().map(escape_slashes))
                .decode(|s| Some(ParamValue::String(unescape_slashes(s)))),
        ),
        ("query", text()),
        ("path", text().pattern(".*")),
        ("hash", text().inherit(false)),
        (
            "int",
            ParamTypeDefinition::new()
                .pattern(r"-?\d+")
                .is(|v| matches!(v, ParamValue::Int(_)))
                .decode(|s| s.parse::<i64>().ok().map(ParamValue::Int)),
        ),
        (
            "bool",
            ParamTypeDefinition::new()
                .pattern("0|1")
                .is(|v| matches!(v, ParamValue::Bool(_)))
                .encode(|v| match v {
                    ParamValue::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
                    _ => None,
                })
                .decode(|s| s.parse::<i64>().ok().map(|n| ParamValue::Bool(n != 0))),
        ),
        (
            "date",
            ParamTypeDefinition::new()
                .pattern(r"[0-9]{4}-(?:0[1-9]|1[0-2])-(?:0[1-9]|[1-2][0-9]|3[0-1])")
                .is(|v| matches!(v, ParamValue::Date(_)))
                .decode(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok().map(ParamValue::Date)),
        ),
        (
            "json",
            ParamTypeDefinition::new()
                .pattern("[^/]*")
                .is(|v| matches!(v, ParamValue::Json(_)))
                .encode(|v| match v {
                    ParamValue::Json(j) => serde_json::to_string(j).ok(),
                    _ => None,
                })
                .decode(|s| serde_json::from_str(s).ok().map(ParamValue::Json)),
        ),
        ("any", ParamTypeDefinition::new().decode(|s| Some(ParamValue::from(s)))),
    ]
}
