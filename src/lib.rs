extern crate self as treeroute;

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;

#[macro_use]
mod macros;
mod api;
mod error;
mod injector;
mod loader;
mod params;
mod resolve;
mod router;
mod state;
mod transition;
mod url;

pub use api::{HrefOptions, Navigation, Router, RouterConfig};
pub use error::{ConfigError, RouteError, SharedError};
pub use injector::{AnyValue, Injector, any_value, downcast};
pub use loader::{
    ParamDocument, ParamSpec, StateDocument, ViewDocument, json_param, json_params, load_states, parse_states,
};
pub use params::{
    ArrayMode, DefaultValue, EncodedValue, Param, ParamDeclaration, ParamLocation, ParamType, ParamTypeDefinition,
    ParamTypes, Replacement, Squash, ValueType,
};
pub use resolve::{
    LocalProvider, ResolveArgs, ResolveContext, ResolveFn, ResolveFuture, ResolvePolicy, Resolvable,
};
pub use router::{ErrorHandler, ParamsListener, ParamsListenerRegistration};
pub use state::{
    FieldChain, Glob, State, StateBuilder, StateDeclaration, StateDraft, StateRef, StateRegistration, StateRegistry,
    TargetState, ViewConfig, ViewDeclaration, ViewPort, ViewPortRegistration, ViewService,
};
pub use transition::{
    HookContext, HookCriteria, HookFn, HookKind, HookMatch, HookOptions, HookRegistration, HookResult, InvalidHookFn,
    LocationOption, PathNode, PhaseMetrics, Reload, RejectType, Rejection, StateMatcher, Transition,
    TransitionMetrics, TransitionOptions, TransitionSource, TreeChanges, TreeSets, path_params,
};
pub use url::{
    Location, MemoryLocation, UrlConfig, UrlMatch, UrlMatcher, UrlMatcherFactory, UrlRouter, UrlRuleHandler,
    UrlRuleMatch, UrlRulePattern,
};

// --- Parameter values ---------------------------------------------------------

/// A decoded parameter value.
///
/// "Not provided" is modelled as `Option::None` at the call sites; `Null` is an
/// explicit null (for example an optional parameter cleared by the caller).
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Null,
    String(String),
    Int(i64),
    Bool(bool),
    Date(NaiveDate),
    Json(serde_json::Value),
    Array(Vec<ParamValue>),
}

impl ParamValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParamValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ParamValue::Null)
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Null => write!(f, "null"),
            ParamValue::String(s) => write!(f, "{s}"),
            ParamValue::Int(i) => write!(f, "{i}"),
            ParamValue::Bool(b) => write!(f, "{b}"),
            ParamValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            ParamValue::Json(v) => write!(f, "{v}"),
            ParamValue::Array(items) => {
                write!(f, "[")?;
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::String(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::String(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        ParamValue::Int(i64::from(value))
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl From<NaiveDate> for ParamValue {
    fn from(value: NaiveDate) -> Self {
        ParamValue::Date(value)
    }
}

impl From<serde_json::Value> for ParamValue {
    fn from(value: serde_json::Value) -> Self {
        ParamValue::Json(value)
    }
}

impl<T: Into<ParamValue>> From<Vec<T>> for ParamValue {
    fn from(values: Vec<T>) -> Self {
        ParamValue::Array(values.into_iter().map(Into::into).collect())
    }
}

/// Parameter values keyed by parameter id.
///
/// Ordered by key so formatted output and debug dumps are deterministic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamValues {
    values: BTreeMap<String, ParamValue>,
}

impl ParamValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&ParamValue> {
        self.values.get(id)
    }

    pub fn insert(&mut self, id: impl Into<String>, value: ParamValue) -> Option<ParamValue> {
        self.values.insert(id.into(), value)
    }

    pub fn remove(&mut self, id: &str) -> Option<ParamValue> {
        self.values.remove(id)
    }

    pub fn contains_key(&self, id: &str) -> bool {
        self.values.contains_key(id)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.values.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Copy every entry of `other` over `self`.
    pub fn extend_from(&mut self, other: &ParamValues) {
        for (k, v) in other.iter() {
            self.values.insert(k.clone(), v.clone());
        }
    }

    /// Return a copy restricted to `keys`.
    pub fn pick<'a>(&self, keys: impl IntoIterator<Item = &'a str>) -> ParamValues {
        let mut out = ParamValues::new();
        for key in keys {
            if let Some(v) = self.values.get(key) {
                out.insert(key, v.clone());
            }
        }
        out
    }

    /// Return a copy without `keys`.
    pub fn omit<'a>(&self, keys: impl IntoIterator<Item = &'a str>) -> ParamValues {
        let mut out = self.clone();
        for key in keys {
            out.values.remove(key);
        }
        out
    }
}

impl FromIterator<(String, ParamValue)> for ParamValues {
    fn from_iter<I: IntoIterator<Item = (String, ParamValue)>>(iter: I) -> Self {
        ParamValues { values: iter.into_iter().collect() }
    }
}

impl IntoIterator for ParamValues {
    type Item = (String, ParamValue);
    type IntoIter = std::collections::btree_map::IntoIter<String, ParamValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}

impl fmt::Display for ParamValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (idx, (k, v)) in self.values.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{k}: {v}")?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_macro_builds_typed_values() {
        let p = params! { "id" => 7, "tags" => vec!["a", "b"], "flag" => true };
        assert_eq!(p.get("id"), Some(&ParamValue::Int(7)));
        assert_eq!(
            p.get("tags"),
            Some(&ParamValue::Array(vec![ParamValue::from("a"), ParamValue::from("b")]))
        );
        assert_eq!(p.get("flag"), Some(&ParamValue::Bool(true)));
        assert_eq!(p.to_string(), "{flag: true, id: 7, tags: [a, b]}");
    }

    #[test]
    fn pick_and_omit_are_complementary() {
        let p = params! { "a" => 1, "b" => 2, "c" => 3 };
        let picked = p.pick(["a", "c"]);
        let omitted = p.omit(["a", "c"]);
        assert_eq!(picked.len(), 2);
        assert_eq!(omitted.keys().collect::<Vec<_>>(), vec!["b"]);
    }
}
