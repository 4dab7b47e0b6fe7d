use std::fmt;
use std::rc::Rc;

use serde_json::Value;

use super::registry::ParamTypes;
use super::types::{ArrayMode, EncodedValue, ParamType, ValueType};
use crate::error::ConfigError;
use crate::{ParamValue, ParamValues};

/// Where a parameter lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamLocation {
    /// A placeholder in the URL path.
    Path,
    /// A query-string parameter.
    Search,
    /// Declared on the state only; never appears in a URL.
    Config,
}

/// How a default value is omitted from a generated URL.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Squash {
    /// Always render the value.
    #[default]
    Disabled,
    /// Drop the value together with one adjacent slash.
    Slash,
    /// Render this string instead of the value.
    Replace(String),
}

impl Squash {
    /// Read a squash policy from JSON (`false`, `true` or a string).
    pub fn from_json(value: &Value) -> Result<Squash, ConfigError> {
        match value {
            Value::Bool(false) => Ok(Squash::Disabled),
            Value::Bool(true) => Ok(Squash::Slash),
            Value::String(s) => Ok(Squash::Replace(s.clone())),
            other => Err(ConfigError::InvalidSquash(other.to_string())),
        }
    }
}

/// A value substitution applied to raw input before decoding.
///
/// `None` stands for "not provided".
#[derive(Debug, Clone, PartialEq)]
pub struct Replacement {
    pub from: Option<ParamValue>,
    pub to: Option<ParamValue>,
}

impl Replacement {
    pub fn new(from: Option<ParamValue>, to: Option<ParamValue>) -> Self {
        Replacement { from, to }
    }
}

/// A parameter default: either a fixed value or a provider invoked on demand.
#[derive(Clone)]
pub enum DefaultValue {
    Static(ParamValue),
    Provider(Rc<dyn Fn() -> Option<ParamValue>>),
}

impl DefaultValue {
    pub fn provider(f: impl Fn() -> Option<ParamValue> + 'static) -> Self {
        DefaultValue::Provider(Rc::new(f))
    }

    fn get(&self) -> Option<ParamValue> {
        match self {
            DefaultValue::Static(v) => Some(v.clone()),
            DefaultValue::Provider(f) => f(),
        }
    }
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultValue::Static(v) => write!(f, "Static({v})"),
            DefaultValue::Provider(_) => write!(f, "Provider(..)"),
        }
    }
}

/// The declared configuration of one parameter, as written on a state.
///
/// Every field is optional; unset fields are derived from the location and the
/// parameter type when the [`Param`] is built.
#[derive(Debug, Clone, Default)]
pub struct ParamDeclaration {
    pub value: Option<DefaultValue>,
    pub type_name: Option<String>,
    pub array: Option<ArrayMode>,
    pub squash: Option<Squash>,
    pub replace: Vec<Replacement>,
    pub dynamic: Option<bool>,
    pub raw: Option<bool>,
    pub inherit: Option<bool>,
}

impl ParamDeclaration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shorthand for a declaration that only carries a default value.
    pub fn with_default(value: impl Into<ParamValue>) -> Self {
        ParamDeclaration::new().default_value(value)
    }

    pub fn default_value(mut self, value: impl Into<ParamValue>) -> Self {
        self.value = Some(DefaultValue::Static(value.into()));
        self
    }

    pub fn default_fn(mut self, f: impl Fn() -> Option<ParamValue> + 'static) -> Self {
        self.value = Some(DefaultValue::provider(f));
        self
    }

    pub fn type_name(mut self, name: impl Into<String>) -> Self {
        self.type_name = Some(name.into());
        self
    }

    pub fn array(mut self, mode: ArrayMode) -> Self {
        self.array = Some(mode);
        self
    }

    pub fn squash(mut self, squash: Squash) -> Self {
        self.squash = Some(squash);
        self
    }

    pub fn replace(mut self, from: Option<ParamValue>, to: Option<ParamValue>) -> Self {
        self.replace.push(Replacement::new(from, to));
        self
    }

    pub fn dynamic(mut self, dynamic: bool) -> Self {
        self.dynamic = Some(dynamic);
        self
    }

    pub fn raw(mut self, raw: bool) -> Self {
        self.raw = Some(raw);
        self
    }

    pub fn inherit(mut self, inherit: bool) -> Self {
        self.inherit = Some(inherit);
        self
    }
}

/// A fully configured parameter.
#[derive(Clone)]
pub struct Param {
    pub id: String,
    pub location: ParamLocation,
    pub value_type: ValueType,
    pub default: Option<DefaultValue>,
    pub squash: Squash,
    pub replace: Vec<Replacement>,
    pub dynamic: bool,
    pub raw: bool,
    pub inherit: bool,
    pub optional: bool,
}

impl Param {
    /// Build a parameter from its declaration.
    pub fn new(
        id: &str,
        location: ParamLocation,
        decl: &ParamDeclaration,
        types: &ParamTypes,
        default_squash: &Squash,
    ) -> Result<Param, ConfigError> {
        Param::build(id, location, None, false, decl, types, default_squash)
    }

    /// Build a parameter discovered in a URL pattern. `url_type` is set when
    /// the placeholder names a type or carries its own regexp; `url_array`
    /// when the name had a `[]` suffix.
    pub(crate) fn build(
        id: &str,
        location: ParamLocation,
        url_type: Option<Rc<ParamType>>,
        url_array: bool,
        decl: &ParamDeclaration,
        types: &ParamTypes,
        default_squash: &Squash,
    ) -> Result<Param, ConfigError> {
        let base = match (&decl.type_name, url_type) {
            (_, Some(url)) => url,
            (Some(name), None) => types.type_of(name)?,
            (None, None) => types.type_of(match location {
                ParamLocation::Path => "string",
                ParamLocation::Search => "query",
                ParamLocation::Config => "any",
            })?,
        };

        let array = decl.array.unwrap_or(if url_array {
            ArrayMode::On
        } else if location == ParamLocation::Search {
            ArrayMode::Auto
        } else {
            ArrayMode::Off
        });
        let value_type = match array {
            ArrayMode::Off => ValueType::scalar(base.clone()),
            mode => ValueType::array(base.clone(), mode),
        };

        let optional = decl.value.is_some() || location == ParamLocation::Search;
        let squash = match (&decl.squash, optional) {
            (_, false) | (Some(Squash::Disabled), _) => Squash::Disabled,
            (Some(policy), true) => policy.clone(),
            (None, true) => default_squash.clone(),
        };
        let replace = replacements(&decl.replace, array, optional, &squash);

        if let Some(DefaultValue::Static(value)) = &decl.value {
            let normalized = value_type.normalize(value.clone());
            if !value.is_null() && !value_type.is(&normalized) {
                return Err(ConfigError::InvalidDefault { param: id.to_string(), type_name: value_type.name() });
            }
        }

        Ok(Param {
            id: id.to_string(),
            location,
            default: decl.value.clone(),
            squash,
            replace,
            dynamic: decl.dynamic.unwrap_or_else(|| base.is_dynamic()),
            raw: decl.raw.unwrap_or_else(|| base.is_raw()),
            inherit: decl.inherit.unwrap_or_else(|| base.inherits()),
            optional,
            value_type,
        })
    }

    pub fn is_search(&self) -> bool {
        self.location == ParamLocation::Search
    }

    pub fn type_name(&self) -> String {
        self.value_type.name()
    }

    /// Resolve a raw value: apply replacements, fall back to the default when
    /// absent, then normalize through the type.
    pub fn value(&self, raw: Option<&ParamValue>) -> Option<ParamValue> {
        let replaced = self.replace.iter().find(|r| r.from.as_ref() == raw).map(|r| r.to.clone());
        let value = match replaced {
            Some(to) => to,
            None => raw.cloned(),
        };

        match value {
            None => self.default.as_ref().and_then(DefaultValue::get).map(|v| self.value_type.normalize(v)),
            Some(v) => Some(self.value_type.normalize(v)),
        }
    }

    /// True when `value` equals this parameter's (optional) default.
    pub fn is_default_value(&self, value: Option<&ParamValue>) -> bool {
        self.optional && self.equals(self.value(None).as_ref(), value)
    }

    /// Type-aware equality where "absent" and `Null` are the same.
    pub fn equals(&self, a: Option<&ParamValue>, b: Option<&ParamValue>) -> bool {
        match (non_null(a), non_null(b)) {
            (None, None) => true,
            (Some(a), Some(b)) => self.value_type.equals(a, b),
            _ => false,
        }
    }

    pub fn validates(&self, value: Option<&ParamValue>) -> bool {
        let Some(value) = non_null(value) else {
            return self.optional;
        };
        let normalized = self.value_type.normalize(value.clone());
        if !self.value_type.is(&normalized) {
            return false;
        }
        let base = self.value_type.base();
        self.value_type.encode(&normalized).strings().into_iter().all(|s| base.matches_pattern(s))
    }

    pub fn encode(&self, value: &ParamValue) -> EncodedValue {
        self.value_type.encode(value)
    }
}

impl fmt::Debug for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Param")
            .field("id", &self.id)
            .field("location", &self.location)
            .field("type", &self.value_type.name())
            .field("optional", &self.optional)
            .field("dynamic", &self.dynamic)
            .field("squash", &self.squash)
            .finish()
    }
}

fn non_null(value: Option<&ParamValue>) -> Option<&ParamValue> {
    value.filter(|v| !v.is_null())
}

fn replacements(configured: &[Replacement], array: ArrayMode, optional: bool, squash: &Squash) -> Vec<Replacement> {
    let blank = if optional || array != ArrayMode::Off { None } else { Some(ParamValue::from("")) };
    let mut replace = configured.to_vec();
    if let Squash::Replace(s) = squash {
        replace.push(Replacement::new(Some(ParamValue::from(s.as_str())), None));
    }

    let defaults = [
        Replacement::new(Some(ParamValue::from("")), blank.clone()),
        Replacement::new(Some(ParamValue::Null), blank),
    ];
    let mut out: Vec<Replacement> =
        defaults.into_iter().filter(|d| !replace.iter().any(|r| r.from == d.from)).collect();
    out.extend(replace);
    out
}

/// Resolve every parameter's value from `values` (absent ids use defaults).
pub(crate) fn param_values<'a>(params: impl IntoIterator<Item = &'a Param>, values: &ParamValues) -> ParamValues {
    let mut out = ParamValues::new();
    for param in params {
        if let Some(v) = param.value(values.get(&param.id)) {
            out.insert(param.id.clone(), v);
        }
    }
    out
}

/// Parameters whose values differ between `a` and `b`.
pub(crate) fn changed_params<'a>(
    params: impl IntoIterator<Item = &'a Param>,
    a: &ParamValues,
    b: &ParamValues,
) -> Vec<&'a Param> {
    params.into_iter().filter(|p| !p.equals(a.get(&p.id), b.get(&p.id))).collect()
}

pub(crate) fn params_equal<'a>(params: impl IntoIterator<Item = &'a Param>, a: &ParamValues, b: &ParamValues) -> bool {
    changed_params(params, a, b).is_empty()
}

pub(crate) fn params_validate<'a>(params: impl IntoIterator<Item = &'a Param>, values: &ParamValues) -> bool {
    params.into_iter().all(|p| p.validates(values.get(&p.id)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn types() -> ParamTypes {
        ParamTypes::new()
    }

    #[test]
    fn path_params_default_to_required_strings() {
        let p = Param::new("id", ParamLocation::Path, &ParamDeclaration::new(), &types(), &Squash::Disabled).unwrap();
        assert_eq!(p.type_name(), "string");
        assert!(!p.optional);
        assert!(!p.validates(None));
        assert!(p.validates(Some(&ParamValue::from("abc"))));
        assert_eq!(p.value(Some(&ParamValue::Null)), Some(ParamValue::from("")));
    }

    #[test]
    fn search_params_are_optional_auto_arrays() {
        let p = Param::new("q", ParamLocation::Search, &ParamDeclaration::new(), &types(), &Squash::Disabled).unwrap();
        assert!(p.optional);
        assert_eq!(p.value_type.array_mode(), ArrayMode::Auto);
        assert!(p.validates(None));
        assert_eq!(p.value(Some(&ParamValue::from(""))), None);
    }

    #[test]
    fn defaults_are_normalized_and_checked() {
        let decl = ParamDeclaration::with_default("7").type_name("int");
        let p = Param::new("page", ParamLocation::Config, &decl, &types(), &Squash::Disabled).unwrap();
        assert_eq!(p.value(None), Some(ParamValue::Int(7)));
        assert!(p.is_default_value(Some(&ParamValue::Int(7))));

        let bad = ParamDeclaration::with_default("seven").type_name("int");
        let err = Param::new("page", ParamLocation::Config, &bad, &types(), &Squash::Disabled).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidDefault { .. }));
    }

    #[test]
    fn default_providers_run_on_demand() {
        let decl = ParamDeclaration::new().type_name("int").default_fn(|| Some(ParamValue::Int(3)));
        let p = Param::new("n", ParamLocation::Config, &decl, &types(), &Squash::Disabled).unwrap();
        assert_eq!(p.value(None), Some(ParamValue::Int(3)));
        assert_eq!(p.value(Some(&ParamValue::from("9"))), Some(ParamValue::Int(9)));
    }

    #[test]
    fn squash_only_applies_to_optional_params() {
        let required = ParamDeclaration::new().squash(Squash::Slash);
        let p = Param::new("a", ParamLocation::Path, &required, &types(), &Squash::Disabled).unwrap();
        assert_eq!(p.squash, Squash::Disabled);

        let optional = ParamDeclaration::with_default("x");
        let p = Param::new("a", ParamLocation::Path, &optional, &types(), &Squash::Slash).unwrap();
        assert_eq!(p.squash, Squash::Slash);
    }

    #[test]
    fn string_squash_adds_a_replacement() {
        let decl = ParamDeclaration::with_default("home").squash(Squash::Replace("~".into()));
        let p = Param::new("tab", ParamLocation::Path, &decl, &types(), &Squash::Disabled).unwrap();
        assert_eq!(p.value(Some(&ParamValue::from("~"))), Some(ParamValue::from("home")));
    }

    #[test]
    fn squash_json_parsing() {
        assert_eq!(Squash::from_json(&Value::Bool(true)).unwrap(), Squash::Slash);
        assert_eq!(Squash::from_json(&Value::from("-")).unwrap(), Squash::Replace("-".into()));
        assert!(matches!(Squash::from_json(&Value::from(3)), Err(ConfigError::InvalidSquash(_))));
    }

    #[test]
    fn set_helpers_compare_by_type() {
        let t = types();
        let int = ParamDeclaration::new().type_name("int");
        let params = vec![
            Param::new("a", ParamLocation::Config, &int, &t, &Squash::Disabled).unwrap(),
            Param::new("b", ParamLocation::Config, &ParamDeclaration::with_default("x"), &t, &Squash::Disabled)
                .unwrap(),
        ];
        let one = param_values(&params, &params! { "a" => "5" });
        assert_eq!(one, params! { "a" => 5, "b" => "x" });

        let two = params! { "a" => 5, "b" => "y" };
        let changed: Vec<&str> = changed_params(&params, &one, &two).iter().map(|p| p.id.as_str()).collect();
        assert_eq!(changed, vec!["b"]);
        assert!(!params_equal(&params, &one, &two));
        assert!(params_validate(&params, &one));
        assert!(!params_validate(&params, &params! { "a" => "five" }));
    }
}
