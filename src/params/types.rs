//! Parameter codecs.
//!
//! A [`ParamType`] is a named codec with four operations:
//!
//! ```text
//! is(value)      -> bool          is this already a decoded value of the type?
//! encode(value)  -> Option<str>   value -> URL string (None for null)
//! decode(str)    -> Option<value> URL string -> value (None when malformed)
//! equals(a, b)   -> bool          type-aware equality
//! ```
//!
//! plus a `pattern` that every encoded string must fully match. The round-trip
//! law `decode(encode(x)) == x` holds for every `x` with `is(x)`.
//!
//! [`ValueType`] lifts a base type over sequences. `ArrayMode::Auto` keeps
//! single values scalar, which is how search parameters behave when they may
//! appear once or many times in a query string.

use std::fmt;
use std::rc::Rc;

use regex::Regex;

use crate::ParamValue;
use crate::error::ConfigError;

pub(crate) type IsFn = Rc<dyn Fn(&ParamValue) -> bool>;
pub(crate) type EncodeFn = Rc<dyn Fn(&ParamValue) -> Option<String>>;
pub(crate) type DecodeFn = Rc<dyn Fn(&str) -> Option<ParamValue>>;
pub(crate) type EqualsFn = Rc<dyn Fn(&ParamValue, &ParamValue) -> bool>;

/// The user-facing description of a parameter type, consumed by
/// [`ParamTypes::define`](crate::ParamTypes::define).
///
/// Every operation is optional; missing ones fall back to "accept anything",
/// `Display`-based encoding, string decoding and structural equality.
#[derive(Clone, Default)]
pub struct ParamTypeDefinition {
    pub(crate) pattern: Option<String>,
    pub(crate) is: Option<IsFn>,
    pub(crate) encode: Option<EncodeFn>,
    pub(crate) decode: Option<DecodeFn>,
    pub(crate) equals: Option<EqualsFn>,
    pub(crate) raw: bool,
    pub(crate) dynamic: bool,
    pub(crate) inherit: Option<bool>,
}

impl ParamTypeDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    /// Regular expression (unanchored source) that encoded values must match.
    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    pub fn is(mut self, f: impl Fn(&ParamValue) -> bool + 'static) -> Self {
        self.is = Some(Rc::new(f));
        self
    }

    pub fn encode(mut self, f: impl Fn(&ParamValue) -> Option<String> + 'static) -> Self {
        self.encode = Some(Rc::new(f));
        self
    }

    pub fn decode(mut self, f: impl Fn(&str) -> Option<ParamValue> + 'static) -> Self {
        self.decode = Some(Rc::new(f));
        self
    }

    pub fn equals(mut self, f: impl Fn(&ParamValue, &ParamValue) -> bool + 'static) -> Self {
        self.equals = Some(Rc::new(f));
        self
    }

    /// Raw types are not percent-encoded when formatting URLs.
    pub fn raw(mut self, raw: bool) -> Self {
        self.raw = raw;
        self
    }

    /// Parameters of a dynamic type do not force their state to be re-entered.
    pub fn dynamic(mut self, dynamic: bool) -> Self {
        self.dynamic = dynamic;
        self
    }

    /// Whether values of this type are inherited by default (`inherit: true`).
    pub fn inherit(mut self, inherit: bool) -> Self {
        self.inherit = Some(inherit);
        self
    }
}

/// A named, compiled parameter codec.
#[derive(Clone)]
pub struct ParamType {
    name: String,
    source: String,
    anchored: Regex,
    is: IsFn,
    encode: EncodeFn,
    decode: DecodeFn,
    equals: EqualsFn,
    raw: bool,
    dynamic: bool,
    inherit: bool,
}

impl ParamType {
    pub fn new(name: impl Into<String>, def: ParamTypeDefinition) -> Result<Self, ConfigError> {
        let source = def.pattern.unwrap_or_else(|| ".*".to_string());
        let anchored = compile_anchored(&source, false)?;

        Ok(ParamType {
            name: name.into(),
            source,
            anchored,
            is: def.is.unwrap_or_else(|| Rc::new(|_| true)),
            encode: def.encode.unwrap_or_else(|| Rc::new(|v| Some(v.to_string()))),
            decode: def.decode.unwrap_or_else(|| Rc::new(|s| Some(ParamValue::String(s.to_string())))),
            equals: def.equals.unwrap_or_else(|| Rc::new(|a, b| a == b)),
            raw: def.raw,
            dynamic: def.dynamic,
            inherit: def.inherit.unwrap_or(true),
        })
    }

    /// Copy of this type with a different pattern (used for `{id:[a-z]+}`
    /// placeholders that carry their own regular expression).
    pub fn with_pattern(&self, source: &str, case_insensitive: bool) -> Result<ParamType, ConfigError> {
        let mut copy = self.clone();
        copy.anchored = compile_anchored(source, case_insensitive)?;
        copy.source = source.to_string();
        Ok(copy)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The unanchored pattern source, embedded into compiled URL regexes.
    pub fn pattern(&self) -> &str {
        &self.source
    }

    pub fn is_raw(&self) -> bool {
        self.raw
    }

    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    pub fn inherits(&self) -> bool {
        self.inherit
    }

    pub fn is(&self, value: &ParamValue) -> bool {
        (self.is)(value)
    }

    pub fn encode(&self, value: &ParamValue) -> Option<String> {
        if value.is_null() {
            return None;
        }
        (self.encode)(value)
    }

    pub fn decode(&self, encoded: &str) -> Option<ParamValue> {
        (self.decode)(encoded)
    }

    pub fn equals(&self, a: &ParamValue, b: &ParamValue) -> bool {
        (self.equals)(a, b)
    }

    /// True when an encoded string fully matches the type's pattern.
    pub fn matches_pattern(&self, encoded: &str) -> bool {
        self.anchored.is_match(encoded)
    }

    /// Turn a raw value into a value of this type when possible.
    ///
    /// Values that already satisfy `is` pass through. Strings are decoded.
    /// Other scalars are rendered and decoded so `Int(5)` can feed a string
    /// parameter. Anything else is returned unchanged and fails validation
    /// later.
    pub fn normalize(&self, value: ParamValue) -> ParamValue {
        if self.is(&value) {
            return value;
        }
        match &value {
            ParamValue::String(s) => self.decode(s).unwrap_or(value),
            ParamValue::Int(_) | ParamValue::Bool(_) | ParamValue::Date(_) => {
                self.decode(&value.to_string()).filter(|decoded| self.is(decoded)).unwrap_or(value)
            }
            _ => value,
        }
    }
}

impl fmt::Debug for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParamType")
            .field("name", &self.name)
            .field("pattern", &self.source)
            .field("raw", &self.raw)
            .field("dynamic", &self.dynamic)
            .finish()
    }
}

fn compile_anchored(source: &str, case_insensitive: bool) -> Result<Regex, ConfigError> {
    let flags = if case_insensitive { "(?i)" } else { "" };
    Regex::new(&format!("{flags}^(?:{source})$"))
        .map_err(|e| ConfigError::InvalidPattern { pattern: source.to_string(), reason: e.to_string() })
}

/// How a parameter treats multiple values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayMode {
    /// A single scalar value.
    Off,
    /// Always a list.
    On,
    /// A list when there are several values, a scalar for exactly one.
    Auto,
}

/// The encoded form of a parameter value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodedValue {
    Missing,
    One(String),
    Many(Vec<String>),
}

impl EncodedValue {
    /// Iterate every encoded string.
    pub fn strings(&self) -> Vec<&str> {
        match self {
            EncodedValue::Missing => Vec::new(),
            EncodedValue::One(s) => vec![s.as_str()],
            EncodedValue::Many(items) => items.iter().map(String::as_str).collect(),
        }
    }
}

/// A base [`ParamType`] combined with an [`ArrayMode`].
#[derive(Clone)]
pub struct ValueType {
    base: Rc<ParamType>,
    array: ArrayMode,
}

impl ValueType {
    pub fn scalar(base: Rc<ParamType>) -> Self {
        ValueType { base, array: ArrayMode::Off }
    }

    pub fn array(base: Rc<ParamType>, mode: ArrayMode) -> Self {
        ValueType { base, array: mode }
    }

    pub fn base(&self) -> &ParamType {
        &self.base
    }

    pub fn array_mode(&self) -> ArrayMode {
        self.array
    }

    pub fn is_array(&self) -> bool {
        self.array != ArrayMode::Off
    }

    pub fn name(&self) -> String {
        match self.array {
            ArrayMode::Off => self.base.name().to_string(),
            _ => format!("{}[]", self.base.name()),
        }
    }

    pub fn is(&self, value: &ParamValue) -> bool {
        match (self.array, value) {
            (ArrayMode::Off, v) => self.base.is(v),
            (_, ParamValue::Array(items)) => items.iter().all(|item| self.base.is(item)),
            (ArrayMode::On, _) => false,
            (ArrayMode::Auto, v) => self.base.is(v),
        }
    }

    pub fn normalize(&self, value: ParamValue) -> ParamValue {
        if self.array == ArrayMode::Off {
            return self.base.normalize(value);
        }

        let items = match value {
            ParamValue::Array(items) => items,
            ParamValue::Null => Vec::new(),
            other => vec![other],
        };
        let mut normalized: Vec<ParamValue> = items.into_iter().map(|item| self.base.normalize(item)).collect();

        match (self.array, normalized.len()) {
            (ArrayMode::Auto, 0) => ParamValue::Null,
            (ArrayMode::Auto, 1) => normalized.pop().unwrap_or(ParamValue::Null),
            _ => ParamValue::Array(normalized),
        }
    }

    pub fn encode(&self, value: &ParamValue) -> EncodedValue {
        if self.array == ArrayMode::Off {
            return self.base.encode(value).map(EncodedValue::One).unwrap_or(EncodedValue::Missing);
        }

        let items: Vec<String> = as_list(value).iter().filter_map(|item| self.base.encode(item)).collect();
        if self.array == ArrayMode::Auto && items.len() == 1 {
            items.into_iter().next().map(EncodedValue::One).unwrap_or(EncodedValue::Missing)
        } else {
            EncodedValue::Many(items)
        }
    }

    pub fn equals(&self, a: &ParamValue, b: &ParamValue) -> bool {
        if self.array == ArrayMode::Off {
            return self.base.equals(a, b);
        }
        let left = as_list(a);
        let right = as_list(b);
        left.len() == right.len() && left.iter().zip(right.iter()).all(|(l, r)| self.base.equals(l, r))
    }
}

impl fmt::Debug for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ValueType({})", self.name())
    }
}

fn as_list(value: &ParamValue) -> Vec<ParamValue> {
    match value {
        ParamValue::Array(items) => items.clone(),
        ParamValue::Null => Vec::new(),
        other => vec![other.clone()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upper() -> Rc<ParamType> {
        let def = ParamTypeDefinition::new()
            .pattern("[A-Z]+")
            .is(|v| matches!(v, ParamValue::String(s) if s.chars().all(|c| c.is_ascii_uppercase())))
            .decode(|s| Some(ParamValue::String(s.to_uppercase())));
        Rc::new(ParamType::new("upper", def).unwrap())
    }

    #[test]
    fn normalize_decodes_strings_that_fail_is() {
        let t = upper();
        assert_eq!(t.normalize(ParamValue::from("abc")), ParamValue::from("ABC"));
        assert_eq!(t.normalize(ParamValue::from("XYZ")), ParamValue::from("XYZ"));
    }

    #[test]
    fn pattern_is_anchored() {
        let t = upper();
        assert!(t.matches_pattern("ABC"));
        assert!(!t.matches_pattern("ABC1"));
        let loose = t.with_pattern("[A-Z]+\\d?", false).unwrap();
        assert!(loose.matches_pattern("ABC1"));
    }

    #[test]
    fn invalid_pattern_is_a_config_error() {
        let err = ParamType::new("bad", ParamTypeDefinition::new().pattern("(")).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPattern { .. }));
    }

    #[test]
    fn auto_arrays_collapse_single_values() {
        let vt = ValueType::array(upper(), ArrayMode::Auto);
        assert_eq!(vt.normalize(ParamValue::from(vec!["a"])), ParamValue::from("A"));
        assert_eq!(vt.normalize(ParamValue::from(vec!["a", "b"])), ParamValue::from(vec!["A", "B"]));
        assert_eq!(vt.normalize(ParamValue::Array(Vec::new())), ParamValue::Null);
        assert_eq!(vt.encode(&ParamValue::from("A")), EncodedValue::One("A".into()));
    }

    #[test]
    fn strict_arrays_always_wrap() {
        let vt = ValueType::array(upper(), ArrayMode::On);
        assert_eq!(vt.normalize(ParamValue::from("a")), ParamValue::from(vec!["A"]));
        assert!(!vt.is(&ParamValue::from("A")));
        assert!(vt.is(&ParamValue::from(vec!["A", "B"])));
        assert_eq!(vt.encode(&ParamValue::from(vec!["A"])), EncodedValue::Many(vec!["A".into()]));
    }

    #[test]
    fn array_equality_is_element_wise() {
        let vt = ValueType::array(upper(), ArrayMode::On);
        assert!(vt.equals(&ParamValue::from(vec!["A", "B"]), &ParamValue::from(vec!["A", "B"])));
        assert!(!vt.equals(&ParamValue::from(vec!["A", "B"]), &ParamValue::from(vec!["B", "A"])));
        assert!(!vt.equals(&ParamValue::from(vec!["A"]), &ParamValue::from(vec!["A", "A"])));
    }
}
