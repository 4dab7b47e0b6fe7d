use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use regex::{Captures, Regex};

use super::factory::{UrlConfig, UrlMatcherFactory};
use crate::error::{ConfigError, RouteError};
use crate::params::{ArrayMode, EncodedValue, Param, ParamDeclaration, ParamLocation, ParamType, ParamTypes, Squash};
use crate::{ParamValue, ParamValues};

/// A compiled URL pattern.
///
/// Supported placeholders in the path part:
///
/// ```text
/// :name            string segment
/// *name            catch-all (may contain slashes)
/// {name}           string segment
/// {name:int}       named parameter type
/// {name:[0-9]+}    inline regular expression
/// name[]           array parameter (values joined with '-')
/// ```
///
/// Everything after the first `?` declares search parameters
/// (`?from&to` or `?{page:int}`).
#[derive(Clone)]
pub struct UrlMatcher {
    pattern: String,
    source_path: String,
    source_search: String,
    segments: Vec<String>,
    params: Vec<Param>,
    regex: Regex,
    decls: BTreeMap<String, ParamDeclaration>,
    factory: UrlMatcherFactory,
}

struct Placeholder {
    id: String,
    array: bool,
    url_type: Option<Rc<ParamType>>,
}

impl UrlMatcher {
    pub(crate) fn compile(
        pattern: &str,
        decls: BTreeMap<String, ParamDeclaration>,
        factory: UrlMatcherFactory,
    ) -> Result<UrlMatcher, ConfigError> {
        let placeholder = regex!(
            r"([:*])([\w\[\]]+)|\{([\w\[\]]+)(?::\s*((?:[^{}\\]+|\\.|\{(?:[^{}\\]+|\\.)*\})+))?\}"
        );
        let search_placeholder = regex!(
            r"([:]?)([\w\[\].-]+)|\{([\w\[\].-]+)(?::\s*((?:[^{}\\]+|\\.|\{(?:[^{}\\]+|\\.)*\})+))?\}"
        );

        let config = factory.config().clone();
        let types_cell = factory.types();
        let types = types_cell.borrow();

        let mut params: Vec<Param> = Vec::new();
        let mut segments = Vec::new();
        let mut compiled = String::from(if config.case_insensitive { "(?i)^" } else { "^" });
        let mut last = 0;

        for caps in placeholder.captures_iter(pattern) {
            let Some(whole) = caps.get(0) else { continue };
            let segment = &pattern[last..whole.start()];
            if segment.contains('?') {
                break;
            }

            let details = placeholder_details(&caps, false, &types, &config)?;
            check_param(&details, &params, pattern)?;
            let decl = decls.get(&details.id).cloned().unwrap_or_default();
            let param = Param::build(
                &details.id,
                ParamLocation::Path,
                details.url_type,
                details.array,
                &decl,
                &types,
                &config.default_squash_policy,
            )?;

            compiled.push_str(&quote_segment(segment, &param));
            segments.push(segment.to_string());
            params.push(param);
            last = whole.end();
        }

        let rest = &pattern[last..];
        let split = last + rest.find('?').unwrap_or(rest.len());
        let (source_path, source_search) = pattern.split_at(split);
        let tail = &pattern[last..split];

        for caps in search_placeholder.captures_iter(source_search) {
            let details = placeholder_details(&caps, true, &types, &config)?;
            check_param(&details, &params, pattern)?;
            let decl = decls.get(&details.id).cloned().unwrap_or_default();
            params.push(Param::build(
                &details.id,
                ParamLocation::Search,
                details.url_type,
                details.array,
                &decl,
                &types,
                &config.default_squash_policy,
            )?);
        }

        segments.push(tail.to_string());
        compiled.push_str(&regex::escape(tail));
        if !config.strict_mode {
            compiled.push_str("/?");
        }
        compiled.push('$');

        let regex = Regex::new(&compiled)
            .map_err(|e| ConfigError::InvalidPattern { pattern: pattern.to_string(), reason: e.to_string() })?;

        Ok(UrlMatcher {
            pattern: pattern.to_string(),
            source_path: source_path.to_string(),
            source_search: source_search.to_string(),
            segments,
            params,
            regex,
            decls,
            factory,
        })
    }

    /// Append `pattern` to this matcher's path, keeping this matcher's search
    /// parameters. Declarations in `decls` override inherited ones.
    pub fn concat(&self, pattern: &str, decls: &BTreeMap<String, ParamDeclaration>) -> Result<UrlMatcher, ConfigError> {
        let mut merged = self.decls.clone();
        merged.extend(decls.iter().map(|(k, v)| (k.clone(), v.clone())));
        UrlMatcher::compile(&format!("{}{}{}", self.source_path, pattern, self.source_search), merged, self.factory.clone())
    }

    /// Compile another pattern with the same configuration and type registry.
    pub(crate) fn sibling(&self, pattern: &str) -> Result<UrlMatcher, ConfigError> {
        UrlMatcher::compile(pattern, BTreeMap::new(), self.factory.clone())
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn source_path(&self) -> &str {
        &self.source_path
    }

    pub fn source_search(&self) -> &str {
        &self.source_search
    }

    /// Static text runs; there is always one more segment than path params.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    /// Path parameters in declaration order, followed by search parameters.
    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn param(&self, id: &str) -> Option<&Param> {
        self.params.iter().find(|p| p.id == id)
    }

    pub fn path_params(&self) -> impl Iterator<Item = &Param> {
        self.params.iter().filter(|p| p.location == ParamLocation::Path)
    }

    pub fn search_params(&self) -> impl Iterator<Item = &Param> {
        self.params.iter().filter(|p| p.location == ParamLocation::Search)
    }

    /// Match `path` and collect decoded values for every parameter.
    ///
    /// Returns `Ok(None)` when the path does not match. An error means the
    /// pattern itself is malformed (a custom regexp added capture groups).
    pub fn exec(&self, path: &str, search: &ParamValues, hash: Option<&str>) -> Result<Option<ParamValues>, RouteError> {
        let Some(caps) = self.regex.captures(path) else {
            return Ok(None);
        };

        let path_params: Vec<&Param> = self.path_params().collect();
        if caps.len() - 1 != path_params.len() {
            return Err(RouteError::UnbalancedCaptureGroups(self.pattern.clone()));
        }

        let mut values = ParamValues::new();
        for (idx, param) in path_params.iter().enumerate() {
            let array = param.value_type.array_mode() == ArrayMode::On;
            let raw = caps.get(idx + 1).map(|m| decode_path_value(m.as_str(), array));
            if let Some(v) = param.value(raw.as_ref()) {
                values.insert(param.id.clone(), v);
            }
        }

        for param in self.search_params() {
            if let Some(v) = param.value(search.get(&param.id)) {
                values.insert(param.id.clone(), v);
            }
        }

        if let Some(hash) = hash.filter(|h| !h.is_empty()) {
            values.insert("#", ParamValue::from(hash));
        }

        Ok(Some(values))
    }

    /// True when every parameter accepts its value in `values`.
    pub fn validates(&self, values: &ParamValues) -> bool {
        self.params.iter().all(|p| p.validates(p.value(values.get(&p.id)).as_ref()))
    }

    /// Build a URL from parameter values, or `None` when a value does not
    /// validate.
    pub fn format(&self, values: &ParamValues) -> Option<String> {
        let path: Vec<Details> = self.path_params().map(|p| param_details(p, values)).collect::<Option<_>>()?;
        let search: Vec<Details> = self.search_params().map(|p| param_details(p, values)).collect::<Option<_>>()?;

        let mut url = String::new();
        for (segment, detail) in self.segments.iter().zip(path.iter()) {
            url.push_str(segment);
            match (&detail.squash, &detail.encoded) {
                (Squash::Slash, _) => {
                    if url.ends_with('/') {
                        url.pop();
                    }
                }
                (Squash::Replace(s), _) => url.push_str(s),
                (Squash::Disabled, EncodedValue::Missing) => {}
                (Squash::Disabled, EncodedValue::Many(items)) => {
                    let joined: Vec<String> = items.iter().map(|item| encode_dashes(item)).collect();
                    url.push_str(&joined.join("-"));
                }
                (Squash::Disabled, EncodedValue::One(s)) if detail.param.raw => url.push_str(s),
                (Squash::Disabled, EncodedValue::One(s)) => url.push_str(&encode_path(s)),
            }
        }
        if let Some(last) = self.segments.last() {
            url.push_str(last);
        }

        let mut query: Vec<String> = Vec::new();
        for detail in &search {
            if detail.is_default && detail.squash != Squash::Disabled {
                continue;
            }
            for item in detail.encoded.strings() {
                let item = if detail.param.raw { Cow::Borrowed(item) } else { urlencoding::encode(item) };
                query.push(format!("{}={}", detail.param.id, item));
            }
        }
        if !query.is_empty() {
            url.push('?');
            url.push_str(&query.join("&"));
        }

        if let Some(hash) = values.get("#").filter(|h| !h.is_null()) {
            url.push('#');
            url.push_str(&hash.to_string());
        }

        Some(url)
    }
}

impl fmt::Display for UrlMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pattern)
    }
}

impl fmt::Debug for UrlMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UrlMatcher")
            .field("pattern", &self.pattern)
            .field("regex", &self.regex.as_str())
            .field("params", &self.params.iter().map(|p| p.id.as_str()).collect::<Vec<_>>())
            .finish()
    }
}

struct Details<'a> {
    param: &'a Param,
    squash: Squash,
    is_default: bool,
    encoded: EncodedValue,
}

fn param_details<'a>(param: &'a Param, values: &ParamValues) -> Option<Details<'a>> {
    let value = param.value(values.get(&param.id));
    if !param.validates(value.as_ref()) {
        return None;
    }
    let is_default = param.is_default_value(value.as_ref());
    Some(Details {
        param,
        squash: if is_default { param.squash.clone() } else { Squash::Disabled },
        is_default,
        encoded: value.map(|v| param.encode(&v)).unwrap_or(EncodedValue::Missing),
    })
}

fn placeholder_details(
    caps: &Captures<'_>,
    is_search: bool,
    types: &ParamTypes,
    config: &UrlConfig,
) -> Result<Placeholder, ConfigError> {
    let raw_id = caps.get(2).or_else(|| caps.get(3)).map(|m| m.as_str()).unwrap_or_default();
    let (id, array) = match raw_id.strip_suffix("[]") {
        Some(stripped) => (stripped.to_string(), true),
        None => (raw_id.to_string(), false),
    };

    let regexp = caps.get(4).map(|m| m.as_str().trim());
    let catch_all = !is_search && caps.get(1).is_some_and(|m| m.as_str() == "*");

    let url_type = match regexp {
        Some(name) if types.get(name).is_some() => types.get(name),
        Some(source) => {
            let base = if is_numeric_pattern(source) {
                "int"
            } else if is_search {
                "query"
            } else {
                "string"
            };
            Some(Rc::new(types.type_of(base)?.with_pattern(source, config.case_insensitive)?))
        }
        None if catch_all => Some(types.type_of("path")?),
        None => None,
    };

    Ok(Placeholder { id, array, url_type })
}

fn check_param(details: &Placeholder, params: &[Param], pattern: &str) -> Result<(), ConfigError> {
    if !regex!(r"^\w+(-+\w+)*$").is_match(&details.id) {
        return Err(ConfigError::InvalidParamName { name: details.id.clone(), pattern: pattern.to_string() });
    }
    if params.iter().any(|p| p.id == details.id) {
        return Err(ConfigError::DuplicateParam { name: details.id.clone(), pattern: pattern.to_string() });
    }
    Ok(())
}

/// Inline regexps that only admit digits produce integer values.
fn is_numeric_pattern(source: &str) -> bool {
    regex!(r"^(?:-\?)?(?:\[0-9\]|\\d)(?:[+*]|\{\d+(?:,\d*)?\})$").is_match(source)
}

fn quote_segment(segment: &str, param: &Param) -> String {
    let mut result = regex::escape(segment);
    let pattern = match param.value_type.array_mode() {
        ArrayMode::On => "[^/]*",
        _ => param.value_type.base().pattern(),
    };

    match &param.squash {
        Squash::Disabled => {
            let optional = if param.optional { "?" } else { "" };
            format!("{result}({pattern}){optional}")
        }
        Squash::Slash => {
            if result.ends_with('/') {
                result.pop();
            }
            format!("{result}(?:/({pattern})|/)?")
        }
        Squash::Replace(s) => format!("{result}({}|{pattern})?", regex::escape(s)),
    }
}

fn percent_decode(raw: &str) -> String {
    urlencoding::decode(raw).map(Cow::into_owned).unwrap_or_else(|_| raw.to_string())
}

fn decode_path_value(raw: &str, array: bool) -> ParamValue {
    if raw.is_empty() {
        return ParamValue::from("");
    }
    if array {
        let items = raw.split('-').map(|part| ParamValue::String(percent_decode(part).replace("\\-", "-")));
        ParamValue::Array(items.collect())
    } else {
        ParamValue::String(percent_decode(raw))
    }
}

fn encode_path(value: &str) -> String {
    value.split('/').map(|part| urlencoding::encode(part).into_owned()).collect::<Vec<_>>().join("/")
}

fn encode_dashes(value: &str) -> String {
    urlencoding::encode(value).replace('-', "%5C%2D")
}
