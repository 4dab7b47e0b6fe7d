use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use regex::Regex;

use super::factory::UrlConfig;
use super::location::Location;
use super::matcher::UrlMatcher;
use crate::error::RouteError;
use crate::{ParamValue, ParamValues};

/// What a URL rule matches against.
#[derive(Clone)]
pub enum UrlRulePattern {
    Matcher(UrlMatcher),
    Regex(Regex),
}

impl From<UrlMatcher> for UrlRulePattern {
    fn from(matcher: UrlMatcher) -> Self {
        UrlRulePattern::Matcher(matcher)
    }
}

impl From<Regex> for UrlRulePattern {
    fn from(regex: Regex) -> Self {
        UrlRulePattern::Regex(regex)
    }
}

/// A URL that matched a rule.
#[derive(Debug, Clone, Default)]
pub struct UrlMatch {
    pub path: String,
    pub search: ParamValues,
    pub hash: String,
    /// Decoded values when the rule is a [`UrlMatcher`].
    pub params: ParamValues,
    /// Capture groups (index 0 is the whole match) when the rule is a regex.
    pub groups: Vec<Option<String>>,
}

/// The outcome of a matched rule.
#[derive(Debug, Clone, PartialEq)]
pub enum UrlRuleMatch {
    /// Replace the current URL and match again.
    Redirect(String),
    /// Activate a state.
    State { name: String, params: ParamValues },
    /// The handler dealt with the URL itself.
    Handled,
}

type RuleFn = Rc<dyn Fn(&UrlMatch) -> Option<UrlRuleMatch>>;

/// What happens when a rule matches.
#[derive(Clone)]
pub enum UrlRuleHandler {
    /// A URL to redirect to. For matcher rules it is a pattern formatted with
    /// the matched values; for regex rules `$1`..`$99` (and `$$` for the whole
    /// match) are substituted.
    Redirect(String),
    /// Go to the named state with the matched values.
    State(String),
    /// Custom handling; returning `None` lets later rules try.
    Func(RuleFn),
}

impl UrlRuleHandler {
    pub fn func(f: impl Fn(&UrlMatch) -> Option<UrlRuleMatch> + 'static) -> Self {
        UrlRuleHandler::Func(Rc::new(f))
    }
}

impl fmt::Debug for UrlRuleHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UrlRuleHandler::Redirect(url) => write!(f, "Redirect({url})"),
            UrlRuleHandler::State(name) => write!(f, "State({name})"),
            UrlRuleHandler::Func(_) => write!(f, "Func(..)"),
        }
    }
}

struct UrlRule {
    id: u64,
    priority: i32,
    owner: Option<String>,
    pattern: UrlRulePattern,
    handler: UrlRuleHandler,
}

/// Ordered URL rules plus URL generation.
///
/// Rules are tried by descending priority, then registration order. State
/// URLs are registered as rules automatically when their state is registered.
pub struct UrlRouter {
    config: UrlConfig,
    rules: RefCell<Vec<UrlRule>>,
    otherwise: RefCell<Option<UrlRuleHandler>>,
    location: RefCell<Option<Rc<dyn Location>>>,
    next_id: Cell<u64>,
}

impl UrlRouter {
    pub fn new(config: UrlConfig) -> Self {
        UrlRouter {
            config,
            rules: RefCell::new(Vec::new()),
            otherwise: RefCell::new(None),
            location: RefCell::new(None),
            next_id: Cell::new(1),
        }
    }

    pub fn config(&self) -> &UrlConfig {
        &self.config
    }

    /// Add a rule. Returns an id usable with [`remove_rule`](Self::remove_rule).
    pub fn when(&self, pattern: impl Into<UrlRulePattern>, handler: UrlRuleHandler) -> u64 {
        self.add_rule(pattern.into(), handler, 0, None)
    }

    pub fn when_with_priority(&self, pattern: impl Into<UrlRulePattern>, handler: UrlRuleHandler, priority: i32) -> u64 {
        self.add_rule(pattern.into(), handler, priority, None)
    }

    /// Fallback for URLs no rule matched.
    pub fn otherwise(&self, handler: UrlRuleHandler) {
        *self.otherwise.borrow_mut() = Some(handler);
    }

    pub fn remove_rule(&self, id: u64) -> bool {
        let mut rules = self.rules.borrow_mut();
        let before = rules.len();
        rules.retain(|r| r.id != id);
        rules.len() != before
    }

    pub fn rule_count(&self) -> usize {
        self.rules.borrow().len()
    }

    pub(crate) fn add_state_rule(&self, state: &str, matcher: UrlMatcher) -> u64 {
        self.add_rule(UrlRulePattern::Matcher(matcher), UrlRuleHandler::State(state.to_string()), 0, Some(state))
    }

    pub(crate) fn remove_state_rules(&self, state: &str) {
        self.rules.borrow_mut().retain(|r| r.owner.as_deref() != Some(state));
    }

    fn add_rule(&self, pattern: UrlRulePattern, handler: UrlRuleHandler, priority: i32, owner: Option<&str>) -> u64 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);

        let mut rules = self.rules.borrow_mut();
        let at = rules.iter().position(|r| r.priority < priority).unwrap_or(rules.len());
        rules.insert(at, UrlRule { id, priority, owner: owner.map(str::to_string), pattern, handler });
        id
    }

    /// Attach the location collaborator used by [`sync`](Self::sync) and
    /// [`push`](Self::push).
    pub fn attach(&self, location: Rc<dyn Location>) {
        *self.location.borrow_mut() = Some(location);
    }

    pub fn location(&self) -> Option<Rc<dyn Location>> {
        self.location.borrow().clone()
    }

    /// Match the attached location's current URL.
    pub fn sync(&self) -> Result<Option<UrlRuleMatch>, RouteError> {
        let Some(location) = self.location() else {
            return Ok(None);
        };
        self.match_url(&location.path(), &location.search(), &location.hash())
    }

    /// Run the rules against a URL. The first handler that produces a result
    /// wins; `otherwise` applies when none does.
    pub fn match_url(&self, path: &str, search: &ParamValues, hash: &str) -> Result<Option<UrlRuleMatch>, RouteError> {
        let candidates: Vec<(UrlRulePattern, UrlRuleHandler)> =
            self.rules.borrow().iter().map(|r| (r.pattern.clone(), r.handler.clone())).collect();

        for (pattern, handler) in candidates {
            let Some(found) = match_pattern(&pattern, path, search, hash)? else {
                continue;
            };
            if let Some(result) = apply_handler(&pattern, &handler, &found) {
                tracing::trace!(path, ?result, "url rule matched");
                return Ok(Some(result));
            }
        }

        let otherwise = self.otherwise.borrow().clone();
        let fallback = UrlMatch { path: path.to_string(), search: search.clone(), hash: hash.to_string(), ..Default::default() };
        Ok(match otherwise {
            Some(UrlRuleHandler::Redirect(url)) => Some(UrlRuleMatch::Redirect(url)),
            Some(UrlRuleHandler::State(name)) => Some(UrlRuleMatch::State { name, params: ParamValues::new() }),
            Some(UrlRuleHandler::Func(f)) => f(&fallback),
            None => None,
        })
    }

    /// Link for `matcher` with `params`: `#<prefix><url>` in hash mode, the
    /// plain URL in html5 mode, prefixed by `base_url` when `absolute`.
    pub fn href(&self, matcher: &UrlMatcher, params: &ParamValues, absolute: bool) -> Option<String> {
        let url = matcher.format(params)?;
        let url = if self.config.html5_mode { url } else { format!("#{}{}", self.config.hash_prefix, url) };
        if !absolute {
            return Some(url);
        }
        let base = self.config.base_url.trim_end_matches('/');
        let slash = if self.config.html5_mode { "" } else { "/" };
        Some(format!("{base}{slash}{url}"))
    }

    /// Write the formatted URL to the attached location. Returns the URL when
    /// something was written.
    pub fn push(&self, matcher: &UrlMatcher, params: &ParamValues, replace: bool) -> Option<String> {
        let location = self.location()?;
        let url = matcher.format(params)?;
        location.set_url(&url, replace);
        tracing::debug!(url = %url, replace, "location updated");
        Some(url)
    }
}

impl fmt::Debug for UrlRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UrlRouter").field("rules", &self.rule_count()).field("config", &self.config).finish()
    }
}

fn match_pattern(
    pattern: &UrlRulePattern,
    path: &str,
    search: &ParamValues,
    hash: &str,
) -> Result<Option<UrlMatch>, RouteError> {
    let base = || UrlMatch { path: path.to_string(), search: search.clone(), hash: hash.to_string(), ..Default::default() };

    match pattern {
        UrlRulePattern::Matcher(matcher) => {
            let hash = if hash.is_empty() { None } else { Some(hash) };
            Ok(matcher.exec(path, search, hash)?.map(|params| UrlMatch { params, ..base() }))
        }
        UrlRulePattern::Regex(regex) => Ok(regex.captures(path).map(|caps| UrlMatch {
            groups: caps.iter().map(|m| m.map(|m| m.as_str().to_string())).collect(),
            ..base()
        })),
    }
}

fn apply_handler(pattern: &UrlRulePattern, handler: &UrlRuleHandler, found: &UrlMatch) -> Option<UrlRuleMatch> {
    match (handler, pattern) {
        (UrlRuleHandler::Func(f), _) => f(found),
        (UrlRuleHandler::State(name), _) => {
            Some(UrlRuleMatch::State { name: name.clone(), params: found.params.clone() })
        }
        (UrlRuleHandler::Redirect(target), UrlRulePattern::Regex(_)) => {
            Some(UrlRuleMatch::Redirect(interpolate_groups(target, &found.groups)))
        }
        (UrlRuleHandler::Redirect(target), UrlRulePattern::Matcher(matcher)) => {
            // The redirect target is itself a pattern over the matched values.
            let redirect = matcher.sibling(target).ok()?;
            redirect.format(&found.params).map(UrlRuleMatch::Redirect)
        }
    }
}

fn interpolate_groups(target: &str, groups: &[Option<String>]) -> String {
    regex!(r"\$(\$|\d{1,2})")
        .replace_all(target, |c: &regex::Captures| {
            let idx = if &c[1] == "$" { 0 } else { c[1].parse::<usize>().unwrap_or(0) };
            groups.get(idx).cloned().flatten().unwrap_or_default()
        })
        .into_owned()
}

impl UrlMatch {
    /// Convenience accessor for matcher values.
    pub fn param(&self, id: &str) -> Option<&ParamValue> {
        self.params.get(id)
    }
}
