use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;

use serde_json::Value;

use super::declaration::StateDeclaration;
use super::views::ViewConfig;
use crate::params::Param;
use crate::resolve::Resolvable;
use crate::url::UrlMatcher;

/// Shared handle to a registered state.
pub type StateRef = Rc<State>;

/// A registered state with every derived field computed.
///
/// States are immutable once built; a state and its descendants can only be
/// removed as a whole.
pub struct State {
    /// Full dotted name. The implicit root is `""`.
    pub name: String,
    pub parent: Option<StateRef>,
    pub declaration: StateDeclaration,
    /// The full URL matcher when this state declares a URL.
    pub url: Option<UrlMatcher>,
    /// Parameters declared by this state (URL and non-URL).
    pub own_params: Vec<Param>,
    /// Own parameters plus every inherited one.
    pub params: Vec<Param>,
    pub resolvables: Vec<Resolvable>,
    pub views: Vec<ViewConfig>,
    pub data: Value,
    /// Names of this state and all of its ancestors.
    pub includes: BTreeSet<String>,
    /// Distance from the root (the root is 0).
    pub depth: usize,
}

impl State {
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn is_abstract(&self) -> bool {
        self.declaration.is_abstract
    }

    pub fn param(&self, id: &str) -> Option<&Param> {
        self.params.iter().find(|p| p.id == id)
    }

    pub fn own_param(&self, id: &str) -> Option<&Param> {
        self.own_params.iter().find(|p| p.id == id)
    }

    /// True when `name` is this state or one of its ancestors.
    pub fn includes(&self, name: &str) -> bool {
        self.includes.contains(name)
    }

    /// The nearest state (self or ancestor) that owns a URL.
    pub fn navigable(self: &Rc<Self>) -> Option<StateRef> {
        let mut current = Some(self.clone());
        while let Some(state) = current {
            if state.url.is_some() {
                return Some(state);
            }
            current = state.parent.clone();
        }
        None
    }

    pub fn navigable_url(&self) -> Option<&UrlMatcher> {
        match &self.url {
            Some(url) => Some(url),
            None => self.parent.as_deref().and_then(State::navigable_url),
        }
    }

    /// States from the root down to (and including) this one.
    pub fn path(self: &Rc<Self>) -> Vec<StateRef> {
        let mut path = Vec::with_capacity(self.depth + 1);
        let mut current = Some(self.clone());
        while let Some(state) = current {
            current = state.parent.clone();
            path.push(state);
        }
        path.reverse();
        path
    }

    /// Name for logs and reports (`(root)` for the implicit root).
    pub fn display_name(&self) -> &str {
        if self.is_root() { "(root)" } else { &self.name }
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("name", &self.name)
            .field("url", &self.url.as_ref().map(UrlMatcher::pattern))
            .field("params", &self.params.iter().map(|p| p.id.as_str()).collect::<Vec<_>>())
            .field("abstract", &self.is_abstract())
            .finish()
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}
