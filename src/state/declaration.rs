use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use serde_json::Value;

use super::views::ViewDeclaration;
use crate::error::RouteError;
use crate::params::ParamDeclaration;
use crate::resolve::{ResolvePolicy, Resolvable};
use crate::transition::{HookContext, HookFn, HookResult};

/// The raw, user-written description of a state.
///
/// `name` may be a full dotted name (`"home.item"`) or, together with
/// `parent`, a single segment (`name: "item", parent: "home"`).
#[derive(Clone, Default)]
pub struct StateDeclaration {
    pub name: String,
    pub parent: Option<String>,
    pub url: Option<String>,
    pub is_abstract: bool,
    pub params: BTreeMap<String, ParamDeclaration>,
    pub resolve: Vec<Resolvable>,
    /// Policy for resolvables that do not set their own.
    pub resolve_policy: Option<ResolvePolicy>,
    pub views: BTreeMap<String, ViewDeclaration>,
    /// Shorthand for a single `$default` view.
    pub component: Option<String>,
    pub on_enter: Option<HookFn>,
    pub on_exit: Option<HookFn>,
    pub on_retain: Option<HookFn>,
    pub data: Value,
}

impl StateDeclaration {
    pub fn new(name: impl Into<String>) -> Self {
        StateDeclaration { name: name.into(), data: Value::Null, ..Default::default() }
    }

    pub fn parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn abstract_state(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    pub fn param(mut self, id: impl Into<String>, decl: ParamDeclaration) -> Self {
        self.params.insert(id.into(), decl);
        self
    }

    pub fn resolve(mut self, resolvable: Resolvable) -> Self {
        self.resolve.push(resolvable);
        self
    }

    pub fn resolve_policy(mut self, policy: ResolvePolicy) -> Self {
        self.resolve_policy = Some(policy);
        self
    }

    pub fn view(mut self, target: impl Into<String>, view: ViewDeclaration) -> Self {
        self.views.insert(target.into(), view);
        self
    }

    pub fn component(mut self, component: impl Into<String>) -> Self {
        self.component = Some(component.into());
        self
    }

    pub fn on_enter(mut self, f: impl Fn(&HookContext) -> Result<HookResult, RouteError> + 'static) -> Self {
        self.on_enter = Some(Rc::new(f));
        self
    }

    pub fn on_exit(mut self, f: impl Fn(&HookContext) -> Result<HookResult, RouteError> + 'static) -> Self {
        self.on_exit = Some(Rc::new(f));
        self
    }

    pub fn on_retain(mut self, f: impl Fn(&HookContext) -> Result<HookResult, RouteError> + 'static) -> Self {
        self.on_retain = Some(Rc::new(f));
        self
    }

    pub fn data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }
}

impl fmt::Debug for StateDeclaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateDeclaration")
            .field("name", &self.name)
            .field("parent", &self.parent)
            .field("url", &self.url)
            .field("abstract", &self.is_abstract)
            .field("params", &self.params.keys().collect::<Vec<_>>())
            .field("resolve", &self.resolve.iter().map(|r| r.token.as_str()).collect::<Vec<_>>())
            .field("views", &self.views.keys().collect::<Vec<_>>())
            .finish()
    }
}
