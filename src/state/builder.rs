//! Derived-field computation for states.
//!
//! Every derived field has a [`FieldChain`]: a base producer plus an ordered
//! list of decorators. Building folds the chain from the base outwards, so the
//! newest decorator is outermost and receives a thunk for the previous result.
//!
//! ```text
//! decorator[n-1](draft, || decorator[n-2](draft, || ... base(draft)))
//! ```
//!
//! Fields are built in a fixed order (url, params, views, data, resolvables,
//! includes) and earlier results are visible to later ones through
//! [`StateDraft`]. The parent link and the root-to-state path follow from the
//! dotted name and have no chain.

use std::collections::BTreeSet;
use std::rc::Rc;

use serde_json::Value;

use super::declaration::StateDeclaration;
use super::object::{State, StateRef};
use super::views::{ViewConfig, ViewDeclaration, normalize_view_target};
use crate::error::ConfigError;
use crate::params::Param;
use crate::resolve::Resolvable;
use crate::url::{UrlMatcher, UrlMatcherFactory};

type FieldFn<T> = Rc<dyn Fn(&StateDraft<'_>) -> Result<T, ConfigError>>;
type FieldDecorator<T> = Rc<dyn Fn(&StateDraft<'_>, &dyn Fn() -> Result<T, ConfigError>) -> Result<T, ConfigError>>;

/// The in-progress state handed to field producers.
pub struct StateDraft<'a> {
    pub name: &'a str,
    pub declaration: &'a StateDeclaration,
    pub parent: Option<&'a StateRef>,
    pub factory: &'a UrlMatcherFactory,
    /// Set once the `url` field has been built.
    pub url: Option<UrlMatcher>,
    /// Set once the `params` field has been built.
    pub own_params: Vec<Param>,
}

/// A base producer and its decorators for one derived field.
pub struct FieldChain<T> {
    base: FieldFn<T>,
    decorators: Vec<FieldDecorator<T>>,
    frozen: bool,
}

impl<T> FieldChain<T> {
    fn new(base: impl Fn(&StateDraft<'_>) -> Result<T, ConfigError> + 'static) -> Self {
        FieldChain { base: Rc::new(base), decorators: Vec::new(), frozen: false }
    }

    /// Wrap the current producer. Fails once a state has been registered.
    pub fn decorate(
        &mut self,
        decorator: impl Fn(&StateDraft<'_>, &dyn Fn() -> Result<T, ConfigError>) -> Result<T, ConfigError> + 'static,
    ) -> Result<(), ConfigError> {
        if self.frozen {
            return Err(ConfigError::BuilderFrozen);
        }
        self.decorators.push(Rc::new(decorator));
        Ok(())
    }

    pub fn decorator_count(&self) -> usize {
        self.decorators.len()
    }

    fn build(&self, draft: &StateDraft<'_>) -> Result<T, ConfigError> {
        self.apply(self.decorators.len(), draft)
    }

    fn apply(&self, depth: usize, draft: &StateDraft<'_>) -> Result<T, ConfigError> {
        match depth.checked_sub(1) {
            None => (self.base)(draft),
            Some(idx) => {
                let previous = || self.apply(idx, draft);
                (self.decorators[idx])(draft, &previous)
            }
        }
    }
}

/// Field chains used to turn declarations into [`State`]s.
pub struct StateBuilder {
    pub url: FieldChain<Option<UrlMatcher>>,
    /// Produces the state's own parameters.
    pub params: FieldChain<Vec<Param>>,
    pub views: FieldChain<Vec<ViewConfig>>,
    pub data: FieldChain<Value>,
    pub resolvables: FieldChain<Vec<Resolvable>>,
    /// Names a state answers to in `includes` queries and glob matching.
    pub includes: FieldChain<BTreeSet<String>>,
}

impl Default for StateBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl StateBuilder {
    pub fn new() -> Self {
        StateBuilder {
            url: FieldChain::new(build_url),
            params: FieldChain::new(build_params),
            views: FieldChain::new(build_views),
            data: FieldChain::new(build_data),
            resolvables: FieldChain::new(build_resolvables),
            includes: FieldChain::new(build_includes),
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.url.frozen
    }

    pub(crate) fn freeze(&mut self) {
        self.url.frozen = true;
        self.params.frozen = true;
        self.views.frozen = true;
        self.data.frozen = true;
        self.resolvables.frozen = true;
        self.includes.frozen = true;
    }

    pub(crate) fn build(
        &self,
        name: &str,
        declaration: StateDeclaration,
        parent: Option<StateRef>,
        factory: &UrlMatcherFactory,
    ) -> Result<State, ConfigError> {
        let mut draft =
            StateDraft { name, declaration: &declaration, parent: parent.as_ref(), factory, url: None, own_params: Vec::new() };

        draft.url = self.url.build(&draft)?;
        draft.own_params = self.params.build(&draft)?;
        let views = self.views.build(&draft)?;
        let data = self.data.build(&draft)?;
        let resolvables = self.resolvables.build(&draft)?;
        let includes = self.includes.build(&draft)?;

        let mut params: Vec<Param> = parent.as_ref().map(|p| p.params.clone()).unwrap_or_default();
        for own in &draft.own_params {
            match params.iter_mut().find(|p| p.id == own.id) {
                Some(slot) => *slot = own.clone(),
                None => params.push(own.clone()),
            }
        }

        let depth = parent.as_ref().map_or(0, |p| p.depth + 1);
        let url = draft.url.take();
        let own_params = std::mem::take(&mut draft.own_params);

        Ok(State {
            name: name.to_string(),
            parent,
            url,
            own_params,
            params,
            resolvables,
            views,
            data,
            includes,
            depth,
            declaration,
        })
    }
}

/// `^/abs` is absolute; anything else is appended to the nearest ancestor URL.
fn build_url(draft: &StateDraft<'_>) -> Result<Option<UrlMatcher>, ConfigError> {
    let decl = draft.declaration;
    let Some(url) = decl.url.as_deref() else {
        return Ok(None);
    };
    if let Some(absolute) = url.strip_prefix('^') {
        return draft.factory.compile_with(absolute, &decl.params).map(Some);
    }
    match draft.parent.and_then(|p| p.navigable_url()) {
        Some(parent_url) => parent_url.concat(url, &decl.params).map(Some),
        None => draft.factory.compile_with(url, &decl.params).map(Some),
    }
}

fn build_params(draft: &StateDraft<'_>) -> Result<Vec<Param>, ConfigError> {
    let inherited = |id: &str| draft.parent.is_some_and(|p| p.param(id).is_some());

    let mut own: Vec<Param> = match &draft.url {
        Some(url) => url.params().iter().filter(|p| !inherited(&p.id)).cloned().collect(),
        None => Vec::new(),
    };

    for (id, decl) in &draft.declaration.params {
        let in_url = draft.url.as_ref().is_some_and(|u| u.param(id).is_some());
        if in_url {
            continue;
        }
        own.push(draft.factory.config_param(id, decl)?);
    }
    Ok(own)
}

fn build_views(draft: &StateDraft<'_>) -> Result<Vec<ViewConfig>, ConfigError> {
    let decl = draft.declaration;
    let mut views: Vec<(String, ViewDeclaration)> = decl.views.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
    if views.is_empty() {
        if let Some(component) = &decl.component {
            views.push((String::new(), ViewDeclaration::component(component.clone())));
        }
    }

    Ok(views
        .into_iter()
        .map(|(raw_name, declaration)| {
            let (view_name, context) = normalize_view_target(draft.name, &raw_name);
            ViewConfig { state: draft.name.to_string(), raw_name, view_name, context, declaration }
        })
        .collect())
}

/// Object data is merged over the parent's; anything else replaces it.
fn build_data(draft: &StateDraft<'_>) -> Result<Value, ConfigError> {
    let inherited = draft.parent.map(|p| p.data.clone()).unwrap_or(Value::Null);
    Ok(match (inherited, &draft.declaration.data) {
        (inherited, Value::Null) => inherited,
        (Value::Object(mut base), Value::Object(own)) => {
            for (k, v) in own {
                base.insert(k.clone(), v.clone());
            }
            Value::Object(base)
        }
        (_, own) => own.clone(),
    })
}

/// The parent's names plus this state's own.
fn build_includes(draft: &StateDraft<'_>) -> Result<BTreeSet<String>, ConfigError> {
    let mut includes = draft.parent.map(|p| p.includes.clone()).unwrap_or_default();
    includes.insert(draft.name.to_string());
    Ok(includes)
}

fn build_resolvables(draft: &StateDraft<'_>) -> Result<Vec<Resolvable>, ConfigError> {
    let state_policy = draft.declaration.resolve_policy;
    Ok(draft
        .declaration
        .resolve
        .iter()
        .map(|r| {
            let mut r = r.fresh();
            if r.policy.is_none() {
                r.policy = state_policy;
            }
            r
        })
        .collect())
}
