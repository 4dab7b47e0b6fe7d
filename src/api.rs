use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use futures::FutureExt;
use futures::future::LocalBoxFuture;
use futures::task::{LocalSpawn, LocalSpawnExt};

use crate::error::{ConfigError, RouteError};
use crate::injector::Injector;
use crate::params::{Param, ParamType, ParamTypeDefinition, ParamTypes, Squash};
use crate::resolve::ResolvePolicy;
use crate::router::{ParamsListenerRegistration, RouterCore};
use crate::state::{
    Glob, StateBuilder, StateDeclaration, StateRef, StateRegistration, TargetState, ViewPort, ViewPortRegistration,
    ViewService,
};
use crate::transition::{
    HookContext, HookCriteria, HookKind, HookOptions, HookRegistration, HookResult, LocationOption, Rejection,
    Reload, Transition, TransitionOptions, TransitionSource, build_path, path_params,
};
use crate::url::{Location, UrlConfig, UrlRouter, UrlRuleMatch};
use crate::ParamValues;

/// Router-wide settings.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Match URL paths case-insensitively.
    pub case_insensitive: bool,
    /// When false, every URL pattern also accepts a trailing slash.
    pub strict_mode: bool,
    pub default_squash_policy: Squash,
    /// Policy for resolvables that neither they nor their state configure.
    pub default_resolve_policy: ResolvePolicy,
    /// Plain URLs in links instead of `#`-prefixed ones.
    pub html5_mode: bool,
    pub hash_prefix: String,
    /// Prefix for absolute links.
    pub base_url: String,
    /// Longest redirect chain before a transition fails.
    pub max_redirects: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        let url = UrlConfig::default();
        RouterConfig {
            case_insensitive: url.case_insensitive,
            strict_mode: url.strict_mode,
            default_squash_policy: url.default_squash_policy,
            default_resolve_policy: ResolvePolicy::default(),
            html5_mode: url.html5_mode,
            hash_prefix: url.hash_prefix,
            base_url: url.base_url,
            max_redirects: 20,
        }
    }
}

impl RouterConfig {
    pub fn url_config(&self) -> UrlConfig {
        UrlConfig {
            case_insensitive: self.case_insensitive,
            strict_mode: self.strict_mode,
            default_squash_policy: self.default_squash_policy.clone(),
            html5_mode: self.html5_mode,
            hash_prefix: self.hash_prefix.clone(),
            base_url: self.base_url.clone(),
        }
    }
}

/// Options for [`Router::href_with`].
#[derive(Debug, Clone)]
pub struct HrefOptions {
    /// Prefix the link with `base_url`.
    pub absolute: bool,
    /// Fill missing parameters from the current path.
    pub inherit: bool,
    /// Base for relative names; the current state when unset.
    pub relative: Option<String>,
}

impl Default for HrefOptions {
    fn default() -> Self {
        HrefOptions { absolute: false, inherit: true, relative: None }
    }
}

/// A started navigation.
///
/// The synchronous part of the transition (validity checks, `onBefore`
/// hooks) has already run when this is returned. Await it for the state the
/// router ends up in; redirects are followed.
#[must_use = "the transition only continues past onBefore when the navigation is polled"]
pub struct Navigation {
    transition: Transition,
    future: LocalBoxFuture<'static, Result<StateRef, Rejection>>,
}

impl Navigation {
    /// The first transition of the navigation (before any redirect).
    pub fn transition(&self) -> &Transition {
        &self.transition
    }
}

impl Future for Navigation {
    type Output = Result<StateRef, Rejection>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.future.poll_unpin(cx)
    }
}

impl fmt::Debug for Navigation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Navigation").field("transition", &self.transition).finish()
    }
}

/// The router facade: state registration, navigation, hooks and URLs.
///
/// # Example
/// ```
/// use futures::executor::block_on;
/// use treeroute::{Router, StateDeclaration, params};
///
/// let router = Router::new()?;
/// router.register(StateDeclaration::new("home").url("/"))?;
/// router.register(StateDeclaration::new("home.item").url("front/:id"))?;
///
/// assert_eq!(router.href("home.item", params! { "id" => "5" }).as_deref(), Some("#/front/5"));
///
/// let state = block_on(router.go("home.item", params! { "id" => "5" }))?;
/// assert_eq!(state.name, "home.item");
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Clone)]
pub struct Router {
    core: Rc<RouterCore>,
}

impl Router {
    pub fn new() -> Result<Router, ConfigError> {
        Router::with_config(RouterConfig::default())
    }

    pub fn with_config(config: RouterConfig) -> Result<Router, ConfigError> {
        tracing::debug!(?config, "router created");
        Ok(Router { core: RouterCore::new(config)? })
    }

    pub fn config(&self) -> &RouterConfig {
        &self.core.config
    }

    // --- states -----------------------------------------------------------------

    /// Register a state. Its URL (if any, and if the state is not abstract)
    /// becomes a URL rule. States waiting for a parent are registered when it
    /// appears.
    pub fn register(&self, decl: StateDeclaration) -> Result<StateRegistration, ConfigError> {
        let registration = self.core.registry.borrow_mut().register(decl)?;
        for state in &registration.registered {
            if let (Some(url), false) = (&state.url, state.is_abstract()) {
                self.core.url_router.add_state_rule(&state.name, url.clone());
            }
        }
        Ok(registration)
    }

    /// Remove a state and its descendants, along with their URL rules.
    pub fn deregister(&self, name: &str) -> Result<Vec<StateRef>, ConfigError> {
        let removed = self.core.registry.borrow_mut().deregister(name)?;
        for state in &removed {
            self.core.url_router.remove_state_rules(&state.name);
        }
        Ok(removed)
    }

    /// Declarations waiting for a parent, as `(state, missing parent)`.
    pub fn pending_states(&self) -> Vec<(String, String)> {
        self.core.registry.borrow().pending()
    }

    /// Access the state builder, e.g. to add decorators before the first
    /// registration.
    pub fn with_builder<R>(&self, f: impl FnOnce(&mut StateBuilder) -> R) -> R {
        f(self.core.registry.borrow_mut().builder_mut())
    }

    pub fn get(&self, name: &str) -> Option<StateRef> {
        self.core.state(name)
    }

    pub fn root(&self) -> StateRef {
        self.core.root()
    }

    /// Registered states in registration order.
    pub fn states(&self) -> Vec<StateRef> {
        self.core.registry.borrow().states()
    }

    // --- queries ----------------------------------------------------------------

    /// The committed state.
    pub fn current(&self) -> StateRef {
        self.core.current_state()
    }

    /// Parameter values of the committed path.
    pub fn params(&self) -> ParamValues {
        self.core.params()
    }

    /// The transition currently running, if any.
    pub fn transition(&self) -> Option<Transition> {
        self.core.current_transition()
    }

    /// The last transition that succeeded.
    pub fn last_success(&self) -> Option<Transition> {
        self.core.last_success()
    }

    /// True when the current state is `identifier` (relative names allowed)
    /// and, if given, `params` equal the current values.
    pub fn is(&self, identifier: &str, params: Option<&ParamValues>) -> bool {
        let current = self.current();
        let found = self.core.registry.borrow().find(identifier, Some(&current.name));
        match found {
            Ok(Some(state)) if Rc::ptr_eq(&state, &current) => {
                params.is_none_or(|p| params_match(&state.params, p, &self.params()))
            }
            _ => false,
        }
    }

    /// True when the current state is, or descends from, `identifier`. A glob
    /// matches against every active state name.
    pub fn includes(&self, identifier: &str, params: Option<&ParamValues>) -> bool {
        let current = self.current();
        let included = if Glob::is_glob(identifier) {
            Glob::new(identifier).is_ok_and(|glob| current.includes.iter().any(|name| glob.matches(name)))
        } else {
            let found = self.core.registry.borrow().find(identifier, Some(&current.name));
            matches!(found, Ok(Some(state)) if current.includes(&state.name))
        };
        included && params.is_none_or(|p| params_match(&current.params, p, &self.params()))
    }

    // --- navigation -------------------------------------------------------------

    /// Look up a target relative to `options.relative`.
    pub fn target(&self, identifier: &str, params: ParamValues, options: TransitionOptions) -> TargetState {
        self.core.target(identifier, params, options)
    }

    /// Navigate relative to the current state, inheriting parameters.
    pub fn go(&self, identifier: &str, params: ParamValues) -> Navigation {
        self.go_with(identifier, params, TransitionOptions::default().inherit(true))
    }

    /// Like [`go`](Self::go) with explicit options; `relative` defaults to the
    /// current state.
    pub fn go_with(&self, identifier: &str, params: ParamValues, mut options: TransitionOptions) -> Navigation {
        if options.relative.is_none() {
            options.relative = Some(self.current().name.clone());
        }
        self.transition_to(identifier, params, options)
    }

    pub fn transition_to(&self, identifier: &str, params: ParamValues, options: TransitionOptions) -> Navigation {
        let target = self.core.target(identifier, params, options);
        self.transition_to_target(target)
    }

    pub fn transition_to_target(&self, target: TargetState) -> Navigation {
        let (transition, future) = self.core.navigate(target);
        Navigation { transition, future }
    }

    /// Exit and re-enter the current state (or only `state` and below).
    pub fn reload(&self, state: Option<&str>) -> Navigation {
        let reload = state.map_or(Reload::All, |name| Reload::State(name.to_string()));
        let current = self.current();
        let options = TransitionOptions::default().inherit(false).reload(reload).location(LocationOption::Replace);
        self.transition_to(&current.name, self.params(), options)
    }

    /// Link to a state, or `None` when it does not exist or has no URL.
    pub fn href(&self, identifier: &str, params: ParamValues) -> Option<String> {
        self.href_with(identifier, params, HrefOptions::default())
    }

    pub fn href_with(&self, identifier: &str, params: ParamValues, options: HrefOptions) -> Option<String> {
        let relative = options.relative.unwrap_or_else(|| self.current().name.clone());
        let state = self.core.registry.borrow().find(identifier, Some(&relative)).ok()??;
        let url = state.navigable()?.url.clone()?;
        let from = if options.inherit { self.core.current_path() } else { Vec::new() };
        let path = build_path(&state, &params, &from, options.inherit);
        self.core.url_router.href(&url, &path_params(&path), options.absolute)
    }

    // --- hooks ------------------------------------------------------------------

    /// Register a hook of any kind.
    pub fn hook(
        &self,
        kind: HookKind,
        criteria: HookCriteria,
        options: HookOptions,
        callback: impl Fn(&HookContext) -> Result<HookResult, RouteError> + 'static,
    ) -> HookRegistration {
        self.core.hooks.add(kind, criteria, Rc::new(callback), options)
    }

    pub fn on_before(
        &self,
        criteria: HookCriteria,
        callback: impl Fn(&HookContext) -> Result<HookResult, RouteError> + 'static,
    ) -> HookRegistration {
        self.hook(HookKind::Before, criteria, HookOptions::default(), callback)
    }

    pub fn on_start(
        &self,
        criteria: HookCriteria,
        callback: impl Fn(&HookContext) -> Result<HookResult, RouteError> + 'static,
    ) -> HookRegistration {
        self.hook(HookKind::Start, criteria, HookOptions::default(), callback)
    }

    pub fn on_exit(
        &self,
        criteria: HookCriteria,
        callback: impl Fn(&HookContext) -> Result<HookResult, RouteError> + 'static,
    ) -> HookRegistration {
        self.hook(HookKind::Exit, criteria, HookOptions::default(), callback)
    }

    pub fn on_retain(
        &self,
        criteria: HookCriteria,
        callback: impl Fn(&HookContext) -> Result<HookResult, RouteError> + 'static,
    ) -> HookRegistration {
        self.hook(HookKind::Retain, criteria, HookOptions::default(), callback)
    }

    pub fn on_enter(
        &self,
        criteria: HookCriteria,
        callback: impl Fn(&HookContext) -> Result<HookResult, RouteError> + 'static,
    ) -> HookRegistration {
        self.hook(HookKind::Enter, criteria, HookOptions::default(), callback)
    }

    pub fn on_success(
        &self,
        criteria: HookCriteria,
        callback: impl Fn(&HookContext) -> Result<HookResult, RouteError> + 'static,
    ) -> HookRegistration {
        self.hook(HookKind::Success, criteria, HookOptions::default(), callback)
    }

    pub fn on_error(
        &self,
        criteria: HookCriteria,
        callback: impl Fn(&HookContext) -> Result<HookResult, RouteError> + 'static,
    ) -> HookRegistration {
        self.hook(HookKind::Error, criteria, HookOptions::default(), callback)
    }

    /// Called with targets that do not exist and the current state. The first
    /// hook (by priority) that returns a target replaces the invalid one.
    pub fn on_invalid(
        &self,
        priority: i32,
        callback: impl Fn(&TargetState, &StateRef) -> Option<TargetState> + 'static,
    ) -> HookRegistration {
        self.core.hooks.add_invalid(Rc::new(callback), priority)
    }

    /// Called after a successful transition that changed dynamic parameters
    /// of retained states.
    pub fn on_params_changed(
        &self,
        listener: impl Fn(&ParamValues, &Transition) + 'static,
    ) -> ParamsListenerRegistration {
        self.core.add_params_listener(Rc::new(listener))
    }

    /// Replace the handler that receives rejections nobody else handles.
    pub fn set_error_handler(&self, handler: impl Fn(&Rejection) + 'static) {
        self.core.set_error_handler(Rc::new(handler));
    }

    // --- services -----------------------------------------------------------------

    pub fn types(&self) -> Rc<RefCell<ParamTypes>> {
        self.core.types.clone()
    }

    pub fn define_type(&self, name: &str, def: ParamTypeDefinition) -> Result<Rc<ParamType>, ConfigError> {
        self.core.types.borrow_mut().define(name, def)
    }

    /// Queue a type built from injected services; it is built by the next
    /// [`provide`](Self::provide).
    pub fn define_type_deferred(
        &self,
        name: &str,
        def: impl FnOnce(&Injector) -> ParamTypeDefinition + 'static,
    ) -> Result<(), ConfigError> {
        self.core.types.borrow_mut().define_deferred(name, def)
    }

    /// Make a service injectable, then build queued types. Returns how many
    /// queued types were built.
    pub fn provide<T: 'static>(&self, name: &str, value: T) -> Result<usize, ConfigError> {
        self.core.with_injector(|injector| {
            injector.provide(name, value);
        });
        let injector = self.core.injector();
        self.core.types.borrow_mut().flush(&injector)
    }

    pub fn url_router(&self) -> Rc<UrlRouter> {
        self.core.url_router.clone()
    }

    pub fn views(&self) -> Rc<ViewService> {
        self.core.views.clone()
    }

    pub fn register_view_port(&self, port: Rc<dyn ViewPort>) -> ViewPortRegistration {
        self.core.views.register_view_port(port)
    }

    // --- location -----------------------------------------------------------------

    /// Match the attached location and navigate to the state it names.
    /// Redirect rules rewrite the location and match again.
    pub fn sync(&self) -> Option<Navigation> {
        for _ in 0..=self.core.config.max_redirects {
            let matched = match self.core.url_router.sync() {
                Ok(matched) => matched,
                Err(err) => {
                    tracing::warn!(error = %err, "url match failed");
                    return None;
                }
            };
            match matched {
                Some(UrlRuleMatch::State { name, params }) => {
                    let options = TransitionOptions::default()
                        .inherit(true)
                        .location(LocationOption::Skip)
                        .source(TransitionSource::Url);
                    return Some(self.transition_to(&name, params, options));
                }
                Some(UrlRuleMatch::Redirect(url)) => {
                    tracing::debug!(url = %url, "url rule redirect");
                    match self.core.url_router.location() {
                        Some(location) => location.set_url(&url, true),
                        None => return None,
                    }
                }
                Some(UrlRuleMatch::Handled) | None => return None,
            }
        }
        tracing::warn!(max = self.core.config.max_redirects, "url rule redirect limit reached");
        None
    }

    /// Attach `location` and navigate whenever it changes. Navigations are
    /// spawned on `spawner`.
    pub fn listen(&self, location: Rc<dyn Location>, spawner: impl LocalSpawn + 'static) {
        self.core.url_router.attach(location.clone());
        let core = Rc::downgrade(&self.core);
        location.on_change(Rc::new(move || {
            let Some(core) = core.upgrade() else {
                return;
            };
            let Some(navigation) = (Router { core }).sync() else {
                return;
            };
            let id = navigation.transition().id();
            let spawned = spawner.spawn_local(navigation.map(move |result| {
                if let Err(rejection) = result {
                    tracing::trace!(transition = id, rejection = %rejection, "url navigation rejected");
                }
            }));
            if let Err(err) = spawned {
                tracing::warn!(error = %err, "could not spawn url navigation");
            }
        }));
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("current", &self.current().display_name())
            .field("states", &self.states().len())
            .finish()
    }
}

fn params_match(params: &[Param], expected: &ParamValues, actual: &ParamValues) -> bool {
    expected.iter().all(|(id, value)| match params.iter().find(|p| p.id == *id) {
        Some(param) => param.equals(param.value(Some(value)).as_ref(), actual.get(id)),
        None => false,
    })
}
