//! Shared router state.
//!
//! [`RouterCore`] is what transitions and the [`Router`](crate::Router)
//! facade share: the registries, the committed path, the current transition
//! and the injector. Transitions only hold a `Weak` to it.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use futures::FutureExt;
use futures::future::LocalBoxFuture;

use crate::ParamValues;
use crate::api::RouterConfig;
use crate::error::ConfigError;
use crate::injector::Injector;
use crate::params::ParamTypes;
use crate::state::{StateRef, StateRegistry, TargetState, ViewService};
use crate::transition::{
    HookRegistry, LocationOption, PathNode, RejectType, Rejection, Transition, TransitionOptions, TransitionSource,
    path_params,
};
use crate::url::{UrlMatcherFactory, UrlRouter};

/// Called with every rejection that is not ignored, aborted or a redirect.
pub type ErrorHandler = Rc<dyn Fn(&Rejection)>;

/// Called with the dynamic parameters that changed on retained states.
pub type ParamsListener = Rc<dyn Fn(&ParamValues, &Transition)>;

#[derive(Default)]
struct Globals {
    path: Vec<PathNode>,
    params: ParamValues,
    last_success: Option<Transition>,
}

pub(crate) struct RouterCore {
    pub config: RouterConfig,
    pub types: Rc<RefCell<ParamTypes>>,
    pub registry: RefCell<StateRegistry>,
    pub url_router: Rc<UrlRouter>,
    pub views: Rc<ViewService>,
    pub hooks: Rc<HookRegistry>,
    injector: RefCell<Rc<Injector>>,
    globals: RefCell<Globals>,
    current: RefCell<Option<Transition>>,
    /// Id of the newest transition that started (became current or was
    /// ignored).
    last_started: Cell<u64>,
    next_id: Cell<u64>,
    next_listener: Cell<u64>,
    params_listeners: RefCell<Vec<(u64, ParamsListener)>>,
    error_handler: RefCell<ErrorHandler>,
}

impl RouterCore {
    pub fn new(config: RouterConfig) -> Result<Rc<Self>, ConfigError> {
        let types = Rc::new(RefCell::new(ParamTypes::new()));
        let url_config = config.url_config();
        let factory = UrlMatcherFactory::new(url_config.clone(), types.clone());
        let registry = StateRegistry::new(factory)?;
        let root = PathNode::new(registry.root()).apply_raw_params(&ParamValues::new());
        let globals = Globals { params: path_params(std::slice::from_ref(&root)), path: vec![root], last_success: None };

        Ok(Rc::new(RouterCore {
            config,
            types,
            registry: RefCell::new(registry),
            url_router: Rc::new(UrlRouter::new(url_config)),
            views: ViewService::new(),
            hooks: Rc::new(HookRegistry::default()),
            injector: RefCell::new(Rc::new(Injector::new())),
            globals: RefCell::new(globals),
            current: RefCell::new(None),
            last_started: Cell::new(0),
            next_id: Cell::new(0),
            next_listener: Cell::new(0),
            params_listeners: RefCell::new(Vec::new()),
            error_handler: RefCell::new(Rc::new(default_error_handler)),
        }))
    }

    pub fn root(&self) -> StateRef {
        self.registry.borrow().root()
    }

    pub fn state(&self, name: &str) -> Option<StateRef> {
        self.registry.borrow().get(name)
    }

    pub fn injector(&self) -> Rc<Injector> {
        self.injector.borrow().clone()
    }

    pub fn with_injector<R>(&self, f: impl FnOnce(&mut Injector) -> R) -> R {
        let mut injector = self.injector.borrow_mut();
        f(Rc::make_mut(&mut injector))
    }

    // --- committed state ------------------------------------------------------

    pub fn current_path(&self) -> Vec<PathNode> {
        self.globals.borrow().path.clone()
    }

    pub fn current_state(&self) -> StateRef {
        self.globals.borrow().path.last().map_or_else(|| self.root(), |n| n.state.clone())
    }

    pub fn params(&self) -> ParamValues {
        self.globals.borrow().params.clone()
    }

    pub fn last_success(&self) -> Option<Transition> {
        self.globals.borrow().last_success.clone()
    }

    // --- current transition ---------------------------------------------------

    pub fn next_transition_id(&self) -> u64 {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        id
    }

    pub fn current_transition(&self) -> Option<Transition> {
        self.current.borrow().clone()
    }

    pub fn is_current(&self, id: u64) -> bool {
        self.current.borrow().as_ref().is_some_and(|t| t.id() == id)
    }

    pub fn set_current(&self, transition: &Transition) {
        self.last_started.set(self.last_started.get().max(transition.id()));
        let previous = self.current.replace(Some(transition.clone()));
        if let Some(previous) = previous {
            tracing::debug!(superseded = previous.id(), by = transition.id(), "transition superseded");
        }
    }

    /// An ignored transition still counts as the newest navigation: whatever
    /// is in flight loses its place, and the router stays where it is.
    pub fn supersede_current(&self, ignored: &Transition) {
        self.last_started.set(self.last_started.get().max(ignored.id()));
        if let Some(previous) = self.current.take() {
            tracing::debug!(superseded = previous.id(), by = ignored.id(), "transition superseded by an ignored one");
        }
    }

    /// True when a transition newer than `id` has started since.
    pub fn started_after(&self, id: u64) -> bool {
        self.last_started.get() > id
    }

    pub fn clear_current(&self, id: u64) {
        let mut current = self.current.borrow_mut();
        if current.as_ref().is_some_and(|t| t.id() == id) {
            *current = None;
        }
    }

    // --- targets and navigation -----------------------------------------------

    /// Look up `identifier` (relative to `options.relative`). Unknown or
    /// unresolvable names give a target without a state.
    pub fn target(&self, identifier: &str, params: ParamValues, options: TransitionOptions) -> TargetState {
        let found = self.registry.borrow().find(identifier, options.relative.as_deref());
        let state = match found {
            Ok(state) => state,
            Err(err) => {
                tracing::debug!(identifier, error = %err, "target lookup failed");
                None
            }
        };
        TargetState::new(identifier, state, params, options)
    }

    /// Give `onInvalid` hooks a chance to replace a target that does not exist.
    fn replace_invalid(&self, mut target: TargetState) -> TargetState {
        for _ in 0..self.config.max_redirects {
            if target.exists() {
                break;
            }
            let from = self.current_state();
            let replacement = self.hooks.invalid_hooks().into_iter().find_map(|hook| hook(&target, &from));
            let Some(replacement) = replacement else {
                break;
            };
            tracing::debug!(invalid = %target, replacement = %replacement, "invalid target replaced");
            let mut options = replacement.options().clone();
            if options.relative.is_none() {
                options.relative = target.options().relative.clone();
            }
            target = self.target(replacement.identifier(), replacement.params().clone(), options);
        }
        target
    }

    /// Create and start a transition. Redirect chains are followed inside the
    /// returned future; an ignored transition resolves to the current state.
    pub fn navigate(self: &Rc<Self>, target: TargetState) -> (Transition, LocalBoxFuture<'static, Result<StateRef, Rejection>>) {
        let target = self.replace_invalid(target);
        let transition = Transition::create(self, target, None);
        let first = transition.run();
        let core = Rc::downgrade(self);

        let future = async move {
            let mut pending = first;
            loop {
                let rejection = match pending.await {
                    Ok(state) => return Ok(state),
                    Err(rejection) => rejection,
                };
                if rejection.kind == RejectType::Ignored {
                    return match core.upgrade() {
                        Some(core) => Ok(core.current_state()),
                        None => Err(rejection),
                    };
                }
                if let Some(next) = rejection.redirect.clone() {
                    pending = next.run();
                    continue;
                }
                if let Some(core) = core.upgrade() {
                    core.handle_rejection(&rejection);
                }
                return Err(rejection);
            }
        }
        .boxed_local();
        (transition, future)
    }

    fn handle_rejection(&self, rejection: &Rejection) {
        if matches!(rejection.kind, RejectType::Ignored | RejectType::Aborted) || rejection.redirected {
            return;
        }
        let handler = self.error_handler.borrow().clone();
        handler(rejection);
    }

    pub fn set_error_handler(&self, handler: ErrorHandler) {
        *self.error_handler.borrow_mut() = handler;
    }

    // --- commit ---------------------------------------------------------------

    /// Make the transition's target path the committed path.
    pub fn commit(&self, transition: &Transition) -> StateRef {
        let changes = transition.tree_changes();
        let state = transition.to_state();
        let params = path_params(&changes.to);
        {
            let mut globals = self.globals.borrow_mut();
            globals.path = changes.to.clone();
            globals.params = params.clone();
            globals.last_success = Some(transition.clone());
        }
        self.clear_current(transition.id());
        tracing::debug!(transition = transition.id(), state = %state, params = %params, "path committed");

        self.views.activate(changes.to.iter().flat_map(|n| n.state.views.iter().cloned()).collect());

        let options = transition.options();
        if options.location != LocationOption::Skip && options.source != TransitionSource::Url {
            if let Some(url) = state.navigable().filter(|s| !s.is_root()).and_then(|s| s.url.clone()) {
                self.url_router.push(&url, &params, options.location == LocationOption::Replace);
            }
        }

        if options.notify {
            let changed = changes.changed_dynamic_params();
            if !changed.is_empty() {
                let listeners: Vec<ParamsListener> = self.params_listeners.borrow().iter().map(|(_, l)| l.clone()).collect();
                tracing::trace!(changed = %changed, listeners = listeners.len(), "dynamic params changed");
                for listener in listeners {
                    listener(&changed, transition);
                }
            }
        }
        state
    }

    /// Point the location back at the committed state.
    pub fn restore_location(&self) {
        if self.url_router.location().is_none() {
            return;
        }
        let state = self.current_state();
        if let Some(url) = state.navigable().filter(|s| !s.is_root()).and_then(|s| s.url.clone()) {
            self.url_router.push(&url, &self.params(), true);
        }
    }

    // --- listeners --------------------------------------------------------------

    pub fn add_params_listener(self: &Rc<Self>, listener: ParamsListener) -> ParamsListenerRegistration {
        let id = self.next_listener.get() + 1;
        self.next_listener.set(id);
        self.params_listeners.borrow_mut().push((id, listener));
        ParamsListenerRegistration { core: Rc::downgrade(self), id }
    }

    pub fn remove_params_listener(&self, id: u64) -> bool {
        let mut listeners = self.params_listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }
}

/// Handle returned by [`Router::on_params_changed`](crate::Router::on_params_changed).
#[derive(Clone)]
pub struct ParamsListenerRegistration {
    core: Weak<RouterCore>,
    id: u64,
}

impl ParamsListenerRegistration {
    /// Remove the listener. Returns false when it was already gone.
    pub fn deregister(&self) -> bool {
        self.core.upgrade().is_some_and(|core| core.remove_params_listener(self.id))
    }
}

fn default_error_handler(rejection: &Rejection) {
    match rejection.kind {
        RejectType::Error => tracing::error!(rejection = %rejection, detail = ?rejection.detail, "transition failed"),
        _ => tracing::debug!(rejection = %rejection, "transition rejected"),
    }
}
