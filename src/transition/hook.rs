use std::fmt;
use std::future::Future;
use std::rc::Rc;

use futures::FutureExt;
use futures::future::LocalBoxFuture;

use super::hooks::HookKind;
use super::options::TransitionOptions;
use super::pipeline::Transition;
use crate::error::RouteError;
use crate::injector::{AnyValue, downcast};
use crate::resolve::{ResolveFuture, Resolvable};
use crate::state::{StateRef, TargetState};
use crate::ParamValues;

/// A hook callback.
pub type HookFn = Rc<dyn Fn(&HookContext) -> Result<HookResult, RouteError>>;

/// Called with the unknown target and the current state; may return a
/// replacement target.
pub type InvalidHookFn = Rc<dyn Fn(&TargetState, &StateRef) -> Option<TargetState>>;

/// What a hook asks the transition to do next.
pub enum HookResult {
    Continue,
    /// Reject the transition with `Aborted`.
    Abort,
    /// Supersede the transition with one to this target.
    Redirect(TargetState),
    /// Merge resolvables into the hook's node (the target state for
    /// transition-wide hooks).
    AddResolvables(Vec<Resolvable>),
    /// Await, then interpret the produced result.
    Pending(LocalBoxFuture<'static, Result<HookResult, RouteError>>),
}

impl HookResult {
    /// Wrap an asynchronous hook body.
    pub fn pending<R, F>(fut: F) -> Self
    where
        R: Into<HookResult>,
        F: Future<Output = Result<R, RouteError>> + 'static,
    {
        HookResult::Pending(async move { fut.await.map(Into::into) }.boxed_local())
    }
}

impl From<bool> for HookResult {
    fn from(proceed: bool) -> Self {
        if proceed { HookResult::Continue } else { HookResult::Abort }
    }
}

impl From<()> for HookResult {
    fn from(_: ()) -> Self {
        HookResult::Continue
    }
}

impl From<TargetState> for HookResult {
    fn from(target: TargetState) -> Self {
        HookResult::Redirect(target)
    }
}

impl From<Option<TargetState>> for HookResult {
    fn from(target: Option<TargetState>) -> Self {
        target.map_or(HookResult::Continue, HookResult::Redirect)
    }
}

impl fmt::Debug for HookResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookResult::Continue => f.write_str("Continue"),
            HookResult::Abort => f.write_str("Abort"),
            HookResult::Redirect(target) => f.debug_tuple("Redirect").field(target).finish(),
            HookResult::AddResolvables(rs) => {
                f.debug_tuple("AddResolvables").field(&rs.iter().map(|r| r.token.as_str()).collect::<Vec<_>>()).finish()
            }
            HookResult::Pending(_) => f.write_str("Pending"),
        }
    }
}

/// Which resolve scope a hook sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HookScope {
    /// The target path, at this node index.
    To(usize),
    /// The exiting path, at this node index.
    From(usize),
}

/// Everything a hook callback can look at.
pub struct HookContext {
    transition: Transition,
    kind: HookKind,
    state: Option<StateRef>,
    scope: HookScope,
}

impl HookContext {
    pub(crate) fn new(transition: Transition, kind: HookKind, state: Option<StateRef>, scope: HookScope) -> Self {
        HookContext { transition, kind, state, scope }
    }

    pub fn transition(&self) -> &Transition {
        &self.transition
    }

    pub fn kind(&self) -> HookKind {
        self.kind
    }

    /// The entering, exiting or retained state for state-scoped hooks.
    pub fn state(&self) -> Option<&StateRef> {
        self.state.as_ref()
    }

    /// Target parameter values.
    pub fn params(&self) -> ParamValues {
        self.transition.params()
    }

    pub(crate) fn scope(&self) -> HookScope {
        self.scope
    }

    /// Resolve a token visible to this hook, on demand.
    pub fn resolve(&self, token: &str) -> ResolveFuture {
        match self.scope {
            HookScope::To(idx) => self.transition.context().get(token, Some(idx)),
            HookScope::From(idx) => self.transition.from_context().get(token, Some(idx)),
        }
    }

    /// A value that has already been resolved.
    pub fn resolved<T: 'static>(&self, token: &str) -> Option<Rc<T>> {
        let value: Option<AnyValue> = match self.scope {
            HookScope::To(idx) => self.transition.context().value(token, Some(idx)),
            HookScope::From(idx) => self.transition.from_context().value(token, Some(idx)),
        };
        value.and_then(|v| downcast::<T>(token, &v).ok())
    }

    /// A redirect target. Relative names resolve against this hook's state,
    /// or the transition's target for transition-wide hooks.
    pub fn target(&self, identifier: &str, params: ParamValues) -> TargetState {
        let base = self.state.clone().unwrap_or_else(|| self.transition.to_state());
        TargetState::new(identifier, None, params, TransitionOptions::default().relative(base.name.clone()))
    }
}

impl fmt::Debug for HookContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookContext")
            .field("transition", &self.transition.id())
            .field("kind", &self.kind)
            .field("state", &self.state.as_ref().map(|s| s.name.as_str()))
            .finish()
    }
}
