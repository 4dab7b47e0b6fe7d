//! The transition run loop.
//!
//! ```text
//! run()  ── sync ──▶ invalid? ignored? ─▶ become current ─▶ onBefore
//!          ── async ─▶ [await onBefore continuations]
//!                      onStart   (eager resolve, then hooks)
//!                      onExit    per exiting node, deepest first
//!                      onRetain  per retained node
//!                      onEnter   per entering node (lazy resolve first)
//!                      commit ─▶ onSuccess
//!          on rejection ─▶ onError (not for ignored transitions)
//! ```
//!
//! Before a hook runs, and again before its result is applied, the transition
//! checks that it is still the router's current transition. If it is not, it
//! rejects with `Superseded`.
//!
//! An ignored transition still supersedes whatever is in flight, and a
//! redirect does not start once a newer navigation has.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::Instant;

use futures::FutureExt;
use futures::future::LocalBoxFuture;

use super::hook::{HookContext, HookFn, HookResult, HookScope};
use super::hooks::{HookKind, HookMatch, RegisteredHook};
use super::metrics::{PhaseMetrics, TransitionMetrics};
use super::options::{LocationOption, Reload, TransitionOptions, TransitionSource};
use super::path::{PathNode, TreeChanges, build_path, path_params};
use super::rejection::{RejectType, Rejection};
use crate::error::RouteError;
use crate::injector::any_value;
use crate::params::params_validate;
use crate::resolve::{ResolveContext, ResolveFuture, ResolvePolicy};
use crate::router::RouterCore;
use crate::state::{StateRef, TargetState};
use crate::ParamValues;

type Continuation = (LocalBoxFuture<'static, Result<HookResult, RouteError>>, HookContext);

pub(crate) struct TransitionInner {
    id: u64,
    core: Weak<RouterCore>,
    target: TargetState,
    options: TransitionOptions,
    changes: TreeChanges,
    from_state: StateRef,
    to_state: StateRef,
    context: ResolveContext,
    from_context: ResolveContext,
    redirected_from: Option<Transition>,
    redirect_depth: usize,
    invalid: Option<String>,
    started: Cell<bool>,
    result: RefCell<Option<Result<StateRef, Rejection>>>,
    metrics: RefCell<TransitionMetrics>,
}

/// One attempt to move the router from its current path to a target.
///
/// Cheap to clone; every clone refers to the same transition.
#[derive(Clone)]
pub struct Transition {
    inner: Rc<TransitionInner>,
}

impl Transition {
    pub(crate) fn create(core: &Rc<RouterCore>, target: TargetState, redirected_from: Option<&Transition>) -> Transition {
        let id = core.next_transition_id();
        let from = core.current_path();
        let options = target.options().clone();

        let mut invalid = target.error();
        let to = match target.state() {
            Some(state) => build_path(state, target.params(), &from, options.inherit),
            None => from.clone(),
        };
        if let (None, Some(state)) = (&invalid, target.state()) {
            invalid = validate(state, &to, &options, core);
        }
        let changes = TreeChanges::compute(&from, to, &options.reload);
        let from_state = changes.from_state().cloned().unwrap_or_else(|| core.root());
        let to_state = changes.to_state().cloned().unwrap_or_else(|| from_state.clone());

        let injector = core.injector();
        let policy = core.config.default_resolve_policy;
        let context = ResolveContext::new(changes.to.clone(), injector.clone(), policy);
        let from_context = ResolveContext::new(changes.from.clone(), injector, policy);

        let inner = Rc::new_cyclic(|weak: &Weak<TransitionInner>| {
            let to_params = path_params(&changes.to);
            for ctx in [&context, &from_context] {
                let weak = weak.clone();
                ctx.provide_local("$transition$", Rc::new(move || weak.upgrade().map(|inner| any_value(Transition { inner }))));
                let params = to_params.clone();
                ctx.provide_local("$stateParams", Rc::new(move || Some(any_value(params.clone()))));
            }
            TransitionInner {
                id,
                core: Rc::downgrade(core),
                target,
                options,
                changes,
                from_state,
                to_state,
                context,
                from_context,
                redirected_from: redirected_from.cloned(),
                redirect_depth: redirected_from.map_or(0, |t| t.inner.redirect_depth + 1),
                invalid,
                started: Cell::new(false),
                result: RefCell::new(None),
                metrics: RefCell::new(TransitionMetrics::default()),
            }
        });
        let transition = Transition { inner };
        tracing::trace!(transition = id, changes = ?transition.inner.changes, "transition created");
        transition
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn target(&self) -> &TargetState {
        &self.inner.target
    }

    pub fn options(&self) -> &TransitionOptions {
        &self.inner.options
    }

    pub fn tree_changes(&self) -> &TreeChanges {
        &self.inner.changes
    }

    /// The deepest state of the target path.
    pub fn to_state(&self) -> StateRef {
        self.inner.to_state.clone()
    }

    pub fn from_state(&self) -> StateRef {
        self.inner.from_state.clone()
    }

    /// Parameter values of the target path.
    pub fn params(&self) -> ParamValues {
        path_params(&self.inner.changes.to)
    }

    pub fn from_params(&self) -> ParamValues {
        path_params(&self.inner.changes.from)
    }

    pub fn entering(&self) -> Vec<StateRef> {
        self.inner.changes.entering.iter().map(|n| n.state.clone()).collect()
    }

    pub fn exiting(&self) -> Vec<StateRef> {
        self.inner.changes.exiting.iter().map(|n| n.state.clone()).collect()
    }

    pub fn retained(&self) -> Vec<StateRef> {
        self.inner.changes.retained.iter().map(|n| n.state.clone()).collect()
    }

    /// Resolve scope of the target path.
    pub fn context(&self) -> &ResolveContext {
        &self.inner.context
    }

    /// Resolve scope of the path being left (used by exit hooks).
    pub fn from_context(&self) -> &ResolveContext {
        &self.inner.from_context
    }

    /// Resolve a token visible at the target state, on demand.
    pub fn resolve(&self, token: &str) -> ResolveFuture {
        self.inner.context.get(token, None)
    }

    pub fn redirected_from(&self) -> Option<&Transition> {
        self.inner.redirected_from.as_ref()
    }

    /// The first transition of a redirect chain.
    pub fn original(&self) -> &Transition {
        let mut current = self;
        while let Some(previous) = current.redirected_from() {
            current = previous;
        }
        current
    }

    /// Number of redirects that led to this transition.
    pub fn redirect_depth(&self) -> usize {
        self.inner.redirect_depth
    }

    /// True while this is the router's current transition.
    pub fn is_active(&self) -> bool {
        self.inner.core.upgrade().is_some_and(|core| core.is_current(self.id()))
    }

    pub fn is_valid(&self) -> bool {
        self.inner.invalid.is_none()
    }

    /// Why the transition is invalid.
    pub fn error(&self) -> Option<&str> {
        self.inner.invalid.as_deref()
    }

    /// Nothing would exit or enter and no parameter changes.
    pub fn is_ignored(&self) -> bool {
        self.is_valid() && self.inner.options.reload == Reload::No && self.inner.changes.is_unchanged()
    }

    /// Only dynamic parameters change.
    pub fn is_dynamic(&self) -> bool {
        let changes = &self.inner.changes;
        changes.entering.is_empty() && changes.exiting.is_empty() && !changes.changed_dynamic_params().is_empty()
    }

    /// The settled outcome. A redirect rejection stored here does not carry
    /// the replacement transition (that one points back through
    /// `redirected_from`).
    pub fn result(&self) -> Option<Result<StateRef, Rejection>> {
        self.inner.result.borrow().clone()
    }

    pub fn metrics(&self) -> TransitionMetrics {
        self.inner.metrics.borrow().clone()
    }

    fn core(&self) -> Result<Rc<RouterCore>, Rejection> {
        self.inner.core.upgrade().ok_or_else(|| Rejection::error(RouteError::msg("the router has been dropped")))
    }

    /// Start the transition. The synchronous part (validity, becoming current,
    /// `onBefore` hooks) runs immediately; the rest runs when the returned
    /// future is polled.
    pub(crate) fn run(&self) -> LocalBoxFuture<'static, Result<StateRef, Rejection>> {
        let started = Instant::now();
        if self.inner.started.replace(true) {
            let result = self.result().unwrap_or_else(|| Err(Rejection::error(RouteError::msg("transition already started"))));
            return futures::future::ready(result).boxed_local();
        }

        let before = self.start();
        let transition = self.clone();
        async move {
            let result = match before {
                Ok(pending) => transition.run_async(pending).await,
                Err(rejection) => Err(rejection),
            };
            transition.finish(result, started).await
        }
        .boxed_local()
    }

    fn start(&self) -> Result<Vec<Continuation>, Rejection> {
        let core = self.core()?;
        if let Some(message) = &self.inner.invalid {
            tracing::debug!(transition = self.id(), reason = %message, "transition invalid");
            return Err(Rejection::invalid(message.clone()));
        }
        if let Some(previous) = self.redirected_from() {
            if core.started_after(previous.id()) {
                tracing::debug!(
                    transition = self.id(),
                    redirected_from = previous.id(),
                    "redirect overtaken by a newer navigation"
                );
                return Err(Rejection::superseded("The redirect was superseded by a newer transition"));
            }
        }
        if self.is_ignored() {
            tracing::debug!(transition = self.id(), state = %self.to_state(), "transition ignored");
            core.supersede_current(self);
            return Err(Rejection::ignored());
        }

        core.set_current(self);
        tracing::debug!(
            transition = self.id(),
            from = %self.from_state(),
            to = %self.to_state(),
            redirect_depth = self.redirect_depth(),
            "transition started"
        );

        let t0 = Instant::now();
        let mut phase = PhaseMetrics::new(HookKind::Before);
        let mut pending = Vec::new();
        for (hook, _) in self.registered(&core, HookKind::Before) {
            self.check_current()?;
            let ctx = self.context_for(HookKind::Before, None, self.deepest());
            core.hooks.invoked(&hook);
            phase.hooks_run += 1;
            tracing::trace!(transition = self.id(), hook = hook.id, "onBefore");
            match (hook.callback)(&ctx).map_err(Rejection::error)? {
                HookResult::Pending(fut) => pending.push((fut, ctx)),
                other => self.apply(other, &ctx)?,
            }
        }
        phase.duration = t0.elapsed();
        self.inner.metrics.borrow_mut().record(phase);
        Ok(pending)
    }

    async fn run_async(&self, before: Vec<Continuation>) -> Result<StateRef, Rejection> {
        for (fut, ctx) in before {
            let result = fut.await.map_err(Rejection::error)?;
            self.settle_result(result, &ctx).await?;
        }

        // onStart, with eager resolvables first.
        self.check_current()?;
        let t0 = Instant::now();
        let mut phase = PhaseMetrics::new(HookKind::Start);
        let tokens = self.inner.context.resolve_path(ResolvePolicy::Eager, None).await.map_err(Rejection::error)?;
        phase.resolved = tokens.len();
        phase.hooks_run = self.run_transition_hooks(HookKind::Start).await?;
        phase.duration = t0.elapsed();
        self.inner.metrics.borrow_mut().record(phase);

        for kind in [HookKind::Exit, HookKind::Retain, HookKind::Enter] {
            let t0 = Instant::now();
            let mut phase = PhaseMetrics::new(kind);
            self.run_state_hooks(kind, &mut phase).await?;
            phase.duration = t0.elapsed();
            self.inner.metrics.borrow_mut().record(phase);
        }

        self.check_current()?;
        let core = self.core()?;
        let t0 = Instant::now();
        let state = core.commit(self);
        let mut phase = PhaseMetrics::new(HookKind::Success);
        let (count, continuation) = self.run_final_hooks(&core, HookKind::Success, None);
        phase.hooks_run = count;
        continuation.await;
        phase.duration = t0.elapsed();
        self.inner.metrics.borrow_mut().record(phase);
        Ok(state)
    }

    async fn run_transition_hooks(&self, kind: HookKind) -> Result<usize, Rejection> {
        let core = self.core()?;
        let mut count = 0;
        for (hook, _) in self.registered(&core, kind) {
            if !core.hooks.contains(hook.id) {
                continue;
            }
            let ctx = self.context_for(kind, None, self.deepest());
            self.invoke(&core, Some(&hook), &hook.callback, ctx).await?;
            count += 1;
        }
        Ok(count)
    }

    async fn run_state_hooks(&self, kind: HookKind, phase: &mut PhaseMetrics) -> Result<(), Rejection> {
        let core = self.core()?;
        let Some(set) = kind.scope() else {
            return Ok(());
        };
        let registered = self.registered(&core, kind);
        let changes = &self.inner.changes;
        let nodes: &[PathNode] = match kind {
            HookKind::Exit => &changes.exiting,
            HookKind::Retain => &changes.retained,
            _ => &changes.entering,
        };

        for (idx, node) in nodes.iter().enumerate() {
            let scope = match kind {
                HookKind::Exit => HookScope::From(changes.from.len() - 1 - idx),
                HookKind::Retain => HookScope::To(idx),
                _ => HookScope::To(changes.retained.len() + idx),
            };

            if let (HookKind::Enter, HookScope::To(to_idx)) = (kind, scope) {
                self.check_current()?;
                let tokens = self
                    .inner
                    .context
                    .resolve_path(ResolvePolicy::Lazy, Some(to_idx))
                    .await
                    .map_err(Rejection::error)?;
                phase.resolved += tokens.len();
            }

            for (hook, matched) in &registered {
                if matched.nodes(set).contains(&idx) && core.hooks.contains(hook.id) {
                    let ctx = self.context_for(kind, Some(node.state.clone()), scope);
                    self.invoke(&core, Some(hook), &hook.callback, ctx).await?;
                    phase.hooks_run += 1;
                }
            }

            let declared = match kind {
                HookKind::Exit => node.state.declaration.on_exit.clone(),
                HookKind::Retain => node.state.declaration.on_retain.clone(),
                _ => node.state.declaration.on_enter.clone(),
            };
            if let Some(callback) = declared {
                let ctx = self.context_for(kind, Some(node.state.clone()), scope);
                self.invoke(&core, None, &callback, ctx).await?;
                phase.hooks_run += 1;
            }
        }
        Ok(())
    }

    /// `onSuccess`/`onError` hooks. Every callback runs right away; futures
    /// they return are chained into the returned continuation. Results are
    /// ignored and failures only logged.
    fn run_final_hooks(
        &self,
        core: &RouterCore,
        kind: HookKind,
        rejection: Option<&Rejection>,
    ) -> (usize, LocalBoxFuture<'static, ()>) {
        let mut count = 0;
        let mut pending = Vec::new();
        let rejected = rejection.map(|r| r.kind);
        for (hook, _) in self.registered(core, kind) {
            let ctx = self.context_for(kind, None, self.deepest());
            core.hooks.invoked(&hook);
            count += 1;
            match (hook.callback)(&ctx) {
                Ok(HookResult::Continue) => {}
                Ok(HookResult::Pending(fut)) => pending.push((hook.id, fut)),
                Ok(other) => tracing::trace!(transition = self.id(), hook = hook.id, result = ?other, "{kind} result ignored"),
                Err(err) => tracing::warn!(
                    transition = self.id(),
                    hook = hook.id,
                    error = %err,
                    rejection = ?rejected,
                    "{kind} hook failed"
                ),
            }
        }

        let id = self.id();
        let continuation = async move {
            for (hook, mut fut) in pending {
                loop {
                    match fut.await {
                        Ok(HookResult::Pending(next)) => fut = next,
                        Ok(HookResult::Continue) => break,
                        Ok(other) => {
                            tracing::trace!(transition = id, hook, result = ?other, "{kind} result ignored");
                            break;
                        }
                        Err(err) => {
                            tracing::warn!(transition = id, hook, error = %err, rejection = ?rejected, "{kind} hook failed");
                            break;
                        }
                    }
                }
            }
        };
        (count, continuation.boxed_local())
    }

    fn registered(&self, core: &RouterCore, kind: HookKind) -> Vec<(Rc<RegisteredHook>, HookMatch)> {
        if !self.inner.options.notify {
            return Vec::new();
        }
        core.hooks.matching(kind, &self.inner.changes)
    }

    fn deepest(&self) -> HookScope {
        HookScope::To(self.inner.changes.to.len().saturating_sub(1))
    }

    fn context_for(&self, kind: HookKind, state: Option<StateRef>, scope: HookScope) -> HookContext {
        HookContext::new(self.clone(), kind, state, scope)
    }

    async fn invoke(
        &self,
        core: &RouterCore,
        hook: Option<&RegisteredHook>,
        callback: &HookFn,
        ctx: HookContext,
    ) -> Result<(), Rejection> {
        self.check_current()?;
        if let Some(hook) = hook {
            core.hooks.invoked(hook);
        }
        tracing::trace!(
            transition = self.id(),
            kind = %ctx.kind(),
            state = ?ctx.state().map(|s| s.name.as_str()),
            hook = ?hook.map(|h| h.id),
            "invoking hook"
        );
        let result = callback(&ctx).map_err(Rejection::error)?;
        self.settle_result(result, &ctx).await
    }

    /// Await pending results, then apply the final one.
    async fn settle_result(&self, mut result: HookResult, ctx: &HookContext) -> Result<(), Rejection> {
        while let HookResult::Pending(fut) = result {
            result = fut.await.map_err(Rejection::error)?;
        }
        self.apply(result, ctx)
    }

    fn apply(&self, result: HookResult, ctx: &HookContext) -> Result<(), Rejection> {
        self.check_current()?;
        match result {
            HookResult::Continue => Ok(()),
            HookResult::Abort => {
                tracing::debug!(transition = self.id(), kind = %ctx.kind(), "transition aborted by hook");
                Err(Rejection::aborted(format!("The transition was aborted by an {} hook", ctx.kind())))
            }
            HookResult::Redirect(target) => Err(self.redirect(target)),
            HookResult::AddResolvables(resolvables) => {
                match ctx.scope() {
                    HookScope::To(idx) => self.inner.context.add_resolvables(idx, resolvables),
                    HookScope::From(idx) => self.inner.from_context.add_resolvables(idx, resolvables),
                }
                Ok(())
            }
            // Drained by `settle_result` and kept aside by `start`.
            HookResult::Pending(_) => Ok(()),
        }
    }

    fn check_current(&self) -> Result<(), Rejection> {
        match self.inner.core.upgrade() {
            Some(core) if core.is_current(self.id()) => Ok(()),
            _ => Err(Rejection::superseded("The transition has been superseded by a different transition")),
        }
    }

    /// Build the replacement transition for a hook redirect.
    fn redirect(&self, target: TargetState) -> Rejection {
        let core = match self.core() {
            Ok(core) => core,
            Err(rejection) => return rejection,
        };
        let max = core.config.max_redirects;
        if self.redirect_depth() + 1 > max {
            tracing::warn!(transition = self.id(), max, "redirect limit reached");
            return Rejection::error(RouteError::TooManyRedirects(max));
        }

        let requested = target.options();
        let mut options = self.inner.options.clone();
        options.relative = requested.relative.clone();
        options.reload = requested.reload.clone();
        if !requested.custom.is_null() {
            options.custom = requested.custom.clone();
        }
        if options.location == LocationOption::Push && options.source == TransitionSource::Url {
            options.location = LocationOption::Replace;
        }
        options.source = TransitionSource::Redirect;

        let resolved = core.target(target.identifier(), target.params().clone(), options);
        let next = Transition::create(&core, resolved, Some(self));
        tracing::debug!(transition = self.id(), redirect = next.id(), to = %next.target(), "transition redirected");
        Rejection::redirected(next)
    }

    async fn finish(&self, result: Result<StateRef, Rejection>, started: Instant) -> Result<StateRef, Rejection> {
        if let (Err(rejection), Ok(core)) = (&result, self.core()) {
            let mut error_hooks = None;
            if rejection.kind != RejectType::Ignored {
                let t0 = Instant::now();
                let (count, continuation) = self.run_final_hooks(&core, HookKind::Error, Some(rejection));
                error_hooks = Some((t0, count, continuation));
            }
            core.clear_current(self.id());
            if rejection.kind == RejectType::Aborted && self.inner.options.source == TransitionSource::Url {
                core.restore_location();
            }
            if let Some((t0, count, continuation)) = error_hooks {
                continuation.await;
                let mut phase = PhaseMetrics::new(HookKind::Error);
                phase.hooks_run = count;
                phase.duration = t0.elapsed();
                self.inner.metrics.borrow_mut().record(phase);
            }
        }

        self.inner.metrics.borrow_mut().total = started.elapsed();
        let stored = result.clone().map_err(|rejection| Rejection { redirect: None, ..rejection });
        *self.inner.result.borrow_mut() = Some(stored);
        match &result {
            Ok(state) => tracing::debug!(transition = self.id(), state = %state, "transition succeeded"),
            Err(rejection) => tracing::debug!(transition = self.id(), kind = %rejection.kind, message = %rejection.message, "transition rejected"),
        }
        result
    }
}

fn validate(state: &StateRef, to: &[PathNode], options: &TransitionOptions, core: &RouterCore) -> Option<String> {
    if state.is_abstract() {
        return Some(format!("Cannot transition to abstract state '{}'", state.name));
    }
    let values = path_params(to);
    if !params_validate(&state.params, &values) {
        let invalid: Vec<&str> =
            state.params.iter().filter(|p| !p.validates(values.get(&p.id))).map(|p| p.id.as_str()).collect();
        return Some(format!("Param values not valid for state '{}': {}", state.name, invalid.join(", ")));
    }
    if let Reload::State(name) = &options.reload {
        if core.state(name).is_none() {
            return Some(format!("No such reload state '{name}'"));
        }
    }
    None
}

impl fmt::Debug for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transition")
            .field("id", &self.id())
            .field("from", &self.from_state().name)
            .field("to", &self.target().to_string())
            .field("changes", &self.inner.changes)
            .finish()
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Transition#{}( '{}'{} -> {} )", self.id(), self.from_state(), self.from_params(), self.target())
    }
}
