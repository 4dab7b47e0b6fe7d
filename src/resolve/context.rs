use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use futures::FutureExt;
use futures::future::{LocalBoxFuture, try_join_all};

use super::resolvable::{ResolveArgs, ResolveFuture, ResolvePolicy, Resolvable, SharedResolve};
use crate::error::RouteError;
use crate::injector::{AnyValue, Injector, any_value};
use crate::state::StateRef;
use crate::transition::PathNode;

/// Supplies an injected local (`$transition$`, `$stateParams`) on demand.
pub type LocalProvider = Rc<dyn Fn() -> Option<AnyValue>>;

/// Token that always yields the requesting node's state.
const STATE_TOKEN: &str = "$state$";

enum Source {
    Resolvable(usize, Rc<Resolvable>),
    Value(AnyValue),
    Missing,
}

/// Resolution scope for one transition's path.
///
/// Dependencies of a resolvable at node `n` are looked up, in order, among the
/// resolvables of nodes `n..=0` (nearest first, the resolvable itself
/// excluded), the injected locals, then the injector's services.
pub struct ResolveContext {
    nodes: RefCell<Vec<PathNode>>,
    locals: RefCell<HashMap<String, LocalProvider>>,
    injector: Rc<Injector>,
    default_policy: ResolvePolicy,
}

impl ResolveContext {
    pub fn new(nodes: Vec<PathNode>, injector: Rc<Injector>, default_policy: ResolvePolicy) -> Self {
        ResolveContext { nodes: RefCell::new(nodes), locals: RefCell::new(HashMap::new()), injector, default_policy }
    }

    pub fn nodes(&self) -> Vec<PathNode> {
        self.nodes.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.nodes.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.borrow().is_empty()
    }

    pub fn state_at(&self, node: usize) -> Option<StateRef> {
        self.nodes.borrow().get(node).map(|n| n.state.clone())
    }

    /// Index of the node for `state`, if it is on the path.
    pub fn index_of(&self, state: &str) -> Option<usize> {
        self.nodes.borrow().iter().position(|n| n.state.name == state)
    }

    pub fn provide_local(&self, token: impl Into<String>, provider: LocalProvider) {
        self.locals.borrow_mut().insert(token.into(), provider);
    }

    /// The policy a resolvable runs under in this context.
    pub fn policy_of(&self, resolvable: &Resolvable) -> ResolvePolicy {
        resolvable.policy.unwrap_or(self.default_policy)
    }

    /// Tokens visible at `node` (the deepest node when `None`), nearest first.
    pub fn tokens(&self, node: Option<usize>) -> Vec<String> {
        let Some(last) = self.last_or(node) else {
            return Vec::new();
        };
        let nodes = self.nodes.borrow();
        let mut tokens: Vec<String> = Vec::new();
        for idx in (0..=last).rev() {
            for r in &nodes[idx].resolvables {
                if !tokens.contains(&r.token) {
                    tokens.push(r.token.clone());
                }
            }
        }
        tokens
    }

    /// Attach resolvables to a node, replacing any with the same token there.
    pub fn add_resolvables(&self, node: usize, resolvables: Vec<Resolvable>) {
        let mut nodes = self.nodes.borrow_mut();
        let Some(target) = nodes.get_mut(node) else {
            return;
        };
        for r in resolvables {
            target.resolvables.retain(|existing| existing.token != r.token);
            tracing::trace!(state = %target.state.display_name(), token = %r.token, "resolvable added");
            target.resolvables.push(Rc::new(r));
        }
    }

    /// The settled value of a token visible at `node`, without resolving.
    pub fn value(&self, token: &str, node: Option<usize>) -> Option<AnyValue> {
        let node = self.last_or(node)?;
        match self.lookup(token, node, None) {
            Source::Resolvable(_, r) => r.data(),
            Source::Value(v) => Some(v),
            Source::Missing => None,
        }
    }

    /// Resolve one token on demand.
    pub fn get(&self, token: &str, node: Option<usize>) -> ResolveFuture {
        let Some(node) = self.last_or(node) else {
            return ready_err(RouteError::UnknownResolvable(token.to_string()));
        };
        match self.lookup(token, node, None) {
            Source::Resolvable(idx, r) => self.resolve_one(idx, &r).boxed_local(),
            Source::Value(v) => futures::future::ready(Ok(v)).boxed_local(),
            Source::Missing => ready_err(RouteError::UnknownResolvable(token.to_string())),
        }
    }

    /// Resolve every resolvable on `nodes[0..=upto]` whose policy is at least
    /// `policy`. Yields the tokens that were part of the batch.
    pub fn resolve_path(
        &self,
        policy: ResolvePolicy,
        upto: Option<usize>,
    ) -> LocalBoxFuture<'static, Result<Vec<String>, RouteError>> {
        let Some(upto) = self.last_or(upto) else {
            return futures::future::ready(Ok(Vec::new())).boxed_local();
        };

        let batch: Vec<(usize, Rc<Resolvable>)> = {
            let nodes = self.nodes.borrow();
            (0..=upto)
                .flat_map(|idx| nodes[idx].resolvables.iter().map(move |r| (idx, r.clone())))
                .filter(|(_, r)| self.policy_of(r) >= policy)
                .collect()
        };

        let tokens: Vec<String> = batch.iter().map(|(_, r)| r.token.clone()).collect();
        let futures: Vec<SharedResolve> = batch.iter().map(|(idx, r)| self.resolve_one(*idx, r)).collect();
        async move {
            try_join_all(futures).await?;
            Ok(tokens)
        }
        .boxed_local()
    }

    fn last_or(&self, node: Option<usize>) -> Option<usize> {
        let len = self.len();
        match node {
            Some(idx) if idx < len => Some(idx),
            Some(_) => None,
            None => len.checked_sub(1),
        }
    }

    /// Where a dependency named `token` comes from for the node `node`.
    /// `requester` is skipped on its own node.
    fn lookup(&self, token: &str, node: usize, requester: Option<&str>) -> Source {
        {
            let nodes = self.nodes.borrow();
            if token == STATE_TOKEN {
                if let Some(n) = nodes.get(node) {
                    return Source::Value(any_value(n.state.clone()));
                }
            }
            for idx in (0..nodes.len().min(node + 1)).rev() {
                let own = idx == node;
                let found = nodes[idx]
                    .resolvables
                    .iter()
                    .rev()
                    .find(|r| r.token == token && !(own && requester == Some(r.token.as_str())));
                if let Some(r) = found {
                    return Source::Resolvable(idx, r.clone());
                }
            }
        }

        let local = self.locals.borrow().get(token).cloned();
        if let Some(value) = local.and_then(|provide| provide()) {
            return Source::Value(value);
        }
        match self.injector.get_any(token) {
            Some(value) => Source::Value(value),
            None => Source::Missing,
        }
    }

    fn resolve_one(&self, node: usize, r: &Rc<Resolvable>) -> SharedResolve {
        if let Some(memo) = r.memo() {
            return memo;
        }
        if let Err(err) = self.check_cycles(node, r, &mut Vec::new()) {
            return ready_err(err).shared();
        }
        self.start(node, r)
    }

    fn check_cycles(&self, node: usize, r: &Rc<Resolvable>, stack: &mut Vec<Rc<Resolvable>>) -> Result<(), RouteError> {
        if r.is_started() {
            return Ok(());
        }
        if stack.iter().any(|seen| Rc::ptr_eq(seen, r)) {
            return Err(RouteError::CircularDependency(r.token.clone()));
        }
        stack.push(r.clone());
        for dep in &r.deps {
            if let Source::Resolvable(idx, dep_r) = self.lookup(dep, node, Some(r.token.as_str())) {
                self.check_cycles(idx, &dep_r, stack)?;
            }
        }
        stack.pop();
        Ok(())
    }

    // The dependency graph below `r` is acyclic here, so the recursion ends.
    fn start(&self, node: usize, r: &Rc<Resolvable>) -> SharedResolve {
        let deps: Vec<LocalBoxFuture<'static, Result<(String, AnyValue), RouteError>>> = r
            .deps
            .iter()
            .map(|dep| {
                let name = dep.clone();
                match self.lookup(dep, node, Some(r.token.as_str())) {
                    Source::Resolvable(idx, dep_r) => {
                        let shared = self.resolve_one(idx, &dep_r);
                        async move { shared.await.map(|v| (name, v)) }.boxed_local()
                    }
                    Source::Value(v) => futures::future::ready(Ok((name, v))).boxed_local(),
                    Source::Missing => futures::future::ready(Err(RouteError::MissingDependency {
                        token: r.token.clone(),
                        dependency: name,
                    }))
                    .boxed_local(),
                }
            })
            .collect();

        let token = r.token.clone();
        let resolve_fn = r.resolve_fn();
        let data = r.data.clone();
        let state = self.state_at(node).map(|s| s.display_name().to_string()).unwrap_or_default();
        let fut = async move {
            let values = try_join_all(deps).await?;
            tracing::trace!(token = %token, state = %state, deps = values.len(), "invoking resolve function");
            let value = resolve_fn(ResolveArgs { token: token.clone(), values }).await;
            match &value {
                Ok(v) => *data.borrow_mut() = Some(v.clone()),
                Err(err) => tracing::debug!(token = %token, error = %err, "resolve function failed"),
            }
            value
        }
        .boxed_local()
        .shared();

        *r.promise.borrow_mut() = Some(fut.clone());
        fut
    }
}

impl fmt::Debug for ResolveContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let nodes = self.nodes.borrow();
        let mut map = f.debug_map();
        for node in nodes.iter() {
            let tokens: Vec<String> = node
                .resolvables
                .iter()
                .map(|r| if r.is_resolved() { format!("{}*", r.token) } else { r.token.clone() })
                .collect();
            map.entry(&node.state.display_name(), &tokens);
        }
        map.finish()
    }
}

fn ready_err(err: RouteError) -> ResolveFuture {
    futures::future::ready(Err(err)).boxed_local()
}
