use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::rc::Rc;
use std::str::FromStr;

use futures::FutureExt;
use futures::future::{LocalBoxFuture, Shared};

use crate::error::RouteError;
use crate::injector::{AnyValue, any_value, downcast};

/// The future produced by a resolve function.
pub type ResolveFuture = LocalBoxFuture<'static, Result<AnyValue, RouteError>>;

/// A resolve function: receives its dependencies, produces a value.
pub type ResolveFn = Rc<dyn Fn(ResolveArgs) -> ResolveFuture>;

pub(crate) type SharedResolve = Shared<ResolveFuture>;

/// When a resolvable is fetched during a transition.
///
/// Ordered by how early the value is needed: `Jit < Lazy < Eager`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum ResolvePolicy {
    /// Only when something asks for it.
    #[default]
    Jit,
    /// Right before the owning state's enter hooks.
    Lazy,
    /// Before the transition's `onStart` hooks.
    Eager,
}

impl FromStr for ResolvePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "JIT" => Ok(ResolvePolicy::Jit),
            "LAZY" => Ok(ResolvePolicy::Lazy),
            "EAGER" => Ok(ResolvePolicy::Eager),
            _ => Err(format!("unknown resolve policy '{s}'")),
        }
    }
}

/// Dependency values handed to a resolve function, in declaration order.
pub struct ResolveArgs {
    pub(crate) token: String,
    pub(crate) values: Vec<(String, AnyValue)>,
}

impl ResolveArgs {
    /// Token of the resolvable being computed.
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn get_any(&self, dep: &str) -> Option<AnyValue> {
        self.values.iter().find(|(name, _)| name == dep).map(|(_, v)| v.clone())
    }

    /// Typed access to a declared dependency.
    pub fn get<T: 'static>(&self, dep: &str) -> Result<Rc<T>, RouteError> {
        let value = self.get_any(dep).ok_or_else(|| RouteError::MissingDependency {
            token: self.token.clone(),
            dependency: dep.to_string(),
        })?;
        downcast(dep, &value)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A named, memoized asynchronous value attached to a state.
#[derive(Clone)]
pub struct Resolvable {
    pub token: String,
    pub deps: Vec<String>,
    /// `None` means "use the state's policy, then the router default".
    pub policy: Option<ResolvePolicy>,
    resolve_fn: ResolveFn,
    pub(crate) data: Rc<RefCell<Option<AnyValue>>>,
    pub(crate) promise: RefCell<Option<SharedResolve>>,
}

impl Resolvable {
    /// An asynchronous resolvable.
    ///
    /// ```
    /// use treeroute::{Resolvable, RouteError};
    ///
    /// let user = Resolvable::new("user", ["userId"], |args| async move {
    ///     let id = args.get::<i64>("userId")?;
    ///     Ok::<_, RouteError>(format!("user #{id}"))
    /// });
    /// assert_eq!(user.deps, vec!["userId".to_string()]);
    /// ```
    pub fn new<T, F, Fut, D>(token: impl Into<String>, deps: D, f: F) -> Self
    where
        T: 'static,
        F: Fn(ResolveArgs) -> Fut + 'static,
        Fut: Future<Output = Result<T, RouteError>> + 'static,
        D: IntoIterator,
        D::Item: Into<String>,
    {
        let resolve_fn: ResolveFn = Rc::new(move |args| {
            let fut = f(args);
            async move { fut.await.map(any_value) }.boxed_local()
        });
        Resolvable::from_fn(token, deps.into_iter().map(Into::into).collect(), resolve_fn)
    }

    /// A resolvable computed synchronously from its dependencies.
    pub fn sync<T, F, D>(token: impl Into<String>, deps: D, f: F) -> Self
    where
        T: 'static,
        F: Fn(&ResolveArgs) -> Result<T, RouteError> + 'static,
        D: IntoIterator,
        D::Item: Into<String>,
    {
        let resolve_fn: ResolveFn = Rc::new(move |args| futures::future::ready(f(&args).map(any_value)).boxed_local());
        Resolvable::from_fn(token, deps.into_iter().map(Into::into).collect(), resolve_fn)
    }

    /// A constant.
    pub fn value<T: 'static>(token: impl Into<String>, value: T) -> Self {
        Resolvable::from_any(token, any_value(value))
    }

    /// A constant that is already type-erased.
    pub fn from_any(token: impl Into<String>, value: AnyValue) -> Self {
        let produce = value.clone();
        let resolve_fn: ResolveFn = Rc::new(move |_| futures::future::ready(Ok(produce.clone())).boxed_local());
        let r = Resolvable::from_fn(token, Vec::new(), resolve_fn);
        *r.data.borrow_mut() = Some(value);
        r
    }

    pub fn from_fn(token: impl Into<String>, deps: Vec<String>, resolve_fn: ResolveFn) -> Self {
        Resolvable {
            token: token.into(),
            deps,
            policy: None,
            resolve_fn,
            data: Rc::new(RefCell::new(None)),
            promise: RefCell::new(None),
        }
    }

    pub fn with_policy(mut self, policy: ResolvePolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// A copy that has not been resolved yet.
    pub fn fresh(&self) -> Resolvable {
        let mut copy = Resolvable::from_fn(self.token.clone(), self.deps.clone(), self.resolve_fn.clone());
        copy.policy = self.policy;
        copy
    }

    pub fn is_resolved(&self) -> bool {
        self.data.borrow().is_some()
    }

    /// The settled value, if any.
    pub fn data(&self) -> Option<AnyValue> {
        self.data.borrow().clone()
    }

    pub(crate) fn resolve_fn(&self) -> ResolveFn {
        self.resolve_fn.clone()
    }

    /// The memoized future, or a ready one when the value is settled.
    pub(crate) fn memo(&self) -> Option<SharedResolve> {
        if let Some(value) = self.data() {
            return Some(futures::future::ready(Ok(value)).boxed_local().shared());
        }
        self.promise.borrow().clone()
    }

    pub(crate) fn is_started(&self) -> bool {
        self.is_resolved() || self.promise.borrow().is_some()
    }
}

impl fmt::Debug for Resolvable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolvable")
            .field("token", &self.token)
            .field("deps", &self.deps)
            .field("policy", &self.policy)
            .field("resolved", &self.is_resolved())
            .finish()
    }
}
