//! Asynchronous dependency resolution.
//!
//! ```text
//! PathNode[0] (root)   $transition$ ...
//! PathNode[1] (app)    user ◀──────────┐
//! PathNode[2] (app.x)  prefs ── deps ──┘   (nearest wins, own token skipped)
//!
//! ResolveContext::resolve_path(policy)  ─▶ every visible resolvable ≥ policy
//! ResolveContext::get(token)            ─▶ one resolvable, on demand (JIT)
//! ```
//!
//! Each [`Resolvable`] memoizes its future the first time it is requested in a
//! context, so a resolve function runs at most once per transition. Retained
//! path nodes hand their (already settled) resolvables to the next transition;
//! entering nodes get fresh copies.

#[path = "resolve/context.rs"]
mod context;
#[path = "resolve/resolvable.rs"]
mod resolvable;

#[cfg(test)]
#[path = "resolve/tests.rs"]
mod tests;

pub use context::{LocalProvider, ResolveContext};
pub use resolvable::{ResolveArgs, ResolveFn, ResolveFuture, ResolvePolicy, Resolvable};

pub(crate) use resolvable::SharedResolve;
