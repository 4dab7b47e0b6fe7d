//! Transitions: diffing two paths and running hooks between them.
//!
//! ```text
//! TargetState ──Transition::create──▶ TreeChanges (retained | exiting | entering)
//!                                          │
//!                        HookRegistry::matching(kind, changes)
//!                                          │
//!      onBefore ▶ onStart ▶ onExit ▶ onRetain ▶ onEnter ▶ commit ▶ onSuccess
//!                                          └─ any rejection ─▶ onError
//! ```
//!
//! - `path.rs`: path nodes, path construction with inheritance, tree diff.
//! - `hooks.rs`: hook kinds, criteria, the registry and its ordering.
//! - `hook.rs`: hook callbacks, their results and the context they see.
//! - `pipeline.rs`: the transition object and its run loop.
//! - `rejection.rs`, `options.rs`, `metrics.rs`: supporting types.

#[path = "transition/hook.rs"]
mod hook;
#[path = "transition/hooks.rs"]
mod hooks;
#[path = "transition/metrics.rs"]
mod metrics;
#[path = "transition/options.rs"]
mod options;
#[path = "transition/path.rs"]
mod path;
#[path = "transition/pipeline.rs"]
mod pipeline;
#[path = "transition/rejection.rs"]
mod rejection;


pub use hook::{HookContext, HookFn, HookResult, InvalidHookFn};
pub use hooks::{HookCriteria, HookKind, HookMatch, HookOptions, HookRegistration, StateMatcher, TreeSets};
pub use metrics::{PhaseMetrics, TransitionMetrics};
pub use options::{LocationOption, Reload, TransitionOptions, TransitionSource};
pub use path::{PathNode, TreeChanges, path_params};
pub use pipeline::Transition;
pub use rejection::{RejectType, Rejection};

pub(crate) use hooks::HookRegistry;
pub(crate) use path::build_path;
