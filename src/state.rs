//! The state tree.
//!
//! ```text
//! StateDeclaration ──register──▶ worklist (waits for parent)
//!                                     │ parent present
//!                                     ▼
//!                     StateBuilder field chains
//!                     url ▸ params ▸ views ▸ data ▸ resolvables
//!                                     │
//!                                     ▼
//!                              State (Rc, immutable)
//! ```
//!
//! - `declaration.rs`: the raw, user-written state description.
//! - `builder.rs`: per-field producer chains with decorators.
//! - `object.rs`: the built [`State`].
//! - `registry.rs`: registration, the forward-reference worklist, lookup and
//!   relative names.
//! - `glob.rs`: state-name globs used by hook criteria and `includes`.
//! - `target.rs`: unvalidated transition targets.
//! - `views.rs`: view declarations and the view-port contract.

#[path = "state/builder.rs"]
mod builder;
#[path = "state/declaration.rs"]
mod declaration;
#[path = "state/glob.rs"]
mod glob;
#[path = "state/object.rs"]
mod object;
#[path = "state/registry.rs"]
mod registry;
#[path = "state/target.rs"]
mod target;
#[path = "state/views.rs"]
mod views;

#[cfg(test)]
#[path = "state/tests.rs"]
mod tests;

pub use builder::{FieldChain, StateBuilder, StateDraft};
pub use declaration::StateDeclaration;
pub use glob::Glob;
pub use object::{State, StateRef};
pub use registry::{StateRegistration, StateRegistry};
pub use target::TargetState;
pub use views::{ViewConfig, ViewDeclaration, ViewPort, ViewPortRegistration, ViewService};
