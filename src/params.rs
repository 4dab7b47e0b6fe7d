//! Parameter types and parameter declarations.
//!
//! ```text
//! ParamTypeDefinition ──ParamTypes::define──▶ ParamType (named codec)
//!                                               │
//!                        ValueType (scalar | array wrapper)
//!                                               │
//! ParamDeclaration + location ──Param::new──▶ Param
//!                                               │
//!                            value() / validates() / equals()
//! ```
//!
//! - `types.rs`: the codec contract (`is`/`encode`/`decode`/`equals`) and the
//!   array wrapper.
//! - `registry.rs`: the type registry with the built-in types and the deferred
//!   definition queue.
//! - `param.rs`: a declared parameter (location, default, squash, replace) and
//!   helpers that operate on parameter sets.

#[path = "params/param.rs"]
mod param;
#[path = "params/registry.rs"]
mod registry;
#[path = "params/types.rs"]
mod types;

pub use param::{DefaultValue, Param, ParamDeclaration, ParamLocation, Replacement, Squash};
pub use registry::ParamTypes;
pub use types::{ArrayMode, EncodedValue, ParamType, ParamTypeDefinition, ValueType};

pub(crate) use param::{changed_params, params_equal, params_validate, param_values};
