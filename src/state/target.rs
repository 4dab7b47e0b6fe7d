use std::fmt;

use super::object::StateRef;
use crate::ParamValues;
use crate::transition::TransitionOptions;

/// A reference to a destination that has not been validated yet.
///
/// Targets are what transitions are created from and what hooks return to
/// redirect. A target built with [`TargetState::named`] has no state attached;
/// the router looks the name up (relative to the running transition) when the
/// target is used.
#[derive(Clone)]
pub struct TargetState {
    identifier: String,
    state: Option<StateRef>,
    params: ParamValues,
    options: TransitionOptions,
}

impl TargetState {
    pub fn new(
        identifier: impl Into<String>,
        state: Option<StateRef>,
        params: ParamValues,
        options: TransitionOptions,
    ) -> Self {
        TargetState { identifier: identifier.into(), state, params, options }
    }

    /// An unresolved target for redirects.
    pub fn named(identifier: impl Into<String>, params: ParamValues) -> Self {
        TargetState::new(identifier, None, params, TransitionOptions::default())
    }

    /// The identifier as given (possibly relative, like `^.list`).
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// The resolved state name, falling back to the identifier.
    pub fn name(&self) -> &str {
        self.state.as_ref().map_or(self.identifier.as_str(), |s| s.name.as_str())
    }

    pub fn state(&self) -> Option<&StateRef> {
        self.state.as_ref()
    }

    pub fn params(&self) -> &ParamValues {
        &self.params
    }

    pub fn options(&self) -> &TransitionOptions {
        &self.options
    }

    pub fn exists(&self) -> bool {
        self.state.is_some()
    }

    pub fn valid(&self) -> bool {
        self.error().is_none()
    }

    pub fn error(&self) -> Option<String> {
        match (&self.state, &self.options.relative) {
            (Some(_), _) => None,
            (None, Some(base)) => Some(format!("Could not resolve '{}' from state '{}'", self.identifier, base)),
            (None, None) => Some(format!("No such state '{}'", self.identifier)),
        }
    }

    /// Copy with different parameters; `replace` drops the current ones,
    /// otherwise the new values are merged over them.
    pub fn with_params(&self, params: ParamValues, replace: bool) -> TargetState {
        let mut merged = if replace { ParamValues::new() } else { self.params.clone() };
        merged.extend_from(&params);
        TargetState { params: merged, ..self.clone() }
    }

    pub fn with_options(&self, options: TransitionOptions) -> TargetState {
        TargetState { options, ..self.clone() }
    }

    pub(crate) fn with_state(&self, state: Option<StateRef>) -> TargetState {
        TargetState { state, ..self.clone() }
    }
}

impl fmt::Debug for TargetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetState")
            .field("identifier", &self.identifier)
            .field("state", &self.state.as_ref().map(|s| s.name.as_str()))
            .field("params", &self.params)
            .finish()
    }
}

impl fmt::Display for TargetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}'{}", self.name(), self.params)
    }
}
