//! Error types.
//!
//! Two layers are kept apart:
//!
//! - [`ConfigError`]: returned synchronously while declaring types, URL patterns
//!   and states. These are fatal for the declaration that produced them; the
//!   caller has to fix the declaration.
//! - [`RouteError`]: failures that happen while a transition is running
//!   (resolve functions, hooks, malformed matchers). They travel inside a
//!   [`Rejection`](crate::Rejection) of kind `Error`.

use std::fmt;
use std::rc::Rc;

/// Configuration-time failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid parameter type name '{0}'")]
    InvalidTypeName(String),

    #[error("a type named '{0}' has already been defined")]
    DuplicateType(String),

    #[error("unknown parameter type '{0}'")]
    UnknownType(String),

    #[error("invalid parameter name '{name}' in pattern '{pattern}'")]
    InvalidParamName { name: String, pattern: String },

    #[error("duplicate parameter name '{name}' in pattern '{pattern}'")]
    DuplicateParam { name: String, pattern: String },

    #[error("invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("invalid squash policy '{0}'; valid policies are false, true, or an arbitrary string")]
    InvalidSquash(String),

    #[error("default value for parameter '{param}' is not an instance of type '{type_name}'")]
    InvalidDefault { param: String, type_name: String },

    #[error("state name must be a non-empty string without leading or trailing dots, got '{0}'")]
    InvalidStateName(String),

    #[error("state '{0}' is already defined")]
    DuplicateState(String),

    #[error("state '{name}' declares parent '{parent}' but its name implies '{implied}'")]
    ParentMismatch { name: String, parent: String, implied: String },

    #[error("state builder is frozen; decorators must be registered before the first state")]
    BuilderFrozen,

    #[error("cannot deregister '{0}': no such state")]
    UnknownState(String),

    #[error("invalid state document: {0}")]
    InvalidDocument(String),
}

/// Runtime failures raised while resolving or running hooks.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RouteError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("unbalanced capture group in route '{0}'")]
    UnbalancedCaptureGroups(String),

    #[error("resolvable '{token}' depends on '{dependency}', which is not available")]
    MissingDependency { token: String, dependency: String },

    #[error("circular dependency while resolving '{0}'")]
    CircularDependency(String),

    #[error("nothing named '{0}' is visible to resolve")]
    UnknownResolvable(String),

    #[error("resolvable '{token}' produced a value of an unexpected type")]
    TypeMismatch { token: String },

    #[error("no such state '{0}'")]
    NoSuchState(String),

    #[error("path '{path}' is not valid relative to '{base}'")]
    InvalidRelativePath { path: String, base: String },

    #[error("too many consecutive redirects ({0}+)")]
    TooManyRedirects(usize),

    #[error("{0}")]
    Message(String),

    #[error("{0}")]
    Custom(SharedError),
}

impl RouteError {
    /// A plain-text failure, typically returned from a resolve function or hook.
    pub fn msg(message: impl Into<String>) -> Self {
        RouteError::Message(message.into())
    }

    /// Wrap any error so it can travel through rejections unchanged.
    pub fn custom(err: impl std::error::Error + 'static) -> Self {
        RouteError::Custom(SharedError(Rc::new(err)))
    }
}

/// A reference-counted, cloneable user error.
#[derive(Clone)]
pub struct SharedError(pub Rc<dyn std::error::Error>);

impl SharedError {
    pub fn inner(&self) -> &dyn std::error::Error {
        self.0.as_ref()
    }
}

impl fmt::Debug for SharedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl fmt::Display for SharedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("backend unavailable")]
    struct Backend;

    #[test]
    fn custom_errors_keep_their_message() {
        let err = RouteError::custom(Backend);
        assert_eq!(err.to_string(), "backend unavailable");
        let cloned = err.clone();
        assert_eq!(cloned.to_string(), "backend unavailable");
    }

    #[test]
    fn config_errors_convert_into_route_errors() {
        let err: RouteError = ConfigError::DuplicateState("home".into()).into();
        assert_eq!(err.to_string(), "state 'home' is already defined");
    }
}
