use std::fmt;

use super::pipeline::Transition;
use crate::error::RouteError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectType {
    /// Another transition became current (also used for redirects).
    Superseded,
    /// A hook returned `false`.
    Aborted,
    /// The target does not exist, is abstract, or has invalid parameters.
    Invalid,
    /// The target equals the current state and parameters.
    Ignored,
    /// A hook or resolve function failed.
    Error,
}

impl fmt::Display for RejectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RejectType::Superseded => "superseded",
            RejectType::Aborted => "aborted",
            RejectType::Invalid => "invalid",
            RejectType::Ignored => "ignored",
            RejectType::Error => "error",
        })
    }
}

/// Why a transition did not complete.
#[derive(Clone)]
pub struct Rejection {
    pub kind: RejectType,
    pub message: String,
    /// The original failure for `Error` rejections.
    pub detail: Option<RouteError>,
    pub redirected: bool,
    /// The replacement transition when `redirected` is set.
    pub redirect: Option<Transition>,
}

impl Rejection {
    fn new(kind: RejectType, message: impl Into<String>) -> Self {
        Rejection { kind, message: message.into(), detail: None, redirected: false, redirect: None }
    }

    pub fn superseded(message: impl Into<String>) -> Self {
        Rejection::new(RejectType::Superseded, message)
    }

    pub fn redirected(to: Transition) -> Self {
        let message = format!("The transition has been superseded by a redirect to {}", to.target());
        Rejection { redirected: true, redirect: Some(to), ..Rejection::new(RejectType::Superseded, message) }
    }

    pub fn aborted(message: impl Into<String>) -> Self {
        Rejection::new(RejectType::Aborted, message)
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Rejection::new(RejectType::Invalid, message)
    }

    pub fn ignored() -> Self {
        Rejection::new(RejectType::Ignored, "The transition was ignored")
    }

    pub fn error(err: RouteError) -> Self {
        Rejection { detail: Some(err.clone()), ..Rejection::new(RejectType::Error, err.to_string()) }
    }

    pub fn is_redirect(&self) -> bool {
        self.redirected
    }
}

impl From<RouteError> for Rejection {
    fn from(err: RouteError) -> Self {
        Rejection::error(err)
    }
}

impl fmt::Debug for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rejection")
            .field("kind", &self.kind)
            .field("message", &self.message)
            .field("detail", &self.detail)
            .field("redirect", &self.redirect.as_ref().map(Transition::id))
            .finish()
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "transition rejection ({}): {}", self.kind, self.message)
    }
}

impl std::error::Error for Rejection {}
