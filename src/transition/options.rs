use serde_json::Value;

/// What happens to the location after a successful transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LocationOption {
    /// Push a new history entry.
    #[default]
    Push,
    /// Replace the current history entry.
    Replace,
    /// Leave the location alone.
    Skip,
}

/// Which states are forced to exit and re-enter.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Reload {
    #[default]
    No,
    /// Every state, including the root.
    All,
    /// The named state and its descendants.
    State(String),
}

/// What started a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransitionSource {
    #[default]
    Api,
    Url,
    Redirect,
}

#[derive(Debug, Clone)]
pub struct TransitionOptions {
    pub location: LocationOption,
    /// Carry over parameter values of states that stay on the path.
    pub inherit: bool,
    /// Base state for relative target names (`^`, `.child`).
    pub relative: Option<String>,
    /// When false, registered hooks and the params-changed listeners are not
    /// invoked. State-declared callbacks still run.
    pub notify: bool,
    pub reload: Reload,
    /// Opaque data for hooks.
    pub custom: Value,
    pub source: TransitionSource,
}

impl Default for TransitionOptions {
    fn default() -> Self {
        TransitionOptions {
            location: LocationOption::Push,
            inherit: false,
            relative: None,
            notify: true,
            reload: Reload::No,
            custom: Value::Null,
            source: TransitionSource::Api,
        }
    }
}

impl TransitionOptions {
    pub fn location(mut self, location: LocationOption) -> Self {
        self.location = location;
        self
    }

    pub fn inherit(mut self, inherit: bool) -> Self {
        self.inherit = inherit;
        self
    }

    pub fn relative(mut self, state: impl Into<String>) -> Self {
        self.relative = Some(state.into());
        self
    }

    pub fn notify(mut self, notify: bool) -> Self {
        self.notify = notify;
        self
    }

    pub fn reload(mut self, reload: Reload) -> Self {
        self.reload = reload;
        self
    }

    pub fn custom(mut self, custom: Value) -> Self {
        self.custom = custom;
        self
    }

    pub fn source(mut self, source: TransitionSource) -> Self {
        self.source = source;
        self
    }
}
