use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use super::builder::StateBuilder;
use super::declaration::StateDeclaration;
use super::object::StateRef;
use crate::error::{ConfigError, RouteError};
use crate::ParamValue;
use crate::params::ParamDeclaration;
use crate::url::UrlMatcherFactory;

/// Outcome of [`StateRegistry::register`].
#[derive(Debug, Clone)]
pub struct StateRegistration {
    /// Full name of the declared state.
    pub name: String,
    /// Every state attached by this call, in attach order. Queued children
    /// whose parent just appeared are included.
    pub registered: Vec<StateRef>,
}

impl StateRegistration {
    /// The declared state, if it could be attached.
    pub fn state(&self) -> Option<&StateRef> {
        self.registered.iter().find(|s| s.name == self.name)
    }

    /// True when the state waits for its parent.
    pub fn is_pending(&self) -> bool {
        self.state().is_none()
    }
}

/// Registered states plus the worklist of declarations awaiting a parent.
pub struct StateRegistry {
    builder: StateBuilder,
    factory: UrlMatcherFactory,
    root: StateRef,
    states: HashMap<String, StateRef>,
    order: Vec<String>,
    queue: Vec<(String, String, StateDeclaration)>,
}

impl StateRegistry {
    pub fn new(factory: UrlMatcherFactory) -> Result<Self, ConfigError> {
        let builder = StateBuilder::new();
        let root_decl = StateDeclaration::new("")
            .url("^")
            .abstract_state()
            .param("#", ParamDeclaration::new().type_name("hash").default_value(ParamValue::Null).dynamic(true));
        let root = Rc::new(builder.build("", root_decl, None, &factory)?);

        let mut states = HashMap::new();
        states.insert(String::new(), root.clone());
        Ok(StateRegistry { builder, factory, root, states, order: Vec::new(), queue: Vec::new() })
    }

    pub fn root(&self) -> StateRef {
        self.root.clone()
    }

    pub fn builder(&self) -> &StateBuilder {
        &self.builder
    }

    pub fn builder_mut(&mut self) -> &mut StateBuilder {
        &mut self.builder
    }

    /// Register a declaration.
    ///
    /// When the parent exists the state is built immediately (build errors
    /// are returned) and any queued descendants that became attachable are
    /// built too. Otherwise the declaration waits in the worklist.
    pub fn register(&mut self, decl: StateDeclaration) -> Result<StateRegistration, ConfigError> {
        let (name, parent) = full_name(&decl)?;
        if self.states.contains_key(&name) || self.queue.iter().any(|(n, _, _)| *n == name) {
            return Err(ConfigError::DuplicateState(name));
        }
        self.builder.freeze();

        if !self.states.contains_key(&parent) {
            tracing::debug!(state = %name, parent = %parent, "state queued until its parent is registered");
            self.queue.push((name.clone(), parent, decl));
            return Ok(StateRegistration { name, registered: Vec::new() });
        }

        let mut registered = vec![self.attach(&name, &parent, decl)?];
        registered.extend(self.flush());
        Ok(StateRegistration { name, registered })
    }

    fn attach(&mut self, name: &str, parent: &str, decl: StateDeclaration) -> Result<StateRef, ConfigError> {
        let parent = self.states.get(parent).cloned();
        let state = Rc::new(self.builder.build(name, decl, parent, &self.factory)?);
        self.states.insert(name.to_string(), state.clone());
        self.order.push(name.to_string());
        tracing::trace!(state = %name, "state registered");
        Ok(state)
    }

    /// Attach queued declarations until no more progress is possible.
    fn flush(&mut self) -> Vec<StateRef> {
        let mut attached = Vec::new();
        while let Some(idx) = self.queue.iter().position(|(_, parent, _)| self.states.contains_key(parent)) {
            let (name, parent, decl) = self.queue.remove(idx);
            match self.attach(&name, &parent, decl) {
                Ok(state) => attached.push(state),
                Err(err) => tracing::warn!(state = %name, error = %err, "dropping queued state that failed to build"),
            }
        }
        attached
    }

    /// Declarations still waiting, as `(state, missing parent)` pairs.
    pub fn pending(&self) -> Vec<(String, String)> {
        self.queue.iter().map(|(name, parent, _)| (name.clone(), parent.clone())).collect()
    }

    /// Remove a state and all of its descendants. Returns the removed states,
    /// deepest first.
    pub fn deregister(&mut self, name: &str) -> Result<Vec<StateRef>, ConfigError> {
        if name.is_empty() || !self.states.contains_key(name) {
            return Err(ConfigError::UnknownState(name.to_string()));
        }

        let mut removed: Vec<StateRef> =
            self.states.values().filter(|s| s.path().iter().any(|a| a.name == name)).cloned().collect();
        removed.sort_by(|a, b| b.depth.cmp(&a.depth).then_with(|| a.name.cmp(&b.name)));
        for state in &removed {
            self.states.remove(&state.name);
        }
        self.order.retain(|n| self.states.contains_key(n));
        tracing::debug!(state = %name, removed = removed.len(), "state deregistered");
        Ok(removed)
    }

    pub fn get(&self, name: &str) -> Option<StateRef> {
        self.states.get(name).cloned()
    }

    /// Registered states in registration order (the root is not included).
    pub fn states(&self) -> Vec<StateRef> {
        self.order.iter().filter_map(|n| self.states.get(n).cloned()).collect()
    }

    /// Look a state up by name. Names starting with `^` or `.` are resolved
    /// against `base` (`^` is the parent, a leading `.` a child).
    pub fn find(&self, name: &str, base: Option<&str>) -> Result<Option<StateRef>, RouteError> {
        if is_relative(name) {
            let resolved = self.resolve_relative(name, base)?;
            return Ok(self.get(&resolved));
        }
        Ok(self.get(name))
    }

    fn resolve_relative(&self, name: &str, base: Option<&str>) -> Result<String, RouteError> {
        let base_name = base.ok_or_else(|| RouteError::NoSuchState(name.to_string()))?;
        let base_state = self.get(base_name).ok_or_else(|| RouteError::NoSuchState(base_name.to_string()))?;

        let segments: Vec<&str> = name.split('.').collect();
        let mut current = base_state.clone();
        let mut consumed = 0;
        for (idx, segment) in segments.iter().enumerate() {
            match *segment {
                "" if idx == 0 => {}
                "^" => {
                    current = current.parent.clone().ok_or_else(|| RouteError::InvalidRelativePath {
                        path: name.to_string(),
                        base: base_state.name.clone(),
                    })?;
                }
                _ => break,
            }
            consumed = idx + 1;
        }

        let relative = segments[consumed..].join(".");
        let dot = if !current.name.is_empty() && !relative.is_empty() { "." } else { "" };
        Ok(format!("{}{dot}{relative}", current.name))
    }
}

impl fmt::Debug for StateRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateRegistry").field("states", &self.order).field("pending", &self.pending()).finish()
    }
}

fn is_relative(name: &str) -> bool {
    name.starts_with('.') || name.starts_with('^')
}

/// Compute `(full name, parent name)` for a declaration.
fn full_name(decl: &StateDeclaration) -> Result<(String, String), ConfigError> {
    let name = decl.name.as_str();
    if !regex!(r"^[^.]+(?:\.[^.]+)*$").is_match(name) {
        return Err(ConfigError::InvalidStateName(name.to_string()));
    }

    let implied = name.rsplit_once('.').map(|(parent, _)| parent);
    match (decl.parent.as_deref(), implied) {
        (Some(parent), Some(implied)) if parent != implied => Err(ConfigError::ParentMismatch {
            name: name.to_string(),
            parent: parent.to_string(),
            implied: implied.to_string(),
        }),
        (Some(_), Some(implied)) => Ok((name.to_string(), implied.to_string())),
        (Some(""), None) => Ok((name.to_string(), String::new())),
        (Some(parent), None) => Ok((format!("{parent}.{name}"), parent.to_string())),
        (None, implied) => Ok((name.to_string(), implied.unwrap_or_default().to_string())),
    }
}
