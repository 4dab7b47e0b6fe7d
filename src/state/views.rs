//! View declarations and the view-port collaborator contract.
//!
//! A state declares views keyed by target (`"header@app"`, `"^.main"`,
//! `"!$default"`, or just a name). Keys are normalized to a view name plus a
//! context anchor (the state whose content holds the view port). After every
//! successful transition the active view configs are pushed to the registered
//! ports through [`ViewPort::config_updated`].

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use serde_json::Value;

/// What a view renders. The router does not interpret these fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewDeclaration {
    pub component: Option<String>,
    pub template: Option<String>,
    pub config: Value,
}

impl ViewDeclaration {
    pub fn component(component: impl Into<String>) -> Self {
        ViewDeclaration { component: Some(component.into()), ..Default::default() }
    }

    pub fn template(template: impl Into<String>) -> Self {
        ViewDeclaration { template: Some(template.into()), ..Default::default() }
    }
}

/// A normalized view declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewConfig {
    /// The state that declared the view.
    pub state: String,
    /// The key as written in the declaration.
    pub raw_name: String,
    pub view_name: String,
    /// The state whose content contains the target port ("" is the root).
    pub context: String,
    pub declaration: ViewDeclaration,
}

impl ViewConfig {
    /// `view_name@context`.
    pub fn target(&self) -> String {
        format!("{}@{}", self.view_name, self.context)
    }
}

/// Normalize a view key written on `state` into `(view_name, context)`.
pub(crate) fn normalize_view_target(state: &str, raw: &str) -> (String, String) {
    let (name, anchor) = match raw.split_once('@') {
        Some((name, anchor)) => (name, anchor.to_string()),
        None => (raw, "^".to_string()),
    };
    let mut name = if name.is_empty() { "$default".to_string() } else { name.to_string() };
    let mut anchor = anchor;

    if let Some(caps) = regex!(r"^(\^(?:\.\^)*)\.(.*)$").captures(&name.clone()) {
        anchor = caps[1].to_string();
        name = caps[2].to_string();
    }
    if let Some(stripped) = name.strip_prefix('!') {
        name = stripped.to_string();
        anchor = String::new();
    }

    let context = if regex!(r"^\^(?:\.\^)*$").is_match(&anchor) {
        let hops = anchor.split('.').count();
        (0..hops).fold(state.to_string(), |current, _| parent_name(&current))
    } else if anchor == "." {
        state.to_string()
    } else {
        anchor
    };
    (name, context)
}

fn parent_name(name: &str) -> String {
    name.rsplit_once('.').map(|(parent, _)| parent.to_string()).unwrap_or_default()
}

/// A rendering placeholder (a `ui-view`) owned by the host.
pub trait ViewPort {
    /// The port's view name (`"$default"` when unnamed).
    fn name(&self) -> String;
    /// The state whose content contains this port ("" for the root).
    fn context(&self) -> String;
    /// Called with the view config that should fill the port, or `None` when
    /// nothing targets it any more.
    fn config_updated(&self, config: Option<&ViewConfig>);
}

/// Pairs active view configs with registered ports.
#[derive(Default)]
pub struct ViewService {
    ports: RefCell<Vec<(u64, Rc<dyn ViewPort>)>>,
    active: RefCell<Vec<ViewConfig>>,
    next_id: Cell<u64>,
}

impl ViewService {
    pub fn new() -> Rc<Self> {
        Rc::new(ViewService::default())
    }

    /// Register a port; it immediately receives its current config.
    pub fn register_view_port(self: &Rc<Self>, port: Rc<dyn ViewPort>) -> ViewPortRegistration {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        self.ports.borrow_mut().push((id, port.clone()));
        port.config_updated(self.config_for(port.as_ref()).as_ref());
        ViewPortRegistration { service: Rc::downgrade(self), id }
    }

    /// Replace the active configs (ordered root to leaf) and notify ports.
    pub fn activate(&self, configs: Vec<ViewConfig>) {
        *self.active.borrow_mut() = configs;
        self.sync();
    }

    pub fn active_configs(&self) -> Vec<ViewConfig> {
        self.active.borrow().clone()
    }

    pub fn port_count(&self) -> usize {
        self.ports.borrow().len()
    }

    pub fn sync(&self) {
        let ports: Vec<Rc<dyn ViewPort>> = self.ports.borrow().iter().map(|(_, p)| p.clone()).collect();
        for port in ports {
            let config = self.config_for(port.as_ref());
            tracing::trace!(port = %port.name(), context = %port.context(), target = ?config.as_ref().map(|c| c.target()), "view port sync");
            port.config_updated(config.as_ref());
        }
    }

    // Deepest declaring state wins when several configs target one port.
    fn config_for(&self, port: &dyn ViewPort) -> Option<ViewConfig> {
        let (name, context) = (port.name(), port.context());
        self.active.borrow().iter().rev().find(|c| c.view_name == name && c.context == context).cloned()
    }

    fn remove(&self, id: u64) -> bool {
        let mut ports = self.ports.borrow_mut();
        let before = ports.len();
        ports.retain(|(pid, _)| *pid != id);
        ports.len() != before
    }
}

impl fmt::Debug for ViewService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewService")
            .field("ports", &self.port_count())
            .field("active", &self.active.borrow().iter().map(ViewConfig::target).collect::<Vec<_>>())
            .finish()
    }
}

/// Handle returned by [`ViewService::register_view_port`].
#[derive(Debug)]
pub struct ViewPortRegistration {
    service: Weak<ViewService>,
    id: u64,
}

impl ViewPortRegistration {
    /// Remove the port. Returns false when it was already gone.
    pub fn deregister(&self) -> bool {
        self.service.upgrade().is_some_and(|service| service.remove(self.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_targets_normalize_against_the_declaring_state() {
        assert_eq!(normalize_view_target("a.b", ""), ("$default".into(), "a".into()));
        assert_eq!(normalize_view_target("a.b", "header"), ("header".into(), "a".into()));
        assert_eq!(normalize_view_target("a.b", "header@a.b"), ("header".into(), "a.b".into()));
        assert_eq!(normalize_view_target("a.b.c", "^.^.main"), ("main".into(), "a".into()));
        assert_eq!(normalize_view_target("a.b", "!$default"), ("$default".into(), "".into()));
        assert_eq!(normalize_view_target("a.b", "side@."), ("side".into(), "a.b".into()));
        assert_eq!(normalize_view_target("a", "@"), ("$default".into(), "".into()));
    }

    struct Port {
        name: &'static str,
        context: &'static str,
        seen: RefCell<Vec<Option<String>>>,
    }

    impl ViewPort for Port {
        fn name(&self) -> String {
            self.name.to_string()
        }

        fn context(&self) -> String {
            self.context.to_string()
        }

        fn config_updated(&self, config: Option<&ViewConfig>) {
            self.seen.borrow_mut().push(config.map(|c| c.state.clone()));
        }
    }

    fn config(state: &str, view_name: &str, context: &str) -> ViewConfig {
        ViewConfig {
            state: state.into(),
            raw_name: view_name.into(),
            view_name: view_name.into(),
            context: context.into(),
            declaration: ViewDeclaration::component(state),
        }
    }

    #[test]
    fn ports_receive_the_deepest_matching_config() {
        let service = ViewService::new();
        let port = Rc::new(Port { name: "$default", context: "", seen: RefCell::new(Vec::new()) });
        let registration = service.register_view_port(port.clone());

        service.activate(vec![config("a", "$default", ""), config("a.b", "$default", "")]);
        service.activate(vec![config("c", "side", "")]);

        assert_eq!(*port.seen.borrow(), vec![None, Some("a.b".to_string()), None]);
        assert!(registration.deregister());
        assert!(!registration.deregister());
        assert_eq!(service.port_count(), 0);
    }
}
