//! Hook registration and matching.
//!
//! A hook is a callback plus [`HookCriteria`] for one [`HookKind`]. When a
//! transition reaches a phase, the registry returns the matching hooks sorted
//! by priority (highest first, then registration order). State-scoped kinds
//! (`Exit`, `Retain`, `Enter`) also report which nodes of their tree-change
//! list matched, so the pipeline can run the hook once per node.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use bitflags::bitflags;

use super::hook::{HookFn, InvalidHookFn};
use super::path::{PathNode, TreeChanges};
use crate::state::{Glob, State};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookKind {
    Before,
    Start,
    Exit,
    Retain,
    Enter,
    Success,
    Error,
}

impl HookKind {
    /// The tree-change list a state-scoped hook is bound to.
    pub fn scope(self) -> Option<TreeSets> {
        match self {
            HookKind::Exit => Some(TreeSets::EXITING),
            HookKind::Retain => Some(TreeSets::RETAINED),
            HookKind::Enter => Some(TreeSets::ENTERING),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            HookKind::Before => "onBefore",
            HookKind::Start => "onStart",
            HookKind::Exit => "onExit",
            HookKind::Retain => "onRetain",
            HookKind::Enter => "onEnter",
            HookKind::Success => "onSuccess",
            HookKind::Error => "onError",
        }
    }
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

bitflags! {
    /// Tree-change categories a criteria set constrains.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TreeSets: u8 {
        const TO = 1 << 0;
        const FROM = 1 << 1;
        const ENTERING = 1 << 2;
        const EXITING = 1 << 3;
        const RETAINED = 1 << 4;
    }
}

/// Selects states by name.
#[derive(Clone, Default)]
pub enum StateMatcher {
    /// Matches every state (and an empty node list).
    #[default]
    Any,
    Glob(Glob),
    Names(Vec<String>),
    Predicate(Rc<dyn Fn(&State) -> bool>),
}

impl StateMatcher {
    pub fn predicate(f: impl Fn(&State) -> bool + 'static) -> Self {
        StateMatcher::Predicate(Rc::new(f))
    }

    pub fn is_any(&self) -> bool {
        matches!(self, StateMatcher::Any)
    }

    pub fn matches(&self, state: &State) -> bool {
        match self {
            StateMatcher::Any => true,
            StateMatcher::Glob(glob) => glob.matches(&state.name),
            StateMatcher::Names(names) => names.iter().any(|n| *n == state.name),
            StateMatcher::Predicate(f) => f(state),
        }
    }
}

impl From<&str> for StateMatcher {
    fn from(text: &str) -> Self {
        if Glob::is_glob(text) {
            if let Ok(glob) = Glob::new(text) {
                return StateMatcher::Glob(glob);
            }
        }
        StateMatcher::Names(vec![text.to_string()])
    }
}

impl From<Vec<&str>> for StateMatcher {
    fn from(names: Vec<&str>) -> Self {
        StateMatcher::Names(names.into_iter().map(str::to_string).collect())
    }
}

impl fmt::Debug for StateMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateMatcher::Any => f.write_str("*"),
            StateMatcher::Glob(glob) => write!(f, "{}", glob.text()),
            StateMatcher::Names(names) => write!(f, "{names:?}"),
            StateMatcher::Predicate(_) => f.write_str("<predicate>"),
        }
    }
}

/// Which transitions (and nodes) a hook applies to. Unset fields match
/// everything.
#[derive(Debug, Clone, Default)]
pub struct HookCriteria {
    pub to: StateMatcher,
    pub from: StateMatcher,
    pub entering: StateMatcher,
    pub exiting: StateMatcher,
    pub retained: StateMatcher,
}

/// Node indices (into the `TreeChanges` lists) a hook matched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HookMatch {
    pub entering: Vec<usize>,
    pub exiting: Vec<usize>,
    pub retained: Vec<usize>,
}

impl HookMatch {
    pub fn nodes(&self, set: TreeSets) -> &[usize] {
        if set == TreeSets::EXITING {
            &self.exiting
        } else if set == TreeSets::RETAINED {
            &self.retained
        } else {
            &self.entering
        }
    }
}

impl HookCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn to(mut self, m: impl Into<StateMatcher>) -> Self {
        self.to = m.into();
        self
    }

    pub fn from(mut self, m: impl Into<StateMatcher>) -> Self {
        self.from = m.into();
        self
    }

    pub fn entering(mut self, m: impl Into<StateMatcher>) -> Self {
        self.entering = m.into();
        self
    }

    pub fn exiting(mut self, m: impl Into<StateMatcher>) -> Self {
        self.exiting = m.into();
        self
    }

    pub fn retained(mut self, m: impl Into<StateMatcher>) -> Self {
        self.retained = m.into();
        self
    }

    /// The categories this criteria set actually constrains.
    pub fn constrained(&self) -> TreeSets {
        let mut sets = TreeSets::empty();
        for (matcher, flag) in [
            (&self.to, TreeSets::TO),
            (&self.from, TreeSets::FROM),
            (&self.entering, TreeSets::ENTERING),
            (&self.exiting, TreeSets::EXITING),
            (&self.retained, TreeSets::RETAINED),
        ] {
            sets.set(flag, !matcher.is_any());
        }
        sets
    }

    /// Match against a transition. A constrained category that selects no
    /// node fails the whole match.
    pub fn matches(&self, changes: &TreeChanges) -> Option<HookMatch> {
        let constrained = self.constrained();
        let single = |matcher: &StateMatcher, flag: TreeSets, state: Option<&crate::StateRef>| {
            !constrained.contains(flag) || state.is_some_and(|s| matcher.matches(s))
        };
        if !single(&self.to, TreeSets::TO, changes.to_state()) || !single(&self.from, TreeSets::FROM, changes.from_state())
        {
            return None;
        }

        let select = |matcher: &StateMatcher, nodes: &[PathNode]| -> Vec<usize> {
            nodes.iter().enumerate().filter(|(_, n)| matcher.matches(&n.state)).map(|(i, _)| i).collect()
        };
        let found = HookMatch {
            entering: select(&self.entering, &changes.entering),
            exiting: select(&self.exiting, &changes.exiting),
            retained: select(&self.retained, &changes.retained),
        };
        for flag in [TreeSets::ENTERING, TreeSets::EXITING, TreeSets::RETAINED] {
            if constrained.contains(flag) && found.nodes(flag).is_empty() {
                return None;
            }
        }
        Some(found)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HookOptions {
    /// Higher runs first.
    pub priority: i32,
    /// Deregister after this many invocations.
    pub invoke_limit: Option<usize>,
}

impl HookOptions {
    pub fn priority(priority: i32) -> Self {
        HookOptions { priority, invoke_limit: None }
    }

    pub fn invoke_limit(mut self, limit: usize) -> Self {
        self.invoke_limit = Some(limit);
        self
    }
}

pub(crate) struct RegisteredHook {
    pub id: u64,
    pub kind: HookKind,
    pub criteria: HookCriteria,
    pub callback: HookFn,
    pub options: HookOptions,
    invocations: Cell<usize>,
}

struct InvalidHook {
    id: u64,
    priority: i32,
    callback: InvalidHookFn,
}

/// All hooks registered on one router.
#[derive(Default)]
pub(crate) struct HookRegistry {
    hooks: RefCell<Vec<Rc<RegisteredHook>>>,
    invalid: RefCell<Vec<InvalidHook>>,
    next_id: Cell<u64>,
}

impl HookRegistry {
    fn next_id(&self) -> u64 {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        id
    }

    pub fn add(
        self: &Rc<Self>,
        kind: HookKind,
        criteria: HookCriteria,
        callback: HookFn,
        options: HookOptions,
    ) -> HookRegistration {
        let id = self.next_id();
        tracing::trace!(hook = id, kind = %kind, priority = options.priority, "hook registered");
        self.hooks.borrow_mut().push(Rc::new(RegisteredHook {
            id,
            kind,
            criteria,
            callback,
            options,
            invocations: Cell::new(0),
        }));
        HookRegistration { registry: Rc::downgrade(self), id }
    }

    pub fn add_invalid(self: &Rc<Self>, callback: InvalidHookFn, priority: i32) -> HookRegistration {
        let id = self.next_id();
        self.invalid.borrow_mut().push(InvalidHook { id, priority, callback });
        HookRegistration { registry: Rc::downgrade(self), id }
    }

    pub fn remove(&self, id: u64) -> bool {
        let mut hooks = self.hooks.borrow_mut();
        let mut invalid = self.invalid.borrow_mut();
        let before = hooks.len() + invalid.len();
        hooks.retain(|h| h.id != id);
        invalid.retain(|h| h.id != id);
        hooks.len() + invalid.len() != before
    }

    /// False once the hook was deregistered or reached its invoke limit.
    pub fn contains(&self, id: u64) -> bool {
        self.hooks.borrow().iter().any(|h| h.id == id)
    }

    pub fn len(&self) -> usize {
        self.hooks.borrow().len() + self.invalid.borrow().len()
    }

    /// Hooks of `kind` that match `changes`, highest priority first.
    pub fn matching(&self, kind: HookKind, changes: &TreeChanges) -> Vec<(Rc<RegisteredHook>, HookMatch)> {
        let mut found: Vec<(Rc<RegisteredHook>, HookMatch)> = self
            .hooks
            .borrow()
            .iter()
            .filter(|h| h.kind == kind)
            .filter_map(|h| h.criteria.matches(changes).map(|m| (h.clone(), m)))
            .collect();
        found.sort_by(|(a, _), (b, _)| b.options.priority.cmp(&a.options.priority).then(a.id.cmp(&b.id)));
        found
    }

    pub fn invalid_hooks(&self) -> Vec<InvalidHookFn> {
        let mut hooks: Vec<(i32, u64, InvalidHookFn)> =
            self.invalid.borrow().iter().map(|h| (h.priority, h.id, h.callback.clone())).collect();
        hooks.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        hooks.into_iter().map(|(_, _, f)| f).collect()
    }

    /// Count an invocation; drops the hook once its limit is reached.
    pub fn invoked(&self, hook: &RegisteredHook) {
        let count = hook.invocations.get() + 1;
        hook.invocations.set(count);
        if hook.options.invoke_limit.is_some_and(|limit| count >= limit) {
            tracing::trace!(hook = hook.id, "hook reached its invoke limit");
            self.remove(hook.id);
        }
    }
}

/// Handle returned by hook registration.
#[derive(Debug, Clone)]
pub struct HookRegistration {
    registry: Weak<HookRegistry>,
    id: u64,
}

impl HookRegistration {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Remove the hook. Returns false when it was already gone.
    pub fn deregister(&self) -> bool {
        self.registry.upgrade().is_some_and(|r| r.remove(self.id))
    }
}
