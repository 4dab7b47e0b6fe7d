use std::fmt;
use std::rc::Rc;

use super::options::Reload;
use crate::ParamValues;
use crate::params::{changed_params, param_values};
use crate::resolve::Resolvable;
use crate::state::StateRef;

/// One step of a path: a state plus the values of the parameters it owns.
#[derive(Clone)]
pub struct PathNode {
    pub state: StateRef,
    /// Values of `state.own_params` only.
    pub param_values: ParamValues,
    pub resolvables: Vec<Rc<Resolvable>>,
}

impl PathNode {
    /// A node with unresolved copies of the state's resolvables.
    pub fn new(state: StateRef) -> Self {
        let resolvables = state.resolvables.iter().map(|r| Rc::new(r.fresh())).collect();
        PathNode { state, param_values: ParamValues::new(), resolvables }
    }

    /// Pick this node's parameters out of `raw`, applying defaults.
    pub fn apply_raw_params(mut self, raw: &ParamValues) -> Self {
        self.param_values = param_values(&self.state.own_params, raw);
        self
    }

    pub fn name(&self) -> &str {
        &self.state.name
    }

    /// Same state and equal parameter values. Dynamic parameters are only
    /// compared when `include_dynamic` is set.
    pub fn matches(&self, other: &PathNode, include_dynamic: bool) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
            && changed_params(
                self.state.own_params.iter().filter(|p| include_dynamic || !p.dynamic),
                &self.param_values,
                &other.param_values,
            )
            .is_empty()
    }
}

impl fmt::Debug for PathNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.state.display_name(), self.param_values)
    }
}

/// Every parameter value along a path.
pub fn path_params(path: &[PathNode]) -> ParamValues {
    let mut all = ParamValues::new();
    for node in path {
        all.extend_from(&node.param_values);
    }
    all
}

/// Build the root-to-target path for `target`.
///
/// With `inherit`, a state that is also on `from` takes its previous values
/// for parameters the caller did not pass (non-inheritable ones excluded).
pub(crate) fn build_path(target: &StateRef, params: &ParamValues, from: &[PathNode], inherit: bool) -> Vec<PathNode> {
    target
        .path()
        .into_iter()
        .map(|state| {
            let mut raw = ParamValues::new();
            if inherit {
                if let Some(previous) = from.iter().find(|n| Rc::ptr_eq(&n.state, &state)) {
                    for param in state.own_params.iter().filter(|p| p.inherit) {
                        if let Some(value) = previous.param_values.get(&param.id) {
                            raw.insert(param.id.clone(), value.clone());
                        }
                    }
                }
            }
            raw.extend_from(params);
            PathNode::new(state).apply_raw_params(&raw)
        })
        .collect()
}

/// The difference between the active path and a target path.
#[derive(Clone, Default)]
pub struct TreeChanges {
    pub from: Vec<PathNode>,
    /// `retained` (with the new parameter values) followed by `entering`.
    pub to: Vec<PathNode>,
    /// Shared prefix, as it was on `from` (resolved data carried forward).
    pub retained: Vec<PathNode>,
    /// Shared prefix with the target's parameter values applied.
    pub retained_with_to_params: Vec<PathNode>,
    /// Deepest first.
    pub exiting: Vec<PathNode>,
    /// Shallowest first.
    pub entering: Vec<PathNode>,
}

impl TreeChanges {
    /// Walk both paths while the states match and their non-dynamic
    /// parameters are equal. `reload` stops the walk at the reloaded state.
    pub fn compute(from: &[PathNode], to: Vec<PathNode>, reload: &Reload) -> TreeChanges {
        let stop_at = |node: &PathNode| match reload {
            Reload::No => false,
            Reload::All => true,
            Reload::State(name) => node.state.name == *name,
        };

        let max = from.len().min(to.len());
        let mut keep = 0;
        while keep < max && !stop_at(&from[keep]) && from[keep].matches(&to[keep], false) {
            keep += 1;
        }

        let retained: Vec<PathNode> = from[..keep].to_vec();
        let retained_with_to_params: Vec<PathNode> = retained
            .iter()
            .zip(&to)
            .map(|(old, new)| PathNode { param_values: new.param_values.clone(), ..old.clone() })
            .collect();
        let exiting: Vec<PathNode> = from[keep..].iter().rev().cloned().collect();
        let entering: Vec<PathNode> = to.into_iter().skip(keep).collect();
        let mut to_path = retained_with_to_params.clone();
        to_path.extend(entering.iter().cloned());

        TreeChanges { from: from.to_vec(), to: to_path, retained, retained_with_to_params, exiting, entering }
    }

    pub fn to_state(&self) -> Option<&StateRef> {
        self.to.last().map(|n| &n.state)
    }

    pub fn from_state(&self) -> Option<&StateRef> {
        self.from.last().map(|n| &n.state)
    }

    /// True when nothing would exit or enter and every parameter (dynamic
    /// ones included) is unchanged.
    pub fn is_unchanged(&self) -> bool {
        self.exiting.is_empty()
            && self.entering.is_empty()
            && self.from.len() == self.to.len()
            && self.from.iter().zip(&self.to).all(|(a, b)| a.matches(b, true))
    }

    pub fn entering_names(&self) -> Vec<&str> {
        self.entering.iter().map(PathNode::name).collect()
    }

    pub fn exiting_names(&self) -> Vec<&str> {
        self.exiting.iter().map(PathNode::name).collect()
    }

    pub fn retained_names(&self) -> Vec<&str> {
        self.retained.iter().map(PathNode::name).collect()
    }

    /// Dynamic parameter values that differ on retained states.
    pub fn changed_dynamic_params(&self) -> ParamValues {
        let mut changed = ParamValues::new();
        for (old, new) in self.retained.iter().zip(&self.retained_with_to_params) {
            let dynamic = old.state.own_params.iter().filter(|p| p.dynamic);
            for param in changed_params(dynamic, &old.param_values, &new.param_values) {
                let value = new.param_values.get(&param.id).cloned().unwrap_or(crate::ParamValue::Null);
                changed.insert(param.id.clone(), value);
            }
        }
        changed
    }
}

impl fmt::Debug for TreeChanges {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreeChanges")
            .field("retained", &self.retained_names())
            .field("exiting", &self.exiting_names())
            .field("entering", &self.entering_names())
            .finish()
    }
}
