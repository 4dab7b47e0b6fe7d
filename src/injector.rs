//! A small, explicit service container.
//!
//! Resolve functions and deferred parameter types never reach into a global
//! registry. Everything they may depend on is either another resolvable on the
//! path or a named service registered here. Values are stored type-erased as
//! [`AnyValue`] and recovered with a checked downcast.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::error::RouteError;

/// A type-erased, shared value (resolved data, services, injected locals).
pub type AnyValue = Rc<dyn Any>;

/// Wrap a value as an [`AnyValue`].
pub fn any_value<T: 'static>(value: T) -> AnyValue {
    Rc::new(value)
}

/// Checked downcast of an [`AnyValue`]; `token` is only used for the error.
pub fn downcast<T: 'static>(token: &str, value: &AnyValue) -> Result<Rc<T>, RouteError> {
    value.clone().downcast::<T>().map_err(|_| RouteError::TypeMismatch { token: token.to_string() })
}

#[derive(Default, Clone)]
pub struct Injector {
    services: HashMap<String, AnyValue>,
}

impl Injector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a named service.
    pub fn provide<T: 'static>(&mut self, name: impl Into<String>, value: T) -> &mut Self {
        self.services.insert(name.into(), any_value(value));
        self
    }

    pub fn provide_any(&mut self, name: impl Into<String>, value: AnyValue) -> &mut Self {
        self.services.insert(name.into(), value);
        self
    }

    pub fn has(&self, name: &str) -> bool {
        self.services.contains_key(name)
    }

    pub fn get_any(&self, name: &str) -> Option<AnyValue> {
        self.services.get(name).cloned()
    }

    pub fn get<T: 'static>(&self, name: &str) -> Option<Rc<T>> {
        self.services.get(name).and_then(|v| v.clone().downcast::<T>().ok())
    }
}

impl fmt::Debug for Injector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.services.keys().collect();
        names.sort();
        f.debug_struct("Injector").field("services", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_lookup_checks_the_stored_type() {
        let mut injector = Injector::new();
        injector.provide("apiBase", String::from("/api"));

        assert_eq!(injector.get::<String>("apiBase").as_deref().map(String::as_str), Some("/api"));
        assert!(injector.get::<i64>("apiBase").is_none());
        assert!(injector.get::<String>("missing").is_none());
    }

    #[test]
    fn downcast_reports_the_token() {
        let value = any_value(5_i64);
        let err = downcast::<String>("count", &value).unwrap_err();
        assert!(matches!(err, RouteError::TypeMismatch { token } if token == "count"));
    }
}
