use std::borrow::Cow;
use std::cell::RefCell;
use std::rc::Rc;

use crate::{ParamValue, ParamValues};

/// The browser (or host) location as seen by the router.
///
/// Implementations decide how URLs are stored and when the user changed them.
/// `set_url` is router-initiated and must not call the change listeners.
pub trait Location {
    fn path(&self) -> String;
    /// Decoded query parameters; repeated keys become arrays.
    fn search(&self) -> ParamValues;
    fn hash(&self) -> String;
    fn on_change(&self, listener: Rc<dyn Fn()>);
    fn set_url(&self, url: &str, replace: bool);
}

#[derive(Default)]
struct MemoryState {
    path: String,
    query: String,
    hash: String,
    history: Vec<String>,
    listeners: Vec<Rc<dyn Fn()>>,
}

/// In-memory [`Location`] with a recorded history.
#[derive(Clone, Default)]
pub struct MemoryLocation {
    inner: Rc<RefCell<MemoryState>>,
}

impl MemoryLocation {
    pub fn new(url: &str) -> Self {
        let location = MemoryLocation::default();
        location.store(url);
        location
    }

    /// Simulate a user-initiated URL change: update, then notify listeners.
    pub fn navigate(&self, url: &str) {
        self.store(url);
        self.inner.borrow_mut().history.push(url.to_string());
        let listeners: Vec<Rc<dyn Fn()>> = self.inner.borrow().listeners.clone();
        for listener in listeners {
            listener();
        }
    }

    /// The current URL (`path?query#hash`).
    pub fn url(&self) -> String {
        let state = self.inner.borrow();
        let mut url = state.path.clone();
        if !state.query.is_empty() {
            url.push('?');
            url.push_str(&state.query);
        }
        if !state.hash.is_empty() {
            url.push('#');
            url.push_str(&state.hash);
        }
        url
    }

    /// Every URL that was pushed or navigated to, oldest first. Replacements
    /// overwrite the newest entry.
    pub fn history(&self) -> Vec<String> {
        self.inner.borrow().history.clone()
    }

    fn store(&self, url: &str) {
        let (path, query, hash) = split_url(url);
        let mut state = self.inner.borrow_mut();
        state.path = path.to_string();
        state.query = query.to_string();
        state.hash = hash.to_string();
    }
}

impl Location for MemoryLocation {
    fn path(&self) -> String {
        self.inner.borrow().path.clone()
    }

    fn search(&self) -> ParamValues {
        parse_query(&self.inner.borrow().query)
    }

    fn hash(&self) -> String {
        self.inner.borrow().hash.clone()
    }

    fn on_change(&self, listener: Rc<dyn Fn()>) {
        self.inner.borrow_mut().listeners.push(listener);
    }

    fn set_url(&self, url: &str, replace: bool) {
        self.store(url);
        let mut state = self.inner.borrow_mut();
        if replace {
            state.history.pop();
        }
        state.history.push(url.to_string());
    }
}

/// Split a URL into `(path, query, hash)` without the `?`/`#` separators.
pub(crate) fn split_url(url: &str) -> (&str, &str, &str) {
    let (rest, hash) = url.split_once('#').unwrap_or((url, ""));
    let (path, query) = rest.split_once('?').unwrap_or((rest, ""));
    (path, query, hash)
}

/// Decode a query string; keys that repeat collect into arrays.
pub(crate) fn parse_query(query: &str) -> ParamValues {
    let mut values = ParamValues::new();
    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let key = decode_component(key);
        let value = ParamValue::String(decode_component(value));
        let merged = match values.remove(&key) {
            None => value,
            Some(ParamValue::Array(mut items)) => {
                items.push(value);
                ParamValue::Array(items)
            }
            Some(previous) => ParamValue::Array(vec![previous, value]),
        };
        values.insert(key, merged);
    }
    values
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced).map(Cow::into_owned).unwrap_or(spaced)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_url_handles_missing_parts() {
        assert_eq!(split_url("/a/b?x=1#top"), ("/a/b", "x=1", "top"));
        assert_eq!(split_url("/a#frag?not-query"), ("/a", "", "frag?not-query"));
        assert_eq!(split_url("/"), ("/", "", ""));
    }

    #[test]
    fn repeated_query_keys_become_arrays() {
        let q = parse_query("tag=a&tag=b%20c&page=2&flag");
        assert_eq!(q.get("tag"), Some(&ParamValue::from(vec!["a", "b c"])));
        assert_eq!(q.get("page"), Some(&ParamValue::from("2")));
        assert_eq!(q.get("flag"), Some(&ParamValue::from("")));
    }

    #[test]
    fn set_url_is_silent_and_navigate_notifies() {
        let location = MemoryLocation::new("/");
        let hits = Rc::new(RefCell::new(0));
        let counter = hits.clone();
        location.on_change(Rc::new(move || *counter.borrow_mut() += 1));

        location.set_url("/a?x=1", false);
        assert_eq!(*hits.borrow(), 0);
        assert_eq!(location.path(), "/a");

        location.navigate("/b#h");
        assert_eq!(*hits.borrow(), 1);
        assert_eq!(location.hash(), "h");

        location.set_url("/c", true);
        assert_eq!(location.history(), vec!["/a?x=1".to_string(), "/c".to_string()]);
        assert_eq!(location.url(), "/c");
    }
}
