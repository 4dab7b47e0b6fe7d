use std::cell::RefCell;
use std::rc::Rc;

use serde_json::json;

use super::*;
use crate::error::{ConfigError, RouteError};
use crate::params::{ParamDeclaration, ParamTypes};
use crate::url::{UrlConfig, UrlMatcherFactory};

fn registry() -> StateRegistry {
    let factory = UrlMatcherFactory::new(UrlConfig::default(), Rc::new(RefCell::new(ParamTypes::new())));
    StateRegistry::new(factory).unwrap()
}

fn names(states: &[StateRef]) -> Vec<&str> {
    states.iter().map(|s| s.name.as_str()).collect()
}

#[test]
fn implicit_root_is_abstract_with_a_dynamic_hash_param() {
    let reg = registry();
    let root = reg.root();
    assert!(root.is_root());
    assert!(root.is_abstract());
    assert_eq!(root.name, "");
    assert_eq!(root.display_name(), "(root)");
    let hash = root.param("#").unwrap();
    assert!(hash.dynamic);
    assert!(!hash.inherit);
}

#[test]
fn child_urls_are_appended_to_the_parent_url() {
    let mut reg = registry();
    reg.register(StateDeclaration::new("home").url("/")).unwrap();
    let item = reg.register(StateDeclaration::new("home.item").url("front/:id")).unwrap();

    let item = item.state().unwrap().clone();
    assert_eq!(item.url.as_ref().unwrap().pattern(), "/front/:id");
    assert_eq!(item.depth, 2);
    assert_eq!(names(&item.path()), vec!["", "home", "home.item"]);
    assert!(item.includes("home"));
    assert!(item.includes(""));
    assert!(!item.includes("home.item.detail"));
}

#[test]
fn absolute_urls_ignore_the_parent() {
    let mut reg = registry();
    reg.register(StateDeclaration::new("app").url("/app")).unwrap();
    let login = reg.register(StateDeclaration::new("app.login").url("^/login")).unwrap();
    assert_eq!(login.state().unwrap().url.as_ref().unwrap().pattern(), "/login");
}

#[test]
fn params_are_inherited_and_url_params_are_owned_once() {
    let mut reg = registry();
    reg.register(StateDeclaration::new("users").url("/users?page")).unwrap();
    let detail = reg
        .register(StateDeclaration::new("users.detail").url("/:id").param("tab", ParamDeclaration::with_default("info")))
        .unwrap();

    let detail = detail.state().unwrap().clone();
    let own: Vec<&str> = detail.own_params.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(own, vec!["id", "tab"]);
    for id in ["#", "page", "id", "tab"] {
        assert!(detail.param(id).is_some(), "missing {id}");
    }
    assert!(detail.own_param("page").is_none());
}

#[test]
fn parent_shorthand_prefixes_the_name() {
    let mut reg = registry();
    reg.register(StateDeclaration::new("home")).unwrap();
    let r = reg.register(StateDeclaration::new("item").parent("home")).unwrap();
    assert_eq!(r.name, "home.item");
    assert!(reg.get("home.item").is_some());

    let err = reg.register(StateDeclaration::new("home.other").parent("elsewhere")).unwrap_err();
    assert!(matches!(err, ConfigError::ParentMismatch { ref implied, .. } if implied == "home"));
}

#[test]
fn invalid_and_duplicate_names_are_rejected() {
    let mut reg = registry();
    assert!(matches!(reg.register(StateDeclaration::new("")), Err(ConfigError::InvalidStateName(_))));
    assert!(matches!(reg.register(StateDeclaration::new("a..b")), Err(ConfigError::InvalidStateName(_))));
    assert!(matches!(reg.register(StateDeclaration::new(".a")), Err(ConfigError::InvalidStateName(_))));

    reg.register(StateDeclaration::new("a")).unwrap();
    assert_eq!(reg.register(StateDeclaration::new("a")).unwrap_err(), ConfigError::DuplicateState("a".into()));

    // Queued names count as taken too.
    reg.register(StateDeclaration::new("x.y")).unwrap();
    assert_eq!(reg.register(StateDeclaration::new("x.y")).unwrap_err(), ConfigError::DuplicateState("x.y".into()));
}

#[test]
fn forward_references_wait_for_their_parent() {
    let mut reg = registry();
    let leaf = reg.register(StateDeclaration::new("a.b.c").url("/c")).unwrap();
    assert!(leaf.is_pending());
    let mid = reg.register(StateDeclaration::new("a.b").url("/b")).unwrap();
    assert!(mid.is_pending());
    assert_eq!(reg.pending(), vec![("a.b.c".to_string(), "a.b".to_string()), ("a.b".to_string(), "a".to_string())]);

    let top = reg.register(StateDeclaration::new("a").url("/a")).unwrap();
    assert_eq!(names(&top.registered), vec!["a", "a.b", "a.b.c"]);
    assert!(reg.pending().is_empty());
    assert_eq!(reg.get("a.b.c").unwrap().url.as_ref().unwrap().pattern(), "/a/b/c");
    assert_eq!(names(&reg.states()), vec!["a", "a.b", "a.b.c"]);
}

#[test]
fn stuck_declarations_are_reported_as_pending() {
    let mut reg = registry();
    reg.register(StateDeclaration::new("orphan.child")).unwrap();
    reg.register(StateDeclaration::new("other")).unwrap();
    assert_eq!(reg.pending(), vec![("orphan.child".to_string(), "orphan".to_string())]);
}

#[test]
fn decorators_wrap_the_base_producer_until_frozen() {
    let mut reg = registry();
    reg.builder_mut()
        .data
        .decorate(|draft, previous| {
            let mut data = previous()?;
            if let Some(obj) = data.as_object_mut() {
                obj.insert("decorated".into(), json!(draft.name));
            }
            Ok(data)
        })
        .unwrap();
    reg.builder_mut()
        .url
        .decorate(|draft, previous| match draft.name {
            "hidden" => Ok(None),
            _ => previous(),
        })
        .unwrap();
    assert_eq!(reg.builder().data.decorator_count(), 1);
    assert!(!reg.builder().is_frozen());

    let a = reg.register(StateDeclaration::new("a").url("/a").data(json!({ "title": "A" }))).unwrap();
    let hidden = reg.register(StateDeclaration::new("hidden").url("/hidden")).unwrap();

    assert_eq!(a.state().unwrap().data, json!({ "title": "A", "decorated": "a" }));
    assert!(hidden.state().unwrap().url.is_none());

    assert!(reg.builder().is_frozen());
    let err = reg.builder_mut().views.decorate(|_, previous| previous()).unwrap_err();
    assert_eq!(err, ConfigError::BuilderFrozen);
}

#[test]
fn includes_can_be_decorated_without_changing_the_tree() {
    let mut reg = registry();
    reg.builder_mut()
        .includes
        .decorate(|draft, previous| {
            let mut includes = previous()?;
            if draft.name == "shop.cart" {
                includes.insert("checkout".to_string());
            }
            Ok(includes)
        })
        .unwrap();
    reg.register(StateDeclaration::new("shop")).unwrap();
    let cart = reg.register(StateDeclaration::new("shop.cart")).unwrap().state().unwrap().clone();

    assert!(cart.includes("checkout"));
    assert!(cart.includes("shop"));
    assert_eq!(names(&cart.path()), vec!["", "shop", "shop.cart"]);

    let removed = reg.deregister("shop").unwrap();
    assert_eq!(names(&removed), vec!["shop.cart", "shop"]);
    assert!(reg.deregister("checkout").is_err());
}

#[test]
fn object_data_merges_over_the_parent() {
    let mut reg = registry();
    reg.register(StateDeclaration::new("a").data(json!({ "auth": true, "title": "A" }))).unwrap();
    reg.register(StateDeclaration::new("a.b").data(json!({ "title": "B" }))).unwrap();
    reg.register(StateDeclaration::new("a.c")).unwrap();

    assert_eq!(reg.get("a.b").unwrap().data, json!({ "auth": true, "title": "B" }));
    assert_eq!(reg.get("a.c").unwrap().data, json!({ "auth": true, "title": "A" }));
}

#[test]
fn component_shorthand_becomes_the_default_view() {
    let mut reg = registry();
    reg.register(StateDeclaration::new("a").component("Shell")).unwrap();
    let b = reg
        .register(
            StateDeclaration::new("a.b")
                .component("Ignored")
                .view("header@a", ViewDeclaration::component("Header"))
                .view("", ViewDeclaration::component("Body")),
        )
        .unwrap();

    let a = reg.get("a").unwrap();
    assert_eq!(a.views.len(), 1);
    assert_eq!(a.views[0].target(), "$default@");

    let targets: Vec<String> = b.state().unwrap().views.iter().map(ViewConfig::target).collect();
    assert_eq!(targets, vec!["$default@a", "header@a"]);
}

#[test]
fn deregister_removes_descendants_deepest_first() {
    let mut reg = registry();
    for name in ["a", "a.b", "a.b.c", "a.d", "e"] {
        reg.register(StateDeclaration::new(name)).unwrap();
    }

    let removed = reg.deregister("a.b").unwrap();
    assert_eq!(names(&removed), vec!["a.b.c", "a.b"]);
    assert!(reg.get("a.b").is_none());
    assert_eq!(names(&reg.states()), vec!["a", "a.d", "e"]);

    assert_eq!(reg.deregister("a.b").unwrap_err(), ConfigError::UnknownState("a.b".into()));
    assert!(reg.deregister("").is_err());
}

#[test]
fn relative_names_resolve_against_a_base() {
    let mut reg = registry();
    for name in ["home", "home.list", "home.list.item", "home.other"] {
        reg.register(StateDeclaration::new(name)).unwrap();
    }

    let find = |name: &str, base: &str| reg.find(name, Some(base)).unwrap().map(|s| s.name.clone());
    assert_eq!(find("^", "home.list").as_deref(), Some("home"));
    assert_eq!(find("^.other", "home.list").as_deref(), Some("home.other"));
    assert_eq!(find("^.^", "home.list.item").as_deref(), Some("home"));
    assert_eq!(find(".item", "home.list").as_deref(), Some("home.list.item"));
    assert_eq!(find("^.missing", "home.list"), None);
    assert_eq!(find("home", "home.list").as_deref(), Some("home"));

    assert!(matches!(reg.find("^.^", Some("home")), Ok(Some(ref s)) if s.is_root()));
    assert!(matches!(reg.find("^.^.^", Some("home")), Err(RouteError::InvalidRelativePath { .. })));
    assert!(matches!(reg.find("^", None), Err(RouteError::NoSuchState(_))));
}

#[test]
fn targets_describe_their_errors() {
    let mut reg = registry();
    reg.register(StateDeclaration::new("home")).unwrap();

    let found = TargetState::new("home", reg.get("home"), crate::ParamValues::new(), Default::default());
    assert!(found.exists() && found.valid());
    assert_eq!(found.error(), None);

    let missing = TargetState::named("nowhere", crate::ParamValues::new());
    assert!(!missing.exists());
    assert_eq!(missing.error().as_deref(), Some("No such state 'nowhere'"));

    let relative = missing.with_options(crate::transition::TransitionOptions::default().relative("home"));
    assert_eq!(relative.error().as_deref(), Some("Could not resolve 'nowhere' from state 'home'"));

    let merged = TargetState::named("home", params! { "a" => 1, "b" => 2 }).with_params(params! { "b" => 3 }, false);
    assert_eq!(merged.params(), &params! { "a" => 1, "b" => 3 });
    let replaced = merged.with_params(params! { "c" => 4 }, true);
    assert_eq!(replaced.params(), &params! { "c" => 4 });
}
