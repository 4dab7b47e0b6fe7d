use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use proptest::prelude::*;
use regex::Regex;

use super::*;
use crate::error::{ConfigError, RouteError};
use crate::params::{ParamDeclaration, ParamTypes, Squash};
use crate::{ParamValue, ParamValues};

fn factory_with(config: UrlConfig) -> UrlMatcherFactory {
    UrlMatcherFactory::new(config, Rc::new(RefCell::new(ParamTypes::new())))
}

fn factory() -> UrlMatcherFactory {
    factory_with(UrlConfig::default())
}

fn exec(m: &UrlMatcher, path: &str) -> Option<ParamValues> {
    m.exec(path, &ParamValues::new(), None).unwrap()
}

fn decls(pairs: Vec<(&str, ParamDeclaration)>) -> BTreeMap<String, ParamDeclaration> {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

#[test]
fn numeric_regexp_placeholder_is_integer_typed() {
    let m = factory().compile("/user/{id:[0-9]+}").unwrap();
    assert_eq!(exec(&m, "/user/42"), Some(params! { "id" => 42 }));
    assert_eq!(m.format(&params! { "id" => 42 }).as_deref(), Some("/user/42"));
    assert_eq!(exec(&m, "/user/bob"), None);
}

#[test]
fn placeholder_syntaxes() {
    let m = factory().compile("/a/:x/{y}/{z:int}/*rest").unwrap();
    let ids: Vec<&str> = m.params().iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["x", "y", "z", "rest"]);
    assert_eq!(m.segments(), &["/a/", "/", "/", "/", ""]);

    let values = exec(&m, "/a/one/two/3/deep/er%20path").unwrap();
    assert_eq!(values.get("z"), Some(&ParamValue::Int(3)));
    assert_eq!(values.get("rest"), Some(&ParamValue::from("deep/er path")));
}

#[test]
fn format_returns_none_for_invalid_values() {
    let m = factory().compile("/item/{id:int}").unwrap();
    assert_eq!(m.format(&params! { "id" => "abc" }), None);
    assert_eq!(m.format(&ParamValues::new()), None);
    assert_eq!(m.format(&params! { "id" => "7" }).as_deref(), Some("/item/7"));
}

#[test]
fn slashes_in_string_params_are_escaped() {
    let m = factory().compile("/doc/:name").unwrap();
    let url = m.format(&params! { "name" => "a/b" }).unwrap();
    assert_eq!(url, "/doc/a~2Fb");
    assert_eq!(exec(&m, &url), Some(params! { "name" => "a/b" }));
}

#[test]
fn search_params_collect_and_format() {
    let m = factory().compile("/list?{page:int}&tag").unwrap();
    assert_eq!(m.source_path(), "/list");
    assert_eq!(m.source_search(), "?{page:int}&tag");

    let search = parse_query("page=2&tag=a&tag=b");
    let values = m.exec("/list", &search, None).unwrap().unwrap();
    assert_eq!(values, params! { "page" => 2, "tag" => vec!["a", "b"] });
    assert_eq!(m.format(&values).as_deref(), Some("/list?page=2&tag=a&tag=b"));

    let empty = m.exec("/list", &ParamValues::new(), None).unwrap().unwrap();
    assert!(empty.is_empty());
    assert_eq!(m.format(&empty).as_deref(), Some("/list"));
}

#[test]
fn hash_is_captured_and_rendered() {
    let m = factory().compile("/page").unwrap();
    let values = m.exec("/page", &ParamValues::new(), Some("intro")).unwrap().unwrap();
    assert_eq!(values.get("#"), Some(&ParamValue::from("intro")));
    assert_eq!(m.format(&values).as_deref(), Some("/page#intro"));
}

#[test]
fn path_arrays_escape_dashes() {
    let m = factory().compile("/tags/:ids[]").unwrap();
    let url = m.format(&params! { "ids" => vec!["a", "b-c"] }).unwrap();
    assert_eq!(url, "/tags/a-b%5C%2Dc");
    assert_eq!(exec(&m, &url), Some(params! { "ids" => vec!["a", "b-c"] }));
}

#[test]
fn slash_squash_drops_default_and_one_slash() {
    let d = decls(vec![("tab", ParamDeclaration::with_default("info").squash(Squash::Slash))]);
    let m = factory().compile_with("/user/:tab/edit", &d).unwrap();

    assert_eq!(m.format(&ParamValues::new()).as_deref(), Some("/user/edit"));
    assert_eq!(m.format(&params! { "tab" => "posts" }).as_deref(), Some("/user/posts/edit"));
    assert_eq!(exec(&m, "/user/edit"), Some(params! { "tab" => "info" }));
    assert_eq!(exec(&m, "/user/posts/edit"), Some(params! { "tab" => "posts" }));
}

#[test]
fn string_squash_renders_marker() {
    let d = decls(vec![("tab", ParamDeclaration::with_default("info").squash(Squash::Replace("~".into())))]);
    let m = factory().compile_with("/user/:tab/edit", &d).unwrap();
    assert_eq!(m.format(&ParamValues::new()).as_deref(), Some("/user/~/edit"));
    assert_eq!(exec(&m, "/user/~/edit"), Some(params! { "tab" => "info" }));
}

#[test]
fn extra_capture_groups_are_reported_on_exec() {
    let m = factory().compile("/x/{code:(a|b)}").unwrap();
    let err = m.exec("/x/a", &ParamValues::new(), None).unwrap_err();
    assert!(matches!(err, RouteError::UnbalancedCaptureGroups(p) if p == "/x/{code:(a|b)}"));
}

#[test]
fn invalid_and_duplicate_names_fail_compilation() {
    assert!(matches!(factory().compile("/a/:x[]y"), Err(ConfigError::InvalidParamName { .. })));
    assert!(matches!(factory().compile("/a/:id/b/:id"), Err(ConfigError::DuplicateParam { .. })));
    assert!(matches!(factory().compile("/a/{id:unknown(}"), Err(ConfigError::InvalidPattern { .. })));
}

#[test]
fn case_and_strict_configuration() {
    let loose = factory_with(UrlConfig { case_insensitive: true, strict_mode: false, ..UrlConfig::default() });
    let m = loose.compile("/Users/:id").unwrap();
    assert_eq!(exec(&m, "/users/5/"), Some(params! { "id" => "5" }));

    let strict = factory().compile("/Users/:id").unwrap();
    assert_eq!(exec(&strict, "/users/5"), None);
    assert_eq!(exec(&strict, "/Users/5/"), None);
}

#[test]
fn concat_keeps_parent_search_and_merges_declarations() {
    let f = factory();
    let parent = f.compile_with("/users/:uid?sort", &decls(vec![("uid", ParamDeclaration::new().type_name("int"))])).unwrap();
    let child = parent.concat("/posts/{pid:int}", &BTreeMap::new()).unwrap();

    assert_eq!(child.pattern(), "/users/:uid/posts/{pid:int}?sort");
    let ids: Vec<&str> = child.params().iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["uid", "pid", "sort"]);
    assert_eq!(exec(&child, "/users/1/posts/2"), Some(params! { "uid" => 1, "pid" => 2 }));
}

#[test]
fn rules_redirect_with_matcher_values() {
    let f = factory();
    let router = UrlRouter::new(UrlConfig::default());
    router.when(f.compile("/old/:id").unwrap(), UrlRuleHandler::Redirect("/new/:id".into()));
    router.when(
        Regex::new(r"^/legacy/(\w+)$").unwrap(),
        UrlRuleHandler::Redirect("/modern/$1".into()),
    );

    let none = ParamValues::new();
    assert_eq!(router.match_url("/old/5", &none, "").unwrap(), Some(UrlRuleMatch::Redirect("/new/5".into())));
    assert_eq!(router.match_url("/legacy/abc", &none, "").unwrap(), Some(UrlRuleMatch::Redirect("/modern/abc".into())));
    assert_eq!(router.match_url("/nothing", &none, "").unwrap(), None);
}

#[test]
fn otherwise_and_func_handlers() {
    let f = factory();
    let router = UrlRouter::new(UrlConfig::default());
    router.when(
        f.compile("/skip/:x").unwrap(),
        UrlRuleHandler::func(|m| (m.param("x") == Some(&ParamValue::from("me"))).then_some(UrlRuleMatch::Handled)),
    );
    router.when(f.compile("/home").unwrap(), UrlRuleHandler::State("home".into()));
    router.otherwise(UrlRuleHandler::Redirect("/home".into()));

    let none = ParamValues::new();
    assert_eq!(router.match_url("/skip/me", &none, "").unwrap(), Some(UrlRuleMatch::Handled));
    assert_eq!(router.match_url("/skip/you", &none, "").unwrap(), Some(UrlRuleMatch::Redirect("/home".into())));
    assert_eq!(
        router.match_url("/home", &none, "").unwrap(),
        Some(UrlRuleMatch::State { name: "home".into(), params: ParamValues::new() })
    );
}

#[test]
fn higher_priority_rules_win() {
    let f = factory();
    let router = UrlRouter::new(UrlConfig::default());
    router.when(f.compile("/a").unwrap(), UrlRuleHandler::State("low".into()));
    let id = router.when_with_priority(f.compile("/a").unwrap(), UrlRuleHandler::State("high".into()), 10);

    let none = ParamValues::new();
    assert!(matches!(router.match_url("/a", &none, "").unwrap(), Some(UrlRuleMatch::State { name, .. }) if name == "high"));
    assert!(router.remove_rule(id));
    assert!(matches!(router.match_url("/a", &none, "").unwrap(), Some(UrlRuleMatch::State { name, .. }) if name == "low"));
}

#[test]
fn href_in_hash_and_html5_modes() {
    let f = factory();
    let m = f.compile("/front/:id").unwrap();
    let p = params! { "id" => "5" };

    let hash = UrlRouter::new(UrlConfig::default());
    assert_eq!(hash.href(&m, &p, false).as_deref(), Some("#/front/5"));

    let bang = UrlRouter::new(UrlConfig { hash_prefix: "!".into(), base_url: "http://x.test/".into(), ..UrlConfig::default() });
    assert_eq!(bang.href(&m, &p, true).as_deref(), Some("http://x.test/#!/front/5"));

    let html5 = UrlRouter::new(UrlConfig { html5_mode: true, base_url: "http://x.test/app".into(), ..UrlConfig::default() });
    assert_eq!(html5.href(&m, &p, false).as_deref(), Some("/front/5"));
    assert_eq!(html5.href(&m, &p, true).as_deref(), Some("http://x.test/app/front/5"));
    assert_eq!(html5.href(&m, &ParamValues::new(), false), None);
}

#[test]
fn push_writes_to_the_attached_location() {
    let m = factory().compile("/front/:id").unwrap();
    let router = UrlRouter::new(UrlConfig::default());
    assert_eq!(router.push(&m, &params! { "id" => "1" }, false), None);

    let location = MemoryLocation::new("/");
    router.attach(Rc::new(location.clone()));
    assert_eq!(router.push(&m, &params! { "id" => "1" }, false).as_deref(), Some("/front/1"));
    assert_eq!(location.path(), "/front/1");
    assert_eq!(router.sync().unwrap(), None);
}

proptest! {
    #[test]
    fn format_then_exec_reproduces_values(
        id in any::<i64>(),
        slug in ".{0,12}",
        page in proptest::option::of(0i64..10_000),
        tags in proptest::collection::vec("[a-z0-9 +-]{1,6}", 1..4),
    ) {
        let m = factory().compile("/users/{id:int}/:slug?{page:int}&tag").unwrap();
        let mut values = params! { "id" => id, "slug" => slug.as_str(), "tag" => tags.clone() };
        if let Some(page) = page {
            values.insert("page", ParamValue::Int(page));
        }

        let url = m.format(&values).unwrap();
        let (path, query, _) = split_url(&url);
        let parsed = m.exec(path, &parse_query(query), None).unwrap().unwrap();

        for param in m.params() {
            prop_assert!(
                param.equals(values.get(&param.id), parsed.get(&param.id)),
                "{} differs: {:?} vs {:?}", param.id, values.get(&param.id), parsed.get(&param.id)
            );
        }
    }
}
