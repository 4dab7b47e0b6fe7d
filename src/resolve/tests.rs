use std::cell::{Cell, RefCell};
use std::rc::Rc;

use futures::executor::block_on;

use super::*;
use crate::error::RouteError;
use crate::injector::{Injector, downcast};
use crate::params::ParamTypes;
use crate::state::{StateDeclaration, StateRef, StateRegistry};
use crate::transition::PathNode;
use crate::url::{UrlConfig, UrlMatcherFactory};

fn path(decls: Vec<StateDeclaration>) -> Vec<PathNode> {
    let factory = UrlMatcherFactory::new(UrlConfig::default(), Rc::new(RefCell::new(ParamTypes::new())));
    let mut reg = StateRegistry::new(factory).unwrap();
    let mut last = None;
    for decl in decls {
        last = reg.register(decl).unwrap().state().cloned();
    }
    last.unwrap().path().into_iter().map(PathNode::new).collect()
}

fn context(nodes: Vec<PathNode>) -> ResolveContext {
    ResolveContext::new(nodes, Rc::new(Injector::new()), ResolvePolicy::Jit)
}

fn int(ctx: &ResolveContext, token: &str) -> Result<i64, RouteError> {
    let value = block_on(ctx.get(token, None))?;
    Ok(*downcast::<i64>(token, &value)?)
}

#[test]
fn nearest_resolvable_wins() {
    let ctx = context(path(vec![
        StateDeclaration::new("a").resolve(Resolvable::value("x", 1_i64)),
        StateDeclaration::new("a.b")
            .resolve(Resolvable::value("x", 2_i64))
            .resolve(Resolvable::sync("y", ["x"], |args| Ok(*args.get::<i64>("x")? * 10))),
    ]));
    assert_eq!(int(&ctx, "x").unwrap(), 2);
    assert_eq!(int(&ctx, "y").unwrap(), 20);
    // Seen from node "a", only the parent's value is visible.
    let at_a = block_on(ctx.get("x", Some(1))).unwrap();
    assert_eq!(*downcast::<i64>("x", &at_a).unwrap(), 1);
}

#[test]
fn a_resolvable_can_depend_on_the_token_it_shadows() {
    let ctx = context(path(vec![
        StateDeclaration::new("a").resolve(Resolvable::value("x", 1_i64)),
        StateDeclaration::new("a.b").resolve(Resolvable::sync("x", ["x"], |args| Ok(*args.get::<i64>("x")? + 10))),
    ]));
    assert_eq!(int(&ctx, "x").unwrap(), 11);
}

#[test]
fn each_resolvable_runs_at_most_once() {
    let calls = Rc::new(Cell::new(0));
    let counter = calls.clone();
    let ctx = context(path(vec![
        StateDeclaration::new("a")
            .resolve(Resolvable::sync("base", Vec::<&str>::new(), move |_| {
                counter.set(counter.get() + 1);
                Ok(5_i64)
            }))
            .resolve(Resolvable::sync("left", ["base"], |args| Ok(*args.get::<i64>("base")? + 1)))
            .resolve(Resolvable::sync("right", ["base"], |args| Ok(*args.get::<i64>("base")? + 2))),
    ]));

    let tokens = block_on(ctx.resolve_path(ResolvePolicy::Jit, None)).unwrap();
    assert_eq!(tokens, vec!["base", "left", "right"]);
    assert_eq!(int(&ctx, "left").unwrap(), 6);
    assert_eq!(int(&ctx, "right").unwrap(), 7);
    assert_eq!(calls.get(), 1);
}

#[test]
fn async_resolvables_wait_for_their_dependencies() {
    let ctx = context(path(vec![StateDeclaration::new("a")
        .resolve(Resolvable::new("user", ["userId"], |args| async move {
            let id = args.get::<i64>("userId")?;
            Ok::<_, RouteError>(format!("user #{id}"))
        }))
        .resolve(Resolvable::new("userId", Vec::<&str>::new(), |_| async { Ok::<_, RouteError>(42_i64) }))]));

    let user = block_on(ctx.get("user", None)).unwrap();
    assert_eq!(*downcast::<String>("user", &user).unwrap(), "user #42");
    assert!(ctx.value("userId", None).is_some());
}

#[test]
fn circular_dependencies_are_reported() {
    let ctx = context(path(vec![StateDeclaration::new("a")
        .resolve(Resolvable::sync("p", ["q"], |_| Ok(1_i64)))
        .resolve(Resolvable::sync("q", ["p"], |_| Ok(2_i64)))]));

    match block_on(ctx.get("p", None)) {
        Err(RouteError::CircularDependency(token)) => assert_eq!(token, "p"),
        other => panic!("expected a circular dependency, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn missing_dependencies_fail_the_resolvable() {
    let ctx = context(path(vec![
        StateDeclaration::new("a").resolve(Resolvable::sync("p", ["nowhere"], |_| Ok(1_i64))),
    ]));

    match block_on(ctx.get("p", None)) {
        Err(RouteError::MissingDependency { token, dependency }) => {
            assert_eq!(token, "p");
            assert_eq!(dependency, "nowhere");
        }
        other => panic!("expected a missing dependency, got {:?}", other.map(|_| ())),
    }
    assert!(matches!(block_on(ctx.get("nowhere", None)), Err(RouteError::UnknownResolvable(_))));
}

#[test]
fn services_and_locals_are_visible_as_dependencies() {
    let mut injector = Injector::new();
    injector.provide("api", "https://example.test".to_string());
    let nodes = path(vec![StateDeclaration::new("a").resolve(Resolvable::sync("endpoint", ["api", "$page"], |args| {
        Ok(format!("{}/{}", args.get::<String>("api")?, args.get::<i64>("$page")?))
    }))]);
    let ctx = ResolveContext::new(nodes, Rc::new(injector), ResolvePolicy::Jit);
    ctx.provide_local("$page", Rc::new(|| Some(crate::any_value(3_i64))));

    let value = block_on(ctx.get("endpoint", None)).unwrap();
    assert_eq!(*downcast::<String>("endpoint", &value).unwrap(), "https://example.test/3");
}

#[test]
fn state_token_yields_the_requesting_node_state() {
    let ctx = context(path(vec![
        StateDeclaration::new("a"),
        StateDeclaration::new("a.b").resolve(Resolvable::sync("name", ["$state$"], |args| {
            Ok(args.get::<StateRef>("$state$")?.name.clone())
        })),
    ]));
    let value = block_on(ctx.get("name", None)).unwrap();
    assert_eq!(*downcast::<String>("name", &value).unwrap(), "a.b");
}

#[test]
fn policies_select_what_a_path_resolve_runs() {
    let jit_calls = Rc::new(Cell::new(0));
    let counter = jit_calls.clone();
    let ctx = context(path(vec![
        StateDeclaration::new("a")
            .resolve(Resolvable::value("eager", 1_i64).with_policy(ResolvePolicy::Eager))
            .resolve(Resolvable::sync("lazy", Vec::<&str>::new(), |_| Ok(2_i64)).with_policy(ResolvePolicy::Lazy)),
        StateDeclaration::new("a.b").resolve(Resolvable::sync("jit", Vec::<&str>::new(), move |_| {
            counter.set(counter.get() + 1);
            Ok(3_i64)
        })),
    ]));

    assert_eq!(block_on(ctx.resolve_path(ResolvePolicy::Eager, None)).unwrap(), vec!["eager"]);
    assert!(ctx.value("lazy", None).is_none());

    assert_eq!(block_on(ctx.resolve_path(ResolvePolicy::Lazy, Some(1))).unwrap(), vec!["eager", "lazy"]);
    assert!(ctx.value("lazy", None).is_some());
    assert!(ctx.value("jit", None).is_none());
    assert_eq!(jit_calls.get(), 0);

    assert_eq!(int(&ctx, "jit").unwrap(), 3);
    assert_eq!(jit_calls.get(), 1);
}

#[test]
fn state_policy_applies_to_resolvables_without_one() {
    let ctx = context(path(vec![StateDeclaration::new("a")
        .resolve_policy(ResolvePolicy::Eager)
        .resolve(Resolvable::value("inherits", 1_i64))
        .resolve(Resolvable::value("own", 2_i64).with_policy(ResolvePolicy::Jit))]));
    assert_eq!(block_on(ctx.resolve_path(ResolvePolicy::Eager, None)).unwrap(), vec!["inherits"]);
}

#[test]
fn failures_propagate_and_leave_no_data() {
    let ctx = context(path(vec![StateDeclaration::new("a")
        .resolve(Resolvable::sync("broken", Vec::<&str>::new(), |_| Err::<i64, _>(RouteError::msg("backend down"))))
        .resolve(Resolvable::sync("uses", ["broken"], |args| Ok(*args.get::<i64>("broken")?)))]));

    let err = block_on(ctx.resolve_path(ResolvePolicy::Jit, None)).unwrap_err();
    assert_eq!(err.to_string(), "backend down");
    assert!(ctx.value("broken", None).is_none());
}

#[test]
fn added_resolvables_replace_same_token_on_the_node() {
    let ctx = context(path(vec![StateDeclaration::new("a").resolve(Resolvable::value("x", 1_i64))]));
    ctx.add_resolvables(1, vec![Resolvable::value("x", 9_i64), Resolvable::value("extra", 4_i64)]);
    assert_eq!(int(&ctx, "x").unwrap(), 9);
    assert_eq!(int(&ctx, "extra").unwrap(), 4);
    assert_eq!(ctx.tokens(None), vec!["x", "extra"]);
}

#[test]
fn policies_parse_case_insensitively() {
    assert_eq!("EAGER".parse::<ResolvePolicy>().unwrap(), ResolvePolicy::Eager);
    assert_eq!("lazy".parse::<ResolvePolicy>().unwrap(), ResolvePolicy::Lazy);
    assert!("soon".parse::<ResolvePolicy>().is_err());
}
