//! Unit tests for dependency graph ordering.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use rstest::rstest;
use semver::Version;

use super::*;

fn plugin(name: &str, dependencies: &[&str]) -> PluginInfo {
    PluginInfo {
        name: name.to_owned(),
        version: Version::new(1, 0, 0),
        location: PathBuf::from("/plugins").join(name),
        main: String::from("index.rhai"),
        dependencies: dependencies
            .iter()
            .map(|dep| ((*dep).to_owned(), String::from("*")))
            .collect::<BTreeMap<_, _>>(),
        description: None,
        module: None,
    }
}

fn set(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|name| (*name).to_owned()).collect()
}

fn position(order: &[String], name: &str) -> usize {
    order
        .iter()
        .position(|entry| entry == name)
        .unwrap_or_else(|| panic!("{name} missing from {order:?}"))
}

#[test]
fn edges_only_cover_installed_dependencies() {
    let graph = DependencyGraph::from_plugins(&[plugin("a", &["b", "host-only"]), plugin("b", &[])]);
    assert_eq!(graph.dependencies_of("a"), set(&["b"]));
    assert!(graph.dependents_of("host-only").is_empty());
}

#[rstest]
#[case("c", &["a", "b", "d"])]
#[case("b", &["a"])]
#[case("a", &[])]
fn dependents_are_transitive(#[case] name: &str, #[case] expected: &[&str]) {
    // a -> b -> c, d -> c
    let graph = DependencyGraph::from_plugins(&[
        plugin("a", &["b"]),
        plugin("b", &["c"]),
        plugin("c", &[]),
        plugin("d", &["c"]),
    ]);
    assert_eq!(graph.dependents_of(name), set(expected));
}

#[test]
fn unload_order_puts_dependents_first() {
    // a -> b -> c, a -> c, d -> c
    let graph = DependencyGraph::from_plugins(&[
        plugin("a", &["b", "c"]),
        plugin("b", &["c"]),
        plugin("c", &[]),
        plugin("d", &["c"]),
    ]);
    let plan = graph.unload_order("c");

    assert!(plan.cycles.is_empty());
    assert_eq!(plan.order.len(), 4);
    assert_eq!(plan.order.last().map(String::as_str), Some("c"));
    assert!(position(&plan.order, "a") < position(&plan.order, "b"));
    assert!(position(&plan.order, "b") < position(&plan.order, "c"));
    assert!(position(&plan.order, "d") < position(&plan.order, "c"));
}

#[test]
fn unload_order_of_unknown_plugin_is_itself() {
    let graph = DependencyGraph::default();
    assert_eq!(graph.unload_order("lonely").order, vec![String::from("lonely")]);
}

#[test]
fn cycles_are_visited_once_and_reported() {
    // a -> b -> a
    let graph = DependencyGraph::from_plugins(&[plugin("a", &["b"]), plugin("b", &["a"])]);
    let plan = graph.unload_order("a");

    assert_eq!(plan.order, vec![String::from("b"), String::from("a")]);
    assert_eq!(plan.cycles, vec![vec![String::from("a"), String::from("b")]]);
    assert_eq!(graph.dependents_of("a"), set(&["b"]));
}
