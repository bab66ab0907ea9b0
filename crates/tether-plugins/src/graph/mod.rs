//! Dependency edges between installed plugins and unload ordering.
//!
//! The graph is derived from the installed table on demand. Only
//! dependencies that are themselves installed become edges; host-provided,
//! static, and ignored dependencies are not part of the graph.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use tracing::warn;

use crate::info::PluginInfo;

const GRAPH_TARGET: &str = "tether_plugins::graph";

/// Directed edges `dependent -> dependency`, indexed both ways.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    dependencies: BTreeMap<String, BTreeSet<String>>,
    dependents: BTreeMap<String, BTreeSet<String>>,
}

/// The order in which plugins must be unloaded, and any cycles met on the
/// way.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnloadPlan {
    /// Plugins to unload, dependents first, ending with the requested one.
    pub order: Vec<String>,
    /// Dependency cycles detected while ordering. Each node was still
    /// visited exactly once.
    pub cycles: Vec<Vec<String>>,
}

impl DependencyGraph {
    /// Builds the graph for an installed table.
    #[must_use]
    pub fn from_plugins(plugins: &[PluginInfo]) -> Self {
        let installed: BTreeSet<&str> = plugins.iter().map(|p| p.name.as_str()).collect();
        let mut graph = Self::default();
        for plugin in plugins {
            for dependency in plugin.dependencies.keys() {
                if installed.contains(dependency.as_str()) {
                    graph.add_edge(&plugin.name, dependency);
                }
            }
        }
        graph
    }

    /// Records that `dependent` depends on `dependency`.
    pub fn add_edge(&mut self, dependent: &str, dependency: &str) {
        self.dependencies
            .entry(dependent.to_owned())
            .or_default()
            .insert(dependency.to_owned());
        self.dependents
            .entry(dependency.to_owned())
            .or_default()
            .insert(dependent.to_owned());
    }

    /// Returns the plugins `name` depends on directly.
    #[must_use]
    pub fn dependencies_of(&self, name: &str) -> BTreeSet<String> {
        self.dependencies.get(name).cloned().unwrap_or_default()
    }

    /// Returns every plugin that depends on `name`, directly or not.
    ///
    /// `name` itself is never included, even when it sits on a cycle.
    #[must_use]
    pub fn dependents_of(&self, name: &str) -> BTreeSet<String> {
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<&str> = VecDeque::from([name]);
        while let Some(current) = queue.pop_front() {
            for dependent in self.dependents.get(current).into_iter().flatten() {
                if dependent != name && seen.insert(dependent.clone()) {
                    queue.push_back(dependent);
                }
            }
        }
        seen
    }

    /// Orders `name` and its transitive dependents for unloading.
    ///
    /// No plugin appears before any of its own dependents. Cycles are
    /// broken by visiting each plugin once; they are reported in the plan
    /// and logged.
    #[must_use]
    pub fn unload_order(&self, name: &str) -> UnloadPlan {
        let mut walk = Walk {
            graph: self,
            visited: BTreeSet::new(),
            path: Vec::new(),
            plan: UnloadPlan::default(),
        };
        walk.visit(name);
        for cycle in &walk.plan.cycles {
            warn!(
                target: GRAPH_TARGET,
                root = name,
                cycle = %cycle.join(" -> "),
                "dependency cycle detected; unloading each plugin once"
            );
        }
        walk.plan
    }
}

struct Walk<'a> {
    graph: &'a DependencyGraph,
    visited: BTreeSet<String>,
    path: Vec<String>,
    plan: UnloadPlan,
}

impl Walk<'_> {
    fn visit(&mut self, name: &str) {
        self.visited.insert(name.to_owned());
        self.path.push(name.to_owned());
        let dependents = self.graph.dependents.get(name).cloned().unwrap_or_default();
        for dependent in dependents {
            if let Some(start) = self.path.iter().position(|entry| *entry == dependent) {
                self.plan.cycles.push(self.path[start..].to_vec());
            } else if !self.visited.contains(&dependent) {
                self.visit(&dependent);
            }
        }
        self.path.pop();
        self.plan.order.push(name.to_owned());
    }
}

#[cfg(test)]
mod tests;
