// src/dag/graph.rs

use std::collections::{HashMap, HashSet};

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::engine::TaskName;
use crate::errors::{AssetdagError, Result};

/// Internal node structure: stores immediate deps and dependents.
#[derive(Debug, Clone)]
struct DagNode {
    /// Direct dependencies: tasks that must finish before this one can run.
    deps: Vec<TaskName>,
    /// Direct dependents: tasks that depend on this one.
    dependents: Vec<TaskName>,
}

/// In-memory DAG representation keyed by task name.
///
/// Keeps adjacency information for scheduling and diagnostics. Structural
/// checks (unknown references, cycles) live in [`DagGraph::validate`].
#[derive(Debug, Clone)]
pub struct DagGraph {
    nodes: HashMap<TaskName, DagNode>,
    /// Task names in the order they were added.
    order: Vec<TaskName>,
}

impl DagGraph {
    /// Build a DAG from `(name, deps)` pairs.
    ///
    /// Dependencies that are not themselves nodes are kept in `deps` so that
    /// [`validate`](Self::validate) can report them.
    pub fn from_specs<'a, I>(specs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a [TaskName])>,
    {
        let mut nodes: HashMap<TaskName, DagNode> = HashMap::new();
        let mut order = Vec::new();

        for (name, deps) in specs {
            order.push(name.to_string());
            nodes.insert(
                name.to_string(),
                DagNode {
                    deps: deps.to_vec(),
                    dependents: Vec::new(),
                },
            );
        }

        for task_name in order.iter() {
            let deps = nodes
                .get(task_name)
                .map(|n| n.deps.clone())
                .unwrap_or_default();

            for dep in deps {
                if let Some(dep_node) = nodes.get_mut(&dep) {
                    dep_node.dependents.push(task_name.clone());
                }
            }
        }

        Self { nodes, order }
    }

    /// Return all task names in insertion order.
    pub fn tasks(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(|s| s.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// Immediate dependencies of a task (the tasks listed in its `after`).
    pub fn dependencies_of(&self, name: &str) -> &[TaskName] {
        self.nodes
            .get(name)
            .map(|n| n.deps.as_slice())
            .unwrap_or(&[])
    }

    /// Immediate dependents of a task (tasks that list this one in their `after`).
    pub fn dependents_of(&self, name: &str) -> &[TaskName] {
        self.nodes
            .get(name)
            .map(|n| n.dependents.as_slice())
            .unwrap_or(&[])
    }

    /// Check for unknown dependency references and cycles.
    pub fn validate(&self) -> Result<()> {
        for name in self.order.iter() {
            for dep in self.dependencies_of(name) {
                if !self.nodes.contains_key(dep) {
                    return Err(AssetdagError::UnknownTask {
                        task: dep.clone(),
                        required_by: Some(name.clone()),
                    });
                }
            }
        }
        self.topological_order().map(|_| ())
    }

    /// All tasks in dependency order (dependencies first).
    ///
    /// Edge direction: dep -> task. For `B.after = ["A"]` we add `A -> B`.
    pub fn topological_order(&self) -> Result<Vec<TaskName>> {
        let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

        for name in self.order.iter() {
            graph.add_node(name.as_str());
        }
        for name in self.order.iter() {
            for dep in self.dependencies_of(name) {
                if self.nodes.contains_key(dep) {
                    graph.add_edge(dep.as_str(), name.as_str(), ());
                }
            }
        }

        // A topological sort will fail if there is a cycle. Self-edges count.
        match toposort(&graph, None) {
            Ok(order) => Ok(order.into_iter().map(str::to_string).collect()),
            Err(cycle) => Err(AssetdagError::CyclicDependency(
                cycle.node_id().to_string(),
            )),
        }
    }

    /// Execution plan for `target`: `target` and its transitive dependencies,
    /// dependencies first, each listed once.
    pub fn plan_for(&self, target: &str) -> Result<Vec<TaskName>> {
        if !self.nodes.contains_key(target) {
            return Err(AssetdagError::UnknownTask {
                task: target.to_string(),
                required_by: None,
            });
        }

        let closure = self.closure_of(std::iter::once(target))?;
        let order = self.topological_order()?;
        Ok(order.into_iter().filter(|t| closure.contains(t)).collect())
    }

    /// Transitive dependency closure of `roots` (roots included).
    ///
    /// Fails with `UnknownTask` when a reachable dependency is not a node.
    pub fn closure_of<'a>(
        &self,
        roots: impl IntoIterator<Item = &'a str>,
    ) -> Result<HashSet<TaskName>> {
        let mut seen = HashSet::new();
        let mut stack: Vec<(TaskName, Option<TaskName>)> =
            roots.into_iter().map(|r| (r.to_string(), None)).collect();

        while let Some((name, parent)) = stack.pop() {
            if !self.nodes.contains_key(&name) {
                return Err(AssetdagError::UnknownTask {
                    task: name,
                    required_by: parent,
                });
            }
            if !seen.insert(name.clone()) {
                continue;
            }
            for dep in self.dependencies_of(&name) {
                stack.push((dep.clone(), Some(name.clone())));
            }
        }

        Ok(seen)
    }
}
