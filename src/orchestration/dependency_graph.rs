//! Start-order computation for registered services.
//!
//! Depth-first traversal with three-colour marking: a grey node reached again
//! closes a cycle, which is reported as the path from that node back to itself.
//! Dependencies on names that were never registered do not take part in the
//! ordering.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    White,
    Grey,
    Black,
}

/// Directed graph of service names to the names they depend on
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// Registration order, used to make traversal deterministic
    nodes: Vec<String>,
    edges: HashMap<String, Vec<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a node and its dependency list
    pub fn add_node(&mut self, name: impl Into<String>, dependencies: impl IntoIterator<Item = impl Into<String>>) {
        let name = name.into();
        if !self.edges.contains_key(&name) {
            self.nodes.push(name.clone());
        }
        self.edges
            .insert(name, dependencies.into_iter().map(Into::into).collect());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.edges.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn dependencies_of(&self, name: &str) -> &[String] {
        self.edges.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    /// `(service, dependency)` pairs naming unregistered dependencies
    pub fn unknown_dependencies(&self) -> Vec<(String, String)> {
        self.nodes
            .iter()
            .flat_map(|name| {
                self.dependencies_of(name)
                    .iter()
                    .filter(|dependency| !self.contains(dependency))
                    .map(move |dependency| (name.clone(), dependency.clone()))
            })
            .collect()
    }

    /// First cycle found, e.g. `["a", "b", "a"]`
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        self.topological_order().err()
    }

    /// Order in which every dependency precedes its dependents.
    ///
    /// Each node is visited once. Fails with the offending cycle.
    pub fn topological_order(&self) -> Result<Vec<String>, Vec<String>> {
        let mut marks: HashMap<&str, Mark> = self
            .nodes
            .iter()
            .map(|name| (name.as_str(), Mark::White))
            .collect();
        let mut path = Vec::new();
        let mut order = Vec::with_capacity(self.nodes.len());

        for name in &self.nodes {
            if marks.get(name.as_str()) == Some(&Mark::White) {
                self.visit(name, &mut marks, &mut path, &mut order)?;
            }
        }
        Ok(order)
    }

    fn visit<'a>(
        &'a self,
        name: &'a str,
        marks: &mut HashMap<&'a str, Mark>,
        path: &mut Vec<&'a str>,
        order: &mut Vec<String>,
    ) -> Result<(), Vec<String>> {
        marks.insert(name, Mark::Grey);
        path.push(name);

        for dependency in self.dependencies_of(name) {
            match marks.get(dependency.as_str()) {
                Some(Mark::White) => self.visit(dependency, marks, path, order)?,
                Some(Mark::Grey) => {
                    let start = path
                        .iter()
                        .position(|node| *node == dependency.as_str())
                        .unwrap_or(0);
                    let mut cycle: Vec<String> = path[start..].iter().map(|node| node.to_string()).collect();
                    cycle.push(dependency.clone());
                    return Err(cycle);
                }
                // Finished, or not registered
                Some(Mark::Black) | None => {}
            }
        }

        path.pop();
        marks.insert(name, Mark::Black);
        order.push(name.to_string());
        Ok(())
    }
}
