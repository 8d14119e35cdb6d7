//! Directed acyclic graph of tasks for workflow structure.
//!
//! The graph is the single source of truth for a workflow's shape. Edges
//! express "must complete before"; cycle checks run on every insertion so a
//! stored graph is always valid.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

use crate::error::{CoreError, Result};

/// Kind of work a node represents
#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Code,
    Review,
    Test,
    Deploy,
    Research,
    Decision,
    Custom,
}

impl Default for NodeKind {
    fn default() -> Self {
        NodeKind::Custom
    }
}

/// A task node in the graph.
///
/// `depends_on` and `dependents` are adjacency lists maintained by
/// [`TaskGraph::add_edge`]; they are never edited directly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphNode {
    pub id: String,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub kind: NodeKind,
    pub required_role: Option<String>,
    #[serde(default)]
    pub priority: i64,
    #[serde(default)]
    pub metadata: Value,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub dependents: Vec<String>,
}

impl GraphNode {
    pub fn new(id: &str, title: &str, description: &str) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            description: description.to_string(),
            kind: NodeKind::Custom,
            required_role: None,
            priority: 0,
            metadata: Value::Null,
            tags: Vec::new(),
            depends_on: Vec::new(),
            dependents: Vec::new(),
        }
    }
}

/// Directed acyclic graph of workflow tasks
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskGraph {
    pub workflow_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub nodes: BTreeMap<String, GraphNode>,
    #[serde(default)]
    pub edges: Vec<(String, String)>,
}

impl TaskGraph {
    pub fn new(workflow_id: &str, name: &str, description: &str) -> Self {
        Self {
            workflow_id: workflow_id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            nodes: BTreeMap::new(),
            edges: Vec::new(),
        }
    }

    /// Add a node. Fails if the id already exists.
    pub fn add_node(&mut self, node: GraphNode) -> Result<()> {
        if self.nodes.contains_key(&node.id) {
            return Err(CoreError::Validation(format!(
                "Node {} already exists in graph",
                node.id
            )));
        }
        self.nodes.insert(node.id.clone(), node);
        Ok(())
    }

    /// Add a dependency edge: `to` depends on `from`.
    ///
    /// Fails if either endpoint is missing or the edge would close a cycle.
    pub fn add_edge(&mut self, from: &str, to: &str) -> Result<()> {
        if !self.nodes.contains_key(from) {
            return Err(CoreError::Validation(format!("Node {from} not found in graph")));
        }
        if !self.nodes.contains_key(to) {
            return Err(CoreError::Validation(format!("Node {to} not found in graph")));
        }
        if self.would_create_cycle(from, to) {
            return Err(CoreError::Validation(format!(
                "Adding edge {from} -> {to} would create a cycle"
            )));
        }

        self.edges.push((from.to_string(), to.to_string()));
        if let Some(node) = self.nodes.get_mut(to) {
            node.depends_on.push(from.to_string());
        }
        if let Some(node) = self.nodes.get_mut(from) {
            node.dependents.push(to.to_string());
        }
        Ok(())
    }

    /// DFS from `to` over dependents: reaching `from` means a cycle
    fn would_create_cycle(&self, from: &str, to: &str) -> bool {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut stack: Vec<&str> = vec![to];

        while let Some(current) = stack.pop() {
            if current == from {
                return true;
            }
            if !visited.insert(current) {
                continue;
            }
            if let Some(node) = self.nodes.get(current) {
                stack.extend(node.dependents.iter().map(String::as_str));
            }
        }
        false
    }

    /// Nodes with no dependencies; they can start immediately
    pub fn entry_points(&self) -> Vec<&GraphNode> {
        self.nodes
            .values()
            .filter(|n| n.depends_on.is_empty())
            .collect()
    }

    /// Nodes not yet completed whose whole dependency set is completed,
    /// sorted by priority descending.
    pub fn ready_nodes(&self, completed: &HashSet<String>) -> Vec<&GraphNode> {
        let mut ready: Vec<&GraphNode> = self
            .nodes
            .values()
            .filter(|n| !completed.contains(&n.id))
            .filter(|n| n.depends_on.iter().all(|d| completed.contains(d)))
            .collect();
        ready.sort_by(|a, b| b.priority.cmp(&a.priority));
        ready
    }

    /// All nodes that transitively depend on `node_id`
    pub fn descendants(&self, node_id: &str) -> HashSet<String> {
        let mut result = HashSet::new();
        let mut stack = vec![node_id.to_string()];

        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.get(&current) {
                for dependent in &node.dependents {
                    if result.insert(dependent.clone()) {
                        stack.push(dependent.clone());
                    }
                }
            }
        }
        result
    }

    /// All nodes `node_id` transitively depends on
    pub fn ancestors(&self, node_id: &str) -> HashSet<String> {
        let mut result = HashSet::new();
        let mut stack = vec![node_id.to_string()];

        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.get(&current) {
                for dependency in &node.depends_on {
                    if result.insert(dependency.clone()) {
                        stack.push(dependency.clone());
                    }
                }
            }
        }
        result
    }

    /// Kahn's algorithm with the ready queue ordered by priority descending.
    ///
    /// Fails if the graph contains a cycle (which add_edge should have
    /// prevented; a mismatch means the serialized form was corrupted).
    pub fn topological_sort(&self) -> Result<Vec<&GraphNode>> {
        let mut in_degree: BTreeMap<&str, usize> = self
            .nodes
            .iter()
            .map(|(id, node)| (id.as_str(), node.depends_on.len()))
            .collect();

        let mut queue: Vec<&str> = in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut result = Vec::with_capacity(self.nodes.len());

        while !queue.is_empty() {
            queue.sort_by(|a, b| {
                let pa = self.nodes[*a].priority;
                let pb = self.nodes[*b].priority;
                pb.cmp(&pa).then_with(|| a.cmp(b))
            });
            let node_id = queue.remove(0);
            let node = &self.nodes[node_id];
            result.push(node);

            for dependent in &node.dependents {
                if let Some(degree) = in_degree.get_mut(dependent.as_str()) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push(dependent.as_str());
                    }
                }
            }
        }

        if result.len() != self.nodes.len() {
            return Err(CoreError::Validation(
                "Graph contains a cycle".to_string(),
            ));
        }
        Ok(result)
    }

    /// Longest dependency chain by node count. Useful for spotting the
    /// bottleneck path; ties are broken arbitrarily.
    pub fn critical_path(&self) -> Result<Vec<String>> {
        if self.nodes.is_empty() {
            return Ok(Vec::new());
        }

        let sorted = self.topological_sort()?;
        let mut max_depth: BTreeMap<&str, usize> = BTreeMap::new();

        for node in &sorted {
            let depth = if node.depends_on.is_empty() {
                1
            } else {
                node.depends_on
                    .iter()
                    .map(|d| max_depth.get(d.as_str()).copied().unwrap_or(0))
                    .max()
                    .unwrap_or(0)
                    + 1
            };
            max_depth.insert(node.id.as_str(), depth);
        }

        let critical_node = max_depth
            .iter()
            .max_by_key(|(_, depth)| **depth)
            .map(|(id, _)| *id)
            .ok_or_else(|| CoreError::Internal("empty depth map".to_string()))?;

        let mut path = vec![critical_node.to_string()];
        let mut current = critical_node;
        while let Some(node) = self.nodes.get(current) {
            if node.depends_on.is_empty() {
                break;
            }
            let next = node
                .depends_on
                .iter()
                .max_by_key(|d| max_depth.get(d.as_str()).copied().unwrap_or(0))
                .map(String::as_str)
                .unwrap_or(current);
            path.push(next.to_string());
            current = next;
        }

        path.reverse();
        Ok(path)
    }

    /// Validate structure: acyclic and all edges reference known nodes
    pub fn validate(&self) -> Result<()> {
        self.topological_sort()?;
        for (from, to) in &self.edges {
            if !self.nodes.contains_key(from) || !self.nodes.contains_key(to) {
                return Err(CoreError::Validation(format!(
                    "Edge {from} -> {to} references an unknown node"
                )));
            }
        }
        Ok(())
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Deserialize from JSON, checking structural validity
    pub fn from_json(json: &str) -> Result<TaskGraph> {
        let graph: TaskGraph = serde_json::from_str(json)?;
        graph.validate()?;
        Ok(graph)
    }

    /// Serialize to a JSON value for storage
    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Deserialize from a stored JSON value
    pub fn from_value(value: &Value) -> Result<TaskGraph> {
        let graph: TaskGraph = serde_json::from_value(value.clone())?;
        graph.validate()?;
        Ok(graph)
    }
}

/// Fluent builder for task graphs
pub struct GraphBuilder {
    graph: TaskGraph,
    error: Option<CoreError>,
    last_id: Option<String>,
}

impl GraphBuilder {
    pub fn new(workflow_id: &str, name: &str, description: &str) -> Self {
        Self {
            graph: TaskGraph::new(workflow_id, name, description),
            error: None,
            last_id: None,
        }
    }

    /// Add a task node with optional dependencies
    pub fn task(mut self, node: GraphNode, depends_on: &[&str]) -> Self {
        if self.error.is_some() {
            return self;
        }
        let id = node.id.clone();
        if let Err(e) = self.graph.add_node(node) {
            self.error = Some(e);
            return self;
        }
        for dep in depends_on {
            if let Err(e) = self.graph.add_edge(dep, &id) {
                self.error = Some(e);
                return self;
            }
        }
        self.last_id = Some(id);
        self
    }

    /// Add a task depending on the previously added one
    pub fn then(self, node: GraphNode) -> Self {
        let prev = self.last_id.clone();
        match prev {
            Some(prev) => self.task(node, &[prev.as_str()]),
            None => self.task(node, &[]),
        }
    }

    /// Add tasks that run in parallel, all sharing the same dependencies
    pub fn parallel(mut self, nodes: Vec<GraphNode>, depends_on: &[&str]) -> Self {
        for node in nodes {
            self = self.task(node, depends_on);
        }
        self
    }

    /// Build and validate the graph
    pub fn build(self) -> Result<TaskGraph> {
        if let Some(e) = self.error {
            return Err(e);
        }
        self.graph.validate()?;
        Ok(self.graph)
    }
}
