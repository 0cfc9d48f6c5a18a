// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 promptflow contributors

//! Task dependency graph
//!
//! Nodes are tasks; an edge `a -> b` means task `b` reads the parameter
//! task `a` produces (as a template dependency or as a joker). Parameters
//! nobody produces contribute no edge; resolving them is the validator's
//! concern.

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{depth_first_search, Control, DfsEvent};
use std::collections::HashMap;

use crate::errors::LogicError;
use crate::pipeline::Pipeline;

/// Builder for task dependency DAGs
pub struct DagBuilder {
    /// Node weight is the task's index in `Pipeline::tasks`
    graph: DiGraph<usize, String>,
    name_to_index: HashMap<String, NodeIndex>,
    index_to_name: HashMap<NodeIndex, String>,
}

impl DagBuilder {
    /// Create an empty DAG builder
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            name_to_index: HashMap::new(),
            index_to_name: HashMap::new(),
        }
    }

    /// Build the task graph of a pipeline
    ///
    /// Building never fails; call [`DagBuilder::find_cycle`] or
    /// [`DagBuilder::topological_order`] to check acyclicity.
    pub fn build(pipeline: &Pipeline) -> Self {
        let mut builder = Self::new();

        for (idx, task) in pipeline.tasks.iter().enumerate() {
            let node = builder.graph.add_node(idx);
            // Duplicate names are reported by the validator; keep the first
            builder.name_to_index.entry(task.name.clone()).or_insert(node);
            builder.index_to_name.insert(node, task.name.clone());
        }

        let producers: HashMap<&str, NodeIndex> = pipeline
            .tasks
            .iter()
            .enumerate()
            .map(|(idx, task)| (task.resulting_parameter_name.as_str(), NodeIndex::new(idx)))
            .collect();

        for (idx, task) in pipeline.tasks.iter().enumerate() {
            let consumer = NodeIndex::new(idx);
            for parameter in task.required_parameter_names() {
                if let Some(&producer) = producers.get(parameter) {
                    if !builder.graph.contains_edge(producer, consumer) {
                        builder.graph.add_edge(producer, consumer, parameter.to_string());
                    }
                }
            }
        }

        builder
    }

    /// Find one cycle, returned as task names in dependency order
    ///
    /// Depth-first search keeps the current path; the first back edge
    /// closes a cycle consisting of the path from its target to its source.
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        let mut path: Vec<NodeIndex> = Vec::new();

        let result = depth_first_search(&self.graph, self.graph.node_indices(), |event| {
            match event {
                DfsEvent::Discover(node, _) => path.push(node),
                DfsEvent::Finish(_, _) => {
                    path.pop();
                }
                DfsEvent::BackEdge(from, to) => {
                    let start = path.iter().position(|n| *n == to).unwrap_or(0);
                    let mut cycle: Vec<String> = path[start..]
                        .iter()
                        .map(|n| self.index_to_name[n].clone())
                        .collect();
                    if path.last() != Some(&from) {
                        cycle.push(self.index_to_name[&from].clone());
                    }
                    return Control::Break(cycle);
                }
                _ => {}
            }
            Control::Continue
        });

        result.break_value()
    }

    fn cycle_error(&self) -> LogicError {
        LogicError::CircularDependencies {
            tasks: self.find_cycle().unwrap_or_default(),
        }
    }

    /// Get topologically sorted task indices
    pub fn topological_order(&self) -> Result<Vec<usize>, LogicError> {
        toposort(&self.graph, None)
            .map(|nodes| nodes.into_iter().map(|n| self.graph[n]).collect())
            .map_err(|_| self.cycle_error())
    }

    /// Get topologically sorted task names
    pub fn topological_order_names(&self) -> Result<Vec<String>, LogicError> {
        toposort(&self.graph, None)
            .map(|nodes| {
                nodes
                    .into_iter()
                    .map(|n| self.index_to_name[&n].clone())
                    .collect()
            })
            .map_err(|_| self.cycle_error())
    }

    /// Tasks that must finish before the given task
    pub fn dependencies(&self, task_name: &str) -> Option<Vec<String>> {
        let node = self.name_to_index.get(task_name)?;
        let mut deps: Vec<String> = self
            .graph
            .neighbors_directed(*node, petgraph::Direction::Incoming)
            .map(|n| self.index_to_name[&n].clone())
            .collect();
        deps.sort();
        Some(deps)
    }

    /// Tasks reading the given task's result
    pub fn dependents(&self, task_name: &str) -> Option<Vec<String>> {
        let node = self.name_to_index.get(task_name)?;
        let mut deps: Vec<String> = self
            .graph
            .neighbors_directed(*node, petgraph::Direction::Outgoing)
            .map(|n| self.index_to_name[&n].clone())
            .collect();
        deps.sort();
        Some(deps)
    }

    /// Graphviz rendering; edges are labelled with the parameter passed
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph pipeline {\n");
        out.push_str("    rankdir=TB;\n");
        out.push_str("    node [shape=box, style=rounded];\n\n");

        for node in self.graph.node_indices() {
            out.push_str(&format!("    \"{}\";\n", self.index_to_name[&node]));
        }

        for edge in self.graph.edge_indices() {
            let Some((from, to)) = self.graph.edge_endpoints(edge) else {
                continue;
            };
            out.push_str(&format!(
                "    \"{}\" -> \"{}\" [label=\"{}\"];\n",
                self.index_to_name[&from], self.index_to_name[&to], self.graph[edge]
            ));
        }

        out.push_str("}\n");
        out
    }

    /// Mermaid flowchart rendering
    pub fn to_mermaid(&self) -> String {
        let mut out = String::from("flowchart TD\n");

        for node in self.graph.node_indices() {
            let name = &self.index_to_name[&node];
            out.push_str(&format!("    t{}[\"{}\"]\n", node.index(), name));
        }

        for edge in self.graph.edge_indices() {
            let Some((from, to)) = self.graph.edge_endpoints(edge) else {
                continue;
            };
            out.push_str(&format!(
                "    t{} -->|{}| t{}\n",
                from.index(),
                self.graph[edge],
                to.index()
            ));
        }

        out
    }

    /// Text rendering of the execution order
    pub fn to_text(&self, pipeline: &Pipeline) -> Result<String, LogicError> {
        let order = self.topological_order()?;
        let mut out = String::new();

        for (i, idx) in order.iter().enumerate() {
            let task = &pipeline.tasks[*idx];
            let deps = self.dependencies(&task.name).unwrap_or_default();

            out.push_str(&format!(
                "{}. {} ({}) -> {{{}}}",
                i + 1,
                task.name,
                task.execution_type,
                task.resulting_parameter_name
            ));

            if !deps.is_empty() {
                out.push_str(&format!(" [depends: {}]", deps.join(", ")));
            }

            out.push('\n');
        }

        Ok(out)
    }
}

impl Default for DagBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{ExecutionType, Parameter, Task};
    use std::collections::BTreeSet;

    fn task(name: &str, reads: &[&str], writes: &str) -> Task {
        Task {
            name: name.into(),
            title: name.into(),
            description: None,
            execution_type: ExecutionType::SimpleTemplate,
            dependent_parameter_names: reads.iter().map(|s| s.to_string()).collect::<BTreeSet<_>>(),
            model_requirements: None,
            content_language: None,
            content: reads.iter().map(|r| format!("{{{}}}", r)).collect(),
            resulting_parameter_name: writes.into(),
            postprocessing: vec![],
            expectations: vec![],
            joker_parameter_names: vec![],
        }
    }

    fn make_test_pipeline(tasks: Vec<Task>) -> Pipeline {
        Pipeline {
            pipeline_url: None,
            title: "test".into(),
            dialect_version: "1.0.0".into(),
            description: None,
            parameters: vec![Parameter::intermediate("x")],
            tasks,
            knowledge: vec![],
        }
    }

    #[test]
    fn test_linear_dag() {
        // Document order is not execution order
        let pipeline = make_test_pipeline(vec![
            task("c", &["b"], "c"),
            task("a", &["x"], "a"),
            task("b", &["a"], "b"),
        ]);

        let dag = DagBuilder::build(&pipeline);
        assert_eq!(dag.topological_order_names().unwrap(), vec!["a", "b", "c"]);
        assert!(dag.find_cycle().is_none());
    }

    #[test]
    fn test_diamond_dag() {
        let pipeline = make_test_pipeline(vec![
            task("a", &["x"], "a"),
            task("b", &["a"], "b"),
            task("c", &["a"], "c"),
            task("d", &["b", "c"], "d"),
        ]);

        let dag = DagBuilder::build(&pipeline);
        let order = dag.topological_order_names().unwrap();

        assert_eq!(order[0], "a");
        assert_eq!(order[3], "d");
        assert_eq!(dag.dependencies("d").unwrap(), vec!["b", "c"]);
        assert_eq!(dag.dependents("a").unwrap(), vec!["b", "c"]);
    }

    #[test]
    fn test_cycle_detection() {
        let pipeline = make_test_pipeline(vec![
            task("start", &["x"], "s"),
            task("a", &["s", "c"], "a"),
            task("b", &["a"], "b"),
            task("c", &["b"], "c"),
        ]);

        let dag = DagBuilder::build(&pipeline);
        let cycle = dag.find_cycle().unwrap();
        assert_eq!(cycle.len(), 3);
        for name in ["a", "b", "c"] {
            assert!(cycle.contains(&name.to_string()));
        }
        assert!(!cycle.contains(&"start".to_string()));

        let result = dag.topological_order();
        assert!(matches!(result, Err(LogicError::CircularDependencies { .. })));
    }

    #[test]
    fn test_self_loop() {
        let pipeline = make_test_pipeline(vec![task("loop", &["out"], "out")]);
        let cycle = DagBuilder::build(&pipeline).find_cycle().unwrap();
        assert_eq!(cycle, vec!["loop"]);
    }

    #[test]
    fn test_jokers_add_edges() {
        let mut second = task("second", &["x"], "y");
        second.joker_parameter_names = vec!["draft".into()];
        let pipeline = make_test_pipeline(vec![second, task("first", &["x"], "draft")]);

        let dag = DagBuilder::build(&pipeline);
        assert_eq!(dag.dependencies("second").unwrap(), vec!["first"]);
        assert!(dag.dependencies("first").unwrap().is_empty());
    }

    #[test]
    fn test_text_output() {
        let pipeline = make_test_pipeline(vec![task("a", &["x"], "a"), task("b", &["a"], "b")]);

        let dag = DagBuilder::build(&pipeline);
        insta::assert_snapshot!(dag.to_text(&pipeline).unwrap().trim_end(), @r###"
        1. a (simple template) -> {a}
        2. b (simple template) -> {b} [depends: a]
        "###);
    }

    #[test]
    fn test_dot_and_mermaid_output() {
        let pipeline = make_test_pipeline(vec![task("a", &["x"], "a"), task("b", &["a"], "b")]);
        let dag = DagBuilder::build(&pipeline);

        let dot = dag.to_dot();
        assert!(dot.starts_with("digraph pipeline {"));
        assert!(dot.contains("\"a\" -> \"b\" [label=\"a\"];"));

        insta::assert_snapshot!(dag.to_mermaid().trim_end(), @r###"
        flowchart TD
            t0["a"]
            t1["b"]
            t0 -->|a| t1
        "###);
    }
}
