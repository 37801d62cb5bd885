//! Workflow loader: workflow text to a scheduled [`Pump`]

use crate::dag::schedule_pump;
use crate::description::NodeDescription;
use crate::error::{PumpError, Result};
use crate::executors::NodeRunner;
use crate::graph::Pump;
use crate::models::Node;
use crate::parser::{parse_workflow, Declaration};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Builds graphs from workflow descriptions, querying every declared
/// command for its self-description through a [`NodeRunner`].
pub struct WorkflowLoader {
    runner: Arc<dyn NodeRunner>,
}

impl WorkflowLoader {
    pub fn new(runner: Arc<dyn NodeRunner>) -> Self {
        Self { runner }
    }

    /// Load and schedule the workflow stored at `path`.
    ///
    /// # Errors
    ///
    /// * `PumpError::WorkflowUnreadable` - If the file cannot be read
    /// * any load or scheduling error of [`WorkflowLoader::load_str`]
    pub async fn load_file<P: AsRef<Path>>(&self, path: P) -> Result<Pump> {
        let path = path.as_ref();
        info!("Loading workflow from: {:?}", path);

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| PumpError::WorkflowUnreadable {
                path: path.to_path_buf(),
                source,
            })?;

        self.load_str(&content).await
    }

    /// Load and schedule a workflow from its text.
    ///
    /// Nodes are described one at a time in declaration order. Edges may
    /// mention nodes declared further down. The returned graph's edges are
    /// already in scheduled order.
    pub async fn load_str(&self, content: &str) -> Result<Pump> {
        let declarations = parse_workflow(content)?;
        let mut pump = Pump::new();
        let mut edges = Vec::new();

        for declaration in declarations {
            match declaration {
                Declaration::Node(decl) => {
                    info!(
                        "Line {} contains node '{}' (command: {})",
                        decl.line, decl.id, decl.command
                    );

                    let response = self.runner.describe(&decl.command).await?;
                    debug!(
                        "Description of '{}' is {} bytes long",
                        decl.command,
                        response.len()
                    );

                    let description = NodeDescription::parse(&decl.command, &response)?;
                    let node = Node::from_description(&decl.id, &decl.command, description)?;
                    info!(
                        "Node '{}' is '{}' with {} inputs and {} outputs",
                        node.id(),
                        node.command(),
                        node.input_arity(),
                        node.output_arity()
                    );
                    pump.add_node(node)?;
                }
                Declaration::Edge { line, edge } => {
                    info!(
                        "Line {} contains edge: {} -> {}",
                        line, edge.source_text, edge.target_text
                    );
                    edges.push(edge);
                }
            }
        }

        for edge in &edges {
            let (source, target) = edge.endpoints()?;
            pump.connect(source, target)?;
        }

        warn_on_file_collisions(&pump);

        pump.sort_edges();
        schedule_pump(&mut pump)?;

        info!(
            "Workflow loaded: {} nodes, {} edges",
            pump.nodes().len(),
            pump.edges().len()
        );
        Ok(pump)
    }
}

/// Nodes share one working directory, so equal file names clobber each other
fn warn_on_file_collisions(pump: &Pump) {
    let mut owners: HashMap<&str, &str> = HashMap::new();
    for node in pump.nodes() {
        for file in node.inputs().iter().chain(node.outputs()) {
            if let Some(other) = owners.insert(file.as_str(), node.id()) {
                if other != node.id() {
                    warn!(
                        "Nodes '{}' and '{}' both use file '{}'",
                        other,
                        node.id(),
                        file
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executors::MockNodeRunner;
    use crate::models::NodeStatus;

    const GEN: &str = "name: gen\ncommand: /opt/harness -i0 -cgen\noutput: gen.out\n";
    const SUM: &str = "name: sum\n\
                       command: /opt/harness -i2 -csum\n\
                       input: sum_0.in\n\
                       input: sum_1.in\n\
                       output: sum.out\n";

    fn runner_with(descriptions: &[(&'static str, &'static str)]) -> Arc<dyn NodeRunner> {
        let mut runner = MockNodeRunner::new();
        for &(command, text) in descriptions {
            runner
                .expect_describe()
                .withf(move |requested| requested == command)
                .times(1)
                .returning(move |_| Ok(text.to_string()));
        }
        Arc::new(runner)
    }

    #[tokio::test]
    async fn test_load_two_node_pipeline() {
        let loader = WorkflowLoader::new(runner_with(&[("gen", GEN), ("sum", SUM)]));
        let text = "a: gen\nb: sum\na.out.0 -> b.in.0\na.out.0 -> b.in.1\n";

        let pump = loader.load_str(text).await.unwrap();

        let b = pump.get("b").unwrap();
        assert_eq!(b.command(), "sum");
        assert_eq!(b.input_arity(), 2);
        assert_eq!(b.output_arity(), 1);
        assert_eq!(b.status(), NodeStatus::Pending);
        assert!(pump.get("a").unwrap().is_source());
        assert!(pump.is_scheduled());
        assert_eq!(pump.edges().len(), 2);
    }

    #[tokio::test]
    async fn test_edges_may_precede_nodes() {
        let loader = WorkflowLoader::new(runner_with(&[("gen", GEN), ("sum", SUM)]));
        let text = "x.out.0 -> y.in.1\n\
                    x.out.0 -> y.in.0\n\
                    # nodes\n\
                    x: gen\n\
                    y: sum\n";

        let pump = loader.load_str(text).await.unwrap();
        let described: Vec<String> = pump.edges().iter().map(|e| pump.describe_edge(e)).collect();
        assert_eq!(described, vec!["x.out.0 -> y.in.1", "x.out.0 -> y.in.0"]);
    }

    #[tokio::test]
    async fn test_unrecognized_line_is_skipped() {
        let loader = WorkflowLoader::new(runner_with(&[("gen", GEN)]));
        let pump = loader.load_str("a: gen\nnot a declaration\n").await.unwrap();
        assert_eq!(pump.nodes().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_description_is_load_error() {
        let loader = WorkflowLoader::new(runner_with(&[("broken", "usage: broken [-h]\n")]));
        let result = loader.load_str("a: broken\n").await;
        assert!(matches!(result, Err(PumpError::Description { .. })));
    }

    #[tokio::test]
    async fn test_description_query_failure_propagates() {
        let mut runner = MockNodeRunner::new();
        runner.expect_describe().returning(|command| {
            Err(PumpError::Description {
                command: command.to_string(),
                reason: "exited with code Some(127)".to_string(),
            })
        });
        let loader = WorkflowLoader::new(Arc::new(runner));

        let result = loader.load_str("a: missing\n").await;
        assert!(matches!(result, Err(PumpError::Description { command, .. }) if command == "missing"));
    }

    #[tokio::test]
    async fn test_edge_errors_are_load_errors() {
        let cases = [
            ("a: gen\nb: sum\na.out.x -> b.in.0\n", "unresolved"),
            ("a: gen\nb: sum\nb.in.0 -> a.out.0\n", "direction"),
            ("a: gen\nb: sum\na.out.0 -> c.in.0\n", "unknown"),
            ("a: gen\nb: sum\na.out.0 -> b.in.5\n", "range"),
        ];

        for (text, case) in cases {
            let loader = WorkflowLoader::new(runner_with(&[("gen", GEN), ("sum", SUM)]));
            let err = loader.load_str(text).await.unwrap_err();
            let matched = match case {
                "unresolved" => matches!(err, PumpError::UnresolvedPort(_)),
                "direction" => matches!(err, PumpError::InvalidEdge { .. }),
                "unknown" => matches!(err, PumpError::UnknownNode(_)),
                _ => matches!(err, PumpError::PortOutOfRange { .. }),
            };
            assert!(matched, "{}: unexpected error {:?}", case, err);
            assert_eq!(err.kind(), crate::error::ErrorKind::Load);
        }
    }

    #[tokio::test]
    async fn test_unreachable_node_rejected() {
        let loader = WorkflowLoader::new(runner_with(&[("gen", GEN), ("sum", SUM)]));
        let result = loader.load_str("a: gen\nb: sum\na.out.0 -> b.in.0\n").await;
        assert!(matches!(result, Err(PumpError::UnreachableNodes(nodes)) if nodes == vec!["b"]));
    }

    #[tokio::test]
    async fn test_duplicate_node_rejected() {
        let mut runner = MockNodeRunner::new();
        runner
            .expect_describe()
            .returning(|_| Ok(GEN.to_string()));
        let loader = WorkflowLoader::new(Arc::new(runner));

        let result = loader.load_str("a: gen\na: gen\n").await;
        assert!(matches!(result, Err(PumpError::DuplicateNode(_))));
    }

    #[tokio::test]
    async fn test_unreadable_file() {
        let loader = WorkflowLoader::new(Arc::new(MockNodeRunner::new()));
        let result = loader.load_file("/nonexistent/simple.workflow").await;
        assert!(matches!(result, Err(PumpError::WorkflowUnreadable { .. })));
    }
}
