//! CLI interface for pump

use crate::config::PumpConfig;
use crate::driver::ExecutionDriver;
use crate::executors::process::ProcessRunner;
use crate::executors::NodeRunner;
use crate::graph::Pump;
use crate::loader::WorkflowLoader;
use crate::logging::{init_logging, LogConfig, LogFormat, LogLevel};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

/// pump - dataflow pipeline executor for self-describing commands
#[derive(Parser, Debug)]
#[command(name = "pump")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run pipelines of self-describing commands that exchange files", long_about = None)]
pub struct Cli {
    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,

    /// Log format
    #[arg(long, value_enum, default_value_t = LogFormat::Json, global = true)]
    pub log_format: LogFormat,

    /// Configuration file (YAML, TOML or JSON)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Working directory nodes run in (overrides the configuration)
    #[arg(long, global = true)]
    pub workdir: Option<PathBuf>,

    /// Nodes allowed to run at once (overrides the configuration)
    #[arg(long, global = true)]
    pub max_parallel: Option<usize>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load, schedule and execute a workflow
    Run {
        /// Path to the workflow file
        workflow: PathBuf,

        /// Print the run report as JSON on stdout
        #[arg(long)]
        report: bool,
    },

    /// Load and schedule a workflow without executing it
    Validate {
        /// Path to the workflow file
        workflow: PathBuf,
    },
}

impl Cli {
    pub fn init_logging(&self) -> anyhow::Result<()> {
        let config = LogConfig {
            level: LogLevel::from(self.log_level.as_str()),
            format: self.log_format,
            ..Default::default()
        };

        init_logging(&config)
    }

    /// Layered configuration with command-line overrides applied
    pub fn resolve_config(&self) -> anyhow::Result<PumpConfig> {
        let mut config = PumpConfig::load(self.config.as_deref())?;

        if let Some(workdir) = &self.workdir {
            config.workdir = workdir.clone();
        }
        if let Some(max_parallel) = self.max_parallel {
            config.max_parallel = max_parallel;
        }

        config.validate()?;
        Ok(config)
    }

    pub async fn execute(&self) -> anyhow::Result<()> {
        let config = self.resolve_config()?;

        match &self.command {
            Commands::Run { workflow, report } => {
                self.run_workflow(&config, workflow, *report).await?;
            }
            Commands::Validate { workflow } => {
                self.validate_workflow(&config, workflow).await?;
            }
        }
        Ok(())
    }

    fn runner(config: &PumpConfig) -> Arc<dyn NodeRunner> {
        Arc::new(
            ProcessRunner::new(&config.workdir)
                .with_description_timeout(config.description_timeout())
                .with_node_timeout(config.node_timeout()),
        )
    }

    async fn load(config: &PumpConfig, workflow: &Path) -> anyhow::Result<Pump> {
        let loader = WorkflowLoader::new(Self::runner(config));
        Ok(loader.load_file(workflow).await?)
    }

    async fn run_workflow(
        &self,
        config: &PumpConfig,
        workflow: &Path,
        report: bool,
    ) -> anyhow::Result<()> {
        let mut pump = Self::load(config, workflow).await?;

        let driver = ExecutionDriver::new(Self::runner(config), &config.workdir)
            .with_max_parallel(config.max_parallel);

        match driver.run(&mut pump).await {
            Ok(run_report) => {
                info!("Workflow {:?} completed successfully", workflow);
                if report {
                    println!("{}", serde_json::to_string_pretty(&run_report)?);
                }
                Ok(())
            }
            Err(e) => {
                error!("Workflow {:?} failed ({:?} error)", workflow, e.kind());
                for node in pump.nodes() {
                    info!("Node '{}': {}", node.id(), node.status());
                }
                Err(e.into())
            }
        }
    }

    async fn validate_workflow(&self, config: &PumpConfig, workflow: &Path) -> anyhow::Result<()> {
        info!("Validating workflow: {:?}", workflow);
        let pump = Self::load(config, workflow).await?;

        println!("Workflow {:?} is valid", workflow);
        println!("Nodes: {}", pump.nodes().len());
        for node in pump.nodes() {
            println!(
                "  {} ({}): {} inputs, {} outputs",
                node.id(),
                node.command(),
                node.input_arity(),
                node.output_arity()
            );
        }
        println!("Edge order:");
        for edge in pump.edges() {
            println!("  {}", pump.describe_edge(edge));
        }

        Ok(())
    }
}
