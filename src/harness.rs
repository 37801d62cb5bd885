//! Generic self-describing pipeline stage
//!
//! `pump-harness -i<N> [-o<M>] -c<name> [-- <program> <args>...]` reads
//! `<name>_0.in` .. `<name>_{N-1}.in` and writes its output files in the
//! current directory. With `--description` it only prints the
//! self-description a workflow loader expects.

use crate::description::{NodeDescription, DESCRIPTION_FLAG};
use crate::error::{PumpError, Result};
use clap::Parser;
use std::path::Path;
use tokio::fs;
use tokio::process::Command;
use tracing::{debug, info};

#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(name = "pump-harness")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Self-describing pipeline stage for pump", long_about = None)]
pub struct HarnessArgs {
    /// Number of input files
    #[arg(short = 'i', default_value_t = 0)]
    pub inputs: usize,

    /// Number of output files
    #[arg(short = 'o', default_value_t = 1)]
    pub outputs: usize,

    /// Command name; file names derive from it
    #[arg(short = 'c')]
    pub name: Option<String>,

    /// Print the self-description and exit
    #[arg(long = "description")]
    pub describe: bool,

    /// Program run on the input and output files instead of concatenating
    #[arg(last = true)]
    pub wrapped: Vec<String>,
}

impl HarnessArgs {
    /// Parsed arguments with a trailing `--description` lifted out of the
    /// wrapped command line, where the loader's query appends it.
    pub fn normalized(mut self) -> Self {
        if self.wrapped.last().map(String::as_str) == Some(DESCRIPTION_FLAG) {
            self.wrapped.pop();
            self.describe = true;
        }
        self
    }

    /// Command name, falling back to the file stem of `program`
    pub fn command_name(&self, program: &str) -> String {
        self.name.clone().unwrap_or_else(|| {
            Path::new(program)
                .file_stem()
                .and_then(|stem| stem.to_str())
                .unwrap_or("harness")
                .to_string()
        })
    }

    /// Self-description of this stage when started as `program`
    pub fn description(&self, program: &str) -> NodeDescription {
        let name = self.command_name(program);

        let mut command = program.to_string();
        if self.outputs != 1 {
            command.push_str(&format!(" -o{}", self.outputs));
        }
        command.push_str(&format!(" -i{} -c{}", self.inputs, name));
        if !self.wrapped.is_empty() {
            command.push_str(" -- ");
            command.push_str(&self.wrapped.join(" "));
        }

        NodeDescription::conventional(&name, &command, self.inputs, self.outputs)
    }

    /// Do the stage's work inside `workdir`
    pub async fn run(&self, program: &str, workdir: &Path) -> Result<()> {
        let description = self.description(program);

        match self.wrapped.split_first() {
            Some((wrapped, args)) => run_wrapped(wrapped, args, &description, workdir).await,
            None => concatenate(&description, workdir).await,
        }
    }
}

/// Concatenate every input, in port order, into every output
async fn concatenate(description: &NodeDescription, workdir: &Path) -> Result<()> {
    let mut content = Vec::new();
    for input in &description.inputs {
        let data = fs::read(workdir.join(input)).await?;
        debug!("Read {} bytes from '{}'", data.len(), input);
        content.extend_from_slice(&data);
    }

    for output in &description.outputs {
        fs::write(workdir.join(output), &content).await?;
        info!("Wrote {} bytes to '{}'", content.len(), output);
    }

    Ok(())
}

/// Run `program args... <inputs...> <outputs...>`
async fn run_wrapped(
    program: &str,
    args: &[String],
    description: &NodeDescription,
    workdir: &Path,
) -> Result<()> {
    info!("Running wrapped program '{}'", program);

    let status = Command::new(program)
        .args(args)
        .args(&description.inputs)
        .args(&description.outputs)
        .current_dir(workdir)
        .kill_on_drop(true)
        .status()
        .await?;

    if !status.success() {
        return Err(PumpError::NodeFailed {
            node: description.name.clone(),
            exit_code: status.code(),
        });
    }

    Ok(())
}
