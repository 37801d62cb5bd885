use anyhow::Context;
use clap::Parser;
use pump::harness::HarnessArgs;
use pump::logging::{init_logging, LogConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = HarnessArgs::parse().normalized();
    let program = std::env::args()
        .next()
        .unwrap_or_else(|| "pump-harness".to_string());

    if args.describe {
        print!("{}", args.description(&program).render());
        return Ok(());
    }

    init_logging(&LogConfig::harness())?;

    let workdir = std::env::current_dir().context("cannot determine working directory")?;
    args.run(&program, &workdir)
        .await
        .with_context(|| format!("stage '{}' failed", args.command_name(&program)))?;

    Ok(())
}
