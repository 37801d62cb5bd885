//! End-to-end pipeline tests
//!
//! Real processes only: every node is the `pump-harness` binary, loaded
//! through its self-description and executed in a temporary directory.

use pump::driver::ExecutionDriver;
use pump::error::{ErrorKind, PumpError};
use pump::executors::process::ProcessRunner;
use pump::executors::NodeRunner;
use pump::loader::WorkflowLoader;
use pump::models::NodeStatus;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::process::Command;
use std::sync::Arc;
use tempfile::TempDir;

const HARNESS: &str = env!("CARGO_BIN_EXE_pump-harness");
const PUMP: &str = env!("CARGO_BIN_EXE_pump");

/// Working directory holding a `seed.sh` that writes "42" to its argument
fn setup_workdir() -> TempDir {
    let dir = TempDir::new().unwrap();
    let seed = dir.path().join("seed.sh");
    std::fs::write(&seed, "#!/bin/sh\necho 42 > \"$1\"\n").unwrap();
    std::fs::set_permissions(&seed, std::fs::Permissions::from_mode(0o755)).unwrap();
    dir
}

fn runner(dir: &Path) -> Arc<dyn NodeRunner> {
    Arc::new(ProcessRunner::new(dir))
}

/// gen fans out into both ports of sum
fn gen_sum_workflow(dir: &Path) -> String {
    format!(
        "# seed a number and sum it with itself\n\
         a: {harness} -cgen -- {seed}\n\
         b: {harness} -i2 -csum\n\
         \n\
         a.out.0 -> b.in.0\n\
         a.out.0 -> b.in.1\n",
        harness = HARNESS,
        seed = dir.join("seed.sh").display()
    )
}

#[tokio::test]
async fn test_gen_sum_pipeline() {
    let dir = setup_workdir();
    let loader = WorkflowLoader::new(runner(dir.path()));

    let mut pump = loader
        .load_str(&gen_sum_workflow(dir.path()))
        .await
        .unwrap();
    assert_eq!(pump.get("a").unwrap().command(), "gen");
    assert_eq!(pump.get("b").unwrap().input_arity(), 2);

    let driver = ExecutionDriver::new(runner(dir.path()), dir.path());
    let report = driver.run(&mut pump).await.unwrap();

    assert_eq!(report.executed, vec!["a", "b"]);
    assert_eq!(report.routed_edges, 2);
    assert!(!dir.path().join("gen.out").exists());
    assert_eq!(
        std::fs::read_to_string(dir.path().join("sum.out")).unwrap(),
        "42\n42\n"
    );
    assert!(pump.nodes().iter().all(|n| n.status() == NodeStatus::Success));
}

#[tokio::test]
async fn test_concurrent_pipeline() {
    let dir = setup_workdir();
    let workflow = format!(
        "src: {harness} -cgen -- {seed}\n\
         left: {harness} -i1 -cleft\n\
         right: {harness} -i1 -cright\n\
         join: {harness} -i2 -cjoin\n\
         src.out.0 -> left.in.0\n\
         src.out.0 -> right.in.0\n\
         left.out.0 -> join.in.0\n\
         right.out.0 -> join.in.1\n",
        harness = HARNESS,
        seed = dir.path().join("seed.sh").display()
    );

    let loader = WorkflowLoader::new(runner(dir.path()));
    let mut pump = loader.load_str(&workflow).await.unwrap();

    let driver = ExecutionDriver::new(runner(dir.path()), dir.path()).with_max_parallel(4);
    let report = driver.run(&mut pump).await.unwrap();

    assert_eq!(report.executed.first().map(String::as_str), Some("src"));
    assert_eq!(report.executed.last().map(String::as_str), Some("join"));
    assert_eq!(
        std::fs::read_to_string(dir.path().join("join.out")).unwrap(),
        "42\n42\n"
    );
}

#[tokio::test]
async fn test_cycle_rejected_at_load() {
    let dir = setup_workdir();
    let workflow = format!(
        "a: {harness} -i1 -cfirst\n\
         b: {harness} -i1 -csecond\n\
         a.out.0 -> b.in.0\n\
         b.out.0 -> a.in.0\n",
        harness = HARNESS
    );

    let loader = WorkflowLoader::new(runner(dir.path()));
    let err = loader.load_str(&workflow).await.unwrap_err();

    assert!(matches!(err, PumpError::CycleDetected(_)));
    assert_eq!(err.kind(), ErrorKind::Scheduling);
}

#[tokio::test]
async fn test_failing_node_aborts_run() {
    let dir = setup_workdir();
    let workflow = format!(
        "a: {harness} -cbad -- /bin/false\n\
         b: {harness} -i1 -cdown\n\
         a.out.0 -> b.in.0\n",
        harness = HARNESS
    );

    let loader = WorkflowLoader::new(runner(dir.path()));
    let mut pump = loader.load_str(&workflow).await.unwrap();

    let driver = ExecutionDriver::new(runner(dir.path()), dir.path());
    let err = driver.run(&mut pump).await.unwrap_err();

    assert!(matches!(err, PumpError::NodeFailed { ref node, .. } if node == "a"));
    assert_eq!(err.kind(), ErrorKind::Execution);
    assert_eq!(pump.get("a").unwrap().status(), NodeStatus::Failed);
    assert_eq!(pump.get("b").unwrap().status(), NodeStatus::Skipped);
}

#[test]
fn test_harness_description_output() {
    let output = Command::new(HARNESS)
        .args(["-i2", "-csum", "--description"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert_eq!(
        stdout,
        format!(
            "name: sum\ncommand: {} -i2 -csum\ninput: sum_0.in\ninput: sum_1.in\noutput: sum.out\n",
            HARNESS
        )
    );
}

#[test]
fn test_cli_run_prints_report() {
    let dir = setup_workdir();
    let workflow = dir.path().join("pipeline.workflow");
    std::fs::write(&workflow, gen_sum_workflow(dir.path())).unwrap();

    let output = Command::new(PUMP)
        .arg("--workdir")
        .arg(dir.path())
        .args(["--log-level", "error", "run", "--report"])
        .arg(&workflow)
        .output()
        .unwrap();

    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["executed"], serde_json::json!(["a", "b"]));
    assert_eq!(report["routed_edges"], 2);
}

#[test]
fn test_cli_validate_rejects_unknown_node() {
    let dir = setup_workdir();
    let workflow = dir.path().join("broken.workflow");
    std::fs::write(
        &workflow,
        format!("a: {} -cgen\na.out.0 -> missing.in.0\n", HARNESS),
    )
    .unwrap();

    let output = Command::new(PUMP)
        .arg("--workdir")
        .arg(dir.path())
        .arg("validate")
        .arg(&workflow)
        .output()
        .unwrap();

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("missing"));
}
