//! End-to-end pipeline tests against stand-in engine executables, so
//! they run without a Wolfram installation.

#![cfg(unix)]

use std::{
    os::unix::fs::PermissionsExt,
    path::PathBuf,
    time::{Duration, Instant},
};

use anyhow::Result;
use serde_json::{json, Map, Value};
use tempfile::TempDir;
use wolfram_bridge::{
    bridge::Bridge,
    engine::EngineMode,
    error::ErrorKind,
    tools::{Tool, ToolRequest},
};

/// Write an executable shell script standing in for wolframscript.
/// Invoked as `<script> -c <code>`, so `$2` is the generated program.
fn fake_engine(dir: &TempDir, body: &str) -> PathBuf {
    let path = dir.path().join("wolframscript");
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

fn request(tool: Tool, pairs: &[(&str, Value)]) -> ToolRequest {
    let args: Map<String, Value> =
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect();
    ToolRequest::new(tool, args)
}

#[tokio::test]
async fn calculate_returns_normalized_engine_output() -> Result<()> {
    let dir = TempDir::new()?;
    let bridge = Bridge::new(fake_engine(&dir, r#"echo "4""#), EngineMode::Script);

    let out = bridge
        .dispatch(request(Tool::Calculate, &[("expression", json!("2 + 2"))]))
        .await?;
    assert_eq!(out.text, "4");
    assert_eq!(out.raw, "4\n");
    Ok(())
}

#[tokio::test]
async fn engine_receives_the_generated_program_as_argv() -> Result<()> {
    let dir = TempDir::new()?;
    // Echo the program back so the test observes exactly what was passed.
    let bridge = Bridge::new(fake_engine(&dir, r#"printf '%s\n' "$2""#), EngineMode::Script);

    let out = bridge
        .dispatch(request(
            Tool::Solve,
            &[("equation", json!("x^2 - 5x + 6 == 0")), ("variable", json!("x"))],
        ))
        .await?;
    assert_eq!(out.text, "Solve[x^2 - 5x + 6 == 0, x]");

    let out = bridge
        .dispatch(request(
            Tool::Statistics,
            &[("data", json!([1, 2, 3, 4, 5])), ("operation", json!("Mean"))],
        ))
        .await?;
    assert_eq!(out.text, "Mean[{1, 2, 3, 4, 5}]");
    Ok(())
}

#[tokio::test]
async fn long_running_engine_times_out_within_a_bounded_margin() -> Result<()> {
    let dir = TempDir::new()?;
    let bridge = Bridge::new(fake_engine(&dir, "sleep 30"), EngineMode::Script);

    let started = Instant::now();
    let err = bridge
        .dispatch(
            request(Tool::Execute, &[("code", json!("While[True, Null]"))])
                .with_timeout(Duration::from_secs(1)),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert!(
        started.elapsed() < Duration::from_secs(5),
        "bridge did not return promptly after the timeout"
    );
    Ok(())
}

#[tokio::test]
async fn nonzero_exit_surfaces_stderr_diagnostic() -> Result<()> {
    let dir = TempDir::new()?;
    let bridge =
        Bridge::new(fake_engine(&dir, r#"echo "kernel crashed" >&2; exit 3"#), EngineMode::Script);

    let err = bridge
        .dispatch(request(Tool::Calculate, &[("expression", json!("1"))]))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EngineExecutionError);
    assert!(err.to_string().contains("kernel crashed"));
    Ok(())
}

#[tokio::test]
async fn error_marker_on_clean_exit_is_engine_reported() -> Result<()> {
    let dir = TempDir::new()?;
    let script = r#"echo "Syntax::sntxi: Incomplete expression; more input is needed.""#;
    let bridge = Bridge::new(fake_engine(&dir, script), EngineMode::Script);

    let err = bridge
        .dispatch(request(Tool::Calculate, &[("expression", json!("Sin[x]"))]))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EngineReportedError);
    assert!(err.to_string().contains("Syntax::sntxi"));
    Ok(())
}

#[tokio::test]
async fn blank_output_on_clean_exit_is_empty_result() -> Result<()> {
    let dir = TempDir::new()?;
    let bridge = Bridge::new(fake_engine(&dir, "exit 0"), EngineMode::Script);

    let err = bridge
        .dispatch(request(Tool::Calculate, &[("expression", json!("1"))]))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EmptyResult);
    Ok(())
}

#[tokio::test]
async fn missing_executable_is_reported_as_such() -> Result<()> {
    let bridge = Bridge::new("/nonexistent/path/wolframscript", EngineMode::Script);

    let err = bridge.test_connection().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ExecutableNotFound);
    assert!(err.to_string().contains("/nonexistent/path/wolframscript"));
    Ok(())
}

#[tokio::test]
async fn probe_succeeds_against_a_responsive_engine() -> Result<()> {
    let dir = TempDir::new()?;
    let bridge = Bridge::new(
        fake_engine(&dir, r#"echo "{Version -> 14.0, Test -> 4}""#),
        EngineMode::Script,
    );

    let out = bridge.test_connection().await?;
    assert!(out.text.contains("Test -> 4"));
    Ok(())
}

#[tokio::test]
async fn missing_argument_fails_before_any_spawn() -> Result<()> {
    // A nonexistent executable: if the bridge tried to spawn, the kind
    // would be ExecutableNotFound instead of MissingArgument.
    let bridge = Bridge::new("/nonexistent/path/wolframscript", EngineMode::Script);

    let err = bridge
        .dispatch(request(Tool::Solve, &[("equation", json!("x == 1"))]))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MissingArgument);
    Ok(())
}

#[tokio::test]
async fn unbalanced_expression_fails_before_any_spawn() -> Result<()> {
    let bridge = Bridge::new("/nonexistent/path/wolframscript", EngineMode::Script);

    let err = bridge
        .dispatch(request(Tool::Calculate, &[("expression", json!("Sin[x"))]))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BuildError);
    Ok(())
}

#[tokio::test]
async fn identical_concurrent_requests_do_not_interfere() -> Result<()> {
    let dir = TempDir::new()?;
    let bridge = Bridge::new(fake_engine(&dir, r#"echo "4""#), EngineMode::Script);

    let req = || request(Tool::Calculate, &[("expression", json!("2 + 2"))]);
    let (a, b) = tokio::join!(bridge.dispatch(req()), bridge.dispatch(req()));
    assert_eq!(a?.text, "4");
    assert_eq!(b?.text, "4");
    Ok(())
}

#[tokio::test]
async fn concurrency_is_capped_but_not_deadlocked() -> Result<()> {
    let dir = TempDir::new()?;
    // Each invocation sleeps briefly; with one permit they serialize.
    let bridge = Bridge::new(fake_engine(&dir, r#"sleep 0.2; echo "4""#), EngineMode::Script)
        .with_max_concurrent(1);

    let req = || request(Tool::Calculate, &[("expression", json!("2 + 2"))]);
    let started = Instant::now();
    let (a, b) = tokio::join!(bridge.dispatch(req()), bridge.dispatch(req()));
    assert_eq!(a?.text, "4");
    assert_eq!(b?.text, "4");
    assert!(started.elapsed() >= Duration::from_millis(350));
    Ok(())
}

#[tokio::test]
async fn kernel_mode_uses_run_invocation() -> Result<()> {
    let dir = TempDir::new()?;
    // Kernel mode passes `-noprompt -run <code>`, so the program is $3.
    let bridge = Bridge::new(fake_engine(&dir, r#"printf '%s\n' "$3""#), EngineMode::Kernel);

    let out = bridge
        .dispatch(request(Tool::Factor, &[("expression", json!("x^2 - 5x + 6"))]))
        .await?;
    assert_eq!(out.text, "Factor[x^2 - 5x + 6]");
    Ok(())
}
