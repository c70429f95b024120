use action_gen::{LogSource, MemorySink, ScriptLauncher};
use std::fs;
use std::sync::Arc;

fn pair(k: &str, v: &str) -> (String, String) {
    (k.to_string(), v.to_string())
}

#[tokio::test]
async fn test_launch_streams_both_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("greet.sh");
    fs::write(&script, "echo \"hello ${1#--who=}\"\necho \"careful\" >&2\n").unwrap();

    let sink = MemorySink::new();
    let launcher = ScriptLauncher::new("sh", Arc::new(sink.clone()));
    let handle = launcher.launch(&script, &[pair("who", "world")]).unwrap();
    assert_eq!(handle.name(), "greet");

    let outcome = handle.wait().await.unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.code, Some(0));
    assert_eq!(sink.lines_from(LogSource::Stdout), vec!["hello world"]);
    assert_eq!(sink.lines_from(LogSource::Stderr), vec!["careful"]);
    assert!(sink.contains("greet finished (exit code 0)"));
}

#[tokio::test]
async fn test_dash_values_stay_attached_to_their_flag() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("args.sh");
    fs::write(&script, "for a in \"$@\"; do printf '%s\\n' \"$a\"; done\n").unwrap();

    let sink = MemorySink::new();
    let launcher = ScriptLauncher::new("sh", Arc::new(sink.clone()));
    let outcome = launcher
        .launch(&script, &[pair("query", "-rust"), pair("limit", "2")])
        .unwrap()
        .wait()
        .await
        .unwrap();
    assert!(outcome.success);
    assert_eq!(
        sink.lines_from(LogSource::Stdout),
        vec!["--query=-rust", "--limit=2"]
    );
}

#[tokio::test]
async fn test_launch_reports_failure_exit() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("fail.sh");
    fs::write(&script, "exit 3\n").unwrap();

    let launcher = ScriptLauncher::new("sh", Arc::new(MemorySink::new()));
    let outcome = launcher.launch(&script, &[]).unwrap().wait().await.unwrap();
    assert!(!outcome.success);
    assert_eq!(outcome.code, Some(3));
}

#[tokio::test]
async fn test_detached_run_completes() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("quick.sh");
    fs::write(&script, "echo done\n").unwrap();

    let sink = MemorySink::new();
    let launcher = ScriptLauncher::new("sh", Arc::new(sink.clone()));
    let join = launcher.launch(&script, &[]).unwrap().detach();
    let outcome = join.await.unwrap().unwrap();
    assert!(outcome.success);
    assert_eq!(sink.lines_from(LogSource::Stdout), vec!["done"]);
}

#[tokio::test]
async fn test_launch_errors() {
    let dir = tempfile::tempdir().unwrap();
    let launcher = ScriptLauncher::new("sh", Arc::new(MemorySink::new()));
    let err = launcher
        .launch(&dir.path().join("missing.sh"), &[])
        .unwrap_err();
    assert_eq!(err.error_code(), "SCRIPT_LAUNCH_ERROR");

    let script = dir.path().join("present.sh");
    fs::write(&script, "echo hi\n").unwrap();
    let launcher = ScriptLauncher::new(
        "definitely-not-an-interpreter-on-path",
        Arc::new(MemorySink::new()),
    );
    let err = launcher.launch(&script, &[]).unwrap_err();
    assert_eq!(err.error_code(), "SCRIPT_LAUNCH_ERROR");
}
