use mcp_supervisor::config::{Config, ResolveMode, ServerSpec};
use mcp_supervisor::error::{Error, LaunchError};
use mcp_supervisor::server::ProcessLauncher;
use mcp_supervisor::{HealthStatus, ProcessHandle, Supervisor};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Wait until the process behind `handle` has exited
async fn wait_for_exit(handle: &ProcessHandle) {
    for _ in 0..100 {
        if let Ok(Some(_)) = handle.try_exit_status().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("Process {} did not exit in time", handle.name());
}

fn shell_spec(name: &str, script: &str, log_dir: &Path) -> ServerSpec {
    ServerSpec::new(name, "sh")
        .with_args(["-c", script])
        .with_log_path(log_dir.join(format!("{}.log", name)))
}

#[tokio::test]
async fn test_launch_writes_stdout_and_stderr_to_log() {
    let dir = tempfile::tempdir().unwrap();
    let spec = Arc::new(shell_spec(
        "snowflake",
        "echo started; echo warning >&2",
        dir.path(),
    ));

    let handle = ProcessLauncher::new().launch(Arc::clone(&spec)).unwrap();
    assert_eq!(handle.name(), "snowflake");
    assert!(handle.pid() > 0);
    assert_eq!(handle.log_path(), spec.log_path.as_path());

    wait_for_exit(&handle).await;

    let log = std::fs::read_to_string(&spec.log_path).unwrap();
    assert!(log.contains("started"));
    assert!(log.contains("warning"));
}

#[tokio::test]
async fn test_launch_creates_log_dir_and_truncates_log() {
    let dir = tempfile::tempdir().unwrap();
    let log_dir = dir.path().join("nested").join("logs");

    let spec = Arc::new(shell_spec("foundry", "echo fresh", &log_dir));
    std::fs::create_dir_all(&log_dir).unwrap();
    std::fs::write(&spec.log_path, "stale output from a previous run\n").unwrap();

    let handle = ProcessLauncher::new().launch(Arc::clone(&spec)).unwrap();
    wait_for_exit(&handle).await;

    let log = std::fs::read_to_string(&spec.log_path).unwrap();
    assert!(log.contains("fresh"));
    assert!(!log.contains("stale"));
}

#[tokio::test]
async fn test_launch_creates_missing_log_dir() {
    let dir = tempfile::tempdir().unwrap();
    let log_dir = dir.path().join("does").join("not").join("exist");

    let spec = Arc::new(shell_spec("aip", "true", &log_dir));
    let handle = ProcessLauncher::new().launch(Arc::clone(&spec)).unwrap();
    wait_for_exit(&handle).await;

    assert!(spec.log_path.exists());
}

#[tokio::test]
async fn test_spec_env_overrides_inherited_env() {
    let dir = tempfile::tempdir().unwrap();
    let spec = Arc::new(
        shell_spec("sema4", "echo \"home=$HOME token=$SEMA4_TOKEN\"", dir.path())
            .with_env("HOME", "/srv/sema4")
            .with_env("SEMA4_TOKEN", "abc123"),
    );

    let handle = ProcessLauncher::new().launch(Arc::clone(&spec)).unwrap();
    wait_for_exit(&handle).await;

    let log = std::fs::read_to_string(&spec.log_path).unwrap();
    assert!(log.contains("home=/srv/sema4"));
    assert!(log.contains("token=abc123"));
}

#[tokio::test]
async fn test_cwd_is_applied() {
    let dir = tempfile::tempdir().unwrap();
    let workdir = dir.path().join("work");
    std::fs::create_dir(&workdir).unwrap();

    let spec = Arc::new(shell_spec("github", "pwd", dir.path()).with_cwd(&workdir));
    let handle = ProcessLauncher::new().launch(Arc::clone(&spec)).unwrap();
    wait_for_exit(&handle).await;

    let log = std::fs::read_to_string(&spec.log_path).unwrap();
    let expected = workdir.canonicalize().unwrap();
    assert_eq!(Path::new(log.trim()).canonicalize().unwrap(), expected);
}

#[tokio::test]
async fn test_missing_command_fails_with_spawn_error() {
    let dir = tempfile::tempdir().unwrap();
    let spec = Arc::new(
        ServerSpec::new("zapier", "/nonexistent/zapier-mcp")
            .with_log_path(dir.path().join("zapier.log")),
    );

    let err = ProcessLauncher::new().launch(spec).unwrap_err();
    match err {
        LaunchError::Spawn { command, .. } => assert_eq!(command, "/nonexistent/zapier-mcp"),
        other => panic!("Expected Spawn error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_lazy_env_resolved_at_launch() {
    let dir = tempfile::tempdir().unwrap();
    let spec = Arc::new(
        shell_spec("slack", "echo \"token=$SLACK_BOT_TOKEN\"", dir.path())
            .with_env("SLACK_BOT_TOKEN", "${SLACK_TOKEN_UNDER_TEST}")
            .with_resolve(ResolveMode::Lazy),
    );

    let launcher = ProcessLauncher::with_env_lookup(|name| {
        (name == "SLACK_TOKEN_UNDER_TEST").then(|| "xoxb-test".to_string())
    });
    let handle = launcher.launch(Arc::clone(&spec)).unwrap();
    wait_for_exit(&handle).await;

    let log = std::fs::read_to_string(&spec.log_path).unwrap();
    assert!(log.contains("token=xoxb-test"));
}

#[tokio::test]
async fn test_lazy_env_missing_fails_only_that_launch() {
    let dir = tempfile::tempdir().unwrap();
    let specs = vec![
        Arc::new(shell_spec("snowflake", "sleep 5", dir.path())),
        Arc::new(
            shell_spec("slack", "sleep 5", dir.path())
                .with_env("SLACK_BOT_TOKEN", "${SLACK_TOKEN_UNDER_TEST}")
                .with_resolve(ResolveMode::Lazy),
        ),
        Arc::new(shell_spec("github", "sleep 5", dir.path())),
    ];

    let launcher = ProcessLauncher::with_env_lookup(|_| None);
    let report = launcher.launch_all(&specs);

    assert_eq!(report.outcomes().len(), 3);
    assert_eq!(report.started_count(), 2);
    assert_eq!(report.failed_count(), 1);

    let failures: Vec<_> = report.failures().collect();
    assert_eq!(failures[0].0.name, "slack");
    assert!(matches!(
        failures[0].1,
        LaunchError::UnresolvedEnv(var) if var == "SLACK_TOKEN_UNDER_TEST"
    ));

    for handle in report.handles() {
        handle.stop().await.unwrap();
    }
}

#[tokio::test]
async fn test_launch_report_entries_in_spec_order() {
    let dir = tempfile::tempdir().unwrap();
    let specs = vec![
        Arc::new(shell_spec("snowflake", "sleep 5", dir.path())),
        Arc::new(
            ServerSpec::new("foundry", "/nonexistent/foundry-mcp")
                .with_log_path(dir.path().join("foundry.log")),
        ),
        Arc::new(shell_spec("aip", "sleep 5", dir.path())),
    ];

    let report = ProcessLauncher::new().launch_all(&specs);
    let entries = report.entries();

    let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["snowflake", "foundry", "aip"]);
    assert!(entries[0].launched && entries[0].pid.is_some());
    assert!(!entries[1].launched && entries[1].pid.is_none());
    assert!(entries[1].error.as_deref().unwrap().contains("foundry-mcp"));
    assert!(entries[2].launched);

    let json = serde_json::to_value(&entries[1]).unwrap();
    assert_eq!(json["launched"], false);
    assert!(json.get("pid").is_none());
    assert!(json.get("logPath").is_some());

    for handle in report.handles() {
        handle.stop().await.unwrap();
    }
}

#[tokio::test]
async fn test_stop_terminates_running_process() {
    let dir = tempfile::tempdir().unwrap();
    let spec = Arc::new(shell_spec("github", "sleep 30", dir.path()));

    let handle = ProcessLauncher::new().launch(spec).unwrap();
    assert!(handle.try_exit_status().await.unwrap().is_none());

    handle.stop().await.unwrap();
    assert!(handle.try_exit_status().await.unwrap().is_some());
}

#[tokio::test]
async fn test_supervisor_records_launch_failures() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::new(vec![
        shell_spec("snowflake", "sleep 5", dir.path()),
        ServerSpec::new("foundry", "/nonexistent/foundry-mcp")
            .with_log_path(dir.path().join("foundry.log")),
    ]);
    let mut supervisor = Supervisor::new(config);

    let report = supervisor.launch_all().await;
    assert_eq!(report.started_count(), 1);
    assert_eq!(report.failed_count(), 1);

    let foundry = supervisor.aggregator().record("foundry").unwrap();
    assert_eq!(foundry.status, HealthStatus::Unhealthy);
    assert!(foundry.detail.unwrap().starts_with("launch failed"));
    assert_eq!(
        supervisor.aggregator().record("snowflake").unwrap().status,
        HealthStatus::Unknown
    );
    assert_eq!(supervisor.live_handles().await.len(), 1);

    // A second call does not relaunch
    assert_eq!(supervisor.launch_all().await.started_count(), 1);
    assert_eq!(supervisor.live_handles().await.len(), 1);

    supervisor.shutdown().await.unwrap();
    assert!(supervisor.live_handles().await.is_empty());
}

#[tokio::test]
async fn test_supervisor_launch_server_errors() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::new(vec![
        ServerSpec::new("foundry", "/nonexistent/foundry-mcp")
            .with_log_path(dir.path().join("foundry.log")),
    ]);
    let mut supervisor = Supervisor::new(config);

    let err = supervisor.launch_server("jira").await.unwrap_err();
    assert!(matches!(err, Error::ServerNotFound(name) if name == "jira"));

    let err = supervisor.launch_server("foundry").await.unwrap_err();
    match err {
        Error::Launch { server, source } => {
            assert_eq!(server, "foundry");
            assert!(matches!(source, LaunchError::Spawn { .. }));
        }
        other => panic!("Expected Launch error, got {:?}", other),
    }
    assert_eq!(
        supervisor.aggregator().record("foundry").unwrap().status,
        HealthStatus::Unhealthy
    );
}

#[tokio::test]
async fn test_unwritable_log_path_fails_with_log_file_error() {
    let dir = tempfile::tempdir().unwrap();
    // A directory cannot be opened as the log file
    let log_dir_as_file = dir.path().join("occupied");
    std::fs::create_dir(&log_dir_as_file).unwrap();
    let broken = Arc::new(shell_spec("foundry", "sleep 5", dir.path()).with_log_path(&log_dir_as_file));

    let err = ProcessLauncher::new().launch(Arc::clone(&broken)).unwrap_err();
    match err {
        LaunchError::LogFile { path, .. } => assert_eq!(path, log_dir_as_file),
        other => panic!("Expected LogFile error, got {:?}", other),
    }

    let specs = vec![
        Arc::new(shell_spec("snowflake", "sleep 5", dir.path())),
        broken,
        Arc::new(shell_spec("aip", "sleep 5", dir.path())),
    ];
    let report = ProcessLauncher::new().launch_all(&specs);

    assert_eq!(report.started_count(), 2);
    let failures: Vec<_> = report.failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0.name, "foundry");
    assert!(matches!(failures[0].1, LaunchError::LogFile { .. }));

    for handle in report.handles() {
        handle.stop().await.unwrap();
    }
}

#[tokio::test]
async fn test_launch_server_refuses_running_server() {
    let dir = tempfile::tempdir().unwrap();
    let spec = shell_spec("snowflake", "echo first run; sleep 30", dir.path());
    let log_path = spec.log_path.clone();
    let mut supervisor = Supervisor::new(Config::new(vec![spec]));

    assert_eq!(supervisor.launch_all().await.started_count(), 1);
    for _ in 0..100 {
        if std::fs::read_to_string(&log_path).unwrap().contains("first run") {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    supervisor.check_all().await;

    let err = supervisor.launch_server("snowflake").await.unwrap_err();
    assert!(matches!(err, Error::AlreadyRunning(name) if name == "snowflake"));

    // The running backend keeps its log, its handle and its health
    assert!(std::fs::read_to_string(&log_path).unwrap().contains("first run"));
    assert_eq!(supervisor.live_handles().await.len(), 1);
    let records = supervisor.check_all().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, HealthStatus::Healthy);

    supervisor.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_launch_server_replaces_exited_handle() {
    let dir = tempfile::tempdir().unwrap();
    let mut supervisor = Supervisor::new(Config::new(vec![shell_spec(
        "github",
        "sleep 30",
        dir.path(),
    )]));

    supervisor.launch_all().await;
    let first = supervisor.live_handles().await.remove(0);
    first.stop().await.unwrap();

    let second = supervisor.launch_server("github").await.unwrap();

    let live = supervisor.live_handles().await;
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].id(), second.id());
    assert_ne!(second.id(), first.id());

    supervisor.shutdown().await.unwrap();
}
