//! Tests for the tracker's command parsing and follow loop.
//!
//! The follow loop runs against `ScriptedJobApi` on a paused Tokio clock.

use std::future::pending;
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use clap::Parser;
use neural_client::controller::LifecycleController;
use neural_client::poller::{PollConfig, PollerState};
use neural_client::testing::{CancelBehavior, CreateBehavior, ScriptedJobApi, Step};
use neural_tracker::cli::{Cli, Command, Target};
use neural_tracker::follow::{self, Outcome, TrackerError};
use serde_json::json;

const INTERVAL: Duration = Duration::from_secs(2);

fn command(args: &[&str]) -> Command {
    let mut argv = vec!["neural-tracker"];
    argv.extend_from_slice(args);
    Cli::try_parse_from(argv).unwrap().command
}

fn controller(api: &Arc<ScriptedJobApi>, config: PollConfig) -> LifecycleController {
    LifecycleController::new(api.clone(), config)
}

// ---------------------------------------------------------------------------
// Command line
// ---------------------------------------------------------------------------

#[test]
fn start_options_are_parsed_as_json_or_strings() {
    let cmd = command(&[
        "start",
        "--model-type",
        "lstm",
        "--file-id",
        "file-9",
        "--option",
        "epochs=20",
        "--option",
        "scaler=minmax",
        "--option",
        "note=a=b",
    ]);

    let request = assert_matches!(cmd.target(), Ok(Target::Create(request)) => request);
    assert_eq!(request.model_type, "lstm");
    assert_eq!(request.file_id, "file-9");
    assert_eq!(request.options["epochs"], json!(20));
    assert_eq!(request.options["scaler"], json!("minmax"));
    assert_eq!(request.options["note"], json!("a=b"));
}

#[test]
fn option_without_key_is_rejected() {
    for bad in ["epochs", "=20"] {
        let cmd = command(&[
            "start",
            "--model-type",
            "lstm",
            "--file-id",
            "f",
            "--option",
            bad,
        ]);
        assert_matches!(cmd.target(), Err(TrackerError::InvalidOption(raw)) if raw == bad);
    }
}

#[test]
fn watch_requires_non_empty_job_id() {
    let cmd = command(&["watch", "job-5"]);
    assert_matches!(cmd.target(), Ok(Target::Existing(id)) if id.as_str() == "job-5");

    let cmd = command(&["watch", "  "]);
    assert_matches!(cmd.target(), Err(TrackerError::InvalidJobId(_)));
}

#[test]
fn start_requires_model_and_file() {
    assert!(Cli::try_parse_from(["neural-tracker", "start", "--model-type", "lstm"]).is_err());
}

// ---------------------------------------------------------------------------
// Follow loop
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn completed_job_exits_successfully() {
    let api = Arc::new(ScriptedJobApi::new(
        "job-42",
        vec![Step::running(30.0), Step::running(65.0), Step::completed()],
    ));
    let controller = controller(&api, PollConfig::with_interval(INTERVAL));
    let cmd = command(&["start", "--model-type", "lstm", "--file-id", "file-1"]);

    let outcome = follow::run(&controller, &cmd, pending()).await.unwrap();

    let job = assert_matches!(&outcome, Outcome::Completed(job) => job);
    assert_eq!(job.job_id.as_str(), "job-42");
    assert_eq!(job.progress, 100.0);
    assert_eq!(outcome.exit_code(), 0);
    assert_eq!(api.fetch_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn failed_job_reports_its_error() {
    let api = Arc::new(ScriptedJobApi::new(
        "job-7",
        vec![Step::running(10.0), Step::failed(40.0, "loss diverged")],
    ));
    let controller = controller(&api, PollConfig::with_interval(INTERVAL));
    let cmd = command(&["start", "--model-type", "lstm", "--file-id", "file-1"]);

    let outcome = follow::run(&controller, &cmd, pending()).await.unwrap();

    assert_eq!(
        outcome,
        Outcome::Failed {
            error: "loss diverged".into()
        }
    );
    assert_eq!(outcome.exit_code(), 1);
}

#[tokio::test(start_paused = true)]
async fn unreachable_service_loses_track_after_ceiling() {
    let api = Arc::new(ScriptedJobApi::new(
        "job-1",
        vec![Step::network_error(), Step::network_error()],
    ));
    let config = PollConfig {
        max_consecutive_failures: Some(2),
        ..PollConfig::with_interval(INTERVAL)
    };
    let controller = controller(&api, config);
    let cmd = command(&["start", "--model-type", "lstm", "--file-id", "file-1"]);

    let outcome = follow::run(&controller, &cmd, pending()).await.unwrap();

    assert_matches!(outcome, Outcome::Lost { .. });
    assert_eq!(api.fetch_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn creation_failure_is_an_error() {
    let api = Arc::new(
        ScriptedJobApi::new("unused", vec![]).with_create(vec![CreateBehavior::RemoteError(500)]),
    );
    let controller = controller(&api, PollConfig::with_interval(INTERVAL));
    let cmd = command(&["start", "--model-type", "lstm", "--file-id", "file-1"]);

    let err = follow::run(&controller, &cmd, pending()).await.unwrap_err();
    assert_matches!(err, TrackerError::Start(_));
    assert_eq!(api.fetch_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn shutdown_cancels_owned_job() {
    let api = Arc::new(ScriptedJobApi::new("job-3", vec![Step::running(10.0), Step::Hang]));
    let controller = controller(&api, PollConfig::with_interval(INTERVAL));
    let cmd = command(&["start", "--model-type", "lstm", "--file-id", "file-1"]);

    let shutdown = tokio::time::sleep(Duration::from_secs(5));
    let outcome = follow::run(&controller, &cmd, shutdown).await.unwrap();

    assert_eq!(
        outcome,
        Outcome::Cancelled {
            remote_acknowledged: true
        }
    );
    let cancelled: Vec<String> = api.cancelled_ids().iter().map(|id| id.to_string()).collect();
    assert_eq!(cancelled, vec!["job-3"]);
    assert!(controller.store().snapshot().is_none());
    assert_eq!(controller.poller_state(), PollerState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn shutdown_cancel_survives_unreachable_service() {
    let api = Arc::new(
        ScriptedJobApi::new("job-3", vec![Step::Hang]).with_cancel(CancelBehavior::NetworkError),
    );
    let controller = controller(&api, PollConfig::with_interval(INTERVAL));
    let cmd = command(&["start", "--model-type", "lstm", "--file-id", "file-1"]);

    let shutdown = tokio::time::sleep(Duration::from_secs(3));
    let outcome = follow::run(&controller, &cmd, shutdown).await.unwrap();

    assert_eq!(
        outcome,
        Outcome::Cancelled {
            remote_acknowledged: false
        }
    );
    assert_eq!(outcome.exit_code(), 1);
}

#[tokio::test(start_paused = true)]
async fn shutdown_while_watching_leaves_job_running() {
    let api = Arc::new(ScriptedJobApi::new("unused", vec![Step::running(50.0), Step::Hang]));
    let controller = controller(&api, PollConfig::with_interval(INTERVAL));
    let cmd = command(&["watch", "job-77"]);

    let shutdown = tokio::time::sleep(Duration::from_secs(5));
    let outcome = follow::run(&controller, &cmd, shutdown).await.unwrap();

    assert_eq!(outcome, Outcome::Detached);
    assert!(api.cancelled_ids().is_empty());
    assert_eq!(api.create_count(), 0);
    let fetched: Vec<String> = api.fetched_ids().iter().map(|id| id.to_string()).collect();
    assert_eq!(fetched, vec!["job-77", "job-77"]);
    assert_eq!(controller.poller_state(), PollerState::Stopped);
}
