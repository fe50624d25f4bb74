//! BDD step definitions for batched CSV export

use std::sync::Arc;

use cucumber::{given, then, when};
use tokio_util::sync::CancellationToken;

use fraud_console::backend::Backend;
use fraud_console::export::{ExportEngine, ExportJob, ExportOutcome, ExportStart, ExportStage};
use fraud_console::suspicious::{SuspiciousKind, SuspiciousPages};

use crate::world::ConsoleWorld;

fn pages(world: &ConsoleWorld) -> SuspiciousPages {
    let backend: Arc<dyn Backend> = world.backend.clone();
    SuspiciousPages::new(
        backend,
        SuspiciousKind::Clicks,
        Some("2026-01-20".to_string()),
        None,
    )
}

async fn run_export(world: &mut ConsoleWorld, job: ExportJob) {
    let pages = pages(world);
    let mut progress = Vec::new();
    let outcome = job
        .run(
            &pages,
            pages.file_name(),
            |p| progress.push(p),
            &CancellationToken::new(),
        )
        .await;
    world.progress = progress;
    world.outcome = Some(outcome);
}

fn written(world: &ConsoleWorld) -> &ExportOutcome {
    match world.outcome.as_ref().expect("export did not run") {
        Ok(outcome) => outcome,
        Err(e) => panic!("export failed: {}", e),
    }
}

#[given(expr = "exports fetch {int} rows per batch and stop at {int} rows")]
fn export_sizing(world: &mut ConsoleWorld, batch_size: usize, max_rows: usize) {
    world.batch_size = batch_size;
    world.max_rows = max_rows;
}

#[given(expr = "the backend has {int} suspicious clicks")]
fn backend_has_clicks(world: &mut ConsoleWorld, count: usize) {
    *world.backend.suspicious_total.lock().unwrap() = count;
    *world.backend.suspicious_available.lock().unwrap() = count;
}

#[given(expr = "the backend reports {int} suspicious clicks but only returns {int}")]
fn backend_short(world: &mut ConsoleWorld, total: usize, available: usize) {
    *world.backend.suspicious_total.lock().unwrap() = total;
    *world.backend.suspicious_available.lock().unwrap() = available;
}

#[given(expr = "the backend fails the batch at offset {int}")]
fn backend_fails_at(world: &mut ConsoleWorld, offset: usize) {
    *world.backend.fail_at_offset.lock().unwrap() = Some(offset);
}

#[when("the operator exports suspicious clicks")]
async fn export_clicks(world: &mut ConsoleWorld) {
    let engine = ExportEngine::new(world.batch_size, world.max_rows);
    let total = match pages(world).total().await {
        Ok(total) => total,
        Err(e) => {
            world.outcome = Some(Err(e));
            return;
        }
    };
    match engine.start(total) {
        ExportStart::Empty => world.outcome = Some(Ok(ExportOutcome::Empty)),
        ExportStart::NeedsConfirmation(confirmation) => world.confirmation = Some(confirmation),
        ExportStart::Ready(job) => run_export(world, job).await,
    }
}

#[when("the operator confirms the export")]
async fn confirm_export(world: &mut ConsoleWorld) {
    let confirmation = world
        .confirmation
        .take()
        .expect("no confirmation was requested");
    run_export(world, confirmation.confirm()).await;
}

#[then(expr = "the operator is asked to confirm {string}")]
fn asked_to_confirm(world: &mut ConsoleWorld, message: String) {
    let confirmation = world
        .confirmation
        .as_ref()
        .expect("no confirmation was requested");
    assert_eq!(confirmation.message(), message);
}

#[then("no batches were requested")]
fn no_batches(world: &mut ConsoleWorld) {
    assert!(world.backend.batches().is_empty());
}

#[then(expr = "the batches requested were {string}")]
fn batches_requested(world: &mut ConsoleWorld, expected: String) {
    let actual: Vec<String> = world
        .backend
        .batches()
        .iter()
        .map(|(offset, limit)| format!("{}+{}", offset, limit))
        .collect();
    assert_eq!(actual.join(", "), expected);
}

#[then(expr = "{int} of {int} rows were exported")]
fn rows_exported(world: &mut ConsoleWorld, rows: usize, total: usize) {
    match written(world) {
        ExportOutcome::Written {
            rows: got_rows,
            total: got_total,
            ..
        } => {
            assert_eq!(*got_rows, rows);
            assert_eq!(*got_total, total);
        }
        other => panic!("expected a written export, got {:?}", other),
    }
}

#[then(expr = "the export file is named {string}")]
fn export_file_name(world: &mut ConsoleWorld, name: String) {
    match written(world) {
        ExportOutcome::Written { artifact, .. } => assert_eq!(artifact.file_name, name),
        other => panic!("expected a written export, got {:?}", other),
    }
}

#[then(expr = "the export file has {int} lines after the header")]
fn export_lines(world: &mut ConsoleWorld, lines: usize) {
    match written(world) {
        ExportOutcome::Written { artifact, .. } => {
            let text = String::from_utf8(artifact.bytes.clone()).unwrap();
            assert!(text.starts_with('\u{FEFF}'));
            assert!(text.trim_start_matches('\u{FEFF}').starts_with("Risk level,"));
            assert_eq!(text.lines().count(), lines + 1);
        }
        other => panic!("expected a written export, got {:?}", other),
    }
}

#[then(expr = "the operator is warned {string}")]
fn operator_warned(world: &mut ConsoleWorld, description: String) {
    let notices = written(world).notices();
    assert!(notices
        .iter()
        .any(|n| n.description.as_deref() == Some(description.as_str())));
}

#[then("the export was empty")]
fn export_empty(world: &mut ConsoleWorld) {
    assert_eq!(written(world), &ExportOutcome::Empty);
}

#[then(expr = "the export failed with {string}")]
fn export_failed(world: &mut ConsoleWorld, message: String) {
    match world.outcome.as_ref().expect("export did not run") {
        Err(e) => assert_eq!(e.user_message("Export failed"), message),
        Ok(outcome) => panic!("expected a failure, got {:?}", outcome),
    }
}

#[then(expr = "progress ended at {int} of {int}")]
fn progress_ended(world: &mut ConsoleWorld, current: usize, total: usize) {
    let last = world.progress.last().expect("no progress reported");
    assert_eq!(last.current, current);
    assert_eq!(last.total, total);
    assert_eq!(last.stage, ExportStage::Building);
}

#[then("progress never went backwards")]
fn progress_monotonic(world: &mut ConsoleWorld) {
    assert!(world
        .progress
        .windows(2)
        .all(|pair| pair[0].current <= pair[1].current));
}
