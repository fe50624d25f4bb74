//! BDD step definitions for the per-invocation job runner

use std::sync::Arc;
use std::time::Duration;

use cucumber::{given, then, when};

use fraud_console::backend::Backend;
use fraud_console::config::RunnerConfig;
use fraud_console::job::JobKind;
use fraud_console::runner::JobRunner;
use fraud_console::scheduler::Scheduler;

use crate::world::ConsoleWorld;

#[given("a job runner on the fake backend")]
fn job_runner(world: &mut ConsoleWorld) {
    let backend: Arc<dyn Backend> = world.backend.clone();
    let scheduler: Arc<dyn Scheduler> = world.scheduler.clone();
    world.runner = Some(JobRunner::new(backend, scheduler, &RunnerConfig::default()));
}

#[when("the operator starts the master data sync")]
async fn start_sync(world: &mut ConsoleWorld) {
    let accepted = world.runner().run_kind(&JobKind::SyncMasters).await;
    world.run_accepted.push(accepted);
}

#[when("the operator resets the runner")]
fn reset_runner(world: &mut ConsoleWorld) {
    world.runner().reset();
}

#[then(expr = "the runner shows {word} with message {string}")]
fn runner_shows(world: &mut ConsoleWorld, status: String, message: String) {
    let view = world.runner().view();
    assert_eq!(
        serde_json::to_value(view.status).unwrap(),
        serde_json::Value::String(status)
    );
    assert_eq!(view.message, message);
}

#[then(expr = "the runner is {word}")]
fn runner_is(world: &mut ConsoleWorld, status: String) {
    let view = world.runner().view();
    assert_eq!(
        serde_json::to_value(view.status).unwrap(),
        serde_json::Value::String(status)
    );
}

#[then("the runner is still loading")]
fn runner_loading(world: &mut ConsoleWorld) {
    assert!(world.runner().view().loading);
}

#[then("the runner has stopped loading")]
fn runner_not_loading(world: &mut ConsoleWorld) {
    assert!(!world.runner().view().loading);
}

#[then(expr = "the runner polls again in {int} ms")]
fn runner_polls_in(world: &mut ConsoleWorld, ms: u64) {
    assert_eq!(
        world.scheduler.pending_delays(),
        vec![Duration::from_millis(ms)]
    );
    assert!(world.runner().has_pending_poll());
}

#[then("the runner is not polling")]
fn runner_not_polling(world: &mut ConsoleWorld) {
    assert!(world.scheduler.pending_delays().is_empty());
    assert!(!world.runner().has_pending_poll());
}

#[then("the second start was ignored")]
fn second_ignored(world: &mut ConsoleWorld) {
    assert_eq!(world.run_accepted, vec![true, false]);
}
