//! BDD step definitions for the shared job-status store

use std::sync::atomic::Ordering;
use std::time::Duration;

use cucumber::{given, then, when};

use crate::steps::transition_steps::{create_job_store, job, parse_status};
use crate::world::{settle, ConsoleWorld};

#[given("a job store on the fake backend")]
fn job_store(world: &mut ConsoleWorld) {
    create_job_store(world);
}

#[given(expr = "the backend reports {word} for job {string} on every poll")]
fn backend_always_reports(world: &mut ConsoleWorld, status: String, job_id: String) {
    world.backend.set_job(Some(job(&status, &job_id, None)));
}

#[when(expr = "the backend reports {word} for job {string} on every poll")]
fn backend_now_reports(world: &mut ConsoleWorld, status: String, job_id: String) {
    backend_always_reports(world, status, job_id);
}

#[given("the backend is slow to answer")]
fn backend_slow(world: &mut ConsoleWorld) {
    *world.backend.hold_job_status.lock().unwrap() = true;
}

#[given("the backend is unreachable")]
fn backend_down(world: &mut ConsoleWorld) {
    world.backend.set_job(None);
}

#[when("the backend goes down")]
fn backend_goes_down(world: &mut ConsoleWorld) {
    backend_down(world);
}

#[when("an observer subscribes")]
async fn observer_subscribes(world: &mut ConsoleWorld) {
    let subscription = world.job_store().subscribe(|_| {});
    world.subscriptions.push(subscription);
    world.scheduler.fire_due();
    settle().await;
}

#[when("an observer subscribes and leaves before the first poll")]
fn observer_leaves_early(world: &mut ConsoleWorld) {
    let subscription = world.job_store().subscribe(|_| {});
    drop(subscription);
    world.scheduler.fire_due();
}

#[when("one observer unsubscribes")]
fn one_unsubscribes(world: &mut ConsoleWorld) {
    world.subscriptions.pop();
}

#[when("every observer unsubscribes")]
fn all_unsubscribe(world: &mut ConsoleWorld) {
    world.subscriptions.clear();
}

#[when("the scheduled poll fires")]
async fn scheduled_poll_fires(world: &mut ConsoleWorld) {
    assert!(world.scheduler.fire_next().await, "no poll was scheduled");
    settle().await;
}

#[when("another poll is requested")]
async fn another_poll(world: &mut ConsoleWorld) {
    world.job_store().poll().await;
}

#[when("the backend answers")]
async fn backend_answers(world: &mut ConsoleWorld) {
    *world.backend.hold_job_status.lock().unwrap() = false;
    world.backend.release.notify_one();
    settle().await;
}

#[then(expr = "the backend has been asked {int} time(s)")]
fn requests_made(world: &mut ConsoleWorld, count: usize) {
    assert_eq!(world.backend.job_requests.load(Ordering::SeqCst), count);
}

#[then(expr = "the next poll is scheduled in {int} ms")]
fn next_poll_in(world: &mut ConsoleWorld, ms: u64) {
    assert_eq!(
        world.scheduler.pending_delays(),
        vec![Duration::from_millis(ms)]
    );
    assert!(world.job_store().has_pending_poll());
}

#[then("no poll is scheduled")]
fn no_poll(world: &mut ConsoleWorld) {
    assert!(world.scheduler.pending_delays().is_empty());
    assert!(!world.job_store().has_pending_poll());
}

#[then(expr = "the store has {int} observer(s)")]
fn observer_count(world: &mut ConsoleWorld, count: usize) {
    assert_eq!(world.job_store().observer_count(), count);
}

#[then(expr = "the snapshot shows job {string} as {word}")]
fn snapshot_shows(world: &mut ConsoleWorld, job_id: String, status: String) {
    let snapshot = world.job_store().snapshot();
    let job = snapshot.job.as_ref().expect("no job in snapshot");
    assert_eq!(job.job_id.as_deref(), Some(job_id.as_str()));
    assert_eq!(job.status, parse_status(&status));
}

#[then("the snapshot has no job yet")]
fn snapshot_empty(world: &mut ConsoleWorld) {
    assert!(world.job_store().snapshot().job.is_none());
}

#[then("the snapshot is marked degraded")]
fn snapshot_degraded(world: &mut ConsoleWorld) {
    assert!(world.job_store().snapshot().error);
}

#[then("the snapshot is not degraded")]
fn snapshot_fresh(world: &mut ConsoleWorld) {
    assert!(!world.job_store().snapshot().error);
}
