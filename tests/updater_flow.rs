//! Update state machine driven through in-memory collaborators.

use service_updater::cli::OutputManager;
use service_updater::error::{BuildError, GitError, Result, ServiceError, UpdateError};
use service_updater::{
    BuildSystem, InProcessRestart, LockDigest, RebaseOutcome, RestartPlan, RestartScheduler,
    RestartStatus, Revision, ServiceManager, SourceControl, UpdateOutcome, Updater,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn rev_a() -> Revision {
    Revision::new("a".repeat(40))
}

fn rev_b() -> Revision {
    Revision::new("b".repeat(40))
}

/// Shared state of the fake checkout, build tool and scheduler
#[derive(Debug)]
struct World {
    head: Revision,
    remote_head: Revision,
    lock: LockDigest,
    remote_lock: LockDigest,
    conflict: bool,
    fail_fetch: bool,
    fail_abort: bool,
    fail_deps: bool,
    fail_build: bool,
    fail_migrate: bool,
    fail_mark: bool,
    fail_reset: bool,
    marked: Option<Revision>,
    scheduled: Vec<RestartPlan>,
    calls: Vec<String>,
}

impl World {
    fn new(head: Revision, remote_head: Revision) -> Self {
        Self {
            head,
            remote_head,
            lock: LockDigest::of_bytes(b"v1"),
            remote_lock: LockDigest::of_bytes(b"v1"),
            conflict: false,
            fail_fetch: false,
            fail_abort: false,
            fail_deps: false,
            fail_build: false,
            fail_migrate: false,
            fail_mark: false,
            fail_reset: false,
            marked: None,
            scheduled: Vec::new(),
            calls: Vec::new(),
        }
    }
}

type Shared = Arc<Mutex<World>>;

struct FakeSource(Shared);
struct FakeBuild(Shared);
struct FakeScheduler(Shared);

impl SourceControl for FakeSource {
    fn remote_ref(&self) -> String {
        "origin/main".to_string()
    }

    async fn current_revision(&self) -> Result<Revision> {
        Ok(self.0.lock().unwrap().head.clone())
    }

    async fn fetch(&self) -> Result<()> {
        let mut world = self.0.lock().unwrap();
        world.calls.push("fetch".to_string());
        if world.fail_fetch {
            return Err(GitError::CommandFailed {
                operation: "fetch".to_string(),
                reason: "could not resolve host".to_string(),
            }
            .into());
        }
        Ok(())
    }

    async fn rebase_onto_remote(&self) -> Result<RebaseOutcome> {
        let mut world = self.0.lock().unwrap();
        world.calls.push("rebase".to_string());
        if world.conflict {
            return Ok(RebaseOutcome::Conflict);
        }
        world.head = world.remote_head.clone();
        world.lock = world.remote_lock.clone();
        Ok(RebaseOutcome::Applied)
    }

    async fn abort_rebase(&self) -> Result<()> {
        let mut world = self.0.lock().unwrap();
        world.calls.push("abort_rebase".to_string());
        if world.fail_abort {
            return Err(GitError::CommandFailed {
                operation: "rebase --abort".to_string(),
                reason: "index.lock exists".to_string(),
            }
            .into());
        }
        Ok(())
    }

    async fn reset_hard(&self, revision: &Revision) -> Result<()> {
        let mut world = self.0.lock().unwrap();
        world.calls.push(format!("reset:{}", revision.short()));
        if world.fail_reset {
            return Err(GitError::CommandFailed {
                operation: "reset --hard".to_string(),
                reason: "index.lock exists".to_string(),
            }
            .into());
        }
        world.head = revision.clone();
        Ok(())
    }
}

impl BuildSystem for FakeBuild {
    async fn lock_digest(&self) -> Result<LockDigest> {
        Ok(self.0.lock().unwrap().lock.clone())
    }

    async fn fetch_dependencies(&self) -> Result<()> {
        let mut world = self.0.lock().unwrap();
        world.calls.push("deps".to_string());
        if world.fail_deps {
            return Err(BuildError::DependencyFetch {
                reason: "hex.pm unreachable".to_string(),
            }
            .into());
        }
        Ok(())
    }

    async fn compile(&self) -> Result<()> {
        let mut world = self.0.lock().unwrap();
        world.calls.push("build".to_string());
        if world.fail_build {
            return Err(BuildError::Compile {
                reason: "undefined function".to_string(),
            }
            .into());
        }
        Ok(())
    }

    async fn migrate(&self) -> Result<()> {
        let mut world = self.0.lock().unwrap();
        world.calls.push("migrate".to_string());
        if world.fail_migrate {
            return Err(BuildError::Migrate {
                reason: "relation already exists".to_string(),
            }
            .into());
        }
        Ok(())
    }

    async fn mark_updating(&self, revision: &Revision) -> Result<()> {
        let mut world = self.0.lock().unwrap();
        world.calls.push("mark".to_string());
        if world.fail_mark {
            return Err(BuildError::MarkUpdating {
                revision: revision.clone(),
                reason: "database unavailable".to_string(),
            }
            .into());
        }
        world.marked = Some(revision.clone());
        Ok(())
    }
}

impl RestartScheduler for FakeScheduler {
    fn schedule(&self, plan: &RestartPlan) -> Result<()> {
        let mut world = self.0.lock().unwrap();
        world.calls.push("schedule".to_string());
        world.scheduled.push(plan.clone());
        Ok(())
    }
}

fn plan() -> RestartPlan {
    RestartPlan {
        port: 4000,
        delay: Duration::from_secs(2),
        poll_attempts: 30,
        poll_interval: Duration::from_millis(500),
    }
}

fn updater(world: &Shared) -> Updater<FakeSource, FakeBuild, FakeScheduler> {
    Updater::new(
        FakeSource(Arc::clone(world)),
        FakeBuild(Arc::clone(world)),
        FakeScheduler(Arc::clone(world)),
        plan(),
    )
}

fn shared(world: World) -> Shared {
    Arc::new(Mutex::new(world))
}

fn calls(world: &Shared) -> Vec<String> {
    world.lock().unwrap().calls.clone()
}

#[tokio::test]
async fn test_up_to_date_skips_build_migrate_and_restart() {
    let world = shared(World::new(rev_a(), rev_a()));

    let outcome = updater(&world).run(&OutputManager::quiet()).await.unwrap();

    assert_eq!(outcome, UpdateOutcome::UpToDate { revision: rev_a() });
    assert_eq!(calls(&world), ["fetch", "rebase"]);
    assert!(world.lock().unwrap().marked.is_none());
}

#[tokio::test]
async fn test_conflict_aborts_and_leaves_revision_unchanged() {
    let mut state = World::new(rev_a(), rev_b());
    state.conflict = true;
    let world = shared(state);

    let err = updater(&world).run(&OutputManager::quiet()).await.unwrap_err();

    assert!(matches!(err, UpdateError::SyncConflict { ref revision, .. } if *revision == rev_a()));
    assert_eq!(err.exit_code(), 1);
    assert_eq!(world.lock().unwrap().head, rev_a());
    assert_eq!(calls(&world), ["fetch", "rebase", "abort_rebase"]);
}

#[tokio::test]
async fn test_failed_abort_reports_conflict_and_abort_failure() {
    let mut state = World::new(rev_a(), rev_b());
    state.conflict = true;
    state.fail_abort = true;
    let world = shared(state);

    let err = updater(&world).run(&OutputManager::quiet()).await.unwrap_err();

    match &err {
        UpdateError::AbortFailed {
            remote_ref,
            revision,
            reason,
        } => {
            assert_eq!(remote_ref, "origin/main");
            assert_eq!(*revision, rev_a());
            assert!(reason.contains("index.lock exists"));
        }
        other => panic!("expected AbortFailed, got {:?}", other),
    }
    assert!(err.to_string().contains("hit conflicts"));
    assert_eq!(err.exit_code(), 1);
    assert!(err.leaves_tree_advanced());
    assert_eq!(calls(&world), ["fetch", "rebase", "abort_rebase"]);
}

#[tokio::test]
async fn test_fetch_failure_leaves_tree_untouched() {
    let mut state = World::new(rev_a(), rev_b());
    state.fail_fetch = true;
    let world = shared(state);

    let err = updater(&world).run(&OutputManager::quiet()).await.unwrap_err();

    assert!(matches!(err, UpdateError::Git(GitError::CommandFailed { .. })));
    assert_eq!(err.exit_code(), 1);
    assert!(!err.leaves_tree_advanced());
    assert_eq!(world.lock().unwrap().head, rev_a());
    assert_eq!(calls(&world), ["fetch"]);
}

#[tokio::test]
async fn test_build_failure_rolls_back_to_prior_revision() {
    let mut state = World::new(rev_a(), rev_b());
    state.fail_build = true;
    let world = shared(state);

    let err = updater(&world).run(&OutputManager::quiet()).await.unwrap_err();

    match &err {
        UpdateError::BuildFailed {
            prior, attempted, ..
        } => {
            assert_eq!(*prior, rev_a());
            assert_eq!(*attempted, rev_b());
        }
        other => panic!("expected BuildFailed, got {:?}", other),
    }
    assert_eq!(err.exit_code(), 1);
    assert_eq!(world.lock().unwrap().head, rev_a());
    assert_eq!(calls(&world), ["fetch", "rebase", "build", "reset:aaaaaaa"]);
}

#[tokio::test]
async fn test_failed_rollback_reports_both_failures() {
    let mut state = World::new(rev_a(), rev_b());
    state.fail_build = true;
    state.fail_reset = true;
    let world = shared(state);

    let err = updater(&world).run(&OutputManager::quiet()).await.unwrap_err();

    assert!(matches!(err, UpdateError::RollbackFailed { .. }));
    let message = err.to_string();
    assert!(message.contains("undefined function"));
    assert!(message.contains("index.lock exists"));
    assert!(err.leaves_tree_advanced());
}

#[tokio::test]
async fn test_unchanged_lock_skips_dependency_fetch() {
    let world = shared(World::new(rev_a(), rev_b()));

    let outcome = updater(&world).run(&OutputManager::quiet()).await.unwrap();

    assert!(matches!(
        outcome,
        UpdateOutcome::Updated {
            dependencies_fetched: false,
            ..
        }
    ));
    assert!(!calls(&world).iter().any(|call| call == "deps"));
}

#[tokio::test]
async fn test_changed_lock_fetches_dependencies_once_before_build() {
    let mut state = World::new(rev_a(), rev_b());
    state.remote_lock = LockDigest::of_bytes(b"v2");
    let world = shared(state);

    let outcome = updater(&world).run(&OutputManager::quiet()).await.unwrap();

    assert!(matches!(
        outcome,
        UpdateOutcome::Updated {
            dependencies_fetched: true,
            ..
        }
    ));
    let calls = calls(&world);
    assert_eq!(calls.iter().filter(|call| *call == "deps").count(), 1);
    let deps = calls.iter().position(|call| call == "deps").unwrap();
    let build = calls.iter().position(|call| call == "build").unwrap();
    assert!(deps < build);
}

#[tokio::test]
async fn test_lock_file_appearing_counts_as_change() {
    let mut state = World::new(rev_a(), rev_b());
    state.lock = LockDigest::Absent;
    let world = shared(state);

    updater(&world).run(&OutputManager::quiet()).await.unwrap();

    assert!(calls(&world).iter().any(|call| call == "deps"));
}

#[tokio::test]
async fn test_dependency_failure_stops_without_rollback() {
    let mut state = World::new(rev_a(), rev_b());
    state.remote_lock = LockDigest::of_bytes(b"v2");
    state.fail_deps = true;
    let world = shared(state);

    let err = updater(&world).run(&OutputManager::quiet()).await.unwrap_err();

    assert!(matches!(err, UpdateError::Build(BuildError::DependencyFetch { .. })));
    assert_eq!(world.lock().unwrap().head, rev_b());
    assert_eq!(calls(&world), ["fetch", "rebase", "deps"]);
}

#[tokio::test]
async fn test_migration_failure_keeps_tree_updated_and_skips_restart() {
    let mut state = World::new(rev_a(), rev_b());
    state.fail_migrate = true;
    let world = shared(state);

    let err = updater(&world).run(&OutputManager::quiet()).await.unwrap_err();

    assert!(matches!(err, UpdateError::Build(BuildError::Migrate { .. })));
    assert_ne!(err.exit_code(), 0);
    let world = world.lock().unwrap();
    assert_eq!(world.head, rev_b());
    assert!(world.marked.is_none());
    assert!(world.scheduled.is_empty());
    assert!(!world.calls.iter().any(|call| call.starts_with("reset")));
}

#[tokio::test]
async fn test_mark_failure_keeps_tree_updated_and_skips_restart() {
    let mut state = World::new(rev_a(), rev_b());
    state.fail_mark = true;
    let world = shared(state);

    let err = updater(&world).run(&OutputManager::quiet()).await.unwrap_err();

    assert!(matches!(
        err,
        UpdateError::Build(BuildError::MarkUpdating { ref revision, .. }) if *revision == rev_b()
    ));
    assert_ne!(err.exit_code(), 0);
    assert!(err.leaves_tree_advanced());
    let world = world.lock().unwrap();
    assert_eq!(world.head, rev_b());
    assert!(world.marked.is_none());
    assert!(world.scheduled.is_empty());
    assert_eq!(world.calls, ["fetch", "rebase", "build", "migrate", "mark"]);
}

#[tokio::test]
async fn test_end_to_end_marks_target_and_schedules_restart() {
    let world = shared(World::new(rev_a(), rev_b()));

    let outcome = updater(&world).run(&OutputManager::quiet()).await.unwrap();

    assert_eq!(
        outcome.summary(),
        format!("{} -> {}", "a".repeat(40), "b".repeat(40))
    );
    assert_eq!(outcome.current_revision(), &rev_b());
    match &outcome {
        UpdateOutcome::Updated { restart, .. } => {
            assert_eq!(*restart, RestartStatus::Scheduled(plan()));
        }
        other => panic!("expected Updated, got {:?}", other),
    }

    let world = world.lock().unwrap();
    assert_eq!(world.marked, Some(rev_b()));
    assert_eq!(world.scheduled, vec![plan()]);
    assert_eq!(
        world.calls,
        ["fetch", "rebase", "build", "migrate", "mark", "schedule"]
    );
}

#[tokio::test]
async fn test_without_restart_skips_scheduling() {
    let world = shared(World::new(rev_a(), rev_b()));

    let outcome = updater(&world)
        .without_restart()
        .run(&OutputManager::quiet())
        .await
        .unwrap();

    assert!(matches!(
        outcome,
        UpdateOutcome::Updated {
            restart: RestartStatus::Skipped,
            ..
        }
    ));
    assert!(world.lock().unwrap().scheduled.is_empty());
}

/// Service whose port frees up on the first check after stopping
#[derive(Default)]
struct FakeService {
    events: Mutex<Vec<&'static str>>,
}

impl ServiceManager for FakeService {
    fn service_name(&self) -> &str {
        "app"
    }

    async fn stop(&self) -> Result<()> {
        self.events.lock().unwrap().push("stop");
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        self.events.lock().unwrap().push("start");
        Ok(())
    }

    async fn is_port_in_use(&self, _port: u16) -> bool {
        self.events.lock().unwrap().push("probe");
        false
    }
}

#[tokio::test(start_paused = true)]
async fn test_run_returns_before_in_process_restart_happens() {
    let world = shared(World::new(rev_a(), rev_b()));
    let service = Arc::new(FakeService::default());
    let updater = Updater::new(
        FakeSource(Arc::clone(&world)),
        FakeBuild(Arc::clone(&world)),
        InProcessRestart::new(Arc::clone(&service)),
        plan(),
    );

    let outcome = updater.run(&OutputManager::quiet()).await.unwrap();
    assert_eq!(outcome.summary(), format!("{} -> {}", rev_a(), rev_b()));
    assert!(service.events.lock().unwrap().is_empty());

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(*service.events.lock().unwrap(), ["stop", "probe", "start"]);
}

#[tokio::test]
async fn test_scheduler_launch_failure_is_reported_after_marking() {
    struct BrokenScheduler;

    impl RestartScheduler for BrokenScheduler {
        fn schedule(&self, _plan: &RestartPlan) -> Result<()> {
            Err(ServiceError::Launch {
                service: "app".to_string(),
                reason: "fork failed".to_string(),
            }
            .into())
        }
    }

    let world = shared(World::new(rev_a(), rev_b()));
    let updater = Updater::new(
        FakeSource(Arc::clone(&world)),
        FakeBuild(Arc::clone(&world)),
        BrokenScheduler,
        plan(),
    );

    let err = updater.run(&OutputManager::quiet()).await.unwrap_err();

    assert!(matches!(err, UpdateError::Service(ServiceError::Launch { .. })));
    assert_eq!(world.lock().unwrap().marked, Some(rev_b()));
}
