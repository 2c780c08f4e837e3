//! Integration tests for the task dispatcher
//!
//! Covers:
//! - Exclusive assignment under sequential and concurrent calls
//! - Dependency and milestone gating
//! - Validation-gated completion and the error path
//! - Operator reset/skip and persistence across reopen
//! - Several stores sharing one task file, and failed writes

use scribe_batch::{BatchBuilder, FilePrioritizer};
use scribe_core::{
    Category, Dependency, ExpectedOutput, Milestone, ScanConfig, ScribeConfig, ScribeError, Task,
    TaskKind, TaskPayload, TaskStatus,
};
use scribe_tasks::{
    BlockReason, Dispatcher, JsonFileStorage, MemoryStorage, NextTask, Phase, Submission,
    TaskGenerator, TaskPersistence, TaskStore, ANALYSIS_TASK_ID,
};
use scribe_validation::Validator;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn file_task(id: &str, file: &str, priority: i32, dependency: Dependency) -> Task {
    let stem = file
        .rsplit('/')
        .next()
        .and_then(|name| name.split('.').next())
        .unwrap_or(file);
    Task::new(
        id,
        format!("Document {}", file),
        TaskPayload::FileProcessing {
            batch_id: format!("batch-{}", id),
            files: vec![file.to_string()],
            chunk: None,
            estimated_tokens: 100,
        },
        dependency,
    )
    .with_priority(priority)
    .with_expected_outputs(vec![ExpectedOutput::Pattern(format!("docs/**/{}*.md", stem))])
}

fn validator(root: &Path) -> Arc<Validator> {
    Arc::new(Validator::new(root, ScribeConfig::default().validation))
}

async fn dispatcher(root: &Path, tasks: Vec<Task>) -> Dispatcher {
    let storage: Arc<dyn TaskPersistence> = Arc::new(MemoryStorage::new());
    let store = TaskStore::create(storage, "demo", tasks).await.unwrap();
    Dispatcher::new(Arc::new(store), validator(root))
}

/// A dispatcher with its own store over `<root>/.scribe/tasks.json`
async fn open_dispatcher(root: &Path) -> Dispatcher {
    let store = TaskStore::open(Arc::new(JsonFileStorage::for_root(root)))
        .await
        .unwrap();
    Dispatcher::new(Arc::new(store), validator(root))
}

fn equal_priority_tasks(count: usize) -> Vec<Task> {
    (0..count)
        .map(|i| file_task(&format!("t{i}"), &format!("src/f{i}.rs"), 50, Dependency::None))
        .collect()
}

/// Write a document that passes the default checks for `source`
fn write_doc(root: &Path, rel: &str, source: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let body = format!(
        "# {source}\n\n## Overview\n\n{}\n\n## Errors\n\nFailures are returned to the caller.\n",
        format!("This page documents {source} and how it is used. ").repeat(6)
    );
    fs::write(path, body).unwrap();
}

fn assigned(next: NextTask) -> Task {
    match next {
        NextTask::Assigned(task) => task,
        other => panic!("expected an assigned task, got {:?}", other),
    }
}

#[tokio::test]
async fn test_sequential_calls_never_repeat_a_task() {
    let dir = TempDir::new().unwrap();
    let dispatcher = dispatcher(
        dir.path(),
        vec![
            file_task("a", "src/a.rs", 50, Dependency::None),
            file_task("b", "src/b.rs", 70, Dependency::None),
            file_task("c", "src/c.rs", 50, Dependency::None),
        ],
    )
    .await;

    let first = assigned(dispatcher.get_next_task().await.unwrap());
    let second = assigned(dispatcher.get_next_task().await.unwrap());
    let third = assigned(dispatcher.get_next_task().await.unwrap());

    // Highest priority first, then creation order
    assert_eq!(
        vec![first.id.as_str(), second.id.as_str(), third.id.as_str()],
        vec!["b", "a", "c"]
    );
    assert_eq!(first.status, TaskStatus::InProgress);
    assert!(first.started_at.is_some());
    assert_eq!(first.attempts, 1);

    match dispatcher.get_next_task().await.unwrap() {
        NextTask::Blocked(report) => {
            assert_eq!(report.reason, BlockReason::AwaitingSubmission);
            assert_eq!(report.in_progress.len(), 3);
        }
        other => panic!("expected blocked, got {:?}", other),
    }
}

#[tokio::test]
async fn test_concurrent_calls_never_share_a_task() {
    let dir = TempDir::new().unwrap();
    let dispatcher = Arc::new(dispatcher(dir.path(), equal_priority_tasks(5)).await);

    let mut handles = Vec::new();
    for _ in 0..12 {
        let dispatcher = Arc::clone(&dispatcher);
        handles.push(tokio::spawn(async move {
            dispatcher.get_next_task().await.unwrap()
        }));
    }

    let mut ids = Vec::new();
    for handle in handles {
        if let NextTask::Assigned(task) = handle.await.unwrap() {
            ids.push(task.id);
        }
    }
    let unique: HashSet<&String> = ids.iter().collect();
    assert_eq!(ids.len(), 5);
    assert_eq!(unique.len(), 5);
}

#[tokio::test]
async fn test_dependent_task_waits_for_completion() {
    let dir = TempDir::new().unwrap();
    let dispatcher = dispatcher(
        dir.path(),
        vec![
            file_task("base", "src/base.rs", 10, Dependency::None),
            file_task("child", "src/child.rs", 99, Dependency::Task("base".to_string())),
        ],
    )
    .await;

    // The higher-priority child is gated on its dependency
    let base = assigned(dispatcher.get_next_task().await.unwrap());
    assert_eq!(base.id, "base");

    match dispatcher.get_next_task().await.unwrap() {
        NextTask::Blocked(report) => {
            assert_eq!(report.waiting.len(), 1);
            assert_eq!(report.waiting[0].id, "child");
            assert!(report.waiting[0].unmet.contains("base"));
        }
        other => panic!("expected blocked, got {:?}", other),
    }

    write_doc(dir.path(), "docs/src/base.md", "base.rs");
    let outcome = dispatcher
        .submit_completion(Submission::new("base", vec!["docs/src/base.md".to_string()]))
        .await
        .unwrap();
    assert!(outcome.is_accepted(), "{:?}", outcome.validation().issues());

    let child = assigned(dispatcher.get_next_task().await.unwrap());
    assert_eq!(child.id, "child");
}

#[tokio::test]
async fn test_submit_on_pending_task_is_rejected_without_mutation() {
    let dir = TempDir::new().unwrap();
    let dispatcher = dispatcher(
        dir.path(),
        vec![file_task("a", "src/a.rs", 50, Dependency::None)],
    )
    .await;
    write_doc(dir.path(), "docs/a.md", "a.rs");
    let before = dispatcher.store().snapshot().await;

    let result = dispatcher
        .submit_completion(Submission::new("a", vec!["docs/a.md".to_string()]))
        .await;

    match result {
        Err(ScribeError::InvalidState {
            expected, actual, ..
        }) => {
            assert_eq!(expected, TaskStatus::InProgress);
            assert_eq!(actual, TaskStatus::Pending);
        }
        other => panic!("expected InvalidState, got {:?}", other),
    }
    assert_eq!(dispatcher.store().snapshot().await, before);
    assert_eq!(dispatcher.get_task("a").await.unwrap().status, TaskStatus::Pending);
}

#[tokio::test]
async fn test_submit_for_unknown_task_is_not_found() {
    let dir = TempDir::new().unwrap();
    let dispatcher = dispatcher(dir.path(), vec![]).await;

    let result = dispatcher
        .submit_completion(Submission::new("ghost", vec![]))
        .await;
    let err = result.unwrap_err();
    assert!(err.is_invalid_state());
    assert!(matches!(err, ScribeError::TaskNotFound(id) if id == "ghost"));
}

#[tokio::test]
async fn test_equal_priority_follows_creation_order() {
    let dir = TempDir::new().unwrap();
    let dispatcher = dispatcher(dir.path(), equal_priority_tasks(3)).await;

    let order: Vec<String> = [
        dispatcher.get_next_task().await.unwrap(),
        dispatcher.get_next_task().await.unwrap(),
        dispatcher.get_next_task().await.unwrap(),
    ]
    .into_iter()
    .map(|next| assigned(next).id)
    .collect();
    assert_eq!(order, vec!["t0", "t1", "t2"]);
}

#[tokio::test]
async fn test_stores_over_one_file_never_share_a_task() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    let storage: Arc<dyn TaskPersistence> = Arc::new(JsonFileStorage::for_root(root));
    TaskStore::create(storage, "demo", equal_priority_tasks(3))
        .await
        .unwrap();

    // Each store stands in for a separate `scribe next` process
    let first = open_dispatcher(root).await;
    let second = open_dispatcher(root).await;

    let a = assigned(first.get_next_task().await.unwrap());
    let b = assigned(second.get_next_task().await.unwrap());
    assert_eq!(a.id, "t0");
    assert_eq!(b.id, "t1");

    // A submission through one store is seen by the other
    write_doc(root, "docs/src/f0.md", "f0.rs");
    let outcome = second
        .submit_completion(Submission::new("t0", vec!["docs/src/f0.md".to_string()]))
        .await
        .unwrap();
    assert!(outcome.is_accepted(), "{:?}", outcome.validation().issues());

    let status = first.status().await.unwrap();
    assert_eq!(status.progress.completed, 1);
    assert_eq!(status.in_progress, vec!["t1"]);

    let saved = JsonFileStorage::for_root(root).load().await.unwrap().unwrap();
    assert_eq!(saved.completed, 1);
    assert_eq!(saved.get("t1").unwrap().status, TaskStatus::InProgress);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_stores_over_one_file_never_share_a_task() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().to_path_buf();
    let storage: Arc<dyn TaskPersistence> = Arc::new(JsonFileStorage::for_root(&root));
    TaskStore::create(storage, "demo", equal_priority_tasks(3))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..6 {
        let root = root.clone();
        handles.push(tokio::spawn(async move {
            open_dispatcher(&root).await.get_next_task().await.unwrap()
        }));
    }

    let mut ids = Vec::new();
    for handle in handles {
        if let NextTask::Assigned(task) = handle.await.unwrap() {
            ids.push(task.id);
        }
    }
    ids.sort();
    assert_eq!(ids, vec!["t0", "t1", "t2"]);
}

#[tokio::test]
async fn test_failed_write_leaves_claims_and_submissions_untouched() {
    let dir = TempDir::new().unwrap();
    let storage = Arc::new(MemoryStorage::new());
    let store = TaskStore::create(storage.clone(), "demo", equal_priority_tasks(2))
        .await
        .unwrap();
    let dispatcher = Dispatcher::new(Arc::new(store), validator(dir.path()));
    let before = dispatcher.store().snapshot().await;

    storage.fail_writes(true);
    assert!(matches!(
        dispatcher.get_next_task().await,
        Err(ScribeError::Io(_))
    ));
    assert_eq!(dispatcher.store().snapshot().await, before);
    assert_eq!(storage.saved().unwrap().progress.in_progress, 0);

    storage.fail_writes(false);
    let claimed = assigned(dispatcher.get_next_task().await.unwrap());
    assert_eq!(claimed.id, "t0");

    write_doc(dir.path(), "docs/src/f0.md", "f0.rs");
    storage.fail_writes(true);
    let submission = Submission::new("t0", vec!["docs/src/f0.md".to_string()]);
    assert!(dispatcher.submit_completion(submission.clone()).await.is_err());
    assert_eq!(dispatcher.get_task("t0").await.unwrap().status, TaskStatus::InProgress);
    assert_eq!(dispatcher.store().snapshot().await.completed, 0);

    storage.fail_writes(false);
    let outcome = dispatcher.submit_completion(submission).await.unwrap();
    assert!(outcome.is_accepted(), "{:?}", outcome.validation().issues());
}

#[tokio::test]
async fn test_blocked_answer_does_not_rewrite_the_task_list() {
    let dir = TempDir::new().unwrap();
    let storage = Arc::new(MemoryStorage::new());
    let store = TaskStore::create(storage.clone(), "demo", equal_priority_tasks(1))
        .await
        .unwrap();
    let dispatcher = Dispatcher::new(Arc::new(store), validator(dir.path()));
    assigned(dispatcher.get_next_task().await.unwrap());

    // Any write would now fail, so a Blocked answer proves nothing was saved
    storage.fail_writes(true);
    match dispatcher.get_next_task().await.unwrap() {
        NextTask::Blocked(report) => assert_eq!(report.reason, BlockReason::AwaitingSubmission),
        other => panic!("expected blocked, got {:?}", other),
    }
}

#[tokio::test]
async fn test_missing_output_moves_task_to_error() {
    let dir = TempDir::new().unwrap();
    let dispatcher = dispatcher(
        dir.path(),
        vec![file_task("svc", "src/user_service.rs", 50, Dependency::None)],
    )
    .await;
    assigned(dispatcher.get_next_task().await.unwrap());

    let outcome = dispatcher
        .submit_completion(
            Submission::new("svc", vec!["docs/src/user_service.md".to_string()])
                .with_notes("documented the public API"),
        )
        .await
        .unwrap();

    assert!(!outcome.is_accepted());
    let validation = outcome.validation();
    assert!(!validation.passed);
    assert!(validation.percentage < 70.0);
    assert!(validation
        .issues()
        .iter()
        .any(|i| i.contains("docs/src/user_service.md")));

    let task = outcome.task();
    assert_eq!(task.status, TaskStatus::Error);
    assert!(!task.errors.is_empty());
    assert_eq!(task.notes, vec!["documented the public API"]);
    assert_eq!(dispatcher.store().snapshot().await.completed, 0);

    match dispatcher.get_next_task().await.unwrap() {
        NextTask::Blocked(report) => assert_eq!(report.reason, BlockReason::ErroredTasks),
        other => panic!("expected blocked, got {:?}", other),
    }
}

#[tokio::test]
async fn test_reset_and_skip() {
    let dir = TempDir::new().unwrap();
    let dispatcher = dispatcher(
        dir.path(),
        vec![
            file_task("a", "src/a.rs", 50, Dependency::None),
            file_task("b", "src/b.rs", 40, Dependency::Task("a".to_string())),
        ],
    )
    .await;

    // Only errored tasks can be reset
    assert!(matches!(
        dispatcher.reset_task("a").await,
        Err(ScribeError::InvalidState { .. })
    ));

    assigned(dispatcher.get_next_task().await.unwrap());
    dispatcher
        .submit_completion(Submission::new("a", vec![]))
        .await
        .unwrap();
    assert_eq!(dispatcher.get_task("a").await.unwrap().status, TaskStatus::Error);

    let reset = dispatcher.reset_task("a").await.unwrap();
    assert_eq!(reset.status, TaskStatus::Pending);
    let again = assigned(dispatcher.get_next_task().await.unwrap());
    assert_eq!(again.id, "a");
    assert_eq!(again.attempts, 2);

    // In-progress tasks cannot be skipped; after failing again they can
    assert!(dispatcher.skip_task("a", "generated code").await.is_err());
    dispatcher
        .submit_completion(Submission::new("a", vec![]))
        .await
        .unwrap();
    let skipped = dispatcher.skip_task("a", "generated code").await.unwrap();
    assert_eq!(skipped.status, TaskStatus::Skipped);
    assert!(skipped.notes.iter().any(|n| n.contains("generated code")));

    // A skipped dependency lets the dependent run
    let b = assigned(dispatcher.get_next_task().await.unwrap());
    assert_eq!(b.id, "b");
}

#[tokio::test]
async fn test_dry_run_validation_does_not_change_state() {
    let dir = TempDir::new().unwrap();
    let dispatcher = dispatcher(
        dir.path(),
        vec![file_task("a", "src/a.rs", 50, Dependency::None)],
    )
    .await;
    write_doc(dir.path(), "docs/a.md", "a.rs");

    let result = dispatcher
        .validate_outputs("a", &["./docs/a.md".to_string()])
        .await
        .unwrap();
    assert!(result.passed, "{:?}", result.issues());
    assert_eq!(dispatcher.get_task("a").await.unwrap().status, TaskStatus::Pending);
}

#[tokio::test]
async fn test_analysis_becomes_eligible_after_file_tasks_complete() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    fs::create_dir_all(root.join("src/services")).unwrap();
    fs::write(root.join("src/main.rs"), "fn main() {\n    println!(\"hi\");\n}\n").unwrap();
    fs::write(
        root.join("src/services/user_service.rs"),
        "pub struct UserService;\n\nimpl UserService {\n    pub fn new() -> Self { Self }\n}\n",
    )
    .unwrap();

    let config = ScribeConfig::default();
    let scan = FilePrioritizer::new(&ScanConfig::default())
        .unwrap()
        .scan(root)
        .unwrap();
    let plan = BatchBuilder::new(&config.budget).build(root, &scan.files).await;
    let tasks = TaskGenerator::new(&config).generate(&plan);

    let storage: Arc<dyn TaskPersistence> = Arc::new(JsonFileStorage::for_root(root));
    let store = TaskStore::create(storage, "demo", tasks).await.unwrap();
    let dispatcher = Dispatcher::new(
        Arc::new(store),
        Arc::new(Validator::new(root, config.validation.clone())),
    );
    assert_eq!(dispatcher.status().await.unwrap().progress.phase, Phase::NotStarted);

    // Work through every file-processing task
    loop {
        let task = assigned(dispatcher.get_next_task().await.unwrap());
        if task.kind() != TaskKind::FileProcessing {
            assert_eq!(task.id, ANALYSIS_TASK_ID);
            assert_eq!(
                task.dependency,
                Dependency::Milestone(Milestone::AllCompleted(TaskKind::FileProcessing))
            );
            break;
        }

        let mut outputs = Vec::new();
        for (file, output) in task
            .payload
            .source_files()
            .iter()
            .zip(&task.instructions.output_patterns)
        {
            let name = file.rsplit('/').next().unwrap();
            write_doc(root, output, name);
            outputs.push(output.clone());
        }
        let outcome = dispatcher
            .submit_completion(Submission::new(task.id.clone(), outputs))
            .await
            .unwrap();
        assert!(outcome.is_accepted(), "{:?}", outcome.validation().issues());
    }

    let status = dispatcher.status().await.unwrap();
    assert_eq!(status.progress.phase, Phase::Analysis);
    assert_eq!(status.current.unwrap().id, ANALYSIS_TASK_ID);

    // State was persisted as it went
    let reopened = TaskStore::open(Arc::new(JsonFileStorage::for_root(root)))
        .await
        .unwrap();
    let analysis = reopened.get(ANALYSIS_TASK_ID).await.unwrap();
    assert_eq!(analysis.status, TaskStatus::InProgress);
}

#[tokio::test]
async fn test_completion_summary_when_everything_is_done() {
    let dir = TempDir::new().unwrap();
    let dispatcher = dispatcher(
        dir.path(),
        vec![
            file_task("a", "src/a.rs", 50, Dependency::None),
            Task::new(
                "module-other",
                "Module page",
                TaskPayload::ModuleCreation {
                    category: Category::Other,
                    files: vec!["src/a.rs".to_string()],
                },
                Dependency::Task("a".to_string()),
            ),
        ],
    )
    .await;

    assigned(dispatcher.get_next_task().await.unwrap());
    write_doc(dir.path(), "docs/a.md", "a.rs");
    dispatcher
        .submit_completion(Submission::new("a", vec!["docs/a.md".to_string()]))
        .await
        .unwrap();
    dispatcher.skip_task("module-other", "not needed").await.unwrap();

    match dispatcher.get_next_task().await.unwrap() {
        NextTask::Complete(summary) => {
            assert_eq!(summary.total, 2);
            assert_eq!(summary.completed, 1);
            assert_eq!(summary.skipped, 1);
            assert_eq!(summary.outputs, vec!["docs/a.md"]);
        }
        other => panic!("expected completion, got {:?}", other),
    }
    assert_eq!(dispatcher.status().await.unwrap().progress.phase, Phase::Complete);
}
