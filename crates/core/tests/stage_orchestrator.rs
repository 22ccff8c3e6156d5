//! Integration tests for the stage orchestrator.
//!
//! These tests run the real stages against fake bwa, samtools and java
//! scripts and verify that the StageManager:
//! - Rejects invalid parameters without creating a task
//! - Runs steps in order with the exact tool command lines
//! - Writes the completion marker only after a successful run
//! - Cancels before or during a tool run
//! - Serves Op/Event requests through `run_service`

mod common;

use common::*;
use gxp_core::orchestrator::{run_service, StageError, StageManager, TIMESTAMP_FORMAT};
use gxp_core::project::store::keys;
use gxp_core::project::{ProjectHandle, ProjectRegistry};
use gxp_core::stages::params::names;
use gxp_protocol::ipc::{Event, Op};
use gxp_protocol::stage_models::{CompletionStatus, StageCode};
use gxp_protocol::task_models::{FailureKind, TaskStatus};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

async fn open(project: &SampleProject) -> ProjectHandle {
    ProjectRegistry::new()
        .open(project.dir())
        .await
        .expect("open project")
}

fn completion(project: &SampleProject, stage: &str) -> CompletionStatus {
    project.config().completion(&StageCode::new(stage))
}

/// Scenario A: align without dbsnp is rejected before any task exists.
#[tokio::test]
async fn test_align_without_dbsnp_fails_validation() {
    let tools = FakeTools::new().unwrap();
    let project = SampleProject::new().unwrap();
    project.config().set(keys::FORWARD, "reads_R1.fastq").unwrap();
    let before = project.config_bytes();

    let (manager, mut events_rx) = manager(tools.settings());
    let handle = open(&project).await;

    let mut params = project.align_params();
    params.remove(names::DBSNP);

    let result = manager.start_stage(&handle, "align", params).await;

    match result {
        Err(StageError::Validation { missing }) => assert_eq!(missing, vec!["dbsnp"]),
        other => panic!("Expected a validation error, got: {other:?}"),
    }
    assert!(drain(&mut events_rx).is_empty(), "No event for a rejected stage");
    assert!(manager.active_tasks().await.is_empty());
    assert!(tools.calls().is_empty());
    assert_eq!(project.config_bytes(), before);
}

#[tokio::test]
async fn test_validation_lists_every_missing_parameter() {
    let tools = FakeTools::new().unwrap();
    let project = SampleProject::new().unwrap();
    let (manager, _events_rx) = manager(tools.settings());
    let handle = open(&project).await;

    let mut params = project
        .align_params()
        .with(keys::REVERSE, project.file("missing.fastq").to_string_lossy())
        .with(names::THREADS, "zero");
    params.remove(keys::FORWARD);

    let err = manager
        .start_stage(&handle, "align", params)
        .await
        .unwrap_err();

    match err {
        StageError::Validation { missing } => {
            assert_eq!(missing, vec!["forward", "reverse", "threads"]);
        }
        other => panic!("Expected a validation error, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_unknown_stage_is_rejected() {
    let tools = FakeTools::new().unwrap();
    let project = SampleProject::new().unwrap();
    let (manager, _events_rx) = manager(tools.settings());
    let handle = open(&project).await;

    let err = manager
        .start_stage(&handle, "assemble", project.index_params())
        .await
        .unwrap_err();

    assert!(matches!(err, StageError::UnknownStage(code) if code == "assemble"));
}

/// Scenario B: every tool exits 0, so the run succeeds and is recorded.
#[tokio::test]
async fn test_align_success_records_completion() {
    let tools = FakeTools::new().unwrap();
    let project = SampleProject::new().unwrap();
    project.index_genome().unwrap();

    let (manager, mut events_rx) = manager(tools.settings());
    let handle = open(&project).await;
    assert_eq!(completion(&project, "align"), CompletionStatus::Pending);

    let run = manager
        .start_stage(&handle, "align", project.align_params())
        .await
        .unwrap();
    let events = collect_until_terminal(&mut events_rx).await;
    let outcome = run.wait().await;

    assert_event_sequence(&events);
    assert_progress_monotonic(&events);
    assert_eq!(outcome.status, TaskStatus::Succeeded);
    assert_eq!(outcome.result_code, Some(0));

    let completed_at = outcome.completed_at.expect("completion timestamp");
    assert!(chrono::NaiveDateTime::parse_from_str(&completed_at, TIMESTAMP_FORMAT).is_ok());
    assert_eq!(
        completion(&project, "align"),
        CompletionStatus::Completed(completed_at.clone())
    );
    assert!(matches!(
        events.last(),
        Some(Event::TaskSucceeded { completed_at: at, .. }) if *at == completed_at
    ));

    let calls = tools.calls();
    let programs: Vec<&str> = calls
        .iter()
        .map(|line| line.split(' ').take(2).last().unwrap_or_default())
        .collect();
    assert_eq!(programs, vec!["mem", "sort", "index", "-jar", "-jar"]);
    assert!(calls[3].contains("-T BaseRecalibrator"));
    assert!(calls[4].contains("-T PrintReads"));

    // bwa mem stdout goes to the SAM file, stderr to the console
    let sam = std::fs::read_to_string(project.file("sample.sam")).unwrap();
    assert_eq!(sam, "bwa output\n");
    let output = output_text(&events);
    assert!(output.contains("bwa mem running"));
    assert!(!output.contains("bwa output"));
    assert!(output.contains("samtools output"));

    let log = std::fs::read_to_string(project.file("align.log")).unwrap();
    assert!(log.contains("bwa mem running"));

    let messages = messages(&events);
    assert_eq!(messages.last().map(String::as_str), Some("Finished"));
}

#[tokio::test]
async fn test_align_indexes_genome_when_needed() {
    let tools = FakeTools::new().unwrap();
    let project = SampleProject::new().unwrap();
    let (manager, mut events_rx) = manager(tools.settings());
    let handle = open(&project).await;

    let params = project.align_params().with(names::RECALIBRATE, "no");
    let run = manager.start_stage(&handle, "align", params).await.unwrap();
    collect_until_terminal(&mut events_rx).await;
    assert!(run.wait().await.is_success());

    let genome = project.genome();
    let bam = project.file("sample.bam");
    let calls = tools.calls();
    assert_eq!(calls.len(), 6, "calls: {calls:#?}");
    assert_eq!(
        calls[0],
        format!("bwa index -a bwtsw {}", genome.display())
    );
    assert_eq!(calls[1], format!("samtools faidx {}", genome.display()));
    assert_eq!(
        calls[2],
        format!(
            "java -jar {} R={} O={}",
            tools.tool(DICTIONARY_JAR).display(),
            genome.display(),
            project.file("genome.dict").display()
        )
    );
    assert!(calls[3].starts_with("bwa mem -t 2 -R @RG\\tID:sample\\tSM:sample\\tPL:ILLUMINA "));
    // Without recalibration the sorted BAM is the output
    assert_eq!(
        calls[4],
        format!(
            "samtools sort -@ 2 -o {} {}",
            bam.display(),
            project.file("sample.sam").display()
        )
    );
    assert_eq!(calls[5], format!("samtools index {}", bam.display()));
}

#[tokio::test]
async fn test_index_stage_argument_order() {
    let tools = FakeTools::new().unwrap();
    let project = SampleProject::new().unwrap();
    let (manager, mut events_rx) = manager(tools.settings());
    let handle = open(&project).await;

    let run = manager
        .start_stage(&handle, "index", project.index_params())
        .await
        .unwrap();
    collect_until_terminal(&mut events_rx).await;
    assert!(run.wait().await.is_success());

    let genome = project.genome();
    assert_eq!(
        tools.calls(),
        vec![
            format!("bwa index -a bwtsw {}", genome.display()),
            format!("samtools faidx {}", genome.display()),
            format!(
                "java -jar {} R={} O={}",
                tools.tool(DICTIONARY_JAR).display(),
                genome.display(),
                project.file("genome.dict").display()
            ),
        ]
    );
}

/// Scenario C: HaplotypeCaller exits 1, so the run fails and any previous
/// marker is removed.
#[tokio::test]
async fn test_call_failure_reports_exit_code() {
    let tools = FakeTools::new().unwrap();
    tools.fail("GenomeAnalysisTK-HaplotypeCaller", 1).unwrap();
    let project = SampleProject::new().unwrap();
    project.config().set("call_date", "2020-01-01 00:00:00").unwrap();

    let (manager, mut events_rx) = manager(tools.settings());
    let handle = open(&project).await;

    let run = manager
        .start_stage(&handle, "call", project.call_params())
        .await
        .unwrap();
    let events = collect_until_terminal(&mut events_rx).await;
    let outcome = run.wait().await;

    assert_eq!(outcome.status, TaskStatus::Failed);
    assert_eq!(outcome.result_code, Some(1));
    assert_eq!(outcome.failure, Some(FailureKind::ToolExit));
    assert_eq!(
        outcome.detail.as_deref(),
        Some("Step 'Calling variants' exited with code 1")
    );
    assert!(matches!(
        events.last(),
        Some(Event::TaskFailed {
            kind: FailureKind::ToolExit,
            result_code: Some(1),
            ..
        })
    ));
    assert_eq!(completion(&project, "call"), CompletionStatus::Pending);

    assert_eq!(
        tools.calls(),
        vec![format!(
            "java -jar {} -T HaplotypeCaller -R {} -I {} -o {} --dbsnp {}",
            tools.tool(GATK_JAR).display(),
            project.genome().display(),
            project.file("input.bam").display(),
            project.file("calls.vcf").display(),
            project.file("dbsnp.vcf").display()
        )]
    );
}

#[tokio::test]
async fn test_failed_step_skips_remaining_steps() {
    let tools = FakeTools::new().unwrap();
    tools.fail("samtools-sort", 3).unwrap();
    let project = SampleProject::new().unwrap();
    project.index_genome().unwrap();

    let (manager, mut events_rx) = manager(tools.settings());
    let handle = open(&project).await;

    let run = manager
        .start_stage(&handle, "align", project.align_params())
        .await
        .unwrap();
    collect_until_terminal(&mut events_rx).await;
    let outcome = run.wait().await;

    assert_eq!(outcome.result_code, Some(3));
    assert_eq!(tools.calls().len(), 2);
    assert_eq!(completion(&project, "align"), CompletionStatus::Pending);
}

/// Scenario D: cancelled before the tool starts, nothing is spawned.
#[tokio::test]
async fn test_mist_cancel_before_subprocess_starts() {
    let tools = FakeTools::new().unwrap();
    let project = SampleProject::new().unwrap();
    let (manager, mut events_rx) = manager(tools.settings());
    let handle = open(&project).await;

    // Single-threaded runtime: the worker cannot run before the cancel
    let run = manager
        .start_stage(&handle, "mist", project.mist_params())
        .await
        .unwrap();
    run.request_cancel();

    let events = collect_until_terminal(&mut events_rx).await;
    let outcome = run.wait().await;

    assert_eq!(outcome.status, TaskStatus::Cancelled);
    assert_eq!(outcome.result_code, None);
    assert!(matches!(events.last(), Some(Event::TaskCancelled { .. })));
    assert!(tools.calls().is_empty(), "No tool may run");
    assert_eq!(completion(&project, "mist"), CompletionStatus::Pending);
}

/// Scenario E: cancelling a running tool kills it.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_mist_cancel_kills_running_tool() {
    let tools = FakeTools::new().unwrap();
    tools.hang("mist").unwrap();
    let project = SampleProject::new().unwrap();
    project.config().set("mist_date", "2020-01-01 00:00:00").unwrap();

    let (manager, mut events_rx) = manager(tools.settings());
    let handle = open(&project).await;

    let run = manager
        .start_stage(&handle, "mist", project.mist_params())
        .await
        .unwrap();
    assert!(tools.wait_started("mist").await, "mist never started");
    assert_eq!(run.status(), TaskStatus::Running);

    run.request_cancel();
    run.request_cancel();

    let outcome = tokio::time::timeout(Duration::from_secs(5), run.wait())
        .await
        .expect("cancellation took too long");
    let events = collect_until_terminal(&mut events_rx).await;

    assert_eq!(outcome.status, TaskStatus::Cancelled);
    assert!(matches!(events.last(), Some(Event::TaskCancelled { .. })));
    assert_eq!(completion(&project, "mist"), CompletionStatus::Pending);
    assert_eq!(tools.calls().len(), 1);
}

#[tokio::test]
async fn test_missing_tool_is_not_an_exit_code() {
    let tools = FakeTools::new().unwrap();
    let project = SampleProject::new().unwrap();
    let mut settings = tools.settings();
    settings.tools.bwa = tools.tool("no-such-bwa");

    let (manager, mut events_rx) = manager(settings);
    let handle = open(&project).await;

    let run = manager
        .start_stage(&handle, "index", project.index_params())
        .await
        .unwrap();
    let events = collect_until_terminal(&mut events_rx).await;
    let outcome = run.wait().await;

    assert_eq!(outcome.status, TaskStatus::Failed);
    assert_eq!(outcome.result_code, None);
    assert_eq!(outcome.failure, Some(FailureKind::ToolNotFound));
    assert!(matches!(
        events.last(),
        Some(Event::TaskFailed {
            kind: FailureKind::ToolNotFound,
            result_code: None,
            ..
        })
    ));
    let detail = outcome.detail.unwrap_or_default();
    assert!(detail.starts_with("Tool not found"), "detail: {detail}");
    assert!(tools.calls().is_empty());
}

#[tokio::test]
async fn test_missing_jar_is_reported_as_missing_tool() {
    let tools = FakeTools::new().unwrap();
    let project = SampleProject::new().unwrap();
    let mut settings = tools.settings();
    settings.tools.mist = tools.tool("missing.jar");

    let (manager, mut events_rx) = manager(settings);
    let handle = open(&project).await;

    let run = manager
        .start_stage(&handle, "mist", project.mist_params())
        .await
        .unwrap();
    collect_until_terminal(&mut events_rx).await;
    let outcome = run.wait().await;

    assert_eq!(outcome.result_code, None);
    assert!(outcome.detail.unwrap_or_default().contains("missing.jar"));
    assert!(tools.calls().is_empty(), "java must not be started");
}

#[tokio::test]
async fn test_unrecorded_success_is_reported_as_failure() {
    let tools = FakeTools::new().unwrap();
    let project = SampleProject::new().unwrap();
    let (manager, mut events_rx) = manager(tools.settings());
    let handle = open(&project).await;
    project.block_config_writes().unwrap();

    let run = manager
        .start_stage(&handle, "call", project.call_params())
        .await
        .unwrap();
    let events = collect_until_terminal(&mut events_rx).await;
    let outcome = run.wait().await;

    assert_eq!(outcome.status, TaskStatus::Failed);
    assert_eq!(outcome.result_code, None);
    assert_eq!(outcome.completed_at, None);
    assert_eq!(outcome.failure, Some(FailureKind::CompletionNotRecorded));
    let detail = outcome.detail.unwrap_or_default();
    assert!(detail.starts_with("Failed to record completion"), "detail: {detail}");
    assert!(matches!(
        events.last(),
        Some(Event::TaskFailed {
            kind: FailureKind::CompletionNotRecorded,
            result_code: None,
            ..
        })
    ));

    let call = StageCode::new("call");
    assert_eq!(handle.lock().await.completion(&call), CompletionStatus::Pending);

    // The next write through the shared config must not persist a marker
    project.unblock_config_writes().unwrap();
    handle.lock().await.set("note", "retry later").unwrap();
    assert_eq!(completion(&project, "call"), CompletionStatus::Pending);
    assert_eq!(project.config().get("note"), Some("retry later"));
}

#[tokio::test]
async fn test_unremovable_marker_keeps_config_consistent() {
    let tools = FakeTools::new().unwrap();
    tools.fail("GenomeAnalysisTK-HaplotypeCaller", 1).unwrap();
    let project = SampleProject::new().unwrap();
    let (manager, mut events_rx) = manager(tools.settings());
    let handle = open(&project).await;
    handle
        .lock()
        .await
        .set("call_date", "2020-01-01 00:00:00")
        .unwrap();
    project.block_config_writes().unwrap();

    let run = manager
        .start_stage(&handle, "call", project.call_params())
        .await
        .unwrap();
    collect_until_terminal(&mut events_rx).await;
    let outcome = run.wait().await;

    // The tool failure is what gets reported
    assert_eq!(outcome.status, TaskStatus::Failed);
    assert_eq!(outcome.result_code, Some(1));
    assert_eq!(outcome.failure, Some(FailureKind::ToolExit));

    // The marker could not be removed from disk, so memory keeps it too
    assert_eq!(
        handle.lock().await.completion(&StageCode::new("call")),
        CompletionStatus::Completed("2020-01-01 00:00:00".to_string())
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_start_of_same_stage_is_rejected() {
    let tools = FakeTools::new().unwrap();
    tools.hang("mist").unwrap();
    let project = SampleProject::new().unwrap();
    let (manager, _events_rx) = manager(tools.settings());
    let handle = open(&project).await;

    let first = manager
        .start_stage(&handle, "mist", project.mist_params())
        .await
        .unwrap();
    assert!(manager.is_running(handle.dir(), "mist").await);

    let second = manager
        .start_stage(&handle, "mist", project.mist_params())
        .await;
    assert!(matches!(second, Err(StageError::AlreadyRunning { .. })));

    // Another stage of the same project may run alongside
    let call = manager
        .start_stage(&handle, "call", project.call_params())
        .await
        .unwrap();
    assert!(call.wait().await.is_success());

    assert!(manager.cancel(first.task_id()).await);
    assert_eq!(first.wait().await.status, TaskStatus::Cancelled);
    assert!(!manager.is_running(handle.dir(), "mist").await);
}

#[tokio::test]
async fn test_restart_after_failure() {
    let tools = FakeTools::new().unwrap();
    tools.fail("GenomeAnalysisTK", 2).unwrap();
    let project = SampleProject::new().unwrap();
    let (manager, _events_rx) = manager(tools.settings());
    let handle = open(&project).await;

    let failed = manager
        .start_stage(&handle, "call", project.call_params())
        .await
        .unwrap();
    assert_eq!(failed.wait().await.result_code, Some(2));

    std::fs::remove_file(tools.path().join("control/GenomeAnalysisTK.exit")).unwrap();

    let retried = manager
        .start_stage(&handle, "call", project.call_params())
        .await
        .unwrap();
    assert!(retried.wait().await.is_success());
    assert!(matches!(
        completion(&project, "call"),
        CompletionStatus::Completed(_)
    ));
}

#[tokio::test]
async fn test_dropped_prepared_stage_has_no_effect() {
    let tools = FakeTools::new().unwrap();
    let project = SampleProject::new().unwrap();
    let before = project.config_bytes();
    let (manager, mut events_rx) = manager(tools.settings());
    let handle = open(&project).await;

    let params = project
        .call_params()
        .with(keys::RECAL_BAM, project.file("recal.bam").to_string_lossy());
    let prepared = manager.prepare_stage(&handle, "recal", params).unwrap();
    assert_eq!(prepared.plan().len(), 2);
    drop(prepared);

    tokio::task::yield_now().await;
    assert!(drain(&mut events_rx).is_empty());
    assert!(manager.active_tasks().await.is_empty());
    assert!(tools.calls().is_empty());
    assert_eq!(project.config_bytes(), before);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_cancels_active_runs() {
    let tools = FakeTools::new().unwrap();
    tools.hang("mist").unwrap();
    let project = SampleProject::new().unwrap();
    let (manager, _events_rx) = manager(tools.settings());
    let handle = open(&project).await;

    let run = manager
        .start_stage(&handle, "mist", project.mist_params())
        .await
        .unwrap();
    assert!(tools.wait_started("mist").await);

    tokio::time::timeout(RUN_TIMEOUT, manager.shutdown())
        .await
        .expect("shutdown took too long");

    let outcome = run.outcome().expect("outcome published");
    assert_eq!(outcome.status, TaskStatus::Cancelled);
    assert!(manager.active_tasks().await.is_empty());
}

#[tokio::test]
async fn test_service_runs_stage_from_project_config() {
    let tools = FakeTools::new().unwrap();
    let project = SampleProject::new().unwrap();
    project
        .config()
        .set_all([
            (keys::GENOME, "genome.fa"),
            (keys::BAM, "input.bam"),
            (keys::VCF, "calls.vcf"),
        ])
        .unwrap();

    let mut settings = tools.settings();
    settings.references.dbsnp = Some(project.file("dbsnp.vcf"));

    let (events_tx, mut events_rx) = mpsc::channel(1024);
    let (ops_tx, ops_rx) = mpsc::channel(8);
    let manager = Arc::new(StageManager::new(settings, events_tx.clone()));
    let service = tokio::spawn(run_service(
        manager,
        Arc::new(ProjectRegistry::new()),
        ops_rx,
        events_tx,
    ));

    ops_tx
        .send(Op::StartStage {
            project: project.dir().to_path_buf(),
            stage: "call".to_string(),
            params: BTreeMap::new(),
        })
        .await
        .unwrap();

    let events = collect_until_terminal(&mut events_rx).await;
    assert_event_sequence(&events);
    assert!(matches!(events.last(), Some(Event::TaskSucceeded { .. })));

    let call = &tools.calls()[0];
    assert!(call.contains("-T HaplotypeCaller"));
    assert!(call.ends_with("dbsnp.vcf"));
    assert!(call.contains("calls.vcf --dbsnp"));

    ops_tx.send(Op::ListActiveTasks).await.unwrap();
    match events_rx.recv().await {
        Some(Event::ActiveTasks { tasks }) => assert!(tasks.is_empty()),
        other => panic!("Expected ActiveTasks, got: {other:?}"),
    }

    ops_tx.send(Op::Shutdown).await.unwrap();
    service.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_service_reports_rejections() {
    let tools = FakeTools::new().unwrap();
    let project = SampleProject::new().unwrap();

    let (events_tx, mut events_rx) = mpsc::channel(64);
    let (ops_tx, ops_rx) = mpsc::channel(8);
    let manager = Arc::new(StageManager::new(tools.settings(), events_tx.clone()));
    let service = tokio::spawn(run_service(
        manager,
        Arc::new(ProjectRegistry::new()),
        ops_rx,
        events_tx,
    ));

    let params = BTreeMap::from([(names::THRESHOLD.to_string(), "0".to_string())]);
    ops_tx
        .send(Op::StartStage {
            project: project.dir().to_path_buf(),
            stage: "mist".to_string(),
            params,
        })
        .await
        .unwrap();
    match events_rx.recv().await {
        Some(Event::ValidationFailed { stage, missing, .. }) => {
            assert_eq!(stage, "mist");
            assert_eq!(missing, vec!["bam", "ensembl", "mist", "threshold"]);
        }
        other => panic!("Expected ValidationFailed, got: {other:?}"),
    }

    ops_tx
        .send(Op::StartStage {
            project: project.file("no-such-project"),
            stage: "mist".to_string(),
            params: BTreeMap::new(),
        })
        .await
        .unwrap();
    assert!(matches!(
        events_rx.recv().await,
        Some(Event::StageRejected { .. })
    ));

    ops_tx
        .send(Op::StartStage {
            project: project.dir().to_path_buf(),
            stage: "assemble".to_string(),
            params: BTreeMap::new(),
        })
        .await
        .unwrap();
    match events_rx.recv().await {
        Some(Event::StageRejected { reason, .. }) => assert!(reason.contains("assemble")),
        other => panic!("Expected StageRejected, got: {other:?}"),
    }

    drop(ops_tx);
    service.await.unwrap().unwrap();
}
