// Integration tests for the session controller and background worker
//
// Workers run on in-process threads (ThreadSpawner) against a real
// FileChannel in a temporary directory, fed by scripted fakes.

mod common;

use chrono::{Duration as ChronoDuration, Utc};
use common::*;
use dictation_relay::coordination::{
    peek_json, write_json, CoordinationChannel, FileChannel, Reconciler, RecordKey, StatusRecord,
};
use dictation_relay::error::{DictationError, FailureKind};
use dictation_relay::recognizer::RecognizerProvider;
use dictation_relay::session::{
    SessionConfig, SessionController, SourceProvider, StartOutcome, ThreadSpawner, WorkerSpawner,
    NO_SPEECH,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use uuid::Uuid;

const WAIT: Duration = Duration::from_secs(5);

struct Harness {
    _dir: TempDir,
    channel: Arc<dyn CoordinationChannel>,
    spawner: Arc<ThreadSpawner>,
    controller: SessionController,
}

fn harness_on(
    dir: TempDir,
    channel: Arc<dyn CoordinationChannel>,
    sources: SourceProvider,
    recognizers: RecognizerProvider,
    stt_available: bool,
) -> Harness {
    harness_with_config(dir, channel, sources, recognizers, stt_available, test_session_config())
}

fn harness_with_config(
    dir: TempDir,
    channel: Arc<dyn CoordinationChannel>,
    sources: SourceProvider,
    recognizers: RecognizerProvider,
    stt_available: bool,
    config: SessionConfig,
) -> Harness {
    let spawner = Arc::new(ThreadSpawner::new(
        channel.clone(),
        sources,
        recognizers,
        config,
    ));
    let controller = SessionController::new(
        channel.clone(),
        spawner.clone() as Arc<dyn WorkerSpawner>,
        stt_available,
        Duration::from_secs(30),
    );
    Harness {
        _dir: dir,
        channel,
        spawner,
        controller,
    }
}

fn harness(sources: SourceProvider, recognizers: RecognizerProvider) -> Harness {
    let (dir, channel) = temp_channel();
    harness_on(dir, channel, sources, recognizers, true)
}

#[test]
fn test_partials_then_final_reports_final_text() {
    let fakes = Fakes::new();
    let h = harness(
        fakes.sources(3, AfterScript::Idle),
        fakes.recognizers(vec![
            partial("bon"),
            partial("bonjour"),
            final_text("bonjour monsieur"),
        ]),
    );

    assert!(matches!(h.controller.start().unwrap(), StartOutcome::Started(_)));
    assert!(wait_until(WAIT, || fakes.accepted() >= 3));
    assert!(h.controller.request_stop().unwrap());
    h.spawner.join_all();

    let record = h.controller.poll_final().unwrap().expect("final record");
    assert_eq!(record.text, "bonjour monsieur");
    assert!(!record.is_error());
    let stats = record.stats.expect("stats");
    assert_eq!(stats.partials, 2);
    assert_eq!(stats.finals, 1);
    assert!(stats.frames_processed >= 3);

    for key in [RecordKey::Status, RecordKey::Lock, RecordKey::Cancel, RecordKey::Partial] {
        assert!(!has(h.channel.as_ref(), key), "{} should be removed", key);
    }
    assert!(fakes.all_sources_closed());
}

#[test]
fn test_stop_without_frames_reports_no_speech() {
    let fakes = Fakes::new();
    let h = harness(fakes.sources(0, AfterScript::Idle), fakes.recognizers(vec![]));

    h.controller.start().unwrap();
    assert!(h.controller.request_stop().unwrap());
    h.spawner.join_all();

    let record = h.controller.poll_final().unwrap().expect("final record");
    assert_eq!(record.text, NO_SPEECH);
    assert!(!record.is_error());
}

#[test]
fn test_start_twice_spawns_one_worker() {
    let fakes = Fakes::new();
    let h = harness(fakes.sources(0, AfterScript::Idle), fakes.recognizers(vec![]));

    assert!(matches!(h.controller.start().unwrap(), StartOutcome::Started(_)));
    assert_eq!(h.controller.start().unwrap(), StartOutcome::AlreadyActive);
    assert!(wait_until(WAIT, || h.controller.is_active().unwrap()));
    assert_eq!(h.controller.start().unwrap(), StartOutcome::AlreadyActive);

    assert_eq!(h.spawner.spawned(), 1);
    assert_eq!(fakes.sources_opened.load(std::sync::atomic::Ordering::SeqCst), 1);

    h.controller.request_stop().unwrap();
    assert_eq!(h.spawner.join_all().len(), 1);
}

#[test]
fn test_poll_final_delivers_once() {
    let fakes = Fakes::new();
    let h = harness(fakes.sources(0, AfterScript::Idle), fakes.recognizers(vec![]));

    h.controller.start().unwrap();
    h.controller.request_stop().unwrap();
    h.spawner.join_all();

    assert!(h.controller.poll_final().unwrap().is_some());
    assert!(h.controller.poll_final().unwrap().is_none());
}

#[test]
fn test_final_written_exactly_once_after_repeated_stops() {
    let (dir, file_channel) = temp_channel();
    let recording = Arc::new(RecordingChannel::new(FileChannel::open(dir.path()).unwrap()));
    drop(file_channel);
    let fakes = Fakes::new();
    let h = harness_on(
        dir,
        recording.clone(),
        fakes.sources(2, AfterScript::Idle),
        fakes.recognizers(vec![final_text("un"), final_text("deux")]),
        true,
    );

    h.controller.start().unwrap();
    assert!(wait_until(WAIT, || fakes.accepted() >= 2));
    h.controller.request_stop().unwrap();
    // A second stop while finalizing is harmless.
    h.controller.request_stop().unwrap();
    h.spawner.join_all();

    assert_eq!(recording.writes_of(RecordKey::Final), 1);
    assert_eq!(h.controller.poll_final().unwrap().unwrap().text, "deux");
}

#[test]
fn test_model_unavailable_never_touches_records() {
    let fakes = Fakes::new();
    let (dir, channel) = temp_channel();
    let h = harness_on(
        dir,
        channel,
        fakes.sources(0, AfterScript::Idle),
        fakes.recognizers(vec![]),
        false,
    );

    let err = h.controller.start().unwrap_err();
    assert!(matches!(err, DictationError::ModelUnavailable(_)));
    assert_eq!(h.spawner.spawned(), 0);
    for key in RecordKey::ALL {
        assert!(!has(h.channel.as_ref(), key));
    }
}

#[test]
fn test_device_open_failure_reports_device_error() {
    let (dir, file_channel) = temp_channel();
    let recording = Arc::new(RecordingChannel::new(FileChannel::open(dir.path()).unwrap()));
    drop(file_channel);
    let fakes = Fakes::new();
    let h = harness_on(
        dir,
        recording.clone(),
        fakes.failing_sources(),
        fakes.recognizers(vec![]),
        true,
    );

    h.controller.start().unwrap();
    h.spawner.join_all();

    let record = h.controller.poll_final().unwrap().expect("final record");
    assert_eq!(record.error, Some(FailureKind::Device));
    assert!(record.text.contains("DeviceError"), "got {:?}", record.text);
    assert!(record.text.contains("no input device"));
    assert_eq!(recording.writes_of(RecordKey::Status), 0);
    assert!(!h.controller.is_active().unwrap());
    assert!(!has(h.channel.as_ref(), RecordKey::Lock));
}

#[test]
fn test_recognizer_error_ends_session_with_error() {
    let fakes = Fakes::new();
    let h = harness(
        fakes.sources(5, AfterScript::Idle),
        fakes.recognizers(vec![partial("bon"), Step::Fail("decoder crashed".to_string())]),
    );

    h.controller.start().unwrap();
    h.spawner.join_all();

    let record = h.controller.poll_final().unwrap().expect("final record");
    assert_eq!(record.error, Some(FailureKind::Recognition));
    assert!(record.text.contains("decoder crashed"));
    assert!(!h.controller.is_active().unwrap());
    assert!(!has(h.channel.as_ref(), RecordKey::Partial));
    assert!(fakes.all_sources_closed());
}

#[test]
fn test_recognizer_panic_is_contained() {
    let fakes = Fakes::new();
    let h = harness(
        fakes.sources(3, AfterScript::Idle),
        fakes.recognizers(vec![Step::Panic("index out of bounds".to_string())]),
    );

    h.controller.start().unwrap();
    let records = h.spawner.join_all();
    assert_eq!(records.len(), 1);

    let record = h.controller.poll_final().unwrap().expect("final record");
    assert_eq!(record.error, Some(FailureKind::Panic));
    assert!(record.text.contains("index out of bounds"));
    assert!(!h.controller.is_active().unwrap());
    assert!(!has(h.channel.as_ref(), RecordKey::Lock));
    assert!(fakes.all_sources_closed());
}

#[test]
fn test_device_fault_mid_stream_reports_device_error() {
    let fakes = Fakes::new();
    let h = harness(
        fakes.sources(2, AfterScript::Fail("device unplugged".to_string())),
        fakes.recognizers(vec![final_text("allo")]),
    );

    h.controller.start().unwrap();
    h.spawner.join_all();

    let record = h.controller.poll_final().unwrap().expect("final record");
    assert_eq!(record.error, Some(FailureKind::Device));
    assert!(record.text.contains("device unplugged"));
    assert!(fakes.all_sources_closed());
}

#[test]
fn test_partial_visible_while_recording() {
    let fakes = Fakes::new();
    let h = harness(
        fakes.sources(1, AfterScript::Idle),
        fakes.recognizers(vec![partial("bon")]),
    );

    h.controller.start().unwrap();
    assert!(wait_until(WAIT, || {
        h.controller.poll_partial().unwrap().as_deref() == Some("bon")
    }));
    // Peeking is non-destructive.
    assert_eq!(h.controller.poll_partial().unwrap().as_deref(), Some("bon"));

    h.controller.request_stop().unwrap();
    h.spawner.join_all();
    assert_eq!(h.controller.poll_partial().unwrap(), None);
    assert_eq!(h.controller.poll_final().unwrap().unwrap().text, "bon");
}

#[test]
fn test_stop_when_idle_is_noop() {
    let fakes = Fakes::new();
    let h = harness(fakes.sources(0, AfterScript::Idle), fakes.recognizers(vec![]));

    assert!(!h.controller.request_stop().unwrap());
    assert!(!has(h.channel.as_ref(), RecordKey::Cancel));
}

#[test]
fn test_orphaned_cancel_does_not_stop_next_session() {
    let fakes = Fakes::new();
    let h = harness(
        fakes.sources(1, AfterScript::Idle),
        fakes.recognizers(vec![final_text("encore")]),
    );
    h.channel.set_flag(RecordKey::Cancel).unwrap();

    h.controller.start().unwrap();
    assert!(wait_until(WAIT, || fakes.accepted() >= 1));
    assert!(h.controller.is_active().unwrap());

    h.controller.request_stop().unwrap();
    h.spawner.join_all();
    assert_eq!(h.controller.poll_final().unwrap().unwrap().text, "encore");
}

#[test]
fn test_sessions_run_back_to_back() {
    let fakes = Fakes::new();
    let h = harness(
        fakes.sources(1, AfterScript::Idle),
        fakes.recognizers(vec![final_text("premier"), final_text("second")]),
    );

    for (round, expected) in ["premier", "second"].into_iter().enumerate() {
        assert!(matches!(h.controller.start().unwrap(), StartOutcome::Started(_)));
        assert!(wait_until(WAIT, || fakes.accepted() > round));
        h.controller.request_stop().unwrap();
        h.spawner.join_all();
        assert_eq!(h.controller.poll_final().unwrap().unwrap().text, expected);
    }
    assert_eq!(h.spawner.spawned(), 2);
}

#[test]
fn test_shutdown_stops_in_process_workers() {
    let fakes = Fakes::new();
    let h = harness(fakes.sources(0, AfterScript::Idle), fakes.recognizers(vec![]));

    h.controller.start().unwrap();
    assert!(wait_until(WAIT, || h.controller.is_active().unwrap()));

    let records = h.spawner.shutdown();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].text, NO_SPEECH);
    assert!(!h.controller.is_active().unwrap());
}

#[test]
fn test_worker_refreshes_heartbeat() {
    let fakes = Fakes::new();
    let h = harness(fakes.sources(0, AfterScript::Idle), fakes.recognizers(vec![]));

    h.controller.start().unwrap();
    assert!(wait_until(WAIT, || h.controller.is_active().unwrap()));
    let first: StatusRecord = peek_json(h.channel.as_ref(), RecordKey::Status).unwrap().unwrap();

    assert!(wait_until(WAIT, || {
        match peek_json::<StatusRecord>(h.channel.as_ref(), RecordKey::Status) {
            Ok(Some(status)) => status.heartbeat_at > first.heartbeat_at,
            _ => false,
        }
    }));

    h.controller.request_stop().unwrap();
    h.spawner.join_all();
}

#[test]
fn test_stale_status_is_reconciled_into_interrupted_final() {
    let fakes = Fakes::new();
    let h = harness(fakes.sources(0, AfterScript::Idle), fakes.recognizers(vec![]));

    let session_id = Uuid::new_v4();
    let mut status = StatusRecord::new(session_id);
    status.heartbeat_at = Utc::now() - ChronoDuration::hours(1);
    status.pid = dead_pid();
    write_json(h.channel.as_ref(), RecordKey::Status, &status).unwrap();
    h.channel.write_value(RecordKey::Partial, "à moitié").unwrap();

    assert!(h.controller.is_active().unwrap());
    assert_eq!(h.controller.start().unwrap(), StartOutcome::AlreadyActive);

    let report = h.controller.reconcile().unwrap();
    assert!(report.stale_session);
    assert!(report.wrote_interrupted_final);
    assert!(report.removed_partial);
    assert!(!h.controller.is_active().unwrap());

    let record = h.controller.poll_final().unwrap().unwrap();
    assert_eq!(record.session_id, session_id);
    assert_eq!(record.error, Some(FailureKind::Interrupted));

    assert!(matches!(h.controller.start().unwrap(), StartOutcome::Started(_)));
    h.controller.request_stop().unwrap();
    h.spawner.join_all();
}

/// Stop a running session and return how long `status` took to disappear
fn time_stop(h: &Harness) -> Duration {
    let requested = Instant::now();
    assert!(h.controller.request_stop().unwrap());
    assert!(wait_until(WAIT, || !has(h.channel.as_ref(), RecordKey::Status)));
    requested.elapsed()
}

/// Poll timeout plus finalize time, with slack for a loaded test machine
fn stop_bound() -> Duration {
    test_session_config().poll_timeout * 5 + Duration::from_millis(400)
}

#[test]
fn test_stop_is_prompt_while_frames_stream() {
    let fakes = Fakes::new();
    let h = harness(fakes.sources(0, AfterScript::Stream), fakes.recognizers(vec![]));

    h.controller.start().unwrap();
    // Frames arrive every few ms, so the frame wait never times out.
    assert!(wait_until(WAIT, || fakes.accepted() >= 20));

    let elapsed = time_stop(&h);
    assert!(elapsed < stop_bound(), "stop took {:?}", elapsed);

    let record = h.controller.poll_final().unwrap().unwrap();
    assert_eq!(record.text, NO_SPEECH);
    h.spawner.join_all();
}

#[test]
fn test_stop_is_prompt_while_idle() {
    let fakes = Fakes::new();
    let h = harness(fakes.sources(0, AfterScript::Idle), fakes.recognizers(vec![]));

    h.controller.start().unwrap();
    assert!(wait_until(WAIT, || h.controller.is_active().unwrap()));

    let elapsed = time_stop(&h);
    assert!(elapsed < stop_bound(), "stop took {:?}", elapsed);
    assert!(h.controller.poll_final().unwrap().is_some());
    h.spawner.join_all();
}

#[test]
fn test_reconcile_leaves_running_worker_alone() {
    let fakes = Fakes::new();
    let (dir, channel) = temp_channel();
    // Heartbeat far slower than the staleness window used below.
    let config = SessionConfig {
        heartbeat_interval: Duration::from_secs(60),
        ..test_session_config()
    };
    let h = harness_with_config(
        dir,
        channel,
        fakes.sources(0, AfterScript::Idle),
        fakes.recognizers(vec![]),
        true,
        config,
    );

    h.controller.start().unwrap();
    assert!(wait_until(WAIT, || h.controller.is_active().unwrap()));
    std::thread::sleep(Duration::from_millis(1100));

    let report = Reconciler::new(h.channel.clone(), Duration::from_secs(1))
        .run()
        .unwrap();
    assert!(!report.stale_session);
    assert!(!report.wrote_interrupted_final);
    assert!(h.controller.is_active().unwrap());
    assert_eq!(h.controller.start().unwrap(), StartOutcome::AlreadyActive);

    assert!(h.controller.request_stop().unwrap());
    let records = h.spawner.join_all();
    assert_eq!(records.len(), 1);
    assert_eq!(fakes.sources_opened.load(Ordering::SeqCst), 1);
    assert_eq!(h.controller.poll_final().unwrap().unwrap().text, NO_SPEECH);
}
