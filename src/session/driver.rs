//! SessionDriver: session orchestration and control loop.
//!
//! The driver validates the plan, spawns the sampling thread, and hands
//! back a [SessionHandle] the presentation layer drives. The sampling
//! thread exclusively owns the Sample Source, the FSM and the recorder;
//! everything externally visible travels over the broadcast event channel,
//! and control signals come in through atomics checked once per tick.
//! The terminal action (persist or discard) runs exactly once, always on
//! the sampling thread.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{info, warn};
use tokio::sync::broadcast;

use crate::config::SamplingConfig;
use crate::error::{log_storage_error, SessionError};
use crate::motion::{normalize, RepetitionTracker};
use crate::plan::Plan;
use crate::session::{SessionEvent, SessionRecorder, SessionSummary, SourceStatus, Ticker};
use crate::source::{SamplePoll, SampleSource};
use crate::storage::PendingStore;

const STOP_NONE: u8 = 0;
const STOP_ABANDON: u8 = 1;
const STOP_FORCED: u8 = 2;

#[derive(Debug)]
struct ControlFlags {
    paused: AtomicBool,
    stop: AtomicU8,
    score: AtomicU32,
}

/// Clears the driver's active flag when the sampling thread exits,
/// including by panic.
struct ActiveGuard(Arc<AtomicBool>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// How the sampling loop ended
enum Terminal {
    Natural,
    Forced,
    Abandon,
}

/// Orchestrates one session at a time over an owned Sample Source.
pub struct SessionDriver {
    sampling: SamplingConfig,
    store: PendingStore,
    active: Arc<AtomicBool>,
}

impl SessionDriver {
    pub fn new(sampling: SamplingConfig, store: PendingStore) -> Self {
        Self {
            sampling,
            store,
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start a session for `patient` under `plan`.
    ///
    /// The plan is validated first; an invalid plan refuses the session
    /// before the source is engaged. Only one session may run per driver.
    pub fn start(
        &self,
        plan: Plan,
        patient: impl Into<String>,
        source: Box<dyn SampleSource>,
    ) -> Result<SessionHandle, SessionError> {
        plan.validate()?;

        if self
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SessionError::AlreadyRunning);
        }

        let patient = patient.into();
        let (events, _) = broadcast::channel(self.sampling.event_channel_capacity);
        let flags = Arc::new(ControlFlags {
            paused: AtomicBool::new(false),
            stop: AtomicU8::new(STOP_NONE),
            score: AtomicU32::new(0),
        });

        info!(
            "[Driver] Starting session for {} (plan {}, target {} reps)",
            patient, plan.id, plan.target_repetitions
        );

        // Opened before the sampler thread exists so the first subscriber
        // cannot miss early events
        let preopened = events.subscribe();

        let join = {
            let events = events.clone();
            let flags = Arc::clone(&flags);
            let store = self.store.clone();
            let sampling = self.sampling.clone();
            let guard = ActiveGuard(Arc::clone(&self.active));
            thread::spawn(move || {
                let _guard = guard;
                sample_loop(plan, patient, source, sampling, store, flags, events)
            })
        };

        Ok(SessionHandle {
            events,
            preopened: Some(preopened),
            flags,
            join,
        })
    }
}

/// Control handle for one running session.
///
/// All methods are non-blocking except the consuming terminators, so the
/// presentation layer stays responsive regardless of sampling state.
#[derive(Debug)]
pub struct SessionHandle {
    events: broadcast::Sender<SessionEvent>,
    preopened: Option<broadcast::Receiver<SessionEvent>>,
    flags: Arc<ControlFlags>,
    join: JoinHandle<Result<Option<SessionSummary>, SessionError>>,
}

impl SessionHandle {
    /// Subscribe to the session event stream.
    ///
    /// The first call hands out a receiver opened before sampling began,
    /// so a session that ends quickly cannot slip its events past the
    /// subscriber. Later calls join the stream from now on.
    pub fn subscribe(&mut self) -> broadcast::Receiver<SessionEvent> {
        self.preopened
            .take()
            .unwrap_or_else(|| self.events.subscribe())
    }

    /// Pause sampling cooperatively. The session clock keeps running;
    /// recorded duration is wall-clock and includes pause time.
    pub fn pause(&self) {
        if !self.flags.paused.swap(true, Ordering::SeqCst) {
            let _ = self.events.send(SessionEvent::Paused);
        }
    }

    pub fn resume(&self) {
        if self.flags.paused.swap(false, Ordering::SeqCst) {
            let _ = self.events.send(SessionEvent::Resumed);
        }
    }

    /// Add presentation-layer score points to the session record.
    pub fn add_score(&self, points: u32) {
        self.flags.score.fetch_add(points, Ordering::SeqCst);
    }

    /// End the session early, persisting a record (Partial unless the
    /// target was already met). Blocks until the sampling thread stops.
    pub fn forced_finish(self) -> Result<SessionSummary, SessionError> {
        self.flags.stop.store(STOP_FORCED, Ordering::SeqCst);
        match join_sampler(self.join)? {
            Some(summary) => Ok(summary),
            None => Err(SessionError::NotRunning),
        }
    }

    /// Abandon the session: stop sampling and discard everything without
    /// persisting. If the session already completed naturally, its record
    /// stands and this is a no-op.
    pub fn abandon(self) -> Result<(), SessionError> {
        self.flags.stop.store(STOP_ABANDON, Ordering::SeqCst);
        match join_sampler(self.join)? {
            Some(summary) => {
                info!(
                    "[Driver] Abandon after natural completion; session {} already persisted",
                    summary.session_id
                );
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Block until the session completes naturally (target reached) and
    /// return its summary, or `None` if it was stopped by another path.
    pub fn wait(self) -> Result<Option<SessionSummary>, SessionError> {
        join_sampler(self.join)
    }
}

fn join_sampler(
    join: JoinHandle<Result<Option<SessionSummary>, SessionError>>,
) -> Result<Option<SessionSummary>, SessionError> {
    match join.join() {
        Ok(result) => result,
        Err(_) => {
            // Sampler panicked; the session is gone without a record
            Err(SessionError::NotRunning)
        }
    }
}

fn sample_loop(
    plan: Plan,
    patient: String,
    mut source: Box<dyn SampleSource>,
    sampling: SamplingConfig,
    store: PendingStore,
    flags: Arc<ControlFlags>,
    events: broadcast::Sender<SessionEvent>,
) -> Result<Option<SessionSummary>, SessionError> {
    let mut recorder = SessionRecorder::new(plan.clone(), patient);
    let mut tracker = RepetitionTracker::new(plan.target_repetitions);
    let mut ticker = Ticker::new(sampling.poll_hz);
    let read_timeout = Duration::from_millis(sampling.read_timeout_ms);
    // While paused, sleep one presentation tick so stop requests stay
    // responsive without busy-waiting
    let pause_nap = Ticker::new(sampling.presentation_hz).period();
    let mut status: Option<SourceStatus> = None;

    if let Err(err) = source.prepare(&plan) {
        warn!("[Driver] Device setup failed, starting degraded: {}", err);
        note_status(&mut status, SourceStatus::Degraded, &events);
    }

    let terminal = loop {
        match flags.stop.load(Ordering::SeqCst) {
            STOP_ABANDON => break Terminal::Abandon,
            STOP_FORCED => break Terminal::Forced,
            _ => {}
        }

        if flags.paused.load(Ordering::SeqCst) {
            thread::sleep(pause_nap);
            continue;
        }

        ticker.wait();
        match source.next_sample(read_timeout) {
            SamplePoll::Sample(reading) => {
                note_status(&mut status, SourceStatus::Live, &events);
                let t_s = recorder.record_sample(reading.angle, reading.force);
                let progress = normalize(reading.angle, plan.angle_min, plan.angle_max);
                let _ = events.send(SessionEvent::SampleRecorded {
                    t_s,
                    angle: reading.angle,
                    force: reading.force,
                    progress,
                });
                if let Some(rep) = tracker.process(progress) {
                    recorder.apply_counters(rep.counters);
                    let _ = events.send(SessionEvent::RepetitionCompleted {
                        outcome: rep.outcome,
                        counters: rep.counters,
                    });
                    if rep.session_complete {
                        break Terminal::Natural;
                    }
                }
            }
            SamplePoll::Timeout => {}
            SamplePoll::Disconnected => {
                // Degraded mode: keep the session alive without live data
                note_status(&mut status, SourceStatus::Degraded, &events);
            }
        }
    };

    if let Err(err) = source.release() {
        warn!("[Driver] Failed to release sample source: {}", err);
    }

    if let Terminal::Abandon = terminal {
        info!("[Driver] Session abandoned, discarding without persisting");
        let _ = events.send(SessionEvent::SessionDiscarded);
        return Ok(None);
    }

    recorder.add_score(flags.score.load(Ordering::SeqCst));
    let forced = matches!(terminal, Terminal::Forced);
    let Some(record) = recorder.finalize(forced) else {
        return Ok(None);
    };

    match store.persist(&record) {
        Ok(path) => {
            info!(
                "[Driver] Session {} persisted to {}",
                record.session_id,
                path.display()
            );
            let summary = record.summary();
            let _ = events.send(SessionEvent::SessionEnded {
                summary: summary.clone(),
            });
            Ok(Some(summary))
        }
        Err(err) => {
            log_storage_error(&err, "session persist");
            let _ = events.send(SessionEvent::PersistFailed {
                reason: err.to_string(),
            });
            Err(SessionError::Persistence(err))
        }
    }
}

fn note_status(
    current: &mut Option<SourceStatus>,
    observed: SourceStatus,
    events: &broadcast::Sender<SessionEvent>,
) {
    if *current != Some(observed) {
        *current = Some(observed);
        let _ = events.send(SessionEvent::SourceStatusChanged { status: observed });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{ExerciseType, Leg, PlanMode};
    use crate::session::SessionStatus;
    use crate::source::ScriptedSource;
    use crate::storage::Vault;
    use std::path::Path;

    fn plan(target: u32) -> Plan {
        Plan {
            id: 1,
            mode: PlanMode::Active,
            leg: Leg::Right,
            exercise: ExerciseType::Extension,
            spring: 2,
            angle_min: 0.0,
            angle_max: 90.0,
            target_repetitions: target,
        }
    }

    fn fast_sampling() -> SamplingConfig {
        SamplingConfig {
            poll_hz: 1000,
            read_timeout_ms: 1,
            presentation_hz: 1000,
            event_channel_capacity: 1024,
        }
    }

    fn driver(data_dir: &Path) -> SessionDriver {
        let vault = Vault::open(data_dir, "vault.key").unwrap();
        let store = PendingStore::new(data_dir, std::sync::Arc::new(vault));
        SessionDriver::new(fast_sampling(), store)
    }

    fn drain(mut rx: broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    // Two full excursions: 0 -> near max -> 0, twice
    const TWO_CORRECT_REPS: &[(f64, f64)] = &[
        (1.0, 0.1),
        (89.5, 1.0),
        (1.0, 0.1),
        (89.5, 1.0),
        (1.0, 0.1),
    ];

    #[test]
    fn test_natural_completion_persists_completed_record() {
        let dir = tempfile::tempdir().unwrap();
        let driver = driver(dir.path());
        let source = ScriptedSource::from_readings(TWO_CORRECT_REPS)
            .when_exhausted(crate::source::SamplePoll::Timeout);

        let mut handle = driver.start(plan(2), "ana", Box::new(source)).unwrap();
        let rx = handle.subscribe();
        let summary = handle.wait().unwrap().expect("natural completion");

        assert_eq!(summary.status, SessionStatus::Completed);
        assert_eq!(summary.repetitions, "2/2");
        assert_eq!(summary.correct, 2);

        let events = drain(rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, SessionEvent::SessionEnded { .. })));
        let reps = events
            .iter()
            .filter(|e| matches!(e, SessionEvent::RepetitionCompleted { .. }))
            .count();
        assert_eq!(reps, 2);

        let store = PendingStore::new(
            dir.path(),
            std::sync::Arc::new(Vault::open(dir.path(), "vault.key").unwrap()),
        );
        let pending = store.list("ana").unwrap();
        assert_eq!(pending.len(), 1);
        let record = store.read_record(&pending[0]).unwrap();
        assert_eq!(record.session_id, summary.session_id);
        assert_eq!(record.measurements.len(), TWO_CORRECT_REPS.len());
    }

    #[test]
    fn test_forced_finish_persists_partial_record() {
        let dir = tempfile::tempdir().unwrap();
        let driver = driver(dir.path());
        // One partial excursion, then silence
        let source = ScriptedSource::from_readings(&[(1.0, 0.1), (50.0, 1.0), (1.0, 0.1)])
            .when_exhausted(crate::source::SamplePoll::Timeout);

        let handle = driver.start(plan(5), "ana", Box::new(source)).unwrap();
        thread::sleep(Duration::from_millis(80));
        let summary = handle.forced_finish().unwrap();

        assert_eq!(summary.status, SessionStatus::Partial);
        assert_eq!(summary.repetitions, "1/5");
        assert_eq!(summary.partial, 1);

        let store = PendingStore::new(
            dir.path(),
            std::sync::Arc::new(Vault::open(dir.path(), "vault.key").unwrap()),
        );
        assert_eq!(store.list("ana").unwrap().len(), 1);
    }

    #[test]
    fn test_abandon_discards_without_persisting() {
        let dir = tempfile::tempdir().unwrap();
        let driver = driver(dir.path());
        let source = ScriptedSource::from_readings(&[(1.0, 0.1), (50.0, 1.0)])
            .when_exhausted(crate::source::SamplePoll::Timeout);

        let mut handle = driver.start(plan(5), "ana", Box::new(source)).unwrap();
        let rx = handle.subscribe();
        thread::sleep(Duration::from_millis(50));
        handle.abandon().unwrap();

        let events = drain(rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, SessionEvent::SessionDiscarded)));
        assert!(!events
            .iter()
            .any(|e| matches!(e, SessionEvent::SessionEnded { .. })));

        let store = PendingStore::new(
            dir.path(),
            std::sync::Arc::new(Vault::open(dir.path(), "vault.key").unwrap()),
        );
        assert!(store.list("ana").unwrap().is_empty());
    }

    #[test]
    fn test_disconnected_source_degrades_but_session_survives() {
        let dir = tempfile::tempdir().unwrap();
        let driver = driver(dir.path());
        let source = ScriptedSource::new(vec![]); // disconnected from the start

        let mut handle = driver.start(plan(5), "ana", Box::new(source)).unwrap();
        let rx = handle.subscribe();
        thread::sleep(Duration::from_millis(50));
        let summary = handle.forced_finish().unwrap();

        assert_eq!(summary.status, SessionStatus::Partial);
        assert_eq!(summary.repetitions, "0/5");

        let events = drain(rx);
        assert!(events.iter().any(|e| matches!(
            e,
            SessionEvent::SourceStatusChanged {
                status: SourceStatus::Degraded
            }
        )));
    }

    #[test]
    fn test_invalid_plan_refuses_start() {
        let dir = tempfile::tempdir().unwrap();
        let driver = driver(dir.path());
        let source = ScriptedSource::new(vec![]);

        let bad = Plan {
            target_repetitions: 0,
            ..plan(1)
        };
        let err = driver.start(bad, "ana", Box::new(source)).unwrap_err();
        assert!(matches!(err, SessionError::InvalidPlan { .. }));
    }

    #[test]
    fn test_second_session_rejected_while_active() {
        let dir = tempfile::tempdir().unwrap();
        let driver = driver(dir.path());

        let handle = driver
            .start(plan(5), "ana", Box::new(ScriptedSource::new(vec![])))
            .unwrap();
        let err = driver
            .start(plan(5), "ana", Box::new(ScriptedSource::new(vec![])))
            .unwrap_err();
        assert!(matches!(err, SessionError::AlreadyRunning));
        handle.abandon().unwrap();
    }

    #[test]
    fn test_pause_resume_events_emitted_once() {
        let dir = tempfile::tempdir().unwrap();
        let driver = driver(dir.path());
        let mut handle = driver
            .start(plan(5), "ana", Box::new(ScriptedSource::new(vec![])))
            .unwrap();
        let rx = handle.subscribe();

        handle.pause();
        handle.pause();
        handle.resume();
        handle.resume();
        handle.abandon().unwrap();

        let events = drain(rx);
        let paused = events
            .iter()
            .filter(|e| matches!(e, SessionEvent::Paused))
            .count();
        let resumed = events
            .iter()
            .filter(|e| matches!(e, SessionEvent::Resumed))
            .count();
        assert_eq!(paused, 1);
        assert_eq!(resumed, 1);
    }

    #[test]
    fn test_score_flows_into_the_record() {
        let dir = tempfile::tempdir().unwrap();
        let driver = driver(dir.path());
        let handle = driver
            .start(plan(5), "ana", Box::new(ScriptedSource::new(vec![])))
            .unwrap();
        handle.add_score(3);
        handle.add_score(5);
        thread::sleep(Duration::from_millis(20));
        let summary = handle.forced_finish().unwrap();
        assert_eq!(summary.score, 8);
    }

    #[test]
    fn test_persist_failure_surfaces_to_control() {
        let dir = tempfile::tempdir().unwrap();
        // Make the pending root an existing *file* so directory creation fails
        let blocked = dir.path().join("blocked");
        std::fs::write(&blocked, b"not a dir").unwrap();
        let vault = Vault::open(dir.path(), "vault.key").unwrap();
        let store = PendingStore::new(&blocked, std::sync::Arc::new(vault));
        let driver = SessionDriver::new(fast_sampling(), store);

        let mut handle = driver
            .start(plan(5), "ana", Box::new(ScriptedSource::new(vec![])))
            .unwrap();
        let rx = handle.subscribe();
        thread::sleep(Duration::from_millis(20));
        let err = handle.forced_finish().unwrap_err();
        assert!(matches!(err, SessionError::Persistence(_)));

        let events = drain(rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, SessionEvent::PersistFailed { .. })));
    }

    #[test]
    fn test_duration_includes_pause_time() {
        let dir = tempfile::tempdir().unwrap();
        let driver = driver(dir.path());
        let handle = driver
            .start(plan(5), "ana", Box::new(ScriptedSource::new(vec![])))
            .unwrap();

        handle.pause();
        thread::sleep(Duration::from_millis(1100));
        handle.resume();
        let summary = handle.forced_finish().unwrap();

        // Wall-clock duration, pause included
        assert!(summary.duration_s >= 1, "duration_s = {}", summary.duration_s);
    }

    #[test]
    fn test_events_before_subscribe_are_not_lost() {
        let dir = tempfile::tempdir().unwrap();
        let driver = driver(dir.path());
        let source = ScriptedSource::from_readings(TWO_CORRECT_REPS)
            .when_exhausted(crate::source::SamplePoll::Timeout);

        let mut handle = driver.start(plan(2), "ana", Box::new(source)).unwrap();
        // Let the session run to completion before anyone subscribes
        thread::sleep(Duration::from_millis(100));
        let rx = handle.subscribe();
        handle.wait().unwrap().expect("natural completion");

        let events = drain(rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, SessionEvent::SessionEnded { .. })));
    }

    struct PanickingSource;

    impl SampleSource for PanickingSource {
        fn next_sample(&mut self, _timeout: Duration) -> SamplePoll {
            panic!("sampler blew up");
        }

        fn release(&mut self) -> Result<(), crate::error::TransportError> {
            Ok(())
        }
    }

    #[test]
    fn test_driver_recovers_after_sampler_panic() {
        let dir = tempfile::tempdir().unwrap();
        let driver = driver(dir.path());

        let handle = driver
            .start(plan(5), "ana", Box::new(PanickingSource))
            .unwrap();
        assert!(matches!(handle.wait(), Err(SessionError::NotRunning)));

        // The active flag must be clear again so a new session can start
        let handle = driver
            .start(plan(5), "ana", Box::new(ScriptedSource::new(vec![])))
            .unwrap();
        handle.abandon().unwrap();
    }

    struct FailingSetupSource;

    impl SampleSource for FailingSetupSource {
        fn prepare(&mut self, _plan: &Plan) -> Result<(), crate::error::TransportError> {
            Err(crate::error::TransportError::SetupFailed {
                reason: "link rejected setup".to_string(),
            })
        }

        fn next_sample(&mut self, _timeout: Duration) -> SamplePoll {
            SamplePoll::Timeout
        }

        fn release(&mut self) -> Result<(), crate::error::TransportError> {
            Ok(())
        }
    }

    #[test]
    fn test_failed_device_setup_degrades_but_session_runs() {
        let dir = tempfile::tempdir().unwrap();
        let driver = driver(dir.path());

        let mut handle = driver
            .start(plan(5), "ana", Box::new(FailingSetupSource))
            .unwrap();
        let rx = handle.subscribe();
        thread::sleep(Duration::from_millis(20));
        let summary = handle.forced_finish().unwrap();

        assert_eq!(summary.repetitions, "0/5");
        let events = drain(rx);
        assert!(events.iter().any(|e| matches!(
            e,
            SessionEvent::SourceStatusChanged {
                status: SourceStatus::Degraded
            }
        )));
    }
}
