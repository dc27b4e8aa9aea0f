//! The acquisition loop: one receiver multiplexed across the channel
//! schedule, one window at a time.
//!
//! The primary channel is worth lingering on (other stations share it), so
//! only timing predicates end a primary window. The secondary beacon repeats
//! on a known interval, so its windows end as soon as the fix is heard, or
//! once the expected instant is missed by more than the tolerance.

use chrono::{DateTime, Duration, Utc};
use log::{debug, error, info, warn};
use strum_macros::Display;

use crate::export::{TrackExporter, TrackPoint};
use crate::history::History;
use crate::kinematics::Kinematics;
use crate::receiver::Backend;
use crate::scheduler::plan::{ChannelSchedule, ExpectedBroadcast};
use crate::scheduler::status::{Presenter, Status};
use crate::telemetry;

/// Per-window listening budget.
const WINDOW_TIMEOUT_S: i64 = 5 * 60;
/// Half-width of the window around the expected secondary broadcast.
const TOLERANCE_S: i64 = 10;
/// The single suspension point per tick; keeps the presenter responsive
/// without busy-waiting.
const POLL_INTERVAL: std::time::Duration = std::time::Duration::from_millis(500);
/// Pause after a pipeline death so a crashing pipeline is not relaunched in
/// a tight loop.
const RESTART_COOLDOWN: std::time::Duration = std::time::Duration::from_millis(500);

/// Why an acquisition window closed. Every cause advances the schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ExitCause {
    /// The per-window budget elapsed.
    Timeout,
    /// The secondary broadcast is due soon; leaving the primary early.
    Approaching,
    /// The secondary broadcast never arrived within tolerance.
    Missed,
    /// Own-station fix heard on the secondary channel.
    Acquired,
    /// The external pipeline exited (or failed to start).
    PipelineDied,
}

pub struct Scheduler<B: Backend> {
    backend: B,
    schedule: ChannelSchedule,
    /// The secondary channel's frequency, when the schedule includes one.
    secondary_hz: Option<u32>,
    expected: ExpectedBroadcast,
    history: History,
    kinematics: Kinematics,
    exporter: Box<dyn TrackExporter>,
    presenter: Box<dyn Presenter>,
    window_timeout: Duration,
    poll_interval: std::time::Duration,
    cooldown: std::time::Duration,
}

impl<B: Backend> Scheduler<B> {
    pub fn new(
        backend: B,
        schedule: ChannelSchedule,
        secondary_hz: Option<u32>,
        interval: Duration,
        history: History,
        exporter: Box<dyn TrackExporter>,
        presenter: Box<dyn Presenter>,
    ) -> Self {
        Self {
            backend,
            schedule,
            secondary_hz,
            expected: ExpectedBroadcast::new(interval, Duration::seconds(TOLERANCE_S)),
            history,
            kinematics: Kinematics::new(),
            exporter,
            presenter,
            window_timeout: Duration::seconds(WINDOW_TIMEOUT_S),
            poll_interval: POLL_INTERVAL,
            cooldown: RESTART_COOLDOWN,
        }
    }

    pub fn run(&mut self) -> ! {
        loop {
            self.window();
        }
    }

    /// One acquisition window: start the pipeline on the current channel,
    /// ingest until an exit predicate fires, tear down, advance.
    pub fn window(&mut self) -> ExitCause {
        let frequency_hz = self.schedule.current();
        let start = Utc::now();
        let secondary = Some(frequency_hz) == self.secondary_hz;
        info!("Monitoring {} Hz", frequency_hz);

        let mut receiver = match self.backend.start(frequency_hz) {
            Ok(receiver) => receiver,
            Err(e) => {
                error!("Pipeline failed to start on {} Hz: {}", frequency_hz, e);
                std::thread::sleep(self.cooldown);
                self.close_window(frequency_hz, ExitCause::PipelineDied);
                return ExitCause::PipelineDied;
            }
        };

        let cause = loop {
            let now = Utc::now();
            if let Some(cause) = self.exit_cause(now, start, secondary) {
                break cause;
            }
            self.render(frequency_hz, start, now);

            if !receiver.is_alive() {
                error!("Receiver pipeline quit unexpectedly");
                std::thread::sleep(self.cooldown);
                break ExitCause::PipelineDied;
            }

            let Some(line) = receiver.try_recv(self.poll_interval) else {
                continue;
            };
            if let Some(cause) = self.ingest(&line, frequency_hz, secondary) {
                break cause;
            }
        };

        self.render(frequency_hz, start, Utc::now());
        // Blocks until both external processes are confirmed terminated.
        receiver.stop();
        self.close_window(frequency_hz, cause);
        cause
    }

    /// Exit predicates, evaluated once per tick.
    fn exit_cause(
        &self,
        now: DateTime<Utc>,
        start: DateTime<Utc>,
        secondary: bool,
    ) -> Option<ExitCause> {
        if now - start > self.window_timeout {
            return Some(ExitCause::Timeout);
        }
        if !secondary && self.expected.approaching(now) {
            return Some(ExitCause::Approaching);
        }
        if secondary && self.expected.missed(now) {
            return Some(ExitCause::Missed);
        }
        None
    }

    /// Decode and store one packet line. Returns an exit cause when the fix
    /// ends the window.
    fn ingest(&mut self, line: &str, frequency_hz: u32, secondary: bool) -> Option<ExitCause> {
        info!("Received packet {}", line);
        let message = match telemetry::decode(line, frequency_hz, Utc::now()) {
            Ok(message) => message,
            Err(e) => {
                error!("Dropping packet {:?}: {}", line, e);
                return None;
            }
        };

        let own = self.history.is_own(&message);
        if let Err(e) = self.history.append(message) {
            error!("Ledger append failed: {}", e);
        }
        if !own {
            return None;
        }

        self.export_track();

        if secondary {
            if !self.expected.is_set() {
                self.expected.initialize(Utc::now());
                debug!("Found initial beacon on {} Hz", frequency_hz);
            }
            return Some(ExitCause::Acquired);
        }
        None
    }

    fn export_track(&mut self) {
        let track: Vec<TrackPoint> = self
            .history
            .own_messages()
            .map(|m| TrackPoint {
                longitude_d: m.longitude_d,
                latitude_d: m.latitude_d,
                altitude_m: m.altitude_m,
            })
            .collect();
        let call_sign = self.history.own_call_sign().to_string();
        if let Err(e) = self.exporter.export(&call_sign, &track) {
            warn!("Track export failed: {}", e);
        }
    }

    fn render(&mut self, frequency_hz: u32, start: DateTime<Utc>, now: DateTime<Utc>) {
        let estimate = self.kinematics.estimate(&mut self.history, now);
        self.presenter.render(&Status {
            frequency_hz,
            window_start: start,
            messages: self.history.messages(),
            estimate,
            falling: self.kinematics.falling(),
            expected_broadcast: self.expected.next(),
        });
    }

    /// Common tail of every exit path: log the cause, re-arm the expected
    /// broadcast beyond "now", and move to the next channel.
    fn close_window(&mut self, frequency_hz: u32, cause: ExitCause) {
        match cause {
            ExitCause::Timeout | ExitCause::Missed => match self.expected.next() {
                Some(next) => warn!(
                    "Gave up on {} Hz ({}), beacon was expected at {}",
                    frequency_hz,
                    cause,
                    next.format("%H:%M:%S")
                ),
                None => warn!("Gave up on {} Hz ({})", frequency_hz, cause),
            },
            ExitCause::Approaching => debug!("Approaching the expected beacon time"),
            ExitCause::Acquired => debug!("Heard our beacon on {} Hz", frequency_hz),
            ExitCause::PipelineDied => {}
        }

        self.expected.advance_past(Utc::now());
        if let Some(next) = self.expected.next() {
            debug!("Next expected beacon at {}", next.format("%H:%M:%S"));
        }
        self.schedule.advance();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::receiver::Receiver;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::io;
    use std::rc::Rc;

    const PRIMARY: u32 = 144_390_000;
    const SECONDARY: u32 = 432_560_000;
    const OWN_FIX: &str = "KE0FZV-11>APZ41N:!4000.00N/10500.00WO111/000/A=005280/S11T34V2317C00";
    const OTHER_FIX: &str = "W0RMT-9>APRS:!3900.00N/10400.00W>";

    struct FakeReceiver {
        lines: RefCell<VecDeque<String>>,
        alive: bool,
    }

    impl Receiver for FakeReceiver {
        fn is_alive(&self) -> bool {
            self.alive
        }
        fn try_recv(&self, _timeout: std::time::Duration) -> Option<String> {
            self.lines.borrow_mut().pop_front()
        }
        fn stop(&mut self) {}
    }

    struct FakeBackend {
        lines: Vec<&'static str>,
        alive: bool,
    }

    impl Backend for FakeBackend {
        fn start(&self, _frequency_hz: u32) -> io::Result<Box<dyn Receiver>> {
            Ok(Box::new(FakeReceiver {
                lines: RefCell::new(self.lines.iter().map(|s| s.to_string()).collect()),
                alive: self.alive,
            }))
        }
    }

    /// Records every export invocation.
    #[derive(Clone, Default)]
    struct RecordingExporter {
        calls: Rc<RefCell<Vec<usize>>>,
    }

    impl TrackExporter for RecordingExporter {
        fn export(&mut self, _call_sign: &str, track: &[TrackPoint]) -> io::Result<()> {
            self.calls.borrow_mut().push(track.len());
            Ok(())
        }
    }

    struct NullPresenter;
    impl Presenter for NullPresenter {
        fn render(&mut self, _status: &Status) {}
    }

    fn scheduler(
        backend: FakeBackend,
        frequencies: Vec<u32>,
        exporter: RecordingExporter,
    ) -> Scheduler<FakeBackend> {
        let secondary_hz = frequencies.contains(&SECONDARY).then_some(SECONDARY);
        let mut scheduler = Scheduler::new(
            backend,
            ChannelSchedule::new(frequencies),
            secondary_hz,
            Duration::seconds(250),
            History::new("KE0FZV".to_string(), None, None),
            Box::new(exporter),
            Box::new(NullPresenter),
        );
        // Keep the tests fast: empty fake inboxes should hit Timeout at once
        scheduler.poll_interval = std::time::Duration::from_millis(1);
        scheduler.cooldown = std::time::Duration::from_millis(1);
        scheduler
    }

    #[test]
    fn silent_primary_window_times_out_and_advances() {
        let exporter = RecordingExporter::default();
        let mut scheduler = scheduler(
            FakeBackend {
                lines: vec![],
                alive: true,
            },
            vec![PRIMARY, SECONDARY],
            exporter.clone(),
        );
        scheduler.window_timeout = Duration::zero();

        assert_eq!(scheduler.window(), ExitCause::Timeout);
        assert_eq!(scheduler.schedule.current(), SECONDARY);
        assert!(!scheduler.expected.is_set());
        assert!(exporter.calls.borrow().is_empty());
    }

    #[test]
    fn own_fix_on_primary_does_not_end_the_window() {
        let exporter = RecordingExporter::default();
        let mut scheduler = scheduler(
            FakeBackend {
                lines: vec![OWN_FIX, OTHER_FIX],
                alive: true,
            },
            vec![PRIMARY, SECONDARY],
            exporter.clone(),
        );
        // Give the loop just enough budget to drain both lines
        scheduler.window_timeout = Duration::milliseconds(200);

        assert_eq!(scheduler.window(), ExitCause::Timeout);
        assert_eq!(scheduler.history.messages().len(), 2);
        // The export side effect fired for the own fix only
        assert_eq!(*exporter.calls.borrow(), vec![1]);
    }

    #[test]
    fn first_secondary_fix_bootstraps_the_expected_broadcast() {
        let exporter = RecordingExporter::default();
        let mut scheduler = scheduler(
            FakeBackend {
                lines: vec![OTHER_FIX, OWN_FIX],
                alive: true,
            },
            vec![SECONDARY],
            exporter.clone(),
        );

        let before = Utc::now();
        assert_eq!(scheduler.window(), ExitCause::Acquired);
        let next = scheduler.expected.next().expect("bootstrap sets the cycle");
        // now + interval, give or take the test's own runtime
        let offset = next - before;
        assert!(offset >= Duration::seconds(250) && offset < Duration::seconds(260));
        assert_eq!(*exporter.calls.borrow(), vec![1]);
    }

    #[test]
    fn overdue_secondary_window_exits_missed() {
        let exporter = RecordingExporter::default();
        let mut scheduler = scheduler(
            FakeBackend {
                lines: vec![],
                alive: true,
            },
            vec![PRIMARY, SECONDARY],
            exporter,
        );
        scheduler.schedule.advance(); // onto the secondary channel
        scheduler
            .expected
            .set_next(Utc::now() - Duration::seconds(60));

        assert_eq!(scheduler.window(), ExitCause::Missed);
        // advance_past re-armed the cycle beyond now
        assert!(!scheduler.expected.missed(Utc::now()));
        assert_eq!(scheduler.schedule.current(), PRIMARY);
    }

    #[test]
    fn imminent_broadcast_ends_a_primary_window_early() {
        let exporter = RecordingExporter::default();
        let mut scheduler = scheduler(
            FakeBackend {
                lines: vec![],
                alive: true,
            },
            vec![PRIMARY, SECONDARY],
            exporter,
        );
        scheduler
            .expected
            .set_next(Utc::now() + Duration::seconds(5));

        assert_eq!(scheduler.window(), ExitCause::Approaching);
        assert_eq!(scheduler.schedule.current(), SECONDARY);
    }

    #[test]
    fn dead_pipeline_ends_the_window_and_advances() {
        let exporter = RecordingExporter::default();
        let mut scheduler = scheduler(
            FakeBackend {
                lines: vec![],
                alive: false,
            },
            vec![PRIMARY, SECONDARY],
            exporter,
        );

        assert_eq!(scheduler.window(), ExitCause::PipelineDied);
        assert_eq!(scheduler.schedule.current(), SECONDARY);
    }

    #[test]
    fn undecodable_lines_are_dropped_and_the_window_continues() {
        let exporter = RecordingExporter::default();
        let mut scheduler = scheduler(
            FakeBackend {
                lines: vec!["complete garbage", OWN_FIX],
                alive: true,
            },
            vec![SECONDARY],
            exporter,
        );

        assert_eq!(scheduler.window(), ExitCause::Acquired);
        assert_eq!(scheduler.history.messages().len(), 1);
    }
}
