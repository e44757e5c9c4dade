//! Reconnection supervisor: keeps a device session alive across replug
//! cycles and feeds decoded layer state to the publisher.
//!
//! The supervisor runs on a dedicated background thread that is the sole
//! owner of the transport, the open session, and the session state — the
//! display side only ever sees values published through the event channel,
//! so no locking exists around the device itself.

use crate::core::config::MonitorConfig;
use crate::core::publisher::StatePublisher;
use crate::hid::device::{
    Connection, DeviceFilter, HidTransport, ReadOutcome, Transport,
};
use crate::hid::protocol;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Granularity of cancellation checks inside a backoff sleep
const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Capped exponential retry delay.
///
/// `next()` starts at the initial interval and doubles up to the ceiling;
/// `reset()` is called after every successful open so one long outage never
/// slows down reconnection after the device returns.
#[derive(Debug)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Option<Duration>,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: None,
        }
    }

    /// Delay to sleep before the next attempt
    pub fn next(&mut self) -> Duration {
        let next = match self.current {
            None => self.initial,
            Some(previous) => previous.saturating_mul(2).min(self.max),
        };
        self.current = Some(next);
        next
    }

    pub fn reset(&mut self) {
        self.current = None;
    }
}

/// Connection lifecycle as observed by the supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Faulted,
}

/// Drives locate → open → read across the device's presence cycles
pub struct Monitor<T: Transport> {
    transport: T,
    publisher: StatePublisher,
    backoff: Backoff,
    read_timeout: Duration,
    stop: Arc<AtomicBool>,
    state: SessionState,
}

impl<T: Transport> Monitor<T> {
    pub fn new(
        transport: T,
        publisher: StatePublisher,
        config: &MonitorConfig,
        stop: Arc<AtomicBool>,
    ) -> Self {
        Self {
            transport,
            publisher,
            backoff: Backoff::new(
                Duration::from_millis(config.backoff_initial_ms),
                Duration::from_millis(config.backoff_max_ms),
            ),
            read_timeout: Duration::from_millis(config.read_timeout_ms),
            stop,
            state: SessionState::Disconnected,
        }
    }

    /// Run until the stop flag is raised. Any open session is released on
    /// the way out regardless of the state it was in.
    pub fn run(&mut self) {
        while !self.stopped() {
            let descriptor = match self.transport.find() {
                Some(descriptor) => descriptor,
                None => {
                    debug!("device not present");
                    self.wait_backoff();
                    continue;
                }
            };

            self.state = SessionState::Connecting;
            let session = match self.transport.open(&descriptor) {
                Ok(session) => session,
                Err(e) => {
                    // Busy/permission failures are retried like absence: the
                    // device may be released by another process, or udev
                    // rules may be fixed, without a replug.
                    warn!(
                        "failed to open {:04X}:{:04X}: {}",
                        descriptor.vendor_id, descriptor.product_id, e
                    );
                    self.state = SessionState::Faulted;
                    self.wait_backoff();
                    continue;
                }
            };

            self.backoff.reset();
            self.state = SessionState::Connected;
            info!("connected to {}", descriptor.product_name());
            self.publisher.announce_attached(descriptor.product_name());

            self.pump(session);
        }
        self.state = SessionState::Disconnected;
    }

    /// Read loop for one open session. Returns when the link drops or the
    /// stop flag is raised; either way the session is dropped here, which
    /// closes the OS handle exactly once.
    fn pump(&mut self, mut session: T::Conn) {
        loop {
            if self.stopped() {
                return;
            }
            match session.read_report(self.read_timeout) {
                ReadOutcome::Report(raw) => match protocol::decode(raw.bytes()) {
                    Ok(state) => self.publisher.publish(state),
                    Err(e) => {
                        // A single malformed or foreign report does not mean
                        // the link is dead: drop it and keep reading.
                        warn!("dropping undecodable report: {}", e);
                    }
                },
                ReadOutcome::Timeout => continue,
                ReadOutcome::Disconnected => break,
            }
        }

        info!("device disconnected");
        drop(session);
        self.state = SessionState::Disconnected;
        self.publisher.publish_lost();
    }

    /// Sleep the next backoff interval, in slices so a stop request is
    /// honored without waiting out the full delay.
    fn wait_backoff(&mut self) {
        let delay = self.backoff.next();
        debug!(delay_ms = delay.as_millis() as u64, "retrying after backoff");
        let mut remaining = delay;
        while !self.stopped() && remaining > Duration::ZERO {
            let slice = remaining.min(SLEEP_SLICE);
            thread::sleep(slice);
            remaining = remaining.saturating_sub(slice);
        }
    }

    fn stopped(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    #[cfg(test)]
    fn state(&self) -> SessionState {
        self.state
    }
}

/// Handle to a running monitor thread; stops and joins it on drop
pub struct MonitorHandle {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl MonitorHandle {
    /// Signal the monitor to stop and wait for its thread to exit
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Spawn the monitor on its own thread.
///
/// The hidapi context is created on the monitor thread so the HID handle
/// never leaves it.
pub fn spawn(
    filter: DeviceFilter,
    config: MonitorConfig,
    publisher: StatePublisher,
) -> MonitorHandle {
    let stop = Arc::new(AtomicBool::new(false));
    let thread_stop = Arc::clone(&stop);

    let thread = thread::spawn(move || {
        info!("layer monitor thread started");
        let transport = match HidTransport::new(filter) {
            Ok(transport) => transport,
            Err(e) => {
                error!("failed to initialize HID transport: {:#}", e);
                return;
            }
        };
        Monitor::new(transport, publisher, &config, thread_stop).run();
        info!("layer monitor thread stopped");
    });

    MonitorHandle {
        stop,
        thread: Some(thread),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::events::AppEvent;
    use crate::core::publisher::Subscription;
    use crate::hid::device::{DeviceDescriptor, OpenError, RawReport};
    use crate::hid::protocol::LayerState;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct Recorder {
        events: Arc<Mutex<Vec<AppEvent>>>,
    }

    impl Recorder {
        fn events(&self) -> Vec<AppEvent> {
            self.events.lock().unwrap().clone()
        }
    }

    impl Subscription for Recorder {
        fn deliver(&self, event: AppEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    /// Scripted session: pops one outcome per read, counts drops
    struct FakeSession {
        outcomes: VecDeque<ReadOutcome>,
        closed: Arc<AtomicUsize>,
    }

    impl Connection for FakeSession {
        fn read_report(&mut self, _timeout: Duration) -> ReadOutcome {
            self.outcomes
                .pop_front()
                .unwrap_or(ReadOutcome::Disconnected)
        }
    }

    impl Drop for FakeSession {
        fn drop(&mut self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// One step of a scripted transport run
    enum Step {
        Absent,
        OpenFails(OpenError),
        Session(Vec<ReadOutcome>),
    }

    /// Scripted transport: plays steps in order, raises the stop flag once
    /// the script is exhausted so `run()` terminates.
    struct FakeTransport {
        script: VecDeque<Step>,
        stop: Arc<AtomicBool>,
        closed: Arc<AtomicUsize>,
        find_calls: usize,
        pending_open: Option<Step>,
    }

    impl FakeTransport {
        fn new(script: Vec<Step>, stop: Arc<AtomicBool>) -> Self {
            Self {
                script: script.into(),
                stop,
                closed: Arc::new(AtomicUsize::new(0)),
                find_calls: 0,
                pending_open: None,
            }
        }

        fn descriptor() -> DeviceDescriptor {
            // Only the name is observed by the monitor
            DeviceDescriptor::fake("Svalboard")
        }
    }

    impl Transport for FakeTransport {
        type Conn = FakeSession;

        fn find(&mut self) -> Option<DeviceDescriptor> {
            self.find_calls += 1;
            match self.script.pop_front() {
                Some(Step::Absent) => None,
                Some(step) => {
                    self.pending_open = Some(step);
                    Some(Self::descriptor())
                }
                None => {
                    self.stop.store(true, Ordering::Relaxed);
                    None
                }
            }
        }

        fn open(&mut self, _descriptor: &DeviceDescriptor) -> Result<FakeSession, OpenError> {
            match self.pending_open.take() {
                Some(Step::OpenFails(e)) => Err(e),
                Some(Step::Session(outcomes)) => Ok(FakeSession {
                    outcomes: outcomes.into(),
                    closed: Arc::clone(&self.closed),
                }),
                _ => Err(OpenError::NotFound),
            }
        }
    }

    fn report(layer: u8) -> ReadOutcome {
        ReadOutcome::Report(RawReport::from_slice(&protocol::encode(
            &LayerState::base(layer),
        )))
    }

    fn fast_config() -> MonitorConfig {
        MonitorConfig {
            read_timeout_ms: 1,
            backoff_initial_ms: 1,
            backoff_max_ms: 4,
        }
    }

    fn run_script(script: Vec<Step>) -> (Vec<AppEvent>, usize, usize) {
        let stop = Arc::new(AtomicBool::new(false));
        let transport = FakeTransport::new(script, Arc::clone(&stop));
        let closed = Arc::clone(&transport.closed);

        let recorder = Recorder::default();
        let mut publisher = StatePublisher::new();
        publisher.attach(recorder.clone());

        let mut monitor = Monitor::new(transport, publisher, &fast_config(), stop);
        monitor.run();
        assert_eq!(monitor.state(), SessionState::Disconnected);

        let find_calls = monitor.transport.find_calls;
        (recorder.events(), closed.load(Ordering::SeqCst), find_calls)
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_millis(500));
        let delays: Vec<_> = (0..5).map(|_| backoff.next().as_millis()).collect();
        assert_eq!(delays, vec![100, 200, 400, 500, 500]);
        // Non-decreasing by construction
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_backoff_reset_restarts_at_initial() {
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_millis(500));
        backoff.next();
        backoff.next();
        backoff.reset();
        assert_eq!(backoff.next(), Duration::from_millis(100));
    }

    #[test]
    fn test_reconnects_after_n_absent_attempts() {
        let n = 3;
        let mut script: Vec<Step> = (0..n).map(|_| Step::Absent).collect();
        script.push(Step::Session(vec![report(1)]));
        let (events, _, find_calls) = run_script(script);

        // N absences each trigger one backoff, then the device is found
        assert_eq!(find_calls, n + 2); // +1 found, +1 post-session (exhausts script)
        assert!(matches!(events[0], AppEvent::DeviceAttached { .. }));
        assert!(matches!(events[1], AppEvent::LayerChanged(s) if s.layer == 1));
    }

    #[test]
    fn test_open_failure_is_retried() {
        let script = vec![
            Step::OpenFails(OpenError::Busy("claimed by another process".into())),
            Step::Session(vec![report(2)]),
        ];
        let (events, _, _) = run_script(script);

        assert!(matches!(events[0], AppEvent::DeviceAttached { .. }));
        assert!(matches!(events[1], AppEvent::LayerChanged(s) if s.layer == 2));
    }

    #[test]
    fn test_disconnect_mid_stream() {
        let script = vec![Step::Session(vec![
            report(1),
            report(2),
            ReadOutcome::Disconnected,
        ])];
        let (events, closed, _) = run_script(script);

        let kinds: Vec<&str> = events
            .iter()
            .map(|e| match e {
                AppEvent::DeviceAttached { .. } => "attached",
                AppEvent::LayerChanged(_) => "layer",
                AppEvent::SourceLost => "lost",
                AppEvent::TrayAction(_) => "tray",
            })
            .collect();
        assert_eq!(kinds, vec!["attached", "layer", "layer", "lost"]);
        assert_eq!(closed, 1);
    }

    #[test]
    fn test_duplicate_reports_deduplicated() {
        let script = vec![Step::Session(vec![
            report(1),
            report(1),
            report(1),
            ReadOutcome::Disconnected,
        ])];
        let (events, _, _) = run_script(script);

        let layer_events = events
            .iter()
            .filter(|e| matches!(e, AppEvent::LayerChanged(_)))
            .count();
        assert_eq!(layer_events, 1);
    }

    #[test]
    fn test_undecodable_report_keeps_session() {
        let script = vec![Step::Session(vec![
            ReadOutcome::Report(RawReport::from_slice(&[0x00, 0x03, 0x00])),
            report(3),
            ReadOutcome::Disconnected,
        ])];
        let (events, closed, _) = run_script(script);

        // The foreign report is dropped; the session keeps running and the
        // next good report still comes through.
        assert!(matches!(events[1], AppEvent::LayerChanged(s) if s.layer == 3));
        assert_eq!(closed, 1);
    }

    #[test]
    fn test_timeout_is_not_an_event() {
        let script = vec![Step::Session(vec![
            ReadOutcome::Timeout,
            ReadOutcome::Timeout,
            report(4),
            ReadOutcome::Disconnected,
        ])];
        let (events, _, _) = run_script(script);

        let layer_events = events
            .iter()
            .filter(|e| matches!(e, AppEvent::LayerChanged(_)))
            .count();
        assert_eq!(layer_events, 1);
    }

    #[test]
    fn test_stop_during_session_closes_handle_without_lost_event() {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_for_session = Arc::clone(&stop);

        // Raise the stop flag from within the read loop by scripting a
        // transport whose session flips it on the first read.
        struct StoppingSession {
            stop: Arc<AtomicBool>,
            closed: Arc<AtomicUsize>,
        }
        impl Connection for StoppingSession {
            fn read_report(&mut self, _timeout: Duration) -> ReadOutcome {
                self.stop.store(true, Ordering::Relaxed);
                ReadOutcome::Timeout
            }
        }
        impl Drop for StoppingSession {
            fn drop(&mut self) {
                self.closed.fetch_add(1, Ordering::SeqCst);
            }
        }
        struct OneShot {
            stop: Arc<AtomicBool>,
            closed: Arc<AtomicUsize>,
        }
        impl Transport for OneShot {
            type Conn = StoppingSession;
            fn find(&mut self) -> Option<DeviceDescriptor> {
                Some(DeviceDescriptor::fake("Svalboard"))
            }
            fn open(&mut self, _d: &DeviceDescriptor) -> Result<StoppingSession, OpenError> {
                Ok(StoppingSession {
                    stop: Arc::clone(&self.stop),
                    closed: Arc::clone(&self.closed),
                })
            }
        }

        let closed = Arc::new(AtomicUsize::new(0));
        let transport = OneShot {
            stop: stop_for_session,
            closed: Arc::clone(&closed),
        };

        let recorder = Recorder::default();
        let mut publisher = StatePublisher::new();
        publisher.attach(recorder.clone());

        let mut monitor = Monitor::new(transport, publisher, &fast_config(), stop);
        monitor.run();

        assert_eq!(closed.load(Ordering::SeqCst), 1);
        // Shutdown is not a source-lost condition
        assert!(!recorder
            .events()
            .iter()
            .any(|e| matches!(e, AppEvent::SourceLost)));
    }
}
