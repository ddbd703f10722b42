//! Run loop hosting a single input plugin
//!
//! The [`Shim`] owns the plugin lifecycle. It starts service plugins, gathers
//! from polling plugins on a fixed interval or when a line arrives on the
//! control stream, and shuts down when the control stream closes or the
//! output stream breaks. The loop moves through
//! `Idle -> Running -> Draining -> Stopped` exactly once per process.

use crate::accumulator::Accumulator;
use crate::error::{ShimError, WriteError};
use crate::events::ShimEvent;
use crate::plugin::{Capabilities, Input};
use crate::signal::SignalListener;
use crate::writer::MetricWriter;
use log::{debug, error, info, warn};
use std::io::{self, Read, Write};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

/// Default interval between scheduled gathers
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// How often the run loop gathers on its own
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollInterval {
    /// Gather every interval; the first gather happens one interval after start
    Every(Duration),
    /// No timer; gather only when a line arrives on the control stream
    Disabled,
}

impl PollInterval {
    pub fn interval(&self) -> Option<Duration> {
        match self {
            PollInterval::Every(interval) => Some(*interval),
            PollInterval::Disabled => None,
        }
    }
}

impl Default for PollInterval {
    fn default() -> Self {
        PollInterval::Every(DEFAULT_POLL_INTERVAL)
    }
}

/// Lifecycle state of the run loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Draining,
    Stopped,
}

impl RunState {
    /// Whether the loop may move from `self` to `next`
    pub fn can_transition_to(self, next: RunState) -> bool {
        matches!(
            (self, next),
            (RunState::Idle, RunState::Running)
                | (RunState::Idle, RunState::Stopped)
                | (RunState::Running, RunState::Draining)
                | (RunState::Draining, RunState::Stopped)
        )
    }
}

/// Repeating deadline driving scheduled gathers
///
/// Ticks missed while a gather was running are skipped, never queued.
#[derive(Debug)]
struct Ticker {
    interval: Duration,
    next: Instant,
}

impl Ticker {
    fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            next: now + interval,
        }
    }

    fn remaining(&self, now: Instant) -> Duration {
        self.next.saturating_duration_since(now)
    }

    fn advance(&mut self, now: Instant) {
        self.next += self.interval;
        if self.next <= now {
            self.next = now + self.interval;
        }
    }
}

/// Process-execution shim for one input plugin
///
/// # Example
///
/// ```rust,no_run
/// use execd_shim::inputs::uptime::Uptime;
/// use execd_shim::shim::{PollInterval, Shim};
/// use std::time::Duration;
///
/// let mut shim = Shim::new();
/// shim.add_input(Box::new(Uptime::default())).unwrap();
/// shim.run(PollInterval::Every(Duration::from_secs(10))).unwrap();
/// ```
pub struct Shim {
    input: Option<Box<dyn Input>>,
    control: Box<dyn Read + Send>,
    output: Box<dyn Write + Send>,
}

impl Default for Shim {
    fn default() -> Self {
        Self::new()
    }
}

impl Shim {
    /// Create a shim bound to the process standard input and output
    pub fn new() -> Self {
        Self::with_io(Box::new(io::stdin()), Box::new(io::stdout()))
    }

    /// Create a shim over explicit control and output streams
    ///
    /// # Arguments
    ///
    /// * `control` - Stream of collect requests; end-of-stream means shutdown
    /// * `output` - Stream receiving one line-protocol metric per line
    pub fn with_io(control: Box<dyn Read + Send>, output: Box<dyn Write + Send>) -> Self {
        Self {
            input: None,
            control,
            output,
        }
    }

    /// Initialize `input` and make it the plugin this shim hosts
    ///
    /// # Errors
    ///
    /// Returns `ShimError::InputAlreadySet` if an input was already added and
    /// `ShimError::Init` if the plugin rejects its settings.
    pub fn add_input(&mut self, mut input: Box<dyn Input>) -> Result<(), ShimError> {
        if self.input.is_some() {
            return Err(ShimError::InputAlreadySet);
        }
        input.init().map_err(ShimError::Init)?;
        self.input = Some(input);
        Ok(())
    }

    /// Run the plugin until the control stream closes or output fails
    ///
    /// Service plugins are started first; a failing start ends the run
    /// immediately. Polling plugins are gathered every `poll` interval and on
    /// every control line. Gather errors are logged and the loop continues.
    /// On shutdown the timer is cancelled and service plugins are stopped
    /// exactly once.
    ///
    /// # Errors
    ///
    /// Returns `ShimError::NoInput` without an input, `ShimError::Start` if the
    /// service failed to start, `ShimError::Spawn` if the listener thread could
    /// not be created and `ShimError::Write` if the output stream broke.
    pub fn run(self, poll: PollInterval) -> Result<(), ShimError> {
        let Shim {
            input,
            control,
            output,
        } = self;
        let input = input.ok_or(ShimError::NoInput)?;

        let (events_tx, events_rx) = mpsc::channel();
        let acc = Accumulator::new(MetricWriter::new(output), events_tx.clone());

        let mut run_loop = RunLoop {
            capabilities: input.capabilities(),
            input,
            acc,
            state: RunState::Idle,
            started: false,
            failure: None,
        };

        run_loop.start()?;
        if let Err(e) = SignalListener::spawn(control, events_tx) {
            error!("Failed to spawn signal listener: {}", e);
            run_loop.transition(RunState::Draining);
            run_loop.drain(&events_rx);
            return Err(ShimError::Spawn(e));
        }

        run_loop.run(&events_rx, poll);
        run_loop.drain(&events_rx);
        run_loop.finish()
    }
}

struct RunLoop {
    input: Box<dyn Input>,
    capabilities: Capabilities,
    acc: Accumulator,
    state: RunState,
    /// Whether `start` succeeded, so `stop` is owed at shutdown
    started: bool,
    /// First fatal output failure
    failure: Option<WriteError>,
}

impl RunLoop {
    fn transition(&mut self, next: RunState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal run loop transition {:?} -> {:?}",
            self.state,
            next
        );
        debug!("Run loop {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Idle -> Running, or Idle -> Stopped if the service fails to start
    fn start(&mut self) -> Result<(), ShimError> {
        let caps = self.capabilities;
        if !caps.polling && !caps.service {
            warn!("Input supports neither gather nor start; waiting for shutdown");
        }

        if caps.service {
            info!("Starting service input");
            if let Err(e) = self.input.start(&self.acc) {
                error!("Failed to start input: {}", e);
                self.transition(RunState::Stopped);
                return Err(ShimError::Start(e));
            }
            self.started = true;
        }

        self.transition(RunState::Running);
        Ok(())
    }

    /// Dispatch events until shutdown or a fatal write failure
    fn run(&mut self, events: &Receiver<ShimEvent>, poll: PollInterval) {
        let mut ticker = match poll.interval() {
            Some(interval) if self.capabilities.polling => {
                info!("Gathering every {:?}", interval);
                Some(Ticker::new(interval, Instant::now()))
            }
            _ => None,
        };

        loop {
            let event = match ticker.as_mut() {
                Some(ticker) => match events.recv_timeout(ticker.remaining(Instant::now())) {
                    Ok(event) => Some(event),
                    Err(RecvTimeoutError::Timeout) => {
                        ticker.advance(Instant::now());
                        None
                    }
                    Err(RecvTimeoutError::Disconnected) => break,
                },
                None => match events.recv() {
                    Ok(event) => Some(event),
                    Err(_) => break,
                },
            };

            // Timer fired
            let Some(event) = event else {
                self.gather();
                continue;
            };

            let terminal = event.is_terminal();
            match event {
                // Collect now without moving the scheduled deadline
                ShimEvent::CollectNow => {
                    if self.capabilities.polling {
                        self.gather();
                    } else {
                        debug!("Ignoring collect request, input does not gather");
                    }
                }
                ShimEvent::Shutdown => info!("Shutdown requested"),
                ShimEvent::WriteFailed(e) => {
                    error!("Output stream failed, shutting down: {}", e);
                    self.failure.get_or_insert(e);
                }
            }
            if terminal {
                break;
            }
        }

        self.transition(RunState::Draining);
    }

    fn gather(&mut self) {
        if self.acc.is_closed() {
            return;
        }
        if let Err(e) = self.input.gather(&self.acc) {
            error!("Failed to gather metrics: {}", e);
        }
    }

    /// Stop the service and collect output failures raised meanwhile
    fn drain(&mut self, events: &Receiver<ShimEvent>) {
        if self.started {
            info!("Stopping service input");
            if let Err(e) = self.input.stop() {
                warn!("Failed to stop input: {}", e);
            }
            self.started = false;
        }

        for event in events.try_iter() {
            if let ShimEvent::WriteFailed(e) = event {
                self.failure.get_or_insert(e);
            }
        }

        self.transition(RunState::Stopped);
    }

    fn finish(self) -> Result<(), ShimError> {
        match self.failure {
            Some(e) => Err(ShimError::Write(e)),
            None => {
                info!("Shim stopped");
                Ok(())
            }
        }
    }
}
