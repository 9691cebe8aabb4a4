//! The steady-state tick loop.

use super::shutdown::{ShutdownHandle, ShutdownReason};
use crate::dispatch::EventDispatcher;
use crate::session::ConnectionSession;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{error, info, trace};

/// Fixed tick period: 300 ms.
pub const TICK_PERIOD: Duration = Duration::from_micros(300_000);

/// Time left to sleep after a tick that took `elapsed`.
///
/// `None` when the tick used up the whole period. Overruns are not caught
/// up; the next tick simply starts right away.
pub fn drift_compensated_sleep(period: Duration, elapsed: Duration) -> Option<Duration> {
    period.checked_sub(elapsed).filter(|remaining| !remaining.is_zero())
}

/// Runs the dispatch subsystem once per period until a shutdown is
/// requested.
pub struct TickScheduler {
    period: Duration,
    shutdown: ShutdownHandle,
    last_tick_start: Option<Instant>,
    ticks: u64,
}

impl TickScheduler {
    pub fn new(shutdown: ShutdownHandle) -> Self {
        Self {
            period: TICK_PERIOD,
            shutdown,
            last_tick_start: None,
            ticks: 0,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Completed iterations so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn last_tick_start(&self) -> Option<Instant> {
        self.last_tick_start
    }

    /// Runs until a shutdown is requested or dispatching fails.
    ///
    /// The request flag is read once per iteration, before the tick starts.
    /// A dispatch error records a shutdown request itself and ends the loop
    /// with [`ShutdownReason::FatalLoopError`].
    pub async fn run(
        &mut self,
        session: &mut ConnectionSession,
        dispatcher: &mut dyn EventDispatcher,
    ) -> ShutdownReason {
        info!("Tick loop started with a {:?} period", self.period);

        while !self.shutdown.is_requested() {
            let tick_start = Instant::now();
            self.last_tick_start = Some(tick_start);

            if let Err(e) = dispatcher.process_due_events(session).await {
                error!("Fatal error while dispatching events: {}", e);
                self.shutdown
                    .request_shutdown(Some(format!("Fatal error in tick loop: {e}")));
                return ShutdownReason::FatalLoopError;
            }
            self.ticks += 1;

            match drift_compensated_sleep(self.period, tick_start.elapsed()) {
                Some(remaining) => sleep(remaining).await,
                None => trace!("Tick {} overran the period", self.ticks),
            }
        }

        info!("Tick loop stopped after {} ticks", self.ticks);
        ShutdownReason::OperatorRequested
    }
}
