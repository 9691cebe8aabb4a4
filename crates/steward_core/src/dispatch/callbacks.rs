//! Listener registry driving remote callbacks, controller events and
//! timed listeners.

use super::{ControllerEvent, DispatchError, EventDispatcher, ListenerError};
use crate::session::ConnectionSession;
use crate::transport::RemoteCallback;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

type CallbackListener = Box<dyn Fn(&RemoteCallback) -> Result<(), ListenerError> + Send + Sync>;
type EventListener = Box<dyn Fn(ControllerEvent) -> Result<(), ListenerError> + Send + Sync>;
type TimerListener = Box<dyn Fn() -> Result<(), ListenerError> + Send + Sync>;

struct TimedListener {
    name: String,
    interval: Duration,
    /// `None` once the next run would lie beyond the clock's range.
    next_due: Option<Instant>,
    listener: TimerListener,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DispatchStats {
    pub total_listeners: usize,
    pub callbacks_received: u64,
    pub callbacks_dispatched: u64,
    pub timers_fired: u64,
    pub listener_failures: u64,
}

/// Default [`EventDispatcher`].
///
/// Listeners for the same key run in registration order. A failing
/// listener is logged and counted; the others still run.
#[derive(Default)]
pub struct CallbackManager {
    callback_listeners: HashMap<String, Vec<CallbackListener>>,
    event_listeners: HashMap<ControllerEvent, Vec<EventListener>>,
    timers: Vec<TimedListener>,
    stats: DispatchStats,
}

impl CallbackManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Listens for a remote callback, e.g. `ManiaPlanet.PlayerConnect`.
    pub fn on_callback<F>(&mut self, method: &str, listener: F)
    where
        F: Fn(&RemoteCallback) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        self.callback_listeners
            .entry(method.to_string())
            .or_default()
            .push(Box::new(listener));
        self.stats.total_listeners += 1;
        debug!("Registered listener for callback {}", method);
    }

    pub fn on_event<F>(&mut self, event: ControllerEvent, listener: F)
    where
        F: Fn(ControllerEvent) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        self.event_listeners
            .entry(event)
            .or_default()
            .push(Box::new(listener));
        self.stats.total_listeners += 1;
        debug!("Registered listener for {}", event);
    }

    /// Runs `listener` every `interval`, first one interval from now.
    pub fn every<F>(&mut self, name: &str, interval: Duration, listener: F)
    where
        F: Fn() -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        self.timers.push(TimedListener {
            name: name.to_string(),
            interval,
            next_due: Instant::now().checked_add(interval),
            listener: Box::new(listener),
        });
        self.stats.total_listeners += 1;
        debug!("Registered timed listener {} every {:?}", name, interval);
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats.clone()
    }

    fn fire_callback(&mut self, callback: &RemoteCallback) {
        self.stats.callbacks_received += 1;
        let Some(listeners) = self.callback_listeners.get(&callback.method) else {
            trace!("No listeners for callback {}", callback.method);
            return;
        };

        for listener in listeners {
            if let Err(e) = listener(callback) {
                error!("Listener for {} failed: {}", callback.method, e);
                self.stats.listener_failures += 1;
            }
        }
        self.stats.callbacks_dispatched += 1;
    }

    fn fire_due_timers(&mut self, now: Instant) {
        for timer in &mut self.timers {
            match timer.next_due {
                Some(due) if now >= due => {}
                _ => continue,
            }
            timer.next_due = now.checked_add(timer.interval);
            self.stats.timers_fired += 1;
            if let Err(e) = (timer.listener)() {
                error!("Timed listener {} failed: {}", timer.name, e);
                self.stats.listener_failures += 1;
            }
        }
    }
}

#[async_trait]
impl EventDispatcher for CallbackManager {
    async fn process_due_events(
        &mut self,
        session: &mut ConnectionSession,
    ) -> Result<(), DispatchError> {
        let callbacks = match session.transport_mut() {
            Some(transport) => match transport.drain_callbacks().await {
                Ok(callbacks) => callbacks,
                Err(e) if e.is_disconnect() => return Err(e.into()),
                Err(e) => {
                    warn!("Couldn't read callbacks this tick: {}", e);
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        for callback in &callbacks {
            self.fire_callback(callback);
        }
        self.fire_due_timers(Instant::now());
        Ok(())
    }

    async fn notify(&mut self, event: ControllerEvent) {
        let Some(listeners) = self.event_listeners.get(&event) else {
            debug!("No listeners for {}", event);
            return;
        };

        info!("Notifying {} listener(s) of {}", listeners.len(), event);
        for listener in listeners {
            if let Err(e) = listener(event) {
                error!("Listener for {} failed: {}", event, e);
                self.stats.listener_failures += 1;
            }
        }
    }
}
