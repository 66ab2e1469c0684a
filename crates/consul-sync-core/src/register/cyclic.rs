//! Periodic re-registration.
//!
//! The first tick after [`CyclicRegistrar::start`] always registers with
//! `force`. Later ticks use the configured policy. A health-check event opens
//! a skip window of 1.5 health-check intervals during which ticks do nothing,
//! since the agent has just confirmed the service is alive.

use consul_sync_types::{RegisterDescriptor, RegisterOptions, RegisterOutcome, RegisterType};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio::time::Instant;

use super::reconciler::Reconciler;
use crate::events::{ConsulEvent, EventBus};
use crate::utils::parse::parse_duration_millis;

const PREFIX: &str = "CONSUL-REG:";

/// Lower bound of the retry interval.
pub const DEFAULT_REGISTER_INTERVAL: Duration = Duration::from_secs(60);

/// Arguments of [`CyclicRegistrar::start`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CyclicOptions {
    pub register_type: RegisterType,
    /// Explicit retry interval; never below 1.5 × health-check interval nor one minute
    pub register_interval: Option<Duration>,
    pub delete_other_instance: bool,
    pub no_already_registered_message: bool,
    /// Force-register on every tick and ignore health-check skips
    pub force_every_register_attempt: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
}

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Inside the health-check skip window
    Skipped,
    Done(RegisterOutcome),
    /// The pass returned an error; it was logged
    Error,
}

struct CyclicState {
    is_started: bool,
    /// A registration attempt was made since the last start
    attempted: bool,
    skip_until: Option<Instant>,
    health_check_interval: Duration,
    register_interval: Duration,
    options: CyclicOptions,
    shutdown_tx: Option<watch::Sender<bool>>,
}

/// Timer-driven re-registration of one descriptor.
pub struct CyclicRegistrar {
    reconciler: Arc<Reconciler>,
    descriptor: Arc<RegisterDescriptor>,
    events: EventBus,
    state: Mutex<CyclicState>,
}

impl CyclicRegistrar {
    pub fn new(
        reconciler: Arc<Reconciler>,
        descriptor: Arc<RegisterDescriptor>,
        events: EventBus,
    ) -> Arc<Self> {
        let health_check_interval = descriptor
            .check
            .as_ref()
            .and_then(|c| c.interval.as_deref())
            .and_then(parse_duration_millis)
            .map_or(Duration::ZERO, Duration::from_millis);
        Arc::new(Self {
            reconciler,
            descriptor,
            events,
            state: Mutex::new(CyclicState {
                is_started: false,
                attempted: false,
                skip_until: None,
                health_check_interval,
                register_interval: DEFAULT_REGISTER_INTERVAL,
                options: CyclicOptions::default(),
                shutdown_tx: None,
            }),
        })
    }

    pub fn is_started(&self) -> bool {
        self.state.lock().is_started
    }

    pub fn register_interval(&self) -> Duration {
        self.state.lock().register_interval
    }

    /// Starts the loop; the first tick runs immediately.
    pub fn start(self: &Arc<Self>, options: CyclicOptions) -> StartOutcome {
        let (shutdown_rx, register_interval) = {
            let mut state = self.state.lock();
            if state.is_started {
                return StartOutcome::AlreadyRunning;
            }
            let from_health_check = state.health_check_interval.mul_f64(1.5);
            state.register_interval = options
                .register_interval
                .unwrap_or(Duration::ZERO)
                .max(from_health_check)
                .max(DEFAULT_REGISTER_INTERVAL);
            state.options = options;
            state.is_started = true;
            state.attempted = false;
            let (tx, rx) = watch::channel(false);
            state.shutdown_tx = Some(tx);
            (rx, state.register_interval)
        };

        let events_rx = self.events.subscribe();
        drop(tokio::spawn(Arc::clone(self).run(events_rx, shutdown_rx)));

        let agent = self.reconciler.router().primary_options();
        tracing::info!(
            "Cyclic Register of service {} started. Agent: {}:{}, token: {}, interval: {:?}",
            self.descriptor.id,
            agent.host,
            agent.port,
            agent.masked_token(),
            register_interval
        );
        StartOutcome::Started
    }

    /// Cancels the pending tick. Calling it on a stopped loop does nothing.
    pub fn stop(&self) {
        let mut state = self.state.lock();
        if let Some(tx) = state.shutdown_tx.take() {
            let _ = tx.send(true);
        }
        if state.is_started {
            state.is_started = false;
            tracing::info!("Cyclic Register of service {} stopped", self.descriptor.id);
        }
    }

    /// Opens the skip window.
    pub fn on_health_check(&self) {
        let mut state = self.state.lock();
        state.skip_until = Some(Instant::now() + state.health_check_interval.mul_f64(1.5));
    }

    async fn run(
        self: Arc<Self>,
        mut events_rx: broadcast::Receiver<ConsulEvent>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        let mut next_tick = Instant::now();
        let mut events_open = true;
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => break,
                event = events_rx.recv(), if events_open => match event {
                    Ok(ConsulEvent::HealthCheck) => self.on_health_check(),
                    Ok(_) => {},
                    Err(RecvError::Lagged(n)) => {
                        tracing::trace!("{} {} events missed", PREFIX, n);
                    },
                    Err(RecvError::Closed) => events_open = false,
                },
                () = tokio::time::sleep_until(next_tick) => {
                    self.run_tick().await;
                    next_tick = Instant::now() + self.register_interval();
                },
            }
        }
        tracing::debug!("{} loop of {} finished", PREFIX, self.descriptor.id);
    }

    /// One tick: register unless inside the skip window. Never fails.
    pub async fn run_tick(&self) -> TickOutcome {
        let (options, force, skip) = {
            let state = self.state.lock();
            let force_every = state.options.force_every_register_attempt;
            let skip =
                !force_every && state.skip_until.is_some_and(|until| Instant::now() < until);
            (state.options, force_every || !state.attempted, skip)
        };

        if skip {
            tracing::trace!("{} Skip registration check after health check", PREFIX);
            return TickOutcome::Skipped;
        }
        if !force {
            tracing::trace!("{} Service {} registration check...", PREFIX, self.descriptor.id);
        }

        let register_options = RegisterOptions {
            register_type: if force { RegisterType::Force } else { options.register_type },
            delete_other_instance: options.delete_other_instance,
            no_already_registered_message: options.no_already_registered_message,
        };
        let outcome = match self.reconciler.register_service(&self.descriptor, register_options).await
        {
            Ok(outcome) => TickOutcome::Done(outcome),
            Err(e) => {
                tracing::error!("{} ERROR: {}", PREFIX, e);
                TickOutcome::Error
            },
        };

        let mut state = self.state.lock();
        state.skip_until = None;
        state.attempted = true;
        outcome
    }
}
