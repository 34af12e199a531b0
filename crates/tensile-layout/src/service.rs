//! Fixed-delay background driver for a [`LayoutSession`].
//!
//! The service owns a dedicated OS thread that calls
//! [`LayoutSession::run_one_loop`] every `interval` until stopped or until a
//! step fails. Status is readable at any time and every tick or failure is
//! pushed to an optional listener.

use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tensile_core::{NodeKey, Topology};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::LayoutError;
use crate::session::LayoutSession;
use crate::Result;

/// Timing of the service loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Delay between the end of one tick and the start of the next.
    #[serde(with = "millis")]
    pub interval: Duration,
    /// Steps run per tick.
    pub steps_per_tick: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(10),
            steps_per_tick: 1,
        }
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ServiceStatus {
    Running,
    Stopped,
    Failed(String),
}

/// Notification sent to the service listener.
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceEvent {
    Tick { tick: u64, energy: f64 },
    Failed { tick: u64, error: LayoutError },
    Stopped { ticks: u64 },
}

pub type ServiceListener = Box<dyn Fn(&ServiceEvent) + Send + 'static>;

/// Handle to a running layout service. Dropping it stops the worker.
pub struct LayoutService {
    stop: CancellationToken,
    status: Arc<Mutex<ServiceStatus>>,
    worker: Option<JoinHandle<()>>,
}

impl LayoutService {
    /// Start driving `session` on a new thread.
    pub fn spawn<N, G>(
        session: Arc<LayoutSession<N, G>>,
        config: ServiceConfig,
        listener: Option<ServiceListener>,
    ) -> Result<Self>
    where
        N: NodeKey,
        G: Topology<N> + Send + Sync + 'static,
    {
        if config.steps_per_tick == 0 {
            return Err(LayoutError::Service(
                "steps_per_tick must be at least 1".into(),
            ));
        }

        let stop = CancellationToken::new();
        let status = Arc::new(Mutex::new(ServiceStatus::Running));

        let worker = {
            let stop = stop.clone();
            let status = Arc::clone(&status);
            thread::Builder::new()
                .name("tensile-layout".into())
                .spawn(move || run(session, config, listener, stop, status))
                .map_err(|e| LayoutError::Service(format!("failed to spawn worker: {e}")))?
        };

        Ok(Self {
            stop,
            status,
            worker: Some(worker),
        })
    }

    pub fn status(&self) -> ServiceStatus {
        self.status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_running(&self) -> bool {
        self.status() == ServiceStatus::Running
    }

    /// Ask the worker to stop after its current tick.
    pub fn stop(&self) {
        self.stop.cancel();
    }

    /// Stop and wait for the worker to exit; returns the final status.
    pub fn stop_and_join(mut self) -> ServiceStatus {
        self.stop();
        self.join();
        self.status()
    }

    fn join(&mut self) {
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
                *status = ServiceStatus::Failed("layout worker panicked".into());
            }
        }
    }
}

impl Drop for LayoutService {
    fn drop(&mut self) {
        self.stop();
        self.join();
    }
}

impl std::fmt::Debug for LayoutService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayoutService")
            .field("status", &self.status())
            .finish()
    }
}

fn run<N, G>(
    session: Arc<LayoutSession<N, G>>,
    config: ServiceConfig,
    listener: Option<ServiceListener>,
    stop: CancellationToken,
    status: Arc<Mutex<ServiceStatus>>,
) where
    N: NodeKey,
    G: Topology<N> + Send + Sync,
{
    let notify = |event: ServiceEvent| {
        if let Some(listener) = &listener {
            listener(&event);
        }
    };
    let set_status = |next: ServiceStatus| {
        *status.lock().unwrap_or_else(PoisonError::into_inner) = next;
    };

    info!(
        interval_ms = config.interval.as_millis() as u64,
        steps_per_tick = config.steps_per_tick,
        "layout service started"
    );

    let mut tick = 0u64;
    while !stop.is_cancelled() {
        let started = Instant::now();
        match session.run_one_loop(config.steps_per_tick) {
            Ok(energy) => {
                tick += 1;
                debug!(tick, energy, elapsed_us = started.elapsed().as_micros() as u64, "service tick");
                notify(ServiceEvent::Tick { tick, energy });
            }
            Err(e) if e.is_canceled() => break,
            Err(e) => {
                error!(tick, error = %e, "layout service failed");
                set_status(ServiceStatus::Failed(e.to_string()));
                notify(ServiceEvent::Failed { tick, error: e });
                return;
            }
        }
        sleep_unless_stopped(&stop, config.interval);
    }

    set_status(ServiceStatus::Stopped);
    info!(ticks = tick, "layout service stopped");
    notify(ServiceEvent::Stopped { ticks: tick });
}

/// Sleep for `interval` in short slices so a stop request is noticed quickly.
fn sleep_unless_stopped(stop: &CancellationToken, interval: Duration) {
    let slice = Duration::from_millis(5);
    let deadline = Instant::now() + interval;
    while !stop.is_cancelled() {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        thread::sleep(slice.min(deadline - now));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_ticks_every_ten_millis() {
        let config = ServiceConfig::default();
        assert_eq!(config.interval, Duration::from_millis(10));
        assert_eq!(config.steps_per_tick, 1);
    }

    #[test]
    fn config_reads_interval_as_millis() {
        let config: ServiceConfig = serde_json::from_str(r#"{ "interval": 250 }"#).unwrap();
        assert_eq!(config.interval, Duration::from_millis(250));
        assert_eq!(config.steps_per_tick, 1);
    }
}
