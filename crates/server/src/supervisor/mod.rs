//! Proxy lifecycle supervision
//!
//! Starts and stops a slot's proxy process. Every operation takes the slot's
//! [`SlotGuard`], so the caller must hold the slot's lifecycle lock and two
//! operations on one slot can never overlap.
//!
//! A start only reports success after the proxy has accepted a TCP
//! connection on its port; a live pid alone does not mean the listener is
//! bound yet.

pub mod probe;
pub mod process;

pub use probe::ReadinessProbe;
pub use process::{ProcessHandle, Termination};

use crate::config::{ProxySettings, TimingSettings};
use crate::error::SlotError;
use crate::host::HostIdentity;
use crate::registry::{Slot, SlotGuard};
use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Orchestrates start/stop of slot proxies and tracks background work
pub struct ProcessSupervisor {
    proxy: ProxySettings,
    timing: TimingSettings,
    probe: ReadinessProbe,
    host: HostIdentity,
    url_scheme: String,
    tasks: Mutex<JoinSet<()>>,
    closing: AtomicBool,
}

impl ProcessSupervisor {
    pub fn new(
        proxy: ProxySettings,
        timing: TimingSettings,
        host: HostIdentity,
        url_scheme: impl Into<String>,
    ) -> Self {
        let probe = ReadinessProbe {
            device_poll_interval: timing.device_poll_interval(),
            port_poll_interval: timing.port_poll_interval(),
            connect_timeout: timing.connect_timeout(),
        };
        Self {
            proxy,
            timing,
            probe,
            host,
            url_scheme: url_scheme.into(),
            tasks: Mutex::new(JoinSet::new()),
            closing: AtomicBool::new(false),
        }
    }

    pub fn host(&self) -> &HostIdentity {
        &self.host
    }

    /// URL under which a slot's proxy is reachable
    pub fn proxy_url(&self, port: u16) -> String {
        format!("{}://{}:{}", self.url_scheme, self.host.ip, port)
    }

    /// Start the slot's proxy on its recorded device node
    ///
    /// Any proxy still held by the guard is stopped first. On failure the
    /// error is also recorded as the slot's `last_error` and `running` stays
    /// false.
    pub async fn start(&self, slot: &Slot, proxy: &mut SlotGuard<'_>) -> Result<(), SlotError> {
        if proxy.is_some() {
            self.stop(slot, proxy).await;
        }

        let result = self.launch(slot).await;
        match result {
            Ok(handle) => {
                let pid = handle.pid();
                let port = slot.tcp_port().unwrap_or_default();
                let url = self.proxy_url(port);
                {
                    let mut state = slot.state();
                    state.running = true;
                    state.pid = Some(pid);
                    state.url = Some(url);
                    state.last_error = None;
                }
                **proxy = Some(handle);
                info!(slot = slot.key(), pid, port, "Proxy started");
                Ok(())
            }
            Err(e) => {
                {
                    let mut state = slot.state();
                    state.running = false;
                    state.pid = None;
                    state.url = None;
                    state.last_error = Some(e.to_string());
                }
                warn!(slot = slot.key(), "Proxy start failed: {}", e);
                Err(e)
            }
        }
    }

    async fn launch(&self, slot: &Slot) -> Result<ProcessHandle, SlotError> {
        let port = slot
            .tcp_port()
            .ok_or_else(|| SlotError::UnconfiguredSlot(slot.key().to_string()))?;
        let devnode = slot
            .state()
            .devnode
            .clone()
            .ok_or(SlotError::MissingDevnode)?;

        let program = self
            .proxy
            .resolve_executable()
            .ok_or_else(|| SlotError::SpawnFailure("no proxy executable found".to_string()))?;

        // Settle: the node may exist before it can be opened
        if !self
            .probe
            .wait_device_ready(Path::new(&devnode), self.timing.device_ready_timeout())
            .await
        {
            return Err(SlotError::DeviceNotReady { devnode });
        }

        let args = self.proxy.render_args(port, &devnode);
        debug!(slot = slot.key(), program = %program.display(), ?args, "Spawning proxy");
        let mut handle = ProcessHandle::spawn(&program, &args)
            .map_err(|e| SlotError::SpawnFailure(e.to_string()))?;

        tokio::time::sleep(self.timing.grace_period()).await;
        if let Some(status) = handle.exit_status() {
            return Err(SlotError::PrematureExit {
                status: status.to_string(),
            });
        }

        if self
            .probe
            .wait_port_listening(port, self.timing.port_ready_budget())
            .await
        {
            return Ok(handle);
        }

        // Alive but deaf: don't leave it holding the device
        if let Err(e) = handle.terminate(Termination::Forced) {
            warn!(slot = slot.key(), pid = handle.pid(), "Failed to kill proxy: {}", e);
        }
        handle.wait(self.timing.stop_timeout()).await;
        Err(SlotError::PortNeverListening { port })
    }

    /// Stop the slot's proxy if one is recorded
    ///
    /// Always leaves `running`, `pid` and `url` cleared; calling it on a
    /// stopped slot is a no-op. `last_error` is cleared only when a live
    /// process was actually terminated.
    pub async fn stop(&self, slot: &Slot, proxy: &mut SlotGuard<'_>) {
        let stopped = match proxy.take() {
            Some(mut handle) => {
                let pid = handle.pid();
                let was_alive = handle.shutdown(self.timing.stop_timeout()).await;
                if was_alive {
                    info!(slot = slot.key(), pid, "Proxy stopped");
                }
                was_alive
            }
            None => false,
        };

        let mut state = slot.state();
        state.running = false;
        state.pid = None;
        state.url = None;
        if stopped {
            state.last_error = None;
        }
    }

    /// Lazy liveness check used when status is read
    ///
    /// Skipped while a start or stop holds the slot. Returns true when a
    /// dead proxy was detected and the slot was marked not running.
    pub fn refresh_health(&self, slot: &Slot) -> bool {
        let Some(mut proxy) = slot.try_lock() else {
            return false;
        };
        let exit = match proxy.as_mut() {
            Some(handle) => handle.exit_status(),
            None => return false,
        };
        let Some(status) = exit else {
            return false;
        };

        let pid = proxy.take().map(|h| h.pid());
        let mut state = slot.state();
        state.running = false;
        state.pid = None;
        state.url = None;
        state.last_error = Some(SlotError::ProcessDeathDetected.to_string());
        warn!(slot = slot.key(), ?pid, %status, "Proxy died");
        true
    }

    /// Queue a stop-then-start for `slot` on a tracked background task
    ///
    /// The task does nothing if another event or control for the slot has
    /// arrived by the time it acquires the slot lock.
    pub fn dispatch_restart(self: &Arc<Self>, slot: Arc<Slot>, generation: u64) {
        let supervisor = Arc::clone(self);
        self.spawn_tracked(async move {
            let mut proxy = slot.lock().await;
            if !slot.is_current(generation) {
                debug!(slot = slot.key(), generation, "Start superseded by a newer event");
                return;
            }
            supervisor.stop(&slot, &mut proxy).await;
            if let Err(e) = supervisor.start(&slot, &mut proxy).await {
                debug!(slot = slot.key(), "Queued start failed: {}", e);
            }
        });
    }

    /// Spawn background work that [`drain`](Self::drain) will wait for
    pub fn spawn_tracked<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.closing.load(Ordering::Acquire) {
            warn!("Supervisor is shutting down, dropping background task");
            return;
        }
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        while let Some(done) = tasks.try_join_next() {
            log_task_result(done);
        }
        tasks.spawn(task);
    }

    /// Number of background tasks not yet reaped
    pub fn pending_tasks(&self) -> usize {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Refuse new background work and wait for in-flight tasks
    pub async fn drain(&self) {
        self.closing.store(true, Ordering::Release);
        let mut tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));
        if !tasks.is_empty() {
            info!("Waiting for {} in-flight proxy operation(s)", tasks.len());
        }
        while let Some(done) = tasks.join_next().await {
            log_task_result(done);
        }
    }
}

fn log_task_result(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        if e.is_panic() {
            error!("Background proxy task panicked: {}", e);
        }
    }
}
