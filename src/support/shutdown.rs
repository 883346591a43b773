//! Graceful shutdown handling
//!
//! Provides shutdown signal coordination and drain tracking for all
//! service components.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, Notify};
use tracing::info;

/// Shutdown signal that can be cloned and shared across tasks
#[derive(Clone)]
pub struct ShutdownSignal {
    sender: broadcast::Sender<()>,
    triggered: Arc<AtomicBool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1);
        Self {
            sender,
            triggered: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.sender.subscribe()
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    pub fn trigger(&self) {
        if !self.triggered.swap(true, Ordering::SeqCst) {
            info!("🛑 Shutdown signal triggered");
            let _ = self.sender.send(());
        }
    }

    pub async fn wait(&self) {
        if self.is_triggered() {
            return;
        }
        let mut rx = self.subscribe();
        // trigger() may have raced the subscribe above
        if self.is_triggered() {
            return;
        }
        let _ = rx.recv().await;
    }

    pub fn notified(&self) -> ShutdownNotified {
        ShutdownNotified {
            receiver: self.subscribe(),
            triggered: self.triggered.clone(),
        }
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// A future that resolves when shutdown is triggered
pub struct ShutdownNotified {
    receiver: broadcast::Receiver<()>,
    triggered: Arc<AtomicBool>,
}

impl ShutdownNotified {
    pub async fn wait(mut self) {
        if self.triggered.load(Ordering::SeqCst) {
            return;
        }
        let _ = self.receiver.recv().await;
    }
}

/// Listen for OS shutdown signals (SIGTERM, SIGINT)
pub async fn listen_for_shutdown_signals(shutdown: ShutdownSignal) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate()).expect("Failed to install SIGTERM handler");
        let mut sigint = signal(SignalKind::interrupt()).expect("Failed to install SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => {
                info!("📡 Received SIGTERM signal");
            }
            _ = sigint.recv() => {
                info!("📡 Received SIGINT signal (Ctrl+C)");
            }
        }

        shutdown.trigger();
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
        info!("📡 Received Ctrl+C signal");
        shutdown.trigger();
    }
}

/// Counts in-flight units of work that a drain must wait for.
///
/// The sweeper loop holds one slot for its whole lifetime; each
/// expiration notifier holds one slot for its fire-to-publish section.
#[derive(Clone)]
pub struct TaskGauge {
    inner: Arc<GaugeInner>,
}

struct GaugeInner {
    active: AtomicUsize,
    idle: Notify,
}

impl TaskGauge {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(GaugeInner {
                active: AtomicUsize::new(0),
                idle: Notify::new(),
            }),
        }
    }

    /// Claim a slot; released when the returned guard drops.
    pub fn enter(&self) -> TaskGuard {
        self.inner.active.fetch_add(1, Ordering::SeqCst);
        TaskGuard {
            inner: self.inner.clone(),
        }
    }

    pub fn active(&self) -> usize {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Resolves once no slots are held.
    pub async fn idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            // register for wakeups before checking, so a guard dropping
            // between the check and the await cannot be missed
            notified.as_mut().enable();
            if self.inner.active.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

impl Default for TaskGauge {
    fn default() -> Self {
        Self::new()
    }
}

/// Slot held on a [`TaskGauge`]; dropping it releases the slot.
pub struct TaskGuard {
    inner: Arc<GaugeInner>,
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        if self.inner.active.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.inner.idle.notify_waiters();
        }
    }
}

/// Graceful shutdown coordinator
///
/// RUNNING until [`request_shutdown`](Self::request_shutdown) (or an OS
/// signal via the listener) flips it to DRAINING;
/// [`drain_complete`](Self::drain_complete) then blocks until every
/// tracked unit of work has finished. The drain carries no timeout: it
/// is bounded only by the work it awaits.
pub struct ShutdownCoordinator {
    signal: ShutdownSignal,
    gauge: TaskGauge,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self {
            signal: ShutdownSignal::new(),
            gauge: TaskGauge::new(),
        }
    }

    pub fn signal(&self) -> ShutdownSignal {
        self.signal.clone()
    }

    pub fn gauge(&self) -> TaskGauge {
        self.gauge.clone()
    }

    pub fn start_signal_listener(&self) {
        let signal = self.signal.clone();
        tokio::spawn(async move {
            listen_for_shutdown_signals(signal).await;
        });
    }

    pub fn request_shutdown(&self) {
        self.signal.trigger();
    }

    /// Wait for the shutdown signal, then for all tracked work to finish.
    /// Returns when it is safe to exit.
    pub async fn drain_complete(&self) {
        self.signal.wait().await;
        info!(outstanding = self.gauge.active(), "⏳ Draining outstanding work...");
        self.gauge.idle().await;
        info!("✅ Drain complete, safe to exit");
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
