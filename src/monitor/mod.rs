//! Device health monitor
//!
//! Watches the active capture device and reports when it is lost or comes
//! back. It only informs the UI and answer metadata; it never touches the
//! capture pipeline's retry logic.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Snapshot of one capture device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DeviceStatus {
    /// The track is still producing media
    pub track_live: bool,
    pub permission_granted: bool,
    /// Not muted or disabled by the user
    pub enabled: bool,
}

impl DeviceStatus {
    pub fn is_active(&self) -> bool {
        self.track_live && self.permission_granted && self.enabled
    }
}

#[async_trait]
pub trait DeviceProbe: Send + Sync {
    async fn probe(&self) -> DeviceStatus;
}

pub type HealthCallback = Box<dyn Fn() + Send + Sync>;

/// Polls a device and fires callbacks on active/inactive transitions
pub struct HealthMonitor {
    probe: Arc<dyn DeviceProbe>,
    interval: Duration,
    on_lost: Option<HealthCallback>,
    on_restored: Option<HealthCallback>,
}

impl HealthMonitor {
    pub fn new(probe: Arc<dyn DeviceProbe>, interval: Duration) -> Self {
        Self {
            probe,
            interval,
            on_lost: None,
            on_restored: None,
        }
    }

    pub fn on_lost(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_lost = Some(Box::new(callback));
        self
    }

    pub fn on_restored(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_restored = Some(Box::new(callback));
        self
    }

    /// Start polling. The device is assumed active until the first probe
    /// says otherwise.
    pub fn start(self) -> MonitorHandle {
        let track_ended = Arc::new(Notify::new());
        let (active_tx, active_rx) = watch::channel(true);

        let task = tokio::spawn(self.run(Arc::clone(&track_ended), active_tx));

        MonitorHandle {
            track_ended,
            active: active_rx,
            task,
        }
    }

    async fn run(self, track_ended: Arc<Notify>, active: watch::Sender<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = track_ended.notified() => debug!("Track ended, probing device"),
            }

            let status = self.probe.probe().await;
            let now_active = status.is_active();
            let was_active = *active.borrow();
            if now_active == was_active {
                continue;
            }

            if now_active {
                info!("Capture device restored");
                if let Some(callback) = &self.on_restored {
                    callback();
                }
            } else {
                warn!(
                    "Capture device lost (live: {}, permission: {}, enabled: {})",
                    status.track_live, status.permission_granted, status.enabled
                );
                if let Some(callback) = &self.on_lost {
                    callback();
                }
            }
            // Subscribers see the change only after the callbacks ran
            active.send_replace(now_active);
        }
    }
}

/// Running monitor. Dropping the handle stops it.
pub struct MonitorHandle {
    track_ended: Arc<Notify>,
    active: watch::Receiver<bool>,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    /// Forward a native "track ended" event for an immediate probe
    pub fn track_ended(&self) {
        self.track_ended.notify_one();
    }

    pub fn is_active(&self) -> bool {
        *self.active.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.active.clone()
    }

    pub fn stop(self) {
        self.task.abort();
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
