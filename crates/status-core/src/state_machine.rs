use tracing::{debug, info, warn};

use crate::{
    bus::NotificationBus,
    presence::PresenceTracker,
    reconciler::{StatusChange, StatusReconciler},
    retry::RetryPolicy,
    stream::StreamSupervisor,
    types::{ConnectionStatus, Directive, MonitorInput, TransportEvent},
};

/// Single mutation authority for one monitor run.
///
/// Every [`MonitorInput`] maps to exactly one reconciliation step. The machine
/// performs no I/O: it returns [`Directive`]s for the driver to execute.
#[derive(Debug)]
pub struct MonitorStateMachine {
    presence: PresenceTracker,
    stream: StreamSupervisor,
    reconciler: StatusReconciler,
    running: bool,
}

impl MonitorStateMachine {
    pub fn new(bus: NotificationBus, policy: RetryPolicy, reported_presence: Option<bool>) -> Self {
        let presence = PresenceTracker::new(reported_presence);
        Self {
            presence,
            stream: StreamSupervisor::new(policy),
            reconciler: StatusReconciler::new(bus, presence.is_online()),
            running: false,
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.reconciler.status()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn stream(&self) -> &StreamSupervisor {
        &self.stream
    }

    /// Begin monitoring. A second call tears the previous stream down first.
    pub fn start(&mut self) -> Vec<Directive> {
        let mut directives = Vec::new();
        if self.running {
            directives.extend(self.stream.close());
        }
        self.running = true;
        directives.extend(self.stream.open());
        directives
    }

    /// Stop monitoring; later inputs are ignored.
    pub fn stop(&mut self) -> Vec<Directive> {
        self.running = false;
        self.stream.close()
    }

    /// Apply one input observed at `now_ms`.
    pub fn handle(&mut self, input: MonitorInput, now_ms: u64) -> Vec<Directive> {
        if !self.running {
            debug!(?input, "monitor stopped; dropping input");
            return Vec::new();
        }

        match input {
            MonitorInput::Transport { generation, event } => {
                if !self.stream.is_current(generation) {
                    debug!(generation, ?event, "ignoring event from stale stream");
                    return Vec::new();
                }
                match event {
                    TransportEvent::Opened => {
                        self.stream.on_opened(generation);
                        info!(generation, "status stream opened");
                        self.reconciler.apply(StatusChange::StreamAlive, now_ms);
                        Vec::new()
                    }
                    TransportEvent::Heartbeat | TransportEvent::Message => {
                        self.reconciler.apply(StatusChange::StreamAlive, now_ms);
                        Vec::new()
                    }
                    TransportEvent::Failed { reason } => {
                        warn!(generation, %reason, "status stream failed");
                        self.reconciler.apply(StatusChange::StreamLost, now_ms);
                        self.stream.on_failed(generation)
                    }
                }
            }
            MonitorInput::Presence(signal) => {
                let online = self.presence.apply(signal);
                info!(online, "host presence changed");
                self.reconciler.apply(StatusChange::Presence { online }, now_ms);
                // Reachable always reopens, even over a healthy stream. `connected`
                // keeps its last value until the replacement reports in.
                if online {
                    self.stream.reconnect_now()
                } else {
                    Vec::new()
                }
            }
            MonitorInput::ReconnectDue { timer } => self.stream.on_timer(timer),
        }
    }
}
