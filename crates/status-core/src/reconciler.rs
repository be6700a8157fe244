use crate::{bus::NotificationBus, types::ConnectionStatus};

/// Status-relevant fact derived from one monitor input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusChange {
    /// Current stream opened or proved liveness.
    StreamAlive,
    /// Current stream failed.
    StreamLost,
    /// Host presence changed.
    Presence { online: bool },
}

/// Owns the [`ConnectionStatus`] and publishes one snapshot per change.
#[derive(Debug)]
pub struct StatusReconciler {
    status: ConnectionStatus,
    bus: NotificationBus,
}

impl StatusReconciler {
    /// Start from a disconnected status and seed it into `bus`.
    pub fn new(bus: NotificationBus, online: bool) -> Self {
        let status = ConnectionStatus::initial(online);
        bus.seed(status);
        Self { status, bus }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// Apply `change` observed at `now_ms` and publish the resulting snapshot.
    pub fn apply(&mut self, change: StatusChange, now_ms: u64) -> ConnectionStatus {
        match change {
            StatusChange::StreamAlive => {
                // Never connected while offline.
                self.status.connected = self.status.online;
                self.status.last_event_ms = self.status.last_event_ms.max(now_ms);
            }
            StatusChange::StreamLost => {
                self.status.connected = false;
            }
            StatusChange::Presence { online } => {
                self.status.online = online;
                if !online {
                    self.status.connected = false;
                }
            }
        }

        let snapshot = self.status;
        self.bus.publish(snapshot);
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    fn reconciler_with_log() -> (StatusReconciler, Arc<Mutex<Vec<ConnectionStatus>>>) {
        let bus = NotificationBus::default();
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        bus.subscribe(move |snapshot| sink.lock().expect("log").push(snapshot));
        (StatusReconciler::new(bus, true), log)
    }

    #[test]
    fn connected_tracks_most_recent_transport_outcome() {
        let (mut reconciler, _) = reconciler_with_log();

        assert!(reconciler.apply(StatusChange::StreamAlive, 100).connected);
        assert!(!reconciler.apply(StatusChange::StreamLost, 200).connected);
        assert!(reconciler.apply(StatusChange::StreamAlive, 300).connected);
    }

    #[test]
    fn repeated_liveness_only_advances_timestamp() {
        let (mut reconciler, _) = reconciler_with_log();

        let first = reconciler.apply(StatusChange::StreamAlive, 100);
        let second = reconciler.apply(StatusChange::StreamAlive, 250);

        assert!(first.connected && second.connected);
        assert_eq!(second.last_event_ms, 250);
    }

    #[test]
    fn failure_keeps_last_liveness_time() {
        let (mut reconciler, _) = reconciler_with_log();

        reconciler.apply(StatusChange::StreamAlive, 100);
        let lost = reconciler.apply(StatusChange::StreamLost, 900);

        assert_eq!(lost.last_event_ms, 100);
    }

    #[test]
    fn timestamp_never_moves_backwards() {
        let (mut reconciler, _) = reconciler_with_log();

        reconciler.apply(StatusChange::StreamAlive, 500);
        let skewed = reconciler.apply(StatusChange::StreamAlive, 400);

        assert_eq!(skewed.last_event_ms, 500);
    }

    #[test]
    fn going_offline_forces_disconnected() {
        let (mut reconciler, _) = reconciler_with_log();

        reconciler.apply(StatusChange::StreamAlive, 100);
        let offline = reconciler.apply(StatusChange::Presence { online: false }, 150);

        assert!(!offline.connected);
        assert!(!offline.online);
    }

    #[test]
    fn liveness_while_offline_does_not_connect() {
        let (mut reconciler, _) = reconciler_with_log();

        reconciler.apply(StatusChange::Presence { online: false }, 0);
        let ping = reconciler.apply(StatusChange::StreamAlive, 300);

        assert!(!ping.connected);
        assert_eq!(ping.last_event_ms, 300);
    }

    #[test]
    fn publishes_exactly_one_snapshot_per_change() {
        let (mut reconciler, log) = reconciler_with_log();

        reconciler.apply(StatusChange::StreamAlive, 1);
        reconciler.apply(StatusChange::StreamAlive, 2);
        reconciler.apply(StatusChange::StreamLost, 3);

        let log = log.lock().expect("log");
        assert_eq!(log.len(), 3);
        assert_eq!(log[2], reconciler.status());
    }
}
