use crate::types::PresenceSignal;

/// Last presence value reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresenceTracker {
    online: bool,
}

impl PresenceTracker {
    /// Seed from the host report; hosts that cannot report count as online.
    pub fn new(reported: Option<bool>) -> Self {
        Self {
            online: reported.unwrap_or(true),
        }
    }

    pub fn is_online(&self) -> bool {
        self.online
    }

    /// Record a presence notification and return the new presence.
    pub fn apply(&mut self, signal: PresenceSignal) -> bool {
        self.online = signal.is_online();
        self.online
    }
}

impl Default for PresenceTracker {
    fn default() -> Self {
        Self::new(None)
    }
}
