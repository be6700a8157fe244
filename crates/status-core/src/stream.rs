use tracing::debug;

use crate::{
    retry::{Backoff, RetryPolicy},
    types::{Directive, Generation},
};

/// Bookkeeping for the single stream handle and the single reconnect timer.
///
/// The supervisor performs no I/O. It hands out generation ids and returns the
/// [`Directive`]s the driver must execute. Any handle or timer whose id is no
/// longer current is stale and its events are ignored.
#[derive(Debug, Clone)]
pub struct StreamSupervisor {
    backoff: Backoff,
    active: Option<Generation>,
    pending_timer: Option<Generation>,
    next_generation: Generation,
}

impl StreamSupervisor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            backoff: Backoff::new(policy),
            active: None,
            pending_timer: None,
            next_generation: 1,
        }
    }

    pub fn active(&self) -> Option<Generation> {
        self.active
    }

    pub fn pending_timer(&self) -> Option<Generation> {
        self.pending_timer
    }

    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    pub fn is_current(&self, generation: Generation) -> bool {
        self.active == Some(generation)
    }

    /// Replace any existing handle with a fresh one.
    pub fn open(&mut self) -> Vec<Directive> {
        let mut directives = Vec::with_capacity(2);
        if let Some(previous) = self.active.take() {
            directives.push(Directive::CloseStream {
                generation: previous,
            });
        }
        let generation = self.allocate();
        self.active = Some(generation);
        debug!(generation, "opening stream");
        directives.push(Directive::OpenStream { generation });
        directives
    }

    /// Record a successful open. Returns `false` for a stale handle.
    pub fn on_opened(&mut self, generation: Generation) -> bool {
        if !self.is_current(generation) {
            return false;
        }
        self.backoff.reset();
        true
    }

    /// Discard a failed handle and arm the reconnect timer if none is pending.
    pub fn on_failed(&mut self, generation: Generation) -> Vec<Directive> {
        if !self.is_current(generation) {
            return Vec::new();
        }
        self.active = None;

        let mut directives = vec![Directive::CloseStream { generation }];
        if self.pending_timer.is_some() {
            return directives;
        }

        let timer = self.allocate();
        let delay = self.backoff.current();
        self.pending_timer = Some(timer);
        debug!(
            timer,
            delay_ms = delay.as_millis() as u64,
            "scheduling reconnect"
        );
        directives.push(Directive::ScheduleReconnect { timer, delay });
        directives
    }

    /// Reconnect timer elapsed: grow the delay for the next failure, then reopen.
    pub fn on_timer(&mut self, timer: Generation) -> Vec<Directive> {
        if self.pending_timer != Some(timer) {
            return Vec::new();
        }
        self.pending_timer = None;
        self.backoff.advance();
        self.open()
    }

    /// Reconnect immediately from the base delay, dropping any pending timer.
    pub fn reconnect_now(&mut self) -> Vec<Directive> {
        self.backoff.reset();
        let mut directives = self.cancel_timer();
        directives.extend(self.open());
        directives
    }

    /// Tear down the handle and the timer without scheduling anything.
    pub fn close(&mut self) -> Vec<Directive> {
        let mut directives = self.cancel_timer();
        if let Some(generation) = self.active.take() {
            directives.push(Directive::CloseStream { generation });
        }
        directives
    }

    fn cancel_timer(&mut self) -> Vec<Directive> {
        self.pending_timer
            .take()
            .map(|timer| vec![Directive::CancelReconnect { timer }])
            .unwrap_or_default()
    }

    fn allocate(&mut self) -> Generation {
        let generation = self.next_generation;
        self.next_generation += 1;
        generation
    }
}
