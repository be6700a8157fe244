//! Async driver: executes state-machine directives on the tokio runtime.

use std::sync::Arc;

use status_core::{
    ConnectionStatus, Directive, Generation, MonitorError, MonitorInput, MonitorStateMachine,
    NotificationBus, PresenceSignal, RetryPolicy, StatusStream, Subscription,
};
use status_platform::{Clock, PresenceListener, PresenceSource, SystemClock};
use tokio::{
    sync::{Mutex, broadcast::error::RecvError, mpsc},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    config::MonitorConfig,
    transport::{SseTransport, StreamTransport, TransportSink},
};

const INPUT_BUFFER: usize = 256;

#[derive(Debug)]
struct RunningMonitor {
    stop: CancellationToken,
    task: JoinHandle<()>,
}

impl RunningMonitor {
    async fn shutdown(self) {
        self.stop.cancel();
        if let Err(err) = self.task.await {
            warn!(error = %err, "status monitor task ended abnormally");
        }
    }
}

/// Live connection-status monitor.
///
/// Observers registered with [`StatusMonitor::subscribe`] survive
/// `stop`/`start` cycles; every `start` creates a fresh stream and backoff.
pub struct StatusMonitor {
    transport: Arc<dyn StreamTransport>,
    presence: Arc<dyn PresenceSource>,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
    bus: NotificationBus,
    running: Mutex<Option<RunningMonitor>>,
}

impl StatusMonitor {
    pub fn new<T, P, C>(transport: T, presence: P, clock: C, config: &MonitorConfig) -> Self
    where
        T: StreamTransport,
        P: PresenceSource + 'static,
        C: Clock + 'static,
    {
        let bus = NotificationBus::new(config.stream_buffer);
        bus.seed(ConnectionStatus::initial(presence.current().unwrap_or(true)));
        Self {
            transport: Arc::new(transport),
            presence: Arc::new(presence),
            clock: Arc::new(clock),
            policy: config.retry_policy,
            bus,
            running: Mutex::new(None),
        }
    }

    /// Monitor `config`'s endpoint over SSE using the system clock.
    pub fn connect<P>(config: &MonitorConfig, presence: P) -> Result<Self, MonitorError>
    where
        P: PresenceSource + 'static,
    {
        config.validate()?;
        let transport = SseTransport::new(config)?;
        Ok(Self::new(transport, presence, SystemClock, config))
    }

    /// Begin monitoring. Calling it again restarts from a clean state.
    pub async fn start(&self) {
        let mut guard = self.running.lock().await;
        if let Some(previous) = guard.take() {
            debug!("restarting status monitor");
            previous.shutdown().await;
        }

        let presence_rx = match self.presence.listen() {
            Ok(listener) => Some(listener),
            Err(err) => {
                debug!(error = %err, "presence notifications unavailable; assuming online");
                None
            }
        };

        let (input_tx, input_rx) = mpsc::channel(INPUT_BUFFER);
        let mut runtime = MonitorRuntime {
            machine: MonitorStateMachine::new(
                self.bus.clone(),
                self.policy,
                self.presence.current(),
            ),
            transport: Arc::clone(&self.transport),
            clock: Arc::clone(&self.clock),
            input_tx,
            input_rx,
            presence_rx,
            stream: None,
            timer: None,
            retired: Vec::new(),
        };
        let directives = runtime.machine.start();
        runtime.execute(directives);

        let stop = CancellationToken::new();
        let stop_child = stop.child_token();
        let task = tokio::spawn(runtime.run(stop_child));
        info!("status monitor started");

        *guard = Some(RunningMonitor { stop, task });
    }

    /// Stop monitoring and release the stream, timer and presence listener.
    ///
    /// No queued callback can change the status once this returns.
    pub async fn stop(&self) {
        let running = self.running.lock().await.take();
        if let Some(running) = running {
            running.shutdown().await;
            info!("status monitor stopped");
        }
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    /// Receive a snapshot on every status change.
    pub fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn(ConnectionStatus) + Send + Sync + 'static,
    {
        self.bus.subscribe(observer)
    }

    /// Snapshot stream for async consumers.
    pub fn watch(&self) -> StatusStream {
        self.bus.stream()
    }

    /// Current status without subscribing.
    pub fn status(&self) -> ConnectionStatus {
        self.bus.latest()
    }
}

impl Drop for StatusMonitor {
    fn drop(&mut self) {
        // The runtime tears down its stream, timer and listener on its own.
        if let Some(running) = self.running.get_mut().take() {
            running.stop.cancel();
        }
    }
}

#[derive(Debug)]
struct ScheduledTask {
    id: Generation,
    task: JoinHandle<()>,
}

struct MonitorRuntime {
    machine: MonitorStateMachine,
    transport: Arc<dyn StreamTransport>,
    clock: Arc<dyn Clock>,
    input_tx: mpsc::Sender<MonitorInput>,
    input_rx: mpsc::Receiver<MonitorInput>,
    presence_rx: Option<PresenceListener>,
    stream: Option<ScheduledTask>,
    timer: Option<ScheduledTask>,
    retired: Vec<JoinHandle<()>>,
}

impl MonitorRuntime {
    async fn run(mut self, stop: CancellationToken) {
        loop {
            tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                Some(input) = self.input_rx.recv() => self.dispatch(input),
                signal = next_presence(&mut self.presence_rx) => match signal {
                    Some(signal) => self.dispatch(MonitorInput::Presence(signal)),
                    None => {
                        debug!("presence source closed");
                        self.presence_rx = None;
                    }
                },
            }
        }

        let directives = self.machine.stop();
        self.execute(directives);
        self.presence_rx = None;
        for task in self.retired.drain(..) {
            // Cancellation is the expected outcome.
            let _ = task.await;
        }
    }

    fn dispatch(&mut self, input: MonitorInput) {
        let now_ms = self.clock.now_ms();
        let directives = self.machine.handle(input, now_ms);
        self.execute(directives);
    }

    fn execute(&mut self, directives: Vec<Directive>) {
        self.retired.retain(|task| !task.is_finished());

        for directive in directives {
            match directive {
                Directive::OpenStream { generation } => {
                    if let Some(previous) = self.stream.take() {
                        self.retire(previous);
                    }
                    let sink = TransportSink::new(generation, self.input_tx.clone());
                    let task = tokio::spawn(self.transport.run(sink));
                    self.stream = Some(ScheduledTask {
                        id: generation,
                        task,
                    });
                }
                Directive::CloseStream { generation } => {
                    if let Some(stream) = take_if_id(&mut self.stream, generation) {
                        self.retire(stream);
                    }
                }
                Directive::ScheduleReconnect { timer, delay } => {
                    if let Some(previous) = self.timer.take() {
                        self.retire(previous);
                    }
                    let input_tx = self.input_tx.clone();
                    let task = tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        let _ = input_tx.send(MonitorInput::ReconnectDue { timer }).await;
                    });
                    self.timer = Some(ScheduledTask { id: timer, task });
                }
                Directive::CancelReconnect { timer } => {
                    if let Some(pending) = take_if_id(&mut self.timer, timer) {
                        self.retire(pending);
                    }
                }
            }
        }
    }

    fn retire(&mut self, scheduled: ScheduledTask) {
        scheduled.task.abort();
        self.retired.push(scheduled.task);
    }
}

fn take_if_id(slot: &mut Option<ScheduledTask>, id: Generation) -> Option<ScheduledTask> {
    if slot.as_ref().is_some_and(|scheduled| scheduled.id == id) {
        slot.take()
    } else {
        None
    }
}

/// Next presence signal; pends forever when there is no listener.
async fn next_presence(listener: &mut Option<PresenceListener>) -> Option<PresenceSignal> {
    let Some(listener) = listener.as_mut() else {
        return std::future::pending().await;
    };
    loop {
        match listener.recv().await {
            Ok(signal) => return Some(signal),
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "presence listener lagged; continuing with newer signals");
            }
            Err(RecvError::Closed) => return None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            Mutex as StdMutex,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };

    use futures_util::future::BoxFuture;
    use status_core::TransportEvent;
    use status_platform::{ManualClock, ManualPresence, UnsupportedPresence};

    use super::*;

    /// Transport whose handles stay open until the test drives them.
    #[derive(Clone, Default)]
    struct ScriptedTransport {
        sinks: Arc<StdMutex<Vec<TransportSink>>>,
        live: Arc<AtomicUsize>,
    }

    /// Counts one handle as live until its future is dropped.
    struct LiveHandle(Arc<AtomicUsize>);

    impl LiveHandle {
        fn new(live: &Arc<AtomicUsize>) -> Self {
            live.fetch_add(1, Ordering::SeqCst);
            Self(Arc::clone(live))
        }
    }

    impl Drop for LiveHandle {
        fn drop(&mut self) {
            self.0.fetch_sub(1, Ordering::SeqCst);
        }
    }

    impl ScriptedTransport {
        fn opened(&self) -> usize {
            self.sinks.lock().expect("sinks").len()
        }

        fn sink(&self, index: usize) -> TransportSink {
            self.sinks.lock().expect("sinks")[index].clone()
        }

        fn latest_sink(&self) -> TransportSink {
            self.sinks
                .lock()
                .expect("sinks")
                .last()
                .cloned()
                .expect("a stream should be open")
        }

        fn live_handles(&self) -> usize {
            self.live.load(Ordering::SeqCst)
        }
    }

    impl StreamTransport for ScriptedTransport {
        fn run(&self, sink: TransportSink) -> BoxFuture<'static, ()> {
            self.sinks.lock().expect("sinks").push(sink);
            let guard = LiveHandle::new(&self.live);
            Box::pin(async move {
                let _guard = guard;
                std::future::pending::<()>().await
            })
        }
    }

    struct Fixture {
        monitor: StatusMonitor,
        transport: ScriptedTransport,
        presence: Arc<ManualPresence>,
        clock: ManualClock,
    }

    fn fixture() -> Fixture {
        let transport = ScriptedTransport::default();
        let presence = Arc::new(ManualPresence::new(true));
        let clock = ManualClock::new(0);
        let monitor = StatusMonitor::new(
            transport.clone(),
            Arc::clone(&presence),
            clock.clone(),
            &MonitorConfig::new("http://localhost:8080"),
        );
        Fixture {
            monitor,
            transport,
            presence,
            clock,
        }
    }

    async fn settle() {
        for _ in 0..32 {
            tokio::task::yield_now().await;
        }
    }

    async fn next_snapshot(stream: &mut StatusStream) -> ConnectionStatus {
        tokio::time::timeout(Duration::from_secs(1), stream.recv())
            .await
            .expect("snapshot timeout")
            .expect("snapshot receive")
    }

    fn failure() -> TransportEvent {
        TransportEvent::Failed {
            reason: "connection reset".to_owned(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn end_to_end_open_fail_and_reconnect() {
        let f = fixture();
        let mut snapshots = f.monitor.watch();
        f.monitor.start().await;
        assert_eq!(f.transport.opened(), 1);

        f.clock.set(1_000);
        assert!(f.transport.sink(0).emit(TransportEvent::Opened).await);
        assert_eq!(
            next_snapshot(&mut snapshots).await,
            ConnectionStatus {
                connected: true,
                online: true,
                last_event_ms: 1_000,
            }
        );

        f.clock.set(4_000);
        assert!(f.transport.sink(0).emit(failure()).await);
        assert_eq!(
            next_snapshot(&mut snapshots).await,
            ConnectionStatus {
                connected: false,
                online: true,
                last_event_ms: 1_000,
            }
        );
        settle().await;

        tokio::time::advance(Duration::from_millis(1_999)).await;
        settle().await;
        assert_eq!(f.transport.opened(), 1);

        tokio::time::advance(Duration::from_millis(1)).await;
        settle().await;
        assert_eq!(f.transport.opened(), 2);

        f.monitor.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn consecutive_failures_schedule_one_attempt() {
        let f = fixture();
        let mut snapshots = f.monitor.watch();
        f.monitor.start().await;

        let sink = f.transport.sink(0);
        sink.emit(failure()).await;
        sink.emit(failure()).await;
        next_snapshot(&mut snapshots).await;
        settle().await;

        tokio::time::advance(Duration::from_millis(2_000)).await;
        settle().await;
        assert_eq!(f.transport.opened(), 2);

        tokio::time::advance(Duration::from_secs(60)).await;
        settle().await;
        assert_eq!(f.transport.opened(), 2);

        f.monitor.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_grows_between_attempts() {
        let f = fixture();
        f.monitor.start().await;

        f.transport.latest_sink().emit(failure()).await;
        settle().await;
        tokio::time::advance(Duration::from_millis(2_000)).await;
        settle().await;
        assert_eq!(f.transport.opened(), 2);

        f.transport.latest_sink().emit(failure()).await;
        settle().await;
        tokio::time::advance(Duration::from_millis(3_199)).await;
        settle().await;
        assert_eq!(f.transport.opened(), 2);
        tokio::time::advance(Duration::from_millis(1)).await;
        settle().await;
        assert_eq!(f.transport.opened(), 3);

        f.monitor.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn presence_transitions_drive_status_and_reconnect() {
        let f = fixture();
        let mut snapshots = f.monitor.watch();
        f.monitor.start().await;
        f.transport.sink(0).emit(TransportEvent::Opened).await;
        assert!(next_snapshot(&mut snapshots).await.connected);

        f.presence.set_online(false);
        let offline = next_snapshot(&mut snapshots).await;
        assert!(!offline.connected);
        assert!(!offline.online);

        f.presence.set_online(true);
        let online = next_snapshot(&mut snapshots).await;
        assert!(online.online);
        settle().await;
        assert_eq!(f.transport.opened(), 2);

        // The reconnect replaced the old handle; its events are stale now.
        f.transport.sink(0).emit(TransportEvent::Heartbeat).await;
        f.transport.sink(1).emit(TransportEvent::Opened).await;
        assert!(next_snapshot(&mut snapshots).await.connected);

        f.monitor.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn reachable_resets_escalated_backoff() {
        let f = fixture();
        f.monitor.start().await;

        f.transport.latest_sink().emit(failure()).await;
        settle().await;
        tokio::time::advance(Duration::from_millis(2_000)).await;
        settle().await;
        f.transport.latest_sink().emit(failure()).await;
        settle().await;
        assert_eq!(f.transport.opened(), 2);

        f.presence.set_online(true);
        settle().await;
        assert_eq!(f.transport.opened(), 3);

        // The 3.2s timer armed before was cancelled; the next one is back to 2s.
        f.transport.latest_sink().emit(failure()).await;
        settle().await;
        tokio::time::advance(Duration::from_millis(2_000)).await;
        settle().await;
        assert_eq!(f.transport.opened(), 4);

        f.monitor.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn restart_keeps_single_handle_and_listener() {
        let f = fixture();

        f.monitor.start().await;
        f.monitor.start().await;
        assert_eq!(f.presence.listener_count(), 1);
        assert_eq!(f.transport.live_handles(), 1);

        f.monitor.stop().await;
        assert_eq!(f.presence.listener_count(), 0);
        assert_eq!(f.transport.live_handles(), 0);

        f.monitor.start().await;
        assert_eq!(f.presence.listener_count(), 1);
        assert_eq!(f.transport.live_handles(), 1);
        assert_eq!(f.transport.opened(), 3);

        f.monitor.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_silences_queued_callbacks_and_timers() {
        let f = fixture();
        let mut snapshots = f.monitor.watch();
        f.monitor.start().await;
        let sink = f.transport.sink(0);
        sink.emit(failure()).await;
        next_snapshot(&mut snapshots).await;

        f.monitor.stop().await;
        let status = f.monitor.status();

        assert!(!sink.emit(TransportEvent::Opened).await);
        tokio::time::advance(Duration::from_secs(60)).await;
        settle().await;

        assert_eq!(f.transport.opened(), 1);
        assert_eq!(f.monitor.status(), status);
        assert!(!f.monitor.is_running().await);
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_observer_does_not_starve_others() {
        let f = fixture();
        let delivered = Arc::new(AtomicUsize::new(0));
        f.monitor.subscribe(|_| panic!("observer failure"));
        let counter = Arc::clone(&delivered);
        f.monitor.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let mut snapshots = f.monitor.watch();

        f.monitor.start().await;
        f.transport.sink(0).emit(TransportEvent::Opened).await;
        next_snapshot(&mut snapshots).await;
        f.transport.sink(0).emit(TransportEvent::Heartbeat).await;
        next_snapshot(&mut snapshots).await;

        assert_eq!(delivered.load(Ordering::SeqCst), 2);
        f.monitor.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn unsupported_presence_assumes_online() {
        let transport = ScriptedTransport::default();
        let monitor = StatusMonitor::new(
            transport.clone(),
            UnsupportedPresence,
            ManualClock::new(5),
            &MonitorConfig::new("http://localhost:8080"),
        );
        assert!(monitor.status().online);

        let mut snapshots = monitor.watch();
        monitor.start().await;
        transport.sink(0).emit(TransportEvent::Opened).await;

        let status = next_snapshot(&mut snapshots).await;
        assert!(status.connected && status.online);
        monitor.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_a_running_monitor_releases_its_resources() {
        let f = fixture();
        f.monitor.start().await;
        f.transport.sink(0).emit(failure()).await;
        settle().await;
        assert_eq!(f.transport.live_handles(), 0);
        assert_eq!(f.presence.listener_count(), 1);

        drop(f.monitor);
        settle().await;
        assert_eq!(f.presence.listener_count(), 0);

        // The armed reconnect timer died with the runtime.
        tokio::time::advance(Duration::from_secs(60)).await;
        settle().await;
        assert_eq!(f.transport.opened(), 1);
        assert_eq!(f.transport.live_handles(), 0);
    }

    #[tokio::test]
    async fn stop_before_start_is_a_no_op() {
        let f = fixture();
        f.monitor.stop().await;
        assert!(!f.monitor.is_running().await);
        assert_eq!(f.monitor.status(), ConnectionStatus::initial(true));
    }

    #[test]
    fn connect_rejects_invalid_config() {
        let result = StatusMonitor::connect(&MonitorConfig::new("not a url"), UnsupportedPresence);
        let err = result.err().expect("invalid url must fail");
        assert_eq!(err.code, "invalid_url");
    }
}
