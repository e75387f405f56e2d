//! Background token refresh supervisor
//!
//! One task per active client. Every `interval` it asks the credential store
//! to refresh; when the token rotated it rebuilds the shared transport and
//! publishes the new handle. The body is strictly sequential (sleep, check,
//! maybe rotate), so the only state shared with the outside is the
//! cancellation token and the observable [`SupervisorState`].
//!
//! Cancellation interrupts the sleep immediately. A refresh call already in
//! progress is allowed to finish; the loop then exits at its top.

use std::sync::Arc;
use std::time::Duration;

use schwab_auth::{CredentialStore, RefreshOutcome};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::transport::Transport;

/// Lifecycle of the supervisor task.
///
/// Transitions:
/// - Idle → Running (start)
/// - Running → CancelRequested (cancel)
/// - Running | CancelRequested → Stopped (loop exit)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Idle,
    Running,
    CancelRequested,
    Stopped,
}

impl SupervisorState {
    pub fn label(&self) -> &'static str {
        match self {
            SupervisorState::Idle => "idle",
            SupervisorState::Running => "running",
            SupervisorState::CancelRequested => "cancel_requested",
            SupervisorState::Stopped => "stopped",
        }
    }
}

pub struct Supervisor {
    store: Arc<dyn CredentialStore>,
    transport: Arc<Transport>,
    interval: Duration,
    cancel_token: CancellationToken,
    state: Arc<watch::Sender<SupervisorState>>,
    task: Option<JoinHandle<()>>,
}

impl Supervisor {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        transport: Arc<Transport>,
        interval: Duration,
    ) -> Self {
        let (state, _) = watch::channel(SupervisorState::Idle);
        Self {
            store,
            transport,
            interval,
            cancel_token: CancellationToken::new(),
            state: Arc::new(state),
            task: None,
        }
    }

    /// Spawn the loop. Only the first call has an effect.
    pub fn start(&mut self) {
        if self.task.is_some() {
            return;
        }
        self.state.send_replace(SupervisorState::Running);
        self.task = Some(tokio::spawn(run(
            self.store.clone(),
            self.transport.clone(),
            self.interval,
            self.cancel_token.clone(),
            self.state.clone(),
        )));
    }

    pub fn state(&self) -> SupervisorState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SupervisorState> {
        self.state.subscribe()
    }

    /// Ask the loop to stop at its next suspension point.
    pub fn cancel(&self) {
        self.state.send_if_modified(|state| {
            if *state == SupervisorState::Running {
                *state = SupervisorState::CancelRequested;
                true
            } else {
                false
            }
        });
        self.cancel_token.cancel();
    }

    /// Cancel and wait up to `timeout` for the loop to exit.
    ///
    /// Past the deadline the task is aborted and `Teardown` is returned; the
    /// supervisor counts as stopped either way.
    pub async fn stop(mut self, timeout: Duration) -> Result<()> {
        debug!(state = self.state().label(), "stopping refresh supervisor");
        self.cancel();
        let Some(mut task) = self.task.take() else {
            self.state.send_replace(SupervisorState::Stopped);
            return Ok(());
        };

        let result = match tokio::time::timeout(timeout, &mut task).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(Error::Teardown(format!("supervisor task failed: {e}"))),
            Err(_) => {
                task.abort();
                warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    "supervisor did not stop in time, aborted"
                );
                Err(Error::Teardown(format!(
                    "supervisor did not stop within {}ms",
                    timeout.as_millis()
                )))
            }
        };
        self.state.send_replace(SupervisorState::Stopped);
        result
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            self.cancel();
            task.abort();
            self.state.send_replace(SupervisorState::Stopped);
        }
    }
}

async fn run(
    store: Arc<dyn CredentialStore>,
    transport: Arc<Transport>,
    interval: Duration,
    cancel: CancellationToken,
    state: Arc<watch::Sender<SupervisorState>>,
) {
    info!(
        interval_ms = interval.as_millis() as u64,
        shared_transport = transport.is_shared(),
        "refresh supervisor started"
    );
    let mut rotation_pending = false;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
        refresh_cycle(store.as_ref(), &transport, &mut rotation_pending).await;
    }

    state.send_replace(SupervisorState::Stopped);
    info!("refresh supervisor stopped");
}

/// One check: refresh the token, then rotate the transport if it changed.
///
/// `rotation_pending` carries a failed transport rebuild into the next cycle
/// so the new credential still gets a fresh connection pool.
async fn refresh_cycle(
    store: &dyn CredentialStore,
    transport: &Transport,
    rotation_pending: &mut bool,
) {
    let outcome = store.refresh_if_needed().await;
    crate::metrics::record_refresh(outcome.label());

    match outcome {
        RefreshOutcome::NoActionNeeded => debug!("access token still valid"),
        RefreshOutcome::Rotated => {
            debug!("access token rotated");
            if transport.is_shared() {
                *rotation_pending = true;
            }
        }
        RefreshOutcome::Failed(e) => {
            warn!(
                error = %e,
                transient = e.is_transient(),
                "token refresh failed, will retry next cycle"
            );
        }
    }

    if !*rotation_pending {
        return;
    }
    match transport.rotate() {
        Ok(version) => {
            *rotation_pending = false;
            info!(version, "transport rotated");
        }
        Err(e) => {
            warn!(error = %e, "transport rebuild failed, keeping previous handle");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CountingFactory, ScriptedStore, Step};

    const INTERVAL: Duration = Duration::from_millis(30);

    fn transport(factory: CountingFactory, shared: bool) -> Arc<Transport> {
        Arc::new(Transport::open(Arc::new(factory), Duration::from_secs(5), shared).unwrap())
    }

    fn supervisor(store: &Arc<ScriptedStore>, transport: &Arc<Transport>) -> Supervisor {
        Supervisor::new(store.clone(), transport.clone(), INTERVAL)
    }

    #[tokio::test(start_paused = true)]
    async fn version_follows_rotations_only() {
        let store = Arc::new(ScriptedStore::new([Step::Skip, Step::Skip, Step::Rotate]));
        let transport = transport(CountingFactory::default(), true);
        let mut sup = supervisor(&store, &transport);
        sup.start();

        // Sample between cycles (cycles run at 30, 60, 90, ...)
        let mut observed = vec![transport.current().version()];
        tokio::time::sleep(INTERVAL / 2).await;
        for _ in 0..3 {
            tokio::time::sleep(INTERVAL).await;
            observed.push(transport.current().version());
        }
        assert_eq!(observed, vec![0, 0, 0, 1]);

        // Script exhausted: further cycles never rotate
        tokio::time::sleep(INTERVAL * 5).await;
        assert_eq!(transport.current().version(), 1);
        assert!(store.calls() >= 6);

        sup.stop(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn each_rotation_changes_handle_exactly_once() {
        let store = Arc::new(ScriptedStore::new([
            Step::Rotate,
            Step::Skip,
            Step::Rotate,
            Step::Rotate,
            Step::Skip,
        ]));
        let transport = transport(CountingFactory::default(), true);
        let mut sup = supervisor(&store, &transport);
        sup.start();

        // Sample between cycles (cycles run at 30, 60, 90, ...)
        let mut observed = vec![];
        tokio::time::sleep(INTERVAL / 2).await;
        for _ in 0..5 {
            tokio::time::sleep(INTERVAL).await;
            observed.push(transport.current().version());
        }
        assert_eq!(observed, vec![1, 1, 2, 3, 3]);

        sup.stop(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn failure_does_not_stop_the_loop() {
        let store = Arc::new(ScriptedStore::new([Step::Fail, Step::Rotate]));
        let transport = transport(CountingFactory::default(), true);
        let mut sup = supervisor(&store, &transport);
        sup.start();

        tokio::time::sleep(INTERVAL + INTERVAL / 2).await;
        assert_eq!(store.calls(), 1);
        assert_eq!(transport.current().version(), 0);
        assert_eq!(sup.state(), SupervisorState::Running);

        tokio::time::sleep(INTERVAL).await;
        assert_eq!(store.calls(), 2, "cycle N+1 must still run");
        assert_eq!(transport.current().version(), 1);

        sup.stop(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn transport_build_failure_keeps_handle_and_retries() {
        // Initial build succeeds, first rebuild fails, later ones succeed
        let factory = CountingFactory::failing_after(1);
        let transport = transport(factory, true);
        let store = Arc::new(ScriptedStore::new([Step::Rotate, Step::Skip]));
        let mut sup = supervisor(&store, &transport);
        sup.start();

        tokio::time::sleep(INTERVAL + INTERVAL / 2).await;
        assert_eq!(transport.current().version(), 0);
        assert!(transport.checkout().is_ok());
        assert_eq!(sup.state(), SupervisorState::Running);

        sup.stop(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn pending_rotation_retried_on_next_cycle() {
        let store = Arc::new(ScriptedStore::new([Step::Rotate, Step::Skip]));
        // First cycle rotates the token but cannot rebuild the transport
        let failing = transport(CountingFactory::failing_after(1), true);
        let mut pending = false;
        refresh_cycle(store.as_ref(), &failing, &mut pending).await;
        assert!(pending);
        assert_eq!(failing.current().version(), 0);

        // Second cycle needs no token refresh but still owes the rebuild
        let healthy = transport(CountingFactory::default(), true);
        refresh_cycle(store.as_ref(), &healthy, &mut pending).await;
        assert!(!pending);
        assert_eq!(healthy.current().version(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn per_call_transport_is_never_rotated() {
        let store = Arc::new(ScriptedStore::new([Step::Rotate]));
        let factory = Arc::new(CountingFactory::default());
        let transport =
            Arc::new(Transport::open(factory.clone(), Duration::from_secs(5), false).unwrap());
        let mut pending = false;

        refresh_cycle(store.as_ref(), &transport, &mut pending).await;
        assert!(!pending);
        assert_eq!(transport.current().version(), 0);
        assert_eq!(factory.builds(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_while_sleeping_skips_further_checks() {
        let store = Arc::new(ScriptedStore::new([]));
        let transport = transport(CountingFactory::default(), true);
        let mut sup = supervisor(&store, &transport);
        sup.start();

        tokio::time::sleep(INTERVAL + INTERVAL / 2).await;
        assert_eq!(store.calls(), 1);

        let mut state = sup.subscribe();
        sup.cancel();
        assert_eq!(*state.borrow_and_update(), SupervisorState::CancelRequested);
        state
            .wait_for(|s| *s == SupervisorState::Stopped)
            .await
            .unwrap();

        tokio::time::sleep(INTERVAL * 4).await;
        assert_eq!(store.calls(), 1);
        sup.stop(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_refresh_lets_call_finish() {
        let store = Arc::new(ScriptedStore::gated([Step::Rotate]));
        let transport = transport(CountingFactory::default(), true);
        let mut sup = supervisor(&store, &transport);
        sup.start();

        store.gate().entered.notified().await;
        assert_eq!(store.calls(), 1);
        assert_eq!(store.completed(), 0);

        let mut state = sup.subscribe();
        let stopping = tokio::spawn(sup.stop(Duration::from_secs(5)));
        tokio::task::yield_now().await;
        assert_eq!(*state.borrow_and_update(), SupervisorState::CancelRequested);
        assert!(!stopping.is_finished());

        store.gate().release.notify_one();
        stopping.await.unwrap().unwrap();

        assert_eq!(store.completed(), 1, "in-flight refresh must complete");
        assert_eq!(store.calls(), 1, "no new cycle after cancellation");
        assert_eq!(transport.current().version(), 1);
        assert_eq!(*state.borrow(), SupervisorState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_bounded_when_refresh_hangs() {
        let store = Arc::new(ScriptedStore::gated([]));
        let transport = transport(CountingFactory::default(), true);
        let mut sup = supervisor(&store, &transport);
        sup.start();
        store.gate().entered.notified().await;

        let mut state = sup.subscribe();
        let err = sup.stop(Duration::from_millis(100)).await.unwrap_err();
        assert!(matches!(err, Error::Teardown(_)), "got: {err}");
        assert_eq!(*state.borrow_and_update(), SupervisorState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_right_after_start_makes_no_calls() {
        let store = Arc::new(ScriptedStore::new([Step::Rotate]));
        let transport = transport(CountingFactory::default(), true);
        let mut sup = supervisor(&store, &transport);
        sup.start();
        assert_eq!(sup.state(), SupervisorState::Running);

        let state = sup.subscribe();
        sup.stop(Duration::from_secs(1)).await.unwrap();
        assert_eq!(*state.borrow(), SupervisorState::Stopped);
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn stop_without_start_is_clean() {
        let store = Arc::new(ScriptedStore::new([]));
        let transport = transport(CountingFactory::default(), true);
        let sup = supervisor(&store, &transport);
        assert_eq!(sup.state(), SupervisorState::Idle);
        let state = sup.subscribe();
        sup.stop(Duration::from_secs(1)).await.unwrap();
        assert_eq!(*state.borrow(), SupervisorState::Stopped);
    }

    #[test]
    fn state_labels() {
        assert_eq!(SupervisorState::CancelRequested.label(), "cancel_requested");
        assert_eq!(SupervisorState::Stopped.label(), "stopped");
    }
}
