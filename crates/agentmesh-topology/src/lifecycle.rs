//! Lifecycle transitions and background task management shared by all topologies

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Mutex as StdMutex, PoisonError};
use std::time::Duration;

use agentmesh_core::{MeshError, MeshResult, SharedAgent};
use futures::FutureExt;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::pool::DeliveryPool;
use crate::state::{SharedState, TopologyStatus};

/// Background loops owned by a topology
///
/// Loops observe a shared shutdown signal and the running flag; `shutdown`
/// flips the signal, waits for each loop until a deadline and aborts the
/// stragglers.
pub(crate) struct BackgroundTasks {
    state: SharedState,
    shutdown: watch::Sender<bool>,
    handles: StdMutex<Vec<(&'static str, JoinHandle<()>)>>,
}

impl BackgroundTasks {
    fn new(state: SharedState) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            state,
            shutdown,
            handles: StdMutex::new(Vec::new()),
        }
    }

    /// Spawn a task that receives the shutdown signal
    pub(crate) fn spawn<F, Fut>(&self, name: &'static str, task: F)
    where
        F: FnOnce(watch::Receiver<bool>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(task(self.shutdown.subscribe()));
        self.handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((name, handle));
        debug!(task = name, "Started background task");
    }

    /// Spawn a loop running `cycle` every `period`, first after `first_tick`
    ///
    /// The loop ends on shutdown or once the topology is no longer running.
    /// A panicking cycle is logged and the loop carries on.
    pub(crate) fn spawn_periodic<F, Fut>(
        &self,
        name: &'static str,
        period: Duration,
        first_tick: Duration,
        mut cycle: F,
    ) where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let state = self.state.clone();
        self.spawn(name, move |mut shutdown| async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + first_tick, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = ticker.tick() => {}
                }

                if !state.is_running().await {
                    break;
                }

                if let Err(panic) = AssertUnwindSafe(cycle()).catch_unwind().await {
                    error!(task = name, "Background cycle panicked: {}", panic_message(&panic));
                }
            }

            debug!(task = name, "Background task exited");
        });
    }

    async fn shutdown(&self, deadline: Instant) {
        self.shutdown.send_replace(true);
        let handles =
            std::mem::take(&mut *self.handles.lock().unwrap_or_else(PoisonError::into_inner));

        for (name, mut handle) in handles {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(task = name, "Background task ended abnormally: {}", e),
                Err(_) => {
                    warn!(task = name, "Background task still running at deadline, aborting");
                    handle.abort();
                }
            }
        }
    }
}

pub(crate) fn panic_message(panic: &Box<dyn Any + Send>) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

/// Serialized lifecycle transitions for one topology
pub(crate) struct Lifecycle {
    state: SharedState,
    guard: Mutex<()>,
    tasks: BackgroundTasks,
    drain_timeout: Duration,
}

impl Lifecycle {
    pub(crate) fn new(state: SharedState, drain_timeout: Duration) -> Self {
        Self {
            tasks: BackgroundTasks::new(state.clone()),
            state,
            guard: Mutex::new(()),
            drain_timeout,
        }
    }

    pub(crate) fn state(&self) -> &SharedState {
        &self.state
    }

    /// `Created -> Initializing -> Initialized`, initializing `agents` in order
    ///
    /// `agents` runs after the state check, so it can carry topology-specific
    /// preconditions. The first agent that fails leaves the topology in
    /// `Error`.
    pub(crate) async fn initialize<Fut>(&self, agents: Fut) -> MeshResult<()>
    where
        Fut: Future<Output = MeshResult<Vec<SharedAgent>>>,
    {
        let _guard = self.guard.lock().await;

        let status = self.state.status().await;
        if status != TopologyStatus::Created {
            return Err(MeshError::invalid_state("initialize", status));
        }

        let agents = agents.await?;
        self.state.set_status(TopologyStatus::Initializing).await;

        for agent in &agents {
            if let Err(e) = agent.initialize().await {
                error!(agent = %agent.id(), "Agent failed to initialize: {}", e);
                self.state.set_status(TopologyStatus::Error).await;
                return Err(MeshError::AgentLifecycle {
                    agent: agent.id().clone(),
                    reason: e.to_string(),
                });
            }
        }

        self.state.set_status(TopologyStatus::Initialized).await;
        info!("Initialized {} agents", agents.len());
        Ok(())
    }

    /// `Initialized -> Running`, then hand the task set to `launch`
    pub(crate) async fn start<F>(&self, launch: F) -> MeshResult<()>
    where
        F: FnOnce(&BackgroundTasks),
    {
        let _guard = self.guard.lock().await;
        self.state
            .transition("start", &[TopologyStatus::Initialized], TopologyStatus::Running)
            .await?;
        launch(&self.tasks);
        Ok(())
    }

    /// `Running | Error -> Stopping -> Stopped`
    ///
    /// Background loops and in-flight deliveries share one drain deadline.
    /// Agents are shut down last; their failures are logged, not returned.
    pub(crate) async fn stop<Fut>(&self, pool: Option<&DeliveryPool>, agents: Fut) -> MeshResult<()>
    where
        Fut: Future<Output = Vec<SharedAgent>>,
    {
        let _guard = self.guard.lock().await;

        match self.state.status().await {
            TopologyStatus::Stopped => return Ok(()),
            TopologyStatus::Running | TopologyStatus::Stopping | TopologyStatus::Error => {
                self.state.set_status(TopologyStatus::Stopping).await;
            }
            other => return Err(MeshError::invalid_state("stop", other)),
        }

        let deadline = Instant::now() + self.drain_timeout;
        self.tasks.shutdown(deadline).await;

        if let Some(pool) = pool {
            let aborted = pool.drain(deadline).await;
            if aborted > 0 {
                warn!("{} deliveries aborted during stop", aborted);
            }
        }

        for agent in agents.await {
            if let Err(e) = agent.shutdown().await {
                warn!(agent = %agent.id(), "Agent failed to shut down: {}", e);
            }
        }

        self.state.set_status(TopologyStatus::Stopped).await;
        info!("Stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentmesh_testing::MockAgent;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn lifecycle() -> Lifecycle {
        Lifecycle::new(SharedState::new("t", "test"), Duration::from_secs(5))
    }

    fn agents(ids: &[&str]) -> Vec<SharedAgent> {
        ids.iter()
            .map(|id| Arc::new(MockAgent::new(id)) as SharedAgent)
            .collect()
    }

    #[tokio::test]
    async fn test_full_cycle() {
        let lifecycle = lifecycle();
        let roster = agents(&["a", "b"]);

        lifecycle.initialize(async { Ok(roster.clone()) }).await.unwrap();
        assert_eq!(lifecycle.state().status().await, TopologyStatus::Initialized);

        lifecycle.start(|_| {}).await.unwrap();
        assert!(lifecycle.state().is_running().await);

        lifecycle.stop(None, async { roster.clone() }).await.unwrap();
        assert_eq!(lifecycle.state().status().await, TopologyStatus::Stopped);
        assert!(roster.iter().all(|a| a.status() == agentmesh_core::AgentStatus::ShutDown));

        // Idempotent
        lifecycle.stop(None, async { Vec::new() }).await.unwrap();
    }

    #[tokio::test]
    async fn test_initialize_failure_enters_error() {
        let lifecycle = lifecycle();
        let failing = Arc::new(MockAgent::new("bad"));
        failing.fail_initialize("no sensor");
        let roster: Vec<SharedAgent> = vec![failing];

        let err = lifecycle.initialize(async { Ok(roster.clone()) }).await.unwrap_err();
        assert!(matches!(err, MeshError::AgentLifecycle { ref agent, .. } if agent.as_str() == "bad"));
        assert_eq!(lifecycle.state().status().await, TopologyStatus::Error);

        assert!(lifecycle.start(|_| {}).await.is_err());
        lifecycle.stop(None, async { roster.clone() }).await.unwrap();
        assert_eq!(lifecycle.state().status().await, TopologyStatus::Stopped);
    }

    #[tokio::test]
    async fn test_invalid_transitions() {
        let lifecycle = lifecycle();
        assert!(matches!(
            lifecycle.start(|_| {}).await,
            Err(MeshError::InvalidState { operation: "start", .. })
        ));
        assert!(matches!(
            lifecycle.stop(None, async { Vec::new() }).await,
            Err(MeshError::InvalidState { operation: "stop", .. })
        ));

        lifecycle.initialize(async { Ok(Vec::new()) }).await.unwrap();
        assert!(lifecycle.initialize(async { Ok(Vec::new()) }).await.is_err());
    }

    #[tokio::test]
    async fn test_precondition_failure_leaves_state_untouched() {
        let lifecycle = lifecycle();
        let err = lifecycle
            .initialize(async { Err(MeshError::MissingHub) })
            .await
            .unwrap_err();
        assert_eq!(err, MeshError::MissingHub);
        assert_eq!(lifecycle.state().status().await, TopologyStatus::Created);
    }

    #[tokio::test]
    async fn test_periodic_task_survives_panic_and_stops() {
        let lifecycle = lifecycle();
        lifecycle.initialize(async { Ok(Vec::new()) }).await.unwrap();

        let cycles = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&cycles);
        lifecycle
            .start(|tasks| {
                tasks.spawn_periodic(
                    "test",
                    Duration::from_millis(5),
                    Duration::ZERO,
                    move || {
                        let counter = Arc::clone(&counter);
                        async move {
                            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                                panic!("first cycle fails");
                            }
                        }
                    },
                );
            })
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        lifecycle.stop(None, async { Vec::new() }).await.unwrap();

        let after_stop = cycles.load(Ordering::SeqCst);
        assert!(after_stop >= 2);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(cycles.load(Ordering::SeqCst), after_stop);
    }
}
