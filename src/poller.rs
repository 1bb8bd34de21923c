use crate::player::{PlayerEvent, Subscription};
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

/// A running background task. Aborted on `cancel()` or drop, so it can never
/// outlive its owner.
pub struct PollHandle {
    name: String,
    task: JoinHandle<()>,
}

impl PollHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub fn cancel(self) {}
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        debug!("stopping {}", self.name);
        self.task.abort();
    }
}

/// Run `tick` now and then every `period` until the handle goes away.
/// A slow tick delays the next one instead of bursting to catch up.
pub fn spawn_poller<F, Fut>(name: &str, period: Duration, mut tick: F) -> PollHandle
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            tick().await;
        }
    });
    PollHandle {
        name: name.to_string(),
        task,
    }
}

/// Owner of the timers and listeners of one view (now-playing bar, library).
/// `teardown` (or drop) stops all of them.
#[derive(Default)]
pub struct ViewScope {
    tasks: Vec<PollHandle>,
}

impl ViewScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn poll<F, Fut>(&mut self, name: &str, period: Duration, tick: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.tasks.push(spawn_poller(name, period, tick));
    }

    /// Feed player events to `handler` until teardown; the subscription is
    /// dropped with the task.
    pub fn listen<F>(&mut self, name: &str, mut subscription: Subscription, mut handler: F)
    where
        F: FnMut(PlayerEvent) + Send + 'static,
    {
        let task = tokio::spawn(async move {
            while let Some(ev) = subscription.recv().await {
                handler(ev);
            }
        });
        self.tasks.push(PollHandle {
            name: name.to_string(),
            task,
        });
    }

    pub fn active(&self) -> usize {
        self.tasks.iter().filter(|t| !t.is_finished()).count()
    }

    pub fn teardown(&mut self) {
        self.tasks.clear();
    }
}
