// Periodic background task with idempotent start/stop
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    Continue,
    Stop,
}

#[derive(Debug, Default)]
pub struct AutoRefresh {
    handle: Option<JoinHandle<()>>,
}

impl AutoRefresh {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `tick` every `period`, first after one full period. Replaces any
    /// running task. The task ends when `tick` returns `Tick::Stop`.
    pub fn start<F, Fut>(&mut self, period: Duration, mut tick: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Tick> + Send + 'static,
    {
        self.stop();
        let period = period.max(Duration::from_millis(100));
        self.handle = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if tick().await == Tick::Stop {
                    tracing::info!("Auto-refresh stopped itself");
                    break;
                }
            }
        }));
    }

    /// Returns true if a task was running
    pub fn stop(&mut self) -> bool {
        match self.handle.take() {
            Some(handle) => {
                let was_running = !handle.is_finished();
                handle.abort();
                was_running
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for AutoRefresh {
    fn drop(&mut self) {
        self.stop();
    }
}
