//! Single-threaded cooperative scheduler.
//!
//! One task owns the state `S` and runs queued jobs against it, one at a time.
//! Everything that touches the display (timers, frame ticks, worker results) is a
//! job on this queue. Workers hop back in with [`SchedulerHandle::call`].

use crate::error::{AgentError, AgentResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::AbortHandle;
use tracing::{debug, info};

type Job<S> = Box<dyn FnOnce(&mut S) + Send + 'static>;

enum Message<S> {
    Run(Job<S>),
    Shutdown,
}

/// Owning side of the queue. Consumed by [`Scheduler::run`].
pub struct Scheduler<S> {
    rx: mpsc::UnboundedReceiver<Message<S>>,
    handle: SchedulerHandle<S>,
}

impl<S: 'static> Scheduler<S> {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            rx,
            handle: SchedulerHandle { tx },
        }
    }

    pub fn handle(&self) -> SchedulerHandle<S> {
        self.handle.clone()
    }

    /// Run jobs until [`SchedulerHandle::shutdown`] is posted. Returns the final state.
    ///
    /// The scheduler keeps its own handle alive, so the queue never closes on its own.
    pub async fn run(mut self, mut state: S) -> S {
        info!("🗓️ Scheduler running");
        while let Some(message) = self.rx.recv().await {
            match message {
                Message::Run(job) => job(&mut state),
                Message::Shutdown => break,
            }
        }
        info!("🛑 Scheduler stopped");
        state
    }
}

impl<S: 'static> Default for Scheduler<S> {
    fn default() -> Self {
        Self::new()
    }
}

/// Cheap, cloneable, `Send` handle used to enqueue work.
pub struct SchedulerHandle<S> {
    tx: mpsc::UnboundedSender<Message<S>>,
}

impl<S> Clone for SchedulerHandle<S> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<S: 'static> SchedulerHandle<S> {
    /// Queue `job` behind everything already posted. Returns false once shut down.
    pub fn post<F>(&self, job: F) -> bool
    where
        F: FnOnce(&mut S) + Send + 'static,
    {
        self.tx.send(Message::Run(Box::new(job))).is_ok()
    }

    /// Queue `job` after `delay`. The returned handle cancels it; dropping the handle does not.
    ///
    /// A cancelled timer never runs, even when its job was already queued.
    pub fn post_after<F>(&self, delay: Duration, job: F) -> TimerHandle
    where
        F: FnOnce(&mut S) + Send + 'static,
    {
        let cancelled = Arc::new(AtomicBool::new(false));
        let guard = Arc::clone(&cancelled);
        let tx = self.tx.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let job: Job<S> = Box::new(move |state: &mut S| {
                if !guard.load(Ordering::SeqCst) {
                    job(state);
                }
            });
            let _ = tx.send(Message::Run(job));
        });

        TimerHandle {
            cancelled,
            task: task.abort_handle(),
        }
    }

    /// Run `f` on the scheduler and wait for its result.
    pub async fn call<F, R>(&self, f: F) -> AgentResult<R>
    where
        F: FnOnce(&mut S) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let posted = self.post(move |state| {
            let _ = reply_tx.send(f(state));
        });
        if !posted {
            return Err(AgentError::SchedulerClosed);
        }
        reply_rx.await.map_err(|_| AgentError::SchedulerClosed)
    }

    /// Ask the run loop to exit after the jobs already queued.
    pub fn shutdown(&self) {
        debug!("Scheduler shutdown requested");
        let _ = self.tx.send(Message::Shutdown);
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Pending timer created by [`SchedulerHandle::post_after`].
#[derive(Debug)]
pub struct TimerHandle {
    cancelled: Arc<AtomicBool>,
    task: AbortHandle,
}

impl TimerHandle {
    /// Stop the timer. Safe to call after it fired.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.task.abort();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn jobs_run_in_post_order() {
        let scheduler = Scheduler::<Vec<u32>>::new();
        let handle = scheduler.handle();
        let runner = tokio::spawn(scheduler.run(Vec::new()));

        for i in 0..5 {
            handle.post(move |v| v.push(i));
        }
        let len = handle.call(|v| v.len()).await.unwrap();
        assert_eq!(len, 5);

        handle.shutdown();
        let state = runner.await.unwrap();
        assert_eq!(state, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test(start_paused = true)]
    async fn timers_fire_after_delay_and_cancel_cleanly() {
        let scheduler = Scheduler::<Vec<&'static str>>::new();
        let handle = scheduler.handle();
        let runner = tokio::spawn(scheduler.run(Vec::new()));

        let _kept = handle.post_after(Duration::from_millis(50), |v| v.push("fired"));
        let cancelled = handle.post_after(Duration::from_millis(50), |v| v.push("cancelled"));
        cancelled.cancel();
        assert!(cancelled.is_cancelled());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(handle.call(|v| v.is_empty()).await.unwrap());

        tokio::time::sleep(Duration::from_millis(100)).await;
        let seen = handle.call(|v| v.clone()).await.unwrap();
        assert_eq!(seen, vec!["fired"]);

        handle.shutdown();
        runner.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_after_enqueue_still_suppresses_job() {
        let scheduler = Scheduler::<Vec<u8>>::new();
        let handle = scheduler.handle();

        let timer = handle.post_after(Duration::from_millis(5), |v| v.push(1));
        // Let the timer task enqueue its job before the run loop starts.
        tokio::time::sleep(Duration::from_millis(10)).await;
        timer.cancel();

        let runner = tokio::spawn(scheduler.run(Vec::new()));
        let seen = handle.call(|v| v.clone()).await.unwrap();
        assert!(seen.is_empty());
        handle.shutdown();
        runner.await.unwrap();
    }

    #[tokio::test]
    async fn call_after_shutdown_reports_closed() {
        let scheduler = Scheduler::<()>::new();
        let handle = scheduler.handle();
        handle.shutdown();
        scheduler.run(()).await;
        tokio_test::assert_err!(handle.call(|_| ()).await);
    }
}
