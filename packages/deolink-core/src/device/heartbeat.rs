//! Keep-alive timer for the device connection.
//!
//! DeoVR disconnects clients after a few seconds of silence. While a
//! connection is up, a [`HeartbeatTimer`] posts a tick into the connection
//! manager's event queue once per period; the manager writes the actual
//! keep-alive frame so all writes stay on one timeline.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::connection::LinkEvent;

/// Handle to the single recurring heartbeat task.
///
/// Starting a new timer always cancels the previous one. Stopping is
/// idempotent, and dropping the handle stops the task.
#[derive(Default)]
pub struct HeartbeatTimer {
    task: Option<JoinHandle<()>>,
}

impl HeartbeatTimer {
    /// Creates an inactive timer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts ticking for connection `generation`, replacing any running timer.
    pub(crate) fn start(
        &mut self,
        period: Duration,
        generation: u64,
        events: mpsc::UnboundedSender<LinkEvent>,
    ) {
        self.stop();

        self.task = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; the device needs nothing yet.
            interval.tick().await;

            loop {
                interval.tick().await;
                if events.send(LinkEvent::HeartbeatTick { generation }).is_err() {
                    break;
                }
            }
        }));
    }

    /// Cancels the running timer, if any.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    #[cfg(test)]
    pub(crate) fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for HeartbeatTimer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn ticks_once_per_period() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timer = HeartbeatTimer::new();
        timer.start(Duration::from_millis(1000), 7, tx);
        assert!(timer.is_active());

        tokio::time::sleep(Duration::from_millis(2500)).await;

        let mut ticks = 0;
        while let Ok(event) = rx.try_recv() {
            assert!(matches!(event, LinkEvent::HeartbeatTick { generation: 7 }));
            ticks += 1;
        }
        assert_eq!(ticks, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_replaces_previous_timer() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timer = HeartbeatTimer::new();
        timer.start(Duration::from_millis(1000), 1, tx.clone());
        timer.start(Duration::from_millis(1000), 2, tx);

        tokio::time::sleep(Duration::from_millis(1500)).await;

        let event = rx.try_recv().unwrap();
        assert!(matches!(event, LinkEvent::HeartbeatTick { generation: 2 }));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_idempotent() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timer = HeartbeatTimer::new();
        timer.start(Duration::from_millis(1000), 1, tx);
        timer.stop();
        timer.stop();
        assert!(!timer.is_active());

        tokio::time::sleep(Duration::from_millis(3000)).await;
        assert!(rx.try_recv().is_err());
    }
}
