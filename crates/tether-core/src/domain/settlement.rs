//! Write-once outcome cell shared by the waiting request and the broker.

use std::sync::OnceLock;

use tokio::sync::Notify;

use super::JobOutcome;

/// Holds the single outcome of one dispatch.
///
/// The first `settle` wins; later calls return `false` and leave the stored
/// value untouched. Waiters are woken once, when the value lands.
#[derive(Debug, Default)]
pub struct OutcomeCell {
    value: OnceLock<JobOutcome>,
    notify: Notify,
}

impl OutcomeCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `outcome` if the cell is still empty. Returns whether it won.
    pub fn settle(&self, outcome: JobOutcome) -> bool {
        let won = self.value.set(outcome).is_ok();
        if won {
            self.notify.notify_waiters();
        }
        won
    }

    pub fn get(&self) -> Option<&JobOutcome> {
        self.value.get()
    }

    pub fn is_settled(&self) -> bool {
        self.value.get().is_some()
    }

    /// Waits until the cell holds a value.
    pub async fn settled(&self) -> JobOutcome {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // register before checking, otherwise a settle in between is lost
            notified.as_mut().enable();

            if let Some(outcome) = self.value.get() {
                return outcome.clone();
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Failure, Reply};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn first_settlement_wins() {
        let cell = OutcomeCell::new();

        assert!(cell.settle(JobOutcome::Timeout {
            after: Duration::from_secs(1)
        }));
        assert!(!cell.settle(JobOutcome::Success(Reply::new().with_body("late"))));

        assert!(cell.get().is_some_and(JobOutcome::is_timeout));
    }

    #[tokio::test]
    async fn waiter_sees_settlement_from_another_task() {
        let cell = Arc::new(OutcomeCell::new());

        let waiter = tokio::spawn({
            let cell = Arc::clone(&cell);
            async move { cell.settled().await }
        });

        tokio::task::yield_now().await;
        cell.settle(JobOutcome::Error(Failure::new("boom")));

        let outcome = waiter.await.unwrap();
        assert_eq!(outcome, JobOutcome::Error(Failure::new("boom")));
    }

    #[tokio::test]
    async fn already_settled_cell_returns_immediately() {
        let cell = OutcomeCell::new();
        cell.settle(JobOutcome::Success(Reply::new().with_status(201)));

        let outcome = cell.settled().await;
        assert_eq!(outcome, JobOutcome::Success(Reply::new().with_status(201)));
    }
}
