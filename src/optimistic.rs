//! Local state that changes before the remote write confirms it, and goes
//! back if the write fails.

use std::future::Future;

#[derive(Debug, Clone, PartialEq)]
pub struct Optimistic<T> {
    value: T,
}

/// Receipt for an applied-but-unconfirmed change.
#[must_use = "confirm or roll back the pending change"]
#[derive(Debug)]
pub struct Pending<T> {
    previous: T,
}

impl<T> Optimistic<T> {
    pub fn new(value: T) -> Self {
        Self { value }
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    /// Phase one: show `next` immediately.
    pub fn begin(&mut self, next: T) -> Pending<T> {
        Pending {
            previous: std::mem::replace(&mut self.value, next),
        }
    }

    /// The remote write failed.
    pub fn rollback(&mut self, pending: Pending<T>) {
        self.value = pending.previous;
    }

    /// The remote write landed, possibly with a server-side value that
    /// overrides the local guess.
    pub fn confirm(&mut self, _pending: Pending<T>, authoritative: Option<T>) {
        if let Some(value) = authoritative {
            self.value = value;
        }
    }

    /// Both phases around `remote`.
    pub async fn apply<F, Fut, R, E>(&mut self, next: T, remote: F) -> Result<R, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<R, E>>,
    {
        let pending = self.begin(next);
        match remote().await {
            Ok(result) => {
                self.confirm(pending, None);
                Ok(result)
            }
            Err(e) => {
                self.rollback(pending);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn keeps_value_on_success() {
        let mut liked = Optimistic::new(false);
        let result: Result<u32, String> = liked.apply(true, || async { Ok(1) }).await;
        assert_eq!(result, Ok(1));
        assert!(*liked.get());
    }

    #[tokio::test]
    async fn rolls_back_on_failure() {
        let mut liked = Optimistic::new(false);
        let result: Result<(), String> = liked
            .apply(true, || async { Err("network down".to_string()) })
            .await;
        assert!(result.is_err());
        assert!(!*liked.get());
    }

    #[test]
    fn server_value_wins_on_confirm() {
        let mut count = Optimistic::new(3);
        let pending = count.begin(4);
        assert_eq!(*count.get(), 4);
        count.confirm(pending, Some(7));
        assert_eq!(*count.get(), 7);
    }
}
