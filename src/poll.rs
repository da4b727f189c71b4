use std::{future::Future, time::Duration};

/// Source of delays between poll attempts
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;
}

/// Sleeps on the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }
}

/// Fixed-interval attempt schedule: the first attempt runs immediately,
/// each later one after sleeping `interval`.
pub struct PollSchedule<'a, S> {
    sleeper: &'a S,
    interval: Duration,
    max_attempts: u32,
    attempts: u32,
}

impl<'a, S: Sleeper> PollSchedule<'a, S> {
    pub fn new(sleeper: &'a S, max_attempts: u32, interval: Duration) -> Self {
        Self {
            sleeper,
            interval,
            max_attempts,
            attempts: 0,
        }
    }

    /// Wait until the next attempt is due. Returns false once exhausted.
    pub async fn next_attempt(&mut self) -> bool {
        if self.attempts >= self.max_attempts {
            return false;
        }
        if self.attempts > 0 {
            self.sleeper.sleep(self.interval).await;
        }
        self.attempts += 1;
        true
    }

    /// Attempts started so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex;

    use super::*;

    /// Records requested delays instead of sleeping
    #[derive(Debug, Default)]
    pub(crate) struct RecordingSleeper {
        pub(crate) slept: Mutex<Vec<Duration>>,
    }

    impl RecordingSleeper {
        pub(crate) fn total(&self) -> Duration {
            self.slept.lock().unwrap().iter().sum()
        }
    }

    impl Sleeper for RecordingSleeper {
        fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
            self.slept.lock().unwrap().push(duration);
            std::future::ready(())
        }
    }

    #[tokio::test]
    async fn test_schedule_sleeps_between_attempts() {
        let sleeper = RecordingSleeper::default();
        let mut schedule = PollSchedule::new(&sleeper, 3, Duration::from_secs(1));

        let mut runs = 0;
        while schedule.next_attempt().await {
            runs += 1;
        }

        assert_eq!(runs, 3);
        assert_eq!(schedule.attempts(), 3);
        assert_eq!(sleeper.slept.lock().unwrap().len(), 2);
        assert_eq!(sleeper.total(), Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_zero_attempts() {
        let sleeper = RecordingSleeper::default();
        let mut schedule = PollSchedule::new(&sleeper, 0, Duration::from_secs(1));

        assert!(!schedule.next_attempt().await);
        assert!(sleeper.slept.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_sleeper_waits() {
        let start = tokio::time::Instant::now();
        TokioSleeper.sleep(Duration::from_secs(5)).await;
        assert!(start.elapsed() >= Duration::from_secs(5));
    }
}
