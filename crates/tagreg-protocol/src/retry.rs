use std::time::Duration;

/// Bounded attempt count plus optional wall-clock timeout for a blocking
/// retrieval. Immutable once a retrieve call starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub timeout: Option<Duration>,
}

impl RetryPolicy {
    pub fn attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// The first attempt always happens: a zero budget still performs one
    /// immediate lookup before giving up.
    pub fn effective_attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            timeout: Some(Duration::from_secs(5)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_attempts_clamps_to_one() {
        assert_eq!(RetryPolicy::attempts(0).effective_attempts(), 1);
        assert_eq!(RetryPolicy::attempts(7).effective_attempts(), 7);
    }

    #[test]
    fn timeout_builder_sets_budget() {
        let policy = RetryPolicy::attempts(3).with_timeout(Duration::from_millis(250));
        assert_eq!(policy.timeout, Some(Duration::from_millis(250)));
        assert_eq!(policy.max_attempts, 3);
    }
}
