use {
    crate::cancel::CancelToken,
    std::time::{Duration, Instant},
};

/// Upper bound on poll iterations when no explicit count budget is given.
const MAX_POLL_COUNT: u64 = 1_000_000;

/// Budget for a poll loop: a wall-clock deadline plus a tick-count ceiling.
///
/// Exhausting either budget is an expected outcome, not an error; every
/// higher-level wait in the controller is built on this so that nothing in
/// the process can block indefinitely.
pub struct Wait {
    start_time: Instant,
    end_time: Instant,
    count: u64,
    max_count: u64,
    sleep: Duration,
    last_check: Option<Instant>,
}

impl Wait {
    pub fn new(max: Duration) -> Self {
        let start_time = Instant::now();
        Self {
            start_time,
            end_time: start_time + max,
            count: 0,
            max_count: MAX_POLL_COUNT,
            sleep: Duration::ZERO,
            last_check: None,
        }
    }

    pub fn secs(max_secs: u64) -> Self {
        Self::new(Duration::from_secs(max_secs))
    }

    pub fn max_count(mut self, max_count: u64) -> Self {
        self.max_count = max_count;
        self
    }

    pub fn sleep(mut self, sleep: Duration) -> Self {
        self.sleep = sleep;
        self
    }

    /// True while both the deadline and the count budget hold.
    /// Records the check timestamp for elapsed-time logging.
    pub fn waiting(&mut self) -> bool {
        let now = Instant::now();
        self.last_check = Some(now);
        now < self.end_time && self.count < self.max_count
    }

    pub fn tick(&mut self) {
        if !self.sleep.is_zero() {
            std::thread::sleep(self.sleep);
        }
        self.count += 1;
    }

    /// Elapsed time as of the last `waiting` check. Used for logging only.
    pub fn elapsed(&self) -> Duration {
        match self.last_check {
            Some(at) => at - self.start_time,
            None => Duration::ZERO,
        }
    }

    /// Poll `predicate` until it is true, the token is cancelled or the
    /// budget runs out. Cancellation and exhaustion both return false.
    pub fn for_fn(
        max: Duration,
        token: &CancelToken,
        sleep: Duration,
        max_count: Option<u64>,
        mut predicate: impl FnMut() -> bool,
    ) -> bool {
        let mut wait = Wait::new(max).sleep(sleep);
        if let Some(max_count) = max_count {
            wait = wait.max_count(max_count);
        }
        while token.is_running() && wait.waiting() {
            if predicate() {
                return true;
            }
            wait.tick();
        }
        false
    }
}
