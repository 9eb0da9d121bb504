//! Performance timing utilities

use std::time::{Duration, Instant};

/// A timer that measures execution time
#[derive(Debug)]
pub struct Timer {
    name: String,
    start: Instant,
    level: tracing::Level,
    threshold: Option<Duration>,
}

impl Timer {
    /// Create a new timer
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            start: Instant::now(),
            level: tracing::Level::DEBUG,
            threshold: None,
        }
    }

    /// Set the log level
    #[must_use]
    pub fn level(mut self, level: tracing::Level) -> Self {
        self.level = level;
        self
    }

    /// Only log if duration exceeds threshold
    #[must_use]
    pub fn threshold(mut self, duration: Duration) -> Self {
        self.threshold = Some(duration);
        self
    }

    /// Get elapsed time
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Complete the timer
    pub fn complete(self) -> Duration {
        let elapsed = self.elapsed();

        if let Some(threshold) = self.threshold
            && elapsed < threshold
        {
            return elapsed;
        }

        let us = elapsed.as_micros();
        match self.level {
            tracing::Level::ERROR => tracing::error!(name = %self.name, us, "Timer completed"),
            tracing::Level::WARN => tracing::warn!(name = %self.name, us, "Timer completed"),
            tracing::Level::INFO => tracing::info!(name = %self.name, us, "Timer completed"),
            tracing::Level::DEBUG => tracing::debug!(name = %self.name, us, "Timer completed"),
            tracing::Level::TRACE => tracing::trace!(name = %self.name, us, "Timer completed"),
        }

        elapsed
    }
}

/// RAII guard for automatic timing
#[derive(Debug)]
pub struct TimerGuard {
    timer: Option<Timer>,
}

impl TimerGuard {
    /// Create a new timer guard
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            timer: Some(Timer::new(name)),
        }
    }

    /// Guard around a configured timer
    pub fn from_timer(timer: Timer) -> Self {
        Self { timer: Some(timer) }
    }
}

impl Drop for TimerGuard {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.complete();
        }
    }
}
