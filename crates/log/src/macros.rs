//! Timing macros

/// Times an expression and logs the elapsed microseconds at `debug`
///
/// With `threshold = duration` the log line is skipped for faster runs.
#[macro_export]
macro_rules! timed {
    ($name:expr, threshold = $threshold:expr, $body:expr) => {{
        let _timer =
            $crate::TimerGuard::from_timer($crate::Timer::new($name).threshold($threshold));
        $body
    }};
    ($name:expr, $body:expr) => {{
        let _timer = $crate::TimerGuard::new($name);
        $body
    }};
}
