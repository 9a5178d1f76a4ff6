use std::time::Duration;

use tokio::time::sleep;

use crate::errors::{AppError, AppResult};

/// Fixed pause taken after every live lookup call. Cache hits never pause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Throttle {
    delay: Duration,
}

impl Throttle {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn from_secs(seconds: f64) -> AppResult<Self> {
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(AppError::Config(format!(
                "throttle must be a non-negative number of seconds, got {seconds}"
            )));
        }
        let delay = Duration::try_from_secs_f64(seconds).map_err(|err| {
            AppError::Config(format!("throttle of {seconds} seconds is out of range: {err}"))
        })?;
        Ok(Self::new(delay))
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn is_disabled(&self) -> bool {
        self.delay.is_zero()
    }

    pub async fn pause(&self) {
        if self.is_disabled() {
            return;
        }
        sleep(self.delay).await;
    }
}
