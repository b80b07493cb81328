use std::sync::Arc;

use chrono::{DateTime, Utc};

/// Source of "now" for every time-window rule in the engine.
///
/// Validity windows, usage intervals, and time-of-day restrictions all depend
/// on the current instant, so the services take a clock instead of calling
/// `Utc::now()` inline. Production wires in [`SystemClock`]; tests pin a
/// [`FixedClock`] to exercise expiry and scheduling edges deterministically.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Shared handle used throughout the service layer.
pub type SharedClock = Arc<dyn Clock>;

#[derive(Debug, Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock pinned to a single instant.
#[derive(Debug, Clone)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

pub fn system_clock() -> SharedClock {
    Arc::new(SystemClock)
}
