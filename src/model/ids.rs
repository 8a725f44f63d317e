use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Epoch-milliseconds timestamp (spec §3: "Timestamps are epoch
/// milliseconds (int64) unless stated").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EpochMillis(pub i64);

impl EpochMillis {
    /// Current wall-clock time.
    pub fn now() -> Self {
        let ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before epoch")
            .as_millis() as i64;
        EpochMillis(ms)
    }

    pub fn plus_millis(self, millis: i64) -> Self {
        EpochMillis(self.0 + millis)
    }

    pub fn is_before(self, other: EpochMillis) -> bool {
        self.0 < other.0
    }
}

impl From<i64> for EpochMillis {
    fn from(value: i64) -> Self {
        EpochMillis(value)
    }
}
