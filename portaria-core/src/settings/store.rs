use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
#[allow(unused)]
#[readonly::make]
pub struct StoreSettings {
    /// Upper bound for one full permission load; exceeding it counts as a failed load
    #[serde(default = "default_load_timeout_seconds")]
    pub load_timeout_seconds: u64,
}

fn default_load_timeout_seconds() -> u64 {
    10
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            load_timeout_seconds: default_load_timeout_seconds(),
        }
    }
}

impl StoreSettings {
    pub fn with_load_timeout(seconds: u64) -> Self {
        Self {
            load_timeout_seconds: seconds,
        }
    }

    pub fn load_timeout(&self) -> Duration {
        Duration::from_secs(self.load_timeout_seconds)
    }
}
