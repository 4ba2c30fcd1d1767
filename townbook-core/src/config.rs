use std::time::Duration;

/// Rules of a TownBook library
#[derive(Debug, Clone)]
pub struct Config {
    /// How many days a book loan lasts when the request doesn't say
    pub loan_period_in_days: u32,
    /// How often the reconciliation sweep runs
    pub reconcile_interval_in_seconds: u64,
    /// How many reservations may be processed in a single batch
    pub max_batch_size: usize,
    /// How many activity rows are returned when no limit is given
    pub default_activity_limit: usize,
}

impl Config {
    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_in_seconds)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            // Two weeks is the usual loan period
            loan_period_in_days: 14,
            reconcile_interval_in_seconds: 5 * 60,
            max_batch_size: 100,
            default_activity_limit: 50,
        }
    }
}
