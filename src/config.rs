use std::time::Duration;

use thiserror::Error;

/// Default number of shards. Enough to spread registrations from a busy
/// RPC workload without making each check scan many shard hints.
pub const DEFAULT_SHARD_COUNT: usize = 32;

/// Upper bound on shards.
pub const MAX_SHARDS: usize = 1024;

/// Default epoch width. Timers due within the current second go straight
/// into the ordered heap; later ones wait in per-epoch buckets.
pub const DEFAULT_EPOCH: Duration = Duration::from_secs(1);

pub const MIN_EPOCH: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("shard count must be at least 1")]
    ZeroShards,
    #[error("shard count {0} exceeds the maximum of {max}", max = MAX_SHARDS)]
    TooManyShards(usize),
    #[error("epoch duration {0:?} is shorter than the minimum of {min:?}", min = MIN_EPOCH)]
    EpochTooShort(Duration),
}

/// Tuning parameters fixed when a [`TimerList`](crate::TimerList) is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerListConfig {
    pub shard_count: usize,
    pub epoch_duration: Duration,
}

impl Default for TimerListConfig {
    fn default() -> Self {
        Self {
            shard_count: DEFAULT_SHARD_COUNT,
            epoch_duration: DEFAULT_EPOCH,
        }
    }
}

impl TimerListConfig {
    pub fn builder() -> TimerListConfigBuilder {
        TimerListConfigBuilder::default()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.shard_count == 0 {
            return Err(ConfigError::ZeroShards);
        }
        if self.shard_count > MAX_SHARDS {
            return Err(ConfigError::TooManyShards(self.shard_count));
        }
        if self.epoch_duration < MIN_EPOCH {
            return Err(ConfigError::EpochTooShort(self.epoch_duration));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct TimerListConfigBuilder {
    config: TimerListConfig,
}

impl TimerListConfigBuilder {
    pub fn shard_count(mut self, shard_count: usize) -> Self {
        self.config.shard_count = shard_count;
        self
    }

    pub fn epoch_duration(mut self, epoch_duration: Duration) -> Self {
        self.config.epoch_duration = epoch_duration;
        self
    }

    pub fn build(self) -> Result<TimerListConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
