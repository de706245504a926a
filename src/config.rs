//! Configuration for StorX
//!
//! Per-store settings with sensible defaults. Nothing here is process-wide:
//! each [`Store`](crate::Store) owns its own copy.

/// Default time to wait for a busy file (milliseconds)
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 1500;

/// Main configuration for a StorX store
#[derive(Debug, Clone)]
pub struct Config {
    /// How backend and filesystem faults reach the caller
    pub error_mode: ErrorMode,

    /// Max time to wait for a lock before giving up (milliseconds)
    pub busy_timeout_ms: u64,
}

/// Reporting mode for faults (engine and I/O failures)
///
/// Expected conditions such as a missing key or a locked file are always
/// returned as `Err`; only faults are affected by this setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorMode {
    /// Raise faults as a panic carrying the [`StorxError`](crate::StorxError)
    #[default]
    Raise,

    /// Return faults as `Err` like every other failure
    Return,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            error_mode: ErrorMode::default(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the fault reporting mode
    pub fn error_mode(mut self, mode: ErrorMode) -> Self {
        self.config.error_mode = mode;
        self
    }

    /// Set the busy timeout (in milliseconds)
    pub fn busy_timeout_ms(mut self, ms: u64) -> Self {
        self.config.busy_timeout_ms = ms;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
