//! VeriXOS ambient configuration
//!
//! Process-wide tunables that are not part of any single simulation run (a
//! run's own `SimulationConfig` lives in `verixos-thermal::model`). This is
//! the knob set a caller sets once per process: worker-pool sizing, default
//! eclipse penumbra width, and whether to emit debug-level traces.

/// Ambient configuration settings for a VeriXOS process.
///
/// # Example
///
/// ```
/// use verixos::config::Config;
///
/// let config = Config::builder().worker_threads(4).build();
/// assert_eq!(config.worker_threads, Some(4));
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// Fixed worker pool size. `None` means use `std::thread::available_parallelism`.
    pub worker_threads: Option<usize>,
    /// Default eclipse penumbra width in seconds, used when a model's
    /// orbital config does not override it.
    pub default_penumbra_s: f64,
    /// Enable verbose (`log::debug!`) tracing of solver accept/reject/retry decisions.
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            worker_threads: std::env::var("VERIXOS_WORKERS")
                .ok()
                .and_then(|v| v.parse().ok()),
            default_penumbra_s: std::env::var("VERIXOS_PENUMBRA_S")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60.0),
            debug: std::env::var("VERIXOS_LOG")
                .map(|v| ["1", "true", "yes", "debug"].contains(&v.to_lowercase().as_str()))
                .unwrap_or(false),
        }
    }
}

impl Config {
    /// Create a Config builder.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Resolve the effective worker pool size.
    pub fn effective_worker_threads(&self) -> usize {
        self.worker_threads
            .unwrap_or_else(|| std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1))
    }
}

/// Builder for [`Config`].
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    worker_threads: Option<usize>,
    default_penumbra_s: Option<f64>,
    debug: Option<bool>,
}

impl ConfigBuilder {
    /// Set a fixed worker pool size.
    pub fn worker_threads(mut self, n: usize) -> Self {
        self.worker_threads = Some(n);
        self
    }

    /// Set the default eclipse penumbra width in seconds.
    pub fn default_penumbra_s(mut self, seconds: f64) -> Self {
        self.default_penumbra_s = Some(seconds);
        self
    }

    /// Enable or disable debug tracing.
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = Some(debug);
        self
    }

    /// Build the Config.
    pub fn build(self) -> Config {
        let mut config = Config::default();

        if let Some(worker_threads) = self.worker_threads {
            config.worker_threads = Some(worker_threads);
        }
        if let Some(default_penumbra_s) = self.default_penumbra_s {
            config.default_penumbra_s = default_penumbra_s;
        }
        if let Some(debug) = self.debug {
            config.debug = debug;
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default_penumbra() {
        let config = Config::default();
        assert!(config.default_penumbra_s > 0.0);
    }

    #[test]
    fn test_config_builder() {
        let config = Config::builder().worker_threads(8).debug(true).build();

        assert_eq!(config.worker_threads, Some(8));
        assert!(config.debug);
    }

    #[test]
    fn test_effective_worker_threads_falls_back() {
        let config = Config::builder().build();
        assert!(config.effective_worker_threads() >= 1);
    }
}
