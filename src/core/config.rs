use crate::core::errors::{DepwallError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Number of concurrent workers per pipeline stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerCounts {
    pub version_resolution: usize,
    pub download: usize,
    pub analysis: usize,
    pub dependency_resolution: usize,
    pub output: usize,
}

impl Default for WorkerCounts {
    fn default() -> Self {
        Self {
            version_resolution: 1,
            download: 3,
            analysis: 2,
            dependency_resolution: 3,
            output: 1,
        }
    }
}

impl WorkerCounts {
    fn as_named(&self) -> [(&'static str, usize); 5] {
        [
            ("workers.version_resolution", self.version_resolution),
            ("workers.download", self.download),
            ("workers.analysis", self.analysis),
            ("workers.dependency_resolution", self.dependency_resolution),
            ("workers.output", self.output),
        ]
    }
}

/// Analysis run configuration with all tuning parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    // Bookkeeping loop
    /// Sleep between two bookkeeping iterations
    pub poll_interval: Duration,
    /// Log a queue summary at info level every this many iterations
    pub stats_every: u64,

    // Worker pools
    pub workers: WorkerCounts,
    /// Timeout for a single collaborator call (resolve, download, analyze, output)
    pub stage_timeout: Option<Duration>,

    // Channels
    /// Capacity of each channel's result queue, 0 means unbounded
    pub result_capacity: usize,
    /// Capacity of each channel's error queue, 0 means unbounded
    pub error_capacity: usize,

    // Dependency cycles
    pub break_cycles: bool,
    pub cycle_check_every: u64,

    // Persistence
    /// YAML file results are replayed from and written to
    pub persistence_path: Option<PathBuf>,
    /// Flush the persistence file every this many iterations
    pub flush_every: u64,
    /// Replay persisted downloads and download failures; when off, artifacts without a finished
    /// analysis are downloaded again
    pub replay_downloads: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            stats_every: 50,

            workers: WorkerCounts::default(),
            stage_timeout: Some(Duration::from_secs(600)),

            result_capacity: 0,
            error_capacity: 0,

            break_cycles: true,
            cycle_check_every: 10,

            persistence_path: None,
            flush_every: 20,
            replay_downloads: true,
        }
    }
}

impl AnalysisConfig {
    /// Create a new builder for AnalysisConfig
    pub fn builder() -> AnalysisConfigBuilder {
        AnalysisConfigBuilder::new()
    }

    /// Load a YAML configuration file and validate it
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| DepwallError::io(format!("read config {}", path.display()), e))?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(DepwallError::configuration_field(
                "poll_interval must be greater than 0",
                "poll_interval",
            ));
        }
        for (field, count) in self.workers.as_named() {
            if count == 0 {
                return Err(DepwallError::configuration_field(
                    format!("{} must be greater than 0", field),
                    field,
                ));
            }
        }
        if let Some(timeout) = self.stage_timeout {
            if timeout.is_zero() {
                return Err(DepwallError::configuration_field(
                    "stage_timeout must be greater than 0 when set",
                    "stage_timeout",
                ));
            }
        }
        if self.break_cycles && self.cycle_check_every == 0 {
            return Err(DepwallError::configuration_field(
                "cycle_check_every must be greater than 0 when break_cycles is enabled",
                "cycle_check_every",
            ));
        }
        if self.stats_every == 0 {
            return Err(DepwallError::configuration_field(
                "stats_every must be greater than 0",
                "stats_every",
            ));
        }
        if self.persistence_path.is_some() && self.flush_every == 0 {
            return Err(DepwallError::configuration_field(
                "flush_every must be greater than 0 when persistence is enabled",
                "flush_every",
            ));
        }
        Ok(())
    }

    /// Small pools and a short poll interval, for tests and local runs
    pub fn development() -> Self {
        Self {
            poll_interval: Duration::from_millis(10),
            workers: WorkerCounts {
                version_resolution: 1,
                download: 1,
                analysis: 1,
                dependency_resolution: 1,
                output: 1,
            },
            stage_timeout: Some(Duration::from_secs(30)),
            cycle_check_every: 1,
            ..Default::default()
        }
    }
}

/// Builder for AnalysisConfig
pub struct AnalysisConfigBuilder {
    config: AnalysisConfig,
}

impl Default for AnalysisConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalysisConfigBuilder {
    /// Create a new builder with default values
    pub fn new() -> Self {
        Self {
            config: AnalysisConfig::default(),
        }
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    pub fn workers(mut self, workers: WorkerCounts) -> Self {
        self.config.workers = workers;
        self
    }

    pub fn stage_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.stage_timeout = timeout;
        self
    }

    /// Bound result and error queues (0 = unbounded)
    pub fn capacities(mut self, results: usize, errors: usize) -> Self {
        self.config.result_capacity = results;
        self.config.error_capacity = errors;
        self
    }

    pub fn break_cycles(mut self, enabled: bool, check_every: u64) -> Self {
        self.config.break_cycles = enabled;
        self.config.cycle_check_every = check_every;
        self
    }

    pub fn persistence_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.persistence_path = Some(path.into());
        self
    }

    pub fn flush_every(mut self, iterations: u64) -> Self {
        self.config.flush_every = iterations;
        self
    }

    pub fn replay_downloads(mut self, enabled: bool) -> Self {
        self.config.replay_downloads = enabled;
        self
    }

    pub fn stats_every(mut self, iterations: u64) -> Self {
        self.config.stats_every = iterations;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<AnalysisConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AnalysisConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.poll_interval, Duration::from_millis(100));
        assert_eq!(config.result_capacity, 0);
        assert!(config.replay_downloads);
    }

    #[test]
    fn test_development_config() {
        let config = AnalysisConfig::development();
        assert!(config.validate().is_ok());
        assert_eq!(config.workers.download, 1);
    }

    #[test]
    fn test_validation_errors() {
        let mut config = AnalysisConfig::default();

        config.workers.analysis = 0;
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            DepwallError::Configuration { field: Some(ref f), .. } if f == "workers.analysis"
        ));
        config.workers.analysis = 2;

        config.poll_interval = Duration::ZERO;
        assert!(config.validate().is_err());
        config.poll_interval = Duration::from_millis(5);

        config.cycle_check_every = 0;
        assert!(config.validate().is_err());
        config.break_cycles = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = AnalysisConfig::builder()
            .poll_interval(Duration::from_millis(20))
            .capacities(16, 8)
            .break_cycles(true, 3)
            .persistence_path("/tmp/depwall.yaml")
            .flush_every(5)
            .build()
            .unwrap();

        assert_eq!(config.poll_interval, Duration::from_millis(20));
        assert_eq!(config.result_capacity, 16);
        assert_eq!(config.error_capacity, 8);
        assert_eq!(config.cycle_check_every, 3);
        assert_eq!(
            config.persistence_path.as_deref(),
            Some(Path::new("/tmp/depwall.yaml"))
        );
    }

    #[test]
    fn test_builder_rejects_invalid() {
        let result = AnalysisConfig::builder().flush_every(0).persistence_path("x.yaml").build();
        assert!(result.is_err());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config = AnalysisConfig::from_yaml_str(
            "workers:\n  download: 5\nresult_capacity: 32\nbreak_cycles: false\n",
        )
        .unwrap();
        assert_eq!(config.workers.download, 5);
        assert_eq!(config.workers.analysis, 2);
        assert_eq!(config.result_capacity, 32);
        assert!(!config.break_cycles);
        assert_eq!(config.poll_interval, Duration::from_millis(100));
    }

    #[test]
    fn test_invalid_yaml_is_rejected() {
        assert!(AnalysisConfig::from_yaml_str("workers:\n  output: 0\n").is_err());
        assert!(AnalysisConfig::from_yaml_str("poll_interval: [not, a, duration]").is_err());
    }
}
