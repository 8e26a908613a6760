use anyhow::ensure;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_metrics_dir")]
    pub metrics_dir: String,
    #[serde(default = "default_db_dir")]
    pub db_dir: String,
    /// When false, queued events are discarded instead of written.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_sampling_interval")]
    pub sampling_interval_ms: i64,
    #[serde(default = "default_sampling_interval_u64")]
    pub purge_period_ms: u64,
    #[serde(default = "default_sampling_interval_u64")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_sampling_interval_u64")]
    pub reader_interval_ms: u64,
    /// Keep superseded window databases on disk instead of deleting them.
    #[serde(default)]
    pub keep_all_files: bool,
    #[serde(default = "default_file_retention")]
    pub file_retention_ms: i64,
}

fn default_metrics_dir() -> String {
    "/dev/shm/perfmon".to_string()
}

fn default_db_dir() -> String {
    "/tmp/perfmon/db".to_string()
}

fn default_enabled() -> bool {
    true
}

fn default_sampling_interval() -> i64 {
    5000
}

fn default_sampling_interval_u64() -> u64 {
    5000
}

fn default_queue_capacity() -> usize {
    100_000
}

fn default_file_retention() -> i64 {
    60_000
}

impl AgentConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(self.sampling_interval_ms > 0, "sampling_interval_ms must be positive");
        ensure!(self.purge_period_ms > 0, "purge_period_ms must be positive");
        ensure!(self.reader_interval_ms > 0, "reader_interval_ms must be positive");
        ensure!(self.queue_capacity > 0, "queue_capacity must be positive");
        ensure!(
            self.purge_period_ms <= self.sampling_interval_ms as u64,
            "purge_period_ms ({}) must not exceed sampling_interval_ms ({})",
            self.purge_period_ms,
            self.sampling_interval_ms
        );
        ensure!(
            self.initial_delay_ms >= self.sampling_interval_ms as u64,
            "initial_delay_ms ({}) must cover at least one sampling interval ({})",
            self.initial_delay_ms,
            self.sampling_interval_ms
        );
        ensure!(
            self.file_retention_ms >= 3 * self.sampling_interval_ms,
            "file_retention_ms must keep at least three sampling intervals of bucket files"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = AgentConfig::parse("").unwrap();
        assert_eq!(config.sampling_interval_ms, 5000);
        assert_eq!(config.purge_period_ms, 5000);
        assert!(config.enabled);
        assert!(!config.keep_all_files);
    }

    #[test]
    fn short_initial_delay_is_rejected() {
        let err = AgentConfig::parse("sampling_interval_ms = 5000\ninitial_delay_ms = 100").unwrap_err();
        assert!(err.to_string().contains("initial_delay_ms"));
    }

    #[test]
    fn zero_interval_is_rejected() {
        assert!(AgentConfig::parse("purge_period_ms = 0").is_err());
    }

    #[test]
    fn purge_slower_than_sampling_is_rejected() {
        let err = AgentConfig::parse("sampling_interval_ms = 1000\npurge_period_ms = 2000\ninitial_delay_ms = 1000")
            .unwrap_err();
        assert!(err.to_string().contains("purge_period_ms"));
        assert!(AgentConfig::parse("sampling_interval_ms = 1000\npurge_period_ms = 500\ninitial_delay_ms = 1000").is_ok());
    }

    #[test]
    fn load_reads_file_from_disk() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("agent.toml");
        std::fs::write(
            &path,
            "metrics_dir = \"/run/perfmon\"\nsampling_interval_ms = 1000\npurge_period_ms = 1000\nkeep_all_files = true\n",
        )
        .unwrap();

        let config = AgentConfig::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config.metrics_dir, "/run/perfmon");
        assert_eq!(config.sampling_interval_ms, 1000);
        assert!(config.keep_all_files);
        assert!(AgentConfig::load(dir.path().join("missing.toml").to_str().unwrap()).is_err());
    }

    #[test]
    fn bundled_config_is_valid() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/agent.toml");
        let config = AgentConfig::load(path).unwrap();
        assert_eq!(config.metrics_dir, "/dev/shm/perfmon");
    }
}
