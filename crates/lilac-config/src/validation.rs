// Configuration validation
//
// Validates that required fields are present and values are sensible.

use crate::*;
use anyhow::{bail, Result};
use tracing::warn;

pub fn validate_config(config: &RuntimeConfig) -> Result<()> {
    if config.dataset_root.as_os_str().is_empty() {
        bail!("dataset_root must not be empty");
    }

    validate_stats_config(&config.stats)?;

    Ok(())
}

fn validate_stats_config(config: &StatsConfig) -> Result<()> {
    if config.num_auto_bins == 0 {
        bail!("stats.num_auto_bins must be greater than 0");
    }
    if config.approx_distinct_sample_size == 0 {
        bail!("stats.approx_distinct_sample_size must be greater than 0");
    }
    if config.too_many_distinct_threshold == 0 {
        bail!("stats.too_many_distinct_threshold must be greater than 0");
    }

    if config.num_auto_bins > 1_000 {
        warn!(num_auto_bins = config.num_auto_bins, "stats.num_auto_bins is unusually large");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_stats_config() {
        let valid = StatsConfig::default();
        assert!(validate_stats_config(&valid).is_ok());

        let invalid = StatsConfig {
            num_auto_bins: 0,
            ..StatsConfig::default()
        };
        assert!(validate_stats_config(&invalid).is_err());
    }

    #[test]
    fn test_validate_config_rejects_empty_dataset_root() {
        let config = RuntimeConfig {
            dataset_root: std::path::PathBuf::new(),
            ..RuntimeConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
