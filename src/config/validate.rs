//! Config validation logic.
//! Verifies probe timing, cache window and concurrency ceiling are usable.

use anyhow::{Result, bail};
use tracing::debug;

use super::types::EngineConfig;

impl EngineConfig {
    /// Validate timing and concurrency values.
    pub fn validate(&self) -> Result<()> {
        // 1) Probe timing: a zero interval would spin; an interval longer than the
        //    timeout would never re-check.
        if self.probe_interval.is_zero() {
            bail!("probe_interval must be greater than zero");
        }
        if self.probe_interval > self.probe_timeout {
            bail!(
                "probe_interval ({} ms) must not exceed probe_timeout ({} ms)",
                self.probe_interval.as_millis(),
                self.probe_timeout.as_millis()
            );
        }

        // 2) Metadata cache window.
        if self.metadata_ttl.is_zero() {
            bail!("metadata_ttl must be greater than zero");
        }

        // 3) Fan-out ceiling.
        if let Some(0) = self.max_concurrent_copies {
            bail!("max_concurrent_copies must be at least 1 when set");
        }

        debug!(
            probe_timeout_ms = self.probe_timeout.as_millis() as u64,
            probe_interval_ms = self.probe_interval.as_millis() as u64,
            policy = ?self.on_probe_timeout,
            max_concurrent = ?self.max_concurrent_copies,
            "config validated"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn defaults_are_valid() {
        EngineConfig::default().validate().unwrap();
    }

    #[test]
    fn rejects_interval_longer_than_timeout() {
        let cfg = EngineConfig::with_probe(Duration::from_millis(10), Duration::from_millis(20));
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("must not exceed"));
    }

    #[test]
    fn rejects_zero_interval_and_ttl() {
        let cfg = EngineConfig::with_probe(Duration::from_millis(10), Duration::ZERO);
        assert!(cfg.validate().is_err());
        let cfg = EngineConfig {
            metadata_ttl: Duration::ZERO,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_zero_concurrency() {
        let cfg = EngineConfig {
            max_concurrent_copies: Some(0),
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }
}
