//! Idle table-handle cycle watchdog
//!
//! With many tables and churning handles, the engine's periodic sweep of
//! idle handles can stall behind lock contention. The monitor samples the
//! engine's most recent sweep latency on a fixed cadence and classifies it
//! against the configured bound: one threshold crossing warns, and in fatal
//! mode it aborts the whole run.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tablestorm_engine::StorageEngine;

use crate::workload::{FatalCause, StopSignal};

fn default_cadence() -> Duration {
    Duration::from_secs(1)
}

/// Watchdog settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Sweep latency above this bound trips the watchdog.
    #[serde(with = "humantime_serde")]
    pub threshold: Duration,

    /// Abort the run on a crossing instead of just warning.
    #[serde(default)]
    pub fatal: bool,

    /// How often the sweep latency is sampled.
    #[serde(default = "default_cadence", with = "humantime_serde")]
    pub cadence: Duration,
}

impl MonitorConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.threshold.is_zero() {
            anyhow::bail!("idle cycle threshold must be > 0");
        }
        if self.cadence.is_zero() {
            anyhow::bail!("idle cycle sample cadence must be > 0");
        }
        Ok(())
    }
}

/// Classification of one sweep-latency sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleCycleVerdict {
    Ok,
    Warn,
    Fatal,
}

/// One threshold crossing, as logged and counted.
#[derive(Debug, Clone)]
pub struct IdleCycleEvent {
    pub observed: Duration,
    pub threshold: Duration,
    pub verdict: IdleCycleVerdict,
}

/// Judge a single sweep-latency sample against the configured bound.
pub fn classify(observed: Duration, config: &MonitorConfig) -> IdleCycleVerdict {
    if observed <= config.threshold {
        IdleCycleVerdict::Ok
    } else if config.fatal {
        IdleCycleVerdict::Fatal
    } else {
        IdleCycleVerdict::Warn
    }
}

/// Monitor loop, run on its own thread for the duration of the workload.
/// Returns the number of warnings observed. A fatal crossing raises the
/// shared stop signal and returns immediately.
pub(crate) fn run_monitor<E: StorageEngine>(
    engine: &E,
    config: &MonitorConfig,
    stop: &StopSignal,
) -> u64 {
    let mut warnings = 0u64;
    while !stop.is_stopped() {
        let observed = engine.idle_handle_sweep_latency();
        match classify(observed, config) {
            IdleCycleVerdict::Ok => {}
            IdleCycleVerdict::Warn => {
                warnings += 1;
                tracing::warn!(
                    ?observed,
                    threshold = ?config.threshold,
                    "idle table handle cycle exceeded bound"
                );
            }
            IdleCycleVerdict::Fatal => {
                tracing::error!(
                    ?observed,
                    threshold = ?config.threshold,
                    "idle table handle cycle exceeded fatal bound, aborting run"
                );
                stop.abort(FatalCause::IdleCycle { observed, threshold: config.threshold });
                break;
            }
        }
        stop.sleep_unless_stopped(config.cadence);
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(threshold_ms: u64, fatal: bool) -> MonitorConfig {
        MonitorConfig {
            threshold: Duration::from_millis(threshold_ms),
            fatal,
            cadence: Duration::from_millis(10),
        }
    }

    #[test]
    fn test_classify_under_threshold() {
        let c = config(100, true);
        assert_eq!(classify(Duration::from_millis(50), &c), IdleCycleVerdict::Ok);
        assert_eq!(classify(Duration::from_millis(100), &c), IdleCycleVerdict::Ok);
    }

    #[test]
    fn test_classify_over_threshold() {
        assert_eq!(
            classify(Duration::from_millis(150), &config(100, false)),
            IdleCycleVerdict::Warn
        );
        assert_eq!(
            classify(Duration::from_millis(150), &config(100, true)),
            IdleCycleVerdict::Fatal
        );
    }

    #[test]
    fn test_validation() {
        assert!(config(0, false).validate().is_err());
        assert!(config(100, false).validate().is_ok());
        let zero_cadence = MonitorConfig {
            threshold: Duration::from_secs(1),
            fatal: false,
            cadence: Duration::ZERO,
        };
        assert!(zero_cadence.validate().is_err());
    }

    #[test]
    fn test_config_parses_humantime() {
        let parsed: MonitorConfig =
            toml::from_str("threshold = \"2s\"\nfatal = true\n").unwrap();
        assert_eq!(parsed.threshold, Duration::from_secs(2));
        assert!(parsed.fatal);
        assert_eq!(parsed.cadence, Duration::from_secs(1), "cadence defaults to 1s");
    }
}
