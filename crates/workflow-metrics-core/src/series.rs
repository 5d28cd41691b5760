//! Timestamped CPU and memory samples and the snapshot schema.
//!
//! A [`MetricsSeries`] is what the sampler accumulates and what the HTTP
//! endpoint serves. Anything decoded from the wire goes through
//! [`parse_snapshot`], which rejects the whole document on the first
//! out-of-range value instead of keeping the parts that looked fine.

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Bytes in one mebibyte; memory samples are stored in MB.
pub const BYTES_PER_MB: f64 = 1_048_576.0;

/// Anything carrying a unix-epoch millisecond timestamp.
pub trait Timestamped {
    fn unix_time_ms(&self) -> i64;
}

/// CPU load split into user and system percentages.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuLoadSample {
    #[serde(alias = "time")]
    pub unix_time_ms: i64,
    pub user: f64,
    pub system: f64,
}

/// Memory usage in megabytes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryUsageSample {
    #[serde(alias = "time")]
    pub unix_time_ms: i64,
    pub used: f64,
    pub free: f64,
}

impl MemoryUsageSample {
    /// Build a sample from raw byte counts.
    pub fn from_bytes(unix_time_ms: i64, active_bytes: u64, available_bytes: u64) -> Self {
        Self {
            unix_time_ms,
            used: active_bytes as f64 / BYTES_PER_MB,
            free: available_bytes as f64 / BYTES_PER_MB,
        }
    }
}

impl Timestamped for CpuLoadSample {
    fn unix_time_ms(&self) -> i64 {
        self.unix_time_ms
    }
}

impl Timestamped for MemoryUsageSample {
    fn unix_time_ms(&self) -> i64 {
        self.unix_time_ms
    }
}

/// The pair of series accumulated over one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSeries {
    #[serde(rename = "cpuLoadPercentages")]
    pub cpu_load_percentages: Vec<CpuLoadSample>,
    #[serde(rename = "memoryUsageMBs")]
    pub memory_usage_mbs: Vec<MemoryUsageSample>,
}

/// Rejected snapshot document.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("malformed metrics snapshot: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("{series}[{index}].{field} = {value} is invalid (expected {expected})")]
    OutOfRange {
        series: &'static str,
        index: usize,
        field: &'static str,
        value: f64,
        expected: &'static str,
    },
    #[error("{series}[{index}].unixTimeMs = {value} is outside the representable time range")]
    TimeOutOfRange {
        series: &'static str,
        index: usize,
        value: i64,
    },
}

impl MetricsSeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when neither series holds a sample.
    pub fn is_empty(&self) -> bool {
        self.cpu_load_percentages.is_empty() && self.memory_usage_mbs.is_empty()
    }

    /// Check every value against the schema bounds.
    ///
    /// Percentages must be finite and within `[0, 100]`; memory values must
    /// be finite and non-negative. Timestamps must map to a calendar time.
    pub fn validate(&self) -> Result<(), SnapshotError> {
        const CPU: &str = "cpuLoadPercentages";
        const MEM: &str = "memoryUsageMBs";

        check_times(CPU, &self.cpu_load_percentages)?;
        check_times(MEM, &self.memory_usage_mbs)?;
        for (index, s) in self.cpu_load_percentages.iter().enumerate() {
            check_percent(CPU, index, "user", s.user)?;
            check_percent(CPU, index, "system", s.system)?;
        }
        for (index, s) in self.memory_usage_mbs.iter().enumerate() {
            check_non_negative(MEM, index, "used", s.used)?;
            check_non_negative(MEM, index, "free", s.free)?;
        }
        Ok(())
    }
}

fn check_times<T: Timestamped>(series: &'static str, samples: &[T]) -> Result<(), SnapshotError> {
    for (index, s) in samples.iter().enumerate() {
        let value = s.unix_time_ms();
        if DateTime::from_timestamp_millis(value).is_none() {
            return Err(SnapshotError::TimeOutOfRange {
                series,
                index,
                value,
            });
        }
    }
    Ok(())
}

fn check_percent(
    series: &'static str,
    index: usize,
    field: &'static str,
    value: f64,
) -> Result<(), SnapshotError> {
    if value.is_finite() && (0.0..=100.0).contains(&value) {
        Ok(())
    } else {
        Err(SnapshotError::OutOfRange {
            series,
            index,
            field,
            value,
            expected: "a finite percentage in [0, 100]",
        })
    }
}

fn check_non_negative(
    series: &'static str,
    index: usize,
    field: &'static str,
    value: f64,
) -> Result<(), SnapshotError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(SnapshotError::OutOfRange {
            series,
            index,
            field,
            value,
            expected: "a finite non-negative number",
        })
    }
}

/// Decode and validate a JSON snapshot.
pub fn parse_snapshot(json: &str) -> Result<MetricsSeries, SnapshotError> {
    let series: MetricsSeries = serde_json::from_str(json)?;
    series.validate()?;
    Ok(series)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_series() -> MetricsSeries {
        MetricsSeries {
            cpu_load_percentages: vec![
                CpuLoadSample {
                    unix_time_ms: 1_704_067_200_000,
                    user: 25.5,
                    system: 10.3,
                },
                CpuLoadSample {
                    unix_time_ms: 1_704_067_205_000,
                    user: 30.2,
                    system: 12.1,
                },
            ],
            memory_usage_mbs: vec![
                MemoryUsageSample {
                    unix_time_ms: 1_704_067_200_000,
                    used: 4096.0,
                    free: 8192.0,
                },
                MemoryUsageSample {
                    unix_time_ms: 1_704_067_205_000,
                    used: 4200.0,
                    free: 8000.0,
                },
            ],
        }
    }

    // -----------------------------------------------------------------------
    // Wire format
    // -----------------------------------------------------------------------

    #[test]
    fn test_serialized_field_names() {
        let json = serde_json::to_value(sample_series()).unwrap();
        assert!(json.get("cpuLoadPercentages").is_some());
        assert!(json.get("memoryUsageMBs").is_some());
        assert_eq!(
            json["cpuLoadPercentages"][0]["unixTimeMs"],
            serde_json::json!(1_704_067_200_000_i64)
        );
        assert_eq!(json["memoryUsageMBs"][1]["free"], serde_json::json!(8000.0));
    }

    #[test]
    fn test_snapshot_roundtrip_is_lossless() {
        let series = sample_series();
        let json = serde_json::to_string(&series).unwrap();
        let parsed = parse_snapshot(&json).unwrap();
        assert_eq!(parsed, series);
    }

    #[test]
    fn test_legacy_time_field_accepted() {
        let json = r#"{
            "cpuLoadPercentages": [{"time": 1000, "user": 1.0, "system": 2.0}],
            "memoryUsageMBs": [{"time": 1000, "used": 3.0, "free": 4.0}]
        }"#;
        let parsed = parse_snapshot(json).unwrap();
        assert_eq!(parsed.cpu_load_percentages[0].unix_time_ms, 1000);
        assert_eq!(parsed.memory_usage_mbs[0].unix_time_ms, 1000);
    }

    #[test]
    fn test_empty_snapshot_is_valid() {
        let parsed = parse_snapshot(r#"{"cpuLoadPercentages":[],"memoryUsageMBs":[]}"#).unwrap();
        assert!(parsed.is_empty());
    }

    // -----------------------------------------------------------------------
    // Rejections
    // -----------------------------------------------------------------------

    #[test]
    fn test_rejects_non_array_series() {
        let err = parse_snapshot(r#"{"cpuLoadPercentages":"not an array","memoryUsageMBs":[]}"#)
            .unwrap_err();
        assert!(matches!(err, SnapshotError::Decode(_)));
    }

    #[test]
    fn test_rejects_missing_series() {
        let err = parse_snapshot(r#"{"cpuLoadPercentages":[]}"#).unwrap_err();
        assert!(matches!(err, SnapshotError::Decode(_)));
    }

    #[test]
    fn test_rejects_fractional_timestamp() {
        let json = r#"{"cpuLoadPercentages":[{"unixTimeMs":1.5,"user":1,"system":1}],"memoryUsageMBs":[]}"#;
        assert!(matches!(
            parse_snapshot(json).unwrap_err(),
            SnapshotError::Decode(_)
        ));
    }

    #[test]
    fn test_rejects_percentage_above_100() {
        let json = r#"{"cpuLoadPercentages":[{"unixTimeMs":1,"user":100.5,"system":1}],"memoryUsageMBs":[]}"#;
        match parse_snapshot(json).unwrap_err() {
            SnapshotError::OutOfRange {
                series,
                index,
                field,
                ..
            } => {
                assert_eq!(series, "cpuLoadPercentages");
                assert_eq!(index, 0);
                assert_eq!(field, "user");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_rejects_negative_memory() {
        let mut series = sample_series();
        series.memory_usage_mbs[1].free = -1.0;
        match series.validate().unwrap_err() {
            SnapshotError::OutOfRange { index, field, .. } => {
                assert_eq!(index, 1);
                assert_eq!(field, "free");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_rejects_non_finite_values() {
        let mut series = sample_series();
        series.cpu_load_percentages[0].system = f64::NAN;
        assert!(series.validate().is_err());

        let mut series = sample_series();
        series.memory_usage_mbs[0].used = f64::INFINITY;
        assert!(series.validate().is_err());
    }

    #[test]
    fn test_rejects_unrepresentable_timestamp() {
        let json = r#"{"cpuLoadPercentages":[],"memoryUsageMBs":[
            {"unixTimeMs":1704067200000,"used":1,"free":1},
            {"unixTimeMs":9000000000000000000,"used":1,"free":1}
        ]}"#;
        match parse_snapshot(json).unwrap_err() {
            SnapshotError::TimeOutOfRange {
                series,
                index,
                value,
            } => {
                assert_eq!(series, "memoryUsageMBs");
                assert_eq!(index, 1);
                assert_eq!(value, 9_000_000_000_000_000_000);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_boundary_percentages_accepted() {
        let mut series = sample_series();
        series.cpu_load_percentages[0].user = 0.0;
        series.cpu_load_percentages[0].system = 100.0;
        assert!(series.validate().is_ok());
    }

    // -----------------------------------------------------------------------
    // Unit conversion
    // -----------------------------------------------------------------------

    #[test]
    fn test_memory_bytes_to_mb() {
        let s = MemoryUsageSample::from_bytes(0, 4096 * 1024 * 1024, 8192 * 1024 * 1024);
        assert_eq!(s.used, 4096.0);
        assert_eq!(s.free, 8192.0);
    }
}
