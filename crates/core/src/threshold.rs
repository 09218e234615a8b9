//! Slow-operation threshold
//!
//! Defines when an operation is considered slow, including the two
//! sentinels the watchdog understands.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Threshold applied when none is configured
pub const DEFAULT_SLOW_THRESHOLD: Duration = Duration::from_secs(60);

/// Duration above which an operation is reported as slow
///
/// # Mode Comparison
///
/// | Mode | Watchdog | Call-site resolution | Registry |
/// |------|----------|----------------------|----------|
/// | Disabled | None | None | Untouched |
/// | Default | 1 minute | Per call | Write calls |
/// | After(d) | `d` | Per call | Write calls |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SlowThreshold {
    /// No instrumentation at all, zero overhead
    Disabled,

    /// Unset: one minute applies ([`DEFAULT_SLOW_THRESHOLD`])
    #[default]
    Default,

    /// Explicit threshold
    ///
    /// A zero duration is treated like `Default`, never as "fire
    /// immediately".
    After(Duration),
}

impl SlowThreshold {
    /// Threshold from milliseconds
    pub fn from_millis(ms: u64) -> Self {
        SlowThreshold::After(Duration::from_millis(ms))
    }

    /// Threshold from seconds
    pub fn from_secs(secs: u64) -> Self {
        SlowThreshold::After(Duration::from_secs(secs))
    }

    /// Check if slow detection is active
    pub fn is_enabled(&self) -> bool {
        !matches!(self, SlowThreshold::Disabled)
    }

    /// Effective duration, or `None` when disabled
    pub fn resolve(&self) -> Option<Duration> {
        match *self {
            SlowThreshold::Disabled => None,
            SlowThreshold::Default => Some(DEFAULT_SLOW_THRESHOLD),
            SlowThreshold::After(d) if d.is_zero() => Some(DEFAULT_SLOW_THRESHOLD),
            SlowThreshold::After(d) => Some(d),
        }
    }

    /// Human-readable description of the mode
    pub fn description(&self) -> &'static str {
        match self {
            SlowThreshold::Disabled => "Slow detection disabled (no instrumentation)",
            SlowThreshold::Default => "Default threshold (1 minute)",
            SlowThreshold::After(_) => "Explicit threshold",
        }
    }
}

impl From<Duration> for SlowThreshold {
    fn from(d: Duration) -> Self {
        SlowThreshold::After(d)
    }
}

impl fmt::Display for SlowThreshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            SlowThreshold::Disabled => f.write_str("disabled"),
            SlowThreshold::Default => f.write_str("default"),
            SlowThreshold::After(d) => {
                let nanos = d.subsec_nanos();
                if nanos == 0 {
                    write!(f, "{}s", d.as_secs())
                } else if nanos % 1_000_000 == 0 {
                    write!(f, "{}ms", d.as_millis())
                } else if nanos % 1_000 == 0 {
                    write!(f, "{}us", d.as_micros())
                } else {
                    write!(f, "{}ns", d.as_nanos())
                }
            }
        }
    }
}

impl FromStr for SlowThreshold {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "disabled" | "off" | "none" | "-1" => Ok(SlowThreshold::Disabled),
            "default" | "" => Ok(SlowThreshold::Default),
            other => parse_duration(other).map(SlowThreshold::After),
        }
    }
}

impl TryFrom<String> for SlowThreshold {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SlowThreshold> for String {
    fn from(t: SlowThreshold) -> Self {
        t.to_string()
    }
}

/// Parse a duration such as `250ms`, `1.5s`, `2m` or `1h`
///
/// A bare integer is read as milliseconds.
pub fn parse_duration(value: &str) -> Result<Duration, String> {
    let value = value.trim();
    let split = value
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(value.len());
    let (number, unit) = value.split_at(split);
    if number.is_empty() {
        return Err(format!("invalid duration '{}': missing number", value));
    }

    let nanos_per_unit: u64 = match unit.trim() {
        "" | "ms" => 1_000_000,
        "ns" => 1,
        "us" | "µs" => 1_000,
        "s" => 1_000_000_000,
        "m" => 60_000_000_000,
        "h" => 3_600_000_000_000,
        other => return Err(format!("invalid duration '{}': unknown unit '{}'", value, other)),
    };

    if let Ok(whole) = number.parse::<u64>() {
        return whole
            .checked_mul(nanos_per_unit)
            .map(Duration::from_nanos)
            .ok_or_else(|| format!("invalid duration '{}': overflow", value));
    }

    let fractional: f64 = number
        .parse()
        .map_err(|_| format!("invalid duration '{}': bad number", value))?;
    Duration::try_from_secs_f64(fractional * nanos_per_unit as f64 / 1e9)
        .map_err(|e| format!("invalid duration '{}': {}", value, e))
}

/// Render a duration for log lines (`850ms`, `2.00s`, `1m05s`)
pub fn format_duration(d: Duration) -> String {
    if d >= Duration::from_secs(60) {
        let secs = d.as_secs();
        format!("{}m{:02}s", secs / 60, secs % 60)
    } else if d >= Duration::from_secs(1) {
        format!("{:.2}s", d.as_secs_f64())
    } else if d >= Duration::from_millis(1) {
        format!("{}ms", d.as_millis())
    } else {
        format!("{}µs", d.as_micros())
    }
}
