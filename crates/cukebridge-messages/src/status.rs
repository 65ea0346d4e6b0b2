//! Step result status and protocol durations.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Outcome status of one test step within one attempt.
///
/// Statuses the correlator does not know are kept verbatim in
/// [`TestStepResultStatus::Unrecognized`] instead of failing the whole
/// envelope, so that result processing can reject them loudly rather than
/// dropping the line as noise.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TestStepResultStatus {
    Undefined,
    Passed,
    Skipped,
    Pending,
    Ambiguous,
    Failed,
    Unrecognized(String),
}

impl TestStepResultStatus {
    /// Wire spelling of the status.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Undefined => "UNDEFINED",
            Self::Passed => "PASSED",
            Self::Skipped => "SKIPPED",
            Self::Pending => "PENDING",
            Self::Ambiguous => "AMBIGUOUS",
            Self::Failed => "FAILED",
            Self::Unrecognized(raw) => raw,
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw {
            "UNDEFINED" => Self::Undefined,
            "PASSED" => Self::Passed,
            "SKIPPED" => Self::Skipped,
            "PENDING" => Self::Pending,
            "AMBIGUOUS" => Self::Ambiguous,
            "FAILED" => Self::Failed,
            other => Self::Unrecognized(other.to_owned()),
        }
    }
}

impl fmt::Display for TestStepResultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for TestStepResultStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TestStepResultStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}

/// Elapsed time as whole seconds plus a sub-second remainder in nanoseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Duration {
    #[serde(default)]
    pub seconds: u64,
    #[serde(default)]
    pub nanos: u32,
}

impl Duration {
    /// Combine both fields into a std duration. Remainders of a full second
    /// or more are carried into the seconds; a sum past the largest duration
    /// saturates.
    #[must_use]
    pub fn to_std(self) -> std::time::Duration {
        std::time::Duration::from_secs(self.seconds)
            .checked_add(std::time::Duration::from_nanos(u64::from(self.nanos)))
            .unwrap_or(std::time::Duration::MAX)
    }
}

impl From<Duration> for std::time::Duration {
    fn from(value: Duration) -> Self {
        value.to_std()
    }
}
