//! Status taxonomy shared by every stage, artifact and data-quality check.
//!
//! Severity (most to least severe):
//! `error` > `fail` > `missing_input` > `partial` > `warn` > `ok`/`exists`.
//!
//! `skipped` and `unknown` only appear in orchestrator summaries: a skipped
//! stage was never invoked, an unknown one left an unreadable report.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Overall status of a stage invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Ok,
    Exists,
    Warn,
    Partial,
    MissingInput,
    Fail,
    Error,
    Skipped,
    Unknown,
}

impl StageStatus {
    /// Statuses that let the orchestrator continue.
    pub const SUCCESS: [StageStatus; 2] = [StageStatus::Ok, StageStatus::Exists];

    pub fn is_success(self) -> bool {
        matches!(self, Self::Ok | Self::Exists)
    }

    /// Numeric severity; higher is worse. `ok` and `exists` tie at zero.
    pub fn severity(self) -> u8 {
        match self {
            Self::Ok | Self::Exists => 0,
            Self::Skipped => 1,
            Self::Warn => 2,
            Self::Partial => 3,
            Self::MissingInput => 4,
            Self::Unknown => 5,
            Self::Fail => 6,
            Self::Error => 7,
        }
    }

    /// The more severe of two statuses.
    ///
    /// On a tie between `ok` and `exists`, `ok` wins: one fresh write means the
    /// stage did work this run.
    pub fn worst(self, other: StageStatus) -> StageStatus {
        match self.severity().cmp(&other.severity()) {
            std::cmp::Ordering::Greater => self,
            std::cmp::Ordering::Less => other,
            std::cmp::Ordering::Equal => {
                if self == Self::Ok || other == Self::Ok {
                    Self::Ok
                } else {
                    self
                }
            }
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Exists => "exists",
            Self::Warn => "warn",
            Self::Partial => "partial",
            Self::MissingInput => "missing_input",
            Self::Fail => "fail",
            Self::Error => "error",
            Self::Skipped => "skipped",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ok" => Ok(Self::Ok),
            "exists" => Ok(Self::Exists),
            "warn" => Ok(Self::Warn),
            "partial" => Ok(Self::Partial),
            "missing_input" => Ok(Self::MissingInput),
            "fail" => Ok(Self::Fail),
            "error" => Ok(Self::Error),
            "skipped" => Ok(Self::Skipped),
            "unknown" => Ok(Self::Unknown),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown status: {0}")]
pub struct UnknownStatus(pub String);

/// Status of a single artifact within a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    /// Written fresh during this run.
    Ok,
    /// Already present; nothing was written this run.
    Exists,
    /// The upstream input for this artifact is absent.
    Missing,
    /// Processing this artifact failed.
    Error,
}

impl FileStatus {
    /// Contribution of this artifact to its stage status.
    pub fn stage_status(self) -> StageStatus {
        match self {
            Self::Ok => StageStatus::Ok,
            Self::Exists => StageStatus::Exists,
            Self::Missing => StageStatus::Partial,
            Self::Error => StageStatus::Error,
        }
    }
}

/// Derive a stage status from its artifact statuses.
///
/// `input_missing` marks the whole input directory (or a required input set)
/// as absent, which reports `missing_input` even with no artifact records.
/// An empty artifact list without that flag is `ok`.
pub fn derive_stage_status<I>(files: I, input_missing: bool) -> StageStatus
where
    I: IntoIterator<Item = FileStatus>,
{
    let floor = if input_missing {
        StageStatus::MissingInput
    } else {
        StageStatus::Ok
    };

    let mut iter = files.into_iter().peekable();
    if iter.peek().is_none() {
        return floor;
    }

    let from_files = iter
        .map(FileStatus::stage_status)
        .reduce(StageStatus::worst)
        .unwrap_or(StageStatus::Ok);

    if input_missing {
        floor.worst(from_files)
    } else {
        from_files
    }
}

/// Outcome of one data-quality check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

/// Aggregate status of a data-quality report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DqStatus {
    Ok,
    Warn,
    Fail,
}

impl DqStatus {
    pub fn from_checks<'a, I>(checks: I) -> DqStatus
    where
        I: IntoIterator<Item = &'a CheckStatus>,
    {
        let mut status = DqStatus::Ok;
        for check in checks {
            match check {
                CheckStatus::Fail => return DqStatus::Fail,
                CheckStatus::Warn => status = DqStatus::Warn,
                CheckStatus::Pass => {}
            }
        }
        status
    }

    pub fn stage_status(self) -> StageStatus {
        match self {
            Self::Ok => StageStatus::Ok,
            Self::Warn => StageStatus::Warn,
            Self::Fail => StageStatus::Fail,
        }
    }
}

impl fmt::Display for DqStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.stage_status().fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_order_matches_taxonomy() {
        let ordered = [
            StageStatus::Ok,
            StageStatus::Warn,
            StageStatus::Partial,
            StageStatus::MissingInput,
            StageStatus::Error,
        ];
        for pair in ordered.windows(2) {
            assert!(pair[0].severity() < pair[1].severity(), "{pair:?}");
        }
        assert_eq!(StageStatus::Ok.severity(), StageStatus::Exists.severity());
    }

    #[test]
    fn worst_prefers_ok_over_exists() {
        assert_eq!(StageStatus::Exists.worst(StageStatus::Ok), StageStatus::Ok);
        assert_eq!(StageStatus::Exists.worst(StageStatus::Exists), StageStatus::Exists);
        assert_eq!(StageStatus::Partial.worst(StageStatus::Error), StageStatus::Error);
    }

    #[test]
    fn derive_from_files() {
        use FileStatus::*;
        assert_eq!(derive_stage_status([Exists, Exists], false), StageStatus::Exists);
        assert_eq!(derive_stage_status([Ok, Exists], false), StageStatus::Ok);
        assert_eq!(derive_stage_status([Ok, Missing], false), StageStatus::Partial);
        assert_eq!(derive_stage_status([Missing, Error], false), StageStatus::Error);
        assert_eq!(derive_stage_status([Missing, Missing], true), StageStatus::MissingInput);
    }

    #[test]
    fn missing_input_dir_without_records() {
        assert_eq!(
            derive_stage_status(std::iter::empty(), true),
            StageStatus::MissingInput
        );
        assert_eq!(derive_stage_status(std::iter::empty(), false), StageStatus::Ok);
    }

    #[test]
    fn status_round_trips_through_str() {
        for s in [
            StageStatus::Ok,
            StageStatus::MissingInput,
            StageStatus::Skipped,
            StageStatus::Unknown,
        ] {
            assert_eq!(s.as_str().parse::<StageStatus>().unwrap(), s);
        }
        assert!("bogus".parse::<StageStatus>().is_err());
        assert_eq!(
            serde_json::to_string(&StageStatus::MissingInput).unwrap(),
            "\"missing_input\""
        );
    }

    #[test]
    fn dq_aggregate() {
        use CheckStatus::*;
        assert_eq!(DqStatus::from_checks(&[Pass, Pass]), DqStatus::Ok);
        assert_eq!(DqStatus::from_checks(&[Pass, Warn]), DqStatus::Warn);
        assert_eq!(DqStatus::from_checks(&[Warn, Fail, Pass]), DqStatus::Fail);
        assert_eq!(DqStatus::Fail.to_string(), "fail");
    }
}
