//! 💥 Stage failures: the handful of things that are allowed to end a run.
//!
//! Per-line trouble never shows up here. That goes to the diagnostics log and the
//! stream keeps moving. What lands here is structural: the input would not open,
//! the report would not write, the sort ran out of time, the paper trail broke,
//! or the publish step fell over.
//!
//! 🧠 Knowledge graph:
//! - Attached to an `anyhow::Error` as a context value: `.context(StageFailure::Sort)`.
//! - Recovered anywhere up the stack with [`StageFailure::of`], which is how the CLI
//!   picks an exit code without string-sniffing error messages.

use thiserror::Error;

/// 🏷️ Which stage of the run gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StageFailure {
    #[error("stage failed: configuration could not be loaded")]
    Configuration,
    #[error("stage failed: input could not be acquired")]
    InputAcquisition,
    #[error("stage failed: output could not be written")]
    OutputWrite,
    #[error("stage failed: results could not be sorted in time")]
    Sort,
    #[error("stage failed: diagnostics log could not be written")]
    Diagnostics,
    #[error("stage failed: artifacts could not be published")]
    Publish,
}

impl StageFailure {
    /// 🚪 Process exit status for this failure. `1` is reserved for "something else".
    pub fn exit_code(self) -> i32 {
        match self {
            Self::InputAcquisition => 2,
            Self::OutputWrite => 3,
            Self::Sort => 4,
            Self::Diagnostics => 5,
            Self::Publish => 6,
            Self::Configuration => 7,
        }
    }

    /// 🔍 Dig the outermost stage tag out of an error, if anyone attached one.
    pub fn of(err: &anyhow::Error) -> Option<Self> {
        err.downcast_ref::<Self>().copied()
    }
}

/// 🚪 Exit status for an arbitrary run error.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    StageFailure::of(err).map_or(1, StageFailure::exit_code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, anyhow};

    #[test]
    fn the_one_where_the_stage_tag_survives_more_context_on_top() {
        let the_error = Err::<(), _>(anyhow!("disk full"))
            .context("💀 could not write the intermediate file")
            .context(StageFailure::OutputWrite)
            .context("💀 report stage gave up")
            .expect_err("💀 should be an error");

        assert_eq!(StageFailure::of(&the_error), Some(StageFailure::OutputWrite));
        assert_eq!(exit_code_for(&the_error), 3);
    }

    #[test]
    fn the_one_where_untagged_errors_get_the_generic_exit_code() {
        let the_error = anyhow!("something unexpected");
        assert_eq!(StageFailure::of(&the_error), None);
        assert_eq!(exit_code_for(&the_error), 1);
    }

    #[test]
    fn the_one_where_every_stage_has_its_own_door() {
        let mut the_codes: Vec<i32> = [
            StageFailure::Configuration,
            StageFailure::InputAcquisition,
            StageFailure::OutputWrite,
            StageFailure::Sort,
            StageFailure::Diagnostics,
            StageFailure::Publish,
        ]
        .into_iter()
        .map(StageFailure::exit_code)
        .collect();
        the_codes.sort_unstable();
        the_codes.dedup();

        assert_eq!(the_codes, vec![2, 3, 4, 5, 6, 7]);
    }
}
