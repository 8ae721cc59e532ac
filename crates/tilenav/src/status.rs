//! Query outcome reporting
//!
//! Queries degrade rather than abort: a search that exhausts its node
//! pool or overruns an output buffer still hands back the best corridor
//! it found. [`Status`] encodes that as one completion bit (success,
//! failure, in progress) plus any number of detail bits describing what
//! was left behind. Only failed statuses become `Err` at the API
//! boundary; partial corridors, truncated buffers and exhausted pools
//! travel inside the `Ok` value.

use std::fmt;

/// Outcome of a navigation mesh operation: a completion bit plus
/// accumulated detail flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status(pub u32);

impl Status {
    /// The operation failed; any result data is meaningless
    pub const FAILURE: u32 = 1 << 31;
    /// The operation produced a usable result
    pub const SUCCESS: u32 = 1 << 30;
    /// A multi-step operation has not finished yet
    pub const IN_PROGRESS: u32 = 1 << 29;

    // Detail flags. The first three only ever accompany failures; the
    // rest qualify successful results.

    /// A parameter was out of range, non-finite, or a stale reference
    pub const INVALID_PARAM: u32 = 1 << 0;
    /// Tile data did not start with the expected magic number
    pub const WRONG_MAGIC: u32 = 1 << 1;
    /// Tile data was built for another format version
    pub const WRONG_VERSION: u32 = 1 << 2;
    /// No tile slot or allocation was available
    pub const OUT_OF_MEMORY: u32 = 1 << 3;
    /// The search exhausted its node pool before completing
    pub const OUT_OF_NODES: u32 = 1 << 4;
    /// The goal was not reached; the result is the best approximation
    pub const PARTIAL_RESULT: u32 = 1 << 5;
    /// The result was cut to fit the output capacity, start-aligned
    pub const BUFFER_TOO_SMALL: u32 = 1 << 6;
    /// A tile is already resident at the given grid cell and layer
    pub const ALREADY_OCCUPIED: u32 = 1 << 7;

    /// Display labels for every detail flag, in reporting order
    const DETAIL_LABELS: [(u32, &'static str); 8] = [
        (Self::INVALID_PARAM, "invalid param"),
        (Self::WRONG_MAGIC, "wrong magic"),
        (Self::WRONG_VERSION, "wrong version"),
        (Self::OUT_OF_MEMORY, "out of memory"),
        (Self::OUT_OF_NODES, "out of nodes"),
        (Self::PARTIAL_RESULT, "partial result"),
        (Self::BUFFER_TOO_SMALL, "buffer too small"),
        (Self::ALREADY_OCCUPIED, "already occupied"),
    ];

    /// Plain success
    pub const fn success() -> Self {
        Self(Self::SUCCESS)
    }

    /// Success carrying detail flags
    pub const fn success_detail(detail: u32) -> Self {
        Self(Self::SUCCESS | detail)
    }

    /// Plain failure
    pub const fn failure() -> Self {
        Self(Self::FAILURE)
    }

    /// Failure carrying detail flags
    pub const fn failure_detail(detail: u32) -> Self {
        Self(Self::FAILURE | detail)
    }

    /// An operation that has more steps to run
    pub const fn in_progress() -> Self {
        Self(Self::IN_PROGRESS)
    }

    /// True when the result is usable, detail flags notwithstanding
    pub const fn is_success(&self) -> bool {
        self.0 & Self::SUCCESS != 0
    }

    /// True when the operation failed outright
    pub const fn is_failure(&self) -> bool {
        self.0 & Self::FAILURE != 0
    }

    /// True when the operation has not completed
    pub const fn is_in_progress(&self) -> bool {
        self.0 & Self::IN_PROGRESS != 0
    }

    /// True when the given detail flag is set
    pub const fn has_detail(&self, detail: u32) -> bool {
        self.0 & detail != 0
    }

    /// All detail flags, with the completion bits masked off
    pub const fn details(&self) -> u32 {
        self.0 & !(Self::FAILURE | Self::SUCCESS | Self::IN_PROGRESS)
    }
}

impl std::ops::BitOr<u32> for Status {
    type Output = Status;

    fn bitor(self, detail: u32) -> Status {
        Status(self.0 | detail)
    }
}

impl std::ops::BitOrAssign<u32> for Status {
    fn bitor_assign(&mut self, detail: u32) {
        self.0 |= detail;
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let completion = if self.is_failure() {
            "failure"
        } else if self.is_success() {
            "success"
        } else if self.is_in_progress() {
            "in progress"
        } else {
            "unknown"
        };
        f.write_str(completion)?;

        let mut sep = " (";
        for (flag, label) in Self::DETAIL_LABELS {
            if self.has_detail(flag) {
                f.write_str(sep)?;
                f.write_str(label)?;
                sep = ", ";
            }
        }
        if sep == ", " {
            f.write_str(")")?;
        }
        Ok(())
    }
}

impl std::error::Error for Status {}

impl From<std::io::Error> for Status {
    fn from(_: std::io::Error) -> Self {
        // Truncated or unreadable navigation data.
        Status::failure_detail(Status::INVALID_PARAM)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_bits_are_exclusive_predicates() {
        assert!(Status::success().is_success());
        assert!(!Status::success().is_failure());
        assert!(!Status::success().is_in_progress());

        assert!(Status::failure().is_failure());
        assert!(!Status::failure().is_success());

        assert!(Status::in_progress().is_in_progress());
        assert!(!Status::in_progress().is_success());
        assert!(!Status::in_progress().is_failure());
    }

    #[test]
    fn test_degraded_results_stay_successful() {
        // A truncated partial corridor is still a usable result.
        let mut status = Status::success();
        status |= Status::PARTIAL_RESULT;
        status |= Status::OUT_OF_NODES;

        assert!(status.is_success());
        assert!(status.has_detail(Status::PARTIAL_RESULT));
        assert!(status.has_detail(Status::OUT_OF_NODES));
        assert!(!status.has_detail(Status::BUFFER_TOO_SMALL));
        assert_eq!(status.details(), Status::PARTIAL_RESULT | Status::OUT_OF_NODES);
    }

    #[test]
    fn test_failure_details_survive_masking() {
        let status = Status::failure_detail(Status::WRONG_MAGIC | Status::WRONG_VERSION);
        assert!(status.is_failure());
        assert_eq!(status.details(), Status::WRONG_MAGIC | Status::WRONG_VERSION);
    }

    #[test]
    fn test_io_errors_map_to_invalid_data() {
        let err = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short read");
        let status = Status::from(err);
        assert!(status.is_failure());
        assert!(status.has_detail(Status::INVALID_PARAM));
    }

    #[test]
    fn test_display_lists_details() {
        let status = Status::success_detail(Status::PARTIAL_RESULT | Status::BUFFER_TOO_SMALL);
        let text = status.to_string();
        assert!(text.starts_with("success"));
        assert!(text.contains("partial result"));
        assert!(text.contains("buffer too small"));

        assert_eq!(Status::failure().to_string(), "failure");
    }
}
