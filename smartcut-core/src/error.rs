//! The error taxonomy for Smart Cut jobs.
//!
//! One variant per row of the error table: local recovery (skip a NAL,
//! truncate a segment, drop a degenerate plan entry) happens at the call
//! site and never reaches here; everything else propagates as a
//! [`CutError`].

use std::path::PathBuf;

use failure::Fail;

#[derive(Fail, Debug)]
pub enum CutError {
    #[fail(display = "I/O error on {:?}: {}", path, cause)]
    Io {
        path: PathBuf,
        #[cause]
        cause: std::io::Error,
    },

    #[fail(display = "bitstream error at NAL #{}: {}", nal_index, reason)]
    Bitstream { nal_index: usize, reason: String },

    #[fail(display = "unsupported codec: {}", reason)]
    UnsupportedCodec { reason: String },

    #[fail(display = "no access units found in stream")]
    NoStream,

    #[fail(display = "keep-list is empty")]
    EmptyKeepList,

    #[fail(display = "invalid keep-list: {}", reason)]
    InvalidKeepList { reason: String },

    #[fail(display = "cut-pair ({}, {}) collapsed to nothing: {}", start, end, reason)]
    PlanDegenerate { start: i64, end: i64, reason: String },

    #[fail(display = "decoder init failed: {}", reason)]
    DecoderInit { reason: String },

    #[fail(display = "encoder init failed: {}", reason)]
    EncoderInit { reason: String },

    #[fail(display = "decoder produced only {} of {} expected frames in segment starting at {}", got, expected, segment_start)]
    DecoderStarved { segment_start: i64, expected: usize, got: usize },

    #[fail(display = "muxer exited with status {}: {}", code, stderr_tail)]
    MuxFailed { code: i32, stderr_tail: String },

    #[fail(display = "muxer exceeded its {:?} timeout", timeout)]
    MuxTimeout { timeout: std::time::Duration },

    #[fail(display = "cut job aborted")]
    Aborted,
}

impl CutError {
    pub fn io(path: impl Into<PathBuf>, cause: std::io::Error) -> Self {
        CutError::Io { path: path.into(), cause }
    }

    pub fn bitstream(nal_index: usize, reason: impl Into<String>) -> Self {
        CutError::Bitstream { nal_index, reason: reason.into() }
    }

    /// True for the three kinds §7 says a caller may recover from locally
    /// (the crate itself already recovers from these; this is exposed so a
    /// host embedding [`crate::job`] can distinguish a fatal abort from a
    /// job that merely logged warnings along the way).
    pub fn is_locally_recoverable(&self) -> bool {
        matches!(
            self,
            CutError::Bitstream { .. } | CutError::DecoderStarved { .. } | CutError::PlanDegenerate { .. }
        )
    }
}
