//! Error taxonomy for the encoder core (spec §7).
//!
//! Four enums partition the taxonomy described in the spec: configuration
//! errors are fatal to the encoder instance and raised at `start`/
//! `set_format` time; transient GPU errors are per-frame and non-fatal;
//! protocol errors indicate an internal bug and stop the encoder; resource
//! errors are allocation failures. `EncoderError` is the union callers
//! match against, mirroring the teacher's `DecoderError`/`VulkanEncoderError`
//! split in `vulkan_video.rs`.

/// Raised during `GopPlanner::plan`, `SessionOrchestrator::start`, or
/// `LevelSelector::select` when the caller's configuration cannot be
/// satisfied. Fatal for this encoder instance; the caller must still be
/// able to safely call `stop()`/drop afterwards.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid encoder parameter, field: {field} - problem: {problem}")]
    InvalidParameter {
        field: &'static str,
        problem: String,
    },

    #[error("no level in the {codec} level table covers {picture_description}")]
    LevelUnreachable {
        codec: &'static str,
        picture_description: String,
    },

    #[error(
        "driver's advertised std-header version {driver_version} is below the version this encoder requires ({required_version})"
    )]
    StdHeaderVersionMismatch {
        required_version: u32,
        driver_version: u32,
    },

    #[error("no supported image format found while enumerating {usage}")]
    NoSupportedFormat { usage: &'static str },

    #[error("profile {0} is not supported by this device")]
    ProfileUnsupported(&'static str),

    #[error("requested rate control mode {0:?} is not among the modes this device supports")]
    RateControlUnsupported(crate::ratecontrol::RateControlMode),
}

/// Raised by `OperationRecorder`/`SessionOrchestrator` for a single
/// operation. Logged and surfaced as a per-frame encode failure; the
/// encoder keeps running (spec §7).
#[derive(Debug, thiserror::Error)]
pub enum GpuOpError {
    #[error("submit failed: {0}")]
    SubmitFailed(String),

    #[error("wait on fence timed out after {timeout_ns} ns")]
    WaitTimedOut { timeout_ns: u64 },

    #[error("query pool returned incomplete status for query {query_id}")]
    QueryIncomplete { query_id: u32 },

    #[error("command buffer pool exhausted")]
    CommandBufferPoolExhausted,
}

/// Internal invariant violation (spec §7): DPB overflow, POC collision,
/// submitting before the session started. Indicates a bug; fails the
/// frame and stops the encoder.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("dpb overflow: {occupied} references occupied, capacity is {capacity}")]
    DpbOverflow { occupied: usize, capacity: usize },

    #[error("poc collision: poc {poc} already present in the active GOP")]
    PocCollision { poc: i32 },

    #[error("attempted to submit an encode operation before the session was started")]
    SessionNotStarted,

    #[error("reorder engine asked to pop a B-frame whose anchors were never emitted")]
    MissingAnchor,

    #[error("frame_num {frame_num} collides with an already-live reference in this GOP")]
    FrameNumCollision { frame_num: u32 },
}

/// Resource exhaustion (spec §7): out of staging memory, no free DPB
/// slot, output buffer too small.
#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    #[error("no free dpb slot available (all {capacity} slots occupied)")]
    NoFreeDpbSlot { capacity: usize },

    #[error("output buffer too small: need {needed} bytes, have {available}")]
    OutputBufferTooSmall { needed: usize, available: usize },

    #[error("staging buffer allocation of {0} bytes failed")]
    StagingAllocationFailed(u64),
}

/// Top-level error type returned from the public encoder API. Wraps the
/// four taxonomy enums with `#[from]` so calling code can match on one
/// type, the way `vulkan_video.rs`'s top-level errors re-export the
/// per-subsystem ones.
#[derive(Debug, thiserror::Error)]
pub enum EncoderError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    GpuOp(#[from] GpuOpError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Resource(#[from] ResourceError),
}
