use thiserror::Error;

/// Errors surfaced by the bridge itself.
///
/// Unmapped keys and events arriving with no active session are silent
/// no-ops rather than errors, and corrupt save blobs fall back to the
/// zero-filled default, so none of those show up here. What remains is
/// fatal at construction time.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// A required host audio capability is missing (no output device, or
    /// a device that can't do f32 output). Not retried.
    #[error("required host audio capability unavailable: {0}")]
    HostCapabilityUnavailable(String),

    /// An empty ROM image can't form a shared region.
    #[error("rom image is empty")]
    RomEmpty,
}
