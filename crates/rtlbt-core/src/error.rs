//! Setup failure taxonomy.
//!
//! Every layer has its own error enum; the sequencer folds them into a
//! single [`SetupError`] whose [`FailureReason`] is what callers report.

use std::fmt;
use thiserror::Error;

use crate::ddc::DdcError;
use crate::epatch::ParseError;
use crate::protocol::CodecError;
use crate::store::StoreError;
use crate::transport::TransportError;

/// Coarse reason code attached to a failed setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    Transport,
    Timeout,
    MalformedContainer,
    UnknownFormat,
    Truncated,
    NotImplemented,
    NoPatchForVersion,
    UnsupportedDevice,
    FirmwareNotFound,
    Protocol,
    BootFailed,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureReason::Transport => "TRANSPORT",
            FailureReason::Timeout => "TIMEOUT",
            FailureReason::MalformedContainer => "MALFORMED_CONTAINER",
            FailureReason::UnknownFormat => "UNKNOWN_FORMAT",
            FailureReason::Truncated => "TRUNCATED",
            FailureReason::NotImplemented => "NOT_IMPLEMENTED",
            FailureReason::NoPatchForVersion => "NO_PATCH_FOR_VERSION",
            FailureReason::UnsupportedDevice => "UNSUPPORTED_DEVICE",
            FailureReason::FirmwareNotFound => "FIRMWARE_NOT_FOUND",
            FailureReason::Protocol => "PROTOCOL",
            FailureReason::BootFailed => "BOOT_FAILED",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum SetupError {
    #[error("Transport error: {0}")]
    Transport(TransportError),

    #[error("Timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Protocol error: {0}")]
    Codec(#[from] CodecError),

    #[error("Firmware image error: {0}")]
    Parse(#[from] ParseError),

    #[error("Device config error: {0}")]
    Ddc(#[from] DdcError),

    #[error("Firmware store error: {0}")]
    Store(#[from] StoreError),

    #[error("Unsupported device: {0}")]
    UnsupportedDevice(String),

    #[error("Boot failed: {0}")]
    BootFailed(String),
}

impl From<TransportError> for SetupError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Timeout { timeout_ms } => SetupError::Timeout { timeout_ms },
            other => SetupError::Transport(other),
        }
    }
}

impl SetupError {
    pub fn reason(&self) -> FailureReason {
        match self {
            SetupError::Transport(_) => FailureReason::Transport,
            SetupError::Timeout { .. } => FailureReason::Timeout,
            SetupError::Codec(_) => FailureReason::Protocol,
            SetupError::Parse(e) => match e {
                ParseError::UnknownFormat => FailureReason::UnknownFormat,
                ParseError::Truncated { .. } => FailureReason::Truncated,
                ParseError::MalformedContainer(_) => FailureReason::MalformedContainer,
                ParseError::NotImplemented { .. } => FailureReason::NotImplemented,
                ParseError::NoPatchForVersion { .. } => FailureReason::NoPatchForVersion,
            },
            SetupError::Ddc(_) => FailureReason::MalformedContainer,
            SetupError::Store(e) => match e {
                StoreError::NotFound(_) | StoreError::Io(_) => FailureReason::FirmwareNotFound,
                StoreError::Decompress { .. } | StoreError::SizeMismatch { .. } => {
                    FailureReason::MalformedContainer
                }
            },
            SetupError::UnsupportedDevice(_) => FailureReason::UnsupportedDevice,
            SetupError::BootFailed(_) => FailureReason::BootFailed,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, SetupError::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_timeout_is_distinct() {
        let err: SetupError = TransportError::Timeout { timeout_ms: 1000 }.into();
        assert_eq!(err.reason(), FailureReason::Timeout);
        assert!(err.is_timeout());

        let err: SetupError = TransportError::Disconnected.into();
        assert_eq!(err.reason(), FailureReason::Transport);
    }

    #[test]
    fn test_parse_reasons() {
        let err: SetupError = ParseError::UnknownFormat.into();
        assert_eq!(err.reason(), FailureReason::UnknownFormat);

        let err: SetupError = ParseError::NoPatchForVersion { rom_version: 3 }.into();
        assert_eq!(err.reason(), FailureReason::NoPatchForVersion);
        assert_eq!(err.reason().to_string(), "NO_PATCH_FOR_VERSION");
    }

    #[test]
    fn test_store_reasons() {
        let err: SetupError = StoreError::NotFound("rtl8723b_fw.bin".into()).into();
        assert_eq!(err.reason(), FailureReason::FirmwareNotFound);
    }
}
