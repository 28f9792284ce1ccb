//! Playback faults reported by the engine and their retry classes

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fault codes reported by the playback engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    // Container / manifest parsing
    ParsingContainerMalformed,
    ParsingContainerUnsupported,
    ParsingManifestMalformed,
    ParsingManifestUnsupported,

    // Live edge
    BehindLiveWindow,

    // I/O
    IoUnspecified,
    IoNetworkConnectionFailed,
    IoNetworkConnectionTimeout,
    IoBadHttpStatus,
    IoFileNotFound,

    // DRM
    DrmUnspecified,
    DrmSchemeUnsupported,
    DrmProvisioningFailed,
    DrmLicenseAcquisitionFailed,

    // Decoding
    DecoderInitFailed,
    DecodingFailed,

    /// The session could not construct a pipeline for the locator
    SourceUnavailable,
    Unspecified,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ParsingContainerMalformed => "PARSING_CONTAINER_MALFORMED",
            ErrorCode::ParsingContainerUnsupported => "PARSING_CONTAINER_UNSUPPORTED",
            ErrorCode::ParsingManifestMalformed => "PARSING_MANIFEST_MALFORMED",
            ErrorCode::ParsingManifestUnsupported => "PARSING_MANIFEST_UNSUPPORTED",
            ErrorCode::BehindLiveWindow => "BEHIND_LIVE_WINDOW",
            ErrorCode::IoUnspecified => "IO_UNSPECIFIED",
            ErrorCode::IoNetworkConnectionFailed => "IO_NETWORK_CONNECTION_FAILED",
            ErrorCode::IoNetworkConnectionTimeout => "IO_NETWORK_CONNECTION_TIMEOUT",
            ErrorCode::IoBadHttpStatus => "IO_BAD_HTTP_STATUS",
            ErrorCode::IoFileNotFound => "IO_FILE_NOT_FOUND",
            ErrorCode::DrmUnspecified => "DRM_UNSPECIFIED",
            ErrorCode::DrmSchemeUnsupported => "DRM_SCHEME_UNSUPPORTED",
            ErrorCode::DrmProvisioningFailed => "DRM_PROVISIONING_FAILED",
            ErrorCode::DrmLicenseAcquisitionFailed => "DRM_LICENSE_ACQUISITION_FAILED",
            ErrorCode::DecoderInitFailed => "DECODER_INIT_FAILED",
            ErrorCode::DecodingFailed => "DECODING_FAILED",
            ErrorCode::SourceUnavailable => "SOURCE_UNAVAILABLE",
            ErrorCode::Unspecified => "UNSPECIFIED",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the session reacts to a fault
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultClass {
    /// Container or manifest rejected; try the next format hypothesis
    Format,
    /// Position fell out of the live window; reseek to the live edge
    BehindLiveWindow,
    /// Transient I/O; ignored at this layer
    UnspecifiedIo,
    /// Published as a terminal error, no retry
    Terminal,
}

/// A fatal fault reported by the playback engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{code}{}", detail(.message))]
pub struct PlaybackFault {
    pub code: ErrorCode,
    pub message: String,
}

impl PlaybackFault {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn class(&self) -> FaultClass {
        match self.code {
            ErrorCode::ParsingContainerMalformed
            | ErrorCode::ParsingContainerUnsupported
            | ErrorCode::ParsingManifestMalformed
            | ErrorCode::ParsingManifestUnsupported => FaultClass::Format,
            ErrorCode::BehindLiveWindow => FaultClass::BehindLiveWindow,
            ErrorCode::IoUnspecified => FaultClass::UnspecifiedIo,
            _ => FaultClass::Terminal,
        }
    }
}

fn detail(message: &str) -> String {
    if message.is_empty() {
        String::new()
    } else {
        format!(": {}", message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let format = PlaybackFault::new(ErrorCode::ParsingManifestUnsupported, "");
        assert_eq!(format.class(), FaultClass::Format);
        let malformed = PlaybackFault::new(ErrorCode::ParsingContainerMalformed, "");
        assert_eq!(malformed.class(), FaultClass::Format);
        let live = PlaybackFault::new(ErrorCode::BehindLiveWindow, "");
        assert_eq!(live.class(), FaultClass::BehindLiveWindow);
        let io = PlaybackFault::new(ErrorCode::IoUnspecified, "");
        assert_eq!(io.class(), FaultClass::UnspecifiedIo);
        let drm = PlaybackFault::new(ErrorCode::DrmLicenseAcquisitionFailed, "403");
        assert_eq!(drm.class(), FaultClass::Terminal);
    }

    #[test]
    fn test_display() {
        let fault = PlaybackFault::new(ErrorCode::IoBadHttpStatus, "404");
        assert_eq!(fault.to_string(), "IO_BAD_HTTP_STATUS: 404");
        assert_eq!(
            PlaybackFault::new(ErrorCode::Unspecified, "").to_string(),
            "UNSPECIFIED"
        );
    }

    #[test]
    fn test_fault_is_an_error_source() {
        let fault = PlaybackFault::new(ErrorCode::DrmLicenseAcquisitionFailed, "403");
        let error: Box<dyn std::error::Error + Send + Sync> = Box::new(fault.clone());
        assert_eq!(error.to_string(), "DRM_LICENSE_ACQUISITION_FAILED: 403");
        assert!(error.source().is_none());
        assert_eq!(error.downcast_ref::<PlaybackFault>(), Some(&fault));
    }

    #[test]
    fn test_codes_deserialize_from_snake_case() {
        let code: ErrorCode = serde_json::from_str("\"parsing_container_unsupported\"").unwrap();
        assert_eq!(code, ErrorCode::ParsingContainerUnsupported);
    }
}
