use std::path::PathBuf;
use thiserror::Error;

use super::constants::*;
use super::run_status::RunStatus;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    #[error("Field of {width} bytes at offset {offset} lies outside of a {len} byte buffer")]
    OutOfBounds {
        offset: usize,
        width: usize,
        len: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapacityError {
    #[error("Cannot store more than {max} histograms", max=MAX_HISTOGRAMS)]
    Histograms,
    #[error("Cannot store more than {max} scalers", max=MAX_SCALERS)]
    Scalers,
    #[error("Cannot store more than {max} temperatures", max=MAX_TEMPERATURES)]
    Temperatures,
    #[error("Cannot store a histogram of {0} bins, at most {max} are supported", max=MAX_HISTOGRAM_BINS)]
    Bins(i64),
    #[error("Cannot allocate a buffer of {0} bytes")]
    Buffer(usize),
}

/// Compact discriminant of a [DecodeError], stable across messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    OpenFailure,
    HeaderReadFailure,
    UnsupportedVersion,
    AllocationFailure,
    UnimplementedAlgorithm,
    TooFewHistograms,
    DataReadFailure,
    SettingsResolutionFailure,
}

impl ErrorCode {
    /// The integer status reported by the legacy PSI tools (0 is success).
    pub fn status(&self) -> i32 {
        match self {
            Self::OpenFailure | Self::HeaderReadFailure | Self::SettingsResolutionFailure => 1,
            Self::UnsupportedVersion => 2,
            Self::AllocationFailure => 3,
            Self::UnimplementedAlgorithm => 4,
            Self::TooFewHistograms => 5,
            Self::DataReadFailure => 6,
        }
    }
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Open {0:?} failed: {1}")]
    OpenFailure(PathBuf, std::io::Error),
    #[error("Reading header failed: {0}")]
    HeaderReadFailure(String),
    #[error("Unknown file format {0:?}")]
    UnsupportedVersion(String),
    #[error("Allocating data buffer failed: {0}")]
    AllocationFailure(#[from] CapacityError),
    #[error("Algorithm to read {0} histograms in one record is not implemented")]
    UnimplementedAlgorithm(i16),
    #[error("Less than 1 histogram found ({0})")]
    TooFewHistograms(i32),
    #[error("Reading data failed: {0}")]
    DataReadFailure(String),
    #[error("Settings resolution code {0} failed")]
    SettingsResolutionFailure(i32),
    #[error("Header field could not be decoded: {0}")]
    BadField(#[from] FieldError),
}

impl DecodeError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::OpenFailure(..) => ErrorCode::OpenFailure,
            Self::HeaderReadFailure(_) | Self::BadField(_) => ErrorCode::HeaderReadFailure,
            Self::UnsupportedVersion(_) => ErrorCode::UnsupportedVersion,
            Self::AllocationFailure(_) => ErrorCode::AllocationFailure,
            Self::UnimplementedAlgorithm(_) => ErrorCode::UnimplementedAlgorithm,
            Self::TooFewHistograms(_) => ErrorCode::TooFewHistograms,
            Self::DataReadFailure(_) => ErrorCode::DataReadFailure,
            Self::SettingsResolutionFailure(_) => ErrorCode::SettingsResolutionFailure,
        }
    }

    /// Wrap a short read of a header structure
    pub(crate) fn header(what: &str, e: std::io::Error) -> Self {
        Self::HeaderReadFailure(format!("{what}: {e}"))
    }

    /// Wrap a short read of tag or histogram data
    pub(crate) fn data(what: &str, e: std::io::Error) -> Self {
        Self::DataReadFailure(format!("{what}: {e}"))
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Config failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Config failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
}

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("Processor failed due to Config error: {0}")]
    ConfigError(#[from] ConfigError),
    #[error("Processor failed due to Send error: {0}")]
    SendError(#[from] std::sync::mpsc::SendError<RunStatus>),
}
