use std::fmt::Display;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use super::constants::*;
use super::error::DecodeError;

/// The three MDU layouts written by the pTA and TDC front ends.
///
/// They share the file header and tag record but differ in the width of the tag table,
/// and with it in the sizes of the settings and statistics blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MduVariant {
    /// pTA with 16 tags
    PtaM3,
    /// TDC with 16 tags
    TdcT4,
    /// TDC with 32 tags
    TdcT5,
}

impl MduVariant {
    pub fn tag_count(&self) -> usize {
        match self {
            Self::PtaM3 => PTA_MAX_TAGS,
            Self::TdcT4 => TDC_MAX_TAGS,
            Self::TdcT5 => TDC32_MAX_TAGS,
        }
    }

    /// Expected size of the settings block, including its tag table
    pub fn settings_size(&self) -> usize {
        MDU_SETTINGS_PREFIX_SIZE + self.tag_count() * MDU_TAG_SIZE
    }

    /// Expected size of the statistics block (totals, tag and histogram scalers, overflow bits)
    pub fn statistics_size(&self) -> usize {
        MDU_STATISTICS_PREFIX_SIZE + 2 * self.tag_count() * 4 + MDU_STATISTICS_SUFFIX_SIZE
    }

    /// pTA selects histograms through the detector list; TDC keeps all of them
    pub fn honours_selection(&self) -> bool {
        matches!(self, Self::PtaM3)
    }

    pub fn magic(&self) -> &'static [u8; 2] {
        match self {
            Self::PtaM3 => MAGIC_MDU_PTA,
            Self::TdcT4 => MAGIC_MDU_TDC,
            Self::TdcT5 => MAGIC_MDU_TDC32,
        }
    }
}

/// The file families understood by the reader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    PsiBin,
    Mdu(MduVariant),
}

impl FileFormat {
    /// Identify a format from the two magic bytes at the start of a file
    pub fn from_magic(magic: &[u8; 2]) -> Result<Self, DecodeError> {
        match magic {
            MAGIC_PSI_BIN => Ok(Self::PsiBin),
            MAGIC_MDU_PTA => Ok(Self::Mdu(MduVariant::PtaM3)),
            MAGIC_MDU_TDC => Ok(Self::Mdu(MduVariant::TdcT4)),
            MAGIC_MDU_TDC32 => Ok(Self::Mdu(MduVariant::TdcT5)),
            _ => Err(DecodeError::UnsupportedVersion(magic_to_string(magic))),
        }
    }

    /// The two character format identifier
    pub fn id(&self) -> &'static str {
        match self {
            Self::PsiBin => "1N",
            Self::Mdu(MduVariant::PtaM3) => "M3",
            Self::Mdu(MduVariant::TdcT4) => "T4",
            Self::Mdu(MduVariant::TdcT5) => "T5",
        }
    }
}

impl Display for FileFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PsiBin => write!(f, "PSI-bin ({})", self.id()),
            Self::Mdu(_) => write!(f, "MDU ({})", self.id()),
        }
    }
}

pub(crate) fn magic_to_string(magic: &[u8]) -> String {
    magic.iter().map(|b| *b as char).collect()
}

/// Read only the two magic bytes of the file at `path` and identify its format.
///
/// A file which cannot be opened, or is too short to hold a magic, is an OpenFailure.
pub fn sniff_format(path: &Path) -> Result<FileFormat, DecodeError> {
    let mut file = File::open(path).map_err(|e| DecodeError::OpenFailure(path.to_path_buf(), e))?;
    let mut magic = [0u8; 2];
    file.read_exact(&mut magic)
        .map_err(|e| DecodeError::OpenFailure(path.to_path_buf(), e))?;
    FileFormat::from_magic(&magic)
}
