//! # musr_reader
//!
//! musr_reader decodes the binary run files written by the PSI muon-spin-resonance (µSR)
//! spectrometers, written in Rust. It reads the run metadata and the time-binned positron
//! histograms of a run, and derives the quantities used in a µSR analysis from them:
//! rebinned histograms, background corrected counts, the asymmetry of a detector pair and
//! its statistical error.
//!
//! ## Installation
//!
//! Currently the only method of install is from source, which is laid out below.
//!
//! ### Rust
//!
//! If you have not used Rust before, you will most likely need to install the Rust tool
//! chain. See the [Rust docs](https://www.rust-lang.org/tools/install) for installation
//! instructions.
//!
//! ### Building & Install
//!
//! To build and install the CLI use `cargo install --path ./musr_reader_cli` from the top
//! level musr_reader repository. To use the CLI see the `musr_reader_cli` documentation.
//!
//! ## Supported Formats
//!
//! The format of a file is detected from its first two bytes.
//!
//! - `1N`: PSI-bin. A fixed 1024 byte header followed by the histogram records.
//! - `M3`: MDU written by the pTA electronics, 16 tags.
//! - `T4`: MDU written by the TDC electronics, 16 tags.
//! - `T5`: MDU written by the TDC electronics, 32 tags.
//!
//! All multi-byte fields are little-endian.
//!
//! ## Use
//!
//! ```no_run
//! use libmusr_reader::derived::{BackgroundRange, DetectorPair};
//! use libmusr_reader::reader::MusrReader;
//! use std::path::Path;
//!
//! let mut reader = MusrReader::new();
//! match reader.read(Path::new("deltat_0042.bin")) {
//!     Ok(run) => println!("{run}"),
//!     Err(e) => println!("{e}"),
//! }
//! let pair = DetectorPair {
//!     plus: 0,
//!     minus: 1,
//!     alpha: 1.0,
//!     binning: 10,
//!     plus_background: BackgroundRange::new(20, 80),
//!     minus_background: BackgroundRange::new(20, 80),
//! };
//! let asymmetry = reader.asymmetry_good_bins(&pair);
//! ```
//!
//! Accessors never fail: an unknown histogram, an invalid binning or a reader without a
//! decoded run give a sentinel value (0, -1 or an empty vector).
//!
//! ## Configuration
//!
//! The CLI decodes a range of runs described by a YAML file:
//!
//! ```yml
//! data_path: /data/gps/2024
//! file_prefix: deltat_
//! file_extension: bin
//! first_run_number: 1
//! last_run_number: 100
//! binning: null
//! asymmetry:
//!   plus: 0
//!   minus: 1
//!   alpha: 1.0
//!   binning: 1
//!   plus_background:
//!     lower: 0
//!     upper: 0
//!   minus_background:
//!     lower: 0
//!     upper: 0
//! ```
//!
//! Run files are looked up as `{data_path}/{file_prefix}{run:0>4}.{file_extension}`. If
//! `binning` is not `null` it replaces the default binning of every run. If `asymmetry` is
//! not `null` the mean asymmetry of that detector pair over the good bins is logged for
//! every run.
pub mod byte_field;
pub mod config;
pub mod constants;
pub mod derived;
pub mod error;
pub mod format;
pub mod mdu;
pub mod process;
pub mod psi_bin;
pub mod reader;
pub mod run;
pub mod run_status;

#[cfg(test)]
mod fixtures;
