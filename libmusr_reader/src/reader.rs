use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use super::derived::{BackgroundRange, DetectorPair};
use super::error::{DecodeError, ErrorCode};
use super::format::{sniff_format, FileFormat};
use super::mdu::read_mdu;
use super::psi_bin::read_psi_bin;
use super::run::{Histogram, RunData, Scaler};

/// Lifecycle of a [MusrReader]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReaderState {
    #[default]
    Uninitialized,
    Decoding,
    Decoded,
    Failed,
}

/// Reusable decoder for PSI-bin and MDU files.
///
/// A reader holds at most one decoded run. Every call to [MusrReader::read] starts from a
/// reset, and a failed read leaves nothing of the previous or the partial run behind.
///
/// Accessors never fail: a bad index, or a reader holding no run, gives a sentinel
/// (`0`, `0.0`, `-1`, an empty string or an empty sequence, as documented per method).
/// Note that the `0` returned for a bin outside of the histogram cannot be told apart
/// from an empty bin; check [MusrReader::number_histo] and [MusrReader::histogram_length].
///
/// A reader is not meant to be shared between threads while decoding; use one per thread.
#[derive(Debug, Default)]
pub struct MusrReader {
    state: ReaderState,
    filename: Option<PathBuf>,
    run: Option<RunData>,
    status: String,
    last_error: Option<ErrorCode>,
}

impl MusrReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode the file at `path`, replacing whatever the reader held before
    pub fn read(&mut self, path: &Path) -> Result<&RunData, DecodeError> {
        self.reset();
        self.filename = Some(path.to_path_buf());
        self.state = ReaderState::Decoding;
        match decode_file(path) {
            Ok(run) => {
                spdlog::info!(
                    "Decoded run {} with {} histograms of {} bins",
                    run.metadata.run_number,
                    run.histograms().len(),
                    run.histogram_length()
                );
                self.state = ReaderState::Decoded;
                self.status = String::from("SUCCESS");
                Ok(&*self.run.insert(run))
            }
            Err(e) => {
                spdlog::error!("Failed to decode {}: {e}", path.display());
                self.run = None;
                self.state = ReaderState::Failed;
                self.status = format!("ERROR {e}");
                self.last_error = Some(e.code());
                Err(e)
            }
        }
    }

    /// Drop the decoded run and all status information
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn state(&self) -> ReaderState {
        self.state
    }

    pub fn reading_ok(&self) -> bool {
        self.state == ReaderState::Decoded
    }

    /// "SUCCESS", "ERROR <message>", or empty before any read
    pub fn read_status(&self) -> &str {
        &self.status
    }

    pub fn last_error(&self) -> Option<ErrorCode> {
        self.last_error
    }

    /// Integer status of the last read (0 on success)
    pub fn status_code(&self) -> i32 {
        self.last_error.map(|code| code.status()).unwrap_or(0)
    }

    pub fn filename(&self) -> Option<&Path> {
        self.filename.as_deref()
    }

    /// The decoded run, if the last read succeeded
    pub fn run(&self) -> Option<&RunData> {
        self.run.as_ref()
    }

    /// The two character format identifier, "??" without a run
    pub fn format_id(&self) -> &'static str {
        self.run
            .as_ref()
            .map(|r| r.metadata.format.id())
            .unwrap_or("??")
    }

    pub fn format(&self) -> Option<FileFormat> {
        self.run.as_ref().map(|r| r.metadata.format)
    }

    pub fn number_histo(&self) -> usize {
        self.run.as_ref().map(|r| r.histograms().len()).unwrap_or(0)
    }

    pub fn histogram_length(&self) -> usize {
        self.run.as_ref().map(|r| r.histogram_length()).unwrap_or(0)
    }

    /// Raw value of bin `bin` of histogram `histogram`, 0 if either is out of range
    pub fn histo_int(&self, histogram: usize, bin: usize) -> u32 {
        self.run
            .as_ref()
            .and_then(|r| r.histogram(histogram))
            .and_then(|h| h.bins().get(bin).copied())
            .unwrap_or(0)
    }

    /// As [MusrReader::histo_int], as a float
    pub fn histo(&self, histogram: usize, bin: usize) -> f64 {
        self.histo_int(histogram, bin) as f64
    }

    /// Copy of the raw bins of a histogram, empty if it does not exist
    pub fn histo_array_int(&self, histogram: usize) -> Vec<u32> {
        self.run
            .as_ref()
            .and_then(|r| r.histogram(histogram))
            .map(|h| h.bins().to_vec())
            .unwrap_or_default()
    }

    /// Histograms as floating point sequences, each derived on demand from the raw bins
    pub fn histos_vector(&self) -> Vec<Vec<f64>> {
        (0..self.number_histo())
            .map(|i| self.histo_vector(i, 1))
            .collect()
    }

    /// Run a derived quantity against the decoded run, or give an empty sequence
    fn derive(&self, f: impl FnOnce(&RunData) -> Vec<f64>) -> Vec<f64> {
        self.run.as_ref().map(f).unwrap_or_default()
    }

    pub fn histo_vector(&self, histogram: usize, binning: i32) -> Vec<f64> {
        self.derive(|r| r.rebin(histogram, binning))
    }

    pub fn histo_vector_no0(&self, histogram: usize, binning: i32) -> Vec<f64> {
        self.derive(|r| r.rebin_no0(histogram, binning))
    }

    pub fn histo_from_t0(&self, histogram: usize, binning: i32, offset: i32) -> Vec<f64> {
        self.derive(|r| r.from_t0(histogram, binning, offset))
    }

    pub fn histo_good_bins(&self, histogram: usize, binning: i32) -> Vec<f64> {
        self.derive(|r| r.good_bins(histogram, binning))
    }

    pub fn histo_from_t0_minus_background(
        &self,
        histogram: usize,
        background: BackgroundRange,
        binning: i32,
        offset: i32,
    ) -> Vec<f64> {
        self.derive(|r| r.from_t0_minus_background(histogram, background, binning, offset))
    }

    pub fn histo_good_bins_minus_background(
        &self,
        histogram: usize,
        background: BackgroundRange,
        binning: i32,
    ) -> Vec<f64> {
        self.derive(|r| r.good_bins_minus_background(histogram, background, binning))
    }

    pub fn asymmetry(&self, pair: &DetectorPair, offset: i32, y_offset: f64) -> Vec<f64> {
        self.derive(|r| r.asymmetry(pair, offset, y_offset))
    }

    pub fn asymmetry_error(&self, pair: &DetectorPair, offset: i32) -> Vec<f64> {
        self.derive(|r| r.asymmetry_error(pair, offset))
    }

    pub fn asymmetry_good_bins(&self, pair: &DetectorPair) -> Vec<f64> {
        self.derive(|r| r.asymmetry_good_bins(pair))
    }

    pub fn asymmetry_good_bins_error(&self, pair: &DetectorPair) -> Vec<f64> {
        self.derive(|r| r.asymmetry_good_bins_error(pair))
    }

    /// Value of a per histogram field, or `missing` for a bad index
    fn per_histogram<T>(
        &self,
        histogram: usize,
        missing: T,
        field: impl Fn(&Histogram) -> T,
    ) -> T {
        self.run
            .as_ref()
            .and_then(|r| r.histogram(histogram))
            .map(field)
            .unwrap_or(missing)
    }

    /// Label of a histogram, empty for a bad index
    pub fn name_histo(&self, histogram: usize) -> String {
        self.per_histogram(histogram, String::new(), |h| h.label.clone())
    }

    pub fn histo_names(&self) -> Vec<String> {
        self.all_histograms(|h| h.label.clone())
    }

    /// Events between first and last good bin, -1 for a bad index
    pub fn events_histo(&self, histogram: usize) -> i64 {
        self.per_histogram(histogram, -1, |h| h.events)
    }

    pub fn events_histo_vector(&self) -> Vec<i64> {
        self.all_histograms(|h| h.events)
    }

    pub fn t0_int(&self, histogram: usize) -> i32 {
        self.per_histogram(histogram, -1, |h| h.t0)
    }

    /// The t0 stored as a float (PSI-bin only, 0 for MDU), -1 for a bad index
    pub fn t0_double(&self, histogram: usize) -> f64 {
        self.per_histogram(histogram, -1.0, |h| h.real_t0 as f64)
    }

    pub fn t0_vector(&self) -> Vec<i32> {
        self.all_histograms(|h| h.t0)
    }

    pub fn first_good(&self, histogram: usize) -> i32 {
        self.per_histogram(histogram, -1, |h| h.first_good)
    }

    pub fn first_good_vector(&self) -> Vec<i32> {
        self.all_histograms(|h| h.first_good)
    }

    pub fn last_good(&self, histogram: usize) -> i32 {
        self.per_histogram(histogram, -1, |h| h.last_good)
    }

    pub fn last_good_vector(&self) -> Vec<i32> {
        self.all_histograms(|h| h.last_good)
    }

    fn all_histograms<T>(&self, field: impl Fn(&Histogram) -> T) -> Vec<T> {
        self.run
            .as_ref()
            .map(|r| r.histograms().iter().map(field).collect())
            .unwrap_or_default()
    }

    /// Override the first good bin of a histogram. Returns false for a bad index.
    pub fn put_first_good(&mut self, histogram: usize, value: i32) -> bool {
        match self.run.as_mut().and_then(|r| r.histogram_mut(histogram)) {
            Some(h) => {
                h.first_good = value;
                true
            }
            None => false,
        }
    }

    /// Override the last good bin of a histogram. Returns false for a bad index.
    pub fn put_last_good(&mut self, histogram: usize, value: i32) -> bool {
        match self.run.as_mut().and_then(|r| r.histogram_mut(histogram)) {
            Some(h) => {
                h.last_good = value;
                true
            }
            None => false,
        }
    }

    /// Override the run number. Only positive numbers are accepted.
    pub fn put_run_number(&mut self, run_number: i32) -> bool {
        match self.run.as_mut() {
            Some(r) if run_number > 0 => {
                r.metadata.run_number = run_number;
                true
            }
            _ => false,
        }
    }

    /// Largest t0 of all histograms (0 without histograms)
    pub fn max_t0(&self) -> i32 {
        self.t0_vector().into_iter().fold(0, i32::max)
    }

    /// Smallest t0 of all histograms, starting from the histogram length
    pub fn min_t0(&self) -> i32 {
        self.t0_vector()
            .into_iter()
            .fold(self.histogram_length() as i32, i32::min)
    }

    /// Larger t0 of two histograms, -1 if either index is bad
    pub fn max_2_t0(&self, first: usize, second: usize) -> i32 {
        self.pair_extreme(first, second, |h| h.t0, i32::max)
    }

    pub fn min_2_t0(&self, first: usize, second: usize) -> i32 {
        self.pair_extreme(first, second, |h| h.t0, i32::min)
    }

    pub fn max_last_good(&self) -> i32 {
        self.last_good_vector().into_iter().fold(0, i32::max)
    }

    pub fn min_last_good(&self) -> i32 {
        self.last_good_vector()
            .into_iter()
            .fold(self.histogram_length() as i32, i32::min)
    }

    pub fn max_2_last_good(&self, first: usize, second: usize) -> i32 {
        self.pair_extreme(first, second, |h| h.last_good, i32::max)
    }

    pub fn min_2_last_good(&self, first: usize, second: usize) -> i32 {
        self.pair_extreme(first, second, |h| h.last_good, i32::min)
    }

    fn pair_extreme(
        &self,
        first: usize,
        second: usize,
        field: impl Fn(&Histogram) -> i32,
        pick: fn(i32, i32) -> i32,
    ) -> i32 {
        let Some(run) = self.run.as_ref() else {
            return -1;
        };
        match (run.histogram(first), run.histogram(second)) {
            (Some(a), Some(b)) => pick(field(a), field(b)),
            _ => -1,
        }
    }

    pub fn run_number(&self) -> i32 {
        self.run.as_ref().map(|r| r.metadata.run_number).unwrap_or(0)
    }

    fn text(&self, field: impl Fn(&RunData) -> &str) -> String {
        self.run
            .as_ref()
            .map(|r| field(r).to_string())
            .unwrap_or_default()
    }

    pub fn sample(&self) -> String {
        self.text(|r| &r.metadata.sample)
    }

    pub fn temperature(&self) -> String {
        self.text(|r| &r.metadata.temperature)
    }

    pub fn field(&self) -> String {
        self.text(|r| &r.metadata.field)
    }

    pub fn orientation(&self) -> String {
        self.text(|r| &r.metadata.orientation)
    }

    pub fn comment(&self) -> String {
        self.text(|r| &r.metadata.comment)
    }

    /// Start as (date, time)
    pub fn time_start(&self) -> (String, String) {
        (
            self.text(|r| &r.metadata.date_start),
            self.text(|r| &r.metadata.time_start),
        )
    }

    /// Stop as (date, time)
    pub fn time_stop(&self) -> (String, String) {
        (
            self.text(|r| &r.metadata.date_stop),
            self.text(|r| &r.metadata.time_stop),
        )
    }

    pub fn total_events(&self) -> i64 {
        self.run.as_ref().map(|r| r.metadata.total_events).unwrap_or(0)
    }

    /// Default binning of the run, at least 1
    pub fn default_binning(&self) -> i32 {
        self.run
            .as_ref()
            .map(|r| r.metadata.default_binning.max(1))
            .unwrap_or(1)
    }

    pub fn bin_width_us(&self) -> f64 {
        self.run
            .as_ref()
            .map(|r| r.metadata.bin_width_us as f64)
            .unwrap_or(0.0)
    }

    pub fn bin_width_ns(&self) -> f64 {
        self.bin_width_us() * 1.0e3
    }

    pub fn bin_width_ps(&self) -> f64 {
        self.bin_width_us() * 1.0e6
    }

    fn scaler_table(&self) -> &[Scaler] {
        self.run.as_ref().map(|r| r.scalers()).unwrap_or(&[])
    }

    pub fn number_scaler(&self) -> usize {
        self.scaler_table().len()
    }

    pub fn scalers(&self) -> Vec<i64> {
        self.scaler_table().iter().map(|s| s.value).collect()
    }

    pub fn scaler_names(&self) -> Vec<String> {
        self.scaler_table().iter().map(|s| s.label.clone()).collect()
    }

    pub fn number_temperature(&self) -> usize {
        self.run.as_ref().map(|r| r.temperatures().len()).unwrap_or(0)
    }

    pub fn temperatures(&self) -> Vec<f64> {
        self.run
            .as_ref()
            .map(|r| r.temperatures().iter().map(|t| t.mean as f64).collect())
            .unwrap_or_default()
    }

    pub fn temperature_deviations(&self) -> Vec<f64> {
        self.run
            .as_ref()
            .map(|r| r.temperatures().iter().map(|t| t.deviation as f64).collect())
            .unwrap_or_default()
    }
}

/// Sniff the format of the file at `path` and run the matching decoder over it
fn decode_file(path: &Path) -> Result<RunData, DecodeError> {
    let format = sniff_format(path)?;
    let file = File::open(path).map_err(|e| DecodeError::OpenFailure(path.to_path_buf(), e))?;
    let size = file.metadata().map(|m| m.len()).unwrap_or(0);
    spdlog::info!(
        "Decoding {} as {format} ({})",
        path.display(),
        human_bytes::human_bytes(size as f64)
    );
    let mut reader = BufReader::new(file);
    match format {
        FileFormat::PsiBin => read_psi_bin(&mut reader),
        FileFormat::Mdu(_) => read_mdu(&mut reader),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{write_temp_file, MduImage, MduTagFixture, PsiBinImage};
    use crate::format::MduVariant;
    use tempfile::NamedTempFile;

    fn scenario_file() -> NamedTempFile {
        let mut image = PsiBinImage::new(vec![vec![1, 2, 3, 4], vec![5, 6, 7, 8]]);
        image.run_number = 42;
        image.sample = String::from("Ag");
        image.labels = vec![String::from("FWD"), String::from("BWD")];
        image.t0 = vec![1, 2];
        image.first_good = vec![1, 2];
        image.last_good = vec![3, 2];
        write_temp_file(&image.build())
    }

    fn assert_sentinels(reader: &MusrReader) {
        assert!(!reader.reading_ok());
        assert_eq!(reader.number_histo(), 0);
        assert_eq!(reader.histogram_length(), 0);
        assert_eq!(reader.run_number(), 0);
        assert_eq!(reader.sample(), "");
        assert_eq!(reader.format_id(), "??");
        assert_eq!(reader.total_events(), 0);
        assert_eq!(reader.default_binning(), 1);
        assert_eq!(reader.bin_width_us(), 0.0);
        assert_eq!(reader.histo_int(0, 0), 0);
        assert_eq!(reader.histo(0, 0), 0.0);
        assert_eq!(reader.t0_int(0), -1);
        assert_eq!(reader.events_histo(0), -1);
        assert_eq!(reader.name_histo(0), "");
        assert!(reader.histo_vector(0, 1).is_empty());
        assert!(reader.histo_array_int(0).is_empty());
        assert!(reader.scalers().is_empty());
        assert!(reader.temperatures().is_empty());
    }

    #[test]
    fn test_psi_bin_scenario() {
        let file = scenario_file();
        let mut reader = MusrReader::new();
        reader.read(file.path()).unwrap();
        assert!(reader.reading_ok());
        assert_eq!(reader.state(), ReaderState::Decoded);
        assert_eq!(reader.read_status(), "SUCCESS");
        assert_eq!(reader.status_code(), 0);
        assert_eq!(reader.filename(), Some(file.path()));
        assert_eq!(reader.format_id(), "1N");
        assert_eq!(reader.histo_vector(0, 2), vec![3.0, 7.0]);
        assert_eq!(reader.histo_vector(1, 4), vec![26.0]);
        assert_eq!(reader.histo_vector(0, 1), vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(reader.histo_int(1, 2), 7);
        assert_eq!(reader.histo_int(1, 4), 0);
        assert_eq!(reader.histo_array_int(1), vec![5, 6, 7, 8]);
        assert_eq!(reader.histos_vector().len(), 2);
        assert_eq!(reader.name_histo(1), "BWD");
        assert_eq!(reader.run_number(), 42);
        assert_eq!(reader.sample(), "Ag");
    }

    #[test]
    fn test_extremes_and_overrides() {
        let file = scenario_file();
        let mut reader = MusrReader::new();
        reader.read(file.path()).unwrap();
        assert_eq!(reader.max_t0(), 2);
        assert_eq!(reader.min_t0(), 1);
        assert_eq!(reader.max_2_t0(0, 1), 2);
        assert_eq!(reader.min_2_t0(0, 1), 1);
        assert_eq!(reader.max_2_t0(0, 2), -1);
        assert_eq!(reader.max_last_good(), 3);
        assert_eq!(reader.min_last_good(), 2);
        assert_eq!(reader.min_2_last_good(1, 5), -1);

        assert!(reader.put_first_good(0, 2));
        assert!(reader.put_last_good(0, 2));
        assert!(!reader.put_last_good(3, 2));
        assert_eq!(reader.histo_good_bins(0, 1), vec![3.0]);
        assert!(reader.put_run_number(7));
        assert!(!reader.put_run_number(0));
        assert_eq!(reader.run_number(), 7);
    }

    #[test]
    fn test_bin_width_units() {
        let file = scenario_file();
        let mut reader = MusrReader::new();
        reader.read(file.path()).unwrap();
        assert!((reader.bin_width_ns() - 0.1953125).abs() < 1e-9);
        assert!((reader.bin_width_ps() - 195.3125).abs() < 1e-6);
    }

    #[test]
    fn test_unknown_magic_leaves_sentinels() {
        let mut bytes = PsiBinImage::new(vec![vec![1, 2]]).build();
        bytes[0..2].copy_from_slice(b"ZZ");
        let file = write_temp_file(&bytes);
        let mut reader = MusrReader::new();
        let err = reader.read(file.path()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::UnsupportedVersion);
        assert_eq!(reader.state(), ReaderState::Failed);
        assert!(reader.read_status().starts_with("ERROR"));
        assert_eq!(reader.status_code(), 2);
        assert_sentinels(&reader);
    }

    #[test]
    fn test_failed_read_clears_previous_run() {
        let good = scenario_file();
        let mut reader = MusrReader::new();
        reader.read(good.path()).unwrap();
        assert_eq!(reader.number_histo(), 2);

        let bytes = PsiBinImage::new(vec![vec![1, 2, 3, 4], vec![5, 6, 7, 8]]).build();
        let bad = write_temp_file(&bytes[..bytes.len() - 2]);
        let err = reader.read(bad.path()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::DataReadFailure);
        assert_sentinels(&reader);

        reader.read(good.path()).unwrap();
        reader.reset();
        assert_eq!(reader.state(), ReaderState::Uninitialized);
        assert_eq!(reader.filename(), None);
        assert_sentinels(&reader);
    }

    #[test]
    fn test_missing_file() {
        let mut reader = MusrReader::new();
        let err = reader
            .read(Path::new("/definitely/not/a/run.bin"))
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::OpenFailure);
        assert_eq!(reader.status_code(), 1);
    }

    #[test]
    fn test_mdu_file() {
        let mut image = MduImage::new(MduVariant::TdcT4);
        image.detector_list = String::from("0");
        image.tags = vec![
            MduTagFixture::positron("L", vec![4, 4, 4, 4]),
            MduTagFixture::positron("R", vec![2, 2, 2, 2]),
        ];
        let file = write_temp_file(&image.build());
        let mut reader = MusrReader::new();
        reader.read(file.path()).unwrap();
        assert_eq!(reader.format_id(), "T4");
        assert_eq!(reader.histo_names(), vec!["L", "R**"]);
        assert_eq!(reader.number_scaler(), 16);
        assert_eq!(reader.t0_double(0), 0.0);

        let pair = DetectorPair {
            plus: 0,
            minus: 1,
            alpha: 2.0,
            binning: 1,
            plus_background: BackgroundRange::new(0, 0),
            minus_background: BackgroundRange::new(0, 0),
        };
        // Backgrounds equal the flat histograms, leaving 0 counts in every bin
        assert_eq!(reader.asymmetry_error(&pair, 0), vec![1.0; 4]);
    }
}
