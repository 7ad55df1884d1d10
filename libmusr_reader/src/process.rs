use std::fmt::Display;
use std::sync::mpsc::Sender;

use super::config::Config;
use super::error::ProcessorError;
use super::format::FileFormat;
use super::reader::MusrReader;
use super::run_status::{RunOutcome, RunStatus};

/// The values logged for every decoded run
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub run_number: i32,
    pub format: FileFormat,
    pub sample: String,
    pub n_histograms: usize,
    pub histogram_length: usize,
    pub binning: i32,
    pub total_events: i64,
    pub mean_asymmetry: Option<f64>,
}

impl RunSummary {
    /// Summarize the run held by `reader`, if any.
    ///
    /// The configured binning replaces the run's default binning; the configured detector
    /// pair gives the mean asymmetry over the good bins.
    pub fn from_reader(reader: &MusrReader, config: &Config) -> Option<Self> {
        let run = reader.run()?;
        let binning = config.binning.unwrap_or(reader.default_binning());
        let mean_asymmetry = config.asymmetry.as_ref().and_then(|pair| {
            let pair = crate::derived::DetectorPair { binning, ..*pair };
            let values = reader.asymmetry_good_bins(&pair);
            let finite: Vec<f64> = values.into_iter().filter(|v| v.is_finite()).collect();
            if finite.is_empty() {
                None
            } else {
                Some(finite.iter().sum::<f64>() / finite.len() as f64)
            }
        });
        Some(Self {
            run_number: run.metadata.run_number,
            format: run.metadata.format,
            sample: run.metadata.sample.clone(),
            n_histograms: run.histograms().len(),
            histogram_length: run.histogram_length(),
            binning,
            total_events: run.metadata.total_events,
            mean_asymmetry,
        })
    }
}

impl Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Run {} ({}) sample: {} histograms: {} x {} bins, binning: {}, total events: {}",
            self.run_number,
            self.format,
            self.sample,
            self.n_histograms,
            self.histogram_length,
            self.binning,
            self.total_events
        )?;
        if let Some(asymmetry) = self.mean_asymmetry {
            write!(f, ", mean asymmetry: {asymmetry:.4}")?;
        }
        Ok(())
    }
}

/// Decode one run and log its summary
pub fn process_run(
    config: &Config,
    reader: &mut MusrReader,
    run_number: i32,
) -> Result<Option<RunSummary>, ProcessorError> {
    let path = config.get_run_file(run_number);
    match reader.read(&path) {
        Ok(run) => spdlog::debug!("Header of run {run_number}:\n{run}"),
        Err(e) => {
            spdlog::warn!("Skipping run {run_number}: {e}");
            return Ok(None);
        }
    }
    let summary = RunSummary::from_reader(reader, config);
    if let Some(summary) = &summary {
        spdlog::info!("{summary}");
    }
    Ok(summary)
}

/// The function to be called by a separate thread (typically the CLI).
///
/// Runs of the configured range are decoded one after another with a single reader, which
/// is reset before every run. A status is sent after each run; a run which is missing or
/// fails to decode is reported and skipped.
pub fn process(config: Config, tx: Sender<RunStatus>) -> Result<Vec<RunSummary>, ProcessorError> {
    let mut reader = MusrReader::new();
    let mut summaries = Vec::new();
    let n_runs = config.n_runs().max(1) as f32;
    for (idx, run) in (config.first_run_number..(config.last_run_number + 1)).enumerate() {
        let outcome = if config.does_run_exist(run) {
            spdlog::info!("Processing run {}...", run);
            match process_run(&config, &mut reader, run)? {
                Some(summary) => {
                    summaries.push(summary);
                    spdlog::info!("Finished processing run {}.", run);
                    RunOutcome::Decoded
                }
                None => RunOutcome::Failed(
                    reader
                        .last_error()
                        .unwrap_or(crate::error::ErrorCode::DataReadFailure),
                ),
            }
        } else {
            spdlog::info!("Run {} does not exist, skipping...", run);
            RunOutcome::Missing
        };
        tx.send(RunStatus::new((idx + 1) as f32 / n_runs, run, outcome))?;
    }
    Ok(summaries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::fixtures::PsiBinImage;
    use std::sync::mpsc::channel;
    use tempfile::TempDir;

    #[test]
    fn test_process_range() {
        let dir = TempDir::new().unwrap();
        let mut image = PsiBinImage::new(vec![vec![0, 30, 30, 30], vec![0, 10, 10, 10]]);
        image.first_good = vec![1, 1];
        image.last_good = vec![3, 3];
        image.t0 = vec![1, 1];
        image.run_number = 10;
        std::fs::write(dir.path().join("deltat_0010.bin"), image.build()).unwrap();
        std::fs::write(dir.path().join("deltat_0012.bin"), b"XX not a run").unwrap();

        let config = Config {
            data_path: dir.path().to_path_buf(),
            first_run_number: 10,
            last_run_number: 12,
            ..Default::default()
        };
        let (tx, rx) = channel();
        let summaries = process(config, tx).unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].run_number, 10);
        assert_eq!(summaries[0].n_histograms, 2);
        assert_eq!(summaries[0].mean_asymmetry, Some(0.5));

        let statuses: Vec<RunStatus> = rx.iter().collect();
        assert_eq!(statuses.len(), 3);
        assert_eq!(statuses[0].outcome, RunOutcome::Decoded);
        assert_eq!(statuses[1].outcome, RunOutcome::Missing);
        assert_eq!(
            statuses[2].outcome,
            RunOutcome::Failed(ErrorCode::UnsupportedVersion)
        );
        assert_eq!(statuses[2].progress, 1.0);
    }

    #[test]
    fn test_summary_without_run() {
        let reader = MusrReader::new();
        assert!(RunSummary::from_reader(&reader, &Config::default()).is_none());
    }
}
