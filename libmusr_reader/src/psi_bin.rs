//! Decoder for the PSI-bin ("1N") format.
//!
//! A PSI-bin file is a fixed 1024 byte header followed by a block of data records. Each
//! record holds `bins_per_record` little-endian 32 bit counts and each histogram spans
//! `records_per_histogram` consecutive records:
//!
//! ```text
//! [0..1024)        header (see constants::PSI_*)
//! [1024..)         records_in_file * bins_per_record * u32
//! ```
use std::io::Read;

use super::byte_field::{read_f32, read_i16, read_i32, read_text, read_u32_block, zeroed_buffer};
use super::constants::*;
use super::error::DecodeError;
use super::format::{magic_to_string, FileFormat};
use super::run::{FormatDetails, Histogram, RunData, RunMetadata, Scaler, TemperatureReading};

/// PSI-bin header values that have no counterpart in the MDU format
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PsiBinDetails {
    pub tdc_resolution: i16,
    pub tdc_overflow: i16,
    pub records_in_file: i16,
    pub bins_per_record: i16,
    pub records_per_histogram: i16,
    pub histograms_per_record: i16,
    pub period_save: i32,
    pub period_mon: i32,
    pub monitor_device: String,
    pub monitor_low: [f32; 4],
    pub monitor_high: [f32; 4],
    pub monitor_events: i32,
}

impl PsiBinDetails {
    /// Size in bytes of the data block following the header
    pub fn data_block_size(&self) -> usize {
        self.records_in_file.max(0) as usize * self.bins_per_record.max(0) as usize * 4
    }

    /// Distance in bins between the starts of two consecutive histograms
    pub fn histogram_stride(&self) -> usize {
        self.records_per_histogram.max(0) as usize * self.bins_per_record.max(0) as usize
    }
}

/// Per histogram slot of the header (only 16 slots exist)
#[derive(Debug, Clone, Default, PartialEq)]
struct HistogramSlot {
    label: String,
    events: i32,
    t0: i16,
    first_good: i16,
    last_good: i16,
    real_t0: f32,
}

/// The decoded 1024 byte header
#[derive(Debug, Clone)]
pub struct PsiBinHeader {
    pub metadata: RunMetadata,
    pub details: PsiBinDetails,
    pub number_histo: i16,
    pub length_histo: i16,
    slots: Vec<HistogramSlot>,
    scalers: Vec<Scaler>,
    temperatures: Vec<TemperatureReading>,
}

impl PsiBinHeader {
    /// Decode the header block. Fails if the magic is not "1N".
    pub fn parse(buffer: &[u8]) -> Result<Self, DecodeError> {
        let magic = buffer.get(0..2).unwrap_or_default();
        if magic != MAGIC_PSI_BIN {
            return Err(DecodeError::UnsupportedVersion(magic_to_string(magic)));
        }

        let mut details = PsiBinDetails {
            tdc_resolution: read_i16(buffer, PSI_TDC_RESOLUTION)?,
            tdc_overflow: read_i16(buffer, PSI_TDC_OVERFLOW)?,
            records_in_file: read_i16(buffer, PSI_RECORDS_IN_FILE)?,
            bins_per_record: read_i16(buffer, PSI_BINS_PER_RECORD)?,
            records_per_histogram: read_i16(buffer, PSI_RECORDS_PER_HISTO)?,
            histograms_per_record: read_i16(buffer, PSI_HISTOS_PER_RECORD)?,
            period_save: read_i32(buffer, PSI_PERIOD_SAVE)?,
            period_mon: read_i32(buffer, PSI_PERIOD_MON)?,
            monitor_device: read_text(buffer, PSI_MON_DEVICE, PSI_MON_DEVICE_LEN)?,
            monitor_events: read_i32(buffer, PSI_MON_EVENTS)?,
            ..Default::default()
        };
        for i in 0..4 {
            details.monitor_low[i] = read_f32(buffer, PSI_MON_LOW + i * 4)?;
            details.monitor_high[i] = read_f32(buffer, PSI_MON_HIGH + i * 4)?;
        }

        let mut metadata = RunMetadata::new(FileFormat::PsiBin);
        metadata.run_number = read_i16(buffer, PSI_RUN_NUMBER)? as i32;
        metadata.sample = read_text(buffer, PSI_SAMPLE, PSI_TITLE_FIELD_LEN)?;
        metadata.temperature = read_text(buffer, PSI_TEMPERATURE, PSI_TITLE_FIELD_LEN)?;
        metadata.field = read_text(buffer, PSI_FIELD, PSI_TITLE_FIELD_LEN)?;
        metadata.orientation = read_text(buffer, PSI_ORIENTATION, PSI_TITLE_FIELD_LEN)?;
        metadata.comment = read_text(buffer, PSI_COMMENT, PSI_COMMENT_LEN)?;
        metadata.date_start = read_text(buffer, PSI_DATE_START, PSI_DATE_LEN)?;
        metadata.date_stop = read_text(buffer, PSI_DATE_STOP, PSI_DATE_LEN)?;
        metadata.time_start = read_text(buffer, PSI_TIME_START, PSI_TIME_LEN)?;
        metadata.time_stop = read_text(buffer, PSI_TIME_STOP, PSI_TIME_LEN)?;
        metadata.total_events = read_i32(buffer, PSI_TOTAL_EVENTS)? as i64;
        metadata.default_binning = 1;
        metadata.bin_width_us = read_f32(buffer, PSI_BIN_WIDTH)?;
        if metadata.bin_width_us == 0.0 {
            // Older headers leave the width out; derive it from the TDC resolution code
            metadata.bin_width_us =
                PSI_BIN_WIDTH_BASE_US * 2.0f32.powi(details.tdc_resolution as i32);
        }

        let mut slots = Vec::with_capacity(PSI_HEADER_SLOTS);
        for i in 0..PSI_HEADER_SLOTS {
            slots.push(HistogramSlot {
                label: read_text(buffer, PSI_HISTO_LABELS + i * 4, PSI_LABEL_LEN)?,
                events: read_i32(buffer, PSI_EVENTS_PER_HISTO + i * 4)?,
                t0: read_i16(buffer, PSI_INTEGER_T0 + i * 2)?,
                first_good: read_i16(buffer, PSI_FIRST_GOOD + i * 2)?,
                last_good: read_i16(buffer, PSI_LAST_GOOD + i * 2)?,
                real_t0: read_f32(buffer, PSI_REAL_T0 + i * 4)?,
            });
        }

        let mut scalers = Vec::with_capacity(PSI_CORE_SCALER_COUNT + PSI_AUX_SCALER_COUNT);
        for i in 0..PSI_CORE_SCALER_COUNT {
            scalers.push(Scaler {
                label: read_text(buffer, PSI_CORE_SCALER_LABELS + i * 4, PSI_LABEL_LEN)?,
                value: read_i32(buffer, PSI_CORE_SCALERS + i * 4)? as i64,
            });
        }
        for i in 0..PSI_AUX_SCALER_COUNT {
            scalers.push(Scaler {
                label: read_text(buffer, PSI_AUX_SCALER_LABELS + i * 4, PSI_LABEL_LEN)?,
                value: read_i32(buffer, PSI_AUX_SCALERS + i * 4)? as i64,
            });
        }

        let mut temperatures = Vec::with_capacity(MAX_TEMPERATURES);
        for i in 0..MAX_TEMPERATURES {
            temperatures.push(TemperatureReading {
                mean: read_f32(buffer, PSI_MEAN_TEMPERATURES + i * 4)?,
                deviation: read_f32(buffer, PSI_TEMPERATURE_DEVIATIONS + i * 4)?,
            });
        }

        Ok(Self {
            metadata,
            details,
            number_histo: read_i16(buffer, PSI_HISTO_NUMBER)?,
            length_histo: read_i16(buffer, PSI_HISTO_LENGTH)?,
            slots,
            scalers,
            temperatures,
        })
    }
}

/// Decode a complete PSI-bin image from `reader`, which must be positioned at the magic.
pub fn read_psi_bin<R: Read>(reader: &mut R) -> Result<RunData, DecodeError> {
    let mut buffer = vec![0u8; PSI_HEADER_SIZE];
    reader
        .read_exact(&mut buffer)
        .map_err(|e| DecodeError::header("PSI-bin header", e))?;
    let header = PsiBinHeader::parse(&buffer)?;

    if header.details.histograms_per_record != 1 {
        spdlog::error!(
            "PSI-bin file stores {} histograms per record; only 1 is supported",
            header.details.histograms_per_record
        );
        return Err(DecodeError::UnimplementedAlgorithm(
            header.details.histograms_per_record,
        ));
    }
    if header.number_histo <= 0 {
        return Err(DecodeError::TooFewHistograms(header.number_histo as i32));
    }
    spdlog::debug!(
        "PSI-bin run {}: {} histograms of {} bins in {} records of {} bins",
        header.metadata.run_number,
        header.number_histo,
        header.length_histo,
        header.details.records_in_file,
        header.details.bins_per_record
    );

    let mut block = zeroed_buffer(header.details.data_block_size())?;
    reader
        .read_exact(&mut block)
        .map_err(|e| DecodeError::data("PSI-bin data records", e))?;
    let words = read_u32_block(&block);

    let length = header.length_histo.max(0) as usize;
    let stride = header.details.histogram_stride();
    let mut run = RunData::new(
        header.metadata,
        FormatDetails::PsiBin(header.details),
        length,
    );
    for i in 0..header.number_histo as usize {
        let start = i * stride;
        let bins = words.get(start..start + length).ok_or_else(|| {
            DecodeError::DataReadFailure(format!(
                "histogram {i} needs words {start}..{} but the data block holds {}",
                start + length,
                words.len()
            ))
        })?;
        let slot = header.slots.get(i).cloned().unwrap_or_default();
        let mut histogram = Histogram::new(slot.label, bins.to_vec());
        histogram.events = slot.events as i64;
        histogram.real_t0 = slot.real_t0;
        histogram.t0 = slot.t0 as i32;
        histogram.first_good = slot.first_good as i32;
        histogram.last_good = slot.last_good as i32;
        run.push_histogram(histogram)?;
    }
    for scaler in header.scalers {
        run.push_scaler(scaler)?;
    }
    for reading in header.temperatures {
        run.push_temperature(reading)?;
    }

    Ok(run)
}
