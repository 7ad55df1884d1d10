//! Decoder for the MDU formats written by the pTA ("M3") and TDC ("T4", "T5") front ends.
//!
//! An MDU file is a chain of fixed structures followed by interleaved tag records and
//! histogram payloads:
//!
//! ```text
//! file header (512 bytes)
//! settings    (52 bytes + one 60 byte tag record per tag)
//! statistics  (56 bytes + tag scalers + histogram scalers + 16 bytes of overflow bits)
//! for every tag: tag record, then the payload if the tag holds a positron histogram
//! ```
//!
//! The structure sizes the producer declares in the file header must match the ones
//! expected for the variant, otherwise the file is rejected.
use bitvec::prelude::*;
use std::io::Read;

use super::byte_field::{read_i32, read_text, read_u32_block, zeroed_buffer};
use super::constants::*;
use super::error::{CapacityError, DecodeError, FieldError};
use super::format::{magic_to_string, FileFormat, MduVariant};
use super::run::{FormatDetails, Histogram, RunData, RunMetadata, Scaler, TemperatureReading};

/// Detector selection over tag indices 0..32
pub type DetectorMask = BitArray<[u32; 1], Lsb0>;

/// Parse the whitespace separated detector list of the file header.
///
/// Entries outside of 0..32 and entries which are not integers are reported and skipped.
pub fn parse_detector_list(list: &str) -> DetectorMask {
    let mut mask = DetectorMask::ZERO;
    for token in list.split_whitespace() {
        match token.parse::<i32>() {
            Ok(index) if (0..MAX_HISTOGRAMS as i32).contains(&index) => {
                mask.set(index as usize, true)
            }
            Ok(index) => spdlog::warn!(
                "Detector {index} is out of range |0 - {}|, ignoring it",
                MAX_HISTOGRAMS - 1
            ),
            Err(_) => spdlog::warn!("Could not read detector number {token:?}, ignoring it"),
        }
    }
    mask
}

/// Parse up to four readings from the mean temperature and deviation strings.
///
/// Parsing stops at the first token which is not a float. The number of readings is the
/// number of means found; deviations missing for one of them are 0.
pub fn parse_temperature_list(means: &str, deviations: &str) -> Vec<TemperatureReading> {
    let floats = |text: &str| -> Vec<f32> {
        let mut values = Vec::new();
        for token in text.split_whitespace().take(MAX_TEMPERATURES) {
            match token.parse::<f32>() {
                Ok(v) => values.push(v),
                Err(_) => {
                    spdlog::warn!("Could not read temperature value {token:?}");
                    break;
                }
            }
        }
        values
    };
    let deviations = floats(deviations);
    floats(means)
        .into_iter()
        .enumerate()
        .map(|(i, mean)| TemperatureReading {
            mean,
            deviation: deviations.get(i).copied().unwrap_or(0.0),
        })
        .collect()
}

fn check_bins(count: i64) -> Result<(), CapacityError> {
    if count > MAX_HISTOGRAM_BINS as i64 {
        return Err(CapacityError::Bins(count));
    }
    Ok(())
}

/// Turn the producer's `DD-MMM-YYYY` into `DD-MMM-YY`. Other layouts are kept as is.
fn short_date(date: &str) -> String {
    let chars: Vec<char> = date.chars().collect();
    if chars.len() < 11 {
        return date.to_string();
    }
    chars[..7].iter().chain(chars[9..11].iter()).collect()
}

/// One entry of the tag table
#[derive(Debug, Clone, PartialEq)]
pub struct MduTag {
    pub label: String,
    pub tag_type: u8,
    pub raw_min_ps: i32,
    pub raw_max_ps: i32,
    pub raw_min_bin: i32,
    pub raw_max_bin: i32,
    pub histo_min_ps: i32,
    pub histo_max_ps: i32,
    pub histo_min_bin: i32,
    pub histo_max_bin: i32,
    pub t0_bin: i32,
    pub first_good_bin: i32,
    pub last_good_bin: i32,
}

impl MduTag {
    pub fn parse(buffer: &[u8]) -> Result<Self, FieldError> {
        let tag_type = *buffer.get(MDU_TAG_TYPE).ok_or(FieldError::OutOfBounds {
            offset: MDU_TAG_TYPE,
            width: 1,
            len: buffer.len(),
        })?;
        Ok(Self {
            label: read_text(buffer, 0, MAX_LABEL_LEN)?,
            tag_type,
            raw_min_ps: read_i32(buffer, MDU_TAG_RAW_MIN_PS)?,
            raw_max_ps: read_i32(buffer, MDU_TAG_RAW_MAX_PS)?,
            raw_min_bin: read_i32(buffer, MDU_TAG_RAW_MIN_BIN)?,
            raw_max_bin: read_i32(buffer, MDU_TAG_RAW_MAX_BIN)?,
            histo_min_ps: read_i32(buffer, MDU_TAG_HISTO_MIN_PS)?,
            histo_max_ps: read_i32(buffer, MDU_TAG_HISTO_MAX_PS)?,
            histo_min_bin: read_i32(buffer, MDU_TAG_HISTO_MIN_BIN)?,
            histo_max_bin: read_i32(buffer, MDU_TAG_HISTO_MAX_BIN)?,
            t0_bin: read_i32(buffer, MDU_TAG_T0_BIN)?,
            first_good_bin: read_i32(buffer, MDU_TAG_FIRST_GOOD_BIN)?,
            last_good_bin: read_i32(buffer, MDU_TAG_LAST_GOOD_BIN)?,
        })
    }

    pub fn is_positron(&self) -> bool {
        self.tag_type == TAG_TYPE_POSITRON
    }

    /// Number of bins in the payload following this tag, 0 for an empty range.
    ///
    /// A range longer than [MAX_HISTOGRAM_BINS] is an AllocationFailure.
    pub fn bin_count(&self) -> Result<i32, DecodeError> {
        let count = self.histo_max_bin as i64 - self.histo_min_bin as i64 + 1;
        check_bins(count)?;
        Ok(count.max(0) as i32)
    }

    /// A positron tag with more than one bin is followed by a histogram payload
    pub fn has_histogram(&self) -> Result<bool, DecodeError> {
        Ok(self.is_positron() && self.bin_count()? > 1)
    }

    /// Histogram length this tag asks for, including the leading offset
    fn histogram_length(&self) -> Result<i32, DecodeError> {
        let length = self.bin_count()? as i64 + self.histo_min_bin as i64;
        check_bins(length)?;
        Ok(length.max(0) as i32)
    }
}

/// The 512 byte MDU file header
#[derive(Debug, Clone, PartialEq)]
pub struct MduFileHeader {
    pub variant: MduVariant,
    pub format_version: u8,
    pub start_date: String,
    pub start_time: String,
    pub end_date: String,
    pub end_time: String,
    pub run_number: i32,
    pub file_version: i32,
    pub sample: String,
    pub temperature: String,
    pub field: String,
    pub orientation: String,
    pub comment: String,
    pub data_format: String,
    pub histogram_resolution: i32,
    pub bin_offset: i32,
    pub bins_per_histogram: i32,
    pub declared_detectors: i32,
    pub detector_list: String,
    pub mean_temperatures: String,
    pub temperature_deviations: String,
    pub bin_size: i32,
    pub header_size: i32,
    pub settings_size: i32,
    pub tag_size: i32,
    pub statistics_size: i32,
}

impl MduFileHeader {
    pub fn parse(buffer: &[u8]) -> Result<Self, DecodeError> {
        let magic = buffer.get(0..2).unwrap_or_default();
        let variant = match magic {
            m if m == MAGIC_MDU_PTA => MduVariant::PtaM3,
            m if m == MAGIC_MDU_TDC => MduVariant::TdcT4,
            m if m == MAGIC_MDU_TDC32 => MduVariant::TdcT5,
            m => return Err(DecodeError::UnsupportedVersion(magic_to_string(m))),
        };
        let title = |sub: usize| read_text(buffer, MDU_RUN_TITLE + sub, MDU_TITLE_FIELD_LEN);
        Ok(Self {
            variant,
            format_version: buffer.get(MDU_FORMAT_VERSION).copied().unwrap_or_default(),
            start_date: read_text(buffer, MDU_START_DATE, MDU_DATE_LEN)?,
            start_time: read_text(buffer, MDU_START_TIME, MDU_TIME_LEN)?,
            end_date: read_text(buffer, MDU_END_DATE, MDU_DATE_LEN)?,
            end_time: read_text(buffer, MDU_END_TIME, MDU_TIME_LEN)?,
            run_number: read_i32(buffer, MDU_RUN_NUMBER)?,
            file_version: read_i32(buffer, MDU_FILE_VERSION)?,
            sample: title(MDU_TITLE_SAMPLE)?,
            temperature: title(MDU_TITLE_TEMPERATURE)?,
            field: title(MDU_TITLE_FIELD)?,
            orientation: title(MDU_TITLE_ORIENTATION)?,
            comment: read_text(buffer, MDU_RUN_SUBTITLE, MDU_COMMENT_LEN)?,
            data_format: read_text(buffer, MDU_DATA_FORMAT, MDU_DATA_FORMAT_LEN)?,
            histogram_resolution: read_i32(buffer, MDU_HISTO_RESOLUTION)?,
            bin_offset: read_i32(buffer, MDU_BIN_OFFSET)?,
            bins_per_histogram: read_i32(buffer, MDU_BINS_PER_HISTOGRAM)?,
            declared_detectors: read_i32(buffer, MDU_NUMBER_OF_DETECTORS)?,
            detector_list: read_text(buffer, MDU_DETECTOR_LIST, MDU_DETECTOR_LIST_LEN)?,
            mean_temperatures: read_text(buffer, MDU_MEAN_TEMPERATURE, MDU_TEMPERATURE_LIST_LEN)?,
            temperature_deviations: read_text(
                buffer,
                MDU_TEMPERATURE_DEVIATION,
                MDU_TEMPERATURE_LIST_LEN,
            )?,
            bin_size: read_i32(buffer, MDU_BIN_SIZE)?,
            header_size: read_i32(buffer, MDU_NUM_BYTES_HEADER)?,
            settings_size: read_i32(buffer, MDU_NUM_BYTES_SETTINGS)?,
            tag_size: read_i32(buffer, MDU_NUM_BYTES_TAG)?,
            statistics_size: read_i32(buffer, MDU_NUM_BYTES_STATISTICS)?,
        })
    }

    /// Compare the declared structure sizes with the ones of the variant
    pub fn check_sizes(&self) -> Result<(), DecodeError> {
        let expected = [
            ("file header", self.header_size, MDU_FILE_HEADER_SIZE),
            ("tag record", self.tag_size, MDU_TAG_SIZE),
            ("settings", self.settings_size, self.variant.settings_size()),
            ("statistics", self.statistics_size, self.variant.statistics_size()),
        ];
        for (what, declared, size) in expected {
            if declared != size as i32 {
                return Err(DecodeError::HeaderReadFailure(format!(
                    "incorrect {what} size: file declares {declared} bytes, {} expects {size}",
                    FileFormat::Mdu(self.variant).id()
                )));
            }
        }
        Ok(())
    }
}

/// Acquisition settings, including the tag table
#[derive(Debug, Clone, PartialEq)]
pub struct MduSettings {
    pub mode: i32,
    pub pre_pileup_ps: i32,
    pub post_pileup_ps: i32,
    pub pre_pileup_bins: i32,
    pub post_pileup_bins: i32,
    pub echo_start_ps: i32,
    pub echo_stop_ps: i32,
    pub echo_start_bins: i32,
    pub echo_stop_bins: i32,
    /// pTA timespan code (M3) or TDC resolution code (T4/T5)
    pub resolution_code: i32,
    pub min_rate: i32,
    pub end_of_run_tag: i32,
    pub end_of_run_limit: i32,
    pub tags: Vec<MduTag>,
}

impl MduSettings {
    pub fn parse(buffer: &[u8], variant: MduVariant) -> Result<Self, FieldError> {
        let mut tags = Vec::with_capacity(variant.tag_count());
        for i in 0..variant.tag_count() {
            let start = MDU_SETTINGS_PREFIX_SIZE + i * MDU_TAG_SIZE;
            let record = buffer
                .get(start..start + MDU_TAG_SIZE)
                .ok_or(FieldError::OutOfBounds {
                    offset: start,
                    width: MDU_TAG_SIZE,
                    len: buffer.len(),
                })?;
            tags.push(MduTag::parse(record)?);
        }
        Ok(Self {
            mode: read_i32(buffer, 0)?,
            pre_pileup_ps: read_i32(buffer, 4)?,
            post_pileup_ps: read_i32(buffer, 8)?,
            pre_pileup_bins: read_i32(buffer, 12)?,
            post_pileup_bins: read_i32(buffer, 16)?,
            echo_start_ps: read_i32(buffer, 20)?,
            echo_stop_ps: read_i32(buffer, 24)?,
            echo_start_bins: read_i32(buffer, 28)?,
            echo_stop_bins: read_i32(buffer, 32)?,
            resolution_code: read_i32(buffer, 36)?,
            min_rate: read_i32(buffer, 40)?,
            end_of_run_tag: read_i32(buffer, 44)?,
            end_of_run_limit: read_i32(buffer, 48)?,
            tags,
        })
    }
}

/// Run totals kept by the front end
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MduStatistics {
    pub elapsed_time: i32,
    pub event_sum: i32,
    pub muon_events: i32,
    pub positron_events: i32,
    pub clock_events: i32,
    pub echo_events: i32,
    pub veto_events: i32,
    pub unknown_events: i32,
    pub muon_pileup_events: i32,
    pub pre_pileup_events: i32,
    pub post_pileup_events: i32,
    pub overflow_events: i32,
    pub double_positron_events: i32,
    pub accepted_events: i32,
    pub tag_scalers: Vec<i32>,
    pub histogram_scalers: Vec<i32>,
    pub overflow_bits: [i32; MDU_OVERFLOW_WORDS],
}

impl MduStatistics {
    pub fn parse(buffer: &[u8], variant: MduVariant) -> Result<Self, FieldError> {
        let n = variant.tag_count();
        let tag_scalers_at = MDU_STATISTICS_PREFIX_SIZE;
        let histogram_scalers_at = tag_scalers_at + n * 4;
        let overflow_at = histogram_scalers_at + n * 4;

        let mut stats = Self {
            elapsed_time: read_i32(buffer, 0)?,
            event_sum: read_i32(buffer, 4)?,
            muon_events: read_i32(buffer, 8)?,
            positron_events: read_i32(buffer, 12)?,
            clock_events: read_i32(buffer, 16)?,
            echo_events: read_i32(buffer, 20)?,
            veto_events: read_i32(buffer, 24)?,
            unknown_events: read_i32(buffer, 28)?,
            muon_pileup_events: read_i32(buffer, 32)?,
            pre_pileup_events: read_i32(buffer, 36)?,
            post_pileup_events: read_i32(buffer, 40)?,
            overflow_events: read_i32(buffer, 44)?,
            double_positron_events: read_i32(buffer, 48)?,
            accepted_events: read_i32(buffer, 52)?,
            ..Default::default()
        };
        for i in 0..n {
            stats.tag_scalers.push(read_i32(buffer, tag_scalers_at + i * 4)?);
            stats
                .histogram_scalers
                .push(read_i32(buffer, histogram_scalers_at + i * 4)?);
        }
        for (i, word) in stats.overflow_bits.iter_mut().enumerate() {
            *word = read_i32(buffer, overflow_at + i * 4)?;
        }
        Ok(stats)
    }
}

/// MDU header values that have no counterpart in the PSI-bin format
#[derive(Debug, Clone, PartialEq)]
pub struct MduDetails {
    pub variant: MduVariant,
    pub format_version: u8,
    pub file_version: i32,
    pub data_format: String,
    pub histogram_resolution: i32,
    pub resolution_factor: i32,
    pub bin_offset: i32,
    pub bins_per_histogram: i32,
    pub declared_detectors: i32,
    pub selection: DetectorMask,
    pub settings: MduSettings,
    pub statistics: MduStatistics,
}

impl MduDetails {
    pub fn is_selected(&self, tag: usize) -> bool {
        self.selection.get(tag).map(|bit| *bit).unwrap_or(false)
    }
}

/// Map the settings' resolution indicator to (bin width in µs, resolution factor)
fn resolution(
    variant: MduVariant,
    code: i32,
    histogram_resolution: i32,
) -> Result<(f32, i32), DecodeError> {
    let table: &[(i32, f32)] = match variant {
        MduVariant::PtaM3 => &PTA_TIMESPAN_BIN_WIDTHS,
        MduVariant::TdcT4 | MduVariant::TdcT5 => &TDC_RESOLUTION_BIN_WIDTHS,
    };
    let bin_width = table
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, width)| *width)
        .ok_or(DecodeError::SettingsResolutionFailure(code))?;

    let factor = match variant {
        // Target PSI resolution against the pTA timespan, one doubling per step
        MduVariant::PtaM3 => {
            let exponent = histogram_resolution as i64 + 8 - code as i64;
            if (0..31).contains(&exponent) {
                1 << exponent
            } else {
                1
            }
        }
        MduVariant::TdcT4 | MduVariant::TdcT5 => histogram_resolution,
    };
    Ok((bin_width, factor))
}

/// Decode a complete MDU image from `reader`, which must be positioned at the magic.
pub fn read_mdu<R: Read>(reader: &mut R) -> Result<RunData, DecodeError> {
    let mut buffer = vec![0u8; MDU_FILE_HEADER_SIZE];
    reader
        .read_exact(&mut buffer)
        .map_err(|e| DecodeError::header("MDU file header", e))?;
    let header = MduFileHeader::parse(&buffer)?;
    header.check_sizes()?;
    let variant = header.variant;

    let mut buffer = vec![0u8; variant.settings_size()];
    reader
        .read_exact(&mut buffer)
        .map_err(|e| DecodeError::header("MDU settings", e))?;
    let settings = MduSettings::parse(&buffer, variant)?;

    let mut buffer = vec![0u8; variant.statistics_size()];
    reader
        .read_exact(&mut buffer)
        .map_err(|e| DecodeError::header("MDU statistics", e))?;
    let statistics = MduStatistics::parse(&buffer, variant)?;

    let selection = parse_detector_list(&header.detector_list);
    let (bin_width_us, resolution_factor) = resolution(
        variant,
        settings.resolution_code,
        header.histogram_resolution,
    )?;

    // First pass over the settings' tag table: count the histograms and fix their length
    let mut histogram_length: Option<i32> = None;
    let mut histogram_count = 0;
    for (i, tag) in settings.tags.iter().enumerate() {
        if !tag.has_histogram()? || (variant.honours_selection() && !selection[i]) {
            continue;
        }
        let tag_length = tag.histogram_length()?;
        match histogram_length {
            None => histogram_length = Some(tag_length),
            Some(length) if length != tag_length => spdlog::warn!(
                "Tag {i} asks for {tag_length} bins while the histogram length is {length}"
            ),
            Some(_) => (),
        }
        histogram_count += 1;
    }
    if histogram_count != header.declared_detectors {
        spdlog::warn!(
            "Found {histogram_count} histograms but the header declares {} detectors",
            header.declared_detectors
        );
    }
    let mut histogram_length = match histogram_length {
        Some(length) => length,
        None => return Err(DecodeError::TooFewHistograms(histogram_count)),
    };
    // pTA stores one bin more than the histogram it describes
    if variant.honours_selection() && histogram_length > 0 {
        histogram_length -= 1;
    }
    let histogram_length = histogram_length.max(0) as usize;
    spdlog::debug!(
        "MDU {} run {}: {histogram_count} histograms of {histogram_length} bins, resolution factor {resolution_factor}",
        FileFormat::Mdu(variant).id(),
        header.run_number
    );

    let mut metadata = RunMetadata::new(FileFormat::Mdu(variant));
    metadata.run_number = header.run_number;
    metadata.sample = header.sample.clone();
    metadata.temperature = header.temperature.clone();
    metadata.field = header.field.clone();
    metadata.orientation = header.orientation.clone();
    metadata.comment = header.comment.clone();
    metadata.date_start = short_date(&header.start_date);
    metadata.time_start = header.start_time.chars().take(8).collect();
    metadata.date_stop = short_date(&header.end_date);
    metadata.time_stop = header.end_time.chars().take(8).collect();
    metadata.bin_width_us = bin_width_us;
    metadata.default_binning = resolution_factor.max(1);

    let scalers: Vec<Scaler> = settings
        .tags
        .iter()
        .zip(statistics.tag_scalers.iter())
        .map(|(tag, value)| Scaler {
            label: tag.label.clone(),
            value: *value as i64,
        })
        .collect();
    let temperatures =
        parse_temperature_list(&header.mean_temperatures, &header.temperature_deviations);

    let details = MduDetails {
        variant,
        format_version: header.format_version,
        file_version: header.file_version,
        data_format: header.data_format,
        histogram_resolution: header.histogram_resolution,
        resolution_factor,
        bin_offset: header.bin_offset,
        bins_per_histogram: header.bins_per_histogram,
        declared_detectors: header.declared_detectors,
        selection,
        settings,
        statistics,
    };
    let mut run = RunData::new(metadata, FormatDetails::Mdu(details), histogram_length);

    // Second pass over the tag records stored in front of each payload
    let mut total_events = 0;
    let mut record = vec![0u8; MDU_TAG_SIZE];
    for i in 0..variant.tag_count() {
        reader
            .read_exact(&mut record)
            .map_err(|e| DecodeError::data(&format!("MDU tag {i}"), e))?;
        let tag = MduTag::parse(&record)?;
        if !tag.has_histogram()? {
            continue;
        }
        let mut payload = zeroed_buffer(tag.bin_count()? as usize * 4)?;
        reader
            .read_exact(&mut payload)
            .map_err(|e| DecodeError::data(&format!("MDU histogram of tag {i}"), e))?;

        let is_selected = selection[i];
        if variant.honours_selection() && !is_selected {
            continue;
        }

        let mut label = tag.label.clone();
        if !is_selected && label.chars().count() < MAX_LABEL_LEN - 1 {
            label.push_str(UNSELECTED_MARKER);
        }

        let leading = (tag.histo_min_bin.max(0) as usize).min(histogram_length);
        let mut bins = vec![0u32; leading];
        bins.extend(read_u32_block(&payload));
        bins.resize(histogram_length, 0);

        // Take the last raw bin belonging to the first binned t0 and first good bin
        let scale = |what: &str, bin: i32, shift: i64| {
            let value = (bin as i64 + shift) * resolution_factor as i64 - shift;
            i32::try_from(value).map_err(|_| {
                DecodeError::HeaderReadFailure(format!(
                    "{what} bin {bin} of tag {i} overflows with resolution factor {resolution_factor}"
                ))
            })
        };
        let t0 = scale("t0", tag.t0_bin, 1)?;
        let first_good = scale("first good", tag.first_good_bin, 1)?;
        let last_good = scale("last good", tag.last_good_bin, 0)?;
        let events = good_bin_sum(&bins, first_good, last_good);
        if is_selected {
            total_events += events;
        }

        let mut histogram = Histogram::new(label, bins);
        histogram.t0 = t0;
        histogram.first_good = first_good;
        histogram.last_good = last_good;
        histogram.events = events;
        run.push_histogram(histogram)?;
    }
    run.metadata.total_events = total_events;

    for scaler in scalers {
        run.push_scaler(scaler)?;
    }
    for reading in temperatures {
        run.push_temperature(reading)?;
    }

    Ok(run)
}

/// Sum of the bins in the inclusive range [first_good, last_good], clamped to the histogram
fn good_bin_sum(bins: &[u32], first_good: i32, last_good: i32) -> i64 {
    if bins.is_empty() || last_good < 0 || first_good > last_good {
        return 0;
    }
    let start = first_good.max(0) as usize;
    let stop = (last_good as usize).min(bins.len() - 1);
    bins.get(start..=stop)
        .map(|range| range.iter().map(|v| *v as i64).sum())
        .unwrap_or(0)
}
