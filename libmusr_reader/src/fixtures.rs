//! Synthetic PSI-bin and MDU images for the unit tests
use byteorder::{LittleEndian, WriteBytesExt};
use std::io::Write;
use tempfile::NamedTempFile;

use super::constants::*;
use super::format::MduVariant;

fn put_i16(buffer: &mut [u8], offset: usize, value: i16) {
    (&mut buffer[offset..])
        .write_i16::<LittleEndian>(value)
        .unwrap();
}

fn put_i32(buffer: &mut [u8], offset: usize, value: i32) {
    (&mut buffer[offset..])
        .write_i32::<LittleEndian>(value)
        .unwrap();
}

fn put_f32(buffer: &mut [u8], offset: usize, value: f32) {
    (&mut buffer[offset..])
        .write_f32::<LittleEndian>(value)
        .unwrap();
}

fn put_text(buffer: &mut [u8], offset: usize, width: usize, text: &str) {
    let bytes = text.as_bytes();
    let n = bytes.len().min(width);
    buffer[offset..offset + n].copy_from_slice(&bytes[..n]);
}

/// Write `bytes` to a temporary file, removed when the handle is dropped
pub fn write_temp_file(bytes: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(bytes).unwrap();
    file.flush().unwrap();
    file
}

/// Builder for a PSI-bin file with one histogram per record
#[derive(Debug, Clone)]
pub struct PsiBinImage {
    pub histograms: Vec<Vec<u32>>,
    pub bins_per_record: usize,
    pub histograms_per_record: i16,
    pub tdc_resolution: i16,
    pub run_number: i16,
    pub sample: String,
    pub temperature: String,
    pub comment: String,
    pub date_start: String,
    pub time_start: String,
    pub labels: Vec<String>,
    pub t0: Vec<i16>,
    pub first_good: Vec<i16>,
    pub last_good: Vec<i16>,
    pub real_t0: Vec<f32>,
    pub events: Vec<i32>,
    pub total_events: i32,
    pub bin_width_us: f32,
    pub core_scalers: Vec<(String, i32)>,
    pub temperatures: Vec<(f32, f32)>,
}

impl PsiBinImage {
    pub fn new(histograms: Vec<Vec<u32>>) -> Self {
        let length = histograms.first().map(|h| h.len()).unwrap_or(0);
        Self {
            histograms,
            bins_per_record: length.max(1),
            histograms_per_record: 1,
            tdc_resolution: 0,
            run_number: 1,
            sample: String::new(),
            temperature: String::new(),
            comment: String::new(),
            date_start: String::new(),
            time_start: String::new(),
            labels: Vec::new(),
            t0: Vec::new(),
            first_good: Vec::new(),
            last_good: Vec::new(),
            real_t0: Vec::new(),
            events: Vec::new(),
            total_events: 0,
            bin_width_us: 0.0001953125,
            core_scalers: Vec::new(),
            temperatures: Vec::new(),
        }
    }

    pub fn build(&self) -> Vec<u8> {
        let length = self.histograms.first().map(|h| h.len()).unwrap_or(0);
        let records_per_histogram = length.div_ceil(self.bins_per_record);
        let records_in_file = records_per_histogram * self.histograms.len();

        let mut header = vec![0u8; PSI_HEADER_SIZE];
        header[0..2].copy_from_slice(MAGIC_PSI_BIN);
        put_i16(&mut header, PSI_TDC_RESOLUTION, self.tdc_resolution);
        put_i16(&mut header, PSI_RUN_NUMBER, self.run_number);
        put_i16(&mut header, PSI_HISTO_LENGTH, length as i16);
        put_i16(&mut header, PSI_HISTO_NUMBER, self.histograms.len() as i16);
        put_i16(&mut header, PSI_RECORDS_IN_FILE, records_in_file as i16);
        put_i16(&mut header, PSI_BINS_PER_RECORD, self.bins_per_record as i16);
        put_i16(&mut header, PSI_RECORDS_PER_HISTO, records_per_histogram as i16);
        put_i16(&mut header, PSI_HISTOS_PER_RECORD, self.histograms_per_record);
        put_text(&mut header, PSI_SAMPLE, PSI_TITLE_FIELD_LEN, &self.sample);
        put_text(&mut header, PSI_TEMPERATURE, PSI_TITLE_FIELD_LEN, &self.temperature);
        put_text(&mut header, PSI_COMMENT, PSI_COMMENT_LEN, &self.comment);
        put_text(&mut header, PSI_DATE_START, PSI_DATE_LEN, &self.date_start);
        put_text(&mut header, PSI_TIME_START, PSI_TIME_LEN, &self.time_start);
        put_i32(&mut header, PSI_TOTAL_EVENTS, self.total_events);
        put_f32(&mut header, PSI_BIN_WIDTH, self.bin_width_us);
        for (i, label) in self.labels.iter().enumerate() {
            put_text(&mut header, PSI_HISTO_LABELS + i * 4, PSI_LABEL_LEN, label);
        }
        for (i, v) in self.t0.iter().enumerate() {
            put_i16(&mut header, PSI_INTEGER_T0 + i * 2, *v);
        }
        for (i, v) in self.first_good.iter().enumerate() {
            put_i16(&mut header, PSI_FIRST_GOOD + i * 2, *v);
        }
        for (i, v) in self.last_good.iter().enumerate() {
            put_i16(&mut header, PSI_LAST_GOOD + i * 2, *v);
        }
        for (i, v) in self.real_t0.iter().enumerate() {
            put_f32(&mut header, PSI_REAL_T0 + i * 4, *v);
        }
        for (i, v) in self.events.iter().enumerate() {
            put_i32(&mut header, PSI_EVENTS_PER_HISTO + i * 4, *v);
        }
        for (i, (label, value)) in self.core_scalers.iter().enumerate() {
            put_text(&mut header, PSI_CORE_SCALER_LABELS + i * 4, PSI_LABEL_LEN, label);
            put_i32(&mut header, PSI_CORE_SCALERS + i * 4, *value);
        }
        for (i, (mean, deviation)) in self.temperatures.iter().enumerate() {
            put_f32(&mut header, PSI_MEAN_TEMPERATURES + i * 4, *mean);
            put_f32(&mut header, PSI_TEMPERATURE_DEVIATIONS + i * 4, *deviation);
        }

        let mut bytes = header;
        for histogram in self.histograms.iter() {
            for j in 0..records_per_histogram * self.bins_per_record {
                bytes
                    .write_u32::<LittleEndian>(histogram.get(j).copied().unwrap_or(0))
                    .unwrap();
            }
        }
        bytes
    }
}

/// One tag of an [MduImage]
#[derive(Debug, Clone)]
pub struct MduTagFixture {
    pub label: String,
    pub positron: bool,
    pub histo_min: i32,
    /// Written instead of the range derived from `bins` when set
    pub histo_max: Option<i32>,
    pub t0: i32,
    pub first_good: i32,
    pub last_good: i32,
    pub bins: Vec<u32>,
}

impl MduTagFixture {
    pub fn positron(label: &str, bins: Vec<u32>) -> Self {
        Self {
            label: String::from(label),
            positron: true,
            histo_min: 0,
            histo_max: None,
            t0: 0,
            first_good: 0,
            last_good: 0,
            bins,
        }
    }

    pub fn clock(label: &str) -> Self {
        Self {
            label: String::from(label),
            positron: false,
            histo_min: 0,
            histo_max: None,
            t0: 0,
            first_good: 0,
            last_good: 0,
            bins: Vec::new(),
        }
    }

    fn has_payload(&self) -> bool {
        self.positron && self.bins.len() > 1
    }

    pub fn record(&self) -> Vec<u8> {
        let mut record = vec![0u8; MDU_TAG_SIZE];
        put_text(&mut record, 0, MDU_TAG_LABEL_LEN, &self.label);
        record[MDU_TAG_TYPE] = if self.positron { TAG_TYPE_POSITRON } else { b'C' };
        if let Some(histo_max) = self.histo_max {
            put_i32(&mut record, MDU_TAG_HISTO_MIN_BIN, self.histo_min);
            put_i32(&mut record, MDU_TAG_HISTO_MAX_BIN, histo_max);
        } else if self.has_payload() {
            put_i32(&mut record, MDU_TAG_HISTO_MIN_BIN, self.histo_min);
            put_i32(
                &mut record,
                MDU_TAG_HISTO_MAX_BIN,
                self.histo_min + self.bins.len() as i32 - 1,
            );
        }
        put_i32(&mut record, MDU_TAG_T0_BIN, self.t0);
        put_i32(&mut record, MDU_TAG_FIRST_GOOD_BIN, self.first_good);
        put_i32(&mut record, MDU_TAG_LAST_GOOD_BIN, self.last_good);
        record
    }
}

/// Builder for an MDU file of any variant
#[derive(Debug, Clone)]
pub struct MduImage {
    pub variant: MduVariant,
    pub run_number: i32,
    pub sample: String,
    pub temperature: String,
    pub field: String,
    pub orientation: String,
    pub comment: String,
    pub start_date: String,
    pub start_time: String,
    pub end_date: String,
    pub end_time: String,
    pub histogram_resolution: i32,
    pub resolution_code: i32,
    pub declared_detectors: i32,
    pub detector_list: String,
    pub mean_temperatures: String,
    pub temperature_deviations: String,
    pub declared_settings_size: Option<i32>,
    pub tags: Vec<MduTagFixture>,
}

impl MduImage {
    pub fn new(variant: MduVariant) -> Self {
        let (histogram_resolution, resolution_code) = match variant {
            MduVariant::PtaM3 => (0, 8),
            MduVariant::TdcT4 | MduVariant::TdcT5 => (1, 200),
        };
        Self {
            variant,
            run_number: 1,
            sample: String::new(),
            temperature: String::new(),
            field: String::new(),
            orientation: String::new(),
            comment: String::new(),
            start_date: String::from("01-Jan-2010"),
            start_time: String::from("00:00:00"),
            end_date: String::from("01-Jan-2010"),
            end_time: String::from("01:00:00"),
            histogram_resolution,
            resolution_code,
            declared_detectors: 0,
            detector_list: String::new(),
            mean_temperatures: String::new(),
            temperature_deviations: String::new(),
            declared_settings_size: None,
            tags: Vec::new(),
        }
    }

    fn tag(&self, i: usize) -> MduTagFixture {
        self.tags
            .get(i)
            .cloned()
            .unwrap_or_else(|| MduTagFixture::clock(""))
    }

    pub fn build(&self) -> Vec<u8> {
        let n = self.variant.tag_count();

        let mut header = vec![0u8; MDU_FILE_HEADER_SIZE];
        header[0..2].copy_from_slice(self.variant.magic());
        put_text(&mut header, MDU_START_DATE, MDU_DATE_LEN, &self.start_date);
        put_text(&mut header, MDU_START_TIME, MDU_TIME_LEN, &self.start_time);
        put_text(&mut header, MDU_END_DATE, MDU_DATE_LEN, &self.end_date);
        put_text(&mut header, MDU_END_TIME, MDU_TIME_LEN, &self.end_time);
        put_i32(&mut header, MDU_RUN_NUMBER, self.run_number);
        for (sub, text) in [
            (MDU_TITLE_SAMPLE, &self.sample),
            (MDU_TITLE_TEMPERATURE, &self.temperature),
            (MDU_TITLE_FIELD, &self.field),
            (MDU_TITLE_ORIENTATION, &self.orientation),
        ] {
            put_text(&mut header, MDU_RUN_TITLE + sub, MDU_TITLE_FIELD_LEN, text);
        }
        put_text(&mut header, MDU_RUN_SUBTITLE, MDU_COMMENT_LEN, &self.comment);
        put_i32(&mut header, MDU_HISTO_RESOLUTION, self.histogram_resolution);
        put_i32(&mut header, MDU_NUMBER_OF_DETECTORS, self.declared_detectors);
        put_text(
            &mut header,
            MDU_DETECTOR_LIST,
            MDU_DETECTOR_LIST_LEN,
            &self.detector_list,
        );
        put_text(
            &mut header,
            MDU_MEAN_TEMPERATURE,
            MDU_TEMPERATURE_LIST_LEN,
            &self.mean_temperatures,
        );
        put_text(
            &mut header,
            MDU_TEMPERATURE_DEVIATION,
            MDU_TEMPERATURE_LIST_LEN,
            &self.temperature_deviations,
        );
        put_i32(&mut header, MDU_NUM_BYTES_HEADER, MDU_FILE_HEADER_SIZE as i32);
        put_i32(
            &mut header,
            MDU_NUM_BYTES_SETTINGS,
            self.declared_settings_size
                .unwrap_or(self.variant.settings_size() as i32),
        );
        put_i32(&mut header, MDU_NUM_BYTES_TAG, MDU_TAG_SIZE as i32);
        put_i32(
            &mut header,
            MDU_NUM_BYTES_STATISTICS,
            self.variant.statistics_size() as i32,
        );

        let mut settings = vec![0u8; self.variant.settings_size()];
        put_i32(&mut settings, 36, self.resolution_code);
        for i in 0..n {
            let start = MDU_SETTINGS_PREFIX_SIZE + i * MDU_TAG_SIZE;
            settings[start..start + MDU_TAG_SIZE].copy_from_slice(&self.tag(i).record());
        }

        let mut statistics = vec![0u8; self.variant.statistics_size()];
        for i in 0..n {
            put_i32(
                &mut statistics,
                MDU_STATISTICS_PREFIX_SIZE + i * 4,
                1000 + i as i32,
            );
        }

        let mut bytes = header;
        bytes.extend_from_slice(&settings);
        bytes.extend_from_slice(&statistics);
        for i in 0..n {
            let tag = self.tag(i);
            bytes.extend_from_slice(&tag.record());
            if tag.has_payload() {
                for v in tag.bins.iter() {
                    bytes.write_u32::<LittleEndian>(*v).unwrap();
                }
            }
        }
        bytes
    }
}
