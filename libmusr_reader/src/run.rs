use std::fmt::Display;

use time::macros::format_description;
use time::parsing::Parsed;
use time::{Date, PrimitiveDateTime, Time};

use super::constants::{MAX_HISTOGRAMS, MAX_SCALERS, MAX_TEMPERATURES};
use super::error::CapacityError;
use super::format::FileFormat;
use super::mdu::MduDetails;
use super::psi_bin::PsiBinDetails;

/// Run level header information common to both file families
#[derive(Debug, Clone, PartialEq)]
pub struct RunMetadata {
    pub format: FileFormat,
    pub run_number: i32,
    pub sample: String,
    pub temperature: String,
    pub field: String,
    pub orientation: String,
    pub comment: String,
    pub date_start: String,
    pub time_start: String,
    pub date_stop: String,
    pub time_stop: String,
    /// Width of one raw bin in microseconds
    pub bin_width_us: f32,
    pub default_binning: i32,
    pub total_events: i64,
}

impl RunMetadata {
    pub fn new(format: FileFormat) -> Self {
        Self {
            format,
            run_number: 0,
            sample: String::new(),
            temperature: String::new(),
            field: String::new(),
            orientation: String::new(),
            comment: String::new(),
            date_start: String::new(),
            time_start: String::new(),
            date_stop: String::new(),
            time_stop: String::new(),
            bin_width_us: 0.0,
            default_binning: 1,
            total_events: 0,
        }
    }

    pub fn start(&self) -> Option<PrimitiveDateTime> {
        parse_timestamp(&self.date_start, &self.time_start)
    }

    pub fn stop(&self) -> Option<PrimitiveDateTime> {
        parse_timestamp(&self.date_stop, &self.time_stop)
    }
}

/// Parse the `DD-MMM-YY` date and `HH:MM:SS` time written in run headers.
///
/// Two digit years below 70 are taken as 20xx.
pub fn parse_timestamp(date: &str, time: &str) -> Option<PrimitiveDateTime> {
    let mut parsed = Parsed::new();
    let rest = parsed
        .parse_items(
            date.trim().as_bytes(),
            format_description!("[day]-[month repr:short case_sensitive:false]-[year repr:last_two]"),
        )
        .ok()?;
    if !rest.is_empty() {
        return None;
    }
    let last_two = parsed.year_last_two()? as i32;
    let year = last_two + if last_two < 70 { 2000 } else { 1900 };
    let date = Date::from_calendar_date(year, parsed.month()?, parsed.day()?.get()).ok()?;
    let time = Time::parse(time.trim(), format_description!("[hour]:[minute]:[second]")).ok()?;
    Some(PrimitiveDateTime::new(date, time))
}

/// One detector histogram of a run.
///
/// The raw bins are owned here and never mutated after decoding; floating point and
/// rebinned forms are always derived from them on demand.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    pub label: String,
    bins: Vec<u32>,
    /// Events between first_good and last_good (as recorded, or summed for MDU)
    pub events: i64,
    /// t0 as stored in the header as a float (PSI-bin only)
    pub real_t0: f32,
    pub t0: i32,
    pub first_good: i32,
    pub last_good: i32,
}

impl Histogram {
    pub fn new(label: String, bins: Vec<u32>) -> Self {
        Self {
            label,
            bins,
            events: 0,
            real_t0: 0.0,
            t0: 0,
            first_good: 0,
            last_good: 0,
        }
    }

    pub fn bins(&self) -> &[u32] {
        &self.bins
    }

    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scaler {
    pub label: String,
    pub value: i64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemperatureReading {
    pub mean: f32,
    pub deviation: f32,
}

/// Header values specific to one file family
#[derive(Debug, Clone, PartialEq)]
pub enum FormatDetails {
    PsiBin(PsiBinDetails),
    Mdu(MduDetails),
}

/// Everything decoded from one file.
///
/// Histogram, scaler and temperature tables have fixed capacities which are enforced when
/// an entry is pushed; all histograms have the same length.
#[derive(Debug, Clone, PartialEq)]
pub struct RunData {
    pub metadata: RunMetadata,
    pub details: FormatDetails,
    histogram_length: usize,
    histograms: Vec<Histogram>,
    scalers: Vec<Scaler>,
    temperatures: Vec<TemperatureReading>,
}

impl RunData {
    pub fn new(metadata: RunMetadata, details: FormatDetails, histogram_length: usize) -> Self {
        Self {
            metadata,
            details,
            histogram_length,
            histograms: Vec::new(),
            scalers: Vec::new(),
            temperatures: Vec::new(),
        }
    }

    /// Store a histogram. Its bins are zero padded or truncated to the run's histogram length.
    pub fn push_histogram(&mut self, mut histogram: Histogram) -> Result<(), CapacityError> {
        if self.histograms.len() >= MAX_HISTOGRAMS {
            return Err(CapacityError::Histograms);
        }
        histogram.bins.resize(self.histogram_length, 0);
        self.histograms.push(histogram);
        Ok(())
    }

    pub fn push_scaler(&mut self, scaler: Scaler) -> Result<(), CapacityError> {
        if self.scalers.len() >= MAX_SCALERS {
            return Err(CapacityError::Scalers);
        }
        self.scalers.push(scaler);
        Ok(())
    }

    pub fn push_temperature(&mut self, reading: TemperatureReading) -> Result<(), CapacityError> {
        if self.temperatures.len() >= MAX_TEMPERATURES {
            return Err(CapacityError::Temperatures);
        }
        self.temperatures.push(reading);
        Ok(())
    }

    pub fn histogram_length(&self) -> usize {
        self.histogram_length
    }

    pub fn histograms(&self) -> &[Histogram] {
        &self.histograms
    }

    pub fn histogram(&self, index: usize) -> Option<&Histogram> {
        self.histograms.get(index)
    }

    pub fn histogram_mut(&mut self, index: usize) -> Option<&mut Histogram> {
        self.histograms.get_mut(index)
    }

    pub fn scalers(&self) -> &[Scaler] {
        &self.scalers
    }

    pub fn temperatures(&self) -> &[TemperatureReading] {
        &self.temperatures
    }
}

impl Display for RunData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let meta = &self.metadata;
        writeln!(f, "Format Identifier is {}", meta.format.id())?;
        writeln!(f, "Run number is  {}", meta.run_number)?;
        writeln!(f, "Sample is      {}", meta.sample)?;
        writeln!(f, "Temperature is {}", meta.temperature)?;
        writeln!(f, "Field is       {}", meta.field)?;
        writeln!(f, "Orientation is {}", meta.orientation)?;
        writeln!(f, "Comment is     {}", meta.comment)?;
        writeln!(f, "Start is       {} {}", meta.date_start, meta.time_start)?;
        writeln!(f, "End is         {} {}", meta.date_stop, meta.time_stop)?;
        writeln!(f, "Bin width is   {} [usec]", meta.bin_width_us)?;
        writeln!(f, "Number of histograms is {}", self.histograms.len())?;
        writeln!(f, "Histogram length is     {}", self.histogram_length)?;
        writeln!(f, "Default binning is      {}", meta.default_binning)?;
        writeln!(f, "Total number of events is {}", meta.total_events)?;
        for (i, h) in self.histograms.iter().enumerate() {
            writeln!(
                f,
                "Histogram {i} Name is >{}< Events per histogram is {}",
                h.label, h.events
            )?;
            writeln!(
                f,
                "      real t0: {} t0: {} first good: {} last good: {}",
                h.real_t0, h.t0, h.first_good, h.last_good
            )?;
        }
        writeln!(f, "Number of scalers is {}", self.scalers.len())?;
        for (i, s) in self.scalers.iter().enumerate() {
            writeln!(f, "Scaler {i} Name is >{}< Value is {}", s.label, s.value)?;
        }
        writeln!(f, "Number of temperatures is {}", self.temperatures.len())?;
        for (i, t) in self.temperatures.iter().enumerate() {
            writeln!(f, "Temperature {i} is {} Deviation is {}", t.mean, t.deviation)?;
        }
        Ok(())
    }
}
