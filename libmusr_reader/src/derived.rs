//! Quantities derived from the raw histograms of a decoded run.
//!
//! Every derived sequence goes through one primitive: a [Window] of raw bins is reduced by
//! an optional background level per bin and summed in groups of `binning` bins
//! ([rebin_window]). Rebinning, the from-t0 and good-bins slices and the asymmetries are
//! compositions of that primitive.
//!
//! Invalid requests (unknown histogram, binning below 1, bad background range, a window
//! starting outside of the histogram) give an empty sequence rather than an error.
use ndarray::{ArrayView1, Zip};
use serde::{Deserialize, Serialize};

use super::run::{Histogram, RunData};

/// Inclusive range of raw bins used to estimate the background
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackgroundRange {
    pub lower: i32,
    pub upper: i32,
}

impl BackgroundRange {
    pub fn new(lower: i32, upper: i32) -> Self {
        Self { lower, upper }
    }

    /// `0 <= lower <= upper < length`
    pub fn is_valid_for(&self, length: usize) -> bool {
        self.lower >= 0 && self.lower <= self.upper && (self.upper as i64) < length as i64
    }
}

/// Two histograms compared in an asymmetry, with their efficiency ratio and backgrounds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectorPair {
    pub plus: usize,
    pub minus: usize,
    pub alpha: f64,
    pub binning: i32,
    pub plus_background: BackgroundRange,
    pub minus_background: BackgroundRange,
}

/// A contiguous run of raw bins producing `outputs` rebinned values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: usize,
    pub outputs: usize,
}

impl Window {
    /// The whole histogram
    pub fn full(length: usize, binning: usize) -> Self {
        Self {
            start: 0,
            outputs: length / binning,
        }
    }

    /// Everything from `t0 + offset` to the end of the histogram
    pub fn from_t0(histogram: &Histogram, binning: usize, offset: i32) -> Option<Self> {
        let start = histogram.t0 as i64 + offset as i64;
        if start < 0 || start > histogram.len() as i64 {
            return None;
        }
        let start = start as usize;
        Some(Self {
            start,
            outputs: (histogram.len() - start) / binning,
        })
    }

    /// The inclusive range [first_good, last_good], cut at the end of the histogram
    pub fn good_bins(histogram: &Histogram, binning: usize) -> Option<Self> {
        let (first, last) = (histogram.first_good, histogram.last_good);
        if first < 0 || first as usize > histogram.len() {
            return None;
        }
        let start = first as usize;
        let span = (last as i64 - first as i64 + 1).max(0) as usize;
        Some(Self {
            start,
            outputs: (span / binning).min((histogram.len() - start) / binning),
        })
    }
}

/// Mean raw value per bin over `range`, if the range lies inside `bins`
pub fn background_level(bins: &[u32], range: BackgroundRange) -> Option<f64> {
    if !range.is_valid_for(bins.len()) {
        return None;
    }
    let view = ArrayView1::from(&bins[range.lower as usize..=range.upper as usize]);
    view.mapv(|v| v as f64).mean()
}

/// Sum groups of `binning` raw bins inside `window`, each raw bin first reduced by
/// `background`. Groups running past the end of `bins` are dropped.
pub fn rebin_window(bins: &[u32], window: Window, binning: usize, background: f64) -> Vec<f64> {
    if binning == 0 || window.start > bins.len() {
        return Vec::new();
    }
    let outputs = window
        .outputs
        .min((bins.len() - window.start) / binning);
    let raw = ArrayView1::from(&bins[window.start..window.start + outputs * binning]);
    raw.mapv(|v| v as f64 - background)
        .exact_chunks(binning)
        .into_iter()
        .map(|group| group.sum())
        .collect()
}

/// `(A - alpha B) / (A + alpha B) + y_offset` over the common length of `a` and `b`
pub fn asymmetry_values(a: &[f64], b: &[f64], alpha: f64, y_offset: f64) -> Vec<f64> {
    let n = a.len().min(b.len());
    Zip::from(ArrayView1::from(&a[..n]))
        .and(ArrayView1::from(&b[..n]))
        .map_collect(|a, b| (a - alpha * b) / (a + alpha * b) + y_offset)
        .into_raw_vec()
}

/// Statistical error of [asymmetry_values]. Bins where either input is below 0.5 counts
/// get an error of 1.
pub fn asymmetry_error_values(a: &[f64], b: &[f64], alpha: f64) -> Vec<f64> {
    let n = a.len().min(b.len());
    Zip::from(ArrayView1::from(&a[..n]))
        .and(ArrayView1::from(&b[..n]))
        .map_collect(|&a, &b| {
            if a < 0.5 || b < 0.5 {
                1.0
            } else {
                2.0 * alpha * (a * b * (a + b)).sqrt() / (a + alpha * b).powi(2)
            }
        })
        .into_raw_vec()
}

impl RunData {
    /// Rebin the part of histogram `index` selected by `window`, less an optional background.
    ///
    /// This is the single entry point all derived histograms go through.
    fn windowed(
        &self,
        index: usize,
        binning: i32,
        background: Option<BackgroundRange>,
        window: impl Fn(&Histogram, usize) -> Option<Window>,
    ) -> Vec<f64> {
        let Some(histogram) = self.histogram(index) else {
            return Vec::new();
        };
        if binning < 1 {
            return Vec::new();
        }
        let binning = binning as usize;
        let level = match background {
            Some(range) if !range.is_valid_for(self.histogram_length()) => return Vec::new(),
            Some(range) => match background_level(histogram.bins(), range) {
                Some(level) => level,
                None => return Vec::new(),
            },
            None => 0.0,
        };
        match window(histogram, binning) {
            Some(w) => rebin_window(histogram.bins(), w, binning, level),
            None => Vec::new(),
        }
    }

    /// Histogram `index` as floating point values
    pub fn histogram_f64(&self, index: usize) -> Vec<f64> {
        self.rebin(index, 1)
    }

    /// Sum consecutive groups of `binning` bins; an incomplete last group is dropped
    pub fn rebin(&self, index: usize, binning: i32) -> Vec<f64> {
        self.windowed(index, binning, None, |h, b| Some(Window::full(h.len(), b)))
    }

    /// As [RunData::rebin], with every value below 0.5 replaced by 0.1
    pub fn rebin_no0(&self, index: usize, binning: i32) -> Vec<f64> {
        self.rebin(index, binning)
            .into_iter()
            .map(|v| if v < 0.5 { 0.1 } else { v })
            .collect()
    }

    pub fn from_t0(&self, index: usize, binning: i32, offset: i32) -> Vec<f64> {
        self.windowed(index, binning, None, |h, b| Window::from_t0(h, b, offset))
    }

    pub fn good_bins(&self, index: usize, binning: i32) -> Vec<f64> {
        self.windowed(index, binning, None, Window::good_bins)
    }

    pub fn from_t0_minus_background(
        &self,
        index: usize,
        background: BackgroundRange,
        binning: i32,
        offset: i32,
    ) -> Vec<f64> {
        self.windowed(index, binning, Some(background), |h, b| {
            Window::from_t0(h, b, offset)
        })
    }

    pub fn good_bins_minus_background(
        &self,
        index: usize,
        background: BackgroundRange,
        binning: i32,
    ) -> Vec<f64> {
        self.windowed(index, binning, Some(background), Window::good_bins)
    }

    /// Background corrected from-t0 sequences of both histograms of `pair`
    fn pair_from_t0(&self, pair: &DetectorPair, offset: i32) -> Option<(Vec<f64>, Vec<f64>)> {
        if self.histogram(pair.plus).is_none() || self.histogram(pair.minus).is_none() {
            return None;
        }
        let length = self.histogram_length();
        if pair.binning < 1
            || !pair.plus_background.is_valid_for(length)
            || !pair.minus_background.is_valid_for(length)
        {
            return None;
        }
        let a = self.from_t0_minus_background(pair.plus, pair.plus_background, pair.binning, offset);
        let b =
            self.from_t0_minus_background(pair.minus, pair.minus_background, pair.binning, offset);
        Some((a, b))
    }

    /// Raw bins between t0 and the later of the two first good bins, and the number of
    /// outputs covered by the shorter good range
    fn good_bins_alignment(&self, pair: &DetectorPair) -> Option<(i32, usize)> {
        let plus = self.histogram(pair.plus)?;
        let minus = self.histogram(pair.minus)?;
        if pair.binning < 1 {
            return None;
        }
        let offset = |h: &Histogram| h.first_good as i64 - h.t0 as i64;
        let span = |h: &Histogram| h.last_good as i64 - h.first_good as i64;
        let start = i32::try_from(offset(plus).max(offset(minus))).ok()?;
        let span = span(plus).min(span(minus)) + 1;
        Some((start, (span.max(0) / pair.binning as i64) as usize))
    }

    /// Asymmetry of the pair from t0 (plus `offset`) on, shifted by `y_offset`
    pub fn asymmetry(&self, pair: &DetectorPair, offset: i32, y_offset: f64) -> Vec<f64> {
        match self.pair_from_t0(pair, offset) {
            Some((a, b)) => asymmetry_values(&a, &b, pair.alpha, y_offset),
            None => Vec::new(),
        }
    }

    pub fn asymmetry_error(&self, pair: &DetectorPair, offset: i32) -> Vec<f64> {
        match self.pair_from_t0(pair, offset) {
            Some((a, b)) => asymmetry_error_values(&a, &b, pair.alpha),
            None => Vec::new(),
        }
    }

    /// Asymmetry over the good bins common to both histograms
    pub fn asymmetry_good_bins(&self, pair: &DetectorPair) -> Vec<f64> {
        let Some((start, size)) = self.good_bins_alignment(pair) else {
            return Vec::new();
        };
        match self.pair_from_t0(pair, start) {
            Some((a, b)) => {
                let n = size.min(a.len()).min(b.len());
                asymmetry_values(&a[..n], &b[..n], pair.alpha, 0.0)
            }
            None => Vec::new(),
        }
    }

    pub fn asymmetry_good_bins_error(&self, pair: &DetectorPair) -> Vec<f64> {
        let Some((start, size)) = self.good_bins_alignment(pair) else {
            return Vec::new();
        };
        match self.pair_from_t0(pair, start) {
            Some((a, b)) => {
                let n = size.min(a.len()).min(b.len());
                asymmetry_error_values(&a[..n], &b[..n], pair.alpha)
            }
            None => Vec::new(),
        }
    }
}
