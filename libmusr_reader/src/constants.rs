// Capacities of a decoded run
pub const MAX_HISTOGRAMS: usize = 32;
pub const MAX_SCALERS: usize = 32;
pub const MAX_TEMPERATURES: usize = 4;
/// Longest histogram a run may hold (64 MiB of counts)
pub const MAX_HISTOGRAM_BINS: usize = 1 << 24;
/// Labels are at most 11 characters (12 with the C terminator in the files)
pub const MAX_LABEL_LEN: usize = 11;
/// Marker appended to histograms which were not in the detector selection
pub const UNSELECTED_MARKER: &str = "**";

// Magic codes (first two bytes of every file)
pub const MAGIC_PSI_BIN: &[u8; 2] = b"1N";
pub const MAGIC_MDU_PTA: &[u8; 2] = b"M3";
pub const MAGIC_MDU_TDC: &[u8; 2] = b"T4";
pub const MAGIC_MDU_TDC32: &[u8; 2] = b"T5";

// PSI-bin fixed header layout. All offsets are absolute byte positions in the
// 1024 byte header block.
pub const PSI_HEADER_SIZE: usize = 1024;
pub const PSI_HEADER_SLOTS: usize = 16;
pub const PSI_TDC_RESOLUTION: usize = 2;
pub const PSI_TDC_OVERFLOW: usize = 4;
pub const PSI_RUN_NUMBER: usize = 6;
pub const PSI_HISTO_LENGTH: usize = 28;
pub const PSI_HISTO_NUMBER: usize = 30;
pub const PSI_MON_DEVICE: usize = 60;
pub const PSI_MON_DEVICE_LEN: usize = 12;
pub const PSI_MON_LOW: usize = 72;
pub const PSI_MON_HIGH: usize = 88;
pub const PSI_RECORDS_IN_FILE: usize = 128;
pub const PSI_BINS_PER_RECORD: usize = 130;
pub const PSI_RECORDS_PER_HISTO: usize = 132;
pub const PSI_HISTOS_PER_RECORD: usize = 134;
pub const PSI_SAMPLE: usize = 138;
pub const PSI_TEMPERATURE: usize = 148;
pub const PSI_FIELD: usize = 158;
pub const PSI_ORIENTATION: usize = 168;
pub const PSI_TITLE_FIELD_LEN: usize = 10;
pub const PSI_DATE_START: usize = 218;
pub const PSI_DATE_STOP: usize = 227;
pub const PSI_DATE_LEN: usize = 9;
pub const PSI_TIME_START: usize = 236;
pub const PSI_TIME_STOP: usize = 244;
pub const PSI_TIME_LEN: usize = 8;
pub const PSI_EVENTS_PER_HISTO: usize = 296;
pub const PSI_AUX_SCALERS: usize = 360;
pub const PSI_TOTAL_EVENTS: usize = 424;
pub const PSI_INTEGER_T0: usize = 458;
pub const PSI_FIRST_GOOD: usize = 490;
pub const PSI_LAST_GOOD: usize = 522;
pub const PSI_AUX_SCALER_LABELS: usize = 554;
pub const PSI_PERIOD_SAVE: usize = 654;
pub const PSI_PERIOD_MON: usize = 658;
pub const PSI_CORE_SCALERS: usize = 670;
pub const PSI_MON_EVENTS: usize = 712;
pub const PSI_MEAN_TEMPERATURES: usize = 716;
pub const PSI_TEMPERATURE_DEVIATIONS: usize = 738;
pub const PSI_REAL_T0: usize = 792;
pub const PSI_COMMENT: usize = 860;
pub const PSI_COMMENT_LEN: usize = 62;
pub const PSI_CORE_SCALER_LABELS: usize = 924;
pub const PSI_HISTO_LABELS: usize = 948;
pub const PSI_BIN_WIDTH: usize = 1012;
pub const PSI_LABEL_LEN: usize = 4;
pub const PSI_CORE_SCALER_COUNT: usize = 6;
pub const PSI_AUX_SCALER_COUNT: usize = 12;
/// Base of the bin width fallback in microseconds: 625 ps / 8
pub const PSI_BIN_WIDTH_BASE_US: f32 = 625.0e-6 / 8.0;

// MDU layout. Sizes are those of the front end structures as written by the
// producer (4 byte integers, 4 byte alignment).
pub const MDU_FILE_HEADER_SIZE: usize = 512;
pub const MDU_TAG_SIZE: usize = 60;
pub const MDU_SETTINGS_PREFIX_SIZE: usize = 52;
pub const MDU_STATISTICS_PREFIX_SIZE: usize = 56;
pub const MDU_STATISTICS_SUFFIX_SIZE: usize = 16;
pub const MDU_OVERFLOW_WORDS: usize = 4;

// MDU file header offsets
pub const MDU_FORMAT_VERSION: usize = 1;
pub const MDU_START_DATE: usize = 2;
pub const MDU_START_TIME: usize = 14;
pub const MDU_END_DATE: usize = 23;
pub const MDU_END_TIME: usize = 35;
pub const MDU_RUN_NUMBER: usize = 44;
pub const MDU_FILE_VERSION: usize = 48;
pub const MDU_RUN_TITLE: usize = 52;
pub const MDU_RUN_SUBTITLE: usize = 93;
pub const MDU_DATA_FORMAT: usize = 156;
pub const MDU_HISTO_RESOLUTION: usize = 176;
pub const MDU_BIN_OFFSET: usize = 180;
pub const MDU_BINS_PER_HISTOGRAM: usize = 184;
pub const MDU_NUMBER_OF_DETECTORS: usize = 188;
pub const MDU_DETECTOR_LIST: usize = 192;
pub const MDU_MEAN_TEMPERATURE: usize = 392;
pub const MDU_TEMPERATURE_DEVIATION: usize = 442;
pub const MDU_BIN_SIZE: usize = 492;
pub const MDU_NUM_BYTES_HEADER: usize = 496;
pub const MDU_NUM_BYTES_SETTINGS: usize = 500;
pub const MDU_NUM_BYTES_TAG: usize = 504;
pub const MDU_NUM_BYTES_STATISTICS: usize = 508;
/// Sample, temperature, field and orientation are packed into the run title
pub const MDU_TITLE_SAMPLE: usize = 0;
pub const MDU_TITLE_TEMPERATURE: usize = 10;
pub const MDU_TITLE_FIELD: usize = 20;
pub const MDU_TITLE_ORIENTATION: usize = 30;
pub const MDU_TITLE_FIELD_LEN: usize = 10;
pub const MDU_COMMENT_LEN: usize = 62;

// MDU tag record offsets
pub const MDU_TAG_TYPE: usize = 12;
pub const MDU_TAG_RAW_MIN_PS: usize = 16;
pub const MDU_TAG_RAW_MAX_PS: usize = 20;
pub const MDU_TAG_RAW_MIN_BIN: usize = 24;
pub const MDU_TAG_RAW_MAX_BIN: usize = 28;
pub const MDU_TAG_HISTO_MIN_PS: usize = 32;
pub const MDU_TAG_HISTO_MAX_PS: usize = 36;
pub const MDU_TAG_HISTO_MIN_BIN: usize = 40;
pub const MDU_TAG_HISTO_MAX_BIN: usize = 44;
pub const MDU_TAG_T0_BIN: usize = 48;
pub const MDU_TAG_FIRST_GOOD_BIN: usize = 52;
pub const MDU_TAG_LAST_GOOD_BIN: usize = 56;

/// Bin widths in microseconds for the pTA timespan codes 6..=11
pub const PTA_TIMESPAN_BIN_WIDTHS: [(i32, f32); 6] = [
    (11, 0.000625),
    (10, 0.0003125),
    (9, 0.00015625),
    (8, 0.000078125),
    (7, 0.0000390625),
    (6, 0.00001953125),
];
/// Bin widths in microseconds for the TDC resolution codes
pub const TDC_RESOLUTION_BIN_WIDTHS: [(i32, f32); 4] = [
    (25, 0.0000244140625),
    (100, 0.00009765625),
    (200, 0.0001953125),
    (800, 0.00078125),
];
pub const MDU_DATE_LEN: usize = 12;
pub const MDU_TIME_LEN: usize = 9;
pub const MDU_DATA_FORMAT_LEN: usize = 20;
pub const MDU_DETECTOR_LIST_LEN: usize = 200;
pub const MDU_TEMPERATURE_LIST_LEN: usize = 50;
pub const MDU_TAG_LABEL_LEN: usize = 12;
pub const PTA_MAX_TAGS: usize = 16;
pub const TDC_MAX_TAGS: usize = 16;
pub const TDC32_MAX_TAGS: usize = 32;

/// Tag type byte for positron detector channels
pub const TAG_TYPE_POSITRON: u8 = b'P';
