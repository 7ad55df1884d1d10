//! # musr_reader_cli
//!
//! Part of the musr_reader crate family.
//!
//! This is the command line application which decodes a range of µSR runs and logs a summary
//! of each one.
//!
//! ## Install
//!
//! Use `cargo install --path ./musr_reader_cli`
//!
//! ## Use
//!
//! Make a template configuration with
//!
//! ```bash
//! musr_reader_cli -p config.yaml new
//! ```
//!
//! edit it, then decode the configured runs with
//!
//! ```bash
//! musr_reader_cli -p config.yaml
//! ```
//!
//! A log of the session is written to `musr_reader.log` in the working directory.
use clap::{Arg, Command};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::mpsc::channel;
use std::sync::Arc;

use libmusr_reader::config::Config;
use libmusr_reader::error::ConfigError;
use libmusr_reader::process::process;
use libmusr_reader::run_status::RunOutcome;

fn make_template_config(path: &Path) -> Result<(), ConfigError> {
    Config::default().write_config_file(path)
}

/// Log to the terminal and to a file, as the default logger
fn init_logging() -> Result<(), spdlog::Error> {
    let file_sink = Arc::new(
        spdlog::sink::FileSink::builder()
            .path(PathBuf::from("./musr_reader.log"))
            .formatter(Box::new(spdlog::formatter::PatternFormatter::new(
                spdlog::formatter::pattern!(
                    "[{date_short} {time_short}] - [thread: {tid}] - [{^{level}}] - {payload}{eol}"
                ),
            )))
            .truncate(true)
            .build()?,
    );
    let term_sink = Arc::new(
        spdlog::sink::StdStreamSink::builder()
            .std_stream(spdlog::sink::StdStream::Stderr)
            .build()?,
    );
    let logger = Arc::new(
        spdlog::Logger::builder()
            .flush_level_filter(spdlog::LevelFilter::All)
            .sink(file_sink)
            .sink(term_sink)
            .build()?,
    );
    spdlog::set_default_logger(logger);
    Ok(())
}

fn main() {
    // Create a cli
    let matches = Command::new("musr_reader_cli")
        .arg_required_else_help(true)
        .subcommand(Command::new("new").about("Make a template configuration yaml file"))
        .arg(
            Arg::new("path")
                .short('p')
                .long("path")
                .required(true)
                .help("Path to the configuration file"),
        )
        .get_matches();

    if let Err(e) = init_logging() {
        eprintln!("Could not create logging: {e}");
        return;
    }

    let config_path = match matches.get_one::<String>("path") {
        Some(p) => PathBuf::from(p),
        None => {
            spdlog::error!("A configuration path is required!");
            return;
        }
    };

    if let Some(("new", _)) = matches.subcommand() {
        spdlog::info!(
            "Making a template config at {}...",
            config_path.to_string_lossy()
        );
        match make_template_config(&config_path) {
            Ok(()) => spdlog::info!("Done."),
            Err(e) => spdlog::error!("{e}"),
        }
        return;
    }

    // Load our config
    spdlog::info!("Loading config from {}...", config_path.to_string_lossy());
    let config = match Config::read_config_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            spdlog::error!("{e}");
            return;
        }
    };
    if !config.is_binning_valid() {
        spdlog::error!("Binning must be at least 1, found {:?}", config.binning);
        return;
    }
    spdlog::info!("Config successfully loaded.");
    spdlog::info!("Data Path: {}", config.data_path.to_string_lossy());
    spdlog::info!(
        "Run files: {}",
        config.get_run_file(config.first_run_number).to_string_lossy()
    );
    spdlog::info!(
        "First Run: {} Last Run: {}",
        config.first_run_number,
        config.last_run_number
    );

    // Setup the progress bar
    let pb = ProgressBar::new(100);
    if let Ok(style) = ProgressStyle::with_template("{bar:40.cyan/blue} {pos:>3}% {msg}") {
        pb.set_style(style);
    }
    let (tx, rx) = channel();
    // Spawn the task!
    let handle = std::thread::spawn(move || process(config, tx));

    // The channel closes once the processor returns
    let mut n_failed = 0;
    for status in rx.iter() {
        pb.set_position((status.progress * 100.0) as u64);
        pb.set_message(format!("run {}", status.run_number));
        if let RunOutcome::Failed(code) = status.outcome {
            n_failed += 1;
            pb.println(format!(
                "Run {} failed with status {} ({code:?})",
                status.run_number,
                code.status()
            ));
        }
    }
    pb.finish();

    match handle.join() {
        Ok(Ok(summaries)) => spdlog::info!(
            "Successfully decoded {} runs, {} failed.",
            summaries.len(),
            n_failed
        ),
        Ok(Err(e)) => spdlog::error!("Processing failed with error: {e}"),
        Err(_) => spdlog::error!("Failed to join processing task!"),
    }

    spdlog::info!("Done.");
}
