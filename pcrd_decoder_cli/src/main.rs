//! # pcrd_decoder_cli
//!
//! Part of the pcrd_decoder crate family.
//!
//! This is the application to decode CFX result files from the command line.
//!
//! ## Install
//!
//! Use `cargo install --path ./pcrd_decoder_cli`
//!
//! ## Use
//!
//! Make a template configuration file with
//!
//! ```bash
//! pcrd_decoder_cli -p config.yml new
//! ```
//!
//! then edit it and decode with
//!
//! ```bash
//! PCRD_SECRET=... pcrd_decoder_cli -p config.yml
//! ```
//!
//! Detailed diagnostics are written to `./pcrd_decoder.log`.
use clap::{Arg, Command};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use indicatif_log_bridge::LogWrapper;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc};

use libpcrd_decoder::config::Config;
use libpcrd_decoder::process::{create_subsets, process_subset};
use libpcrd_decoder::worker_status::{BarColor, WorkerStatus};

fn make_template_config(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::default();
    let yaml_str = serde_yaml::to_string(&config)?;
    let mut file = File::create(path)?;
    file.write_all(yaml_str.as_bytes())?;
    Ok(())
}

/// Send library diagnostics to a log file
fn init_file_logger() -> Result<(), spdlog::Error> {
    let file_sink = Arc::new(
        spdlog::sink::FileSink::builder()
            .path(PathBuf::from("./pcrd_decoder.log"))
            .formatter(spdlog::formatter::PatternFormatter::new(
                spdlog::formatter::pattern!(
                    "[{date_short} {time_short}] - [thread: {tid}] - [{^{level}}] - {payload}{eol}"
                ),
            ))
            .truncate(true)
            .build()?,
    );
    let logger = Arc::new(
        spdlog::Logger::builder()
            .flush_level_filter(spdlog::LevelFilter::All)
            .sink(file_sink)
            .build()?,
    );
    spdlog::set_default_logger(logger);
    Ok(())
}

fn bar_style(color: &BarColor) -> ProgressStyle {
    let color = match color {
        BarColor::CYAN => "cyan",
        BarColor::GREEN => "green",
        BarColor::RED => "red",
    };
    ProgressStyle::with_template(&format!(
        "[worker {{prefix}}] {{bar:40.{color}/blue}} {{pos:>3}}% {{msg}}"
    ))
    .unwrap_or_else(|_| ProgressStyle::default_bar())
}

fn main() {
    // Create a cli
    let matches = Command::new("pcrd_decoder_cli")
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

    // Initialize feedback
    let logger = simplelog::TermLogger::new(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    );

    let pb_manager = MultiProgress::new();

    LogWrapper::new(pb_manager.clone(), logger)
        .try_init()
        .expect("Could not create logging/progress!");

    if let Err(e) = init_file_logger() {
        log::warn!("Could not create log file, library diagnostics will be lost: {e}");
    }

    // Parse the cli
    let config_path = PathBuf::from(matches.get_one::<String>("path").expect("We require args"));

    if let Some(("new", _)) = matches.subcommand() {
        log::info!(
            "Making a template config at {}...",
            config_path.to_string_lossy()
        );
        match make_template_config(&config_path) {
            Ok(()) => log::info!("Done."),
            Err(e) => log::error!("Failed to write template config: {e}"),
        }
        return;
    }

    // Load our config
    log::info!("Loading config from {}...", config_path.to_string_lossy());
    let config = match Config::read_config_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            log::error!("{e}");
            return;
        }
    };
    if !config.is_n_threads_valid() {
        log::error!("n_threads must be at least 1, found {}", config.n_threads);
        return;
    }
    log::info!("Config successfully loaded.");
    log::info!("Input Path: {}", config.input_path.to_string_lossy());
    log::info!("Output Path: {}", config.output_path.to_string_lossy());
    log::info!("Strict Windows: {}", config.strict_windows);
    log::info!("Include Unassigned Wells: {}", config.include_unassigned_wells);

    let secret = match config.read_secret() {
        Ok(s) => s,
        Err(e) => {
            log::error!("{e}");
            return;
        }
    };
    let files = match config.collect_input_files() {
        Ok(f) => f,
        Err(e) => {
            log::error!("{e}");
            return;
        }
    };
    log::info!("Found {} files to decode.", files.len());

    // Spawn the workers!
    let (tx, rx) = mpsc::channel::<WorkerStatus>();
    let mut workers = Vec::new();
    let mut bars: Vec<Option<ProgressBar>> = Vec::new();
    for (idx, subset) in create_subsets(&config, files).into_iter().enumerate() {
        // Dont make empty workers
        if subset.is_empty() {
            bars.push(None);
            continue;
        }
        let bar = pb_manager.add(ProgressBar::new(100));
        bar.set_style(bar_style(&BarColor::CYAN));
        bar.set_prefix(idx.to_string());
        bars.push(Some(bar));

        let conf = config.clone();
        let secret = secret.clone();
        let tx = tx.clone();
        workers.push(std::thread::spawn(move || {
            process_subset(conf, secret, tx, idx, subset)
        }));
    }
    // Only the workers hold senders now, so the loop below ends when they are all done
    drop(tx);

    for status in rx.iter() {
        if let Some(Some(bar)) = bars.get(status.worker_id) {
            bar.set_style(bar_style(&status.color));
            bar.set_position((status.progress * 100.0) as u64);
            bar.set_message(status.file_label());
        }
    }

    let mut failures = 0;
    for worker in workers {
        match worker.join() {
            Ok(Ok(n)) => failures += n,
            Ok(Err(e)) => log::error!("Processor error: {e}"),
            Err(_) => log::error!("An error occured joining one of the workers!"),
        }
    }
    for bar in bars.into_iter().flatten() {
        bar.finish();
    }

    if failures == 0 {
        log::info!("Successfully decoded all files!");
    } else {
        log::warn!("{failures} files failed to decode, check pcrd_decoder.log for details.");
    }
    log::info!("Done.");
}
