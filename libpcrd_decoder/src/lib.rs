//! # pcrd_decoder
//!
//! pcrd_decoder reads the result files (.pcrd) written by Bio-Rad CFX real-time PCR
//! instruments and converts them into a uniform, channel-resolved, cycle-indexed
//! fluorescence dataset for downstream genotype clustering and reporting.
//!
//! The file format is undocumented. Everything here was worked out from real files, so the
//! decoder is strict: anything it does not recognize is an error, not a guess.
//!
//! ## Installation
//!
//! The only method of install is from source. If you have not used Rust before, you will
//! most likely need to install the Rust tool chain. See the
//! [Rust docs](https://www.rust-lang.org/tools/install) for installation instructions.
//!
//! To build and install the CLI use `cargo install --path ./pcrd_decoder_cli` from the top
//! level repository. To use the CLI see the `pcrd_decoder_cli` documentation.
//!
//! ## Decoding
//!
//! A decode is a pure function of the archive bytes, the archive secret and a few options:
//!
//! 1. [`container`]: open the single-entry, legacy-encrypted ZIP archive
//! 2. [`document`]: extract the plate layout, dye channels, protocol and raw plate reads
//! 3. [`protocol`]: expand the temperature/goto program into cycle-numbered acquisition events
//! 4. [`layout`]: reshape each plate read from its channel-major token list
//! 5. [`window`]: label the acquisition events as pre-read, amplification and post-read
//! 6. [`baseline`]: subtract each well's first amplification cycle from its reporter channels
//!
//! [`pipeline::decode_archive`] runs all of them and returns a frozen [`dataset::Dataset`].
//! Decoding is all-or-nothing per file. The one exception is factory calibration data, which is
//! decoded on a best-effort basis and skipped with a warning when malformed.
//!
//! The archive secret is supplied by the caller; this library never stores it and never reads
//! it from the environment inside the pipeline.
//!
//! ## Configuration
//!
//! The YAML format of a configuration file is as follows:
//!
//! ```yml
//! input_path: None
//! output_path: None
//! secret_env_var: PCRD_SECRET
//! strict_windows: false
//! include_unassigned_wells: false
//! n_threads: 1
//! ```
//!
//! - input_path: A directory containing .pcrd files, or a single .pcrd file
//! - output_path: A directory to which the decoded datasets (.yml) will be written
//! - secret_env_var: The environment variable holding the archive secret
//! - strict_windows: If true, a window classification that had to guess (tied amplification
//! groups, step groups that fit no window) fails the file instead of warning
//! - include_unassigned_wells: If true, records are emitted for wells with no sample
//! - n_threads: The number of parallel worker threads to divide the files amongst. Must be at
//! least 1.
//!
//! ## Output
//!
//! One YAML dataset per input file, named after the input file. The dataset holds the plate
//! layout, the dye assignment, a summary of the protocol, the acquisition events, the
//! classified windows (plus any classification warnings), the well-cycle records and any
//! calibration blocks.
//!
//! ```text
//! plate_07.yml
//! format, source
//! dataset
//! |---- instrument
//! |---- plate - rows, columns, wells
//! |---- dyes - reporter1, reporter2, passive_reference
//! |---- protocol - step, temperature, hold_seconds, cycles, label
//! |---- events - step, cycle, temperature
//! |---- windows - kind, start_cycle, end_cycle
//! |---- warnings
//! |---- records - well, cycle, reporter1, reporter2, passive
//! |---- calibrations - dye_index, plate_type, temperature, kind, means
//! ```
pub mod baseline;
pub mod calibration;
pub mod config;
pub mod constants;
pub mod container;
pub mod dataset;
pub mod dataset_writer;
pub mod document;
pub mod dye_map;
pub mod error;
pub mod layout;
pub mod pipeline;
pub mod plate;
pub mod process;
pub mod protocol;
pub mod window;
pub mod worker_status;

#[cfg(test)]
pub(crate) mod fixtures;
