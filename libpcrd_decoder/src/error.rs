use std::path::PathBuf;
use thiserror::Error;

use super::worker_status::WorkerStatus;

#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("Container could not be read due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Container is not a ZIP archive; no end-of-central-directory record was found")]
    MissingDirectory,
    #[error("Container has a bad {0} signature")]
    BadSignature(&'static str),
    #[error("Container is truncated; a record at offset {0} runs past the end of the archive")]
    Truncated(u64),
    #[error("Container must hold exactly one entry but holds {0}")]
    UnexpectedEntryCount(u16),
    #[error("Container entry uses Zip64 extensions which are not supported")]
    Zip64Unsupported,
    #[error("Container entry uses an unsupported encryption scheme (flags {flags:#06x}, method {method})")]
    UnsupportedEncryption { flags: u16, method: u16 },
    #[error("Container entry uses unsupported compression method {0}")]
    UnsupportedCompression(u16),
    #[error("Container could not be decrypted; the secret is wrong")]
    WrongSecret,
    #[error("Container entry failed to inflate: {0}")]
    Inflate(std::io::Error),
    #[error("Container entry failed verification -- expected CRC {expected:#010x} ({expected_size} bytes), found CRC {found:#010x} ({found_size} bytes)")]
    ChecksumMismatch {
        expected: u32,
        found: u32,
        expected_size: u64,
        found_size: u64,
    },
}

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("Experiment document is not valid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),
    #[error("Experiment document failed to parse as XML: {0}")]
    Xml(#[from] quick_xml::DeError),
    #[error("Experiment document is missing required element {0}")]
    MissingElement(&'static str),
    #[error("Experiment document element {element} is missing required attribute {attribute}")]
    MissingAttribute {
        element: &'static str,
        attribute: &'static str,
    },
    #[error("Plate read {reading} is missing header field {field}")]
    MissingHeaderField { reading: usize, field: &'static str },
    #[error("This appears to be a {wells}-well plate ({rows} rows x {columns} columns); only 96-well plates (8 x 12) are supported")]
    UnsupportedGeometry {
        rows: usize,
        columns: usize,
        wells: usize,
    },
    #[error("Dye {dye} is assigned to both channel {first} and channel {second}")]
    DuplicateDye {
        dye: String,
        first: usize,
        second: usize,
    },
    #[error("Dye {dye} has an invalid channel position {position}")]
    BadChannelPosition { dye: String, position: i64 },
    #[error("No {role} dye found; available dyes: {available:?}")]
    MissingReporter {
        role: &'static str,
        available: Vec<String>,
    },
    #[error("Well sample plate index {index} is outside the {wells}-well plate")]
    WellIndexOutOfRange { index: i64, wells: usize },
    #[error("No assigned wells found; every well on the plate is empty")]
    NoAssignedWells,
    #[error("No fluorescence data (plate reads) found in the document")]
    NoPlateReads,
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Goto step {step} targets step {target}, which is not an earlier step")]
    BadGotoTarget { step: usize, target: usize },
    #[error("Loop closed by step {outer} (from step {outer_target}) overlaps loop closed by step {inner} (from step {inner_target})")]
    OverlappingLoops {
        inner: usize,
        inner_target: usize,
        outer: usize,
        outer_target: usize,
    },
    #[error("Protocol resolved to {resolved} acquisition events but the document holds {reads} plate reads")]
    EventCountMismatch { resolved: usize, reads: usize },
    #[error("Plate read {reading} reports step {header_step}, but its acquisition event comes from step {event_step} which was already paired with header step {paired_step}")]
    StepMismatch {
        reading: usize,
        header_step: u32,
        event_step: usize,
        paired_step: u32,
    },
    #[error("Protocol produced no acquisition events")]
    NoAcquisitions,
    #[error("Window classification is ambiguous: {0}")]
    AmbiguousWindows(String),
}

#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("Reading {reading} has {found} values, expected {expected} ({channels} channels x {rows} rows x {columns} columns x {stats} stats)")]
    TokenCount {
        reading: usize,
        found: usize,
        expected: usize,
        channels: usize,
        rows: usize,
        columns: usize,
        stats: usize,
    },
    #[error("Reading {reading} has a malformed value {token:?} at token {position}")]
    BadToken {
        reading: usize,
        position: usize,
        token: String,
    },
    #[error("Reading {reading} declares {rows} rows x {columns} columns, which does not cover the {plate_rows} x {plate_columns} plate")]
    GeometryMismatch {
        reading: usize,
        rows: usize,
        columns: usize,
        plate_rows: usize,
        plate_columns: usize,
    },
    #[error("Reading {reading} declares {channels} channels but dye {dye} is assigned to channel {position}")]
    ChannelOutOfRange {
        reading: usize,
        channels: usize,
        dye: String,
        position: usize,
    },
    #[error("Reading {reading} declares an empty geometry")]
    EmptyGeometry { reading: usize },
}

#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error("Calibration block {block} has a malformed tag {tag:?}")]
    BadTag { block: usize, tag: String },
    #[error("Calibration block {block} is missing {field}")]
    MissingField { block: usize, field: &'static str },
    #[error("Calibration block {block} has a bad geometry value {value:?} for {field}")]
    BadGeometry {
        block: usize,
        field: &'static str,
        value: String,
    },
    #[error("Calibration block payload failed to decode: {0}")]
    Layout(#[from] LayoutError),
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Decode failed due to container error: {0}")]
    Container(#[from] ContainerError),
    #[error("Decode failed due to schema error: {0}")]
    Schema(#[from] SchemaError),
    #[error("Decode failed due to protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("Decode failed due to layout error: {0}")]
    Layout(#[from] LayoutError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Config failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Config failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
    #[error("Config could not read the archive secret from environment variable {0}")]
    MissingSecret(String),
    #[error("Config did not find any .pcrd files at {0:?}")]
    NoInputFiles(PathBuf),
}

#[derive(Debug, Error)]
pub enum DatasetWriterError {
    #[error("DatasetWriter failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("DatasetWriter failed to convert to yaml: {0}")]
    ParsingError(#[from] serde_yaml::Error),
}

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("Processor failed to decode {path:?}: {source}")]
    DecodeError {
        path: PathBuf,
        #[source]
        source: DecodeError,
    },
    #[error("Processor failed due to DatasetWriter error: {0}")]
    WriterError(#[from] DatasetWriterError),
    #[error("Processor failed due to Config error: {0}")]
    ConfigError(#[from] ConfigError),
    #[error("Processor failed due to Send error: {0}")]
    SendError(#[from] std::sync::mpsc::SendError<WorkerStatus>),
    #[error("Processor failed due to IO error: {0}")]
    IoError(#[from] std::io::Error),
}
