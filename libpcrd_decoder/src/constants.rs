/// Rows of wells on the only supported plate (A-H)
pub const SUPPORTED_ROWS: usize = 8;
/// Columns of wells on the only supported plate (1-12)
pub const SUPPORTED_COLUMNS: usize = 12;
pub const ROW_LETTERS: &[u8; SUPPORTED_ROWS] = b"ABCDEFGH";

/// mean, stdev, min, max
pub const STATS_PER_POSITION: usize = 4;
pub const TOKEN_DELIMITER: char = ';';

pub const DEFAULT_SECRET_ENV_VAR: &str = "PCRD_SECRET";
pub const INPUT_EXTENSION: &str = "pcrd";
pub const OUTPUT_EXTENSION: &str = "yml";
pub const INSTRUMENT_LABEL: &str = "CFX Opus (raw)";

pub const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];
