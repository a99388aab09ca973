// Plate read payloads are flat, semicolon-delimited lists of ASCII floats. The layout is
// channel-major:
//
// value = tokens[channel * (rows * columns * 4) + position * 4 + stat]
//
// where position = row * columns + column and stat is mean/stdev/min/max. Reading the same list
// position-major produces numbers that look perfectly reasonable and are completely wrong, so
// the token count is checked against the header before anything is reshaped.
//
// The readings carry one row more than the plate has wells (row 8 on a 96-well plate); that row is
// an internal reference detector. It is kept here and dropped when the well dataset is built.
use ndarray::{s, Array2, Array3, ArrayView2};
use serde::Serialize;

use super::constants::{STATS_PER_POSITION, TOKEN_DELIMITER};
use super::document::PlateReadHeader;
use super::dye_map::DyeAssignment;
use super::error::LayoutError;
use super::plate::PlateLayout;

/// The per-reading statistics reported by the instrument, in payload order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Statistic {
    Mean = 0,
    StdDev = 1,
    Min = 2,
    Max = 3,
}

/// One channel of one position of one plate read
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawChannelReading {
    /// Index of the plate read, which is also the index of its acquisition event
    pub reading: usize,
    pub channel: usize,
    pub position: usize,
    pub mean: f64,
    pub stdev: f64,
    pub min: f64,
    pub max: f64,
}

/// The decoded payload of a single plate read, shaped as [channel, position, statistic]
#[derive(Debug, Clone, PartialEq)]
pub struct PlateReadData {
    pub reading: usize,
    pub header: PlateReadHeader,
    values: Array3<f64>,
}

impl PlateReadData {
    pub fn channel_count(&self) -> usize {
        self.values.shape()[0]
    }

    /// Positions including the reference detector row
    pub fn position_count(&self) -> usize {
        self.values.shape()[1]
    }

    pub fn value(&self, channel: usize, position: usize, stat: Statistic) -> Option<f64> {
        self.values.get([channel, position, stat as usize]).copied()
    }

    pub fn mean(&self, channel: usize, position: usize) -> Option<f64> {
        self.value(channel, position, Statistic::Mean)
    }

    /// All statistics of one channel as a [position, statistic] view
    pub fn channel(&self, channel: usize) -> ArrayView2<'_, f64> {
        self.values.slice(s![channel, .., ..])
    }

    pub fn readings(&self) -> impl Iterator<Item = RawChannelReading> + '_ {
        let positions = self.position_count();
        (0..self.channel_count()).flat_map(move |channel| {
            (0..positions).map(move |position| RawChannelReading {
                reading: self.reading,
                channel,
                position,
                mean: self.values[[channel, position, Statistic::Mean as usize]],
                stdev: self.values[[channel, position, Statistic::StdDev as usize]],
                min: self.values[[channel, position, Statistic::Min as usize]],
                max: self.values[[channel, position, Statistic::Max as usize]],
            })
        })
    }

    /// Check that the reading covers every well of the plate and every channel the dataset reads
    pub fn check_coverage(
        &self,
        plate: &PlateLayout,
        dyes: &DyeAssignment,
    ) -> Result<(), LayoutError> {
        let header = &self.header;
        if header.columns != plate.columns() || header.rows < plate.rows() {
            return Err(LayoutError::GeometryMismatch {
                reading: self.reading,
                rows: header.rows,
                columns: header.columns,
                plate_rows: plate.rows(),
                plate_columns: plate.columns(),
            });
        }
        for dye in dyes.channels() {
            if dye.channel >= header.channels {
                return Err(LayoutError::ChannelOutOfRange {
                    reading: self.reading,
                    channels: header.channels,
                    dye: dye.dye.to_string(),
                    position: dye.channel,
                });
            }
        }
        Ok(())
    }
}

/// Split a payload into floats. Empty tokens (a trailing delimiter, blank padding) are skipped;
/// anything else that does not parse fails the reading.
pub fn parse_tokens(payload: &str, reading: usize) -> Result<Vec<f64>, LayoutError> {
    payload
        .split(TOKEN_DELIMITER)
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .enumerate()
        .map(|(position, token)| {
            token.parse::<f64>().map_err(|_| LayoutError::BadToken {
                reading,
                position,
                token: token.to_string(),
            })
        })
        .collect()
}

/// Reshape a plate read payload using the channel-major layout.
///
/// The token count must be exactly channels x rows x columns x 4; there is no partial decode.
pub fn decode_plate_read(
    reading: usize,
    header: &PlateReadHeader,
    tokens: Vec<f64>,
) -> Result<PlateReadData, LayoutError> {
    let positions = header.rows.saturating_mul(header.columns);
    if header.channels == 0 || positions == 0 {
        return Err(LayoutError::EmptyGeometry { reading });
    }
    let expected = header
        .channels
        .checked_mul(positions)
        .and_then(|values| values.checked_mul(STATS_PER_POSITION));
    if expected != Some(tokens.len()) {
        return Err(LayoutError::TokenCount {
            reading,
            found: tokens.len(),
            expected: expected.unwrap_or(usize::MAX),
            channels: header.channels,
            rows: header.rows,
            columns: header.columns,
            stats: STATS_PER_POSITION,
        });
    }
    // Standard (row-major) order of [channel, position, stat] is exactly the channel-major layout
    let values = Array3::from_shape_vec((header.channels, positions, STATS_PER_POSITION), tokens)
        .map_err(|_| LayoutError::EmptyGeometry { reading })?;
    Ok(PlateReadData {
        reading,
        header: header.clone(),
        values,
    })
}

/// Reshape a calibration payload: one mean per channel and position, no statistics.
///
/// value = tokens[channel * (rows * columns) + position]
///
/// `block` is the index of the calibration block, reported in errors in place of a reading index.
pub fn decode_calibration_payload(
    block: usize,
    channels: usize,
    rows: usize,
    columns: usize,
    tokens: Vec<f64>,
) -> Result<Array2<f64>, LayoutError> {
    let positions = rows.saturating_mul(columns);
    if channels == 0 || positions == 0 {
        return Err(LayoutError::EmptyGeometry { reading: block });
    }
    let expected = channels.checked_mul(positions);
    if expected != Some(tokens.len()) {
        return Err(LayoutError::TokenCount {
            reading: block,
            found: tokens.len(),
            expected: expected.unwrap_or(usize::MAX),
            channels,
            rows,
            columns,
            stats: 1,
        });
    }
    Array2::from_shape_vec((channels, positions), tokens)
        .map_err(|_| LayoutError::EmptyGeometry { reading: block })
}
