use bit_set::BitSet;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::str::FromStr;

use super::constants::{ROW_LETTERS, SUPPORTED_COLUMNS, SUPPORTED_ROWS};
use super::error::SchemaError;

/// The role a well plays in the assay, as tagged in the plate setup.
///
/// The instrument software has been seen writing more than one spelling for some of
/// these, so anything we do not recognize is kept verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub enum SampleType {
    TestSample,
    NoTemplateControl,
    PositiveControl,
    #[default]
    Unassigned,
    Other(String),
}

impl FromStr for SampleType {
    type Err = std::convert::Infallible;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim() {
            "wcSample" => Self::TestSample,
            "wcNTC" => Self::NoTemplateControl,
            // Both spellings occur in real files
            "wcPositiveControl" | "wcPostiveControl" => Self::PositiveControl,
            "" | "wcEmpty" => Self::Unassigned,
            other => Self::Other(other.to_string()),
        })
    }
}

impl SampleType {
    /// Only the recognized assay roles count; `Other` types stay in the layout but are not
    /// assigned wells.
    pub fn is_assigned(&self) -> bool {
        matches!(
            self,
            Self::TestSample | Self::NoTemplateControl | Self::PositiveControl
        )
    }

    fn precedence(&self) -> u8 {
        match self {
            Self::Unassigned => 0,
            Self::Other(_) => 1,
            _ => 2,
        }
    }
}

/// Row/column address of a well. Rows and columns are 0-based; the display form is
/// the usual row letter plus 1-based column (A1 ... H12).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WellPosition {
    pub row: usize,
    pub column: usize,
}

impl WellPosition {
    pub fn new(row: usize, column: usize) -> Self {
        Self { row, column }
    }

    /// Recover the row/column from a 0-based row-major index
    pub fn from_index(index: usize, columns: usize) -> Self {
        Self {
            row: index / columns,
            column: index % columns,
        }
    }

    /// 0-based row-major index
    pub fn index(&self, columns: usize) -> usize {
        self.row * columns + self.column
    }
}

impl Display for WellPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match ROW_LETTERS.get(self.row) {
            Some(letter) => write!(f, "{}{}", *letter as char, self.column + 1),
            None => write!(f, "R{}C{}", self.row + 1, self.column + 1),
        }
    }
}

impl Serialize for WellPosition {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WellSample {
    pub sample_type: SampleType,
    pub name: Option<String>,
}

/// PlateLayout is the well grid of the experiment plus the sample metadata for every well.
///
/// Only the 8 x 12 geometry is accepted. Other plates (384-well, reduced-row instruments)
/// are rejected when the layout is created instead of being decoded with a guessed formula.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlateLayout {
    rows: usize,
    columns: usize,
    wells: Vec<WellSample>,
}

impl PlateLayout {
    pub fn new(rows: usize, columns: usize) -> Result<Self, SchemaError> {
        if rows != SUPPORTED_ROWS || columns != SUPPORTED_COLUMNS {
            return Err(SchemaError::UnsupportedGeometry {
                rows,
                columns,
                wells: rows.saturating_mul(columns),
            });
        }
        Ok(Self {
            rows,
            columns,
            wells: vec![WellSample::default(); rows * columns],
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn well_count(&self) -> usize {
        self.wells.len()
    }

    pub fn well(&self, index: usize) -> Option<&WellSample> {
        self.wells.get(index)
    }

    pub fn position(&self, index: usize) -> WellPosition {
        WellPosition::from_index(index, self.columns)
    }

    /// Merge a well sample entry from one dye layer into the layout.
    ///
    /// The same well is usually listed once per dye layer. The first assigned type and the
    /// first non-empty name win; an unrecognized type only replaces an empty well. Negative
    /// indices are ignored.
    pub(crate) fn merge_sample(
        &mut self,
        index: i64,
        sample_type: SampleType,
        name: Option<&str>,
    ) -> Result<(), SchemaError> {
        if index < 0 {
            spdlog::debug!("Ignoring well sample with negative plate index {index}");
            return Ok(());
        }
        let wells = self.wells.len();
        let well = self
            .wells
            .get_mut(index as usize)
            .ok_or(SchemaError::WellIndexOutOfRange { index, wells })?;

        if sample_type.precedence() > well.sample_type.precedence() {
            well.sample_type = sample_type;
        }
        if well.name.is_none() {
            well.name = name.filter(|n| !n.is_empty()).map(String::from);
        }
        Ok(())
    }

    /// Mask of the plate indices that carry an assigned sample type
    pub fn assigned_wells(&self) -> BitSet {
        self.wells
            .iter()
            .enumerate()
            .filter(|(_, w)| w.sample_type.is_assigned())
            .map(|(idx, _)| idx)
            .collect()
    }

    pub fn sample_names(&self) -> BTreeMap<WellPosition, String> {
        self.wells
            .iter()
            .enumerate()
            .filter_map(|(idx, w)| w.name.as_ref().map(|n| (self.position(idx), n.clone())))
            .collect()
    }

    pub fn wells_of_type(&self, sample_type: &SampleType) -> Vec<WellPosition> {
        self.wells
            .iter()
            .enumerate()
            .filter(|(_, w)| w.sample_type == *sample_type)
            .map(|(idx, _)| self.position(idx))
            .collect()
    }
}
