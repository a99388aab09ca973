use ndarray::Array2;
use serde::Serialize;

use super::error::CalibrationError;
use super::layout::{decode_calibration_payload, parse_tokens};

/// Whether a factory calibration plate was read filled with pure dye or empty
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CalibrationKind {
    Pure,
    Empty,
}

/// The information packed into a calibration tag string, e.g. `Pure_Dye2_PlateBRWhite_T60.0`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalibrationTag {
    pub kind: CalibrationKind,
    pub dye_index: usize,
    pub plate_type: String,
    pub temperature: f64,
}

impl CalibrationTag {
    pub fn parse(tag: &str) -> Option<Self> {
        let mut parts = tag.trim().split('_');
        let kind = match parts.next()? {
            "Pure" => CalibrationKind::Pure,
            "Empty" => CalibrationKind::Empty,
            _ => return None,
        };
        let dye_index = parts.next()?.strip_prefix("Dye")?.parse().ok()?;
        let plate_type = parts.next()?.strip_prefix("Plate")?.to_string();
        let temperature = parts.next()?.strip_prefix('T')?.parse().ok()?;
        if parts.next().is_some() || plate_type.is_empty() {
            return None;
        }
        Some(Self {
            kind,
            dye_index,
            plate_type,
            temperature,
        })
    }
}

/// Factory calibration data found in the run. Passed through untouched; the decoder does not
/// apply spectral deconvolution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalibrationBlock {
    pub dye_index: usize,
    pub plate_type: String,
    pub temperature: f64,
    pub kind: CalibrationKind,
    /// Mean per [channel, position]
    pub means: Array2<f64>,
}

/// The calibration element as found in the document, all fields still raw text
#[derive(Debug, Clone, Default)]
pub struct RawCalibration {
    pub tag: Option<String>,
    pub channels: Option<String>,
    pub rows: Option<String>,
    pub columns: Option<String>,
    pub payload: Option<String>,
}

fn geometry(
    block: usize,
    field: &'static str,
    value: &Option<String>,
) -> Result<usize, CalibrationError> {
    let text = value
        .as_deref()
        .ok_or(CalibrationError::MissingField { block, field })?;
    text.trim()
        .parse()
        .map_err(|_| CalibrationError::BadGeometry {
            block,
            field,
            value: text.to_string(),
        })
}

impl RawCalibration {
    pub fn decode(&self, block: usize) -> Result<CalibrationBlock, CalibrationError> {
        let tag_text = self.tag.as_deref().ok_or(CalibrationError::MissingField {
            block,
            field: "tag",
        })?;
        let tag = CalibrationTag::parse(tag_text).ok_or_else(|| CalibrationError::BadTag {
            block,
            tag: tag_text.to_string(),
        })?;
        let channels = geometry(block, "chCount", &self.channels)?;
        let rows = geometry(block, "numRows", &self.rows)?;
        let columns = geometry(block, "numCols", &self.columns)?;
        let payload = self.payload.as_deref().ok_or(CalibrationError::MissingField {
            block,
            field: "PAr",
        })?;
        let tokens = parse_tokens(payload, block)?;
        let means = decode_calibration_payload(block, channels, rows, columns, tokens)?;
        Ok(CalibrationBlock {
            dye_index: tag.dye_index,
            plate_type: tag.plate_type,
            temperature: tag.temperature,
            kind: tag.kind,
            means,
        })
    }
}

/// Decode every calibration block that can be decoded. Failures are logged and skipped; calibration
/// data is never required for the well dataset.
pub fn decode_calibrations(raw: &[RawCalibration]) -> Vec<CalibrationBlock> {
    raw.iter()
        .enumerate()
        .filter_map(|(block, cal)| match cal.decode(block) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                spdlog::warn!("Skipping calibration block: {e}");
                None
            }
        })
        .collect()
}

//Unit tests
#[cfg(test)]
mod tests {
    use super::*;

    fn raw(tag: &str, payload: &str) -> RawCalibration {
        RawCalibration {
            tag: Some(tag.to_string()),
            channels: Some("2".to_string()),
            rows: Some("1".to_string()),
            columns: Some("3".to_string()),
            payload: Some(payload.to_string()),
        }
    }

    #[test]
    fn test_parse_tag() {
        let tag = CalibrationTag::parse("Pure_Dye2_PlateBRWhite_T60.5").unwrap();
        assert_eq!(tag.kind, CalibrationKind::Pure);
        assert_eq!(tag.dye_index, 2);
        assert_eq!(tag.plate_type, "BRWhite");
        assert_eq!(tag.temperature, 60.5);

        let tag = CalibrationTag::parse("Empty_Dye0_Plate1_T25").unwrap();
        assert_eq!(tag.kind, CalibrationKind::Empty);

        for bad in [
            "",
            "Pure",
            "Full_Dye1_Plate1_T60",
            "Pure_DyeX_Plate1_T60",
            "Pure_Dye1_Plate_T60",
            "Pure_Dye1_Plate1_60",
            "Pure_Dye1_Plate1_T60_extra",
        ] {
            assert!(CalibrationTag::parse(bad).is_none(), "{bad} should not parse");
        }
    }

    #[test]
    fn test_decode_block() {
        let block = raw("Pure_Dye1_Plate1_T60", "1;2;3;4;5;6").decode(0).unwrap();
        assert_eq!(block.dye_index, 1);
        assert_eq!(block.means.shape(), &[2, 3]);
        assert_eq!(block.means[[1, 0]], 4.0);
    }

    #[test]
    fn test_bad_blocks_are_skipped() {
        let mut missing_geometry = raw("Pure_Dye1_Plate1_T60", "1;2;3;4;5;6");
        missing_geometry.rows = None;
        let blocks = decode_calibrations(&[
            raw("Pure_Dye0_Plate1_T60", "1;2;3;4;5;6"),
            raw("garbage", "1;2;3;4;5;6"),
            raw("Empty_Dye0_Plate1_T60", "1;2;3"),
            raw("Empty_Dye0_Plate1_T60", "1;2;x;4;5;6"),
            missing_geometry,
            raw("Empty_Dye3_Plate1_T60", "6;5;4;3;2;1"),
        ]);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].kind, CalibrationKind::Pure);
        assert_eq!(blocks[1].dye_index, 3);
        assert_eq!(blocks[1].means[[0, 0]], 6.0);
    }
}
