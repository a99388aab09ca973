//! The experiment document (`experimentalData2`) embedded in the instrument archive.
//!
//! The schema below was recovered from real files rather than from any published description.
//! Structure is parsed with serde; anything the decoder does not need is ignored. Values that
//! vary between software versions (sample type spellings, dye labels) are kept as tagged data
//! with an `Other` case instead of failing the parse. Missing structure does fail the parse.
//!
//! ```text
//! experimentalData2
//! |---- plateSetup2 - rows, columns
//! |    |---- dyeLayersList
//! |    |    |---- dyeLayer - plateName
//! |    |    |    |---- fluor - channelPosition
//! |    |    |    |---- wellSamples
//! |    |    |    |    |---- wellSample - plateIndex, wellSampleType, sampleId
//! |---- protocol2BaseList
//! |    |---- TemperatureStep - temperatureStepTemp, temperatureStepHoldTime
//! |    |    |---- PlateReadOption
//! |    |    |---- IncrementOption - optionTemperatureIncrement
//! |    |---- GotoStep - optionGotoStep, optionGotoCycle
//! |---- runData
//! |    |---- plateReadDataVector
//! |    |    |---- plateRead
//! |    |    |    |---- PlateRead
//! |    |    |    |    |---- Hdr/PlateReadDataHeader - Step, Cycle, ChCount, NumRows, NumCols
//! |    |    |    |    |---- Data/PAr
//! |    |---- calibrationDataVector
//! |    |    |---- calibration - tag, chCount, numRows, numCols
//! |    |    |    |---- PAr
//! ```
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::calibration::{decode_calibrations, CalibrationBlock, RawCalibration};
use super::constants::UTF8_BOM;
use super::dye_map::{Dye, DyeChannelMap};
use super::error::SchemaError;
use super::plate::{PlateLayout, SampleType};
use super::protocol::{ProtocolStep, StepKind};

#[derive(Debug, Deserialize)]
struct ExperimentXml {
    #[serde(rename = "plateSetup2")]
    plate_setup: Option<PlateSetupXml>,
    #[serde(rename = "protocol2BaseList")]
    protocol: Option<ProtocolListXml>,
    #[serde(rename = "runData")]
    run_data: Option<RunDataXml>,
}

#[derive(Debug, Deserialize)]
struct PlateSetupXml {
    #[serde(rename = "@rows")]
    rows: Option<usize>,
    #[serde(rename = "@columns")]
    columns: Option<usize>,
    #[serde(rename = "dyeLayersList")]
    dye_layers: Option<DyeLayersXml>,
}

#[derive(Debug, Deserialize)]
struct DyeLayersXml {
    #[serde(rename = "dyeLayer", default)]
    layers: Vec<DyeLayerXml>,
}

#[derive(Debug, Deserialize)]
struct DyeLayerXml {
    #[serde(rename = "@plateName")]
    plate_name: Option<String>,
    fluor: Option<FluorXml>,
    #[serde(rename = "wellSamples")]
    well_samples: Option<WellSamplesXml>,
}

#[derive(Debug, Deserialize)]
struct FluorXml {
    #[serde(rename = "@channelPosition")]
    channel_position: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct WellSamplesXml {
    #[serde(rename = "wellSample", default)]
    samples: Vec<WellSampleXml>,
}

#[derive(Debug, Deserialize)]
struct WellSampleXml {
    #[serde(rename = "@plateIndex")]
    plate_index: Option<i64>,
    #[serde(rename = "@wellSampleType")]
    sample_type: Option<String>,
    #[serde(rename = "@sampleId")]
    sample_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProtocolListXml {
    #[serde(rename = "$value", default)]
    steps: Vec<ProtocolItemXml>,
}

/// Declaration order matters (goto targets are list indices), so both step kinds share one list
#[derive(Debug, Deserialize)]
enum ProtocolItemXml {
    TemperatureStep(TemperatureStepXml),
    GotoStep(GotoStepXml),
}

#[derive(Debug, Deserialize)]
struct TemperatureStepXml {
    #[serde(rename = "@temperatureStepTemp")]
    temperature: Option<f64>,
    #[serde(rename = "@temperatureStepHoldTime")]
    hold_time: Option<u32>,
    #[serde(rename = "PlateReadOption")]
    plate_read: Option<PlateReadOptionXml>,
    #[serde(rename = "IncrementOption")]
    increment: Option<IncrementOptionXml>,
}

/// Presence alone marks the step as acquiring data
#[derive(Debug, Deserialize)]
struct PlateReadOptionXml {}

#[derive(Debug, Deserialize)]
struct IncrementOptionXml {
    #[serde(rename = "@optionTemperatureIncrement")]
    temperature_increment: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct GotoStepXml {
    #[serde(rename = "@optionGotoStep")]
    target: Option<usize>,
    #[serde(rename = "@optionGotoCycle")]
    repeats: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct RunDataXml {
    #[serde(rename = "plateReadDataVector")]
    plate_reads: Option<PlateReadVectorXml>,
    #[serde(rename = "calibrationDataVector")]
    calibrations: Option<CalibrationVectorXml>,
}

#[derive(Debug, Deserialize)]
struct PlateReadVectorXml {
    #[serde(rename = "plateRead", default)]
    reads: Vec<PlateReadOuterXml>,
}

#[derive(Debug, Deserialize)]
struct PlateReadOuterXml {
    #[serde(rename = "PlateRead")]
    inner: Option<PlateReadXml>,
}

#[derive(Debug, Deserialize)]
struct PlateReadXml {
    #[serde(rename = "Hdr")]
    header: Option<HdrXml>,
    #[serde(rename = "Data")]
    data: Option<DataXml>,
}

#[derive(Debug, Deserialize)]
struct HdrXml {
    #[serde(rename = "PlateReadDataHeader")]
    header: Option<PlateReadDataHeaderXml>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PlateReadDataHeaderXml {
    step: Option<u32>,
    cycle: Option<u32>,
    ch_count: Option<usize>,
    num_rows: Option<usize>,
    num_cols: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct DataXml {
    #[serde(rename = "PAr")]
    values: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CalibrationVectorXml {
    #[serde(rename = "calibration", default)]
    blocks: Vec<CalibrationXml>,
}

#[derive(Debug, Deserialize)]
struct CalibrationXml {
    #[serde(rename = "@tag")]
    tag: Option<String>,
    #[serde(rename = "@chCount")]
    channels: Option<String>,
    #[serde(rename = "@numRows")]
    rows: Option<String>,
    #[serde(rename = "@numCols")]
    columns: Option<String>,
    #[serde(rename = "PAr")]
    values: Option<String>,
}

/// The header written ahead of every plate read payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlateReadHeader {
    /// Step ordinal as numbered by the instrument
    pub step: u32,
    /// Run-relative sequence number
    pub sequence: u32,
    pub channels: usize,
    pub rows: usize,
    pub columns: usize,
}

/// A plate read as found in the document: its header and the still-packed numeric payload
#[derive(Debug, Clone, PartialEq)]
pub struct RawPlateRead {
    pub index: usize,
    pub header: PlateReadHeader,
    pub payload: String,
}

/// Everything the decoder pulls out of the experiment document
#[derive(Debug, Clone)]
pub struct ExperimentDocument {
    pub plate: PlateLayout,
    pub dyes: DyeChannelMap,
    pub steps: Vec<ProtocolStep>,
    pub reads: Vec<RawPlateRead>,
    pub calibrations: Vec<CalibrationBlock>,
}

fn required<T>(
    value: Option<T>,
    element: &'static str,
    attribute: &'static str,
) -> Result<T, SchemaError> {
    value.ok_or(SchemaError::MissingAttribute { element, attribute })
}

fn extract_plate(setup: PlateSetupXml) -> Result<(PlateLayout, DyeChannelMap), SchemaError> {
    let rows = required(setup.rows, "plateSetup2", "rows")?;
    let columns = required(setup.columns, "plateSetup2", "columns")?;
    let mut plate = PlateLayout::new(rows, columns)?;
    let mut dyes = DyeChannelMap::default();

    let layers = setup
        .dye_layers
        .ok_or(SchemaError::MissingElement("plateSetup2/dyeLayersList"))?
        .layers;
    for layer in layers {
        let name = required(layer.plate_name, "dyeLayer", "plateName")?;
        let dye = Dye::from_str(&name).unwrap_or_else(|never| match never {});
        if let Some(fluor) = layer.fluor {
            let position = required(fluor.channel_position, "fluor", "channelPosition")?;
            dyes.insert(dye, position)?;
        }

        for sample in layer
            .well_samples
            .map(|ws| ws.samples)
            .unwrap_or_default()
        {
            let index = sample.plate_index.unwrap_or(-1);
            let sample_type = SampleType::from_str(sample.sample_type.as_deref().unwrap_or(""))
                .unwrap_or_else(|never| match never {});
            plate.merge_sample(index, sample_type, sample.sample_id.as_deref())?;
        }
    }

    if plate.assigned_wells().is_empty() {
        return Err(SchemaError::NoAssignedWells);
    }
    Ok((plate, dyes))
}

fn extract_protocol(list: ProtocolListXml) -> Result<Vec<ProtocolStep>, SchemaError> {
    list.steps
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            let kind = match item {
                ProtocolItemXml::TemperatureStep(step) => StepKind::Temperature {
                    temperature: required(
                        step.temperature,
                        "TemperatureStep",
                        "temperatureStepTemp",
                    )?,
                    hold_seconds: step.hold_time.unwrap_or(0),
                    acquires: step.plate_read.is_some(),
                    increment: step
                        .increment
                        .and_then(|inc| inc.temperature_increment)
                        .filter(|inc| *inc != 0.0),
                },
                ProtocolItemXml::GotoStep(step) => StepKind::Goto {
                    target: required(step.target, "GotoStep", "optionGotoStep")?,
                    repeats: required(step.repeats, "GotoStep", "optionGotoCycle")?,
                },
            };
            Ok(ProtocolStep { index, kind })
        })
        .collect()
}

fn extract_read(index: usize, outer: PlateReadOuterXml) -> Result<RawPlateRead, SchemaError> {
    let missing = |field| SchemaError::MissingHeaderField {
        reading: index,
        field,
    };
    let read = outer.inner.ok_or_else(|| missing("PlateRead"))?;
    let header = read
        .header
        .and_then(|hdr| hdr.header)
        .ok_or_else(|| missing("Hdr/PlateReadDataHeader"))?;
    let payload = read
        .data
        .and_then(|data| data.values)
        .ok_or_else(|| missing("Data/PAr"))?;
    Ok(RawPlateRead {
        index,
        header: PlateReadHeader {
            step: header.step.ok_or_else(|| missing("Step"))?,
            sequence: header.cycle.ok_or_else(|| missing("Cycle"))?,
            channels: header.ch_count.ok_or_else(|| missing("ChCount"))?,
            rows: header.num_rows.ok_or_else(|| missing("NumRows"))?,
            columns: header.num_cols.ok_or_else(|| missing("NumCols"))?,
        },
        payload,
    })
}

/// Parse the experiment document into plate, dye, protocol and raw read data.
pub fn extract_document(bytes: &[u8]) -> Result<ExperimentDocument, SchemaError> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    let text = std::str::from_utf8(bytes)?;
    let experiment: ExperimentXml = quick_xml::de::from_str(text)?;

    let (plate, dyes) = extract_plate(
        experiment
            .plate_setup
            .ok_or(SchemaError::MissingElement("plateSetup2"))?,
    )?;

    let steps = extract_protocol(
        experiment
            .protocol
            .ok_or(SchemaError::MissingElement("protocol2BaseList"))?,
    )?;

    let run_data = experiment
        .run_data
        .ok_or(SchemaError::MissingElement("runData"))?;
    let reads = run_data
        .plate_reads
        .ok_or(SchemaError::MissingElement("runData/plateReadDataVector"))?
        .reads
        .into_iter()
        .enumerate()
        .map(|(index, read)| extract_read(index, read))
        .collect::<Result<Vec<_>, _>>()?;
    if reads.is_empty() {
        return Err(SchemaError::NoPlateReads);
    }

    let raw_calibrations: Vec<RawCalibration> = run_data
        .calibrations
        .map(|cv| cv.blocks)
        .unwrap_or_default()
        .into_iter()
        .map(|block| RawCalibration {
            tag: block.tag,
            channels: block.channels,
            rows: block.rows,
            columns: block.columns,
            payload: block.values,
        })
        .collect();
    let calibrations = decode_calibrations(&raw_calibrations);

    spdlog::info!(
        "Extracted document -- {} dyes, {} assigned wells, {} protocol steps, {} plate reads, {} calibration blocks",
        dyes.len(),
        plate.assigned_wells().len(),
        steps.len(),
        reads.len(),
        calibrations.len()
    );

    Ok(ExperimentDocument {
        plate,
        dyes,
        steps,
        reads,
        calibrations,
    })
}
