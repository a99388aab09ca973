use serde::{Deserialize, Serialize};

use super::baseline::normalize_baseline;
use super::container::open_container;
use super::dataset::{build_records, Dataset};
use super::document::{extract_document, ExperimentDocument, PlateReadHeader};
use super::error::DecodeError;
use super::layout::{decode_plate_read, parse_tokens, PlateReadData};
use super::protocol::{check_against_reads, resolve_protocol, summarize_protocol};
use super::window::{classify_windows, WindowKind};

/// Knobs of the decode that are not part of the file itself
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodeOptions {
    /// Fail instead of warning when the window classification has to guess
    pub strict_windows: bool,
    /// Emit records for wells with no sample assigned
    pub include_unassigned_wells: bool,
}

/// Decode the raw bytes of an instrument archive into a dataset.
///
/// This is a pure function of its inputs. It either produces the whole dataset or fails with the
/// first error encountered.
pub fn decode_archive(
    bytes: &[u8],
    secret: &str,
    options: &DecodeOptions,
) -> Result<Dataset, DecodeError> {
    let document = open_container(bytes, secret)?;
    decode_document(&document, options)
}

/// Decode an already unpacked experiment document
pub fn decode_document(document: &[u8], options: &DecodeOptions) -> Result<Dataset, DecodeError> {
    let ExperimentDocument {
        plate,
        dyes,
        steps,
        reads,
        calibrations,
    } = extract_document(document)?;
    let assignment = dyes.assignment()?;
    spdlog::info!(
        "Reporter 1: {}, reporter 2: {}, passive reference: {}",
        assignment.reporter1.dye,
        assignment.reporter2.dye,
        assignment
            .passive_reference
            .as_ref()
            .map(|p| p.dye.to_string())
            .unwrap_or_else(|| String::from("none"))
    );

    let events = resolve_protocol(&steps, reads.len())?;
    let headers: Vec<&PlateReadHeader> = reads.iter().map(|r| &r.header).collect();
    check_against_reads(&events, &headers)?;
    let protocol = summarize_protocol(&steps)?;

    let mut decoded: Vec<PlateReadData> = Vec::with_capacity(reads.len());
    for read in reads.iter() {
        let tokens = parse_tokens(&read.payload, read.index)?;
        let data = decode_plate_read(read.index, &read.header, tokens)?;
        data.check_coverage(&plate, &assignment)?;
        decoded.push(data);
    }

    let classification = classify_windows(&events, options.strict_windows)?;
    let mut records = build_records(
        &plate,
        &assignment,
        &events,
        &decoded,
        options.include_unassigned_wells,
    );
    if let Some(window) = classification.window(WindowKind::Amplification) {
        normalize_baseline(&mut records, window);
    }

    spdlog::info!(
        "Decoded {} acquisition events into {} well-cycle records across {} windows",
        events.len(),
        records.len(),
        classification.windows.len()
    );

    Ok(Dataset::new(
        plate,
        assignment,
        protocol,
        events,
        classification,
        records,
        calibrations,
        decoded,
    ))
}
