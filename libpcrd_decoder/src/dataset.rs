use serde::Serialize;
use std::collections::BTreeMap;

use super::calibration::CalibrationBlock;
use super::constants::INSTRUMENT_LABEL;
use super::dye_map::DyeAssignment;
use super::layout::PlateReadData;
use super::plate::{PlateLayout, SampleType, WellPosition};
use super::protocol::{AcquisitionEvent, ProtocolStepSummary};
use super::window::{ClassificationWarning, DataWindow, WindowClassification, WindowKind};

/// The final unit of output: one well at one cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WellCycleRecord {
    pub well: WellPosition,
    pub cycle: u32,
    pub reporter1: f64,
    pub reporter2: f64,
    pub passive: Option<f64>,
}

/// Pull the dye channels of every plate well out of the decoded reads.
///
/// Reads are paired with events by position. Only plate wells are visited, so the reference
/// detector row the reads carry is never emitted. Records come out sorted by cycle, then well.
pub fn build_records(
    plate: &PlateLayout,
    dyes: &DyeAssignment,
    events: &[AcquisitionEvent],
    reads: &[PlateReadData],
    include_unassigned: bool,
) -> Vec<WellCycleRecord> {
    let assigned = plate.assigned_wells();
    let wells: Vec<usize> = (0..plate.well_count())
        .filter(|idx| include_unassigned || assigned.contains(*idx))
        .collect();

    let mut records: Vec<WellCycleRecord> = Vec::with_capacity(wells.len() * events.len());
    for (event, read) in events.iter().zip(reads.iter()) {
        for index in wells.iter() {
            let well = plate.position(*index);
            let position = well.index(read.header.columns);
            let (Some(reporter1), Some(reporter2)) = (
                read.mean(dyes.reporter1.channel, position),
                read.mean(dyes.reporter2.channel, position),
            ) else {
                continue;
            };
            records.push(WellCycleRecord {
                well,
                cycle: event.cycle,
                reporter1,
                reporter2,
                passive: dyes
                    .passive_reference
                    .as_ref()
                    .and_then(|p| read.mean(p.channel, position)),
            });
        }
    }
    records.sort_by_key(|r| (r.cycle, r.well));
    records
}

/// Dataset is the decoded content of one instrument file.
///
/// It is frozen once built: consumers get read-only views and never mutate the records.
#[derive(Debug, Clone, Serialize)]
pub struct Dataset {
    instrument: String,
    plate: PlateLayout,
    dyes: DyeAssignment,
    protocol: Vec<ProtocolStepSummary>,
    events: Vec<AcquisitionEvent>,
    windows: Vec<DataWindow>,
    warnings: Vec<ClassificationWarning>,
    records: Vec<WellCycleRecord>,
    calibrations: Vec<CalibrationBlock>,
    #[serde(skip)]
    reads: Vec<PlateReadData>,
}

impl Dataset {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        plate: PlateLayout,
        dyes: DyeAssignment,
        protocol: Vec<ProtocolStepSummary>,
        events: Vec<AcquisitionEvent>,
        classification: WindowClassification,
        records: Vec<WellCycleRecord>,
        calibrations: Vec<CalibrationBlock>,
        reads: Vec<PlateReadData>,
    ) -> Self {
        Self {
            instrument: INSTRUMENT_LABEL.to_string(),
            plate,
            dyes,
            protocol,
            events,
            windows: classification.windows,
            warnings: classification.warnings,
            records,
            calibrations,
            reads,
        }
    }

    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    pub fn plate(&self) -> &PlateLayout {
        &self.plate
    }

    pub fn dyes(&self) -> &DyeAssignment {
        &self.dyes
    }

    pub fn protocol(&self) -> &[ProtocolStepSummary] {
        &self.protocol
    }

    pub fn events(&self) -> &[AcquisitionEvent] {
        &self.events
    }

    pub fn windows(&self) -> &[DataWindow] {
        &self.windows
    }

    pub fn warnings(&self) -> &[ClassificationWarning] {
        &self.warnings
    }

    pub fn records(&self) -> &[WellCycleRecord] {
        &self.records
    }

    pub fn calibrations(&self) -> &[CalibrationBlock] {
        &self.calibrations
    }

    /// The decoded plate reads with all four statistics, reference row included
    pub fn reads(&self) -> &[PlateReadData] {
        &self.reads
    }

    /// Sorted ids of the wells that have records
    pub fn wells(&self) -> Vec<WellPosition> {
        let mut wells: Vec<WellPosition> = self.records.iter().map(|r| r.well).collect();
        wells.sort();
        wells.dedup();
        wells
    }

    pub fn cycles(&self) -> Vec<u32> {
        self.events.iter().map(|e| e.cycle).collect()
    }

    pub fn sample_names(&self) -> BTreeMap<WellPosition, String> {
        self.plate.sample_names()
    }

    pub fn ntc_wells(&self) -> Vec<WellPosition> {
        self.plate.wells_of_type(&SampleType::NoTemplateControl)
    }

    pub fn window(&self, kind: WindowKind) -> Option<&DataWindow> {
        self.windows.iter().find(|w| w.kind == kind)
    }

    pub fn amplification_window(&self) -> Option<&DataWindow> {
        self.window(WindowKind::Amplification)
    }

    pub fn records_in<'a>(
        &'a self,
        window: &'a DataWindow,
    ) -> impl Iterator<Item = &'a WellCycleRecord> + 'a {
        self.records.iter().filter(|r| window.contains(r.cycle))
    }
}
