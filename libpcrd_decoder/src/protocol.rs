use fxhash::FxHashMap;
use serde::Serialize;

use super::document::PlateReadHeader;
use super::error::ProtocolError;

/// What a protocol step does when the thermal program reaches it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum StepKind {
    /// Ramp to and hold a temperature, optionally taking a plate read at the end of the hold.
    /// `increment` is the signed change applied on every further execution (touchdown).
    Temperature {
        temperature: f64,
        hold_seconds: u32,
        acquires: bool,
        increment: Option<f64>,
    },
    /// Jump back to `target` and run the steps up to this one `repeats` more times
    Goto { target: usize, repeats: u32 },
}

/// A raw protocol step. `index` is the 0-based position in the declared step list, which is
/// also what goto targets refer to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProtocolStep {
    pub index: usize,
    pub kind: StepKind,
}

impl ProtocolStep {
    pub fn acquires(&self) -> bool {
        matches!(self.kind, StepKind::Temperature { acquires: true, .. })
    }
}

/// One full plate read, placed in the resolved protocol
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AcquisitionEvent {
    /// Index of the step that took the read
    pub step: usize,
    /// 1-based, strictly increasing over the whole run
    pub cycle: u32,
    /// Instantaneous step temperature, touchdown increments applied
    pub temperature: f64,
}

/// Check that every goto points backwards and that loop regions either nest or follow each other.
///
/// The region of a goto at index `i` with target `t` is `[t, i]` (the goto itself included).
/// Two regions are fine if one contains the other or if they are disjoint; anything else
/// would be an interleaved loop which we refuse to guess at.
pub fn validate_loops(steps: &[ProtocolStep]) -> Result<(), ProtocolError> {
    let mut regions: Vec<(usize, usize)> = Vec::new(); // (target, goto index)
    for step in steps {
        if let StepKind::Goto { target, .. } = step.kind {
            if target >= step.index {
                return Err(ProtocolError::BadGotoTarget {
                    step: step.index,
                    target,
                });
            }
            for (inner_target, inner) in regions.iter() {
                // inner closes before this goto; overlap if it starts before our target but
                // ends inside our region
                if *inner_target < target && target <= *inner {
                    return Err(ProtocolError::OverlappingLoops {
                        inner: *inner,
                        inner_target: *inner_target,
                        outer: step.index,
                        outer_target: target,
                    });
                }
            }
            regions.push((target, step.index));
        }
    }
    Ok(())
}

/// Walk the step list as the instrument would, calling `visit` for every executed temperature
/// step together with the number of times that step has already run. An error from `visit`
/// stops the walk.
///
/// Loops are replayed by index: each goto keeps a remaining-repeat counter which is armed on first
/// arrival and cleared once it runs out, so an inner loop starts fresh on every pass of its outer loop.
fn replay<F>(steps: &[ProtocolStep], mut visit: F) -> Result<(), ProtocolError>
where
    F: FnMut(&ProtocolStep, u32) -> Result<(), ProtocolError>,
{
    validate_loops(steps)?;

    let mut remaining: Vec<Option<u32>> = vec![None; steps.len()];
    let mut visits: Vec<u32> = vec![0; steps.len()];
    let mut pc = 0;
    while let Some(step) = steps.get(pc) {
        match step.kind {
            StepKind::Temperature { .. } => {
                visit(step, visits[pc])?;
                visits[pc] = visits[pc].saturating_add(1);
                pc += 1;
            }
            StepKind::Goto { target, repeats } => {
                let left = remaining[pc].get_or_insert(repeats);
                if *left > 0 {
                    *left -= 1;
                    pc = target;
                } else {
                    remaining[pc] = None;
                    pc += 1;
                }
            }
        }
    }
    Ok(())
}

/// Expand the loop structure of the protocol into the ordered sequence of acquisition events.
///
/// `max_events` is the number of plate reads the document holds. Expansion stops with
/// `EventCountMismatch` as soon as the protocol produces more events than that.
pub fn resolve_protocol(
    steps: &[ProtocolStep],
    max_events: usize,
) -> Result<Vec<AcquisitionEvent>, ProtocolError> {
    let mut events: Vec<AcquisitionEvent> = Vec::new();
    let mut cycle: u32 = 0;
    replay(steps, |step, visit| {
        if let StepKind::Temperature {
            temperature,
            acquires: true,
            increment,
            ..
        } = step.kind
        {
            let overrun = || ProtocolError::EventCountMismatch {
                resolved: events.len() + 1,
                reads: max_events,
            };
            if events.len() >= max_events {
                return Err(overrun());
            }
            cycle = cycle.checked_add(1).ok_or_else(overrun)?;
            events.push(AcquisitionEvent {
                step: step.index,
                cycle,
                temperature: temperature + increment.unwrap_or(0.0) * visit as f64,
            });
        }
        Ok(())
    })?;

    if events.is_empty() {
        return Err(ProtocolError::NoAcquisitions);
    }
    spdlog::debug!(
        "Resolved {} steps into {} acquisition events",
        steps.len(),
        events.len()
    );
    Ok(events)
}

/// Pair the resolved events with the plate reads found in the document.
///
/// The counts must agree, and the step numbers written in the read headers must map onto the
/// resolved step indices one-to-one. The header numbering convention is not assumed, only that
/// it is consistent.
pub fn check_against_reads(
    events: &[AcquisitionEvent],
    headers: &[&PlateReadHeader],
) -> Result<(), ProtocolError> {
    if events.len() != headers.len() {
        return Err(ProtocolError::EventCountMismatch {
            resolved: events.len(),
            reads: headers.len(),
        });
    }

    let mut by_event_step: FxHashMap<usize, u32> = FxHashMap::default();
    let mut by_header_step: FxHashMap<u32, usize> = FxHashMap::default();
    for (reading, (event, header)) in events.iter().zip(headers.iter()).enumerate() {
        let paired_header = *by_event_step.entry(event.step).or_insert(header.step);
        let paired_event = *by_header_step.entry(header.step).or_insert(event.step);
        if paired_header != header.step || paired_event != event.step {
            return Err(ProtocolError::StepMismatch {
                reading,
                header_step: header.step,
                event_step: event.step,
                paired_step: paired_header,
            });
        }
    }
    Ok(())
}

/// Display metadata for one temperature step of the protocol
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProtocolStepSummary {
    /// 1-based, counting temperature steps only
    pub step: usize,
    pub temperature: f64,
    pub hold_seconds: u32,
    /// Number of times the step runs once loops are expanded
    pub cycles: u32,
    pub label: String,
}

fn step_label(
    temperature: f64,
    acquires: bool,
    increment: Option<f64>,
    cycles: u32,
    first_half: bool,
) -> String {
    let label = if temperature <= 32.0 && acquires {
        if first_half {
            "Pre-Read"
        } else {
            "Post-Read"
        }
    } else if temperature >= 90.0 {
        if cycles == 1 {
            "Initial Denaturation"
        } else {
            "Denaturation"
        }
    } else if acquires {
        "Data Collection"
    } else if let Some(inc) = increment.filter(|inc| *inc != 0.0) {
        return format!("Annealing (TD {inc:+.1}/cyc)");
    } else if cycles > 1 {
        if temperature >= 85.0 {
            "Denaturation"
        } else {
            "Annealing"
        }
    } else {
        "Hold"
    };
    label.to_string()
}

/// Summarize the temperature steps with their expanded execution counts and a readable label
pub fn summarize_protocol(
    steps: &[ProtocolStep],
) -> Result<Vec<ProtocolStepSummary>, ProtocolError> {
    let mut executions: Vec<u32> = vec![0; steps.len()];
    replay(steps, |step, _| {
        executions[step.index] = executions[step.index].saturating_add(1);
        Ok(())
    })?;

    let mut summary = Vec::new();
    for step in steps {
        if let StepKind::Temperature {
            temperature,
            hold_seconds,
            acquires,
            increment,
        } = step.kind
        {
            let cycles = executions[step.index];
            summary.push(ProtocolStepSummary {
                step: summary.len() + 1,
                temperature,
                hold_seconds,
                cycles,
                label: step_label(
                    temperature,
                    acquires,
                    increment,
                    cycles,
                    step.index < steps.len() / 2,
                ),
            });
        }
    }
    Ok(summary)
}
