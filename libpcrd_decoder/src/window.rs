use serde::Serialize;
use std::fmt::Display;

use super::error::ProtocolError;
use super::protocol::AcquisitionEvent;

/// The analysis windows a run is divided into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum WindowKind {
    PreRead,
    Amplification,
    PostRead,
}

impl Display for WindowKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PreRead => write!(f, "Pre-read"),
            Self::Amplification => write!(f, "Amplification"),
            Self::PostRead => write!(f, "Post-read"),
        }
    }
}

/// A named, inclusive range of cycles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DataWindow {
    pub kind: WindowKind,
    pub start_cycle: u32,
    pub end_cycle: u32,
}

impl DataWindow {
    pub fn contains(&self, cycle: u32) -> bool {
        self.start_cycle <= cycle && cycle <= self.end_cycle
    }
}

/// The acquisition events that came from one protocol step
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepGroup {
    pub step: usize,
    pub count: usize,
    pub first_cycle: u32,
    pub last_cycle: u32,
}

/// Something the classifier had to decide without the data telling it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ClassificationWarning {
    /// More than one step shares the largest event count; the earliest was taken
    AmbiguousAmplification { steps: Vec<usize>, count: usize },
    /// A step group that fits none of the windows
    Unclassified {
        step: usize,
        count: usize,
        first_cycle: u32,
        last_cycle: u32,
    },
}

impl Display for ClassificationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AmbiguousAmplification { steps, count } => write!(
                f,
                "steps {steps:?} all have {count} acquisitions; step {} taken as amplification",
                steps.first().copied().unwrap_or_default()
            ),
            Self::Unclassified {
                step,
                count,
                first_cycle,
                last_cycle,
            } => write!(
                f,
                "step {step} ({count} acquisitions, cycles {first_cycle}-{last_cycle}) fits no window"
            ),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WindowClassification {
    /// In cycle order
    pub windows: Vec<DataWindow>,
    pub warnings: Vec<ClassificationWarning>,
}

impl WindowClassification {
    pub fn window(&self, kind: WindowKind) -> Option<&DataWindow> {
        self.windows.iter().find(|w| w.kind == kind)
    }
}

/// Group events by originating step, in order of first appearance
pub fn group_by_step(events: &[AcquisitionEvent]) -> Vec<StepGroup> {
    let mut groups: Vec<StepGroup> = Vec::new();
    for event in events {
        match groups.iter_mut().find(|g| g.step == event.step) {
            Some(group) => {
                group.count += 1;
                group.first_cycle = group.first_cycle.min(event.cycle);
                group.last_cycle = group.last_cycle.max(event.cycle);
            }
            None => groups.push(StepGroup {
                step: event.step,
                count: 1,
                first_cycle: event.cycle,
                last_cycle: event.cycle,
            }),
        }
    }
    groups
}

fn window_of(kind: WindowKind, group: &StepGroup) -> DataWindow {
    DataWindow {
        kind,
        start_cycle: group.first_cycle,
        end_cycle: group.last_cycle,
    }
}

/// Label the step groups of a run as pre-read, amplification and post-read.
///
/// The largest group is amplification. The earliest singleton group ending before it is the
/// pre-read and the latest singleton group starting after it is the post-read. Every other
/// group is left unclassified. Anything decided without support from the data is reported as a
/// warning, or as an error when `strict` is set.
pub fn classify_windows(
    events: &[AcquisitionEvent],
    strict: bool,
) -> Result<WindowClassification, ProtocolError> {
    let groups = group_by_step(events);
    let largest = groups
        .iter()
        .map(|g| g.count)
        .max()
        .ok_or(ProtocolError::NoAcquisitions)?;

    let mut warnings: Vec<ClassificationWarning> = Vec::new();
    let tied: Vec<&StepGroup> = groups.iter().filter(|g| g.count == largest).collect();
    // groups are in first-appearance order, so the first tied group is the earliest
    let amplification = tied[0];
    if tied.len() > 1 {
        warnings.push(ClassificationWarning::AmbiguousAmplification {
            steps: tied.iter().map(|g| g.step).collect(),
            count: largest,
        });
    }

    let pre_read = groups
        .iter()
        .find(|g| g.count == 1 && g.last_cycle < amplification.first_cycle);
    let post_read = groups
        .iter()
        .rev()
        .find(|g| g.count == 1 && g.first_cycle > amplification.last_cycle);

    let mut windows: Vec<DataWindow> = Vec::new();
    for group in groups.iter() {
        if std::ptr::eq(group, amplification) {
            windows.push(window_of(WindowKind::Amplification, group));
        } else if pre_read.is_some_and(|g| std::ptr::eq(g, group)) {
            windows.push(window_of(WindowKind::PreRead, group));
        } else if post_read.is_some_and(|g| std::ptr::eq(g, group)) {
            windows.push(window_of(WindowKind::PostRead, group));
        } else {
            warnings.push(ClassificationWarning::Unclassified {
                step: group.step,
                count: group.count,
                first_cycle: group.first_cycle,
                last_cycle: group.last_cycle,
            });
        }
    }
    windows.sort_by_key(|w| w.start_cycle);

    for warning in warnings.iter() {
        spdlog::warn!("Window classification: {warning}");
    }
    if strict && !warnings.is_empty() {
        let reasons: Vec<String> = warnings.iter().map(|w| w.to_string()).collect();
        return Err(ProtocolError::AmbiguousWindows(reasons.join("; ")));
    }

    Ok(WindowClassification { windows, warnings })
}
