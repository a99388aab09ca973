// The plate setup lists one dye layer per dye with the optical channel it is read on.
// The instrument has more channels than any assay uses, so positions are neither
// contiguous nor fully populated:
// [dye label] -> channel position
// From that we pick the three roles the dataset cares about: reporter 1 (FAM),
// reporter 2 (HEX or VIC) and the optional passive reference (ROX).
use fxhash::FxHashMap;
use serde::Serialize;
use std::fmt::Display;
use std::str::FromStr;

use super::error::SchemaError;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum Dye {
    Fam,
    Hex,
    Vic,
    Rox,
    Other(String),
}

impl FromStr for Dye {
    type Err = std::convert::Infallible;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let label = s.trim();
        Ok(match label.to_ascii_uppercase().as_str() {
            "FAM" => Self::Fam,
            "HEX" => Self::Hex,
            "VIC" => Self::Vic,
            "ROX" => Self::Rox,
            _ => Self::Other(label.to_string()),
        })
    }
}

impl Display for Dye {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fam => write!(f, "FAM"),
            Self::Hex => write!(f, "HEX"),
            Self::Vic => write!(f, "VIC"),
            Self::Rox => write!(f, "ROX"),
            Self::Other(label) => write!(f, "{label}"),
        }
    }
}

/// A dye and the channel position it is read on
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DyeChannel {
    pub dye: Dye,
    pub channel: usize,
}

/// The dye roles used to build the well-level dataset
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DyeAssignment {
    pub reporter1: DyeChannel,
    pub reporter2: DyeChannel,
    pub passive_reference: Option<DyeChannel>,
}

impl DyeAssignment {
    /// Every channel the dataset will read, for bounds checking against a reading header
    pub fn channels(&self) -> impl Iterator<Item = &DyeChannel> {
        [Some(&self.reporter1), Some(&self.reporter2)]
            .into_iter()
            .chain(std::iter::once(self.passive_reference.as_ref()))
            .flatten()
    }

    pub fn has_passive_reference(&self) -> bool {
        self.passive_reference.is_some()
    }
}

/// DyeChannelMap contains the mapping of dye labels to instrument channel positions.
///
/// A dye may be listed more than once (once per layer it appears in), but it may only ever map to
/// one channel position.
#[derive(Debug, Clone, Default)]
pub struct DyeChannelMap {
    map: FxHashMap<Dye, usize>,
    order: Vec<Dye>,
}

impl DyeChannelMap {
    pub fn insert(&mut self, dye: Dye, position: i64) -> Result<(), SchemaError> {
        if position < 0 {
            return Err(SchemaError::BadChannelPosition {
                dye: dye.to_string(),
                position,
            });
        }
        let position = position as usize;
        match self.map.get(&dye) {
            Some(existing) if *existing != position => Err(SchemaError::DuplicateDye {
                dye: dye.to_string(),
                first: *existing,
                second: position,
            }),
            Some(_) => Ok(()),
            None => {
                self.order.push(dye.clone());
                self.map.insert(dye, position);
                Ok(())
            }
        }
    }

    /// Get the channel position for a dye.
    ///
    /// If returns None the dye was not part of the plate setup
    pub fn channel(&self, dye: &Dye) -> Option<usize> {
        self.map.get(dye).copied()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Dyes in the order they were declared
    pub fn dyes(&self) -> impl Iterator<Item = DyeChannel> + '_ {
        self.order.iter().map(|dye| DyeChannel {
            dye: dye.clone(),
            channel: self.map[dye],
        })
    }

    fn lookup(&self, dye: Dye) -> Option<DyeChannel> {
        self.channel(&dye).map(|channel| DyeChannel { dye, channel })
    }

    /// Resolve the reporter and passive reference roles. HEX is preferred over VIC when a
    /// plate somehow declares both.
    pub fn assignment(&self) -> Result<DyeAssignment, SchemaError> {
        let available = || self.order.iter().map(|d| d.to_string()).collect();
        let reporter1 = self
            .lookup(Dye::Fam)
            .ok_or_else(|| SchemaError::MissingReporter {
                role: "FAM",
                available: available(),
            })?;
        let reporter2 = self
            .lookup(Dye::Hex)
            .or_else(|| self.lookup(Dye::Vic))
            .ok_or_else(|| SchemaError::MissingReporter {
                role: "VIC or HEX",
                available: available(),
            })?;
        Ok(DyeAssignment {
            reporter1,
            reporter2,
            passive_reference: self.lookup(Dye::Rox),
        })
    }
}
