use super::{RasterError, NODATA};
use crate::class::ClassLabel;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LegendEntry {
    pub code: u8,
    pub label: ClassLabel,
}

/// Value-to-label lookup attached to a categorical grid. Codes and labels
/// are both unique and code 0 is reserved for no data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<LegendEntry>", into = "Vec<LegendEntry>")]
pub struct Legend {
    entries: BTreeMap<u8, ClassLabel>,
}

impl Legend {
    pub fn new<I: IntoIterator<Item = (u8, ClassLabel)>>(entries: I) -> Result<Self, RasterError> {
        let mut map = BTreeMap::new();
        for (code, label) in entries {
            if code == NODATA {
                return Err(RasterError::InvalidLegend(format!(
                    "code {NODATA} is reserved for no data ({label})"
                )));
            }
            if map.values().any(|existing| *existing == label) {
                return Err(RasterError::InvalidLegend(format!("label {label} listed twice")));
            }
            if map.insert(code, label).is_some() {
                return Err(RasterError::InvalidLegend(format!("code {code} listed twice")));
            }
        }
        Ok(Self { entries: map })
    }

    /// Codes of the 2018 supervised classification.
    pub fn classification() -> Self {
        Self {
            entries: BTreeMap::from([
                (1, ClassLabel::Agriculture),
                (2, ClassLabel::SholaForest),
                (3, ClassLabel::SholaGrassland),
                (4, ClassLabel::Settlements),
                (5, ClassLabel::Plantations),
                (6, ClassLabel::WaterBodies),
                (7, ClassLabel::NoData),
            ]),
        }
    }

    pub fn label(&self, code: u8) -> Option<ClassLabel> {
        self.entries.get(&code).copied()
    }

    pub fn code(&self, label: ClassLabel) -> Option<u8> {
        self.entries
            .iter()
            .find(|(_, l)| **l == label)
            .map(|(code, _)| *code)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u8, ClassLabel)> + '_ {
        self.entries.iter().map(|(code, label)| (*code, *label))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl TryFrom<Vec<LegendEntry>> for Legend {
    type Error = RasterError;

    fn try_from(entries: Vec<LegendEntry>) -> Result<Self, Self::Error> {
        Legend::new(entries.into_iter().map(|e| (e.code, e.label)))
    }
}

impl From<Legend> for Vec<LegendEntry> {
    fn from(legend: Legend) -> Self {
        legend
            .iter()
            .map(|(code, label)| LegendEntry { code, label })
            .collect()
    }
}
