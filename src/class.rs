use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Controlled land-cover vocabulary shared by every epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassLabel {
    Agriculture,
    SholaForest,
    SholaGrassland,
    Settlements,
    Plantations,
    TeaPlantations,
    TimberPlantations,
    WaterBodies,
    Swamps,
    Roads,
    NoData,
}

impl ClassLabel {
    pub const ALL: [ClassLabel; 11] = [
        ClassLabel::Agriculture,
        ClassLabel::SholaForest,
        ClassLabel::SholaGrassland,
        ClassLabel::Settlements,
        ClassLabel::Plantations,
        ClassLabel::TeaPlantations,
        ClassLabel::TimberPlantations,
        ClassLabel::WaterBodies,
        ClassLabel::Swamps,
        ClassLabel::Roads,
        ClassLabel::NoData,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ClassLabel::Agriculture => "agriculture",
            ClassLabel::SholaForest => "shola_forest",
            ClassLabel::SholaGrassland => "shola_grassland",
            ClassLabel::Settlements => "settlements",
            ClassLabel::Plantations => "plantations",
            ClassLabel::TeaPlantations => "tea_plantations",
            ClassLabel::TimberPlantations => "timber_plantations",
            ClassLabel::WaterBodies => "water_bodies",
            ClassLabel::Swamps => "swamps",
            ClassLabel::Roads => "roads",
            ClassLabel::NoData => "no_data",
        }
    }
}

impl fmt::Display for ClassLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownLabel(pub String);

impl fmt::Display for UnknownLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown class label `{}`", self.0)
    }
}

impl std::error::Error for UnknownLabel {}

impl FromStr for ClassLabel {
    type Err = UnknownLabel;

    /// Case-insensitive; spaces and hyphens are read as underscores.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        ClassLabel::ALL
            .into_iter()
            .find(|label| label.as_str() == normalized)
            .ok_or_else(|| UnknownLabel(s.to_string()))
    }
}

/// Declarative label-to-label reclassification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemapTable(BTreeMap<ClassLabel, ClassLabel>);

impl RemapTable {
    pub fn new<I: IntoIterator<Item = (ClassLabel, ClassLabel)>>(pairs: I) -> Self {
        Self(pairs.into_iter().collect())
    }

    /// Swamps were mapped separately in 1848 but belong to the grassland class.
    pub fn historical() -> Self {
        Self::new([(ClassLabel::Swamps, ClassLabel::SholaGrassland)])
    }

    /// Tea and timber plantations are reported as a single plantation class.
    pub fn plantations() -> Self {
        Self::new([
            (ClassLabel::TeaPlantations, ClassLabel::Plantations),
            (ClassLabel::TimberPlantations, ClassLabel::Plantations),
        ])
    }

    pub fn apply(&self, label: ClassLabel) -> ClassLabel {
        self.0.get(&label).copied().unwrap_or(label)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_parse_loosely() {
        assert_eq!("Shola Forest".parse::<ClassLabel>(), Ok(ClassLabel::SholaForest));
        assert_eq!("water-bodies".parse::<ClassLabel>(), Ok(ClassLabel::WaterBodies));
        assert_eq!(" swamps ".parse::<ClassLabel>(), Ok(ClassLabel::Swamps));
        assert!("marsh".parse::<ClassLabel>().is_err());
    }

    #[test]
    fn display_matches_serde_name() {
        for label in ClassLabel::ALL {
            let json = serde_json::to_string(&label).unwrap();
            assert_eq!(json, format!("\"{label}\""));
        }
    }

    #[test]
    fn remap_leaves_unlisted_labels_alone() {
        let remap = RemapTable::historical();
        assert_eq!(remap.apply(ClassLabel::Swamps), ClassLabel::SholaGrassland);
        assert_eq!(remap.apply(ClassLabel::Agriculture), ClassLabel::Agriculture);
    }

    #[test]
    fn remap_table_serializes_as_a_map() {
        let json = serde_json::to_string(&RemapTable::historical()).unwrap();
        assert_eq!(json, r#"{"swamps":"shola_grassland"}"#);
        let back: RemapTable = serde_json::from_str(&json).unwrap();
        assert_eq!(back, RemapTable::historical());
    }
}
