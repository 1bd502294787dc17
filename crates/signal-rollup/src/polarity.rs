//! Polarity and half-life per research object type

use serde::{Deserialize, Serialize};
use signal_core::{ObjectType, PipelineError};
use std::collections::BTreeMap;

/// Half-life used for types missing from the table
pub const FALLBACK_HALF_LIFE_DAYS: f64 = 60.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PolarityEntry {
    /// Signed base polarity in [-1, 1]
    pub polarity: f64,
    pub half_life_days: f64,
}

impl PolarityEntry {
    pub const fn new(polarity: f64, half_life_days: f64) -> Self {
        Self {
            polarity,
            half_life_days,
        }
    }
}

/// Static mapping of research object type to polarity and decay half-life.
///
/// Every research type must be listed. Risks are always -1.0, catalysts
/// +/-1.0 by their `positive` flag and theses `thesis_magnitude` signed by
/// side; for those three only the half-life is read from the table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolarityTable {
    pub entries: BTreeMap<ObjectType, PolarityEntry>,
    #[serde(default = "default_thesis_magnitude")]
    pub thesis_magnitude: f64,
}

fn default_thesis_magnitude() -> f64 {
    0.5
}

impl Default for PolarityTable {
    fn default() -> Self {
        let entries = BTreeMap::from([
            (ObjectType::CompanyProfile, PolarityEntry::new(0.2, 90.0)),
            (ObjectType::CompanyRisk, PolarityEntry::new(-1.0, 60.0)),
            (ObjectType::CompanyCatalyst, PolarityEntry::new(1.0, 20.0)),
            (ObjectType::CompanyThesis, PolarityEntry::new(0.0, 45.0)),
            (ObjectType::IndustryProfile, PolarityEntry::new(0.1, 60.0)),
            (ObjectType::IndustryPlayer, PolarityEntry::new(0.2, 45.0)),
        ]);
        Self {
            entries,
            thesis_magnitude: default_thesis_magnitude(),
        }
    }
}

impl PolarityTable {
    /// Load a table from JSON and validate it
    pub fn from_json(text: &str) -> Result<Self, PipelineError> {
        let table: Self = serde_json::from_str(text)?;
        table.validate()?;
        Ok(table)
    }

    /// Reject missing research types, non-finite or out-of-range polarities
    /// and non-positive half-lives
    pub fn validate(&self) -> Result<(), PipelineError> {
        let missing: Vec<&str> = ObjectType::RESEARCH
            .iter()
            .filter(|t| !self.entries.contains_key(t))
            .map(|t| t.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(PipelineError::Configuration(format!(
                "polarity table is missing {}",
                missing.join(", ")
            )));
        }
        for (object_type, entry) in &self.entries {
            if !entry.polarity.is_finite() || !(-1.0..=1.0).contains(&entry.polarity) {
                return Err(PipelineError::Configuration(format!(
                    "polarity for {object_type} must be a finite value in [-1, 1], got {}",
                    entry.polarity
                )));
            }
            if !entry.half_life_days.is_finite() || entry.half_life_days <= 0.0 {
                return Err(PipelineError::Configuration(format!(
                    "half-life for {object_type} must be positive, got {}",
                    entry.half_life_days
                )));
            }
        }
        if !self.thesis_magnitude.is_finite() || !(0.0..=1.0).contains(&self.thesis_magnitude) {
            return Err(PipelineError::Configuration(format!(
                "thesis magnitude must be in [0, 1], got {}",
                self.thesis_magnitude
            )));
        }
        Ok(())
    }

    pub fn polarity(&self, object_type: ObjectType) -> f64 {
        self.entries
            .get(&object_type)
            .map(|e| e.polarity)
            .unwrap_or(0.0)
    }

    pub fn half_life_days(&self, object_type: ObjectType) -> f64 {
        self.entries
            .get(&object_type)
            .map(|e| e.half_life_days)
            .unwrap_or(FALLBACK_HALF_LIFE_DAYS)
    }

    /// `0.5^(age_days / half_life)`
    pub fn decay(&self, object_type: ObjectType, age_days: i64) -> f64 {
        0.5f64.powf(age_days as f64 / self.half_life_days(object_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table_is_valid() {
        let table = PolarityTable::default();
        assert!(table.validate().is_ok());
        assert_eq!(table.polarity(ObjectType::CompanyRisk), -1.0);
        assert_eq!(table.half_life_days(ObjectType::CompanyCatalyst), 20.0);
        assert_eq!(table.half_life_days(ObjectType::NewsChunk), FALLBACK_HALF_LIFE_DAYS);
    }

    #[test]
    fn test_decay_at_zero_is_one() {
        let table = PolarityTable::default();
        for t in ObjectType::RESEARCH {
            assert_eq!(table.decay(t, 0), 1.0);
        }
    }

    #[test]
    fn test_decay_halves_at_half_life() {
        let table = PolarityTable::default();
        assert!((table.decay(ObjectType::CompanyCatalyst, 20) - 0.5).abs() < 1e-12);
        assert!((table.decay(ObjectType::CompanyProfile, 180) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_decay_is_monotone_non_increasing() {
        let table = PolarityTable::default();
        for t in ObjectType::RESEARCH {
            let mut prev = table.decay(t, 0);
            for age in 1..400 {
                let d = table.decay(t, age);
                assert!(d <= prev);
                assert!(d > 0.0);
                prev = d;
            }
        }
    }

    #[test]
    fn test_validate_rejects_bad_entries() {
        let mut table = PolarityTable::default();
        table
            .entries
            .insert(ObjectType::CompanyRisk, PolarityEntry::new(-1.5, 60.0));
        assert!(table.validate().unwrap_err().is_fatal());

        let mut table = PolarityTable::default();
        table
            .entries
            .insert(ObjectType::CompanyRisk, PolarityEntry::new(f64::NAN, 60.0));
        assert!(table.validate().is_err());

        let mut table = PolarityTable::default();
        table
            .entries
            .insert(ObjectType::IndustryProfile, PolarityEntry::new(0.1, 0.0));
        assert!(table.validate().is_err());
    }

    #[test]
    fn test_from_json() {
        let json = r#"{
            "entries": {
                "company_profile": {"polarity": 0.3, "half_life_days": 120},
                "company_risk": {"polarity": -0.8, "half_life_days": 30},
                "company_catalyst": {"polarity": 1.0, "half_life_days": 10},
                "company_thesis": {"polarity": 0.0, "half_life_days": 45},
                "industry_profile": {"polarity": 0.1, "half_life_days": 60},
                "industry_player": {"polarity": 0.2, "half_life_days": 45}
            }
        }"#;
        let table = PolarityTable::from_json(json).unwrap();
        assert_eq!(table.polarity(ObjectType::CompanyProfile), 0.3);
        assert_eq!(table.half_life_days(ObjectType::CompanyRisk), 30.0);
        assert_eq!(table.thesis_magnitude, 0.5);

        let bad = json.replace("-0.8", "-3");
        assert!(PolarityTable::from_json(&bad).is_err());
    }

    #[test]
    fn test_partial_table_is_rejected() {
        let json = r#"{"entries": {"company_risk": {"polarity": -1.0, "half_life_days": 60}}}"#;
        let err = PolarityTable::from_json(json).unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("company_catalyst"));

        let mut table = PolarityTable::default();
        table.entries.remove(&ObjectType::IndustryPlayer);
        assert!(table.validate().is_err());
    }
}
