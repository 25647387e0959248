//! Stage catalogue for the drawing analysis pipeline.
//!
//! The pipeline always runs the same ten stages in the same order. This module
//! owns everything static about them:
//! - `StepNumber` - a validated stage index (1..=10)
//! - `StepSpec` - name, declared dependencies, and review metadata per stage
//! - `STEP_SPECS` - the fixed table, indexed by `StepNumber::index`
//!
//! Stage implementations live behind the [`StepContract`] trait and are held in
//! a [`StepTable`].

pub mod command;
pub mod contract;
pub mod table;

pub use command::{CommandStep, StageDefinition};
pub use contract::{StepContract, StepInputs, StepOutcome};
pub use table::{StepTable, StepTableBuilder};

use serde::{Deserialize, Serialize};

/// Number of stages in the pipeline.
pub const STEP_COUNT: u8 = 10;

/// A stage number in `1..=10`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct StepNumber(u8);

impl StepNumber {
    pub const FIRST: StepNumber = StepNumber(1);
    pub const LAST: StepNumber = StepNumber(STEP_COUNT);
    /// Intent validation gate.
    pub const INTENT_GATE: StepNumber = StepNumber(4);
    /// First stage behind the intent gate.
    pub const ENTITY_EXTRACTION: StepNumber = StepNumber(5);
    /// Component extraction gate.
    pub const COMPONENT_GATE: StepNumber = StepNumber(9);

    /// Create a step number, returning `None` outside `1..=10`.
    pub fn new(n: u8) -> Option<Self> {
        (1..=STEP_COUNT).contains(&n).then_some(Self(n))
    }

    /// All ten stages in execution order.
    pub fn all() -> impl Iterator<Item = StepNumber> {
        (1..=STEP_COUNT).map(StepNumber)
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// Zero-based index into [`STEP_SPECS`].
    pub fn index(self) -> usize {
        usize::from(self.0 - 1)
    }

    /// The following stage, or `None` after stage 10.
    pub fn next(self) -> Option<StepNumber> {
        Self::new(self.0 + 1)
    }

    /// Stages strictly before this one.
    pub fn predecessors(self) -> impl Iterator<Item = StepNumber> {
        (1..self.0).map(StepNumber)
    }

    pub fn spec(self) -> &'static StepSpec {
        &STEP_SPECS[self.index()]
    }

    pub fn name(self) -> &'static str {
        self.spec().name
    }

    /// Whether this stage is one of the two gate stages (4 and 9).
    pub fn is_gate(self) -> bool {
        self == Self::INTENT_GATE || self == Self::COMPONENT_GATE
    }
}

impl TryFrom<u8> for StepNumber {
    type Error = String;

    fn try_from(n: u8) -> Result<Self, Self::Error> {
        Self::new(n).ok_or_else(|| format!("Invalid step number {}: expected 1-{}", n, STEP_COUNT))
    }
}

impl From<StepNumber> for u8 {
    fn from(step: StepNumber) -> u8 {
        step.0
    }
}

impl std::fmt::Display for StepNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for StepNumber {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let n: u8 = s
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid step number '{}'", s))?;
        StepNumber::try_from(n).map_err(anyhow::Error::msg)
    }
}

/// Which earlier stage outputs a stage consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dependencies {
    /// An explicit list of stage numbers.
    Steps(&'static [u8]),
    /// Every earlier stage that has a result.
    AllPrior,
}

/// Static description of one stage.
#[derive(Debug)]
pub struct StepSpec {
    pub number: u8,
    pub name: &'static str,
    /// Stable key used in persistence exports.
    pub export_key: &'static str,
    pub depends_on: Dependencies,
    /// Whether the stage receives the raw drawing input.
    pub uses_input: bool,
    /// Whether the stage receives the requested analysis purposes.
    pub uses_purposes: bool,
    /// Data fields a reviewer is expected to edit.
    pub editable_fields: &'static [&'static str],
    pub help_text: &'static str,
}

impl StepSpec {
    /// The declared dependency stages, resolved against `step`.
    pub fn dependencies(&self) -> Vec<StepNumber> {
        match self.depends_on {
            Dependencies::Steps(steps) => steps.iter().filter_map(|n| StepNumber::new(*n)).collect(),
            Dependencies::AllPrior => StepNumber(self.number).predecessors().collect(),
        }
    }
}

pub static STEP_SPECS: [StepSpec; STEP_COUNT as usize] = [
    StepSpec {
        number: 1,
        name: "Drawing Context Analysis",
        export_key: "context",
        depends_on: Dependencies::Steps(&[]),
        uses_input: true,
        uses_purposes: false,
        editable_fields: &["view_type", "orientation", "drawing_intent", "unit_system", "scale", "baselines"],
        help_text: "Review the identified view type, orientation, and drawing intent. Ensure the baseline (reference point) is correct.",
    },
    StepSpec {
        number: 2,
        name: "Dimension Reference Analysis",
        export_key: "dimensions",
        depends_on: Dependencies::Steps(&[1]),
        uses_input: true,
        uses_purposes: false,
        editable_fields: &["dimensions", "potential_conflicts"],
        help_text: "Check that all dimensions are correctly identified and their reference points are accurate.",
    },
    StepSpec {
        number: 3,
        name: "Notes & Callout Extraction",
        export_key: "notes",
        depends_on: Dependencies::Steps(&[1]),
        uses_input: true,
        uses_purposes: false,
        editable_fields: &["notes", "title_block"],
        help_text: "Verify all notes and callouts were extracted. Check material specs, hardware notes, and special instructions.",
    },
    StepSpec {
        number: 4,
        name: "Drawing Intent Validation",
        export_key: "validation",
        depends_on: Dependencies::Steps(&[1, 2, 3]),
        uses_input: false,
        uses_purposes: true,
        editable_fields: &["suitability", "blockers", "can_proceed"],
        help_text: "GATE: This step determines if the drawing has enough information for production. Review any blockers.",
    },
    StepSpec {
        number: 5,
        name: "Hierarchical Entity Extraction",
        export_key: "entities",
        depends_on: Dependencies::Steps(&[1, 2, 3]),
        uses_input: true,
        uses_purposes: false,
        editable_fields: &[
            "entities.project",
            "entities.rooms",
            "entities.locations",
            "entities.cabinet_runs",
            "entities.cabinets",
            "entities.sections",
        ],
        help_text: "Review the extracted entity hierarchy: Project, Room, Location, Run, Cabinet, Section. Add missing entities or correct relationships.",
    },
    StepSpec {
        number: 6,
        name: "Dimension Consistency Verification",
        export_key: "verification",
        depends_on: Dependencies::Steps(&[2, 5]),
        uses_input: false,
        uses_purposes: false,
        editable_fields: &["cabinet_verifications", "discrepancies"],
        help_text: "Verify dimension math: vertical and horizontal stack-ups should reconcile. Check for any discrepancies.",
    },
    StepSpec {
        number: 7,
        name: "Standard Practice Alignment",
        export_key: "alignment",
        depends_on: Dependencies::Steps(&[5, 6]),
        uses_input: false,
        uses_purposes: false,
        editable_fields: &["practice_evaluations", "flags", "custom_elements"],
        help_text: "Review standard practice alignment. Flag any non-standard practices that need special attention.",
    },
    StepSpec {
        number: 8,
        name: "Production Constraint Derivation",
        export_key: "constraints",
        depends_on: Dependencies::Steps(&[3, 6, 7]),
        uses_input: false,
        uses_purposes: false,
        editable_fields: &["constraints"],
        help_text: "Review derived production constraints. Verify gap standards, material thicknesses, and reference surfaces.",
    },
    StepSpec {
        number: 9,
        name: "Component Extraction",
        export_key: "components",
        depends_on: Dependencies::Steps(&[5, 6, 8]),
        uses_input: true,
        uses_purposes: false,
        editable_fields: &["components"],
        help_text: "GATE: Review all extracted components (drawers, doors, shelves, stretchers). Verify dimensions and derivations.",
    },
    StepSpec {
        number: 10,
        name: "Verification & Audit",
        export_key: "audit",
        depends_on: Dependencies::AllPrior,
        uses_input: false,
        uses_purposes: true,
        editable_fields: &["verification_level", "assumptions", "recommendations"],
        help_text: "Final audit report. Review assumptions and recommendations before proceeding to database persistence.",
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    fn step(n: u8) -> StepNumber {
        StepNumber::new(n).unwrap()
    }

    #[test]
    fn test_step_number_bounds() {
        assert!(StepNumber::new(0).is_none());
        assert!(StepNumber::new(11).is_none());
        assert_eq!(StepNumber::new(1), Some(StepNumber::FIRST));
        assert_eq!(StepNumber::new(10), Some(StepNumber::LAST));
    }

    #[test]
    fn test_step_number_next_stops_after_last() {
        assert_eq!(step(9).next(), Some(step(10)));
        assert_eq!(StepNumber::LAST.next(), None);
    }

    #[test]
    fn test_spec_table_is_ordered() {
        for (i, spec) in STEP_SPECS.iter().enumerate() {
            assert_eq!(usize::from(spec.number), i + 1);
        }
    }

    #[test]
    fn test_dependency_table() {
        let deps = |n: u8| -> Vec<u8> { step(n).spec().dependencies().into_iter().map(u8::from).collect() };
        assert!(deps(1).is_empty());
        assert_eq!(deps(2), vec![1]);
        assert_eq!(deps(3), vec![1]);
        assert_eq!(deps(4), vec![1, 2, 3]);
        assert_eq!(deps(5), vec![1, 2, 3]);
        assert_eq!(deps(6), vec![2, 5]);
        assert_eq!(deps(7), vec![5, 6]);
        assert_eq!(deps(8), vec![3, 6, 7]);
        assert_eq!(deps(9), vec![5, 6, 8]);
        assert_eq!(deps(10), (1..=9).collect::<Vec<_>>());
    }

    #[test]
    fn test_dependencies_only_point_backwards() {
        for n in StepNumber::all() {
            assert!(n.spec().dependencies().iter().all(|d| *d < n), "step {} depends forward", n);
        }
    }

    #[test]
    fn test_gate_steps() {
        let gates: Vec<u8> = StepNumber::all().filter(|s| s.is_gate()).map(u8::from).collect();
        assert_eq!(gates, vec![4, 9]);
    }

    #[test]
    fn test_step_number_serde_rejects_out_of_range() {
        assert_eq!(serde_json::to_string(&step(3)).unwrap(), "3");
        assert!(serde_json::from_str::<StepNumber>("11").is_err());
        assert_eq!(serde_json::from_str::<StepNumber>("7").unwrap(), step(7));
    }

    #[test]
    fn test_step_number_as_json_map_key() {
        let mut map = std::collections::BTreeMap::new();
        map.insert(step(2), "two");
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"2":"two"}"#);
        let back: std::collections::BTreeMap<StepNumber, String> = serde_json::from_str(&json).unwrap();
        assert_eq!(back[&step(2)], "two");
    }

    #[test]
    fn test_step_number_from_str() {
        assert_eq!("4".parse::<StepNumber>().unwrap(), step(4));
        assert!("0".parse::<StepNumber>().is_err());
        assert!("four".parse::<StepNumber>().is_err());
    }

    #[test]
    fn test_export_keys_unique() {
        let mut keys: Vec<_> = STEP_SPECS.iter().map(|s| s.export_key).collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), STEP_COUNT as usize);
    }
}
