//! Manufacturing stages and the ordered pipeline a batch moves through

use serde::{Deserialize, Serialize};

/// One step of the manufacturing pipeline
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    MaterialIssued,
    Forging,
    HeatTreatment,
    PreMachining,
    CncMachining,
    Marking,
    VisualInspection,
    FinalInspection,
    Dispatch,
}

impl Stage {
    /// All stages in pipeline order
    pub const ALL: [Stage; 9] = [
        Stage::MaterialIssued,
        Stage::Forging,
        Stage::HeatTreatment,
        Stage::PreMachining,
        Stage::CncMachining,
        Stage::Marking,
        Stage::VisualInspection,
        Stage::FinalInspection,
        Stage::Dispatch,
    ];

    /// Position of this stage in the full pipeline
    pub fn index(self) -> usize {
        self as usize
    }

    /// Machine name, as used in config files and snapshot file names
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::MaterialIssued => "material_issued",
            Stage::Forging => "forging",
            Stage::HeatTreatment => "heat_treatment",
            Stage::PreMachining => "pre_machining",
            Stage::CncMachining => "cnc_machining",
            Stage::Marking => "marking",
            Stage::VisualInspection => "visual_inspection",
            Stage::FinalInspection => "final_inspection",
            Stage::Dispatch => "dispatch",
        }
    }

    /// Human-readable label for tables and timelines
    pub fn label(self) -> &'static str {
        match self {
            Stage::MaterialIssued => "Material Issued",
            Stage::Forging => "Forging",
            Stage::HeatTreatment => "Heat Treatment",
            Stage::PreMachining => "Pre-Machining",
            Stage::CncMachining => "CNC Machining",
            Stage::Marking => "Marking",
            Stage::VisualInspection => "Visual Inspection",
            Stage::FinalInspection => "Final Inspection",
            Stage::Dispatch => "Dispatch",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "material_issued" | "material_issue" | "issue" | "raw_material" => {
                Ok(Stage::MaterialIssued)
            }
            "forging" => Ok(Stage::Forging),
            "heat_treatment" | "ht" => Ok(Stage::HeatTreatment),
            "pre_machining" | "pre_mc" => Ok(Stage::PreMachining),
            "cnc_machining" | "cnc" => Ok(Stage::CncMachining),
            "marking" => Ok(Stage::Marking),
            "visual_inspection" | "vi" => Ok(Stage::VisualInspection),
            "final_inspection" | "fi" => Ok(Stage::FinalInspection),
            "dispatch" => Ok(Stage::Dispatch),
            _ => Err(format!(
                "Unknown stage: {}. Use one of: {}",
                s,
                Stage::ALL
                    .iter()
                    .map(|s| s.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            )),
        }
    }
}

/// Ordered, duplicate-free list of stages a batch must pass through
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Stage>", into = "Vec<Stage>")]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    /// Build a pipeline, rejecting empty lists and repeated stages
    pub fn new(stages: Vec<Stage>) -> Result<Self, String> {
        if stages.is_empty() {
            return Err("Pipeline must contain at least one stage".to_string());
        }
        for (i, stage) in stages.iter().enumerate() {
            if stages[..i].contains(stage) {
                return Err(format!("Stage '{}' appears more than once in pipeline", stage));
            }
        }
        Ok(Self { stages })
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn position(&self, stage: Stage) -> Option<usize> {
        self.stages.iter().position(|s| *s == stage)
    }

    pub fn contains(&self, stage: Stage) -> bool {
        self.stages.contains(&stage)
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self {
            stages: Stage::ALL.to_vec(),
        }
    }
}

impl TryFrom<Vec<Stage>> for Pipeline {
    type Error = String;

    fn try_from(stages: Vec<Stage>) -> Result<Self, Self::Error> {
        Pipeline::new(stages)
    }
}

impl From<Pipeline> for Vec<Stage> {
    fn from(pipeline: Pipeline) -> Self {
        pipeline.stages
    }
}
