//! Heating recipe: an ordered list of ramp + hold stages

use core::fmt;

use anneal_protocol::FlowRange;
use heapless::Vec;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Maximum number of stages in a recipe
pub const MAX_STAGES: usize = 8;

/// Longest ramp or hold, matching a furnace program segment (99 h 59 min)
pub const MAX_STAGE_DURATION_S: u32 = 99 * 3600 + 59 * 60;

/// One ramp + hold segment
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Stage {
    /// Target temperature in 0.1°C
    pub target_x10: i16,
    /// Minimum ramp duration in seconds
    pub ramp_s: u32,
    /// Hold duration in seconds, counted once the target is reached
    pub hold_s: u32,
    /// Process gas flow in sccm
    pub flow_sccm: f32,
}

impl Stage {
    /// Nominal ramp + hold duration in milliseconds
    pub fn nominal_ms(&self) -> u64 {
        (self.ramp_s as u64 + self.hold_s as u64) * 1000
    }
}

/// Ranges a stage must fall within
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceLimits {
    /// Lowest allowed target in 0.1°C
    pub ambient_x10: i16,
    /// Highest allowed target in 0.1°C
    pub furnace_max_x10: i16,
    /// Range the process flow runs in
    pub flow_range: FlowRange,
}

impl DeviceLimits {
    /// Full scale of the process flow range in sccm
    pub fn flow_full_scale_sccm(&self) -> f32 {
        self.flow_range.full_scale_sccm()
    }
}

/// Stage field that failed validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StageField {
    TargetTemperature,
    RampTime,
    HoldTime,
    FlowRate,
}

/// Recipe validation failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RecipeError {
    /// No stages
    Empty,
    /// More than [`MAX_STAGES`] stages, or a stage index beyond it
    TooManyStages,
    /// A stage index was skipped while assembling a recipe
    MissingStage(u8),
    /// A stage field is outside the device range
    OutOfRange { stage: u8, field: StageField },
}

impl fmt::Display for RecipeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecipeError::Empty => write!(f, "recipe has no stages"),
            RecipeError::TooManyStages => write!(f, "recipe exceeds {} stages", MAX_STAGES),
            RecipeError::MissingStage(i) => write!(f, "stage {} is missing", i + 1),
            RecipeError::OutOfRange { stage, field } => {
                write!(f, "stage {} {:?} out of range", stage + 1, field)
            }
        }
    }
}

/// Validated, immutable recipe
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Recipe {
    stages: Vec<Stage, MAX_STAGES>,
}

impl Recipe {
    /// Build a recipe from stages, checking every stage against `limits`
    pub fn from_stages(stages: &[Stage], limits: &DeviceLimits) -> Result<Self, RecipeError> {
        if stages.len() > MAX_STAGES {
            return Err(RecipeError::TooManyStages);
        }
        let recipe = Self {
            stages: Vec::from_slice(stages).map_err(|_| RecipeError::TooManyStages)?,
        };
        recipe.validate(limits)?;
        Ok(recipe)
    }

    /// Re-check a recipe that came from storage
    pub fn validate(&self, limits: &DeviceLimits) -> Result<(), RecipeError> {
        if self.stages.is_empty() {
            return Err(RecipeError::Empty);
        }
        for (i, stage) in self.stages.iter().enumerate() {
            check_stage(i as u8, stage, limits)?;
        }
        Ok(())
    }

    /// All stages in execution order
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Stage by index
    pub fn stage(&self, index: usize) -> Option<&Stage> {
        self.stages.get(index)
    }

    /// Number of stages
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// A validated recipe is never empty; this exists for API symmetry
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Check if `index` is the final stage
    pub fn is_last(&self, index: usize) -> bool {
        index + 1 >= self.stages.len()
    }

    /// Sum of nominal ramp + hold durations of the stages after `index`
    pub fn nominal_after_ms(&self, index: usize) -> u64 {
        self.stages
            .iter()
            .skip(index + 1)
            .map(Stage::nominal_ms)
            .sum()
    }
}

fn check_stage(index: u8, stage: &Stage, limits: &DeviceLimits) -> Result<(), RecipeError> {
    let fail = |field| Err(RecipeError::OutOfRange { stage: index, field });

    if stage.target_x10 < limits.ambient_x10 || stage.target_x10 > limits.furnace_max_x10 {
        return fail(StageField::TargetTemperature);
    }
    if stage.ramp_s > MAX_STAGE_DURATION_S {
        return fail(StageField::RampTime);
    }
    if stage.hold_s > MAX_STAGE_DURATION_S {
        return fail(StageField::HoldTime);
    }
    // Also rejects NaN
    if !(stage.flow_sccm >= 0.0 && stage.flow_sccm <= limits.flow_full_scale_sccm()) {
        return fail(StageField::FlowRate);
    }
    Ok(())
}

/// Recipe being assembled stage by stage from the console
#[derive(Debug, Clone, Default)]
pub struct RecipeDraft {
    slots: [Option<Stage>; MAX_STAGES],
}

impl RecipeDraft {
    /// Create an empty draft
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a draft from an existing recipe
    pub fn from_recipe(recipe: &Recipe) -> Self {
        let mut draft = Self::new();
        for (slot, stage) in draft.slots.iter_mut().zip(recipe.stages()) {
            *slot = Some(*stage);
        }
        draft
    }

    /// Put a stage at `index`, replacing what was there
    pub fn set_stage(&mut self, index: usize, stage: Stage) -> Result<(), RecipeError> {
        let slot = self.slots.get_mut(index).ok_or(RecipeError::TooManyStages)?;
        *slot = Some(stage);
        Ok(())
    }

    /// Drop all stages
    pub fn clear(&mut self) {
        self.slots = [None; MAX_STAGES];
    }

    /// Number of filled slots
    pub fn count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Turn the draft into a validated recipe
    ///
    /// Stages must be contiguous from index 0.
    pub fn build(&self, limits: &DeviceLimits) -> Result<Recipe, RecipeError> {
        let filled = self.slots.iter().rposition(Option::is_some);
        let Some(last) = filled else {
            return Err(RecipeError::Empty);
        };

        let mut stages: Vec<Stage, MAX_STAGES> = Vec::new();
        for (i, slot) in self.slots[..=last].iter().enumerate() {
            let stage = slot.ok_or(RecipeError::MissingStage(i as u8))?;
            // Cannot overflow: at most MAX_STAGES slots
            let _ = stages.push(stage);
        }
        Recipe::from_stages(&stages, limits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> DeviceLimits {
        DeviceLimits {
            ambient_x10: 250,
            furnace_max_x10: 12000,
            flow_range: FlowRange::SCCM_500,
        }
    }

    fn stage(target_c: i16) -> Stage {
        Stage {
            target_x10: target_c * 10,
            ramp_s: 300,
            hold_s: 600,
            flow_sccm: 20.0,
        }
    }

    #[test]
    fn test_single_stage_recipe() {
        let recipe = Recipe::from_stages(&[stage(500)], &limits()).unwrap();
        assert_eq!(recipe.len(), 1);
        assert!(recipe.is_last(0));
        assert_eq!(recipe.stage(0).unwrap().nominal_ms(), 900_000);
    }

    #[test]
    fn test_empty_recipe_rejected() {
        assert_eq!(Recipe::from_stages(&[], &limits()), Err(RecipeError::Empty));
    }

    #[test]
    fn test_nine_stages_rejected() {
        let stages = [stage(500); 9];
        assert_eq!(
            Recipe::from_stages(&stages, &limits()),
            Err(RecipeError::TooManyStages)
        );
    }

    #[test]
    fn test_eight_stages_accepted() {
        let stages = [stage(500); 8];
        assert!(Recipe::from_stages(&stages, &limits()).is_ok());
    }

    #[test]
    fn test_temperature_bounds() {
        let err = Recipe::from_stages(&[stage(500), stage(1300)], &limits()).unwrap_err();
        assert_eq!(
            err,
            RecipeError::OutOfRange {
                stage: 1,
                field: StageField::TargetTemperature
            }
        );

        let err = Recipe::from_stages(&[stage(20)], &limits()).unwrap_err();
        assert_eq!(
            err,
            RecipeError::OutOfRange {
                stage: 0,
                field: StageField::TargetTemperature
            }
        );
    }

    #[test]
    fn test_flow_bounds() {
        let mut s = stage(500);
        s.flow_sccm = 501.0;
        assert_eq!(
            Recipe::from_stages(&[s], &limits()),
            Err(RecipeError::OutOfRange {
                stage: 0,
                field: StageField::FlowRate
            })
        );

        s.flow_sccm = -1.0;
        assert!(Recipe::from_stages(&[s], &limits()).is_err());

        s.flow_sccm = f32::NAN;
        assert!(Recipe::from_stages(&[s], &limits()).is_err());

        s.flow_sccm = 0.0;
        assert!(Recipe::from_stages(&[s], &limits()).is_ok());
    }

    #[test]
    fn test_duration_bounds() {
        let mut s = stage(500);
        s.hold_s = MAX_STAGE_DURATION_S + 1;
        assert_eq!(
            Recipe::from_stages(&[s], &limits()),
            Err(RecipeError::OutOfRange {
                stage: 0,
                field: StageField::HoldTime
            })
        );
    }

    #[test]
    fn test_nominal_after() {
        let recipe = Recipe::from_stages(&[stage(300), stage(500), stage(700)], &limits()).unwrap();
        assert_eq!(recipe.nominal_after_ms(0), 1_800_000);
        assert_eq!(recipe.nominal_after_ms(2), 0);
    }

    #[test]
    fn test_draft_build() {
        let mut draft = RecipeDraft::new();
        draft.set_stage(0, stage(300)).unwrap();
        draft.set_stage(1, stage(500)).unwrap();
        let recipe = draft.build(&limits()).unwrap();
        assert_eq!(recipe.len(), 2);
        assert_eq!(recipe.stage(1).unwrap().target_x10, 5000);
    }

    #[test]
    fn test_draft_gap_rejected() {
        let mut draft = RecipeDraft::new();
        draft.set_stage(0, stage(300)).unwrap();
        draft.set_stage(2, stage(500)).unwrap();
        assert_eq!(draft.build(&limits()), Err(RecipeError::MissingStage(1)));
    }

    #[test]
    fn test_draft_index_limit() {
        let mut draft = RecipeDraft::new();
        assert_eq!(
            draft.set_stage(MAX_STAGES, stage(300)),
            Err(RecipeError::TooManyStages)
        );
        assert_eq!(draft.build(&limits()), Err(RecipeError::Empty));
    }

    #[test]
    fn test_draft_roundtrip_from_recipe() {
        let recipe = Recipe::from_stages(&[stage(300), stage(500)], &limits()).unwrap();
        let mut draft = RecipeDraft::from_recipe(&recipe);
        assert_eq!(draft.count(), 2);
        draft.clear();
        assert_eq!(draft.count(), 0);
    }

    proptest::proptest! {
        #[test]
        fn prop_stage_count_decides_acceptance(count in 0usize..=12) {
            let stages = [stage(500); 12];
            let result = Recipe::from_stages(&stages[..count], &limits());
            proptest::prop_assert_eq!(result.is_ok(), (1..=MAX_STAGES).contains(&count));
        }
    }
}
