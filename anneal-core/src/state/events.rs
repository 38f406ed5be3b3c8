//! Events that trigger phase transitions

/// Events that can trigger phase transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    /// Run started with a validated recipe
    Started,
    /// Ramp time elapsed and temperature is within tolerance of target
    TargetReached,
    /// Hold time elapsed on a stage that has a successor
    HoldElapsed,
    /// Hold time elapsed on the last stage
    RecipeFinished,
    /// Operator asked to stop; `safe` is the power-off verdict at that moment
    StopRequested { safe: bool },
    /// Temperature fell to the shutdown threshold while cooling
    CooledDown,
}
