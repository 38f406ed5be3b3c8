//! Phase definitions and transition table

use super::events::Event;

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RunEnd {
    /// All stages held to completion
    Completed,
    /// Operator stopped the run
    Aborted,
}

/// Sequencer phases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Phase {
    /// No run since power-up
    Idle,
    /// Heading for the target of stage `i`
    Ramping(u8),
    /// Dwelling at the target of stage `i`
    Holding(u8),
    /// Furnace off, purge flow on, waiting for a safe temperature
    Cooling(RunEnd),
    /// Run over, safe to power off
    Stopped(RunEnd),
}

impl Phase {
    /// Check if a run is in progress (including its cooldown)
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Phase::Ramping(_) | Phase::Holding(_) | Phase::Cooling(_)
        )
    }

    /// Check if a new run may start
    pub fn can_start(&self) -> bool {
        matches!(self, Phase::Idle | Phase::Stopped(_))
    }

    /// Stage index for ramp and hold phases
    pub fn stage_index(&self) -> Option<u8> {
        match self {
            Phase::Ramping(i) | Phase::Holding(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric code for the console link
    pub fn code(&self) -> u8 {
        match self {
            Phase::Idle => 0,
            Phase::Ramping(_) => 1,
            Phase::Holding(_) => 2,
            Phase::Cooling(_) => 3,
            Phase::Stopped(RunEnd::Completed) => 4,
            Phase::Stopped(RunEnd::Aborted) => 5,
        }
    }

    /// Process an event and return the next phase
    pub fn transition(self, event: Event) -> Self {
        use Event::*;
        use Phase::*;

        match (self, event) {
            (Idle | Stopped(_), Started) => Ramping(0),

            (Ramping(i), TargetReached) => Holding(i),
            (Holding(i), HoldElapsed) => Ramping(i.saturating_add(1)),
            (Holding(_), RecipeFinished) => Cooling(RunEnd::Completed),

            // Stop never skips cooling while hot
            (Ramping(_) | Holding(_), StopRequested { safe: false }) => Cooling(RunEnd::Aborted),
            (Ramping(_) | Holding(_), StopRequested { safe: true }) => Stopped(RunEnd::Aborted),

            (Cooling(end), CooledDown) => Stopped(end),

            // Everything else leaves the phase unchanged
            _ => self,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_from_idle_and_stopped() {
        assert_eq!(Phase::Idle.transition(Event::Started), Phase::Ramping(0));
        assert_eq!(
            Phase::Stopped(RunEnd::Completed).transition(Event::Started),
            Phase::Ramping(0)
        );
        assert_eq!(Phase::Holding(1).transition(Event::Started), Phase::Holding(1));
    }

    #[test]
    fn test_stage_progression() {
        let phase = Phase::Ramping(0)
            .transition(Event::TargetReached)
            .transition(Event::HoldElapsed)
            .transition(Event::TargetReached)
            .transition(Event::RecipeFinished);
        assert_eq!(phase, Phase::Cooling(RunEnd::Completed));
        assert_eq!(phase.transition(Event::CooledDown), Phase::Stopped(RunEnd::Completed));
    }

    #[test]
    fn test_hot_stop_routes_through_cooling() {
        assert_eq!(
            Phase::Ramping(3).transition(Event::StopRequested { safe: false }),
            Phase::Cooling(RunEnd::Aborted)
        );
        assert_eq!(
            Phase::Cooling(RunEnd::Aborted).transition(Event::CooledDown),
            Phase::Stopped(RunEnd::Aborted)
        );
    }

    #[test]
    fn test_cold_stop_goes_straight_to_stopped() {
        assert_eq!(
            Phase::Holding(0).transition(Event::StopRequested { safe: true }),
            Phase::Stopped(RunEnd::Aborted)
        );
    }

    #[test]
    fn test_stop_ignored_outside_run() {
        assert_eq!(
            Phase::Idle.transition(Event::StopRequested { safe: true }),
            Phase::Idle
        );
        assert_eq!(
            Phase::Cooling(RunEnd::Completed).transition(Event::StopRequested { safe: true }),
            Phase::Cooling(RunEnd::Completed)
        );
    }

    #[test]
    fn test_ramp_events_do_not_apply_to_hold() {
        assert_eq!(Phase::Holding(2).transition(Event::TargetReached), Phase::Holding(2));
        assert_eq!(Phase::Ramping(2).transition(Event::HoldElapsed), Phase::Ramping(2));
        assert_eq!(Phase::Ramping(2).transition(Event::CooledDown), Phase::Ramping(2));
    }

    #[test]
    fn test_phase_queries() {
        assert!(Phase::Cooling(RunEnd::Aborted).is_active());
        assert!(!Phase::Stopped(RunEnd::Aborted).is_active());
        assert!(Phase::Stopped(RunEnd::Aborted).can_start());
        assert_eq!(Phase::Holding(4).stage_index(), Some(4));
        assert_eq!(Phase::Idle.stage_index(), None);
    }
}
