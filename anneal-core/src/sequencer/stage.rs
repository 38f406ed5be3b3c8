//! Stage sequencer
//!
//! Drives a run through its stages from sampler ticks. Each tick the
//! sequencer evaluates safety, decides at most one event, confirms the
//! device commands that event requires and only then changes phase.
//! A command that cannot be confirmed freezes the run where it is.

use heapless::Vec;

use embedded_hal_async::delay::DelayNs;

use super::command::{Device, DeviceCommand, DeviceFault, Instruments};
use super::error::SequencerError;
use crate::config::{ProcessConfig, Recipe, RecipeError, Stage};
use crate::safety::{SafetyMonitor, SafetyVerdict};
use crate::sampler::{Poll, Sample, Sampler};
use crate::state::{Event, Phase};
use crate::traits::{FlowController, Furnace, FurnaceMode};

/// Most commands issued on a single transition
const MAX_ENTRY_COMMANDS: usize = 4;

/// Snapshot of sequencer progress
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SequencerState {
    pub phase: Phase,
    /// Stage being ramped or held
    pub stage_index: Option<u8>,
    pub stage_elapsed_ms: u64,
    /// Nominal time left in the current ramp or hold
    pub stage_remaining_ms: u64,
    /// Time since the run started, frozen once it ends
    pub total_elapsed_ms: u64,
    /// Nominal end of the last hold, `None` outside ramp and hold
    pub estimated_finish_ms: Option<u64>,
    /// Unacknowledged device fault; the run does not advance while set
    pub fault: Option<DeviceFault>,
    /// A stop was accepted and will be applied on the next tick
    pub stop_pending: bool,
}

/// Sequences a recipe against the furnace and flow controller
pub struct StageSequencer {
    config: ProcessConfig,
    safety: SafetyMonitor,
    phase: Phase,
    recipe: Option<Recipe>,
    now_ms: u64,
    run_started_ms: u64,
    run_ended_ms: Option<u64>,
    stage_started_ms: u64,
    estimated_finish_ms: Option<u64>,
    stop_requested: bool,
    /// The pending stop was requested while unsafe to power off
    stop_needs_cooldown: bool,
    fault: Option<DeviceFault>,
    furnace_read_failures: u8,
    flow_read_failures: u8,
    last_verdict: Option<SafetyVerdict>,
}

impl StageSequencer {
    /// Create an idle sequencer
    pub fn new(config: ProcessConfig) -> Self {
        Self {
            safety: SafetyMonitor::new(config.shutdown_threshold_x10),
            config,
            phase: Phase::Idle,
            recipe: None,
            now_ms: 0,
            run_started_ms: 0,
            run_ended_ms: None,
            stage_started_ms: 0,
            estimated_finish_ms: None,
            stop_requested: false,
            stop_needs_cooldown: false,
            fault: None,
            furnace_read_failures: 0,
            flow_read_failures: 0,
            last_verdict: None,
        }
    }

    pub fn config(&self) -> &ProcessConfig {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Recipe of the current or last run
    pub fn recipe(&self) -> Option<&Recipe> {
        self.recipe.as_ref()
    }

    pub fn fault(&self) -> Option<DeviceFault> {
        self.fault
    }

    /// Check if a run is in progress, including its cooldown
    pub fn is_run_active(&self) -> bool {
        self.phase.is_active()
    }

    /// Power-off verdict from the latest sample
    ///
    /// Unsafe until a furnace temperature has been read.
    pub fn verdict(&self) -> SafetyVerdict {
        self.last_verdict
            .unwrap_or_else(|| self.safety.evaluate_temperature(None))
    }

    /// Current progress
    pub fn state(&self) -> SequencerState {
        let stage_index = self.phase.stage_index();
        let stage_elapsed_ms = match stage_index {
            Some(_) => self.now_ms.saturating_sub(self.stage_started_ms),
            None => 0,
        };
        let stage_remaining_ms = match self.phase {
            Phase::Ramping(i) => self.stage_ms(i, |s| s.ramp_s),
            Phase::Holding(i) => self.stage_ms(i, |s| s.hold_s),
            _ => 0,
        }
        .saturating_sub(stage_elapsed_ms);
        let total_elapsed_ms = match self.phase {
            Phase::Idle => 0,
            _ => self
                .run_ended_ms
                .unwrap_or(self.now_ms)
                .saturating_sub(self.run_started_ms),
        };

        SequencerState {
            phase: self.phase,
            stage_index,
            stage_elapsed_ms,
            stage_remaining_ms,
            total_elapsed_ms,
            estimated_finish_ms: self.estimated_finish_ms,
            fault: self.fault,
            stop_pending: self.stop_requested,
        }
    }

    /// Start a run
    ///
    /// The recipe is checked against the configured limits, then the flow
    /// range, first setpoints, valve and furnace mode are confirmed in that
    /// order. If any of them fails the sequencer stays where it was.
    pub async fn start<F, M, D>(
        &mut self,
        recipe: Recipe,
        now_ms: u64,
        instruments: &mut Instruments<F, M, D>,
    ) -> Result<(), SequencerError>
    where
        F: Furnace,
        M: FlowController,
        D: DelayNs,
    {
        if !self.phase.can_start() {
            return Err(SequencerError::InvalidPhase);
        }
        recipe.validate(&self.config.limits)?;
        let first = *recipe
            .stage(0)
            .ok_or(SequencerError::InvalidRecipe(RecipeError::Empty))?;

        let commands = [
            DeviceCommand::FlowRange(self.config.limits.flow_range),
            DeviceCommand::FurnaceSetpoint(first.target_x10),
            DeviceCommand::FlowSetpoint(first.flow_sccm),
            DeviceCommand::OpenValve,
            DeviceCommand::FurnaceMode(FurnaceMode::Run),
        ];
        instruments
            .execute_all(&commands, &self.config.retry)
            .await?;

        self.now_ms = self.now_ms.max(now_ms);
        self.recipe = Some(recipe);
        self.run_started_ms = self.now_ms;
        self.run_ended_ms = None;
        self.stop_requested = false;
        self.stop_needs_cooldown = false;
        self.fault = None;
        self.furnace_read_failures = 0;
        self.flow_read_failures = 0;
        self.enter(self.phase.transition(Event::Started));
        Ok(())
    }

    /// Request a stop, applied on the next tick
    ///
    /// Returns [`SequencerError::UnsafeShutdown`] when the furnace is too
    /// hot to power off; the stop is still accepted and the run goes
    /// through cooling with the purge flow on.
    pub fn stop(&mut self) -> Result<(), SequencerError> {
        match self.phase {
            Phase::Ramping(_) | Phase::Holding(_) => self.stop_requested = true,
            // Already on its way down
            Phase::Cooling(_) => {}
            Phase::Idle | Phase::Stopped(_) => return Err(SequencerError::InvalidPhase),
        }
        let verdict = self.verdict();
        if self.stop_requested && !verdict.safe_to_power_off {
            self.stop_needs_cooldown = true;
        }
        if verdict.safe_to_power_off {
            Ok(())
        } else {
            Err(SequencerError::UnsafeShutdown(verdict))
        }
    }

    /// Clear a device fault so the run may advance again
    pub fn acknowledge_fault(&mut self) -> Option<DeviceFault> {
        self.furnace_read_failures = 0;
        self.flow_read_failures = 0;
        self.fault.take()
    }

    /// Drop the monitoring series; refused while a run is active
    pub fn clear_series<const N: usize>(
        &self,
        sampler: &mut Sampler<N>,
    ) -> Result<usize, SequencerError> {
        if self.is_run_active() {
            return Err(SequencerError::RunActive);
        }
        Ok(sampler.clear())
    }

    /// Close the process valve by hand; refused while a run is active
    pub async fn close_valve<F, M, D>(
        &mut self,
        instruments: &mut Instruments<F, M, D>,
    ) -> Result<(), SequencerError>
    where
        F: Furnace,
        M: FlowController,
        D: DelayNs,
    {
        if self.is_run_active() {
            return Err(SequencerError::RunActive);
        }
        instruments
            .execute_with_retry(DeviceCommand::CloseValve, &self.config.retry)
            .await?;
        Ok(())
    }

    /// Process one sampler tick
    ///
    /// Returns the new phase when a transition happened.
    pub async fn on_sample<F, M, D>(
        &mut self,
        poll: &Poll,
        instruments: &mut Instruments<F, M, D>,
    ) -> Result<Option<Phase>, SequencerError>
    where
        F: Furnace,
        M: FlowController,
        D: DelayNs,
    {
        let sample = &poll.sample;
        self.now_ms = self.now_ms.max(sample.timestamp_ms);
        let verdict = self.safety.evaluate(sample);
        self.last_verdict = Some(verdict);

        if !self.phase.is_active() {
            return Ok(None);
        }

        if let Some(fault) = self.track_reads(poll) {
            return Err(SequencerError::DeviceUnreachable(fault));
        }

        let Some(event) = self.pending_event(sample, &verdict) else {
            return Ok(None);
        };
        let next = self.phase.transition(event);
        if next == self.phase {
            return Ok(None);
        }

        let commands = self.entry_commands(next);
        if let Err(fault) = instruments
            .execute_all(&commands, &self.config.retry)
            .await
        {
            self.fault = Some(fault);
            return Err(SequencerError::from_fault(fault));
        }

        self.enter(next);
        Ok(Some(next))
    }

    /// Count consecutive read failures and raise a fault when one device
    /// has failed as many reads as a command gets attempts
    fn track_reads(&mut self, poll: &Poll) -> Option<DeviceFault> {
        self.furnace_read_failures = match poll.furnace_error {
            Some(_) => self.furnace_read_failures.saturating_add(1),
            None => 0,
        };
        self.flow_read_failures = match poll.flow_error {
            Some(_) => self.flow_read_failures.saturating_add(1),
            None => 0,
        };

        if self.fault.is_some() {
            return None;
        }
        let limit = self.config.retry.max_attempts.max(1);
        let failing = [
            (Device::Furnace, self.furnace_read_failures, poll.furnace_error),
            (Device::FlowController, self.flow_read_failures, poll.flow_error),
        ];
        for (device, count, error) in failing {
            let Some(error) = error else { continue };
            if count >= limit {
                let fault = DeviceFault {
                    device,
                    command: None,
                    error,
                    attempts: count,
                };
                self.fault = Some(fault);
                return Some(fault);
            }
        }
        None
    }

    fn pending_event(&self, sample: &Sample, verdict: &SafetyVerdict) -> Option<Event> {
        // A stop is honoured even while frozen
        if self.stop_requested && matches!(self.phase, Phase::Ramping(_) | Phase::Holding(_)) {
            // Once refused as unsafe, the stop goes through cooling
            return Some(Event::StopRequested {
                safe: verdict.safe_to_power_off && !self.stop_needs_cooldown,
            });
        }
        if self.fault.is_some() {
            return None;
        }

        // Advancing needs a confirmed furnace reading
        let status = sample.furnace?;
        let recipe = self.recipe.as_ref()?;
        let elapsed_ms = self.now_ms.saturating_sub(self.stage_started_ms);

        match self.phase {
            Phase::Ramping(i) => {
                let stage = recipe.stage(i as usize)?;
                let error = (status.process_value_x10 as i32 - stage.target_x10 as i32).abs();
                let in_band = error <= self.config.ramp_tolerance_x10 as i32;
                (elapsed_ms >= secs_to_ms(stage.ramp_s) && in_band).then_some(Event::TargetReached)
            }
            Phase::Holding(i) => {
                let stage = recipe.stage(i as usize)?;
                if elapsed_ms < secs_to_ms(stage.hold_s) {
                    None
                } else if recipe.is_last(i as usize) {
                    Some(Event::RecipeFinished)
                } else {
                    Some(Event::HoldElapsed)
                }
            }
            Phase::Cooling(_) => verdict.safe_to_power_off.then_some(Event::CooledDown),
            Phase::Idle | Phase::Stopped(_) => None,
        }
    }

    /// Commands that must be confirmed before entering `next`
    fn entry_commands(&self, next: Phase) -> Vec<DeviceCommand, MAX_ENTRY_COMMANDS> {
        let mut commands: Vec<DeviceCommand, MAX_ENTRY_COMMANDS> = Vec::new();
        let mut add = |command: DeviceCommand| {
            // Every transition fits MAX_ENTRY_COMMANDS
            let _ = commands.push(command);
        };
        match next {
            Phase::Ramping(i) => {
                if let Some(stage) = self.recipe.as_ref().and_then(|r| r.stage(i as usize)) {
                    add(DeviceCommand::FurnaceSetpoint(stage.target_x10));
                    add(DeviceCommand::FlowSetpoint(stage.flow_sccm));
                }
            }
            Phase::Cooling(_) => {
                add(DeviceCommand::FurnaceMode(FurnaceMode::Stop));
                add(DeviceCommand::FlowRange(self.config.purge_range));
                add(DeviceCommand::FlowSetpoint(self.config.purge_flow_sccm));
                add(DeviceCommand::OpenValve);
            }
            Phase::Stopped(_) => {
                // Coming from cooling the furnace is already off
                if !matches!(self.phase, Phase::Cooling(_)) {
                    add(DeviceCommand::FurnaceMode(FurnaceMode::Stop));
                }
                add(DeviceCommand::FlowSetpoint(0.0));
                add(DeviceCommand::CloseValve);
            }
            Phase::Holding(_) | Phase::Idle => {}
        }
        commands
    }

    fn enter(&mut self, next: Phase) {
        self.phase = next;
        self.stage_started_ms = self.now_ms;
        if matches!(next, Phase::Cooling(_) | Phase::Stopped(_)) {
            self.stop_requested = false;
            self.stop_needs_cooldown = false;
        }
        if !next.is_active() {
            self.run_ended_ms = Some(self.now_ms);
        }
        self.estimated_finish_ms = self.estimate_finish();
    }

    /// Now plus the nominal durations still ahead, `None` outside ramp and hold
    fn estimate_finish(&self) -> Option<u64> {
        let recipe = self.recipe.as_ref()?;
        let (index, current) = match self.phase {
            Phase::Ramping(i) => {
                let ramp = self.stage_ms(i, |s| s.ramp_s);
                (i, ramp + self.stage_ms(i, |s| s.hold_s))
            }
            Phase::Holding(i) => (i, self.stage_ms(i, |s| s.hold_s)),
            _ => return None,
        };
        Some(self.now_ms + current + recipe.nominal_after_ms(index as usize))
    }

    fn stage_ms(&self, index: u8, field: impl Fn(&Stage) -> u32) -> u64 {
        self.recipe
            .as_ref()
            .and_then(|r| r.stage(index as usize))
            .map(|s| secs_to_ms(field(s)))
            .unwrap_or(0)
    }
}

fn secs_to_ms(s: u32) -> u64 {
    s as u64 * 1000
}
