//! Main controller coordinating sampler, sequencer and console requests
//!
//! The controller is the single owner of both instrument links. It:
//! - Polls the instruments once per tick and feeds the sequencer
//! - Executes console commands between ticks
//! - Keeps the recipe being edited from the console
//! - Builds telemetry for the console

use defmt::*;
use embedded_hal_async::delay::DelayNs;

use anneal_core::config::{ProcessConfig, RecipeDraft, Stage};
use anneal_core::sampler::{ExportRow, Sample, Sampler};
use anneal_core::sequencer::{Device, DeviceFault, Instruments, SequencerError, StageSequencer};
use anneal_core::traits::{
    load_validated, FlowController, Furnace, FurnaceMode, RecipeStore, ValveState,
};
use anneal_protocol::messages::{
    ExportRecord, NakReason, SampleRecord, StageRecord, StatusRecord, FLAG_FLOW_FAILED,
    FLAG_FURNACE_FAILED, FLAG_VALVE_OPEN, NO_ESTIMATE,
};
use anneal_protocol::{ConsoleCommand, ControllerMessage};

/// Samples kept for export (about 68 minutes at one sample per second)
pub const SERIES_CAPACITY: usize = 4096;

/// Rows sent per export request
pub const EXPORT_BATCH: usize = 64;

/// Telemetry produced by one tick
pub struct Telemetry {
    pub sample: SampleRecord,
    pub status: StatusRecord,
}

/// Controller state for coordinating subsystems
pub struct Controller<F, M, D, S> {
    /// Both links plus the retry delay
    instruments: Instruments<F, M, D>,
    /// Run state machine
    sequencer: StageSequencer,
    /// Recipe edited by the console, copied into the sequencer on start
    draft: RecipeDraft,
    /// Saved recipe
    store: S,
}

impl<F, M, D, S> Controller<F, M, D, S>
where
    F: Furnace,
    M: FlowController,
    D: DelayNs,
    S: RecipeStore,
    S::Error: Format,
{
    /// Create a controller with the default recipe as the draft
    pub fn new(
        instruments: Instruments<F, M, D>,
        config: ProcessConfig,
        draft: RecipeDraft,
        store: S,
    ) -> Self {
        Self {
            instruments,
            sequencer: StageSequencer::new(config),
            draft,
            store,
        }
    }

    /// Replace the draft with the saved recipe, if one still fits the limits
    pub async fn restore_recipe(&mut self) {
        let limits = self.sequencer.config().limits;
        match load_validated(&mut self.store, &limits).await {
            Ok(Some(recipe)) => {
                info!("Restored {} stage recipe from flash", recipe.len());
                self.draft = RecipeDraft::from_recipe(&recipe);
            }
            Ok(None) => {
                debug!("No saved recipe, using default");
            }
            Err(e) => {
                warn!("Saved recipe unusable: {:?}, using default", e);
            }
        }
    }

    /// Poll both instruments and advance the run
    pub async fn tick<const N: usize>(
        &mut self,
        now_ms: u64,
        sampler: &mut Sampler<N>,
    ) -> Telemetry {
        let poll = sampler
            .poll(
                now_ms,
                &mut self.instruments.furnace,
                &mut self.instruments.flow,
            )
            .await;

        if let Some(e) = poll.furnace_error {
            warn!("Furnace read failed: {:?}", e);
        }
        if let Some(e) = poll.flow_error {
            warn!("Flow read failed: {:?}", e);
        }
        trace!("Sample: {:?}", poll.sample);

        match self.sequencer.on_sample(&poll, &mut self.instruments).await {
            Ok(Some(phase)) => info!("Phase -> {:?}", phase),
            Ok(None) => {}
            Err(e) => error!("Run frozen: {}", Display2Format(&e)),
        }

        Telemetry {
            sample: sample_record(&poll.sample),
            status: self.status(now_ms, sampler.series().evicted()),
        }
    }

    /// Execute one console command
    ///
    /// Ping and export are answered by the console tasks and never reach
    /// this method.
    pub async fn handle<const N: usize>(
        &mut self,
        command: ConsoleCommand,
        now_ms: u64,
        sampler: &mut Sampler<N>,
    ) -> ControllerMessage {
        let msg_type = command.msg_type();
        match self.execute(command, now_ms, sampler).await {
            Ok(()) => ControllerMessage::Ack { command: msg_type },
            Err(reason) => ControllerMessage::Nak {
                command: msg_type,
                reason,
            },
        }
    }

    async fn execute<const N: usize>(
        &mut self,
        command: ConsoleCommand,
        now_ms: u64,
        sampler: &mut Sampler<N>,
    ) -> Result<(), NakReason> {
        let limits = self.sequencer.config().limits;
        match command {
            ConsoleCommand::LoadStage(record) => {
                debug!("Stage {} loaded: {:?}", record.index, record);
                self.draft
                    .set_stage(record.index as usize, stage_from_record(&record))
                    .map_err(|_| NakReason::InvalidRecipe)
            }
            ConsoleCommand::ClearRecipe => {
                self.draft.clear();
                Ok(())
            }
            ConsoleCommand::SaveRecipe => {
                let recipe = self.draft.build(&limits).map_err(|e| {
                    warn!("Recipe not saved: {}", Display2Format(&e));
                    NakReason::InvalidRecipe
                })?;
                self.store.save(&recipe).await.map_err(|e| {
                    error!("Recipe save failed: {:?}", e);
                    NakReason::Storage
                })
            }
            ConsoleCommand::Start => {
                let recipe = self.draft.build(&limits).map_err(|e| {
                    warn!("Start refused: {}", Display2Format(&e));
                    NakReason::InvalidRecipe
                })?;
                let stages = recipe.len();
                self.sequencer
                    .start(recipe, now_ms, &mut self.instruments)
                    .await
                    .map_err(refusal)?;
                info!("Run started with {} stages", stages);
                Ok(())
            }
            ConsoleCommand::Stop => {
                let result = self.sequencer.stop();
                if let Err(SequencerError::UnsafeShutdown(_)) = result {
                    info!("Stop accepted, cooling down first");
                }
                result.map_err(refusal)
            }
            ConsoleCommand::ClearSeries => {
                let dropped = self.sequencer.clear_series(sampler).map_err(refusal)?;
                info!("Cleared {} samples", dropped);
                Ok(())
            }
            ConsoleCommand::CloseValve => self
                .sequencer
                .close_valve(&mut self.instruments)
                .await
                .map_err(refusal),
            ConsoleCommand::AcknowledgeFault => match self.sequencer.acknowledge_fault() {
                Some(fault) => {
                    info!("Fault acknowledged: {:?}", fault);
                    Ok(())
                }
                None => Err(NakReason::InvalidPhase),
            },
            ConsoleCommand::Ping | ConsoleCommand::Export { .. } => Ok(()),
        }
    }

    /// Sequencer snapshot for the console
    pub fn status(&self, now_ms: u64, evicted: u32) -> StatusRecord {
        let state = self.sequencer.state();
        StatusRecord {
            phase: state.phase.code(),
            stage: state.stage_index.unwrap_or(0),
            stage_elapsed_s: ms_to_s(state.stage_elapsed_ms),
            stage_remaining_s: ms_to_s(state.stage_remaining_ms),
            total_elapsed_s: ms_to_s(state.total_elapsed_ms),
            finish_in_s: finish_in_s(state.estimated_finish_ms, now_ms),
            safe_to_power_off: self.sequencer.verdict().safe_to_power_off,
            fault: fault_code(state.fault),
            evicted,
        }
    }
}

/// Map a sequencer refusal onto the console reason code
fn refusal(e: SequencerError) -> NakReason {
    warn!("Command refused: {}", Display2Format(&e));
    match e {
        SequencerError::InvalidRecipe(_) => NakReason::InvalidRecipe,
        SequencerError::InvalidPhase => NakReason::InvalidPhase,
        SequencerError::UnsafeShutdown(_) => NakReason::UnsafeShutdown,
        SequencerError::DeviceUnreachable(_) | SequencerError::Range(_) => {
            NakReason::DeviceUnreachable
        }
        SequencerError::RunActive => NakReason::RunActive,
    }
}

/// Seconds to the estimated finish; [`NO_ESTIMATE`] is never a real value
fn finish_in_s(estimated_finish_ms: Option<u64>, now_ms: u64) -> u32 {
    match estimated_finish_ms {
        Some(finish) => (finish.saturating_sub(now_ms) / 1000).min(NO_ESTIMATE as u64 - 1) as u32,
        None => NO_ESTIMATE,
    }
}

fn fault_code(fault: Option<DeviceFault>) -> u8 {
    match fault.map(|f| f.device) {
        None => 0,
        Some(Device::Furnace) => 1,
        Some(Device::FlowController) => 2,
    }
}

fn ms_to_s(ms: u64) -> u32 {
    (ms / 1000).min(u32::MAX as u64) as u32
}

fn stage_from_record(record: &StageRecord) -> Stage {
    Stage {
        target_x10: record.target_x10,
        ramp_s: record.ramp_s,
        hold_s: record.hold_s,
        flow_sccm: record.flow_sccm,
    }
}

fn mode_code(mode: FurnaceMode) -> u8 {
    match mode {
        FurnaceMode::Stop => 0,
        FurnaceMode::Run => 1,
        FurnaceMode::Program => 2,
    }
}

/// Console form of a sample; failed reads are flagged and zeroed
pub fn sample_record(sample: &Sample) -> SampleRecord {
    let mut flags = 0;
    if sample.furnace.is_none() {
        flags |= FLAG_FURNACE_FAILED;
    }
    if sample.actual_flow_sccm.is_none() {
        flags |= FLAG_FLOW_FAILED;
    }
    if sample.valve == ValveState::Open {
        flags |= FLAG_VALVE_OPEN;
    }
    SampleRecord {
        timestamp_ms: sample.timestamp_ms,
        flags,
        temperature_x10: sample.process_temperature_x10().unwrap_or(0),
        setpoint_x10: sample.setpoint_x10().unwrap_or(0),
        mode: sample.furnace_mode().map_or(0, mode_code),
        flow_sccm: sample.actual_flow_sccm.unwrap_or(0.0),
    }
}

/// Console form of an export row
pub fn export_record(row: &ExportRow) -> ExportRecord {
    let mut flags = 0;
    if row.process_temperature_x10.is_none() {
        flags |= FLAG_FURNACE_FAILED;
    }
    if row.actual_flow_sccm.is_none() {
        flags |= FLAG_FLOW_FAILED;
    }
    ExportRecord {
        timestamp_ms: row.timestamp_ms,
        flags,
        temperature_x10: row.process_temperature_x10.unwrap_or(0),
        setpoint_x10: row.setpoint_x10.unwrap_or(0),
        flow_sccm: row.actual_flow_sccm.unwrap_or(0.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anneal_core::config::RecipeError;
    use anneal_core::safety::SafetyMonitor;
    use anneal_core::sequencer::DeviceCommand;
    use anneal_core::traits::{FurnaceStatus, LinkError};

    fn fault(device: Device, error: LinkError) -> DeviceFault {
        DeviceFault {
            device,
            command: Some(DeviceCommand::FlowSetpoint(20.0)),
            error,
            attempts: 3,
        }
    }

    #[test]
    fn test_refusal_reasons() {
        let hot = SafetyMonitor::new(300).evaluate_temperature(Some(450));
        assert_eq!(
            refusal(SequencerError::InvalidRecipe(RecipeError::Empty)),
            NakReason::InvalidRecipe
        );
        assert_eq!(refusal(SequencerError::InvalidPhase), NakReason::InvalidPhase);
        assert_eq!(
            refusal(SequencerError::UnsafeShutdown(hot)),
            NakReason::UnsafeShutdown
        );
        assert_eq!(
            refusal(SequencerError::DeviceUnreachable(fault(
                Device::Furnace,
                LinkError::Timeout
            ))),
            NakReason::DeviceUnreachable
        );
        assert_eq!(
            refusal(SequencerError::Range(fault(
                Device::FlowController,
                LinkError::Range
            ))),
            NakReason::DeviceUnreachable
        );
        assert_eq!(refusal(SequencerError::RunActive), NakReason::RunActive);
    }

    #[test]
    fn test_sample_record_full() {
        let sample = Sample {
            timestamp_ms: 5_000_000_000,
            furnace: Some(FurnaceStatus {
                process_value_x10: 4985,
                setpoint_x10: 5000,
                mode: FurnaceMode::Run,
            }),
            actual_flow_sccm: Some(19.5),
            valve: ValveState::Open,
        };
        let record = sample_record(&sample);
        assert_eq!(record.timestamp_ms, 5_000_000_000);
        assert_eq!(record.flags, FLAG_VALVE_OPEN);
        assert_eq!(record.temperature_x10, 4985);
        assert_eq!(record.setpoint_x10, 5000);
        assert_eq!(record.mode, 1);
        assert_eq!(record.flow_sccm, 19.5);
    }

    #[test]
    fn test_sample_record_failed_reads() {
        let sample = Sample {
            timestamp_ms: 1000,
            furnace: None,
            actual_flow_sccm: None,
            valve: ValveState::Closed,
        };
        let record = sample_record(&sample);
        assert_eq!(record.flags, FLAG_FURNACE_FAILED | FLAG_FLOW_FAILED);
        assert_eq!(record.temperature_x10, 0);
        assert_eq!(record.setpoint_x10, 0);
        assert_eq!(record.mode, 0);
        assert_eq!(record.flow_sccm, 0.0);
    }

    #[test]
    fn test_export_record_flags() {
        let row = ExportRow {
            timestamp_ms: 60_000,
            process_temperature_x10: Some(-5),
            setpoint_x10: None,
            actual_flow_sccm: None,
        };
        let record = export_record(&row);
        assert_eq!(record.timestamp_ms, 60_000);
        assert_eq!(record.flags, FLAG_FLOW_FAILED);
        assert_eq!(record.temperature_x10, -5);
        assert_eq!(record.setpoint_x10, 0);

        let row = ExportRow {
            process_temperature_x10: None,
            actual_flow_sccm: Some(4.0),
            ..row
        };
        assert_eq!(export_record(&row).flags, FLAG_FURNACE_FAILED);
    }

    #[test]
    fn test_finish_estimate() {
        assert_eq!(finish_in_s(None, 0), NO_ESTIMATE);
        assert_eq!(finish_in_s(Some(90_500), 30_000), 60);
        // Already past the estimate
        assert_eq!(finish_in_s(Some(10_000), 30_000), 0);
        // Huge estimates never collide with the marker
        assert_eq!(finish_in_s(Some(u64::MAX), 0), NO_ESTIMATE - 1);
    }

    #[test]
    fn test_fault_codes() {
        assert_eq!(fault_code(None), 0);
        assert_eq!(fault_code(Some(fault(Device::Furnace, LinkError::Bus))), 1);
        assert_eq!(
            fault_code(Some(fault(Device::FlowController, LinkError::Timeout))),
            2
        );
    }

    #[test]
    fn test_stage_from_record() {
        let record = StageRecord {
            index: 3,
            target_x10: 8000,
            ramp_s: 2700,
            hold_s: 7200,
            flow_sccm: 40.0,
        };
        assert_eq!(
            stage_from_record(&record),
            Stage {
                target_x10: 8000,
                ramp_s: 2700,
                hold_s: 7200,
                flow_sccm: 40.0,
            }
        );
    }

    #[test]
    fn test_mode_codes() {
        assert_eq!(mode_code(FurnaceMode::Stop), 0);
        assert_eq!(mode_code(FurnaceMode::Run), 1);
        assert_eq!(mode_code(FurnaceMode::Program), 2);
    }
}
