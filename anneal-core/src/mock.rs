//! In-memory instruments for host tests

use std::collections::VecDeque;
use std::vec::Vec;

use anneal_protocol::FlowRange;
use embedded_hal_async::delay::DelayNs;

use crate::sequencer::DeviceCommand;
use crate::traits::{FlowController, Furnace, FurnaceMode, FurnaceStatus, LinkError, ValveState};

pub struct MockFurnace {
    pub temperature_x10: i16,
    pub setpoint_x10: i16,
    pub mode: FurnaceMode,
    /// Errors returned by the next write commands, in order
    pub fail_next: VecDeque<LinkError>,
    /// Errors returned by the next status reads, in order
    pub read_failures: VecDeque<LinkError>,
    /// Write attempts, including failed ones
    pub writes: usize,
    /// Writes that succeeded
    pub commands: Vec<DeviceCommand>,
}

impl MockFurnace {
    pub fn at(temperature_x10: i16) -> Self {
        Self {
            temperature_x10,
            setpoint_x10: 0,
            mode: FurnaceMode::Stop,
            fail_next: VecDeque::new(),
            read_failures: VecDeque::new(),
            writes: 0,
            commands: Vec::new(),
        }
    }

    fn write(&mut self, command: DeviceCommand) -> Result<(), LinkError> {
        self.writes += 1;
        if let Some(err) = self.fail_next.pop_front() {
            return Err(err);
        }
        self.commands.push(command);
        Ok(())
    }
}

impl Furnace for MockFurnace {
    async fn set_setpoint(&mut self, temp_x10: i16) -> Result<(), LinkError> {
        self.write(DeviceCommand::FurnaceSetpoint(temp_x10))?;
        self.setpoint_x10 = temp_x10;
        Ok(())
    }

    async fn set_mode(&mut self, mode: FurnaceMode) -> Result<(), LinkError> {
        self.write(DeviceCommand::FurnaceMode(mode))?;
        self.mode = mode;
        Ok(())
    }

    async fn read_status(&mut self) -> Result<FurnaceStatus, LinkError> {
        if let Some(err) = self.read_failures.pop_front() {
            return Err(err);
        }
        Ok(FurnaceStatus {
            process_value_x10: self.temperature_x10,
            setpoint_x10: self.setpoint_x10,
            mode: self.mode,
        })
    }
}

pub struct MockFlow {
    pub range: Option<FlowRange>,
    pub setpoint_sccm: f32,
    pub actual_sccm: f32,
    pub valve: ValveState,
    pub fail_next: VecDeque<LinkError>,
    pub read_failures: VecDeque<LinkError>,
    pub writes: usize,
    pub commands: Vec<DeviceCommand>,
}

impl MockFlow {
    pub fn new() -> Self {
        Self {
            range: None,
            setpoint_sccm: 0.0,
            actual_sccm: 0.0,
            valve: ValveState::Unknown,
            fail_next: VecDeque::new(),
            read_failures: VecDeque::new(),
            writes: 0,
            commands: Vec::new(),
        }
    }

    /// Valve open at a steady flow in the 500 sccm range
    pub fn flowing(sccm: f32) -> Self {
        Self {
            range: Some(FlowRange::SCCM_500),
            setpoint_sccm: sccm,
            actual_sccm: sccm,
            valve: ValveState::Open,
            ..Self::new()
        }
    }

    fn write(&mut self, command: DeviceCommand) -> Result<(), LinkError> {
        self.writes += 1;
        if let Some(err) = self.fail_next.pop_front() {
            return Err(err);
        }
        self.commands.push(command);
        Ok(())
    }
}

impl FlowController for MockFlow {
    async fn set_range(&mut self, range: FlowRange) -> Result<(), LinkError> {
        self.write(DeviceCommand::FlowRange(range))?;
        self.range = Some(range);
        Ok(())
    }

    async fn set_flow_setpoint(&mut self, sccm: f32) -> Result<(), LinkError> {
        let Some(range) = self.range else {
            return Err(LinkError::Range);
        };
        if sccm < 0.0 || sccm > range.full_scale_sccm() {
            return Err(LinkError::Range);
        }
        self.write(DeviceCommand::FlowSetpoint(sccm))?;
        self.setpoint_sccm = sccm;
        if self.valve == ValveState::Open {
            self.actual_sccm = sccm;
        }
        Ok(())
    }

    async fn open_valve(&mut self) -> Result<(), LinkError> {
        self.write(DeviceCommand::OpenValve)?;
        self.valve = ValveState::Open;
        self.actual_sccm = self.setpoint_sccm;
        Ok(())
    }

    async fn close_valve(&mut self) -> Result<(), LinkError> {
        self.write(DeviceCommand::CloseValve)?;
        self.valve = ValveState::Closed;
        self.actual_sccm = 0.0;
        Ok(())
    }

    async fn read_actual_flow(&mut self) -> Result<f32, LinkError> {
        if let Some(err) = self.read_failures.pop_front() {
            return Err(err);
        }
        Ok(self.actual_sccm)
    }

    fn valve_state(&self) -> ValveState {
        self.valve
    }

    fn range(&self) -> Option<FlowRange> {
        self.range
    }
}

/// Records requested waits without sleeping
#[derive(Default)]
pub struct MockDelay {
    pub waits_ms: Vec<u32>,
}

impl DelayNs for MockDelay {
    async fn delay_ns(&mut self, ns: u32) {
        self.waits_ms.push(ns / 1_000_000);
    }

    async fn delay_us(&mut self, us: u32) {
        self.waits_ms.push(us / 1000);
    }

    async fn delay_ms(&mut self, ms: u32) {
        self.waits_ms.push(ms);
    }
}
