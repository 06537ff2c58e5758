// Power-on sequence: BOOT -> CALIBRATING -> PM_WARMUP -> READY, or FAULT.
//
// The controller is clocked by the scheduler. Each CALIBRATING step takes one
// fresh sample from both gas sensors and accumulates their candidate R0; after
// `CALIBRATION_SAMPLES` steps the means are installed. A non-finite mean means
// the sensor is disconnected, a zero mean means the analog line is shorted.
// Either is terminal.

use log::{error, info, warn};

use crate::config::{CALIBRATION_INTERVAL_MS, CALIBRATION_SAMPLES, PM_WARMUP_SECONDS};
use crate::error::Error;
use crate::gas::GasSensor;
use crate::hal::AnalogInput;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Boot,
    Calibrating,
    PmWarmup,
    Ready,
    Fault,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationEvent {
    Started,
    /// One paired sample taken (1-based).
    Progress(u8),
    Calibrated { r0_co: f32, r0_co2: f32 },
    /// Whole seconds of PM warm-up elapsed.
    WarmupProgress(u32),
    Ready,
    Fault(Error),
}

pub struct CalibrationController {
    state: DeviceState,
    taken: u8,
    sum_co: f32,
    sum_co2: f32,
    next_sample_ms: u64,
    warmup_started_ms: u64,
    warmup_reported_s: u32,
    fault: Option<Error>,
}

impl Default for CalibrationController {
    fn default() -> Self {
        Self::new()
    }
}

impl CalibrationController {
    pub fn new() -> Self {
        Self {
            state: DeviceState::Boot,
            taken: 0,
            sum_co: 0.0,
            sum_co2: 0.0,
            next_sample_ms: 0,
            warmup_started_ms: 0,
            warmup_reported_s: 0,
            fault: None,
        }
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    pub fn fault(&self) -> Option<&Error> {
        self.fault.as_ref()
    }

    /// Advances the sequence by at most one step.
    pub fn tick<A, B>(
        &mut self,
        now_ms: u64,
        co: &mut GasSensor<A>,
        co2: &mut GasSensor<B>,
    ) -> Option<CalibrationEvent>
    where
        A: AnalogInput,
        B: AnalogInput,
    {
        match self.state {
            DeviceState::Boot => {
                info!("calibrating {} and {} in clean air", co.label(), co2.label());
                self.state = DeviceState::Calibrating;
                self.next_sample_ms = now_ms;
                Some(CalibrationEvent::Started)
            }
            DeviceState::Calibrating => self.calibrate_step(now_ms, co, co2),
            DeviceState::PmWarmup => self.warmup_step(now_ms),
            DeviceState::Ready | DeviceState::Fault => None,
        }
    }

    fn calibrate_step<A, B>(
        &mut self,
        now_ms: u64,
        co: &mut GasSensor<A>,
        co2: &mut GasSensor<B>,
    ) -> Option<CalibrationEvent>
    where
        A: AnalogInput,
        B: AnalogInput,
    {
        if self.taken >= CALIBRATION_SAMPLES {
            return Some(self.install(now_ms, co, co2));
        }
        if now_ms < self.next_sample_ms {
            return None;
        }
        self.next_sample_ms = now_ms + CALIBRATION_INTERVAL_MS;

        // A failed conversion does not count as a sample; retry next interval.
        if let Err(err) = co.update().and_then(|_| co2.update()) {
            warn!("calibration sample skipped: {err}");
            return None;
        }

        self.sum_co += co.calibrate(co.model().clean_air_ratio);
        self.sum_co2 += co2.calibrate(co2.model().clean_air_ratio);
        self.taken += 1;
        Some(CalibrationEvent::Progress(self.taken))
    }

    fn install<A, B>(
        &mut self,
        now_ms: u64,
        co: &mut GasSensor<A>,
        co2: &mut GasSensor<B>,
    ) -> CalibrationEvent {
        let samples = f32::from(CALIBRATION_SAMPLES);
        let r0_co = self.sum_co / samples;
        let r0_co2 = self.sum_co2 / samples;

        // Open circuit on either sensor is reported before a short on either.
        let verdict = if !r0_co.is_finite() {
            Err(Error::OpenCircuit(co.label()))
        } else if !r0_co2.is_finite() {
            Err(Error::OpenCircuit(co2.label()))
        } else {
            co.set_r0(r0_co).and_then(|_| co2.set_r0(r0_co2))
        };

        match verdict {
            Ok(()) => {
                info!(
                    "R0 installed: {} = {:.3} kOhm, {} = {:.3} kOhm",
                    co.label(),
                    r0_co,
                    co2.label(),
                    r0_co2
                );
                self.state = DeviceState::PmWarmup;
                self.warmup_started_ms = now_ms;
                self.warmup_reported_s = 0;
                CalibrationEvent::Calibrated { r0_co, r0_co2 }
            }
            Err(err) => {
                error!("calibration failed: {err}");
                self.state = DeviceState::Fault;
                self.fault = Some(err.clone());
                CalibrationEvent::Fault(err)
            }
        }
    }

    fn warmup_step(&mut self, now_ms: u64) -> Option<CalibrationEvent> {
        let elapsed_s = (now_ms.saturating_sub(self.warmup_started_ms) / 1_000) as u32;
        if elapsed_s >= PM_WARMUP_SECONDS {
            self.state = DeviceState::Ready;
            return Some(CalibrationEvent::Ready);
        }
        if elapsed_s > self.warmup_reported_s {
            self.warmup_reported_s = elapsed_s;
            return Some(CalibrationEvent::WarmupProgress(elapsed_s));
        }
        None
    }
}
