// Cooperative acquisition scheduler.
//
// One `tick` per main-loop iteration. The calibration sequence runs first;
// once it leaves CALIBRATING the PM sampler is armed and gas readings are
// refreshed in the background. A full report goes out only when the sampler
// closes a window while the device is READY, so emissions are spaced by at
// least the sampling window. Nothing is published from FAULT.

use std::io::Write;

use anyhow::{Context, Result};
use log::{debug, info, warn};

use crate::calibration::{CalibrationController, CalibrationEvent, DeviceState};
use crate::config::GAS_REFRESH_MS;
use crate::dht::HumitureSensor;
use crate::env::{EnvReading, EnvSensor};
use crate::gas::GasSensor;
use crate::hal::{AnalogInput, Clock};
use crate::iaqi::{self, IaqiInputs};
use crate::pm::{LpoSource, PmSampler};
use crate::report::{self, Report};

pub struct Node<A, B, S, H, C> {
    co: GasSensor<A>,
    co2: GasSensor<B>,
    pm: PmSampler<S>,
    env: EnvSensor<H>,
    clock: C,
    calibration: CalibrationController,
    next_gas_refresh_ms: u64,
    last_report: Option<Report>,
    reports: u32,
}

impl<A, B, S, H, C> Node<A, B, S, H, C>
where
    A: AnalogInput,
    B: AnalogInput,
    S: LpoSource,
    H: HumitureSensor,
    C: Clock,
{
    pub fn new(
        co: GasSensor<A>,
        co2: GasSensor<B>,
        pm: PmSampler<S>,
        env: EnvSensor<H>,
        clock: C,
    ) -> Self {
        Self {
            co,
            co2,
            pm,
            env,
            clock,
            calibration: CalibrationController::new(),
            next_gas_refresh_ms: 0,
            last_report: None,
            reports: 0,
        }
    }

    pub fn state(&self) -> DeviceState {
        self.calibration.state()
    }

    pub fn last_report(&self) -> Option<&Report> {
        self.last_report.as_ref()
    }

    pub fn reports_emitted(&self) -> u32 {
        self.reports
    }

    /// Runs one scheduler step, writing any console output to `out`.
    pub fn tick<W: Write>(&mut self, out: &mut W) -> Result<DeviceState> {
        let now_us = self.clock.now_us();
        let now_ms = now_us / 1_000;
        let before = self.calibration.state();

        if let Some(event) = self.calibration.tick(now_ms, &mut self.co, &mut self.co2) {
            report::write_event(out, &event).context("writing boot diagnostics")?;
            if let CalibrationEvent::Calibrated { .. } = event {
                self.pm.begin(now_ms);
                self.next_gas_refresh_ms = now_ms + GAS_REFRESH_MS;
            }
        }

        let state = self.calibration.state();
        if state != before {
            info!("state {before:?} -> {state:?}");
        }

        match state {
            DeviceState::PmWarmup | DeviceState::Ready => {
                if self.pm.update(now_us) && state == DeviceState::Ready {
                    self.publish(out)?;
                } else if now_ms >= self.next_gas_refresh_ms {
                    self.refresh_gas();
                    self.next_gas_refresh_ms = now_ms + GAS_REFRESH_MS;
                }
            }
            DeviceState::Boot | DeviceState::Calibrating | DeviceState::Fault => {}
        }

        Ok(state)
    }

    fn refresh_gas(&mut self) {
        if let Err(err) = self.co.update() {
            debug!("background {} sample skipped: {err}", self.co.label());
        }
        if let Err(err) = self.co2.update() {
            debug!("background {} sample skipped: {err}", self.co2.label());
        }
    }

    fn publish<W: Write>(&mut self, out: &mut W) -> Result<()> {
        let Some(pm) = self.pm.last_sample().copied() else {
            return Ok(());
        };

        // Both gas updates land before either read.
        let co_sampled = sample(&mut self.co);
        let co2_sampled = sample(&mut self.co2);
        let co_ppm = if co_sampled { concentration(&self.co) } else { None };
        let co2_ppm = if co2_sampled { concentration(&self.co2) } else { None };
        let env = self.env.read().unwrap_or(EnvReading::INVALID);

        let iaqi = iaqi::fuse(&IaqiInputs {
            co_ppm,
            co2_ppm,
            pm2_5_ug_m3: Some(pm.concentration_ug_m3),
            temperature_c: env.temperature(),
            humidity_pct: env.humidity(),
        });

        let report = Report {
            co_ppm,
            co2_ppm,
            env,
            pm,
            iaqi,
        };
        report.write_to(out).context("writing report")?;
        debug!("report {}: {report:?}", self.reports);

        self.last_report = Some(report);
        self.reports += 1;
        Ok(())
    }
}

/// Takes one more sample. A failed conversion marks the gas as missing for
/// this report; the moving average still holds older samples.
fn sample<A: AnalogInput>(sensor: &mut GasSensor<A>) -> bool {
    match sensor.update() {
        Ok(()) => true,
        Err(err) => {
            warn!("{} sample failed: {err}", sensor.label());
            false
        }
    }
}

fn concentration<A>(sensor: &GasSensor<A>) -> Option<f32> {
    match sensor.read() {
        Ok(ppm) => Some(ppm),
        Err(err) => {
            warn!("{} reading unavailable: {err}", sensor.label());
            None
        }
    }
}
