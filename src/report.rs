// Human-readable serial console output: boot diagnostics and the per-window report.

use std::io::{self, Write};

use crate::calibration::CalibrationEvent;
use crate::config::PM_WARMUP_SECONDS;
use crate::env::EnvReading;
use crate::error::Error;
use crate::pm::PmSample;

pub const OPEN_CIRCUIT_WARNING: &str = "Warning: Connection issue, R0 is infinite (Open circuit detected) please check your wiring and supply";
pub const SHORT_TO_GROUND_WARNING: &str = "Warning: Connection issue found, R0 is zero (Analog pin shorts to ground) please check your wiring and supply";
pub const DHT_FAILURE: &str = "Failed to read from DHT sensor!";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Report {
    pub co_ppm: Option<f32>,
    pub co2_ppm: Option<f32>,
    pub env: EnvReading,
    pub pm: PmSample,
    pub iaqi: f32,
}

impl Report {
    pub fn write_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        match self.co_ppm {
            Some(co) => writeln!(out, "MQ-7 CO Reading: {co:.2} PPM")?,
            None => writeln!(out, "Failed to read from MQ-7 sensor!")?,
        }
        match self.co2_ppm {
            Some(co2) => writeln!(out, "MQ-135 CO2 Reading: {co2:.2} PPM")?,
            None => writeln!(out, "Failed to read from MQ-135 sensor!")?,
        }
        match (self.env.humidity(), self.env.temperature()) {
            (Some(h), Some(t)) => writeln!(out, "Humidity: {h:.2} %  Temperature: {t:.2} *C")?,
            _ => writeln!(out, "{DHT_FAILURE}")?,
        }
        writeln!(
            out,
            "PM1.0 particle count: {} parts/283mL",
            self.pm.particle_count_pm1
        )?;
        writeln!(
            out,
            "PM2.5 particle count: {} parts/283mL",
            self.pm.particle_count_pm2_5
        )?;
        writeln!(
            out,
            "PM1.0 ~ PM2.5 concentration: {:.2} ug/m3",
            self.pm.concentration_ug_m3
        )?;
        writeln!(out, "Indoor Air Quality Index: {:.2}", self.iaqi)?;
        out.flush()
    }
}

/// Boot-time progress for the calibration/warm-up sequence.
pub fn write_event<W: Write>(out: &mut W, event: &CalibrationEvent) -> io::Result<()> {
    match event {
        CalibrationEvent::Started => write!(out, "Calibrating please wait")?,
        CalibrationEvent::Progress(_) => write!(out, ".")?,
        CalibrationEvent::Calibrated { .. } => {
            writeln!(out, " done!")?;
            writeln!(out, "Wait {PM_WARMUP_SECONDS}s for DSM501 to warm up")?;
        }
        CalibrationEvent::WarmupProgress(s) => {
            writeln!(out, "{s} s (wait {PM_WARMUP_SECONDS}s for DSM501 to warm up)")?
        }
        CalibrationEvent::Ready => {
            writeln!(out, "DSM501 is ready!")?;
            writeln!(out)?;
        }
        CalibrationEvent::Fault(err) => {
            writeln!(out)?;
            writeln!(out, "{}", fault_diagnostic(err))?;
        }
    }
    out.flush()
}

pub fn fault_diagnostic(err: &Error) -> String {
    match err {
        Error::OpenCircuit(_) => OPEN_CIRCUIT_WARNING.to_string(),
        Error::ShortToGround(_) => SHORT_TO_GROUND_WARNING.to_string(),
        other => format!("Warning: {other}"),
    }
}
