// Temperature/humidity wrapper. Failures are per read and never latched.

use log::warn;

use crate::dht::{DhtError, HumitureSensor};
use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvReading {
    pub temperature_c: f32,
    pub humidity_pct: f32,
    pub valid: bool,
}

impl EnvReading {
    pub const INVALID: Self = Self {
        temperature_c: f32::NAN,
        humidity_pct: f32::NAN,
        valid: false,
    };

    pub fn temperature(&self) -> Option<f32> {
        self.valid.then_some(self.temperature_c)
    }

    pub fn humidity(&self) -> Option<f32> {
        self.valid.then_some(self.humidity_pct)
    }
}

pub struct EnvSensor<S> {
    sensor: S,
}

impl<S: HumitureSensor> EnvSensor<S> {
    pub fn new(sensor: S) -> Self {
        Self { sensor }
    }

    pub fn read(&mut self) -> Result<EnvReading, Error> {
        let reading = self.sensor.read().map_err(|err| {
            warn!("DHT read failed: {err}");
            Error::TransientRead(match err {
                DhtError::Timeout(stage) => stage,
                DhtError::Checksum => "checksum",
                DhtError::Gpio(_) => "gpio",
            })
        })?;

        if !reading.temperature_c.is_finite() || !reading.humidity_pct.is_finite() {
            warn!("DHT returned non-finite values: {reading:?}");
            return Err(Error::TransientRead("non-finite value"));
        }

        Ok(EnvReading {
            temperature_c: reading.temperature_c,
            humidity_pct: reading.humidity_pct,
            valid: true,
        })
    }
}
