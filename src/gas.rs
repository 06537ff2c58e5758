// Metal-oxide gas sensor model (MQ-7, MQ-135).
//
// The sensing element and the board's load resistor form a divider fed from
// the ADC reference, so the sensor resistance follows ratiometrically from
// the averaged ADC counts:
//
// `Rs = RL * (Vc / V - 1) = RL * (ADC_MAX - counts) / counts`
//
// Concentration is a power law of the ratio to the clean-air baseline:
// `ppm = A * (Rs / R0)^B`.

use crate::config::{
    ADC_BITS, ADC_VREF, GAS_LOAD_RESISTANCE_KOHM, GAS_SMOOTHING_WINDOW, REGRESSION_METHOD,
};
use crate::error::Error;
use crate::hal::AnalogInput;

const ADC_MAX: u16 = (1 << ADC_BITS) - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegressionMethod {
    /// `ppm = A * ratio^B`
    Exponential,
    /// `ppm = 10^((log10(ratio) - B) / A)`
    Linear,
}

/// Datasheet curve fit and clean-air ratio for one sensor/gas pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GasModel {
    pub label: &'static str,
    pub a: f32,
    pub b: f32,
    pub clean_air_ratio: f32,
}

pub const MQ7_CO: GasModel = GasModel {
    label: "MQ-7",
    a: 99.042,
    b: -1.518,
    clean_air_ratio: 26.0,
};

pub const MQ135_CO2: GasModel = GasModel {
    label: "MQ-135",
    a: 110.47,
    b: -2.862,
    clean_air_ratio: 3.6,
};

pub struct GasSensor<A> {
    model: GasModel,
    method: RegressionMethod,
    input: A,
    // Ring buffer of the last raw samples.
    samples: [u16; GAS_SMOOTHING_WINDOW],
    filled: usize,
    next: usize,
    r0: Option<f32>,
}

impl<A> GasSensor<A> {
    pub fn new(model: GasModel, input: A) -> Self {
        Self {
            model,
            method: REGRESSION_METHOD,
            input,
            samples: [0; GAS_SMOOTHING_WINDOW],
            filled: 0,
            next: 0,
            r0: None,
        }
    }

    pub fn with_method(mut self, method: RegressionMethod) -> Self {
        self.method = method;
        self
    }

    pub fn model(&self) -> &GasModel {
        &self.model
    }

    pub fn label(&self) -> &'static str {
        self.model.label
    }

    pub fn r0(&self) -> Option<f32> {
        self.r0
    }

    /// Moving-average voltage over the buffered samples.
    pub fn voltage(&self) -> Option<f32> {
        Some(self.mean_counts()? * ADC_VREF / f32::from(ADC_MAX))
    }

    fn mean_counts(&self) -> Option<f32> {
        if self.filled == 0 {
            return None;
        }
        let sum: u32 = self.samples[..self.filled].iter().map(|s| u32::from(*s)).sum();
        Some(sum as f32 / self.filled as f32)
    }

    /// Current sensing resistance in kOhm. A 0 V reading yields infinity.
    pub fn resistance(&self) -> Option<f32> {
        let counts = self.mean_counts()?;
        let rs = GAS_LOAD_RESISTANCE_KOHM * (f32::from(ADC_MAX) - counts) / counts;
        Some(rs.max(0.0))
    }

    /// Candidate R0 assuming the sensor currently sits in clean air.
    pub fn calibrate(&self, clean_air_ratio: f32) -> f32 {
        match self.resistance() {
            Some(rs) => rs / clean_air_ratio,
            None => f32::NAN,
        }
    }

    /// Installs the session's baseline. Rejects open-circuit and shorted aggregates.
    pub fn set_r0(&mut self, value: f32) -> Result<(), Error> {
        debug_assert!(self.r0.is_none(), "R0 installed twice for {}", self.model.label);
        if !value.is_finite() {
            return Err(Error::OpenCircuit(self.model.label));
        }
        if value <= 0.0 {
            return Err(Error::ShortToGround(self.model.label));
        }
        self.r0 = Some(value);
        Ok(())
    }

    pub fn ratio(&self) -> Result<f32, Error> {
        let r0 = self.r0.ok_or(Error::Uncalibrated(self.model.label))?;
        if !r0.is_finite() || r0 <= 0.0 {
            return Err(Error::SensorFault(self.model.label));
        }
        let rs = self.resistance().ok_or(Error::SensorFault(self.model.label))?;
        let ratio = rs / r0;
        if !ratio.is_finite() || ratio <= 0.0 {
            return Err(Error::SensorFault(self.model.label));
        }
        Ok(ratio)
    }

    /// Concentration in ppm from the current Rs estimate.
    pub fn read(&self) -> Result<f32, Error> {
        let ratio = self.ratio()?;
        let GasModel { a, b, .. } = self.model;
        let ppm = match self.method {
            RegressionMethod::Exponential => a * ratio.powf(b),
            RegressionMethod::Linear => 10f32.powf((ratio.log10() - b) / a),
        };
        if ppm.is_nan() {
            return Err(Error::SensorFault(self.model.label));
        }
        Ok(ppm.clamp(0.0, f32::MAX))
    }

    fn push(&mut self, raw: u16) {
        self.samples[self.next] = raw.min(ADC_MAX);
        self.next = (self.next + 1) % GAS_SMOOTHING_WINDOW;
        self.filled = (self.filled + 1).min(GAS_SMOOTHING_WINDOW);
    }
}

impl<A: AnalogInput> GasSensor<A> {
    /// Takes one raw sample into the moving average.
    pub fn update(&mut self) -> Result<(), Error> {
        let raw = self.input.read_raw()?;
        self.push(raw);
        Ok(())
    }
}
