// Indoor Air Quality Index (0 worst .. 10 best).
//
// Each input maps linearly from its best value (subscore 10) to its worst
// value (subscore 0) and is clipped. Missing inputs score 0 and the weights
// stay fixed, so an absent environment reading can only lower the index.

/// Linear band from the best to the worst value of one input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Band {
    pub best: f32,
    pub worst: f32,
}

pub const CO_PPM: Band = Band { best: 0.0, worst: 9.0 };
pub const CO2_PPM: Band = Band {
    best: 400.0,
    worst: 2000.0,
};
pub const PM2_5_UG_M3: Band = Band { best: 0.0, worst: 35.5 };
pub const TEMPERATURE_C: Band = Band {
    best: 18.0,
    worst: 24.0,
};
pub const HUMIDITY_PCT: Band = Band {
    best: 30.0,
    worst: 60.0,
};

pub const WEIGHT_CO: f32 = 0.30;
pub const WEIGHT_CO2: f32 = 0.30;
pub const WEIGHT_PM2_5: f32 = 0.20;
pub const WEIGHT_TEMPERATURE: f32 = 0.10;
pub const WEIGHT_HUMIDITY: f32 = 0.10;

impl Band {
    /// `clip(10 - 10 * (x - best) / (worst - best), 0, 10)`; NaN scores 0.
    pub fn subscore(&self, x: f32) -> f32 {
        if x.is_nan() {
            return 0.0;
        }
        let score = 10.0 - 10.0 * (x - self.best) / (self.worst - self.best);
        score.clamp(0.0, 10.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IaqiInputs {
    pub co_ppm: Option<f32>,
    pub co2_ppm: Option<f32>,
    pub pm2_5_ug_m3: Option<f32>,
    pub temperature_c: Option<f32>,
    pub humidity_pct: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Subscores {
    pub co: f32,
    pub co2: f32,
    pub pm2_5: f32,
    pub temperature: f32,
    pub humidity: f32,
}

impl Subscores {
    pub fn of(inputs: &IaqiInputs) -> Self {
        let score = |band: &Band, x: Option<f32>| x.map_or(0.0, |v| band.subscore(v));
        Self {
            co: score(&CO_PPM, inputs.co_ppm),
            co2: score(&CO2_PPM, inputs.co2_ppm),
            pm2_5: score(&PM2_5_UG_M3, inputs.pm2_5_ug_m3),
            temperature: score(&TEMPERATURE_C, inputs.temperature_c),
            humidity: score(&HUMIDITY_PCT, inputs.humidity_pct),
        }
    }

    pub fn weighted(&self) -> f32 {
        let sum = self.co * WEIGHT_CO
            + self.co2 * WEIGHT_CO2
            + self.pm2_5 * WEIGHT_PM2_5
            + self.temperature * WEIGHT_TEMPERATURE
            + self.humidity * WEIGHT_HUMIDITY;
        // Guard against rounding just past the ends.
        sum.clamp(0.0, 10.0)
    }
}

pub fn fuse(inputs: &IaqiInputs) -> f32 {
    Subscores::of(inputs).weighted()
}

/// Convenience form for a full set of readings.
pub fn indoor_aqi(co: f32, co2: f32, pm2_5: f32, temperature: f32, humidity: f32) -> f32 {
    fuse(&IaqiInputs {
        co_ppm: Some(co),
        co2_ppm: Some(co2),
        pm2_5_ug_m3: Some(pm2_5),
        temperature_c: Some(temperature),
        humidity_pct: Some(humidity),
    })
}
