// Compile-time configuration. Pin numbers follow the ESP32 DevKit wiring:
// MQ-7 AOUT -> GPIO34, MQ-135 AOUT -> GPIO35 (both ADC1),
// DSM501 Vout2 (PM1.0) -> GPIO32, Vout1 (PM2.5) -> GPIO33, DHT data -> GPIO4.

use crate::dht::DhtVariant;
use crate::gas::RegressionMethod;

pub const MQ7_ADC_PIN: i32 = 34;
pub const MQ135_ADC_PIN: i32 = 35;
pub const PM1_GPIO: i32 = 32;
pub const PM2_5_GPIO: i32 = 33;
pub const DHT_GPIO: i32 = 4;
pub const DHT_VARIANT: DhtVariant = DhtVariant::Dht11;

pub const SAMPLE_WINDOW_SECONDS: u32 = 30;
pub const REGRESSION_METHOD: RegressionMethod = RegressionMethod::Exponential;

pub const WIFI_SSID: &str = match option_env!("WIFI_SSID") {
    Some(v) => v,
    None => "root",
};
pub const WIFI_PASS: &str = match option_env!("WIFI_PASS") {
    Some(v) => v,
    None => "12345678",
};

// ADC front end: 12-bit oneshot at 11 dB attenuation (~0..3.3 V).
pub const ADC_VREF: f32 = 3.3;
pub const ADC_BITS: u32 = 12;

/// Load resistor on the MQ breakout boards, in kOhm.
pub const GAS_LOAD_RESISTANCE_KOHM: f32 = 10.0;
/// Raw samples kept in each gas sensor's moving average.
pub const GAS_SMOOTHING_WINDOW: usize = 5;
/// Background gas refresh cadence in PM_WARMUP/READY.
pub const GAS_REFRESH_MS: u64 = 1_000;

pub const CALIBRATION_SAMPLES: u8 = 10;
pub const CALIBRATION_INTERVAL_MS: u64 = 100;

pub const PM_WARMUP_SECONDS: u32 = 60;

/// Scheduler sleep between ticks. DSM501 pulses are >= 10 ms wide.
pub const TICK_MS: u64 = 5;

pub const WIFI_CONNECT_ATTEMPTS: u32 = 5;
pub const WIFI_RETRY_DELAY_MS: u64 = 2_000;
pub const WIFI_RECHECK_INTERVAL_MS: u64 = 30_000;
