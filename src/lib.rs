// lib.rs
// Indoor air-quality node: MQ-7 (CO) + MQ-135 (CO2) on ADC1, DSM501 dust sensor
// on two digital inputs, DHT11/DHT22 on a single-wire GPIO.
//
// Everything under the core modules is target independent and runs in host tests.
// Board adapters (ADC channels, DHT bit-bang, PM edge ISR, Wi-Fi) only build for ESP-IDF.

pub mod calibration;
pub mod config;
pub mod dht;
pub mod env;
pub mod error;
pub mod gas;
pub mod hal;
pub mod iaqi;
pub mod node;
pub mod pm;
pub mod report;

#[cfg(target_os = "espidf")]
pub mod adc;
#[cfg(target_os = "espidf")]
pub mod board;
#[cfg(target_os = "espidf")]
pub mod pm_isr;
#[cfg(target_os = "espidf")]
pub mod wifi;

pub use calibration::{CalibrationController, CalibrationEvent, DeviceState};
pub use error::Error;
pub use node::Node;
