// ADC1 oneshot channels for the MQ-7/MQ-135 analog outputs.
// Raw 12-bit counts only; the gas model does its own ratiometric math.

use anyhow::Result;
use esp_idf_hal::adc::attenuation::DB_11;
use esp_idf_hal::adc::oneshot::config::{AdcChannelConfig, Calibration};
use esp_idf_hal::adc::oneshot::{AdcChannelDriver, AdcDriver};
use esp_idf_hal::adc::ADC1;
use esp_idf_hal::gpio::ADCPin;
use esp_idf_hal::peripheral::Peripheral;

use crate::error::Error;
use crate::hal::AnalogInput;

pub type Adc1 = AdcDriver<'static, ADC1>;

/// Both gas channels share one ADC1 unit for the lifetime of the firmware.
pub fn init_adc1(adc: impl Peripheral<P = ADC1> + 'static) -> Result<&'static Adc1> {
    let driver = AdcDriver::new(adc)?;
    Ok(Box::leak(Box::new(driver)))
}

pub struct AdcInput<T>
where
    T: ADCPin<Adc = ADC1> + 'static,
{
    channel: AdcChannelDriver<'static, T, &'static Adc1>,
}

impl<T> AdcInput<T>
where
    T: ADCPin<Adc = ADC1> + 'static,
{
    pub fn new(adc: &'static Adc1, pin: impl Peripheral<P = T> + 'static) -> Result<Self> {
        // 11 dB attenuation covers the 0..3.3 V swing of the MQ boards.
        let config = AdcChannelConfig {
            attenuation: DB_11,
            calibration: Calibration::None,
            ..Default::default()
        };
        let channel = AdcChannelDriver::new(adc, pin, &config)?;
        Ok(Self { channel })
    }
}

impl<T> AnalogInput for AdcInput<T>
where
    T: ADCPin<Adc = ADC1> + 'static,
{
    fn read_raw(&mut self) -> Result<u16, Error> {
        self.channel.read_raw().map_err(|err| Error::Adc(err.code()))
    }
}
