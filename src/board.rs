use anyhow::Result;
use esp_idf_hal::gpio::{Gpio34, Gpio35, Gpio4};
use esp_idf_hal::modem::Modem;
use esp_idf_hal::peripherals::Peripherals;
use log::info;

use crate::adc::{init_adc1, AdcInput};
use crate::config::{DHT_GPIO, DHT_VARIANT, MQ135_ADC_PIN, MQ7_ADC_PIN};
use crate::dht::{init_dht, DhtSensor};
use crate::pm_isr::IsrLpo;

pub struct Board {
    pub mq7: AdcInput<Gpio34>,
    pub mq135: AdcInput<Gpio35>,
    pub pm: IsrLpo,
    pub dht: DhtSensor<'static, Gpio4>,
    pub modem: Modem,
}

impl Board {
    pub fn init() -> Result<Self> {
        let Peripherals {
            pins, adc1, modem, ..
        } = Peripherals::take()?;

        let adc = init_adc1(adc1)?;
        let mq7 = AdcInput::new(adc, pins.gpio34)?;
        let mq135 = AdcInput::new(adc, pins.gpio35)?;
        info!("MQ-7 on GPIO{MQ7_ADC_PIN}, MQ-135 on GPIO{MQ135_ADC_PIN}");

        let pm = IsrLpo::install(pins.gpio32, pins.gpio33)?;

        let dht = init_dht(pins.gpio4, DHT_VARIANT)?;
        info!("{DHT_VARIANT:?} sensor on GPIO{DHT_GPIO}");

        Ok(Self {
            mq7,
            mq135,
            pm,
            dht,
            modem,
        })
    }
}
