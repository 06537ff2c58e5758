use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DhtVariant {
    Dht11,
    Dht22,
}

impl DhtVariant {
    /// How long the host holds the line low to request a frame.
    pub fn start_signal_ms(self) -> u32 {
        match self {
            // DHT11 needs at least 18 ms.
            Self::Dht11 => 20,
            Self::Dht22 => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DhtReading {
    pub temperature_c: f32,
    pub humidity_pct: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DhtError {
    Timeout(&'static str),
    Checksum,
    /// ESP-IDF error code from the GPIO driver.
    Gpio(i32),
}

impl fmt::Display for DhtError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout(stage) => write!(f, "timeout waiting for DHT {stage}"),
            Self::Checksum => write!(f, "DHT checksum mismatch"),
            Self::Gpio(code) => write!(f, "GPIO error: {code}"),
        }
    }
}

impl std::error::Error for DhtError {}

/// Anything that can produce one temperature/humidity frame on demand.
pub trait HumitureSensor {
    fn read(&mut self) -> Result<DhtReading, DhtError>;
}

/// Decodes the 5-byte frame: humidity (2), temperature (2), checksum (1).
pub fn decode(variant: DhtVariant, data: &[u8; 5]) -> Result<DhtReading, DhtError> {
    // Checksum is the low byte of the sum of the first 4 data bytes.
    let checksum = ((data[0] as u16 + data[1] as u16 + data[2] as u16 + data[3] as u16) & 0xFF) as u8;
    if checksum != data[4] {
        return Err(DhtError::Checksum);
    }

    match variant {
        // DHT11: integer and decimal bytes; bit 7 of the temperature decimal is the sign.
        DhtVariant::Dht11 => {
            let humidity = f32::from(data[0]) + f32::from(data[1]) * 0.1;
            let mut temperature = f32::from(data[2]) + f32::from(data[3] & 0x7F) * 0.1;
            if data[3] & 0x80 != 0 {
                temperature = -temperature;
            }
            Ok(DhtReading {
                temperature_c: temperature,
                humidity_pct: humidity,
            })
        }
        // DHT22: 16-bit humidity (0.1% RH), 16-bit temp (0.1C, sign bit).
        DhtVariant::Dht22 => {
            let raw_humidity = u16::from(data[0]) << 8 | u16::from(data[1]);
            let raw_temp = u16::from(data[2]) << 8 | u16::from(data[3]);

            let humidity = raw_humidity as f32 / 10.0;
            let mut temperature = (raw_temp & 0x7FFF) as f32 / 10.0;
            if raw_temp & 0x8000 != 0 {
                temperature = -temperature;
            }
            Ok(DhtReading {
                temperature_c: temperature,
                humidity_pct: humidity,
            })
        }
    }
}

#[cfg(target_os = "espidf")]
pub use self::driver::{init_dht, DhtSensor};

#[cfg(target_os = "espidf")]
mod driver {
    use anyhow::Result;
    use esp_idf_hal::delay::Ets;
    use esp_idf_hal::gpio::{InputOutput, InputPin, OutputPin, PinDriver, Pull};
    use esp_idf_hal::peripheral::Peripheral;
    use esp_idf_sys as sys;

    use super::{decode, DhtError, DhtReading, DhtVariant, HumitureSensor};

    // Data line must have a pull-up (internal or external ~4.7k).
    pub struct DhtSensor<'a, P>
    where
        P: InputPin + OutputPin,
    {
        pin: PinDriver<'a, P, InputOutput>,
        variant: DhtVariant,
    }

    impl<'a, P> DhtSensor<'a, P>
    where
        P: InputPin + OutputPin,
    {
        // Open-drain I/O with pull-up; we drive low and release high.
        pub fn new(mut pin: PinDriver<'a, P, InputOutput>, variant: DhtVariant) -> Result<Self> {
            pin.set_pull(Pull::Up)?;
            pin.set_high()?;
            Ok(Self { pin, variant })
        }

        // Bit-bang the single-wire protocol using microsecond timing.
        fn read_frame(&mut self) -> core::result::Result<[u8; 5], DhtError> {
            self.pin.set_low().map_err(|e| DhtError::Gpio(e.code()))?;
            Ets::delay_ms(self.variant.start_signal_ms());
            self.pin.set_high().map_err(|e| DhtError::Gpio(e.code()))?;
            // Release line and wait ~20-40us before sensor response.
            Ets::delay_us(30);

            // Sensor response sequence: ~80us low, ~80us high, then data.
            self.wait_for_level(false, 200, "response low")?;
            self.wait_for_level(true, 200, "response high")?;
            self.wait_for_level(false, 200, "data preamble")?;

            let mut data = [0u8; 5];
            for byte in data.iter_mut() {
                let mut value = 0u8;
                for _ in 0..8 {
                    self.wait_for_level(true, 80, "bit high")?;
                    let start = now_us();
                    self.wait_for_level(false, 120, "bit low")?;
                    let high_len = now_us() - start;
                    // High pulse ~26-28us => 0, ~70us => 1.
                    value <<= 1;
                    if high_len > 50 {
                        value |= 1;
                    }
                }
                *byte = value;
            }
            Ok(data)
        }

        fn wait_for_level(
            &mut self,
            high: bool,
            timeout_us: u32,
            stage: &'static str,
        ) -> core::result::Result<(), DhtError> {
            let deadline = now_us() + timeout_us as i64;
            while now_us() <= deadline {
                if self.pin.is_high() == high {
                    return Ok(());
                }
            }
            Err(DhtError::Timeout(stage))
        }
    }

    impl<'a, P> HumitureSensor for DhtSensor<'a, P>
    where
        P: InputPin + OutputPin,
    {
        fn read(&mut self) -> core::result::Result<DhtReading, DhtError> {
            let frame = self.read_frame()?;
            decode(self.variant, &frame)
        }
    }

    pub fn init_dht<'d, P>(
        pin: impl Peripheral<P = P> + 'd,
        variant: DhtVariant,
    ) -> Result<DhtSensor<'d, P>>
    where
        P: InputPin + OutputPin,
    {
        let dht_pin = PinDriver::input_output_od(pin)?;
        DhtSensor::new(dht_pin, variant)
    }

    // ESP timer in microseconds for tight pulse timing.
    fn now_us() -> i64 {
        unsafe { sys::esp_timer_get_time() }
    }
}
