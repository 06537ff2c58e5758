use core::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// R0 aggregation produced a non-finite value.
    OpenCircuit(&'static str),
    /// R0 aggregation produced exactly 0.
    ShortToGround(&'static str),
    /// Gas read requested before R0 was installed.
    Uncalibrated(&'static str),
    /// R0 or the Rs/R0 ratio is unusable for a concentration.
    SensorFault(&'static str),
    /// Environment read timed out, failed its checksum or returned non-finite values.
    TransientRead(&'static str),
    /// Wi-Fi did not associate within the bounded retries.
    AssociationFailure(String),
    /// The HAL failed an analog conversion (ESP-IDF error code).
    Adc(i32),
}

impl Error {
    /// Fatal errors move the device to FAULT; everything else stays within its tick.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::OpenCircuit(_) | Self::ShortToGround(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenCircuit(sensor) => write!(f, "{sensor}: R0 is infinite, open circuit detected"),
            Self::ShortToGround(sensor) => {
                write!(f, "{sensor}: R0 is zero, analog pin shorts to ground")
            }
            Self::Uncalibrated(sensor) => write!(f, "{sensor}: read before R0 was installed"),
            Self::SensorFault(sensor) => write!(f, "{sensor}: Rs/R0 ratio out of range"),
            Self::TransientRead(stage) => write!(f, "transient sensor read failure: {stage}"),
            Self::AssociationFailure(reason) => write!(f, "Wi-Fi association failed: {reason}"),
            Self::Adc(code) => write!(f, "ADC conversion failed: error {code}"),
        }
    }
}

impl std::error::Error for Error {}
