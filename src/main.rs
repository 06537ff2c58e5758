// main.rs
// Indoor air-quality node (ESP32 DevKit)
//
// Console (UART0, 9600 baud):
//   Calibrating please wait.......... done!
//   Wait 60s for DSM501 to warm up
//   ...
//   MQ-7 CO Reading: 0.70 PPM
//   MQ-135 CO2 Reading: 2.83 PPM
//   Humidity: 45.00 %  Temperature: 21.00 *C
//   PM1.0 particle count: 517 parts/283mL
//   PM2.5 particle count: 0 parts/283mL
//   PM1.0 ~ PM2.5 concentration: 1.07 ug/m3
//   Indoor Air Quality Index: 8.71
//
// Pin map: MQ-7=GPIO34, MQ-135=GPIO35, DSM501 Vout2=GPIO32, Vout1=GPIO33, DHT=GPIO4

#[cfg(target_os = "espidf")]
fn main() -> anyhow::Result<()> {
    use std::thread;
    use std::time::Duration;

    use esp_idf_svc::log::EspLogger;
    use esp_idf_sys as sys;
    use log::{error, warn};

    use iaq_node::board::Board;
    use iaq_node::config::{SAMPLE_WINDOW_SECONDS, TICK_MS};
    use iaq_node::env::EnvSensor;
    use iaq_node::gas::{GasSensor, MQ135_CO2, MQ7_CO};
    use iaq_node::pm::PmSampler;
    use iaq_node::pm_isr::EspClock;
    use iaq_node::{wifi, DeviceState, Node};

    sys::link_patches();
    EspLogger::initialize_default();

    let board = Board::init()?;

    if let Err(err) = wifi::spawn(board.modem) {
        warn!("Wi-Fi thread not started: {err:?}");
    }

    let mut node = Node::new(
        GasSensor::new(MQ7_CO, board.mq7),
        GasSensor::new(MQ135_CO2, board.mq135),
        PmSampler::new(board.pm, SAMPLE_WINDOW_SECONDS),
        EnvSensor::new(board.dht),
        EspClock,
    );

    let mut out = std::io::stdout();
    loop {
        match node.tick(&mut out) {
            // Wiring fault: stay quiet until someone power-cycles the board.
            Ok(DeviceState::Fault) => thread::sleep(Duration::from_secs(1)),
            Ok(_) => thread::sleep(Duration::from_millis(TICK_MS)),
            Err(err) => {
                error!("console write failed: {err:?}");
                thread::sleep(Duration::from_millis(TICK_MS));
            }
        }
    }
}

#[cfg(not(target_os = "espidf"))]
fn main() {
    eprintln!("iaq-node runs on ESP-IDF targets only; use `cargo test` for the host-side logic");
}
