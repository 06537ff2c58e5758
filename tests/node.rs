use std::cell::Cell;
use std::rc::Rc;

use iaq_node::dht::{DhtError, DhtReading, HumitureSensor};
use iaq_node::env::EnvSensor;
use iaq_node::gas::{GasSensor, MQ135_CO2, MQ7_CO};
use iaq_node::hal::{AnalogInput, Clock};
use iaq_node::iaqi::{self, IaqiInputs};
use iaq_node::pm::{LpoSource, LpoWindow, PmSampler};
use iaq_node::report::{DHT_FAILURE, OPEN_CIRCUIT_WARNING};
use iaq_node::{DeviceState, Error, Node};

#[derive(Clone, Default)]
struct ManualClock(Rc<Cell<u64>>);

impl ManualClock {
    fn set_ms(&self, ms: u64) {
        self.0.set(ms * 1_000);
    }
}

impl Clock for ManualClock {
    fn now_us(&self) -> u64 {
        self.0.get()
    }
}

/// `None` makes every conversion fail.
#[derive(Clone)]
struct Adc(Rc<Cell<Option<u16>>>);

impl Adc {
    fn new(raw: u16) -> Self {
        Self(Rc::new(Cell::new(Some(raw))))
    }
}

impl AnalogInput for Adc {
    fn read_raw(&mut self) -> Result<u16, Error> {
        self.0.get().ok_or(Error::Adc(-1))
    }
}

/// Same low time on every window: 1 % on PM1.0, nothing on PM2.5.
struct SteadyDust;

impl LpoSource for SteadyDust {
    fn drain(&mut self, _now_us: u32) -> [LpoWindow; 2] {
        [
            LpoWindow {
                low_us: 300_000,
                edges: 20,
            },
            LpoWindow::default(),
        ]
    }
}

struct FixedDht(f32, f32);

impl HumitureSensor for FixedDht {
    fn read(&mut self) -> Result<DhtReading, DhtError> {
        Ok(DhtReading {
            temperature_c: self.0,
            humidity_pct: self.1,
        })
    }
}

type TestNode = Node<Adc, Adc, SteadyDust, FixedDht, ManualClock>;

struct Rig {
    node: TestNode,
    clock: ManualClock,
    co_adc: Adc,
    out: Vec<u8>,
    now_ms: u64,
}

impl Rig {
    fn new(co_raw: u16, co2_raw: u16, dht: FixedDht) -> Self {
        let clock = ManualClock::default();
        let co_adc = Adc::new(co_raw);
        let node = Node::new(
            GasSensor::new(MQ7_CO, co_adc.clone()),
            GasSensor::new(MQ135_CO2, Adc::new(co2_raw)),
            PmSampler::new(SteadyDust, 30),
            EnvSensor::new(dht),
            clock.clone(),
        );
        Self {
            node,
            clock,
            co_adc,
            out: Vec::new(),
            now_ms: 0,
        }
    }

    fn healthy() -> Self {
        Self::new(1800, 900, FixedDht(21.0, 45.0))
    }

    /// Ticks every 10 ms up to and including `until_ms`. Returns the times
    /// at which a report was emitted.
    fn run_until(&mut self, until_ms: u64) -> Vec<u64> {
        let mut emitted = Vec::new();
        while self.now_ms <= until_ms {
            self.clock.set_ms(self.now_ms);
            let before = self.node.reports_emitted();
            self.node.tick(&mut self.out).unwrap();
            if self.node.reports_emitted() > before {
                emitted.push(self.now_ms);
            }
            self.now_ms += 10;
        }
        emitted
    }

    fn text(&self) -> String {
        String::from_utf8(self.out.clone()).unwrap()
    }
}

#[test]
fn boot_sequence_is_printed_in_order() {
    let mut rig = Rig::healthy();
    rig.run_until(61_000);
    let text = rig.text();

    assert!(text.starts_with("Calibrating please wait.......... done!\n"));
    let wait = text.find("Wait 60s for DSM501 to warm up").unwrap();
    let first = text.find("1 s (wait 60s for DSM501 to warm up)").unwrap();
    let last = text.find("59 s (wait 60s for DSM501 to warm up)").unwrap();
    let ready = text.find("DSM501 is ready!\n\n").unwrap();
    assert!(wait < first && first < last && last < ready);
    assert_eq!(rig.node.state(), DeviceState::Ready);
    assert!(!text.contains("Indoor Air Quality Index"));
}

#[test]
fn first_report_follows_one_full_window() {
    let mut rig = Rig::healthy();
    // Calibration installs R0 at 920 ms; warm-up ends at 60 920 ms.
    let emitted = rig.run_until(95_000);
    assert_eq!(emitted, vec![90_920]);

    let report = *rig.node.last_report().unwrap();
    assert_eq!(report.pm.particle_count_pm1, 517);
    assert_eq!(report.pm.particle_count_pm2_5, 0);
    let expected = iaqi::fuse(&IaqiInputs {
        co_ppm: report.co_ppm,
        co2_ppm: report.co2_ppm,
        pm2_5_ug_m3: Some(report.pm.concentration_ug_m3),
        temperature_c: Some(21.0),
        humidity_pct: Some(45.0),
    });
    assert_eq!(report.iaqi, expected);
    assert!((0.0..=10.0).contains(&report.iaqi));

    let text = rig.text();
    assert!(text.contains("MQ-7 CO Reading: 0.70 PPM\n"));
    assert!(text.contains("MQ-135 CO2 Reading: 2.83 PPM\n"));
    assert!(text.contains("Humidity: 45.00 %  Temperature: 21.00 *C\n"));
    assert!(text.contains("PM1.0 particle count: 517 parts/283mL\n"));
    assert!(text.contains("PM2.5 particle count: 0 parts/283mL\n"));
    assert!(text.contains("PM1.0 ~ PM2.5 concentration: 1.07 ug/m3\n"));
    assert!(text.contains(&format!("Indoor Air Quality Index: {:.2}\n", expected)));
}

#[test]
fn reports_are_spaced_by_the_window() {
    let mut rig = Rig::healthy();
    let emitted = rig.run_until(200_000);
    assert_eq!(emitted.len(), 4);
    for pair in emitted.windows(2) {
        assert!(pair[1] - pair[0] >= 30_000);
    }
}

#[test]
fn disconnected_gas_sensor_faults_without_reports() {
    let mut rig = Rig::new(0, 900, FixedDht(21.0, 45.0));
    let emitted = rig.run_until(200_000);

    assert!(emitted.is_empty());
    assert_eq!(rig.node.state(), DeviceState::Fault);
    let text = rig.text();
    assert!(text.contains(OPEN_CIRCUIT_WARNING));
    assert!(!text.contains("Indoor Air Quality Index"));
    assert!(!text.contains("DSM501 is ready!"));
}

#[test]
fn failed_environment_read_still_reports() {
    let mut rig = Rig::new(1800, 900, FixedDht(f32::NAN, 45.0));
    let emitted = rig.run_until(95_000);
    assert_eq!(emitted.len(), 1);

    let report = *rig.node.last_report().unwrap();
    assert!(!report.env.valid);
    // Temperature and humidity score 0 with the weights unchanged.
    let expected = iaqi::fuse(&IaqiInputs {
        co_ppm: report.co_ppm,
        co2_ppm: report.co2_ppm,
        pm2_5_ug_m3: Some(report.pm.concentration_ug_m3),
        temperature_c: None,
        humidity_pct: None,
    });
    assert_eq!(report.iaqi, expected);
    assert!(report.iaqi <= 8.0 + 1e-4);

    let text = rig.text();
    assert!(text.contains(&format!("{DHT_FAILURE}\n")));
    assert!(!text.contains("Humidity:"));
    assert!(text.contains("Indoor Air Quality Index"));
}

#[test]
fn gas_fault_after_calibration_marks_reading_missing() {
    let mut rig = Rig::healthy();
    rig.run_until(61_000);
    // Saturated divider: Rs collapses to zero.
    rig.co_adc.0.set(Some(4095));
    let emitted = rig.run_until(95_000);
    assert_eq!(emitted.len(), 1);

    let report = *rig.node.last_report().unwrap();
    assert_eq!(report.co_ppm, None);
    assert!(report.co2_ppm.is_some());
    let text = rig.text();
    assert!(text.contains("Failed to read from MQ-7 sensor!\n"));
    assert!(text.contains("MQ-135 CO2 Reading:"));
}

#[test]
fn dead_adc_is_not_reported_from_old_samples() {
    let mut rig = Rig::healthy();
    rig.run_until(61_000);
    rig.co_adc.0.set(None);
    let emitted = rig.run_until(200_000);
    assert_eq!(emitted.len(), 4);

    let report = *rig.node.last_report().unwrap();
    assert_eq!(report.co_ppm, None);
    assert!(report.co2_ppm.is_some());
    let expected = iaqi::fuse(&IaqiInputs {
        co_ppm: None,
        co2_ppm: report.co2_ppm,
        pm2_5_ug_m3: Some(report.pm.concentration_ug_m3),
        temperature_c: Some(21.0),
        humidity_pct: Some(45.0),
    });
    assert_eq!(report.iaqi, expected);

    let text = rig.text();
    assert_eq!(text.matches("Failed to read from MQ-7 sensor!\n").count(), 4);
    assert!(!text.contains("MQ-7 CO Reading:"));
}

#[test]
fn adc_recovery_resumes_gas_reading() {
    let mut rig = Rig::healthy();
    rig.run_until(61_000);
    rig.co_adc.0.set(None);
    rig.run_until(95_000);
    assert_eq!(rig.node.last_report().unwrap().co_ppm, None);

    rig.co_adc.0.set(Some(1800));
    rig.run_until(125_000);
    assert!(rig.node.last_report().unwrap().co_ppm.is_some());
}
