// DSM501 particulate sampling.
//
// The sensor pulls each output low while a particle crosses its beam. Over a
// fixed window we integrate the low time per channel (low-pulse occupancy,
// LPO), turn the low ratio into a particle count with the datasheet
// polynomial and the PM1.0-PM2.5 band count into a mass concentration.
//
// Channel wiring: Vout2 reports particles > 1 um (PM1.0 channel), Vout1
// particles > 2.5 um (PM2.5 channel). The band count is their difference.
//
// Low time is accumulated by `LpoCounter`s. On the device they are fed by
// GPIO edge interrupts; `PolledLpo` feeds them from two `InputPin`s on every
// scheduler tick instead. Polling must run at least every ~10 ms (the
// narrowest DSM501 pulse) or readings are biased low.

use core::cell::Cell;

use critical_section::{CriticalSection, Mutex};
use embedded_hal::digital::InputPin;
use log::{debug, warn};

use crate::config::PM_WARMUP_SECONDS;

/// Mass per particle count, in ug/m3 per (particles / 283 mL).
///
/// Spheres of 0.88 um diameter at 1.65 g/cm3 weigh 5.89e-7 ug each; one
/// particle per 0.01 ft3 (283 mL) is 3531.5 particles per m3.
pub const PARTICLE_MASS_UG_M3: f32 = 0.002_079;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PmChannel {
    Pm1_0,
    Pm2_5,
}

impl PmChannel {
    pub const ALL: [PmChannel; 2] = [PmChannel::Pm1_0, PmChannel::Pm2_5];

    pub fn index(self) -> usize {
        match self {
            Self::Pm1_0 => 0,
            Self::Pm2_5 => 1,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Pm1_0 => "PM1.0",
            Self::Pm2_5 => "PM2.5",
        }
    }
}

// The edge ISR writes the counters, so on the device the lock masks
// interrupts (portMUX critical section) instead of taking the FreeRTOS mutex
// behind `critical_section::with`.
#[cfg(target_os = "espidf")]
fn with_lpo_lock<R>(f: impl FnOnce(CriticalSection<'_>) -> R) -> R {
    esp_idf_hal::interrupt::free(|| {
        // SAFETY: interrupts are disabled on this core and the spinlock keeps
        // the other core out until `f` returns.
        f(unsafe { CriticalSection::new() })
    })
}

#[cfg(not(target_os = "espidf"))]
fn with_lpo_lock<R>(f: impl FnOnce(CriticalSection<'_>) -> R) -> R {
    critical_section::with(f)
}

/// Low time and level transitions seen on one channel since the last drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LpoWindow {
    pub low_us: u32,
    pub edges: u32,
}

#[derive(Debug, Clone, Copy)]
struct LpoState {
    low_since_us: Option<u32>,
    low_total_us: u32,
    edges: u32,
}

impl LpoState {
    const IDLE: Self = Self {
        low_since_us: None,
        low_total_us: 0,
        edges: 0,
    };
}

/// Per-channel low-time accumulator shared between an edge source and the sampler.
///
/// Timestamps are microseconds truncated to `u32`; intervals use wrapping
/// arithmetic, which is sound as long as a single low period is shorter than
/// ~71 minutes.
pub struct LpoCounter {
    state: Mutex<Cell<LpoState>>,
}

impl Default for LpoCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl LpoCounter {
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(Cell::new(LpoState::IDLE)),
        }
    }

    /// Records the pin level at `now_us`. Repeated levels are ignored, so this
    /// works both from an edge ISR and from a poller.
    pub fn record_level(&self, low: bool, now_us: u32) {
        with_lpo_lock(|cs| {
            let cell = self.state.borrow(cs);
            let mut state = cell.get();
            match (low, state.low_since_us) {
                (true, None) => {
                    state.low_since_us = Some(now_us);
                    state.edges += 1;
                }
                (false, Some(since)) => {
                    let width = now_us.wrapping_sub(since);
                    state.low_total_us = state.low_total_us.saturating_add(width);
                    state.low_since_us = None;
                    state.edges += 1;
                }
                _ => return,
            }
            cell.set(state);
        });
    }

    pub fn is_low(&self) -> bool {
        with_lpo_lock(|cs| self.state.borrow(cs).get().low_since_us.is_some())
    }

    /// Returns the accumulated window and zeroes it. A low period still in
    /// progress is split at `now_us`.
    pub fn drain(&self, now_us: u32) -> LpoWindow {
        with_lpo_lock(|cs| self.drain_in(cs, now_us))
    }

    fn drain_in(&self, cs: CriticalSection<'_>, now_us: u32) -> LpoWindow {
        let cell = self.state.borrow(cs);
        let mut state = cell.get();
        let mut low_us = state.low_total_us;
        if let Some(since) = state.low_since_us {
            low_us = low_us.saturating_add(now_us.wrapping_sub(since));
            state.low_since_us = Some(now_us);
        }
        let window = LpoWindow {
            low_us,
            edges: state.edges,
        };
        state.low_total_us = 0;
        state.edges = 0;
        cell.set(state);
        window
    }
}

/// Drains both channels inside one critical section so the next window opens
/// at the same instant for both.
pub fn drain_pair(pm1: &LpoCounter, pm2_5: &LpoCounter, now_us: u32) -> [LpoWindow; 2] {
    with_lpo_lock(|cs| [pm1.drain_in(cs, now_us), pm2_5.drain_in(cs, now_us)])
}

/// The sampler's view of the two LPO accumulators.
pub trait LpoSource {
    /// Called on every scheduler tick. Polled sources sample their pins here.
    fn service(&mut self, now_us: u32) {
        let _ = now_us;
    }

    /// Closes the current accumulation for both channels, indexed by
    /// [`PmChannel::index`], and starts the next one.
    fn drain(&mut self, now_us: u32) -> [LpoWindow; 2];
}

/// LPO source that polls two level-sensitive inputs.
pub struct PolledLpo<P1, P2> {
    pm1: P1,
    pm2_5: P2,
    counters: [LpoCounter; 2],
}

impl<P1: InputPin, P2: InputPin> PolledLpo<P1, P2> {
    pub fn new(pm1: P1, pm2_5: P2) -> Self {
        Self {
            pm1,
            pm2_5,
            counters: [LpoCounter::new(), LpoCounter::new()],
        }
    }

    pub fn into_pins(self) -> (P1, P2) {
        (self.pm1, self.pm2_5)
    }
}

impl<P1: InputPin, P2: InputPin> LpoSource for PolledLpo<P1, P2> {
    fn service(&mut self, now_us: u32) {
        match self.pm1.is_low() {
            Ok(low) => self.counters[0].record_level(low, now_us),
            Err(err) => warn!("PM1.0 pin read failed: {err:?}"),
        }
        match self.pm2_5.is_low() {
            Ok(low) => self.counters[1].record_level(low, now_us),
            Err(err) => warn!("PM2.5 pin read failed: {err:?}"),
        }
    }

    fn drain(&mut self, now_us: u32) -> [LpoWindow; 2] {
        drain_pair(&self.counters[0], &self.counters[1], now_us)
    }
}

/// Low ratio in percent of the window.
pub fn low_ratio_pct(low_us: u32, window_ms: u64) -> f32 {
    if window_ms == 0 {
        return 0.0;
    }
    let ratio = low_us as f32 / (window_ms as f32 * 1000.0) * 100.0;
    ratio.clamp(0.0, 100.0)
}

/// Datasheet curve: particles per 283 mL from the low ratio in percent.
pub fn particle_count(ratio_pct: f32) -> u32 {
    let r = ratio_pct;
    let count = 1.1 * r.powi(3) - 3.8 * r.powi(2) + 520.0 * r + 0.62;
    if count > 0.0 {
        count.floor() as u32
    } else {
        0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PmSample {
    pub window_start_ms: u64,
    pub window_end_ms: u64,
    pub lpo_pm1_us: u32,
    pub lpo_pm2_5_us: u32,
    pub particle_count_pm1: u32,
    pub particle_count_pm2_5: u32,
    pub concentration_ug_m3: f32,
}

impl PmSample {
    pub fn from_windows(window_start_ms: u64, window_end_ms: u64, windows: [LpoWindow; 2]) -> Self {
        let span_ms = window_end_ms.saturating_sub(window_start_ms);
        let [pm1, pm2_5] = windows;
        let particle_count_pm1 = particle_count(low_ratio_pct(pm1.low_us, span_ms));
        let particle_count_pm2_5 = particle_count(low_ratio_pct(pm2_5.low_us, span_ms));

        let concentration_ug_m3 = if pm1.edges == 0 && pm2_5.edges == 0 {
            0.0
        } else {
            let band = particle_count_pm1.saturating_sub(particle_count_pm2_5);
            band as f32 * PARTICLE_MASS_UG_M3
        };

        Self {
            window_start_ms,
            window_end_ms,
            lpo_pm1_us: pm1.low_us,
            lpo_pm2_5_us: pm2_5.low_us,
            particle_count_pm1,
            particle_count_pm2_5,
            concentration_ug_m3,
        }
    }

    pub fn particle_count(&self, channel: PmChannel) -> u32 {
        match channel {
            PmChannel::Pm1_0 => self.particle_count_pm1,
            PmChannel::Pm2_5 => self.particle_count_pm2_5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    WarmingUp { until_ms: u64 },
    Sampling { window_start_ms: u64 },
}

pub struct PmSampler<S> {
    source: S,
    window_ms: u64,
    warmup_ms: u64,
    phase: Phase,
    last: Option<PmSample>,
}

impl<S: LpoSource> PmSampler<S> {
    /// `source` owns the two configured inputs; nothing else reads them.
    pub fn new(source: S, window_seconds: u32) -> Self {
        Self {
            source,
            window_ms: u64::from(window_seconds) * 1_000,
            warmup_ms: u64::from(PM_WARMUP_SECONDS) * 1_000,
            phase: Phase::Idle,
            last: None,
        }
    }

    pub fn with_warmup(mut self, warmup_seconds: u32) -> Self {
        self.warmup_ms = u64::from(warmup_seconds) * 1_000;
        self
    }

    /// Arms the first window once the warm-up has elapsed.
    pub fn begin(&mut self, now_ms: u64) {
        self.phase = Phase::WarmingUp {
            until_ms: now_ms + self.warmup_ms,
        };
        debug!("DSM501 warm-up until {} ms", now_ms + self.warmup_ms);
    }

    /// Non-blocking. Returns true exactly once per completed window.
    pub fn update(&mut self, now_us: u64) -> bool {
        let now_ms = now_us / 1_000;
        let lpo_now = now_us as u32;
        self.source.service(lpo_now);

        match self.phase {
            Phase::Idle => false,
            Phase::WarmingUp { until_ms } => {
                if now_ms >= until_ms {
                    // Discard whatever accumulated during warm-up.
                    self.source.drain(lpo_now);
                    self.phase = Phase::Sampling {
                        window_start_ms: now_ms,
                    };
                    debug!("DSM501 first window opened at {now_ms} ms");
                }
                false
            }
            Phase::Sampling { window_start_ms } => {
                if now_ms.saturating_sub(window_start_ms) < self.window_ms {
                    return false;
                }
                let windows = self.source.drain(lpo_now);
                let sample = PmSample::from_windows(window_start_ms, now_ms, windows);
                debug!("DSM501 sample: {sample:?}");
                self.last = Some(sample);
                self.phase = Phase::Sampling {
                    window_start_ms: now_ms,
                };
                true
            }
        }
    }

    pub fn is_sampling(&self) -> bool {
        matches!(self.phase, Phase::Sampling { .. })
    }

    pub fn window_ms(&self) -> u64 {
        self.window_ms
    }

    pub fn last_sample(&self) -> Option<&PmSample> {
        self.last.as_ref()
    }

    pub fn particle_count(&self, channel: PmChannel) -> u32 {
        self.last.map_or(0, |s| s.particle_count(channel))
    }

    pub fn concentration(&self) -> f32 {
        self.last.map_or(0.0, |s| s.concentration_ug_m3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal_mock::eh1::digital::{Mock as PinMock, State, Transaction as PinTransaction};
    use proptest::prelude::*;

    struct Fixed {
        windows: [LpoWindow; 2],
        drains: usize,
    }

    impl Fixed {
        fn new(pm1_low_us: u32, pm1_edges: u32, pm2_5_low_us: u32, pm2_5_edges: u32) -> Self {
            Self {
                windows: [
                    LpoWindow {
                        low_us: pm1_low_us,
                        edges: pm1_edges,
                    },
                    LpoWindow {
                        low_us: pm2_5_low_us,
                        edges: pm2_5_edges,
                    },
                ],
                drains: 0,
            }
        }
    }

    impl LpoSource for Fixed {
        fn drain(&mut self, _now_us: u32) -> [LpoWindow; 2] {
            self.drains += 1;
            self.windows
        }
    }

    fn ms(v: u64) -> u64 {
        v * 1_000
    }

    #[test]
    fn zero_ratio_gives_zero_particles() {
        assert_eq!(particle_count(0.0), 0);
        assert_eq!(particle_count(-3.0), 0);
    }

    #[test]
    fn one_percent_low_ratio() {
        // 1.1 - 3.8 + 520 + 0.62 = 517.92
        assert_eq!(particle_count(1.0), 517);
        let ratio = low_ratio_pct(300_000, 30_000);
        assert!((ratio - 1.0).abs() < 1e-5);
    }

    #[test]
    fn low_ratio_is_clamped() {
        assert_eq!(low_ratio_pct(40_000_000, 30_000), 100.0);
        assert_eq!(low_ratio_pct(1_000, 0), 0.0);
    }

    #[test]
    fn counter_accumulates_low_time() {
        let counter = LpoCounter::new();
        counter.record_level(false, 0);
        counter.record_level(true, 1_000);
        counter.record_level(true, 3_000);
        counter.record_level(false, 6_000);
        let window = counter.drain(10_000);
        assert_eq!(window, LpoWindow { low_us: 5_000, edges: 2 });
        assert_eq!(counter.drain(20_000), LpoWindow::default());
    }

    #[test]
    fn counter_splits_low_period_at_drain() {
        let counter = LpoCounter::new();
        counter.record_level(true, 8_000);
        assert_eq!(counter.drain(10_000), LpoWindow { low_us: 2_000, edges: 1 });
        assert!(counter.is_low());
        counter.record_level(false, 10_500);
        assert_eq!(counter.drain(12_000), LpoWindow { low_us: 500, edges: 1 });
    }

    #[test]
    fn counter_handles_timer_wrap() {
        let counter = LpoCounter::new();
        counter.record_level(true, u32::MAX - 99);
        counter.record_level(false, 100);
        assert_eq!(counter.drain(200).low_us, 200);
    }

    #[test]
    fn concurrent_drains_lose_no_transitions() {
        use std::sync::atomic::{AtomicBool, Ordering};

        const PULSES: u32 = 5_000;
        let counter = LpoCounter::new();
        let done = AtomicBool::new(false);

        std::thread::scope(|s| {
            s.spawn(|| {
                for i in 0..PULSES {
                    counter.record_level(true, i * 10);
                    counter.record_level(false, i * 10 + 4);
                }
                done.store(true, Ordering::SeqCst);
            });

            let mut edges = 0;
            while !done.load(Ordering::SeqCst) {
                edges += drain_pair(&counter, &LpoCounter::new(), u32::MAX)[0].edges;
            }
            edges += counter.drain(u32::MAX).edges;
            assert_eq!(edges, 2 * PULSES);
        });
    }

    #[test]
    fn no_samples_before_begin() {
        let mut sampler = PmSampler::new(Fixed::new(0, 0, 0, 0), 30);
        assert!(!sampler.update(ms(100_000)));
        assert!(sampler.last_sample().is_none());
        assert_eq!(sampler.concentration(), 0.0);
    }

    #[test]
    fn warm_up_then_one_sample_per_window() {
        let mut sampler = PmSampler::new(Fixed::new(300_000, 20, 0, 0), 30);
        sampler.begin(0);

        assert!(!sampler.update(ms(59_999)));
        assert!(!sampler.update(ms(60_000)));
        assert!(sampler.is_sampling());
        assert!(!sampler.update(ms(89_999)));
        assert!(sampler.update(ms(90_000)));
        assert!(!sampler.update(ms(90_005)));

        let sample = *sampler.last_sample().unwrap();
        assert_eq!(sample.window_start_ms, 60_000);
        assert_eq!(sample.window_end_ms, 90_000);
        assert_eq!(sample.particle_count_pm1, 517);
        assert_eq!(sample.particle_count_pm2_5, 0);
        assert!((sample.concentration_ug_m3 - 517.0 * PARTICLE_MASS_UG_M3).abs() < 1e-4);
        assert_eq!(sampler.particle_count(PmChannel::Pm1_0), 517);

        // Warm-up drain plus one window.
        assert_eq!(sampler.source.drains, 2);
        assert!(sampler.update(ms(120_000)));
    }

    #[test]
    fn silent_window_has_zero_concentration() {
        // Stuck low line without transitions.
        let mut sampler = PmSampler::new(Fixed::new(30_000_000, 0, 30_000_000, 0), 30)
            .with_warmup(0);
        sampler.begin(0);
        assert!(!sampler.update(0));
        assert!(sampler.update(ms(30_000)));
        assert_eq!(sampler.concentration(), 0.0);
    }

    #[test]
    fn band_count_never_negative() {
        let sample = PmSample::from_windows(
            0,
            30_000,
            [
                LpoWindow { low_us: 100_000, edges: 4 },
                LpoWindow { low_us: 900_000, edges: 10 },
            ],
        );
        assert!(sample.particle_count_pm2_5 > sample.particle_count_pm1);
        assert_eq!(sample.concentration_ug_m3, 0.0);
    }

    #[test]
    fn polled_source_integrates_pin_levels() {
        let pm1 = PinMock::new(&[
            PinTransaction::get(State::High),
            PinTransaction::get(State::Low),
            PinTransaction::get(State::Low),
            PinTransaction::get(State::High),
        ]);
        let pm2_5 = PinMock::new(&[
            PinTransaction::get(State::High),
            PinTransaction::get(State::High),
            PinTransaction::get(State::High),
            PinTransaction::get(State::High),
        ]);
        let mut source = PolledLpo::new(pm1, pm2_5);

        for t in [0, 1_000, 5_000, 9_000] {
            source.service(t);
        }
        let [pm1_window, pm2_5_window] = source.drain(10_000);
        assert_eq!(pm1_window, LpoWindow { low_us: 8_000, edges: 2 });
        assert_eq!(pm2_5_window, LpoWindow::default());

        let (mut pm1, mut pm2_5) = source.into_pins();
        pm1.done();
        pm2_5.done();
    }

    proptest! {
        #[test]
        fn sample_values_are_non_negative(
            pm1_low in 0u32..40_000_000,
            pm2_5_low in 0u32..40_000_000,
            edges in 0u32..1_000,
            span in 1u64..120_000,
        ) {
            let sample = PmSample::from_windows(
                1_000,
                1_000 + span,
                [
                    LpoWindow { low_us: pm1_low, edges },
                    LpoWindow { low_us: pm2_5_low, edges },
                ],
            );
            prop_assert!(sample.concentration_ug_m3 >= 0.0);
            prop_assert!(sample.concentration_ug_m3.is_finite());
        }
    }
}
