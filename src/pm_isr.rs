// Edge-interrupt LPO capture for the DSM501 outputs.
//
// Both lines interrupt on any edge. The handler samples the new level and the
// esp_timer microsecond clock and feeds the channel's LpoCounter, so low time
// is measured regardless of how long the main loop sleeps.

use core::ffi::c_void;

use esp_idf_hal::gpio::{Gpio32, Gpio33};
use esp_idf_sys::{self as sys, esp, EspError};
use log::info;

use crate::config::{PM1_GPIO, PM2_5_GPIO};
use crate::hal::Clock;
use crate::pm::{drain_pair, LpoCounter, LpoSource, LpoWindow};

struct EdgeChannel {
    gpio: i32,
    counter: LpoCounter,
}

static PM1: EdgeChannel = EdgeChannel {
    gpio: PM1_GPIO,
    counter: LpoCounter::new(),
};

static PM2_5: EdgeChannel = EdgeChannel {
    gpio: PM2_5_GPIO,
    counter: LpoCounter::new(),
};

unsafe extern "C" fn on_edge(arg: *mut c_void) {
    let channel = &*(arg as *const EdgeChannel);
    let low = sys::gpio_get_level(channel.gpio) == 0;
    channel
        .counter
        .record_level(low, sys::esp_timer_get_time() as u32);
}

/// Owns GPIO32/GPIO33 while the edge handlers are registered.
pub struct IsrLpo {
    _pins: (Gpio32, Gpio33),
}

impl IsrLpo {
    pub fn install(pm1: Gpio32, pm2_5: Gpio33) -> Result<Self, EspError> {
        // Shared with other drivers; already installed is fine.
        let err = unsafe { sys::gpio_install_isr_service(0) };
        if err != sys::ESP_ERR_INVALID_STATE as i32 {
            esp!(err)?;
        }

        for channel in [&PM1, &PM2_5] {
            unsafe {
                esp!(sys::gpio_reset_pin(channel.gpio))?;
                esp!(sys::gpio_set_direction(
                    channel.gpio,
                    sys::gpio_mode_t_GPIO_MODE_INPUT
                ))?;
                esp!(sys::gpio_pullup_en(channel.gpio))?;
                esp!(sys::gpio_set_intr_type(
                    channel.gpio,
                    sys::gpio_int_type_t_GPIO_INTR_ANYEDGE
                ))?;

                // Seed the current level so a line that is already low counts.
                let low = sys::gpio_get_level(channel.gpio) == 0;
                channel
                    .counter
                    .record_level(low, sys::esp_timer_get_time() as u32);

                esp!(sys::gpio_isr_handler_add(
                    channel.gpio,
                    Some(on_edge),
                    channel as *const EdgeChannel as *mut c_void
                ))?;
            }
        }

        info!("DSM501 edge capture on GPIO{PM1_GPIO} (PM1.0) and GPIO{PM2_5_GPIO} (PM2.5)");
        Ok(Self {
            _pins: (pm1, pm2_5),
        })
    }
}

impl LpoSource for IsrLpo {
    fn drain(&mut self, now_us: u32) -> [LpoWindow; 2] {
        drain_pair(&PM1.counter, &PM2_5.counter, now_us)
    }
}

impl Drop for IsrLpo {
    fn drop(&mut self) {
        for channel in [&PM1, &PM2_5] {
            unsafe {
                sys::gpio_isr_handler_remove(channel.gpio);
            }
        }
    }
}

/// esp_timer, microseconds since boot.
pub struct EspClock;

impl Clock for EspClock {
    fn now_us(&self) -> u64 {
        unsafe { sys::esp_timer_get_time() as u64 }
    }
}
