// Station-mode Wi-Fi on a background thread. Acquisition never waits on it;
// failures are logged and retried on the next recheck.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{anyhow, Result};
use embedded_svc::wifi::{AuthMethod, ClientConfiguration, Configuration};
use esp_idf_hal::modem::Modem;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::{BlockingWifi, EspWifi};
use log::{error, info, warn};

use crate::config::{
    WIFI_CONNECT_ATTEMPTS, WIFI_PASS, WIFI_RECHECK_INTERVAL_MS, WIFI_RETRY_DELAY_MS, WIFI_SSID,
};
use crate::error::Error;

pub fn spawn(modem: Modem) -> Result<JoinHandle<()>> {
    let sys_loop = EspSystemEventLoop::take()?;
    let nvs = EspDefaultNvsPartition::take()?;

    let handle = thread::Builder::new()
        .name("wifi".into())
        .stack_size(8 * 1024)
        .spawn(move || supervise(modem, sys_loop, nvs))?;
    Ok(handle)
}

fn supervise(modem: Modem, sys_loop: EspSystemEventLoop, nvs: EspDefaultNvsPartition) {
    let mut wifi = match init_wifi(modem, sys_loop, nvs) {
        Ok(wifi) => wifi,
        Err(err) => {
            error!("Wi-Fi init failed: {err:?}");
            return;
        }
    };

    loop {
        if let Err(err) = connect_with_retries(&mut wifi) {
            warn!("{err}");
        }
        thread::sleep(Duration::from_millis(WIFI_RECHECK_INTERVAL_MS));
    }
}

fn init_wifi(
    modem: Modem,
    sys_loop: EspSystemEventLoop,
    nvs: EspDefaultNvsPartition,
) -> Result<BlockingWifi<EspWifi<'static>>> {
    let mut wifi = BlockingWifi::wrap(
        EspWifi::new(modem, sys_loop.clone(), Some(nvs))?,
        sys_loop,
    )?;

    let auth_method = if WIFI_PASS.is_empty() {
        AuthMethod::None
    } else {
        AuthMethod::WPA2Personal
    };

    let ssid = WIFI_SSID
        .try_into()
        .map_err(|_| anyhow!("WIFI_SSID too long"))?;
    let password = WIFI_PASS
        .try_into()
        .map_err(|_| anyhow!("WIFI_PASS too long"))?;

    let cfg = Configuration::Client(ClientConfiguration {
        ssid,
        password,
        auth_method,
        ..Default::default()
    });

    wifi.set_configuration(&cfg)?;
    Ok(wifi)
}

fn connect_with_retries(wifi: &mut BlockingWifi<EspWifi<'static>>) -> Result<(), Error> {
    for attempt in 1..=WIFI_CONNECT_ATTEMPTS {
        match ensure_connected(wifi) {
            Ok(true) => {
                info!("Wi-Fi connected to {WIFI_SSID}");
                return Ok(());
            }
            Ok(false) => return Ok(()),
            Err(err) => {
                warn!("Wi-Fi attempt {attempt}/{WIFI_CONNECT_ATTEMPTS} failed: {err:?}");
                let _ = wifi.disconnect();
                thread::sleep(Duration::from_millis(WIFI_RETRY_DELAY_MS));
            }
        }
    }
    Err(Error::AssociationFailure(WIFI_SSID.to_string()))
}

/// Returns true when a new association was made.
fn ensure_connected(wifi: &mut BlockingWifi<EspWifi<'static>>) -> Result<bool> {
    if !wifi.is_started()? {
        wifi.start()?;
    }
    if wifi.is_connected()? {
        return Ok(false);
    }
    wifi.connect()?;
    wifi.wait_netif_up()?;
    Ok(true)
}
