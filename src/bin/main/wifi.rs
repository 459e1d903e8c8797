use embassy_net::Stack;
use embassy_time::{Duration, Timer, WithTimeout};
use esp_radio::wifi::{ClientConfig, ModeConfig, WifiController};
use log::info;
use winesp32_hal_esp32s3::network::{ConnectivityHandle, WifiCredentials};

const BACKOFF_MIN_SECS: u64 = 2;
const BACKOFF_MAX_SECS: u64 = 120;
const NETWORK_POLL_INTERVAL_MS: u64 = 500;
const DHCP_TIMEOUT_SECS: u64 = 15;
const NO_NETWORKS_RECHECK_SECS: u64 = 3_600;

/// Doubling retry delay, capped at [`BACKOFF_MAX_SECS`].
struct Backoff {
    failures: u32,
}

impl Backoff {
    const fn new() -> Self {
        Self { failures: 0 }
    }

    fn reset(&mut self) {
        self.failures = 0;
    }

    async fn wait(&mut self) {
        let delay_secs = (BACKOFF_MIN_SECS << self.failures.min(6)).min(BACKOFF_MAX_SECS);
        self.failures = self.failures.saturating_add(1);
        info!("wifi: retry in {}s failures={}", delay_secs, self.failures);
        Timer::after_secs(delay_secs).await;
    }
}

/// Why an association attempt with one saved network stopped short.
#[derive(Debug)]
enum AttemptError {
    Config,
    Start,
    Connect,
    DhcpTimeout,
}

/// Configure, start and associate with `network`, then wait for a DHCP
/// lease.
async fn associate(
    controller: &mut WifiController<'_>,
    stack: Stack<'_>,
    network: &WifiCredentials,
) -> Result<(), AttemptError> {
    let client = ClientConfig::default()
        .with_ssid(network.ssid.as_str().into())
        .with_password(network.password.as_str().into());
    controller.set_config(&ModeConfig::Client(client)).map_err(|err| {
        info!("wifi: config rejected ssid={} err={:?}", network.ssid, err);
        AttemptError::Config
    })?;

    if !controller.is_started().unwrap_or(false) {
        controller.start_async().await.map_err(|err| {
            info!("wifi: start failed err={:?}", err);
            AttemptError::Start
        })?;
    }

    info!("wifi: associating ssid={}", network.ssid);
    controller.connect_async().await.map_err(|err| {
        info!("wifi: associate failed ssid={} err={:?}", network.ssid, err);
        AttemptError::Connect
    })?;

    stack
        .wait_config_up()
        .with_timeout(Duration::from_secs(DHCP_TIMEOUT_SECS))
        .await
        .map_err(|_| AttemptError::DhcpTimeout)
}

/// Publish link state until the association or the lease goes away.
async fn hold_link(
    controller: &mut WifiController<'_>,
    stack: Stack<'_>,
    connectivity: &ConnectivityHandle,
) {
    loop {
        let link_up = stack.is_link_up();
        let has_ipv4 = stack.config_v4().is_some();
        connectivity.update_link_ip(link_up, has_ipv4);

        let associated = matches!(controller.is_connected(), Ok(true));
        if !(link_up && has_ipv4 && associated) {
            info!(
                "wifi: link lost link_up={} has_ipv4={} associated={}",
                link_up, has_ipv4, associated
            );
            return;
        }
        Timer::after_millis(NETWORK_POLL_INTERVAL_MS).await;
    }
}

/// Keep the station online using the saved networks, newest first. A
/// network that fails to associate hands over to the next one; a network
/// that drops after working is retried first.
pub(super) async fn wifi_connection_loop(
    controller: &mut WifiController<'_>,
    stack: Stack<'_>,
    connectivity: &'static ConnectivityHandle,
    networks: &[WifiCredentials],
) -> ! {
    if networks.is_empty() {
        info!("wifi: no saved networks; staying offline");
        connectivity.mark_disconnected();
        loop {
            Timer::after_secs(NO_NETWORKS_RECHECK_SECS).await;
        }
    }

    let mut backoff = Backoff::new();
    let mut candidate = 0usize;

    loop {
        let network = &networks[candidate];
        connectivity.mark_connecting(candidate as u8);

        match associate(controller, stack, network).await {
            Ok(()) => {
                info!("wifi: online ssid={}", network.ssid);
                backoff.reset();
                hold_link(controller, stack, connectivity).await;
            }
            Err(err) => {
                info!("wifi: attempt failed ssid={} reason={:?}", network.ssid, err);
                candidate = (candidate + 1) % networks.len();
            }
        }

        connectivity.mark_disconnected();
        let _ = controller.disconnect_async().await;
        backoff.wait().await;
    }
}
