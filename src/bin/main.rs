#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]
#![deny(clippy::large_stack_frames)]

use embassy_executor::Spawner;
use embassy_time::Timer;
use esp_hal::{
    clock::CpuClock,
    delay::Delay,
    gpio::{Level, Output, OutputConfig},
    spi::master::Spi,
    time::Rate,
    timer::timg::TimerGroup,
};
use log::{LevelFilter, error, info, warn};
use static_cell::StaticCell;
use winesp32_core::{
    settings::{SettingsConfig, SettingsStore},
    storage::MemFileStore,
    transfer::{TransferConfig, TransferService},
};
use winesp32_hal_esp32s3::{
    network::{ConnectivityHandle, saved_networks},
    storage::SdFileStore,
};

use board_store::{BoardSdCard, BoardStore};

#[path = "main/board_store.rs"]
mod board_store;
#[path = "main/gatt_bridge.rs"]
mod gatt_bridge;
#[path = "main/wifi.rs"]
mod wifi;

const SD_SPI_HZ: u32 = 1_000_000;
const SCREEN_HEIGHT_PX: u16 = 800;

static CONNECTIVITY: ConnectivityHandle = ConnectivityHandle::new();
static NET_RESOURCES: StaticCell<embassy_net::StackResources<4>> = StaticCell::new();
static SD_CARD: StaticCell<BoardSdCard> = StaticCell::new();

#[panic_handler]
fn panic(_: &core::panic::PanicInfo) -> ! {
    loop {}
}

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

/// No TZ database on this target yet; the zone is only reported.
fn apply_timezone(posix_tz: &str) {
    info!("clock: timezone={}", posix_tz);
}

async fn halt(reason: &str) -> ! {
    error!("boot: halted: {}", reason);
    loop {
        Timer::after_secs(1).await;
    }
}

#[allow(
    clippy::large_stack_frames,
    reason = "it's not unusual to allocate larger buffers etc. in main"
)]
#[esp_rtos::main]
async fn main(_spawner: Spawner) -> ! {
    esp_println::logger::init_logger(LevelFilter::Info);
    esp_println::println!("boot: winesp32 starting");

    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    // esp-radio, transfer scratch buffers and progress callbacks allocate.
    esp_alloc::heap_allocator!(#[esp_hal::ram(reclaimed)] size: 65536);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    // SD SPI wiring:
    // CS=GPIO8, SCK=GPIO4, MOSI=GPIO40, MISO=GPIO41
    let sd_cs = Output::new(peripherals.GPIO8, Level::High, OutputConfig::default());
    let sd_spi_config = esp_hal::spi::master::Config::default()
        .with_frequency(Rate::from_hz(SD_SPI_HZ))
        // SD cards in SPI mode use CPOL=0, CPHA=0.
        .with_mode(esp_hal::spi::Mode::_0);
    let store = match Spi::new(peripherals.SPI3, sd_spi_config) {
        Ok(spi) => {
            let sd_spi = spi
                .with_sck(peripherals.GPIO4)
                .with_mosi(peripherals.GPIO40)
                .with_miso(peripherals.GPIO41);
            match SdFileStore::mount(sd_spi, sd_cs, Delay::new()) {
                Ok(card) => BoardStore::Sd(SD_CARD.init(card)),
                Err(err) => {
                    warn!("sd: mount failed: {:?}", err);
                    BoardStore::Ram(MemFileStore::new())
                }
            }
        }
        Err(err) => {
            warn!("sd: spi config failed: {:?}", err);
            BoardStore::Ram(MemFileStore::new())
        }
    };
    if !store.is_persistent() {
        warn!("storage: using RAM volume; settings and received files will not persist");
    }

    let mut settings = SettingsStore::new(
        store.clone(),
        SettingsConfig::new().with_screen_height_px(SCREEN_HEIGHT_PX),
    )
    .with_timezone_hook(apply_timezone);
    if let Err(err) = settings.init() {
        error!("settings: init failed code={} err={:?}", err.code(), err);
    }

    let mut transfer = TransferService::new(store, TransferConfig::new());
    if let Err(err) = transfer.init() {
        error!("bt-transfer: init failed code={} err={:?}", err.code(), err);
    }

    let networks = saved_networks(settings.wifi_entries());
    info!("wifi: saved_networks={}", networks.len());

    let radio = match esp_radio::init() {
        Ok(radio) => radio,
        Err(err) => {
            error!("esp-radio init failed: {:?}", err);
            halt("radio").await
        }
    };

    let (mut wifi_controller, interfaces) =
        match esp_radio::wifi::new(&radio, peripherals.WIFI, esp_radio::wifi::Config::default()) {
            Ok(parts) => parts,
            Err(err) => {
                error!("wifi peripheral init failed: {:?}", err);
                halt("wifi").await
            }
        };

    let stack_config = embassy_net::Config::dhcpv4(Default::default());
    let (stack, mut net_runner) = embassy_net::new(
        interfaces.sta,
        stack_config,
        NET_RESOURCES.init(embassy_net::StackResources::<4>::new()),
        0x3E5B_9A17_C402_D861,
    );

    info!("SD pins: CS=GPIO8 SCK=GPIO4 MOSI=GPIO40 MISO=GPIO41");

    let net_future = net_runner.run();
    let wifi_future =
        wifi::wifi_connection_loop(&mut wifi_controller, stack, &CONNECTIVITY, &networks);
    let transfer_future = gatt_bridge::transfer_loop(&mut transfer, settings.record());

    let _ = embassy_futures::join::join3(net_future, wifi_future, transfer_future).await;
    unreachable!()
}
