//! Marshaling between the BLE host task and the transfer service.
//!
//! The host task only forwards characteristic accesses and link events; the
//! service itself stays on the task that owns it. Every request produces
//! exactly one reply.

use embassy_sync::{
    blocking_mutex::raw::CriticalSectionRawMutex,
    channel::{Channel, Receiver, Sender},
};
use log::{info, warn};
use winesp32_core::{
    settings::SettingsRecord,
    text::bounded,
    transfer::{Advertiser, DeviceName, GattReply, GattRequest, TransferService},
};

use super::board_store::BoardStore;

const GATT_QUEUE_DEPTH: usize = 4;
const ADVERTISING_QUEUE_DEPTH: usize = 4;

#[derive(Clone, Debug, Eq, PartialEq)]
pub(super) enum AdvertisingCommand {
    Start(DeviceName),
    Stop,
}

/// Sent by the BLE host task from its characteristic access and link event
/// handlers; received by [`transfer_loop`].
pub(super) static GATT_REQUESTS: Channel<CriticalSectionRawMutex, GattRequest, GATT_QUEUE_DEPTH> =
    Channel::new();
/// Sent by [`transfer_loop`], one per request; received by the BLE host task,
/// which answers the pending characteristic access with it.
pub(super) static GATT_REPLIES: Channel<CriticalSectionRawMutex, GattReply, GATT_QUEUE_DEPTH> =
    Channel::new();
/// Sent by [`ChannelAdvertiser`]; received by the BLE host task, which owns
/// the advertising set.
pub(super) static ADVERTISING: Channel<
    CriticalSectionRawMutex,
    AdvertisingCommand,
    ADVERTISING_QUEUE_DEPTH,
> = Channel::new();

/// Forwards advertising start/stop to the BLE host task.
pub(super) struct ChannelAdvertiser {
    commands: Sender<'static, CriticalSectionRawMutex, AdvertisingCommand, ADVERTISING_QUEUE_DEPTH>,
}

impl ChannelAdvertiser {
    pub(super) fn new() -> Self {
        Self {
            commands: ADVERTISING.sender(),
        }
    }

    fn push(&self, command: AdvertisingCommand) {
        if let Err(err) = self.commands.try_send(command) {
            warn!("ble-bridge: advertising queue full, dropped {:?}", err);
        }
    }
}

impl Advertiser for ChannelAdvertiser {
    fn start(&mut self, device_name: &str) {
        self.push(AdvertisingCommand::Start(bounded(device_name)));
    }

    fn stop(&mut self) {
        self.push(AdvertisingCommand::Stop);
    }
}

/// Serve GATT traffic for the lifetime of the firmware.
pub(super) async fn transfer_loop(
    transfer: &mut TransferService<BoardStore>,
    settings: &SettingsRecord,
) -> ! {
    let requests: Receiver<'static, CriticalSectionRawMutex, GattRequest, GATT_QUEUE_DEPTH> =
        GATT_REQUESTS.receiver();
    let replies: Sender<'static, CriticalSectionRawMutex, GattReply, GATT_QUEUE_DEPTH> =
        GATT_REPLIES.sender();
    let mut advertiser = ChannelAdvertiser::new();

    match transfer.start_advertising(&mut advertiser, settings) {
        Ok(()) => info!("ble-bridge: serving name={}", transfer.device_name()),
        Err(err) => warn!("ble-bridge: advertising not started: {:?}", err),
    }

    loop {
        let request = requests.receive().await;
        let reply = transfer.handle_request(request, &mut advertiser);
        replies.send(reply).await;
    }
}
