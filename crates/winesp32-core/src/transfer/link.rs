/// BLE link as seen by the transfer service.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum LinkState {
    #[default]
    Idle,
    Advertising,
    Connected,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PeerInfo {
    pub address: [u8; 6],
    pub rssi: i8,
}

impl PeerInfo {
    pub const fn new(address: [u8; 6], rssi: i8) -> Self {
        Self { address, rssi }
    }
}

/// Seam to the BLE host stack's advertising control.
pub trait Advertiser {
    fn start(&mut self, device_name: &str);
    fn stop(&mut self);
}
