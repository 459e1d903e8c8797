//! GATT contract of the transfer service: Info, Data and Control
//! characteristics, plus the owned request/reply messages used to marshal
//! host-stack callbacks onto the task that owns the service.

use core::fmt::Write as _;

use heapless::{String, Vec};

use super::{
    Advertiser, PeerInfo, TRANSFER_CHUNK_BYTES, TransferError, TransferInfo, TransferService,
    session::FILENAME_BYTES,
};
use crate::storage::FileStore;

pub const CONTROL_CANCEL: u8 = 0x00;
pub const CONTROL_START_RECEIVE: u8 = 0x01;

/// Opcode, `name|size` with a 10-digit size.
pub const CONTROL_MAX_BYTES: usize = 1 + FILENAME_BYTES + 1 + 10;
/// `name|size|status`.
pub const INFO_MAX_BYTES: usize = FILENAME_BYTES + 1 + 10 + 1 + 1;

pub type InfoText = String<INFO_MAX_BYTES>;
pub type DataChunk = Vec<u8, TRANSFER_CHUNK_BYTES>;
pub type ControlPayload = Vec<u8, CONTROL_MAX_BYTES>;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ControlCommand<'a> {
    Cancel,
    StartReceive { filename: &'a str, size: u32 },
}

impl<'a> ControlCommand<'a> {
    pub fn parse(payload: &'a [u8]) -> Result<Self, TransferError> {
        let (&opcode, rest) = payload.split_first().ok_or(TransferError::InvalidCommand)?;
        match opcode {
            CONTROL_CANCEL => Ok(Self::Cancel),
            CONTROL_START_RECEIVE => {
                let text = core::str::from_utf8(rest).map_err(|_| TransferError::InvalidCommand)?;
                let (filename, size) = text.split_once('|').ok_or(TransferError::InvalidCommand)?;
                if !is_plain_file_name(filename) {
                    return Err(TransferError::InvalidCommand);
                }
                let size = size
                    .trim()
                    .parse::<u32>()
                    .map_err(|_| TransferError::InvalidCommand)?;
                Ok(Self::StartReceive { filename, size })
            }
            _ => Err(TransferError::InvalidCommand),
        }
    }
}

fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= FILENAME_BYTES
        && !name.contains(['/', '\\'])
        && !name.contains("..")
}

/// `filename|size|status`, status as its decimal wire value.
pub fn format_info(info: &TransferInfo) -> InfoText {
    let mut out = InfoText::new();
    let _ = write!(
        out,
        "{}|{}|{}",
        info.filename,
        info.total_size,
        info.status.as_raw()
    );
    out
}

/// Characteristic access or link event forwarded by the BLE host task.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum GattRequest {
    ReadInfo,
    ReadData,
    WriteData(DataChunk),
    ReadControl,
    WriteControl(ControlPayload),
    Connected(PeerInfo),
    Disconnected,
    Rssi(i8),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum GattReply {
    Info(InfoText),
    Data(DataChunk),
    Control(u8),
    /// Bytes accepted by a data write.
    Written(usize),
    Done,
    Failed(TransferError),
}

impl<S: FileStore> TransferService<S> {
    /// Single entry point for marshaled GATT traffic.
    pub fn handle_request<A: Advertiser>(&mut self, request: GattRequest, adv: &mut A) -> GattReply {
        match request {
            GattRequest::ReadInfo => GattReply::Info(self.read_info()),
            GattRequest::ReadData => match self.read_data() {
                Ok(chunk) => GattReply::Data(Vec::from_slice(chunk).unwrap_or_default()),
                Err(err) => GattReply::Failed(err),
            },
            GattRequest::WriteData(data) => match self.write_data(&data) {
                Ok(written) => GattReply::Written(written),
                Err(err) => GattReply::Failed(err),
            },
            GattRequest::ReadControl => GattReply::Control(self.read_control()),
            GattRequest::WriteControl(payload) => match self.write_control(&payload) {
                Ok(()) => GattReply::Done,
                Err(err) => GattReply::Failed(err),
            },
            GattRequest::Connected(peer) => {
                self.on_connected(peer);
                GattReply::Done
            }
            GattRequest::Disconnected => {
                self.on_disconnected(adv);
                GattReply::Done
            }
            GattRequest::Rssi(rssi) => {
                self.update_rssi(rssi);
                GattReply::Done
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_cancel_and_start_receive() {
        assert_eq!(ControlCommand::parse(&[0x00]), Ok(ControlCommand::Cancel));
        assert_eq!(
            ControlCommand::parse(b"\x01photo.jpg|2048"),
            Ok(ControlCommand::StartReceive {
                filename: "photo.jpg",
                size: 2048
            })
        );
    }

    #[test]
    fn rejects_malformed_control_payloads() {
        let payloads: [&[u8]; 9] = [
            b"",
            b"\x02",
            b"\x01noseparator",
            b"\x01|10",
            b"\x01a.bin|ten",
            b"\x01../etc|1",
            b"\x01dir/a.bin|1",
            b"\x01dir\\a.bin|1",
            b"\x01a.bin|-1",
        ];
        for payload in payloads {
            assert_eq!(
                ControlCommand::parse(payload),
                Err(TransferError::InvalidCommand),
                "payload {payload:?}"
            );
        }
    }

    #[test]
    fn info_text_is_pipe_delimited() {
        let info = TransferInfo {
            filename: crate::text::bounded("a.bin"),
            total_size: 1200,
            status: crate::transfer::TransferStatus::Sending,
            ..TransferInfo::default()
        };
        assert_eq!(format_info(&info).as_str(), "a.bin|1200|1");
    }
}
