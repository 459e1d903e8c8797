use heapless::String;

pub const FILENAME_BYTES: usize = 64;

/// Wire value of each state is the Control characteristic read payload.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[repr(u8)]
pub enum TransferStatus {
    #[default]
    Idle = 0,
    Sending = 1,
    Receiving = 2,
    Complete = 3,
    Error = 4,
}

impl TransferStatus {
    pub const fn as_raw(self) -> u8 {
        self as u8
    }

    pub const fn is_active(self) -> bool {
        matches!(self, Self::Sending | Self::Receiving)
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum TransferDirection {
    #[default]
    Send,
    Receive,
}

/// Metadata of the current (or last finished) transfer.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TransferInfo {
    pub filename: String<FILENAME_BYTES>,
    pub total_size: u32,
    pub transferred: u32,
    pub status: TransferStatus,
    pub direction: TransferDirection,
    /// 0..=100, derived from `transferred / total_size`.
    pub progress: u8,
}

impl TransferInfo {
    pub(crate) fn started(
        filename: String<FILENAME_BYTES>,
        total_size: u32,
        direction: TransferDirection,
    ) -> Self {
        Self {
            filename,
            total_size,
            transferred: 0,
            status: match direction {
                TransferDirection::Send => TransferStatus::Sending,
                TransferDirection::Receive => TransferStatus::Receiving,
            },
            direction,
            progress: 0,
        }
    }

    pub(crate) fn advance(&mut self, bytes: usize) {
        let bytes = u32::try_from(bytes).unwrap_or(u32::MAX);
        self.transferred = self.transferred.saturating_add(bytes);
        self.progress = progress_percent(self.transferred, self.total_size);
    }

    pub(crate) const fn remaining(&self) -> u32 {
        self.total_size.saturating_sub(self.transferred)
    }
}

pub const fn progress_percent(transferred: u32, total: u32) -> u8 {
    if total == 0 {
        return 0;
    }
    let pct = (transferred as u64 * 100) / total as u64;
    if pct > 100 { 100 } else { pct as u8 }
}
