pub mod sd_spi;

pub use sd_spi::{FixedTimeSource, SdFile, SdFileStore, SdMountError, SdSpiDevice};
