//! Service layer module root.
//! Contains the transceive engine, device sessions and the applet clients.

pub mod admin;
pub mod import;
pub mod manager;
pub mod oath;
pub mod session;
pub mod transceive;

pub use admin::AdminClient;
pub use import::{parse_otpauth, OtpauthImport};
pub use manager::{Connector, DeviceManager};
pub use oath::{MutationReport, OathClient, SelectOutcome};
pub use session::{Clock, DeviceSession, SystemClock};
pub use transceive::{
    ApduHistory, ApduLog, ApduLogEntry, ControlChannel, Pause, PollSettings, TokioPause,
    Transceiver,
};
