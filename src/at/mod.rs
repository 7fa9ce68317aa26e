pub mod client;
pub mod command;
pub mod line;
pub mod modem;
pub mod response;
pub mod session;
pub mod transport;

// 重新导出常用类型
pub use client::AtClient;
pub use line::{LineBuffer, RxItem, AT_LINE_MAX};
pub use session::{SessionId, SessionPool, MAX_AT_SESSIONS};
pub use transport::ModemSerial;
