pub mod flow;
pub mod table;

// 重新导出常用类型
pub use flow::{FlowKey, Ipv4Addr, Protocol};
pub use table::{NatRecord, NatTable, FLOW_BUFFER_SIZE, FLOW_TIMEOUT, MAX_NAT_CONNECTIONS};
