pub mod intake_task;
pub mod modem_task;
pub mod sweep_task;
pub mod wifi_task;
