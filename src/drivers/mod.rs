pub mod mock_modem;
pub mod mock_wifi;

pub use mock_modem::MockModem;
pub use mock_wifi::MockWifiClient;
