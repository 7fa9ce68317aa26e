// ML307R 上电初始化
//
// 按原始驱动的流程走：关回显、AT 测试、SIM 检查、网络注册、
// PDP 上下文激活、取 IP 地址。每一步以固定子串判定成败。
use defmt::{info, warn, Format};
use embassy_time::{Duration, Timer};
use heapless::String;

use super::transport::{self, ModemSerial, ResponseText};
use crate::error::{Error, Result};

/// 网络注册状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Format)]
pub enum NetStatus {
    NotRegistered,
    Home,
    Roaming,
}

/// 初始化完成后的模块信息
pub struct ModemInfo {
    /// PDP 上下文分配的 IP 地址
    pub ip: String<16>,
    pub registration: NetStatus,
}

/// 完整的 4G 接入流程
pub async fn bring_up<S: ModemSerial>(serial: &mut S) -> Result<ModemInfo> {
    info!("Initializing 4G module...");

    // 关闭回显（响应不检查，旧固件可能不应答）
    let _ = transport::exchange(serial, "ATE0\r\n", Duration::from_secs(1)).await;
    Timer::after(Duration::from_millis(100)).await;

    // AT 测试
    let resp = transport::exchange(serial, "AT\r\n", Duration::from_secs(3)).await?;
    if !resp.contains("OK") {
        warn!("4G module not responding");
        return Err(Error::ModemError);
    }

    // SIM 卡
    let resp = transport::exchange(serial, "AT+CPIN?\r\n", Duration::from_secs(3)).await?;
    if !resp.contains("+CPIN: READY") {
        warn!("SIM card not ready");
        return Err(Error::ModemError);
    }
    info!("SIM card ready");

    // CS 网络注册
    let resp = transport::exchange(serial, "AT+CREG?\r\n", Duration::from_secs(3)).await?;
    let registration = registration_status(&resp);
    info!("CS registration: {}", registration);

    // PS 网络注册（数据业务必须已注册）
    let resp = transport::exchange(serial, "AT+CGREG?\r\n", Duration::from_secs(3)).await?;
    if registration_status(&resp) == NetStatus::NotRegistered {
        warn!("PS network not registered");
        return Err(Error::ModemError);
    }
    info!("PS network registered");

    // PDP 上下文
    let _ = transport::exchange(serial, "AT+CGDCONT=1,\"IP\",\"cmnet\"\r\n", Duration::from_secs(1)).await?;
    Timer::after(Duration::from_secs(1)).await;

    let _ = transport::exchange(serial, "AT+CGATT=1\r\n", Duration::from_secs(2)).await?;
    Timer::after(Duration::from_secs(2)).await;

    serial.write(b"AT+CGACT=1,1\r\n").await?;
    transport::wait_for(serial, "OK", Duration::from_secs(10)).await?;
    info!("PDP context activated");

    // IP 地址
    let resp = transport::exchange(serial, "AT+CGPADDR=1\r\n", Duration::from_secs(5)).await?;
    let ip = parse_ip(&resp).ok_or_else(|| {
        warn!("Failed to get IP address");
        Error::ModemError
    })?;

    info!("4G module initialized, IP={=str}", ip.as_str());
    Ok(ModemInfo { ip, registration })
}

/// 注册状态解析：0,1/0,5 本地注册，0,2/0,6 漫游，其余未注册
fn registration_status(resp: &str) -> NetStatus {
    if resp.contains("0,1") || resp.contains("0,5") {
        NetStatus::Home
    } else if resp.contains("0,2") || resp.contains("0,6") {
        NetStatus::Roaming
    } else {
        NetStatus::NotRegistered
    }
}

/// 从 +CGPADDR 响应提取引号内的 IP 地址
fn parse_ip(resp: &str) -> Option<String<16>> {
    let start = resp.find("+CGPADDR: 1,\"")? + "+CGPADDR: 1,\"".len();
    let rest = &resp[start..];
    let end = rest.find('"')?;

    let mut ip = String::new();
    ip.push_str(&rest[..end]).ok()?;
    Some(ip)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> ResponseText {
        let mut t = ResponseText::new();
        t.push_str(s).unwrap();
        t
    }

    #[test]
    fn registration_parses_home_and_roaming() {
        assert_eq!(registration_status(&text("+CREG: 0,1\r\nOK")), NetStatus::Home);
        assert_eq!(registration_status(&text("+CGREG: 0,5\r\nOK")), NetStatus::Home);
        assert_eq!(registration_status(&text("+CREG: 0,2\r\nOK")), NetStatus::Roaming);
        assert_eq!(
            registration_status(&text("+CREG: 0,0\r\nOK")),
            NetStatus::NotRegistered
        );
    }

    #[test]
    fn parses_quoted_ip() {
        let ip = parse_ip("\r\n+CGPADDR: 1,\"10.192.33.7\"\r\nOK\r\n").unwrap();
        assert_eq!(ip.as_str(), "10.192.33.7");

        assert!(parse_ip("+CGPADDR: 1,10.0.0.1").is_none());
        assert!(parse_ip("ERROR").is_none());
    }

    #[test]
    fn ip_longer_than_buffer_is_rejected() {
        assert!(parse_ip("+CGPADDR: 1,\"111.222.333.444.555.666\"").is_none());
    }
}
