use std::net::{IpAddr, Ipv4Addr, UdpSocket};

/// Probe address for local IP discovery. Connecting a UDP socket sends no packets.
const ROUTE_PROBE: (Ipv4Addr, u16) = (Ipv4Addr::new(10, 0, 0, 0), 1);

const HOSTNAME_PATH: &str = "/proc/sys/kernel/hostname";

/// Formats bytes as uppercase hexadecimal pairs separated by spaces.
pub(crate) fn format_hex(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return "<empty>".to_string();
    }

    bytes
        .iter()
        .map(|byte| hex::encode_upper([*byte]))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Formats an optional value for terminal output.
pub(crate) fn format_optional<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |value| value.to_string())
}

/// Returns the address of the interface that routes off-host, or loopback.
pub(crate) fn local_ip() -> IpAddr {
    let probe = || -> std::io::Result<IpAddr> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        socket.connect(ROUTE_PROBE)?;
        Ok(socket.local_addr()?.ip())
    };

    probe().unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

/// Returns the kernel host name, falling back to `$HOSTNAME` then `localhost`.
pub(crate) fn host_name() -> String {
    std::fs::read_to_string(HOSTNAME_PATH)
        .ok()
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .or_else(|| std::env::var("HOSTNAME").ok().filter(|name| !name.is_empty()))
        .unwrap_or_else(|| "localhost".to_string())
}
