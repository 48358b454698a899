// Local crates
use crate::models::models::Address;

// External crates
use chrono::{DateTime, Utc};
use std::net::{Ipv4Addr, Ipv6Addr};

/// Stand-in for empty name and address columns, keeps tables aligned
pub const PLACEHOLDER: &str = "-";
/// Relative time of an entity that never saw a call
pub const NEVER: &str = "never";
/// Absolute time that the server did not report
pub const NONE: &str = "none";

pub fn decorate_empty(value: &str) -> &str {
    if value.is_empty() { PLACEHOLDER } else { value }
}

/// Relative time since `ts`, e.g. `1m30s ago`.
///
/// Durations are truncated to whole seconds and printed hour/minute/second style
/// (`2h0m5s`, `45s`). Timestamps ahead of `now` clamp to `0s ago`.
pub fn elapsed(now: DateTime<Utc>, ts: Option<DateTime<Utc>>) -> String {
    let Some(ts) = ts else {
        return NEVER.to_string();
    };

    let total = (now - ts).num_seconds().max(0);
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);

    if hours > 0 {
        format!("{hours}h{minutes}m{seconds}s ago")
    } else if minutes > 0 {
        format!("{minutes}m{seconds}s ago")
    } else {
        format!("{seconds}s ago")
    }
}

pub fn timestamp(ts: Option<DateTime<Utc>>) -> String {
    ts.map(|t| t.to_rfc3339()).unwrap_or_else(|| NONE.to_string())
}

/// Textual form of a raw 4 or 16 byte ip. IPv4-mapped IPv6 addresses print as IPv4.
pub fn ip(bytes: &[u8]) -> String {
    if let Ok(octets) = <[u8; 4]>::try_from(bytes) {
        return Ipv4Addr::from(octets).to_string();
    }
    if let Ok(octets) = <[u8; 16]>::try_from(bytes) {
        let v6 = Ipv6Addr::from(octets);
        return match v6.to_ipv4_mapped() {
            Some(v4) => v4.to_string(),
            None => v6.to_string(),
        };
    }
    if bytes.is_empty() {
        return "<nil>".to_string();
    }
    let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
    format!("?{hex}")
}

/// `[ip]:port` for TCP addresses, empty for everything else.
pub fn address(addr: Option<&Address>) -> String {
    match addr {
        Some(Address::TcpipAddress { ip_address, port }) => {
            format!("[{}]:{}", ip(ip_address), port)
        }
        Some(Address::UdsAddress { .. }) | Some(Address::OtherAddress { .. }) | None => {
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_750_000_000, 0).unwrap()
    }

    #[test]
    fn elapsed_formats_minutes_and_seconds() {
        let last = now() - TimeDelta::seconds(90);
        assert_eq!(elapsed(now(), Some(last)), "1m30s ago");
    }

    #[test]
    fn elapsed_formats_hours_and_seconds() {
        let last = now() - TimeDelta::seconds(2 * 3600 + 5);
        assert_eq!(elapsed(now(), Some(last)), "2h0m5s ago");
        assert_eq!(
            elapsed(now(), Some(now() - TimeDelta::milliseconds(12_900))),
            "12s ago"
        );
    }

    #[test]
    fn elapsed_without_timestamp_is_never() {
        assert_eq!(elapsed(now(), None), NEVER);
    }

    #[test]
    fn elapsed_clamps_future_timestamps() {
        let ahead = now() + TimeDelta::seconds(30);
        assert_eq!(elapsed(now(), Some(ahead)), "0s ago");
    }

    #[test]
    fn empty_values_are_decorated() {
        assert_eq!(decorate_empty(""), "-");
        assert_eq!(decorate_empty("lb"), "lb");
    }

    #[test]
    fn tcp_addresses_render_bracketed() {
        let v4 = Address::TcpipAddress {
            ip_address: vec![10, 0, 0, 7],
            port: 443,
        };
        let mut mapped = vec![0u8; 10];
        mapped.extend_from_slice(&[0xff, 0xff, 127, 0, 0, 1]);
        let v4_mapped = Address::TcpipAddress {
            ip_address: mapped,
            port: 50051,
        };
        let v6 = Address::TcpipAddress {
            ip_address: Ipv6Addr::LOCALHOST.octets().to_vec(),
            port: 8080,
        };

        assert_eq!(address(Some(&v4)), "[10.0.0.7]:443");
        assert_eq!(address(Some(&v4_mapped)), "[127.0.0.1]:50051");
        assert_eq!(address(Some(&v6)), "[::1]:8080");
    }

    #[test]
    fn non_tcp_addresses_degrade_to_empty() {
        let uds = Address::UdsAddress {
            filename: "/run/app.sock".into(),
        };
        assert_eq!(address(Some(&uds)), "");
        assert_eq!(address(None), "");
    }
}
