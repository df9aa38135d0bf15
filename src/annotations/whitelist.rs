//! Whitelist address validation and map naming.

use std::net::IpAddr;

use crate::maps::MapName;
use crate::units;

/// Whitelist values with this prefix reference an existing pattern file.
pub const PATTERNS_PREFIX: &str = "patterns/";

/// Prefix of maps created from inline whitelists.
pub const WHITELIST_MAP_PREFIX: &str = "ratelimit-whitelist-";

/// Name of the map holding an inline whitelist.
///
/// Derived from the raw annotation text so rules sharing a whitelist share
/// one map.
pub fn whitelist_map_name(raw: &str) -> MapName {
    MapName::new(format!("{}{}", WHITELIST_MAP_PREFIX, units::hash(raw.as_bytes())))
}

/// Whether `address` is a single IP address or a CIDR block.
pub fn is_valid_address(address: &str) -> bool {
    address.parse::<IpAddr>().is_ok() || is_valid_cidr(address)
}

fn is_valid_cidr(address: &str) -> bool {
    let Some((ip, prefix)) = address.split_once('/') else {
        return false;
    };
    let Ok(ip) = ip.parse::<IpAddr>() else {
        return false;
    };
    if prefix.is_empty() || prefix.len() > 3 || !prefix.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    let Ok(prefix) = prefix.parse::<u8>() else {
        return false;
    };

    let max = if ip.is_ipv4() { 32 } else { 128 };
    prefix <= max
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_addresses() {
        assert!(is_valid_address("192.168.1.1"));
        assert!(is_valid_address("::1"));
        assert!(is_valid_address("2001:db8::8a2e:370:7334"));
        assert!(!is_valid_address("invalid-ip"));
        assert!(!is_valid_address("256.1.1.1"));
        assert!(!is_valid_address(""));
    }

    #[test]
    fn test_cidr_blocks() {
        assert!(is_valid_address("10.0.0.0/8"));
        assert!(is_valid_address("172.16.0.0/12"));
        assert!(is_valid_address("0.0.0.0/0"));
        assert!(is_valid_address("2001:db8::/32"));
        assert!(is_valid_address("::/128"));
    }

    #[test]
    fn test_bad_cidr_blocks() {
        assert!(!is_valid_address("192.168.1.0/33"));
        assert!(!is_valid_address("2001:db8::/129"));
        assert!(!is_valid_address("10.0.0.0/"));
        assert!(!is_valid_address("10.0.0.0/+8"));
        assert!(!is_valid_address("10.0.0.0/8/8"));
        assert!(!is_valid_address("/8"));
    }

    #[test]
    fn test_map_name_is_content_addressed() {
        let a = whitelist_map_name("10.0.0.0/8, 192.168.1.100");
        let b = whitelist_map_name("10.0.0.0/8, 192.168.1.100");
        let c = whitelist_map_name("10.0.0.0/8,192.168.1.100");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.as_str().starts_with(WHITELIST_MAP_PREFIX));
    }
}
