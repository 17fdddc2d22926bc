//! Device address type.

use std::fmt;
use std::str::FromStr;

use crate::error::AddressParseError;

/// 48-bit radio address of a remote device.
///
/// The address is the stable identity of a peer; device names are advisory
/// and may repeat. Bytes are stored most significant first, matching the
/// textual form.
///
/// # Example
///
/// ```
/// use syncstream::DeviceAddress;
///
/// let addr: DeviceAddress = "00:1A:7D:DA:71:13".parse().unwrap();
/// assert_eq!(addr, DeviceAddress::from(0x001A_7DDA_7113_u64));
/// assert_eq!(addr.to_string(), "00:1A:7D:DA:71:13");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceAddress([u8; 6]);

impl DeviceAddress {
    /// Creates an address from its six bytes, most significant first.
    pub const fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    /// Returns the address bytes, most significant first.
    pub fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }

    /// Returns the address as an integer.
    pub fn to_u64(&self) -> u64 {
        self.0
            .iter()
            .fold(0u64, |acc, &byte| (acc << 8) | u64::from(byte))
    }
}

impl From<u64> for DeviceAddress {
    /// Takes the low 48 bits.
    fn from(value: u64) -> Self {
        let b = value.to_be_bytes();
        Self([b[2], b[3], b[4], b[5], b[6], b[7]])
    }
}

impl From<[u8; 6]> for DeviceAddress {
    fn from(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

impl FromStr for DeviceAddress {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || AddressParseError {
            input: s.to_string(),
        };

        let digits: String = if s.contains(':') || s.contains('-') {
            let parts: Vec<&str> = s.split([':', '-']).collect();
            if parts.len() != 6 || parts.iter().any(|p| p.len() != 2) {
                return Err(err());
            }
            parts.concat()
        } else {
            s.to_string()
        };

        if digits.len() != 12 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(err());
        }

        let mut bytes = [0u8; 6];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&digits[i * 2..i * 2 + 2], 16).map_err(|_| err())?;
        }
        Ok(Self(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_uppercase_colon() {
        let addr = DeviceAddress::new([0xaa, 0xbb, 0x0c, 0x01, 0x02, 0xff]);
        assert_eq!(addr.to_string(), "AA:BB:0C:01:02:FF");
    }

    #[test]
    fn test_parse_separators() {
        let colon: DeviceAddress = "aa:bb:cc:dd:ee:ff".parse().unwrap();
        let dash: DeviceAddress = "AA-BB-CC-DD-EE-FF".parse().unwrap();
        let bare: DeviceAddress = "AABBCCDDEEFF".parse().unwrap();
        assert_eq!(colon, dash);
        assert_eq!(colon, bare);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("AA:BB:CC:DD:EE".parse::<DeviceAddress>().is_err());
        assert!("AA:BB:CC:DD:EE:GG".parse::<DeviceAddress>().is_err());
        assert!("AABBCCDDEEF".parse::<DeviceAddress>().is_err());
        assert!("A:ABB:CC:DD:EE:FF".parse::<DeviceAddress>().is_err());
    }

    #[test]
    fn test_u64_conversion_keeps_low_48_bits() {
        let addr = DeviceAddress::from(0xFFFF_0011_2233_4455_u64);
        assert_eq!(addr.to_u64(), 0x0011_2233_4455);
    }

    #[test]
    fn test_hash_distinguishes_addresses() {
        use std::collections::HashSet;

        let mut set = HashSet::new();
        set.insert(DeviceAddress::from(1));
        set.insert(DeviceAddress::from(2));
        set.insert(DeviceAddress::from(1));
        assert_eq!(set.len(), 2);
    }
}
