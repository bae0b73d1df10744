//! IPv4 address arithmetic.
//!
//! Addresses are handled as big-endian `u32` values: `10.0.0.1` is
//! `0x0a00_0001`.

use std::net::Ipv4Addr;

use crate::error::{Result, ScanError};

pub fn to_integer(addr: Ipv4Addr) -> u32 {
    u32::from(addr)
}

pub fn from_integer(value: u32) -> Ipv4Addr {
    Ipv4Addr::from(value)
}

/// Interpret raw network-order bytes as an address value.
///
/// Anything other than exactly four bytes is rejected.
pub fn from_octets(bytes: &[u8]) -> Result<u32> {
    let octets: [u8; 4] = bytes.try_into().map_err(|_| ScanError::InvalidAddress {
        input: format!("{} bytes", bytes.len()),
    })?;
    Ok(u32::from_be_bytes(octets))
}

/// Mask with the top `prefix` bits set.
pub fn prefix_to_mask(prefix: u8) -> Result<u32> {
    if prefix > 32 {
        return Err(ScanError::PrefixOutOfRange {
            prefix: prefix.into(),
        });
    }
    Ok(u32::MAX.checked_shl(32 - u32::from(prefix)).unwrap_or(0))
}

/// Count the leading one-bits of a mask.
///
/// Counting stops at the first zero bit and contiguity is not validated:
/// `255.0.255.0` reports 8.
pub fn mask_prefix_length(mask: u32) -> u8 {
    mask.leading_ones() as u8
}

pub fn network_address(addr: Ipv4Addr, mask: u32) -> Ipv4Addr {
    from_integer(to_integer(addr) & mask)
}

pub fn broadcast_address(addr: Ipv4Addr, mask: u32) -> Ipv4Addr {
    from_integer(to_integer(addr) | !mask)
}
