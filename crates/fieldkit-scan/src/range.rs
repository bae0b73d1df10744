//! CIDR parsing and usable-host enumeration.

use std::net::Ipv4Addr;

use ipnet::Ipv4Net;

use crate::addr;
use crate::error::{Result, ScanError};

/// Split `"a.b.c.d/n"` into its masked network address and prefix.
///
/// Host bits in the address are allowed and cleared, so `192.168.0.15/24`
/// yields `(192.168.0.0, 24)`. Anything but the exact shape, including
/// whitespace or a signed prefix, is `InvalidCidr`.
pub fn parse_cidr(text: &str) -> Result<(Ipv4Addr, u8)> {
    match text.parse::<Ipv4Net>() {
        Ok(net) => Ok((net.trunc().addr(), net.prefix_len())),
        Err(_) => Err(prefix_out_of_range(text).unwrap_or_else(|| ScanError::InvalidCidr {
            input: text.to_string(),
        })),
    }
}

/// Well-formed apart from a prefix above 32.
fn prefix_out_of_range(text: &str) -> Option<ScanError> {
    let (ip, prefix) = text.split_once('/')?;
    ip.parse::<Ipv4Addr>().ok()?;
    if prefix.is_empty() || !prefix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let prefix: u32 = prefix.parse().ok()?;
    (prefix > 32).then_some(ScanError::PrefixOutOfRange { prefix })
}

/// Usable hosts of `network/prefix`, excluding the network and broadcast
/// addresses. `/31` and `/32` have none.
pub fn enumerate(network: Ipv4Addr, prefix: u8) -> Result<HostRange> {
    let mask = addr::prefix_to_mask(prefix)?;
    let net = addr::to_integer(addr::network_address(network, mask));
    let broadcast = net | !mask;

    if prefix >= 31 {
        return Ok(HostRange {
            next: broadcast,
            end: broadcast,
        });
    }

    Ok(HostRange {
        next: net + 1,
        end: broadcast,
    })
}

/// Lazy ascending sequence of host addresses.
///
/// Cloning before iterating gives an independent restart of the sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostRange {
    next: u32,
    /// Exclusive upper bound (the broadcast address).
    end: u32,
}

impl Iterator for HostRange {
    type Item = Ipv4Addr;

    fn next(&mut self) -> Option<Ipv4Addr> {
        if self.next >= self.end {
            return None;
        }
        let current = self.next;
        self.next += 1;
        Some(addr::from_integer(current))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.end.saturating_sub(self.next) as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for HostRange {}
