//! Dotted-quad <-> 32-bit ordinal conversion.
//!
//! Ordinals are big-endian, so numeric order matches address order and
//! contiguous addresses differ by exactly one.

use crate::error::{PoolError, Result};
use std::net::Ipv4Addr;

/// Parse a dotted-quad address into its ordinal.
///
/// Exactly four octets are required, each made of ASCII digits only and
/// within 0-255. Leading zeros are accepted (`010` is 10).
pub fn encode(address: &str) -> Result<u32> {
    let mut octets = [0u8; 4];
    let mut parts = address.split('.');

    for slot in octets.iter_mut() {
        let part = parts
            .next()
            .ok_or_else(|| PoolError::MalformedAddress(address.to_string()))?;
        *slot = parse_octet(part).ok_or_else(|| PoolError::MalformedAddress(address.to_string()))?;
    }

    if parts.next().is_some() {
        return Err(PoolError::MalformedAddress(address.to_string()));
    }

    Ok(octets
        .iter()
        .fold(0u32, |ordinal, &octet| (ordinal << 8) | u32::from(octet)))
}

/// Render an ordinal back to dotted-quad text.
pub fn decode(ordinal: u32) -> String {
    Ipv4Addr::from(ordinal).to_string()
}

/// Parse one octet: non-empty, digits only, value 0-255.
pub(crate) fn parse_octet(part: &str) -> Option<u8> {
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    part.parse::<u8>().ok()
}
