//! Bulk insert specs: a single address, or an address whose last octet is
//! an inclusive `start-end` range.
//!
//! Accepted forms:
//! - `10.0.0.5`
//! - `10.0.0.5-8`
//! - `10.0.0.5-10.0.0.8` (both ends must share the first three octets)

use crate::address::{self, parse_octet};
use crate::error::{PoolError, Result};

/// A parsed insert request, expanded lazily into addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeSpec {
    Single(u32),
    LastOctet { prefix: [u8; 3], start: u8, end: u8 },
}

impl RangeSpec {
    pub fn parse(spec: &str) -> Result<Self> {
        let spec = spec.trim();

        let Some((head, tail)) = spec.split_once('-') else {
            return address::encode(spec).map(RangeSpec::Single);
        };

        let head_parts: Vec<&str> = head.split('.').collect();
        if head_parts.len() != 4 {
            return Err(PoolError::invalid_range(
                spec,
                "only the last octet may contain a range",
            ));
        }

        let mut prefix = [0u8; 3];
        for (slot, part) in prefix.iter_mut().zip(&head_parts[..3]) {
            *slot = parse_octet(part)
                .ok_or_else(|| PoolError::invalid_range(spec, format!("bad octet '{}'", part)))?;
        }
        let start = parse_octet(head_parts[3]).ok_or_else(|| {
            PoolError::invalid_range(spec, format!("bad range start '{}'", head_parts[3]))
        })?;

        let end = if tail.contains('.') {
            let end_ordinal = address::encode(tail)
                .map_err(|_| PoolError::invalid_range(spec, format!("bad range end '{}'", tail)))?;
            let [a, b, c, d] = end_ordinal.to_be_bytes();
            if [a, b, c] != prefix {
                return Err(PoolError::invalid_range(
                    spec,
                    "range ends must share the first three octets",
                ));
            }
            d
        } else {
            parse_octet(tail)
                .ok_or_else(|| PoolError::invalid_range(spec, format!("bad range end '{}'", tail)))?
        };

        if start > end {
            return Err(PoolError::invalid_range(
                spec,
                format!("start {} is greater than end {}", start, end),
            ));
        }

        Ok(RangeSpec::LastOctet { prefix, start, end })
    }

    /// Number of addresses the spec covers.
    pub fn address_count(&self) -> usize {
        match self {
            RangeSpec::Single(_) => 1,
            RangeSpec::LastOctet { start, end, .. } => usize::from(*end - *start) + 1,
        }
    }

    /// Ordinals covered by the spec, ascending.
    pub fn ordinals(&self) -> impl Iterator<Item = u32> {
        let (first, last) = match *self {
            RangeSpec::Single(ordinal) => (ordinal, ordinal),
            RangeSpec::LastOctet { prefix, start, end } => {
                let base = u32::from_be_bytes([prefix[0], prefix[1], prefix[2], 0]);
                (base | u32::from(start), base | u32::from(end))
            }
        };
        first..=last
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addresses(spec: &str) -> Vec<String> {
        RangeSpec::parse(spec)
            .unwrap()
            .ordinals()
            .map(address::decode)
            .collect()
    }

    #[test]
    fn test_single_address() {
        assert_eq!(addresses("192.168.0.7"), vec!["192.168.0.7"]);
    }

    #[test]
    fn test_full_address_range() {
        assert_eq!(
            addresses("10.0.0.5-10.0.0.8"),
            vec!["10.0.0.5", "10.0.0.6", "10.0.0.7", "10.0.0.8"]
        );
    }

    #[test]
    fn test_last_octet_range() {
        let spec = RangeSpec::parse("10.0.0.250-255").unwrap();
        assert_eq!(spec.address_count(), 6);
        assert_eq!(addresses("10.0.0.3-3"), vec!["10.0.0.3"]);
    }

    #[test]
    fn test_range_marker_outside_last_octet() {
        for bad in ["10.0-5.0.1", "10-11.0.0.1", "10.0.0-2.1"] {
            assert!(
                matches!(RangeSpec::parse(bad), Err(PoolError::InvalidRangeSpec { .. })),
                "expected {:?} to be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_inverted_or_out_of_bounds_range() {
        for bad in ["10.0.0.8-5", "10.0.0.5-256", "10.0.0.5-", "10.0.300.1-4", "10.0.0.5-10.0.1.8"] {
            assert!(
                matches!(RangeSpec::parse(bad), Err(PoolError::InvalidRangeSpec { .. })),
                "expected {:?} to be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_single_malformed_is_address_error() {
        assert!(matches!(
            RangeSpec::parse("10.0.0"),
            Err(PoolError::MalformedAddress(_))
        ));
    }
}
