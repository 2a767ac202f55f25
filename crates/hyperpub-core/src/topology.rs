//! Hypercube topology
//!
//! Pure functions over [`PeerAddress`]. Neighbors are produced in ascending
//! bit-position order (leftmost bit first); the router relies on this order
//! as its tie-break.

use crate::error::AddressError;
use crate::identity::PeerAddress;

/// All addresses one bit-flip away, in ascending bit-position order
///
/// Always returns exactly `address.width()` entries.
pub fn neighbors(address: &PeerAddress) -> Vec<PeerAddress> {
    (0..address.width())
        .map(|position| address.flip(position))
        .collect()
}

/// Hamming distance between two addresses of equal width
pub fn distance(a: &PeerAddress, b: &PeerAddress) -> Result<u32, AddressError> {
    Ok(a.xor_bits(b)?.count_ones())
}

/// Whether two addresses are hypercube neighbors
pub fn are_neighbors(a: &PeerAddress, b: &PeerAddress) -> bool {
    matches!(distance(a, b), Ok(1))
}

/// Every address of the given width, in numeric order
///
/// Intended for small cubes (tests, deployment helpers).
pub fn all_addresses(width: usize) -> Result<Vec<PeerAddress>, AddressError> {
    if width == 0 || width >= 32 {
        return Err(AddressError::InvalidWidth(width));
    }
    (0..(1u64 << width))
        .map(|value| PeerAddress::new(value, width))
        .collect()
}
