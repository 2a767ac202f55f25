//! Peer addresses
//!
//! A [`PeerAddress`] is a fixed-width bit string. Position 0 is the leftmost
//! character of the textual form, so `"100"` has bit 0 set. All topology
//! functions iterate positions in ascending order.

use std::fmt::{self, Display};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AddressError;

/// Widest supported address
pub const MAX_ADDRESS_WIDTH: usize = 64;

/// Address width of the reference eight-node deployment
pub const DEFAULT_ADDRESS_WIDTH: usize = 3;

/// Immutable k-bit node address
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PeerAddress {
    bits: u64,
    width: u8,
}

impl PeerAddress {
    /// Create an address from its numeric value and width
    ///
    /// Bits above `width` are rejected rather than truncated.
    pub fn new(value: u64, width: usize) -> Result<Self, AddressError> {
        if width == 0 || width > MAX_ADDRESS_WIDTH {
            return Err(AddressError::InvalidWidth(width));
        }
        if value & !mask(width) != 0 {
            return Err(AddressError::InvalidWidth(width));
        }
        Ok(Self {
            bits: value,
            width: width as u8,
        })
    }

    /// The all-zero address of the given width
    pub fn zero(width: usize) -> Result<Self, AddressError> {
        Self::new(0, width)
    }

    /// The all-zero address with the same width as this one
    pub fn origin(&self) -> Self {
        Self {
            bits: 0,
            width: self.width,
        }
    }

    /// Number of bits
    pub fn width(&self) -> usize {
        self.width as usize
    }

    /// Numeric value, reading the textual form as big-endian binary
    pub fn value(&self) -> u64 {
        self.bits
    }

    /// Whether the bit at `position` (0 = leftmost) is set
    pub fn bit(&self, position: usize) -> bool {
        debug_assert!(position < self.width());
        self.bits & self.position_mask(position) != 0
    }

    /// The address with the bit at `position` flipped
    pub fn flip(&self, position: usize) -> Self {
        debug_assert!(position < self.width());
        Self {
            bits: self.bits ^ self.position_mask(position),
            width: self.width,
        }
    }

    /// XOR of two addresses of equal width
    pub(crate) fn xor_bits(&self, other: &Self) -> Result<u64, AddressError> {
        if self.width != other.width {
            return Err(AddressError::LengthMismatch {
                left: self.width(),
                right: other.width(),
            });
        }
        Ok(self.bits ^ other.bits)
    }

    fn position_mask(&self, position: usize) -> u64 {
        1u64 << (self.width() - 1 - position)
    }
}

fn mask(width: usize) -> u64 {
    if width == MAX_ADDRESS_WIDTH {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

impl Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:0width$b}", self.bits, width = self.width())
    }
}

impl FromStr for PeerAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let width = s.chars().count();
        if width == 0 || width > MAX_ADDRESS_WIDTH {
            return Err(AddressError::InvalidWidth(width));
        }

        let mut bits = 0u64;
        for (position, character) in s.chars().enumerate() {
            bits <<= 1;
            match character {
                '0' => {}
                '1' => bits |= 1,
                _ => {
                    return Err(AddressError::InvalidCharacter {
                        character,
                        position,
                    });
                }
            }
        }

        Self::new(bits, width)
    }
}

impl TryFrom<String> for PeerAddress {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PeerAddress> for String {
    fn from(address: PeerAddress) -> Self {
        address.to_string()
    }
}
