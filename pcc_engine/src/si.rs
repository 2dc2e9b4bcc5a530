//! SI dimensional types.
//!
//! A `Dimension` is a 7-tuple of signed exponents over the base SI
//! dimensions (length, mass, time, temperature, current, luminosity,
//! amount). All arithmetic is checked — a component leaving the valid
//! range is an error, never a wrap.
//!
//! The wire carries dimensions in a packed 4-byte form (seven 4-bit
//! two's-complement nibbles); the in-memory form is wider so that
//! derived quantities can exceed the nibble range without loss.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Saturation range for a single exponent: `[-MAX_EXPONENT, MAX_EXPONENT]`.
pub const MAX_EXPONENT: i16 = 200;

/// Range representable by a packed 4-bit nibble.
const PACK_MIN: i16 = -8;
const PACK_MAX: i16 = 7;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// SI arithmetic and packing failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiError {
    /// An exponent left the valid `[-MAX_EXPONENT, MAX_EXPONENT]` range.
    DimensionOverflow,
    /// An exponent does not fit the 4-bit packed wire form.
    PackedRange(i16),
    /// The reserved high nibble of the packed form was nonzero.
    ReservedNibble(u8),
}

impl fmt::Display for SiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SiError::DimensionOverflow => {
                write!(f, "dimension exponent out of range (±{})", MAX_EXPONENT)
            }
            SiError::PackedRange(e) => {
                write!(f, "exponent {} does not fit packed form ({}..={})", e, PACK_MIN, PACK_MAX)
            }
            SiError::ReservedNibble(b) => {
                write!(f, "reserved nibble nonzero in packed dimension: {:#04x}", b)
            }
        }
    }
}

impl std::error::Error for SiError {}

// ---------------------------------------------------------------------------
// Dimension
// ---------------------------------------------------------------------------

/// The dimensions of a physical quantity.
///
/// Exponent order is L, M, T, K, I, J, N: length, mass, time,
/// temperature, electric current, luminous intensity, amount (moles,
/// particles, pulses).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Dimension {
    exps: [i16; 7],
}

/// Dimension symbols in canonical render order.
const SYMBOLS: [char; 7] = ['L', 'M', 'T', 'K', 'I', 'J', 'N'];

impl Dimension {
    /// Create a dimension from explicit exponents.
    ///
    /// Fails with `DimensionOverflow` when any argument is outside
    /// `[-MAX_EXPONENT, MAX_EXPONENT]`.
    pub fn new(
        length: i16,
        mass: i16,
        time: i16,
        temperature: i16,
        current: i16,
        luminosity: i16,
        amount: i16,
    ) -> Result<Self, SiError> {
        let exps = [length, mass, time, temperature, current, luminosity, amount];
        if exps.iter().any(|e| e.abs() > MAX_EXPONENT) {
            return Err(SiError::DimensionOverflow);
        }
        Ok(Self { exps })
    }

    /// The dimensionless (all-zero) dimension.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn exp_length(&self) -> i16 {
        self.exps[0]
    }
    pub fn exp_mass(&self) -> i16 {
        self.exps[1]
    }
    pub fn exp_time(&self) -> i16 {
        self.exps[2]
    }
    pub fn exp_temperature(&self) -> i16 {
        self.exps[3]
    }
    pub fn exp_current(&self) -> i16 {
        self.exps[4]
    }
    pub fn exp_luminous(&self) -> i16 {
        self.exps[5]
    }
    pub fn exp_amount(&self) -> i16 {
        self.exps[6]
    }

    /// All seven exponents in L, M, T, K, I, J, N order.
    pub fn exponents(&self) -> [i16; 7] {
        self.exps
    }

    /// Inverse dimension (all exponents negated).
    ///
    /// Always succeeds — the valid range is symmetric around zero.
    pub fn inv(&self) -> Self {
        let mut exps = self.exps;
        for e in &mut exps {
            *e = -*e;
        }
        Self { exps }
    }

    /// Dimension of the product of two quantities (pairwise sum).
    pub fn mul(&self, other: &Dimension) -> Result<Self, SiError> {
        let mut exps = [0i16; 7];
        for i in 0..7 {
            let sum = self.exps[i] + other.exps[i];
            if sum.abs() > MAX_EXPONENT {
                return Err(SiError::DimensionOverflow);
            }
            exps[i] = sum;
        }
        Ok(Self { exps })
    }

    /// Dimension of the quotient of two quantities: `mul(self, other.inv())`.
    pub fn div(&self, other: &Dimension) -> Result<Self, SiError> {
        self.mul(&other.inv())
    }

    /// Pack into the 4-byte wire form: seven 4-bit two's-complement
    /// nibbles, low nibble first, high nibble of the last byte zero.
    ///
    /// Fails when any exponent is outside the nibble range `[-8, 7]`.
    pub fn pack(&self) -> Result<[u8; 4], SiError> {
        let mut nibbles = [0u8; 7];
        for (i, &e) in self.exps.iter().enumerate() {
            if !(PACK_MIN..=PACK_MAX).contains(&e) {
                return Err(SiError::PackedRange(e));
            }
            nibbles[i] = (e as i8 as u8) & 0x0F;
        }
        Ok([
            nibbles[0] | nibbles[1] << 4,
            nibbles[2] | nibbles[3] << 4,
            nibbles[4] | nibbles[5] << 4,
            nibbles[6],
        ])
    }

    /// Unpack the 4-byte wire form.
    ///
    /// The high nibble of the last byte is reserved and must be zero.
    pub fn unpack(b: [u8; 4]) -> Result<Self, SiError> {
        if b[3] & 0xF0 != 0 {
            return Err(SiError::ReservedNibble(b[3]));
        }
        let nib = |byte: u8, high: bool| -> i16 {
            let n = if high { byte >> 4 } else { byte & 0x0F };
            // Sign-extend the 4-bit value.
            (((n << 4) as i8) >> 4) as i16
        };
        Ok(Self {
            exps: [
                nib(b[0], false),
                nib(b[0], true),
                nib(b[1], false),
                nib(b[1], true),
                nib(b[2], false),
                nib(b[2], true),
                nib(b[3], false),
            ],
        })
    }
}

impl fmt::Display for Dimension {
    /// Concatenates non-zero terms in L,M,T,K,I,J,N order using Unicode
    /// superscripts; an exponent of 1 renders bare. The zero dimension
    /// renders as the empty string.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, &e) in self.exps.iter().enumerate() {
            if e == 0 {
                continue;
            }
            f.write_fmt(format_args!("{}", SYMBOLS[i]))?;
            if e != 1 {
                write_superscript(f, e)?;
            }
        }
        Ok(())
    }
}

/// Superscript digit forms for 0..=9.
const SUPERSCRIPTS: [char; 10] = ['⁰', '¹', '²', '³', '⁴', '⁵', '⁶', '⁷', '⁸', '⁹'];

fn write_superscript(f: &mut fmt::Formatter<'_>, value: i16) -> fmt::Result {
    if value < 0 {
        f.write_str("⁻")?;
    }
    let mut digits = [0u8; 5];
    let mut n = (value as i32).unsigned_abs();
    let mut len = 0;
    loop {
        digits[len] = (n % 10) as u8;
        len += 1;
        n /= 10;
        if n == 0 {
            break;
        }
    }
    for i in (0..len).rev() {
        f.write_fmt(format_args!("{}", SUPERSCRIPTS[digits[i] as usize]))?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Prefix
// ---------------------------------------------------------------------------

/// SI decimal prefixes, atto through exa.
///
/// A register's `base` field is the exponent of one of these prefixes;
/// the scaled value of the register is `value * 10^base`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Prefix {
    Atto,
    Femto,
    Pico,
    Nano,
    Micro,
    Milli,
    None,
    Kilo,
    Mega,
    Giga,
    Tera,
    Peta,
    Exa,
}

impl Prefix {
    /// Every prefix in ascending exponent order.
    pub const ALL: [Prefix; 13] = [
        Prefix::Atto,
        Prefix::Femto,
        Prefix::Pico,
        Prefix::Nano,
        Prefix::Micro,
        Prefix::Milli,
        Prefix::None,
        Prefix::Kilo,
        Prefix::Mega,
        Prefix::Giga,
        Prefix::Tera,
        Prefix::Peta,
        Prefix::Exa,
    ];

    /// The decimal exponent this prefix scales by.
    pub fn exponent(&self) -> i8 {
        match self {
            Prefix::Atto => -18,
            Prefix::Femto => -15,
            Prefix::Pico => -12,
            Prefix::Nano => -9,
            Prefix::Micro => -6,
            Prefix::Milli => -3,
            Prefix::None => 0,
            Prefix::Kilo => 3,
            Prefix::Mega => 6,
            Prefix::Giga => 9,
            Prefix::Tera => 12,
            Prefix::Peta => 15,
            Prefix::Exa => 18,
        }
    }

    /// The single-character prefix symbol. `Prefix::None` maps to a space.
    pub fn character(&self) -> char {
        match self {
            Prefix::Atto => 'a',
            Prefix::Femto => 'f',
            Prefix::Pico => 'p',
            Prefix::Nano => 'n',
            Prefix::Micro => 'u',
            Prefix::Milli => 'm',
            Prefix::None => ' ',
            Prefix::Kilo => 'k',
            Prefix::Mega => 'M',
            Prefix::Giga => 'G',
            Prefix::Tera => 'T',
            Prefix::Peta => 'P',
            Prefix::Exa => 'E',
        }
    }

    /// Resolve an exponent against the enumerated prefix set.
    pub fn from_exponent(exponent: i8) -> Option<Prefix> {
        Prefix::ALL.iter().copied().find(|p| p.exponent() == exponent)
    }

    /// Whether this prefix's exponent is a member of the enumerated set.
    pub fn is_valid(&self) -> bool {
        let e = self.exponent();
        (-18..=18).contains(&e) && e % 3 == 0
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
