//! Fitting byte counts into the protocol's fixed-width integer fields.

/// Default starting allocation unit.
pub const DEFAULT_ALLOCATION_UNIT: u64 = 4096;

/// Exclusive upper bound of a scaled value (fits a signed 32-bit field).
pub const SCALED_LIMIT: u64 = 1 << 31;

/// A set of magnitudes expressed in a common allocation unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scaled<const N: usize> {
    /// Bytes per unit: the start unit times a power of two.
    pub unit: u64,
    /// The input values divided by `unit`, in input order.
    pub values: [u64; N],
}

/// Finds the smallest power-of-two multiple of `start_unit` for which every
/// value divided by it is below 2^31.
///
/// A start unit of 0 is treated as 1. Any `u64` fits once the unit reaches
/// 2^33, so the doubling ends well before the unit could overflow.
pub fn scale_to_units<const N: usize>(values: [u64; N], start_unit: u64) -> Scaled<N> {
    let mut unit = start_unit.max(1);
    loop {
        if values.iter().all(|v| v / unit < SCALED_LIMIT) {
            break;
        }
        match unit.checked_mul(2) {
            Some(next) => unit = next,
            None => break,
        }
    }

    Scaled {
        unit,
        values: values.map(|v| v / unit),
    }
}

/// [`scale_to_units`] starting from [`DEFAULT_ALLOCATION_UNIT`].
pub fn allocation_units<const N: usize>(values: [u64; N]) -> Scaled<N> {
    scale_to_units(values, DEFAULT_ALLOCATION_UNIT)
}

/// Reduces a counter modulo 2^32.
pub fn wrap32(value: u64) -> u32 {
    (value % (1 << 32)) as u32
}

/// Bytes to kibibytes, reduced modulo 2^32.
pub fn kib32(bytes: u64) -> u32 {
    wrap32(bytes / 1024)
}

/// Saturating conversion for signed 32-bit cells.
pub fn to_i32(value: u64) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}
