//! Lookup tables and the math used to build them.
//!
//! Every curve the engine needs (the sine wave, the envelope shapes, the
//! parameter maps) is a table generated by a `const fn` at compile time, so
//! nothing has to be initialised at startup and the audio path never touches
//! floating point.  The helpers below are stand-ins for `f64::exp()` and
//! friends, which aren't const evaluable (and aren't available at all in
//! `no_std`).  They're only as accurate as table generation needs.

use crate::{ModulationValue, Phase};

/// Number of bits of a [Phase] used as the table index
pub const TABLE_INDEX_BITS: u32 = 9;
/// Number of bits of a [Phase] below the table index
pub const TABLE_FRACTION_BITS: u32 = 15;
/// Number of bits in a [Phase] that actually mean something
pub const PHASE_BITS: u32 = TABLE_INDEX_BITS + TABLE_FRACTION_BITS;
/// Number of distinct table positions
pub const TABLE_SIZE: usize = 1 << TABLE_INDEX_BITS;
/// Length of a [LookupTable]: one extra entry so that interpolating from the
/// last position never needs a wraparound branch
pub const TABLE_LEN: usize = TABLE_SIZE + 1;

const INDEX_MASK: usize = TABLE_SIZE - 1;
// Fraction bits used for interpolation.  Each averaging round halves the
// weight of the rounds before it, so the most significant bit goes last.
const INTERP_BITS: [Phase; 3] = [1 << 12, 1 << 13, 1 << 14];

/// A value that can be stored in a [LookupTable]
pub trait TableValue: Copy {
    /// Truncating integer average of `self` and `other`, without overflow
    fn average(self, other: Self) -> Self;
}

impl TableValue for i16 {
    fn average(self, other: Self) -> Self {
        ((self as i32 + other as i32) / 2) as i16
    }
}

impl TableValue for u16 {
    fn average(self, other: Self) -> Self {
        ((self as u32 + other as u32) / 2) as u16
    }
}

impl TableValue for u32 {
    fn average(self, other: Self) -> Self {
        ((self as u64 + other as u64) / 2) as u32
    }
}

impl TableValue for i32 {
    fn average(self, other: Self) -> Self {
        ((self as i64 + other as i64) / 2) as i32
    }
}

/// An immutable table of [TABLE_LEN] values with interpolated lookup by
/// [Phase].
///
/// Interpolation uses only the top three fraction bits, averaging towards the
/// next entry once per bit.  That gives eight evenly spaced steps between two
/// entries using nothing but adds and shifts, and it is exact at the entries
/// themselves.
#[derive(Clone)]
pub struct LookupTable<V> {
    entries: [V; TABLE_LEN],
}

impl<V: TableValue> LookupTable<V> {
    /// Wrap a precomputed array of entries
    pub const fn new(entries: [V; TABLE_LEN]) -> Self {
        Self { entries }
    }
    /// Build a table where entry `i` is `f(i, TABLE_LEN)`
    pub fn from_fn(mut f: impl FnMut(usize, usize) -> V) -> Self {
        Self {
            entries: core::array::from_fn(|i| f(i, TABLE_LEN)),
        }
    }
    /// Build a table for a periodic waveform.  This is the same as
    /// [LookupTable::from_fn] except the last entry always repeats the first.
    pub fn periodic_from_fn(f: impl FnMut(usize, usize) -> V) -> Self {
        let mut table = Self::from_fn(f);
        table.entries[TABLE_SIZE] = table.entries[0];
        table
    }
    /// The raw table entries
    pub fn entries(&self) -> &[V; TABLE_LEN] {
        &self.entries
    }
    /// Look up the value at `*accumulator + modulation`, then advance the
    /// accumulator by `increment`.  The modulation only shifts the read
    /// position and is never written back.
    #[inline]
    pub fn lookup_interpolate(
        &self,
        accumulator: &mut Phase,
        increment: Phase,
        modulation: ModulationValue,
    ) -> V {
        let value = self.lookup(accumulator.wrapping_add(modulation as Phase));
        *accumulator = accumulator.wrapping_add(increment);
        value
    }
    /// Look up the value at `position` without any accumulator
    #[inline]
    pub fn lookup(&self, position: Phase) -> V {
        let index = (position >> TABLE_FRACTION_BITS) as usize & INDEX_MASK;
        let entry0 = self.entries[index];
        let entry1 = self.entries[index + 1];
        let mut value = entry0;
        for bit in INTERP_BITS {
            value = value.average(if position & bit != 0 { entry1 } else { entry0 });
        }
        value
    }
}

// The functions below are helpers because the ones in std are not const
// evaluable on stable (or present at all in no_std).

const PI: f64 = core::f64::consts::PI;
const LN_2: f64 = core::f64::consts::LN_2;

// Absolute value
const fn f_abs(x: f64) -> f64 {
    if x < 0f64 {
        -x
    } else {
        x
    }
}

/// Round to the nearest integer, with halfway cases away from zero
pub(crate) const fn round(x: f64) -> f64 {
    if x < 0f64 {
        -round(-x)
    } else {
        ((x + 0.5) as u64) as f64
    }
}

/// Calculate e^x
pub(crate) const fn exp(x: f64) -> f64 {
    // e^x == 2^k * e^r, with |r| <= ln(2)/2 so the series converges quickly
    let k = round(x / LN_2) as i32;
    let r = x - (k as f64) * LN_2;
    let mut term = 1f64;
    let mut acc = 1f64;
    let mut n = 1u32;
    while n < 20 {
        term = term * r / n as f64;
        acc += term;
        n += 1;
    }
    let mut k = k;
    while k > 0 {
        acc *= 2f64;
        k -= 1;
    }
    while k < 0 {
        acc /= 2f64;
        k += 1;
    }
    acc
}

/// Calculate 2^x
pub(crate) const fn exp2(x: f64) -> f64 {
    exp(x * LN_2)
}

/// Calculate ln(x) for x > 0
pub(crate) const fn ln(x: f64) -> f64 {
    let mut m = x;
    let mut k = 0i32;
    while m >= 2f64 {
        m /= 2f64;
        k += 1;
    }
    while m < 1f64 {
        m *= 2f64;
        k -= 1;
    }
    // ln(m) = 2 * atanh((m - 1) / (m + 1)), and that ratio is at most 1/3
    let z = (m - 1f64) / (m + 1f64);
    let z2 = z * z;
    let mut term = z;
    let mut acc = 0f64;
    let mut n = 1u32;
    while n < 40 {
        acc += term / n as f64;
        term *= z2;
        n += 2;
    }
    2f64 * acc + (k as f64) * LN_2
}

/// Calculate the square root of x (zero for negative inputs)
pub(crate) const fn sqrt(x: f64) -> f64 {
    if x <= 0f64 {
        return 0f64;
    }
    let mut guess = if x > 1f64 { x } else { 1f64 };
    let mut i = 0;
    while i < 64 {
        guess = 0.5 * (guess + x / guess);
        i += 1;
    }
    guess
}

/// Calculate sin(x)
pub(crate) const fn sin(x: f64) -> f64 {
    const DELTA: f64 = 1e-15;
    let mut theta = x;
    while theta > PI {
        theta -= 2f64 * PI;
    }
    while theta < -PI {
        theta += 2f64 * PI;
    }
    let theta2 = theta * theta;
    let mut term = theta;
    let mut acc = theta;
    let mut n = 1u32;
    while f_abs(term) > DELTA {
        term = -term * theta2 / ((2 * n) * (2 * n + 1)) as f64;
        acc += term;
        n += 1;
    }
    acc
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn const_math_matches_std() {
        for i in 0..200 {
            let x = (i as f64) * 0.0625 - 6.0;
            assert!((exp(x) / x.exp() - 1.0).abs() < 1e-12, "exp({x})");
            assert!((sin(x) - x.sin()).abs() < 1e-12, "sin({x})");
            assert!((exp2(x) / x.exp2() - 1.0).abs() < 1e-12, "exp2({x})");
            let y = (i + 1) as f64 * 1.37;
            assert!((ln(y) - y.ln()).abs() < 1e-12, "ln({y})");
            assert!((sqrt(y) - y.sqrt()).abs() < 1e-9, "sqrt({y})");
        }
        assert_eq!(round(2.5), 3.0);
        assert_eq!(round(-2.5), -3.0);
        assert_eq!(round(-0.4), 0.0);
    }

    #[test]
    fn exact_at_table_entries() {
        let table = LookupTable::from_fn(|i, n| (i as i32 * 37 - n as i32 * 11) as i16);
        for i in 0..TABLE_LEN {
            // the index is taken mod 512, so the last entry is only reachable
            // from the previous one
            let i = i & INDEX_MASK;
            let mut acc = (i as Phase) << TABLE_FRACTION_BITS;
            let expected = (i as i32 * 37 - TABLE_LEN as i32 * 11) as i16;
            assert_eq!(table.lookup_interpolate(&mut acc, 0, 0), expected);
            assert_eq!(acc, (i as Phase) << TABLE_FRACTION_BITS);
        }
    }

    #[test]
    fn interpolates_in_eighths() {
        let table = LookupTable::from_fn(|i, _| (i * 800) as u32);
        let base: Phase = 3 << TABLE_FRACTION_BITS;
        let mut last = table.lookup(base);
        assert_eq!(last, 2400);
        for step in 1..8 {
            let value = table.lookup(base + (step << 12));
            assert_eq!(value, 2400 + 100 * step);
            assert!(value > last);
            last = value;
        }
        // bits below the top three are ignored
        assert_eq!(table.lookup(base + 0xFFF), 2400);
    }

    #[test]
    fn periodic_tables_wrap() {
        let table = LookupTable::periodic_from_fn(|i, _| i as u16);
        assert_eq!(table.entries()[TABLE_SIZE], 0);
        // one past the end of the 24 bit range lands back on entry zero
        assert_eq!(table.lookup(1 << PHASE_BITS), 0);
        // halfway between the last position and the wraparound entry
        assert_eq!(table.lookup((511 << TABLE_FRACTION_BITS) | 0x4000), 255);
    }

    #[test]
    fn signed_average_truncates() {
        assert_eq!((-3i16).average(0), -1);
        assert_eq!(i16::MIN.average(i16::MIN), i16::MIN);
        assert_eq!(u16::MAX.average(u16::MAX), u16::MAX);
    }

    proptest! {
        #[test]
        fn accumulator_ignores_modulation(
            start in any::<u32>(),
            increment in any::<u32>(),
            mods in proptest::collection::vec(any::<i32>(), 1..64),
        ) {
            let table = LookupTable::periodic_from_fn(|i, _| i as i16);
            let mut acc = start;
            for m in &mods {
                table.lookup_interpolate(&mut acc, increment, *m);
            }
            let expected = start.wrapping_add(increment.wrapping_mul(mods.len() as u32));
            prop_assert_eq!(acc, expected);
        }
    }
}
