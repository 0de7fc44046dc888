//! Sentinel values marking missing or masked data.
//!
//! Every "is this entry missing?" test in the crate goes through
//! [`is_missing`], which compares bit-for-bit against [`MISSING_F64`].
//! The double sentinel is the widened float sentinel, so a value that
//! round-trips through an `f32` file column stays recognisable.

/// Missing marker for single precision columns.
pub const MISSING_F32: f32 = -3.368_795_3e38;

/// Missing marker for double precision values.
pub const MISSING_F64: f64 = MISSING_F32 as f64;

/// Missing marker for 32-bit integer columns.
pub const MISSING_I32: i32 = -2_147_483_643;

/// Missing marker for 64-bit integer columns.
pub const MISSING_I64: i64 = -9_223_372_036_854_775_801;

/// Whether `value` is exactly the double sentinel.
#[inline]
pub fn is_missing(value: f64) -> bool {
    value.to_bits() == MISSING_F64.to_bits()
}

/// Narrow a double to the file representation, preserving the sentinel.
#[inline]
pub fn to_f32(value: f64) -> f32 {
    if is_missing(value) {
        MISSING_F32
    } else {
        value as f32
    }
}

/// Widen a file value to a double, preserving the sentinel.
#[inline]
pub fn from_f32(value: f32) -> f64 {
    if value.to_bits() == MISSING_F32.to_bits() {
        MISSING_F64
    } else {
        value as f64
    }
}
