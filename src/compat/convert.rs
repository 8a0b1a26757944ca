//! Coercion of loosely typed numeric arguments
//!
//! `limit` and `offset` historically accepted any value. `NumericArg`
//! closes the accepted shapes and `convert_to_int` applies the legacy
//! conversion rules to them.

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum NumericArg {
    Int(isize),
    Int32(i32),
    Int64(i64),
    UInt32(u32),
    UInt64(u64),
    Float32(f32),
    Float64(f64),
    /// Anything that is not a number
    Other(String),
}

macro_rules! numeric_from {
    ($($ty:ty => $variant:ident),+ $(,)?) => {
        $(
            impl From<$ty> for NumericArg {
                fn from(v: $ty) -> Self {
                    NumericArg::$variant(v)
                }
            }
        )+
    };
}

numeric_from! {
    isize => Int,
    i32 => Int32,
    i64 => Int64,
    u32 => UInt32,
    u64 => UInt64,
    f32 => Float32,
    f64 => Float64,
    String => Other,
}

impl From<&str> for NumericArg {
    fn from(v: &str) -> Self {
        NumericArg::Other(v.to_string())
    }
}

impl From<usize> for NumericArg {
    fn from(v: usize) -> Self {
        NumericArg::UInt64(v as u64)
    }
}

const INT64_RANGE: &str = "int64 value out of range for int";
const FLOAT_FRACTION: &str = "float64 value cannot be converted to int";
const FLOAT_RANGE: &str = "float64 value out of range for int";
const NOT_CONVERTIBLE: &str = "value is not convertible to int";

/// Convert a numeric argument to a platform integer
pub fn convert_to_int(value: impl Into<NumericArg>) -> Result<isize> {
    match value.into() {
        NumericArg::Int(v) => Ok(v),
        NumericArg::Int32(v) => Ok(v as isize),
        NumericArg::Int64(v) => isize::try_from(v).map_err(|_| Error::conversion(INT64_RANGE)),
        NumericArg::UInt32(v) => isize::try_from(v).map_err(|_| Error::conversion(INT64_RANGE)),
        NumericArg::UInt64(v) => isize::try_from(v).map_err(|_| Error::conversion(INT64_RANGE)),
        NumericArg::Float32(v) => float_to_int(f64::from(v)),
        NumericArg::Float64(v) => float_to_int(v),
        NumericArg::Other(_) => Err(Error::conversion(NOT_CONVERTIBLE)),
    }
}

fn float_to_int(v: f64) -> Result<isize> {
    if v.fract() != 0.0 || v.is_nan() {
        return Err(Error::conversion(FLOAT_FRACTION));
    }
    // isize::MAX rounds up to a power of two as a float
    let bound = (isize::MAX as f64) + 1.0;
    if v >= bound || v < -bound {
        return Err(Error::conversion(FLOAT_RANGE));
    }
    Ok(v as isize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integers_pass_through() {
        assert_eq!(convert_to_int(5isize).unwrap(), 5);
        assert_eq!(convert_to_int(-7i32).unwrap(), -7);
        assert_eq!(convert_to_int(i32::MAX).unwrap(), i32::MAX as isize);
        assert_eq!(convert_to_int(42i64).unwrap(), 42);
        assert_eq!(convert_to_int(10u32).unwrap(), 10);
    }

    #[test]
    fn test_integral_floats() {
        assert_eq!(convert_to_int(3.0f64).unwrap(), 3);
        assert_eq!(convert_to_int(-2.0f32).unwrap(), -2);
    }

    #[test]
    fn test_fractional_float_fails() {
        let err = convert_to_int(3.5f64).unwrap_err();
        assert_eq!(err, Error::Conversion(FLOAT_FRACTION.into()));
        assert_eq!(err.to_string(), "float64 value cannot be converted to int");
        assert!(convert_to_int(f64::NAN).is_err());
        assert!(convert_to_int(f64::INFINITY).is_err());
    }

    #[test]
    fn test_float_out_of_range() {
        let err = convert_to_int(1e30f64).unwrap_err();
        assert_eq!(err.to_string(), "float64 value out of range for int");
    }

    #[test]
    fn test_unsigned_out_of_range() {
        let err = convert_to_int(u64::MAX).unwrap_err();
        assert_eq!(err.to_string(), "int64 value out of range for int");
    }

    #[test]
    fn test_other_values_fail() {
        let err = convert_to_int("10").unwrap_err();
        assert_eq!(err.to_string(), "value is not convertible to int");
    }
}
