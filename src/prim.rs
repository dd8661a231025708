//! Checked 32-bit arithmetic in the script's integer domain.
//!
//! The script integer domain is symmetric: `-2147483647..=2147483647`.
//! `i32::MIN` is excluded so that every value can be negated without
//! overflow. All operations reject out-of-domain inputs and results.

use crate::error::{src_line, LibError, LibResult};

/// The least integer value in the script domain.
pub const INT_MIN: i32 = -2_147_483_647;

/// The greatest integer value in the script domain.
pub const INT_MAX: i32 = 2_147_483_647;

fn check(i: i32, line: i64) -> LibResult<i32> {
    if i < INT_MIN {
        return Err(LibError::Overflow {
            line: src_line(line),
        });
    }
    Ok(i)
}

fn narrow(wide: i64, line: i64) -> LibResult<i32> {
    if wide < i64::from(INT_MIN) || wide > i64::from(INT_MAX) {
        return Err(LibError::Overflow {
            line: src_line(line),
        });
    }
    Ok(wide as i32)
}

pub fn add(a: i32, b: i32, line: i64) -> LibResult<i32> {
    check(a, line)?;
    check(b, line)?;
    narrow(i64::from(a) + i64::from(b), line)
}

pub fn sub(a: i32, b: i32, line: i64) -> LibResult<i32> {
    check(a, line)?;
    check(b, line)?;
    narrow(i64::from(a) - i64::from(b), line)
}

pub fn mul(a: i32, b: i32, line: i64) -> LibResult<i32> {
    check(a, line)?;
    check(b, line)?;
    narrow(i64::from(a) * i64::from(b), line)
}

/// Floored division, so `-7 / 2 == -4` like the script language expects.
pub fn div(a: i32, b: i32, line: i64) -> LibResult<i32> {
    check(a, line)?;
    check(b, line)?;
    if b == 0 {
        return Err(range_err!(line, "Division by zero"));
    }
    narrow(i64::from(a).div_euclid(i64::from(b)), line)
}

pub fn neg(a: i32, line: i64) -> LibResult<i32> {
    check(a, line)?;
    Ok(-a)
}

#[test]
fn add_test() {
    assert_eq!(add(2, 3, -1).unwrap(), 5);
    assert_eq!(add(INT_MAX, -1, -1).unwrap(), INT_MAX - 1);
    assert!(add(INT_MAX, 1, -1).is_err());
    assert!(add(INT_MIN, -1, -1).is_err());
    assert!(add(i32::MIN, 0, -1).is_err());
}

#[test]
fn sub_test() {
    assert_eq!(sub(2, 3, -1).unwrap(), -1);
    assert!(sub(INT_MIN, 1, -1).is_err());
}

#[test]
fn mul_test() {
    assert_eq!(mul(-4, 8, -1).unwrap(), -32);
    assert!(mul(INT_MAX, 2, -1).is_err());
}

#[test]
fn div_test() {
    assert_eq!(div(7, 2, -1).unwrap(), 3);
    assert_eq!(div(-7, 2, -1).unwrap(), -4);
    assert!(div(1, 0, -1).is_err());
}

#[test]
fn neg_test() {
    assert_eq!(neg(INT_MAX, -1).unwrap(), INT_MIN);
    assert_eq!(neg(INT_MIN, -1).unwrap(), INT_MAX);
    assert!(neg(i32::MIN, -1).is_err());
}
