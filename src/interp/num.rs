//! Integer arithmetic with an `i64` fast path that promotes to `BigInt` on overflow.
//!
//! Python has one unbounded `int` type. Values that fit stay `Value::Int`;
//! anything wider is `Value::BigInt`, and results are demoted again whenever
//! they fit (see [`Value::from_bigint`]). Growth is bounded by
//! [`MAX_INT_BITS`](super::resource::MAX_INT_BITS): operations that can blow up
//! (`*`, `**`, `<<`) are checked against an estimate before computing.

use std::cmp::Ordering;

use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::{FromPrimitive, Pow, Signed, ToPrimitive, Zero};

use super::{
    ast::BinOp,
    error::{type_error, value_error, ExcType, Exception},
    resource::check_int_bits,
    value::Value,
};

type EResult<T> = Result<T, Exception>;

fn zero_division(message: &str) -> Exception {
    Exception::new(ExcType::ZeroDivisionError, message)
}

fn too_large_for_float() -> Exception {
    Exception::new(ExcType::OverflowError, "int too large to convert to float")
}

fn check_bits(bits: u64) -> EResult<()> {
    check_int_bits(bits).map_err(Exception::from)
}

/// `left <op> right` where both operands are ints or bools.
pub(crate) fn int_op(op: BinOp, left: &Value, right: &Value) -> EResult<Value> {
    if let (Some(a), Some(b)) = (left.as_int(), right.as_int()) {
        if let Some(value) = small_op(op, a, b)? {
            return Ok(value);
        }
    }
    match (left.as_bigint(), right.as_bigint()) {
        (Some(a), Some(b)) => big_op(op, &a, &b),
        _ => Err(type_error(format!(
            "unsupported operand type(s) for {}: '{}' and '{}'",
            op.symbol(),
            left.type_name(),
            right.type_name()
        ))),
    }
}

/// `i64` arithmetic; `Ok(None)` when the result needs a `BigInt`.
#[allow(clippy::cast_precision_loss)]
fn small_op(op: BinOp, a: i64, b: i64) -> EResult<Option<Value>> {
    let value = match op {
        BinOp::Add => a.checked_add(b),
        BinOp::Sub => a.checked_sub(b),
        BinOp::Mult => a.checked_mul(b),
        BinOp::Div => {
            if b == 0 {
                return Err(zero_division("division by zero"));
            }
            return Ok(Some(Value::Float(a as f64 / b as f64)));
        }
        BinOp::FloorDiv => {
            if b == 0 {
                return Err(zero_division("integer division or modulo by zero"));
            }
            // `i64::MIN // -1` is the one quotient that does not fit.
            if b == -1 { a.checked_neg() } else { Some(a.div_floor(&b)) }
        }
        BinOp::Mod => {
            if b == 0 {
                return Err(zero_division("integer modulo by zero"));
            }
            Some(if b == -1 { 0 } else { a.mod_floor(&b) })
        }
        BinOp::Pow => {
            if b < 0 {
                if a == 0 {
                    return Err(zero_division("0.0 cannot be raised to a negative power"));
                }
                return Ok(Some(Value::Float((a as f64).powf(b as f64))));
            }
            u32::try_from(b).ok().and_then(|e| a.checked_pow(e))
        }
        BinOp::BitAnd => Some(a & b),
        BinOp::BitOr => Some(a | b),
        BinOp::BitXor => Some(a ^ b),
        BinOp::LShift => {
            if b < 0 {
                return Err(value_error("negative shift count"));
            }
            if a == 0 {
                Some(0)
            } else {
                u32::try_from(b)
                    .ok()
                    .filter(|s| *s < 63)
                    .map(|s| (a << s, s))
                    .filter(|(shifted, s)| shifted >> s == a)
                    .map(|(shifted, _)| shifted)
            }
        }
        BinOp::RShift => {
            if b < 0 {
                return Err(value_error("negative shift count"));
            }
            Some(match u32::try_from(b).ok().filter(|s| *s < 64) {
                Some(shift) => a >> shift,
                None if a < 0 => -1,
                None => 0,
            })
        }
    };
    Ok(value.map(Value::Int))
}

fn big_op(op: BinOp, a: &BigInt, b: &BigInt) -> EResult<Value> {
    let result = match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mult => {
            check_bits(a.bits().saturating_add(b.bits()))?;
            a * b
        }
        BinOp::Div => {
            if b.is_zero() {
                return Err(zero_division("division by zero"));
            }
            return true_divide(a, b).map(Value::Float);
        }
        BinOp::FloorDiv => {
            if b.is_zero() {
                return Err(zero_division("integer division or modulo by zero"));
            }
            a.div_floor(b)
        }
        BinOp::Mod => {
            if b.is_zero() {
                return Err(zero_division("integer modulo by zero"));
            }
            a.mod_floor(b)
        }
        BinOp::Pow => return big_pow(a, b),
        BinOp::BitAnd => a & b,
        BinOp::BitOr => a | b,
        BinOp::BitXor => a ^ b,
        BinOp::LShift => {
            if b.is_negative() {
                return Err(value_error("negative shift count"));
            }
            if a.is_zero() {
                return Ok(Value::Int(0));
            }
            let shift = b.to_u64().unwrap_or(u64::MAX);
            check_bits(a.bits().saturating_add(shift))?;
            a << shift
        }
        BinOp::RShift => {
            if b.is_negative() {
                return Err(value_error("negative shift count"));
            }
            match b.to_u64().filter(|s| *s < a.bits()) {
                Some(shift) => a >> shift,
                None if a.is_negative() => BigInt::from(-1),
                None => BigInt::zero(),
            }
        }
    };
    check_bits(result.bits())?;
    Ok(Value::from_bigint(result))
}

/// `a / b` for ints that may not fit a float on their own (`10**400 / 10**399`).
fn true_divide(a: &BigInt, b: &BigInt) -> EResult<f64> {
    if let (Ok(x), Ok(y)) = (big_to_f64(a), big_to_f64(b)) {
        return Ok(x / y);
    }
    // Scale so the integer quotient keeps about 64 significant bits.
    let shift = i64::try_from(a.bits()).unwrap_or(i64::MAX) - i64::try_from(b.bits()).unwrap_or(i64::MAX) - 64;
    let quotient = if shift > 0 {
        a / (b << shift.unsigned_abs())
    } else {
        (a << shift.unsigned_abs()) / b
    };
    let scale = i32::try_from(shift).unwrap_or(if shift > 0 { i32::MAX } else { i32::MIN });
    let result = quotient.to_f64().unwrap_or(f64::NAN) * 2f64.powi(scale);
    if result.is_finite() {
        Ok(result)
    } else {
        Err(Exception::new(ExcType::OverflowError, "integer division result too large for a float"))
    }
}

fn big_pow(base: &BigInt, exp: &BigInt) -> EResult<Value> {
    if exp.is_negative() {
        if base.is_zero() {
            return Err(zero_division("0.0 cannot be raised to a negative power"));
        }
        return Ok(Value::Float(big_to_f64(base)?.powf(big_to_f64(exp)?)));
    }
    // 0, 1 and -1 stay small whatever the exponent.
    if base.is_zero() || base.magnitude().bits() == 1 {
        let negative = base.is_negative() && exp.is_odd();
        let magnitude = i64::from(!base.is_zero() || exp.is_zero());
        return Ok(Value::Int(if negative { -magnitude } else { magnitude }));
    }
    let exp = exp.to_u64().unwrap_or(u64::MAX);
    // |base| >= 2**(bits - 1), so the result has at least (bits - 1) * exp bits.
    check_bits((base.bits() - 1).saturating_mul(exp))?;
    let exp = u32::try_from(exp).map_err(|_| Exception::new(ExcType::OverflowError, "exponent too large"))?;
    let result: BigInt = Pow::pow(base, exp);
    check_bits(result.bits())?;
    Ok(Value::from_bigint(result))
}

/// Unary minus on an int or bool.
pub(crate) fn neg(value: &Value) -> Option<Value> {
    match value.as_int() {
        Some(i) => Some(i.checked_neg().map_or_else(|| Value::from_bigint(-BigInt::from(i)), Value::Int)),
        None => value.as_bigint().map(|b| Value::from_bigint(-b)),
    }
}

/// `~x`, which is `-(x + 1)`.
pub(crate) fn invert(value: &Value) -> Option<Value> {
    match value.as_int() {
        Some(i) => Some(Value::Int(!i)),
        None => value.as_bigint().map(|b| Value::from_bigint(-(b + 1i32))),
    }
}

pub(crate) fn abs(value: &Value) -> Option<Value> {
    match value.as_int() {
        Some(i) => Some(i.checked_abs().map_or_else(|| Value::from_bigint(BigInt::from(i).abs()), Value::Int)),
        None => value.as_bigint().map(|b| Value::from_bigint(b.abs())),
    }
}

fn big_to_f64(b: &BigInt) -> EResult<f64> {
    b.to_f64().filter(|f| f.is_finite()).ok_or_else(too_large_for_float)
}

/// Float view of a real number, raising `OverflowError` for ints beyond `f64` range.
pub(crate) fn float_of(value: &Value) -> EResult<f64> {
    match value {
        Value::Float(f) => Ok(*f),
        Value::BigInt(b) => big_to_f64(b),
        other => other
            .as_float()
            .ok_or_else(|| type_error(format!("must be real number, not {}", other.type_name()))),
    }
}

/// `int(f)`: truncates toward zero.
pub(crate) fn from_float(f: f64) -> EResult<Value> {
    if f.is_nan() {
        return Err(value_error("cannot convert float NaN to integer"));
    }
    if f.is_infinite() {
        return Err(Exception::new(ExcType::OverflowError, "cannot convert float infinity to integer"));
    }
    BigInt::from_f64(f.trunc())
        .map(Value::from_bigint)
        .ok_or_else(|| value_error("cannot convert float to integer"))
}

/// Ordering between two real numbers; `None` when either side is NaN.
pub(crate) fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Float(x), Value::Float(y)) => x.partial_cmp(y),
        (Value::Float(x), int) => int_float_cmp(int, *x).map(Ordering::reverse),
        (int, Value::Float(y)) => int_float_cmp(int, *y),
        _ => match (a.as_int(), b.as_int()) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => Some(a.as_bigint()?.cmp(&b.as_bigint()?)),
        },
    }
}

/// Exact comparison of an int against a float, as CPython does.
#[allow(clippy::cast_precision_loss)]
fn int_float_cmp(int: &Value, f: f64) -> Option<Ordering> {
    if let Some(i) = int.as_int() {
        return (i as f64).partial_cmp(&f);
    }
    if f.is_nan() {
        return None;
    }
    if f.is_infinite() {
        return Some(if f > 0.0 { Ordering::Less } else { Ordering::Greater });
    }
    let floor = f.floor();
    let big = int.as_bigint()?;
    match big.cmp(&BigInt::from_f64(floor)?) {
        Ordering::Equal if f > floor => Some(Ordering::Less),
        ordering => Some(ordering),
    }
}

/// `round(x, ndigits)` for a negative `ndigits`: rounds to a multiple of `10**-ndigits`, ties to even.
pub(crate) fn round_int(value: &BigInt, ndigits: i64) -> Value {
    let places = ndigits.unsigned_abs();
    // 10**places > |value| once places exceeds the bit count, so the result is 0.
    if places > value.bits() {
        return Value::Int(0);
    }
    let scale: BigInt = Pow::pow(BigInt::from(10), places);
    let (quotient, remainder) = value.div_mod_floor(&scale);
    let twice: BigInt = remainder * 2;
    let round_up = match twice.cmp(&scale) {
        Ordering::Greater => true,
        Ordering::Equal => quotient.is_odd(),
        Ordering::Less => false,
    };
    let quotient = if round_up { quotient + 1 } else { quotient };
    Value::from_bigint(quotient * scale)
}

/// `math.factorial(n)`, refusing results wider than the integer limit up front.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub(crate) fn factorial(n: u64) -> EResult<Value> {
    if n > 20 {
        // Stirling: log2(n!) ~ (n ln n - n + ln(2 pi n) / 2) / ln 2
        let x = n as f64;
        let bits = (x * x.ln() - x + (std::f64::consts::TAU * x).ln() / 2.0) / std::f64::consts::LN_2;
        check_bits(bits.ceil() as u64)?;
    }
    let mut acc = BigInt::from(1);
    for k in 2..=n {
        acc *= k;
    }
    Ok(Value::from_bigint(acc))
}

/// `pow(base, exp, modulus)`.
pub(crate) fn mod_pow(base: &BigInt, exp: &BigInt, modulus: &BigInt) -> EResult<Value> {
    if modulus.is_zero() {
        return Err(value_error("pow() 3rd argument cannot be 0"));
    }
    if exp.is_negative() {
        return Err(value_error(
            "pow() 2nd argument cannot be negative when 3rd argument specified",
        ));
    }
    Ok(Value::from_bigint(base.modpow(exp, modulus)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(i: i64) -> Value {
        Value::Int(i)
    }

    #[test]
    fn overflow_promotes_to_big_ints() {
        let sum = int_op(BinOp::Add, &int(i64::MAX), &int(1)).expect("add");
        assert!(matches!(sum, Value::BigInt(_)));
        assert_eq!(sum.py_repr(), "9223372036854775808");
        let back = int_op(BinOp::Sub, &sum, &int(1)).expect("sub");
        assert!(matches!(back, Value::Int(i64::MAX)));
        let power = int_op(BinOp::Pow, &int(2), &int(100)).expect("pow");
        assert_eq!(power.py_repr(), "1267650600228229401496703205376");
        let quotient = int_op(BinOp::FloorDiv, &int(i64::MIN), &int(-1)).expect("floordiv");
        assert_eq!(quotient.py_repr(), "9223372036854775808");
        assert!(matches!(int_op(BinOp::Mod, &int(i64::MIN), &int(-1)), Ok(Value::Int(0))));
    }

    #[test]
    fn floor_semantics_hold_for_big_ints() {
        let big = int_op(BinOp::Pow, &int(10), &int(30)).expect("pow");
        let neg = neg(&big).expect("neg");
        assert_eq!(int_op(BinOp::FloorDiv, &neg, &int(7)).expect("div").py_repr(), "-142857142857142857142857142858");
        assert_eq!(int_op(BinOp::Mod, &neg, &int(7)).expect("mod").py_repr(), "6");
        assert_eq!(int_op(BinOp::RShift, &neg, &int(200)).expect("shift").py_repr(), "-1");
        assert_eq!(invert(&big).expect("invert").py_repr(), "-1000000000000000000000000000001");
    }

    #[test]
    fn true_division_of_huge_ints_is_scaled() {
        let big = int_op(BinOp::Pow, &int(10), &int(400)).expect("pow");
        let smaller = int_op(BinOp::Pow, &int(10), &int(399)).expect("pow");
        assert!(matches!(int_op(BinOp::Div, &big, &smaller), Ok(Value::Float(f)) if (f - 10.0).abs() < 1e-12));
        let err = int_op(BinOp::Div, &big, &int(3)).unwrap_err();
        assert_eq!(err.exc_type, ExcType::OverflowError);
    }

    #[test]
    fn huge_results_are_refused_before_computing() {
        let err = int_op(BinOp::Pow, &int(10), &int(10_000_000)).unwrap_err();
        assert_eq!(err.exc_type, ExcType::MemoryError);
        assert!(err.fatal);
        let err = int_op(BinOp::LShift, &int(1), &int(1 << 40)).unwrap_err();
        assert_eq!(err.exc_type, ExcType::MemoryError);
        assert!(matches!(int_op(BinOp::Pow, &int(-1), &int(1 << 40)), Ok(Value::Int(1))));
        assert!(matches!(factorial(1_000_000), Err(e) if e.exc_type == ExcType::MemoryError));
    }

    #[test]
    fn big_ints_compare_exactly_with_floats() {
        let big = int_op(BinOp::Pow, &int(2), &int(64)).expect("pow");
        assert_eq!(compare(&big, &Value::Float(1.8446744073709552e19)), Some(Ordering::Equal));
        assert_eq!(compare(&big, &Value::Float(f64::INFINITY)), Some(Ordering::Less));
        assert_eq!(compare(&Value::Float(1e300), &big), Some(Ordering::Greater));
        assert_eq!(compare(&big, &Value::Float(f64::NAN)), None);
        let huge = int_op(BinOp::Pow, &int(10), &int(400)).expect("pow");
        assert_eq!(float_of(&huge).unwrap_err().exc_type, ExcType::OverflowError);
    }

    #[test]
    fn factorial_and_rounding() {
        assert_eq!(factorial(25).expect("factorial").py_repr(), "15511210043330985984000000");
        assert!(matches!(factorial(0), Ok(Value::Int(1))));
        assert_eq!(round_int(&BigInt::from(1250), -2).py_repr(), "1200");
        assert_eq!(round_int(&BigInt::from(1350), -2).py_repr(), "1400");
        assert_eq!(round_int(&BigInt::from(-1251), -2).py_repr(), "-1300");
        assert!(matches!(round_int(&BigInt::from(7), -400), Value::Int(0)));
        assert_eq!(from_float(1e20).expect("int").py_repr(), "100000000000000000000");
    }
}
