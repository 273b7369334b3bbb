//! Builtin functions, the `math` module and methods of the builtin types.

use std::{cmp::Ordering, str::FromStr};

use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::Signed;

use super::{
    ast::BinOp,
    error::{type_error, value_error, ExcType, Exception},
    eval::Ctx,
    format::str_format,
    num,
    value::{normalize_index, range_len, Dict, Set, Value},
};

/// CPython's default `sys.get_int_max_str_digits()`.
const MAX_INT_STR_DIGITS: usize = 4300;

type EResult<T> = Result<T, Exception>;
type Kwargs = Vec<(String, Value)>;

/// Builtin functions and type constructors available without an import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::EnumString, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Builtin {
    Print,
    Input,
    Len,
    Range,
    Str,
    Int,
    Float,
    Bool,
    List,
    Tuple,
    Dict,
    Set,
    Abs,
    Min,
    Max,
    Sum,
    Sorted,
    Reversed,
    Enumerate,
    Zip,
    Map,
    Filter,
    Round,
    Type,
    Isinstance,
    Repr,
    Any,
    All,
    Chr,
    Ord,
    Pow,
    Divmod,
    Format,
}

impl Builtin {
    pub fn name(self) -> &'static str {
        self.into()
    }

    /// The type this builtin constructs, if it is a class.
    pub fn type_name(self) -> Option<&'static str> {
        match self {
            Self::Str | Self::Int | Self::Float | Self::Bool | Self::List | Self::Tuple | Self::Dict | Self::Set | Self::Range => {
                Some(self.name())
            }
            _ => None,
        }
    }
}

/// Functions exposed by `import math`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::EnumString, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum MathFn {
    Sqrt,
    Isqrt,
    Floor,
    Ceil,
    Trunc,
    Fabs,
    Pow,
    Exp,
    Log,
    #[strum(serialize = "log10")]
    Log10,
    #[strum(serialize = "log2")]
    Log2,
    Sin,
    Cos,
    Tan,
    Factorial,
    Gcd,
}

/// Resolves a name that is not bound in any scope.
pub(crate) fn lookup_builtin(name: &str) -> Option<Value> {
    if let Ok(builtin) = Builtin::from_str(name) {
        return Some(Value::Builtin(builtin));
    }
    match ExcType::from_str(name) {
        Ok(ExcType::InternalError) | Err(_) => None,
        Ok(exc_type) => Some(Value::ExcClass(exc_type)),
    }
}

/// `math.<attr>`.
pub(crate) fn math_attr(attr: &str) -> EResult<Value> {
    let constant = match attr {
        "pi" => Some(std::f64::consts::PI),
        "e" => Some(std::f64::consts::E),
        "tau" => Some(std::f64::consts::TAU),
        "inf" => Some(f64::INFINITY),
        "nan" => Some(f64::NAN),
        _ => None,
    };
    if let Some(c) = constant {
        return Ok(Value::Float(c));
    }
    MathFn::from_str(attr)
        .map(Value::MathFn)
        .map_err(|_| Exception::new(ExcType::AttributeError, format!("module 'math' has no attribute '{attr}'")))
}

fn arity(name: &str, args: &[Value], min: usize, max: usize) -> EResult<()> {
    let got = args.len();
    if (min..=max).contains(&got) {
        return Ok(());
    }
    let plural = |n: usize| if n == 1 { "" } else { "s" };
    Err(type_error(if min == max {
        format!("{name}() takes exactly {min} argument{} ({got} given)", plural(min))
    } else if got < min {
        format!("{name}() expected at least {min} argument{}, got {got}", plural(min))
    } else {
        format!("{name}() expected at most {max} argument{}, got {got}", plural(max))
    }))
}

fn take_kwarg(kwargs: &mut Kwargs, key: &str) -> Option<Value> {
    let pos = kwargs.iter().position(|(k, _)| k == key)?;
    Some(kwargs.remove(pos).1)
}

fn reject_kwargs(name: &str, kwargs: &Kwargs) -> EResult<()> {
    match kwargs.first() {
        Some((key, _)) => Err(type_error(format!("'{key}' is an invalid keyword argument for {name}()"))),
        None => Ok(()),
    }
}

fn int_arg(name: &str, value: &Value) -> EResult<i64> {
    if let Value::BigInt(_) = value {
        return Err(too_large_for_index());
    }
    value.as_int().ok_or_else(|| {
        type_error(format!(
            "'{}' object cannot be interpreted as an integer (in {name}())",
            value.type_name()
        ))
    })
}

fn too_large_for_index() -> Exception {
    Exception::new(ExcType::OverflowError, "Python int too large to convert to C ssize_t")
}

/// Ints and bools as a plain int value.
fn int_value(value: &Value) -> Option<Value> {
    match value {
        Value::Bool(b) => Some(Value::Int(i64::from(*b))),
        Value::Int(_) | Value::BigInt(_) => Some(value.clone()),
        _ => None,
    }
}

fn str_arg<'v>(name: &str, value: &'v Value) -> EResult<&'v str> {
    match value {
        Value::Str(s) => Ok(s),
        other => Err(type_error(format!(
            "{name}() argument must be str, not {}",
            other.type_name()
        ))),
    }
}

fn not_none(value: Option<Value>) -> Option<Value> {
    value.filter(|v| !matches!(v, Value::None))
}

pub(crate) fn call_builtin(ctx: &mut Ctx<'_>, builtin: Builtin, args: Vec<Value>, mut kwargs: Kwargs) -> EResult<Value> {
    let name = builtin.name();
    match builtin {
        Builtin::Print => {
            let sep = not_none(take_kwarg(&mut kwargs, "sep")).map_or_else(|| " ".to_owned(), |v| v.py_str());
            let end = not_none(take_kwarg(&mut kwargs, "end")).map_or_else(|| "\n".to_owned(), |v| v.py_str());
            take_kwarg(&mut kwargs, "flush");
            reject_kwargs(name, &kwargs)?;
            let mut text = args.iter().map(Value::py_str).collect::<Vec<_>>().join(&sep);
            text.push_str(&end);
            ctx.write_stdout(&text)?;
            Ok(Value::None)
        }
        Builtin::Input => {
            reject_kwargs(name, &kwargs)?;
            arity(name, &args, 0, 1)?;
            if let Some(prompt) = args.first() {
                ctx.write_stdout(&prompt.py_str())?;
            }
            Err(Exception::new(ExcType::EOFError, "EOF when reading a line"))
        }
        Builtin::Len => {
            reject_kwargs(name, &kwargs)?;
            arity(name, &args, 1, 1)?;
            len_of(&args[0]).map(Value::Int)
        }
        Builtin::Range => {
            reject_kwargs(name, &kwargs)?;
            arity(name, &args, 1, 3)?;
            let ints = args.iter().map(|a| int_arg(name, a)).collect::<EResult<Vec<_>>>()?;
            let (start, stop, step) = match ints.as_slice() {
                [stop] => (0, *stop, 1),
                [start, stop] => (*start, *stop, 1),
                [start, stop, step] => (*start, *stop, *step),
                _ => unreachable!("arity checked"),
            };
            if step == 0 {
                return Err(value_error("range() arg 3 must not be zero"));
            }
            Ok(Value::Range { start, stop, step })
        }
        Builtin::Str => {
            reject_kwargs(name, &kwargs)?;
            arity(name, &args, 0, 1)?;
            Ok(Value::str(args.first().map(Value::py_str).unwrap_or_default()))
        }
        Builtin::Repr => {
            reject_kwargs(name, &kwargs)?;
            arity(name, &args, 1, 1)?;
            Ok(Value::str(args[0].py_repr()))
        }
        Builtin::Int => {
            let base = take_kwarg(&mut kwargs, "base");
            reject_kwargs(name, &kwargs)?;
            arity(name, &args, 0, 2)?;
            let base = match args.get(1).or(base.as_ref()) {
                Some(b) => Some(int_arg(name, b)?),
                None => None,
            };
            match args.first() {
                None => Ok(Value::Int(0)),
                Some(v) => to_int(v, base),
            }
        }
        Builtin::Float => {
            reject_kwargs(name, &kwargs)?;
            arity(name, &args, 0, 1)?;
            match args.first() {
                None => Ok(Value::Float(0.0)),
                Some(Value::Str(s)) => s
                    .trim()
                    .replace('_', "")
                    .parse::<f64>()
                    .map(Value::Float)
                    .map_err(|_| value_error(format!("could not convert string to float: {}", args[0].py_repr()))),
                Some(v) if v.is_number() => num::float_of(v).map(Value::Float),
                Some(v) => Err(type_error(format!(
                    "float() argument must be a string or a real number, not '{}'",
                    v.type_name()
                ))),
            }
        }
        Builtin::Bool => {
            reject_kwargs(name, &kwargs)?;
            arity(name, &args, 0, 1)?;
            Ok(Value::Bool(args.first().is_some_and(Value::truthy)))
        }
        Builtin::List | Builtin::Tuple | Builtin::Set => {
            reject_kwargs(name, &kwargs)?;
            arity(name, &args, 0, 1)?;
            let items = match args.first() {
                Some(v) => ctx.collect(v)?,
                None => Vec::new(),
            };
            match builtin {
                Builtin::List => Ok(Value::list(items)),
                Builtin::Tuple => Ok(Value::tuple(items)),
                _ => Value::set(items),
            }
        }
        Builtin::Dict => {
            arity(name, &args, 0, 1)?;
            let mut dict = Dict::default();
            if let Some(source) = args.first() {
                dict_update(ctx, &mut dict, source)?;
            }
            for (k, v) in kwargs {
                dict.insert(Value::str(k), v)?;
            }
            Ok(Value::dict(dict))
        }
        Builtin::Abs => {
            reject_kwargs(name, &kwargs)?;
            arity(name, &args, 1, 1)?;
            match &args[0] {
                Value::Float(f) => Ok(Value::Float(f.abs())),
                v => num::abs(v)
                    .ok_or_else(|| type_error(format!("bad operand type for abs(): '{}'", v.type_name()))),
            }
        }
        Builtin::Min => min_max(ctx, "min", args, kwargs, Ordering::Less),
        Builtin::Max => min_max(ctx, "max", args, kwargs, Ordering::Greater),
        Builtin::Sum => {
            let start = take_kwarg(&mut kwargs, "start");
            reject_kwargs(name, &kwargs)?;
            arity(name, &args, 1, 2)?;
            let mut acc = args.get(1).cloned().or(start).unwrap_or(Value::Int(0));
            if matches!(acc, Value::Str(_)) {
                return Err(type_error("sum() can't sum strings [use ''.join(seq) instead]"));
            }
            for item in ctx.collect(&args[0])? {
                acc = ctx.binary(BinOp::Add, acc, item)?;
            }
            Ok(acc)
        }
        Builtin::Sorted => {
            let key = not_none(take_kwarg(&mut kwargs, "key"));
            let reverse = take_kwarg(&mut kwargs, "reverse").is_some_and(|v| v.truthy());
            reject_kwargs(name, &kwargs)?;
            arity(name, &args, 1, 1)?;
            let items = ctx.collect(&args[0])?;
            sort_values(ctx, items, key, reverse).map(Value::list)
        }
        Builtin::Reversed => {
            reject_kwargs(name, &kwargs)?;
            arity(name, &args, 1, 1)?;
            if !matches!(
                args[0],
                Value::List(_) | Value::Tuple(_) | Value::Str(_) | Value::Range { .. } | Value::Dict(_)
            ) {
                return Err(type_error(format!("'{}' object is not reversible", args[0].type_name())));
            }
            let mut items = ctx.collect(&args[0])?;
            items.reverse();
            Ok(Value::list(items))
        }
        Builtin::Enumerate => {
            let start = take_kwarg(&mut kwargs, "start");
            reject_kwargs(name, &kwargs)?;
            arity(name, &args, 1, 2)?;
            let start = match args.get(1).or(start.as_ref()) {
                Some(v) => int_arg(name, v)?,
                None => 0,
            };
            let items = ctx.collect(&args[0])?;
            Ok(Value::list(
                items
                    .into_iter()
                    .zip(start..)
                    .map(|(item, i)| Value::tuple(vec![Value::Int(i), item]))
                    .collect(),
            ))
        }
        Builtin::Zip => {
            reject_kwargs(name, &kwargs)?;
            let columns = args.iter().map(|a| ctx.collect(a)).collect::<EResult<Vec<_>>>()?;
            Ok(Value::list(zip_columns(columns).into_iter().map(Value::tuple).collect()))
        }
        Builtin::Map => {
            reject_kwargs(name, &kwargs)?;
            arity(name, &args, 2, usize::MAX)?;
            let func = args[0].clone();
            let columns = args[1..].iter().map(|a| ctx.collect(a)).collect::<EResult<Vec<_>>>()?;
            let mut out = Vec::new();
            for row in zip_columns(columns) {
                out.push(ctx.call(func.clone(), row, Vec::new())?);
            }
            Ok(Value::list(out))
        }
        Builtin::Filter => {
            reject_kwargs(name, &kwargs)?;
            arity(name, &args, 2, 2)?;
            let mut out = Vec::new();
            for item in ctx.collect(&args[1])? {
                let keep = match &args[0] {
                    Value::None => item.truthy(),
                    func => ctx.call(func.clone(), vec![item.clone()], Vec::new())?.truthy(),
                };
                if keep {
                    out.push(item);
                }
            }
            Ok(Value::list(out))
        }
        Builtin::Round => {
            let ndigits = take_kwarg(&mut kwargs, "ndigits");
            reject_kwargs(name, &kwargs)?;
            arity(name, &args, 1, 2)?;
            let ndigits = match not_none(args.get(1).cloned().or(ndigits)) {
                Some(v) => Some(int_arg(name, &v)?),
                None => None,
            };
            round(&args[0], ndigits)
        }
        Builtin::Type => {
            reject_kwargs(name, &kwargs)?;
            arity(name, &args, 1, 1)?;
            Ok(type_of(&args[0]))
        }
        Builtin::Isinstance => {
            reject_kwargs(name, &kwargs)?;
            arity(name, &args, 2, 2)?;
            is_instance(&args[0], &args[1]).map(Value::Bool)
        }
        Builtin::Any | Builtin::All => {
            reject_kwargs(name, &kwargs)?;
            arity(name, &args, 1, 1)?;
            let items = ctx.collect(&args[0])?;
            Ok(Value::Bool(if builtin == Builtin::Any {
                items.iter().any(Value::truthy)
            } else {
                items.iter().all(Value::truthy)
            }))
        }
        Builtin::Chr => {
            reject_kwargs(name, &kwargs)?;
            arity(name, &args, 1, 1)?;
            let code = int_arg(name, &args[0])?;
            u32::try_from(code)
                .ok()
                .and_then(char::from_u32)
                .map(|c| Value::str(c.to_string()))
                .ok_or_else(|| value_error("chr() arg not in range(0x110000)"))
        }
        Builtin::Ord => {
            reject_kwargs(name, &kwargs)?;
            arity(name, &args, 1, 1)?;
            let s = str_arg(name, &args[0])?;
            let mut chars = s.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(Value::Int(i64::from(u32::from(c)))),
                _ => Err(type_error(format!(
                    "ord() expected a character, but string of length {} found",
                    s.chars().count()
                ))),
            }
        }
        Builtin::Pow => {
            reject_kwargs(name, &kwargs)?;
            arity(name, &args, 2, 3)?;
            match args.get(2) {
                None => ctx.binary(BinOp::Pow, args[0].clone(), args[1].clone()),
                Some(m) => match (args[0].as_bigint(), args[1].as_bigint(), m.as_bigint()) {
                    (Some(base), Some(exp), Some(modulus)) => num::mod_pow(&base, &exp, &modulus),
                    _ => Err(type_error("pow() 3rd argument not allowed unless all arguments are integers")),
                },
            }
        }
        Builtin::Divmod => {
            reject_kwargs(name, &kwargs)?;
            arity(name, &args, 2, 2)?;
            let quotient = ctx.binary(BinOp::FloorDiv, args[0].clone(), args[1].clone())?;
            let remainder = ctx.binary(BinOp::Mod, args[0].clone(), args[1].clone())?;
            Ok(Value::tuple(vec![quotient, remainder]))
        }
        Builtin::Format => {
            reject_kwargs(name, &kwargs)?;
            arity(name, &args, 1, 2)?;
            let spec = match args.get(1) {
                Some(v) => str_arg(name, v)?.to_owned(),
                None => String::new(),
            };
            super::format::format_value(&args[0], &spec).map(Value::str)
        }
    }
}

pub(crate) fn len_of(value: &Value) -> EResult<i64> {
    let len = match value {
        Value::Str(s) => s.chars().count(),
        Value::List(items) => items.borrow().len(),
        Value::Set(items) => items.borrow().len(),
        Value::Tuple(items) => items.len(),
        Value::Dict(d) => d.borrow().len(),
        Value::Range { start, stop, step } => {
            return i64::try_from(range_len(*start, *stop, *step)).map_err(|_| too_large_for_index());
        }
        other => {
            return Err(type_error(format!("object of type '{}' has no len()", other.type_name())));
        }
    };
    Ok(i64::try_from(len).unwrap_or(i64::MAX))
}

fn to_int(value: &Value, base: Option<i64>) -> EResult<Value> {
    match value {
        Value::Str(s) => {
            let base = base.unwrap_or(10);
            let radix = u32::try_from(base)
                .ok()
                .filter(|b| (2..=36).contains(b))
                .ok_or_else(|| value_error("int() base must be >= 2 and <= 36, or 0"))?;
            let cleaned = s.trim().replace('_', "");
            let (negative, digits) = match cleaned.strip_prefix('-') {
                Some(rest) => (true, rest),
                None => (false, cleaned.strip_prefix('+').unwrap_or(&cleaned)),
            };
            let digits = match radix {
                16 => digits.trim_start_matches("0x").trim_start_matches("0X"),
                8 => digits.trim_start_matches("0o").trim_start_matches("0O"),
                2 => digits.trim_start_matches("0b").trim_start_matches("0B"),
                _ => digits,
            };
            let invalid = || value_error(format!("invalid literal for int() with base {base}: {}", value.py_repr()));
            if digits.is_empty() || digits.starts_with(['+', '-']) {
                return Err(invalid());
            }
            if !radix.is_power_of_two() && digits.len() > MAX_INT_STR_DIGITS {
                return Err(value_error(format!(
                    "Exceeds the limit ({MAX_INT_STR_DIGITS} digits) for integer string conversion: \
                     value has {} digits; use sys.set_int_max_str_digits() to increase the limit",
                    digits.len()
                )));
            }
            let magnitude = BigInt::parse_bytes(digits.as_bytes(), radix).ok_or_else(invalid)?;
            Ok(Value::from_bigint(if negative { -magnitude } else { magnitude }))
        }
        _ if base.is_some() => Err(type_error("int() can't convert non-string with explicit base")),
        Value::Float(f) => num::from_float(*f),
        other => int_value(other).ok_or_else(|| {
            type_error(format!(
                "int() argument must be a string, a bytes-like object or a real number, not '{}'",
                other.type_name()
            ))
        }),
    }
}

fn round(value: &Value, ndigits: Option<i64>) -> EResult<Value> {
    match (value, ndigits) {
        (Value::Float(f), None) => num::from_float(f.round_ties_even()),
        (Value::Float(f), Some(n)) => {
            let scale = 10f64.powi(i32::try_from(n.clamp(-300, 300)).unwrap_or(0));
            Ok(Value::Float((f * scale).round_ties_even() / scale))
        }
        (v, Some(n)) if n < 0 => match v.as_bigint() {
            Some(big) => Ok(num::round_int(&big, n)),
            None => Err(type_error(format!("type {} doesn't define __round__ method", v.type_name()))),
        },
        (v, _) => int_value(v).ok_or_else(|| {
            type_error(format!("type {} doesn't define __round__ method", v.type_name()))
        }),
    }
}

fn zip_columns(columns: Vec<Vec<Value>>) -> Vec<Vec<Value>> {
    let rows = columns.iter().map(Vec::len).min().unwrap_or(0);
    (0..rows)
        .map(|r| columns.iter().map(|col| col[r].clone()).collect())
        .collect()
}

fn min_max(ctx: &mut Ctx<'_>, name: &str, args: Vec<Value>, mut kwargs: Kwargs, want: Ordering) -> EResult<Value> {
    let key = not_none(take_kwarg(&mut kwargs, "key"));
    let default = take_kwarg(&mut kwargs, "default");
    reject_kwargs(name, &kwargs)?;
    let items = match args.len() {
        0 => return Err(type_error(format!("{name} expected at least 1 argument, got 0"))),
        1 => ctx.collect(&args[0])?,
        _ => args,
    };
    let op = if want == Ordering::Less { "<" } else { ">" };
    let mut iter = items.into_iter();
    let Some(mut best) = iter.next() else {
        return default.ok_or_else(|| value_error(format!("{name}() arg is an empty sequence")));
    };
    let mut best_key = apply_key(ctx, key.as_ref(), &best)?;
    for item in iter {
        let item_key = apply_key(ctx, key.as_ref(), &item)?;
        if item_key.py_cmp(&best_key, op)? == want {
            best = item;
            best_key = item_key;
        }
    }
    Ok(best)
}

fn apply_key(ctx: &mut Ctx<'_>, key: Option<&Value>, item: &Value) -> EResult<Value> {
    match key {
        Some(func) => ctx.call(func.clone(), vec![item.clone()], Vec::new()),
        None => Ok(item.clone()),
    }
}

/// Stable sort by Python ordering, optionally through a key function.
fn sort_values(ctx: &mut Ctx<'_>, items: Vec<Value>, key: Option<Value>, reverse: bool) -> EResult<Vec<Value>> {
    let mut decorated = Vec::with_capacity(items.len());
    for item in items {
        let k = apply_key(ctx, key.as_ref(), &item)?;
        decorated.push((k, item));
    }
    let mut failure = None;
    decorated.sort_by(|a, b| {
        let (x, y) = if reverse { (&b.0, &a.0) } else { (&a.0, &b.0) };
        x.py_cmp(y, "<").unwrap_or_else(|e| {
            failure.get_or_insert(e);
            Ordering::Equal
        })
    });
    match failure {
        Some(e) => Err(e),
        None => Ok(decorated.into_iter().map(|(_, v)| v).collect()),
    }
}

fn dict_update(ctx: &mut Ctx<'_>, dict: &mut Dict, source: &Value) -> EResult<()> {
    if let Value::Dict(other) = source {
        let pairs: Vec<(Value, Value)> = {
            let other = other.borrow();
            other.keys().into_iter().zip(other.values()).collect()
        };
        for (k, v) in pairs {
            dict.insert(k, v)?;
        }
        return Ok(());
    }
    for (i, pair) in ctx.collect(source)?.into_iter().enumerate() {
        let pair = ctx.collect(&pair)?;
        if pair.len() != 2 {
            return Err(value_error(format!(
                "dictionary update sequence element #{i} has length {}; 2 is required",
                pair.len()
            )));
        }
        let mut pair = pair.into_iter();
        if let (Some(k), Some(v)) = (pair.next(), pair.next()) {
            dict.insert(k, v)?;
        }
    }
    Ok(())
}

pub(crate) fn type_of(value: &Value) -> Value {
    let builtin = match value {
        Value::Bool(_) => Builtin::Bool,
        Value::Int(_) | Value::BigInt(_) => Builtin::Int,
        Value::Float(_) => Builtin::Float,
        Value::Str(_) => Builtin::Str,
        Value::List(_) => Builtin::List,
        Value::Tuple(_) => Builtin::Tuple,
        Value::Dict(_) => Builtin::Dict,
        Value::Set(_) => Builtin::Set,
        Value::Range { .. } => Builtin::Range,
        Value::Exception(exc) => return Value::ExcClass(exc.exc_type),
        other => return Value::Type(other.type_name()),
    };
    Value::Builtin(builtin)
}

fn is_instance(value: &Value, class: &Value) -> EResult<bool> {
    match class {
        Value::Tuple(classes) => {
            for c in classes.iter() {
                if is_instance(value, c)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Value::Builtin(b) if b.type_name().is_some() => {
            let name = b.type_name().unwrap_or_default();
            Ok(value.type_name() == name || (name == "int" && matches!(value, Value::Bool(_))))
        }
        Value::ExcClass(t) => Ok(matches!(value, Value::Exception(e) if e.exc_type.is_subclass_of(*t))),
        Value::Type(name) => Ok(value.type_name() == *name),
        _ => Err(type_error(
            "isinstance() arg 2 must be a type, a tuple of types, or a union",
        )),
    }
}

fn big_arg(name: &str, value: &Value) -> EResult<BigInt> {
    value.as_bigint().ok_or_else(|| {
        type_error(format!(
            "'{}' object cannot be interpreted as an integer (in {name}())",
            value.type_name()
        ))
    })
}

pub(crate) fn call_math(func: MathFn, args: &[Value]) -> EResult<Value> {
    let name: &'static str = func.into();
    let float = num::float_of;
    let domain = || value_error("math domain error");
    match func {
        MathFn::Pow | MathFn::Gcd => arity(name, args, 2, 2)?,
        MathFn::Log => arity(name, args, 1, 2)?,
        _ => arity(name, args, 1, 1)?,
    }
    let result = match func {
        MathFn::Sqrt => {
            let x = float(&args[0])?;
            if x < 0.0 {
                return Err(domain());
            }
            x.sqrt()
        }
        MathFn::Isqrt => {
            let n = big_arg(name, &args[0])?;
            if n.is_negative() {
                return Err(value_error("isqrt() argument must be nonnegative"));
            }
            return Ok(Value::from_bigint(n.sqrt()));
        }
        MathFn::Floor | MathFn::Ceil | MathFn::Trunc => {
            if let Some(int) = int_value(&args[0]) {
                return Ok(int);
            }
            let x = float(&args[0])?;
            let rounded = match func {
                MathFn::Floor => x.floor(),
                MathFn::Ceil => x.ceil(),
                _ => x.trunc(),
            };
            return num::from_float(rounded);
        }
        MathFn::Fabs => float(&args[0])?.abs(),
        MathFn::Pow => float(&args[0])?.powf(float(&args[1])?),
        MathFn::Exp => float(&args[0])?.exp(),
        MathFn::Log | MathFn::Log10 | MathFn::Log2 => {
            let x = float(&args[0])?;
            if x <= 0.0 {
                return Err(domain());
            }
            match (func, args.get(1)) {
                (MathFn::Log10, _) => x.log10(),
                (MathFn::Log2, _) => x.log2(),
                (_, Some(base)) => x.ln() / float(base)?.ln(),
                _ => x.ln(),
            }
        }
        MathFn::Sin => float(&args[0])?.sin(),
        MathFn::Cos => float(&args[0])?.cos(),
        MathFn::Tan => float(&args[0])?.tan(),
        MathFn::Factorial => {
            let n = int_arg(name, &args[0])?;
            if n < 0 {
                return Err(value_error("factorial() not defined for negative values"));
            }
            return num::factorial(n.unsigned_abs());
        }
        MathFn::Gcd => {
            let (a, b) = (big_arg(name, &args[0])?, big_arg(name, &args[1])?);
            return Ok(Value::from_bigint(a.gcd(&b)));
        }
    };
    Ok(Value::Float(result))
}

const STR_METHODS: &[&str] = &[
    "upper", "lower", "swapcase", "strip", "lstrip", "rstrip", "split", "splitlines", "join", "replace",
    "startswith", "endswith", "find", "index", "count", "title", "capitalize", "isdigit", "isnumeric",
    "isalpha", "isalnum", "isspace", "isupper", "islower", "format", "center", "ljust", "rjust", "zfill",
];
const LIST_METHODS: &[&str] = &[
    "append", "extend", "insert", "pop", "remove", "index", "count", "sort", "reverse", "clear", "copy",
];
const DICT_METHODS: &[&str] = &["keys", "values", "items", "get", "pop", "update", "setdefault", "clear", "copy"];
const SET_METHODS: &[&str] = &[
    "add", "remove", "discard", "union", "intersection", "difference", "symmetric_difference", "clear", "copy",
];
const TUPLE_METHODS: &[&str] = &["index", "count"];

pub(crate) fn has_method(value: &Value, name: &str) -> bool {
    let table = match value {
        Value::Str(_) => STR_METHODS,
        Value::List(_) => LIST_METHODS,
        Value::Dict(_) => DICT_METHODS,
        Value::Set(_) => SET_METHODS,
        Value::Tuple(_) => TUPLE_METHODS,
        _ => return false,
    };
    table.contains(&name)
}

pub(crate) fn call_method(ctx: &mut Ctx<'_>, receiver: &Value, name: &str, args: Vec<Value>, kwargs: Kwargs) -> EResult<Value> {
    match receiver {
        Value::Str(s) => str_method(ctx, s, name, args, kwargs),
        Value::List(_) => list_method(ctx, receiver, name, args, kwargs),
        Value::Dict(_) => dict_method(ctx, receiver, name, args, kwargs),
        Value::Set(_) => set_method(ctx, receiver, name, args, kwargs),
        Value::Tuple(items) => {
            reject_kwargs(name, &kwargs)?;
            arity(name, &args, 1, 1)?;
            seq_search(items, &args[0], name, "tuple")
        }
        other => Err(Exception::new(
            ExcType::AttributeError,
            format!("'{}' object has no attribute '{name}'", other.type_name()),
        )),
    }
}

fn seq_search(items: &[Value], needle: &Value, method: &str, kind: &str) -> EResult<Value> {
    if method == "count" {
        let n = items.iter().filter(|v| v.py_eq(needle)).count();
        return Ok(Value::Int(i64::try_from(n).unwrap_or(i64::MAX)));
    }
    items
        .iter()
        .position(|v| v.py_eq(needle))
        .map(|i| Value::Int(i64::try_from(i).unwrap_or(i64::MAX)))
        .ok_or_else(|| value_error(format!("{}.index(x): x not in {kind}", kind)))
}

fn char_index(s: &str, byte: usize) -> i64 {
    i64::try_from(s[..byte].chars().count()).unwrap_or(i64::MAX)
}

fn str_method(ctx: &mut Ctx<'_>, s: &str, name: &str, args: Vec<Value>, mut kwargs: Kwargs) -> EResult<Value> {
    let text = |v: String| Ok(Value::str(v));
    let flag = |b: bool| Ok(Value::Bool(b));
    if name == "format" {
        return str_format(s, &args, &kwargs).map(Value::str);
    }
    if name == "split" {
        let sep = not_none(take_kwarg(&mut kwargs, "sep").or_else(|| args.first().cloned()));
        let maxsplit = match take_kwarg(&mut kwargs, "maxsplit").or_else(|| args.get(1).cloned()) {
            Some(v) => int_arg(name, &v)?,
            None => -1,
        };
        reject_kwargs(name, &kwargs)?;
        let parts = split(s, sep.as_ref(), maxsplit)?;
        return Ok(Value::list(parts.into_iter().map(Value::str).collect()));
    }
    reject_kwargs(name, &kwargs)?;
    match name {
        "upper" | "lower" | "swapcase" | "title" | "capitalize" | "splitlines" | "isdigit" | "isnumeric"
        | "isalpha" | "isalnum" | "isspace" | "isupper" | "islower" => arity(name, &args, 0, 0)?,
        "strip" | "lstrip" | "rstrip" => arity(name, &args, 0, 1)?,
        "replace" => arity(name, &args, 2, 3)?,
        "center" | "ljust" | "rjust" => arity(name, &args, 1, 2)?,
        _ => arity(name, &args, 1, 1)?,
    }
    match name {
        "upper" => text(s.to_uppercase()),
        "lower" => text(s.to_lowercase()),
        "swapcase" => text(
            s.chars()
                .flat_map(|c| {
                    if c.is_uppercase() {
                        c.to_lowercase().collect::<Vec<_>>()
                    } else {
                        c.to_uppercase().collect()
                    }
                })
                .collect(),
        ),
        "title" => {
            let mut out = String::with_capacity(s.len());
            let mut in_word = false;
            for c in s.chars() {
                if c.is_alphabetic() {
                    if in_word {
                        out.extend(c.to_lowercase());
                    } else {
                        out.extend(c.to_uppercase());
                    }
                    in_word = true;
                } else {
                    out.push(c);
                    in_word = false;
                }
            }
            text(out)
        }
        "capitalize" => {
            let mut chars = s.chars();
            text(match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            })
        }
        "strip" | "lstrip" | "rstrip" => {
            let chars: Option<Vec<char>> = match not_none(args.first().cloned()) {
                Some(v) => Some(str_arg(name, &v)?.chars().collect()),
                None => None,
            };
            let pred = |c: char| chars.as_ref().map_or(c.is_whitespace(), |set| set.contains(&c));
            text(match name {
                "strip" => s.trim_matches(pred),
                "lstrip" => s.trim_start_matches(pred),
                _ => s.trim_end_matches(pred),
            }
            .to_owned())
        }
        "splitlines" => Ok(Value::list(s.lines().map(Value::str).collect())),
        "join" => {
            let items = ctx.collect(&args[0])?;
            let mut parts = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                match item {
                    Value::Str(p) => parts.push(p.to_string()),
                    other => {
                        return Err(type_error(format!(
                            "sequence item {i}: expected str instance, {} found",
                            other.type_name()
                        )));
                    }
                }
            }
            let joined = parts.join(s);
            ctx.check_len(joined.len())?;
            text(joined)
        }
        "replace" => {
            let (old, new) = (str_arg(name, &args[0])?, str_arg(name, &args[1])?);
            let count = match args.get(2) {
                Some(v) => int_arg(name, v)?,
                None => -1,
            };
            let out = match usize::try_from(count) {
                Ok(n) => s.replacen(old, new, n),
                Err(_) => s.replace(old, new),
            };
            ctx.check_len(out.len())?;
            text(out)
        }
        "startswith" | "endswith" => {
            let candidates: Vec<Value> = match &args[0] {
                Value::Tuple(items) => items.as_ref().clone(),
                other => vec![other.clone()],
            };
            for candidate in &candidates {
                let affix = str_arg(name, candidate)?;
                let hit = if name == "startswith" { s.starts_with(affix) } else { s.ends_with(affix) };
                if hit {
                    return flag(true);
                }
            }
            flag(false)
        }
        "find" | "index" => {
            let sub = str_arg(name, &args[0])?;
            match s.find(sub) {
                Some(byte) => Ok(Value::Int(char_index(s, byte))),
                None if name == "find" => Ok(Value::Int(-1)),
                None => Err(value_error("substring not found")),
            }
        }
        "count" => {
            let sub = str_arg(name, &args[0])?;
            let n = if sub.is_empty() { s.chars().count() + 1 } else { s.matches(sub).count() };
            Ok(Value::Int(i64::try_from(n).unwrap_or(i64::MAX)))
        }
        "isdigit" | "isnumeric" => flag(!s.is_empty() && s.chars().all(char::is_numeric)),
        "isalpha" => flag(!s.is_empty() && s.chars().all(char::is_alphabetic)),
        "isalnum" => flag(!s.is_empty() && s.chars().all(char::is_alphanumeric)),
        "isspace" => flag(!s.is_empty() && s.chars().all(char::is_whitespace)),
        "isupper" => flag(s.chars().any(char::is_uppercase) && !s.chars().any(char::is_lowercase)),
        "islower" => flag(s.chars().any(char::is_lowercase) && !s.chars().any(char::is_uppercase)),
        "center" | "ljust" | "rjust" | "zfill" => {
            let width = usize::try_from(int_arg(name, &args[0])?).unwrap_or(0);
            ctx.check_len(width)?;
            let fill = match args.get(1) {
                Some(v) => {
                    let f = str_arg(name, v)?;
                    let mut chars = f.chars();
                    match (chars.next(), chars.next()) {
                        (Some(c), None) => c,
                        _ => return Err(type_error("The fill character must be exactly one character long")),
                    }
                }
                None => ' ',
            };
            let len = s.chars().count();
            if len >= width {
                return text(s.to_owned());
            }
            let missing = width - len;
            let pad = |n: usize| fill.to_string().repeat(n);
            text(match name {
                "ljust" => format!("{s}{}", pad(missing)),
                "rjust" => format!("{}{s}", pad(missing)),
                "zfill" => match s.strip_prefix(['-', '+']) {
                    Some(rest) => format!("{}{}{rest}", &s[..1], "0".repeat(missing)),
                    None => format!("{}{s}", "0".repeat(missing)),
                },
                _ => {
                    let left = missing / 2 + (missing & width & 1);
                    format!("{}{s}{}", pad(left), pad(missing - left))
                }
            })
        }
        _ => Err(Exception::new(
            ExcType::AttributeError,
            format!("'str' object has no attribute '{name}'"),
        )),
    }
}

fn split(s: &str, sep: Option<&Value>, maxsplit: i64) -> EResult<Vec<String>> {
    let limit = usize::try_from(maxsplit).ok();
    match sep {
        Some(sep) => {
            let sep = str_arg("split", sep)?;
            if sep.is_empty() {
                return Err(value_error("empty separator"));
            }
            Ok(match limit {
                Some(n) => s.splitn(n + 1, sep).map(str::to_owned).collect(),
                None => s.split(sep).map(str::to_owned).collect(),
            })
        }
        None => {
            let mut parts = Vec::new();
            let mut rest = s.trim_start();
            while !rest.is_empty() {
                if limit.is_some_and(|n| parts.len() >= n) {
                    parts.push(rest.trim_end().to_owned());
                    break;
                }
                match rest.find(char::is_whitespace) {
                    Some(i) => {
                        parts.push(rest[..i].to_owned());
                        rest = rest[i..].trim_start();
                    }
                    None => {
                        parts.push(rest.to_owned());
                        rest = "";
                    }
                }
            }
            Ok(parts)
        }
    }
}

fn list_method(ctx: &mut Ctx<'_>, receiver: &Value, name: &str, args: Vec<Value>, mut kwargs: Kwargs) -> EResult<Value> {
    let Value::List(list) = receiver else {
        return Err(type_error("descriptor requires a 'list' object"));
    };
    if name == "sort" {
        let key = not_none(take_kwarg(&mut kwargs, "key"));
        let reverse = take_kwarg(&mut kwargs, "reverse").is_some_and(|v| v.truthy());
        reject_kwargs(name, &kwargs)?;
        arity(name, &args, 0, 0)?;
        let items = list.borrow().clone();
        let sorted = sort_values(ctx, items, key, reverse)?;
        *list.borrow_mut() = sorted;
        return Ok(Value::None);
    }
    reject_kwargs(name, &kwargs)?;
    match name {
        "append" => {
            arity(name, &args, 1, 1)?;
            let len = list.borrow().len() + 1;
            ctx.check_len(len)?;
            list.borrow_mut().extend(args);
            Ok(Value::None)
        }
        "extend" => {
            arity(name, &args, 1, 1)?;
            let items = ctx.collect(&args[0])?;
            let len = list.borrow().len() + items.len();
            ctx.check_len(len)?;
            list.borrow_mut().extend(items);
            Ok(Value::None)
        }
        "insert" => {
            arity(name, &args, 2, 2)?;
            let index = int_arg(name, &args[0])?;
            let mut items = list.borrow_mut();
            let len = i64::try_from(items.len()).unwrap_or(i64::MAX);
            let pos = if index < 0 { (index + len).max(0) } else { index.min(len) };
            items.insert(usize::try_from(pos).unwrap_or(0), args[1].clone());
            Ok(Value::None)
        }
        "pop" => {
            arity(name, &args, 0, 1)?;
            let index = match args.first() {
                Some(v) => int_arg(name, v)?,
                None => -1,
            };
            let mut items = list.borrow_mut();
            if items.is_empty() {
                return Err(Exception::new(ExcType::IndexError, "pop from empty list"));
            }
            let pos = normalize_index(index, items.len())
                .ok_or_else(|| Exception::new(ExcType::IndexError, "pop index out of range"))?;
            Ok(items.remove(pos))
        }
        "remove" => {
            arity(name, &args, 1, 1)?;
            let pos = list.borrow().iter().position(|v| v.py_eq(&args[0]));
            match pos {
                Some(pos) => {
                    list.borrow_mut().remove(pos);
                    Ok(Value::None)
                }
                None => Err(value_error("list.remove(x): x not in list")),
            }
        }
        "index" | "count" => {
            arity(name, &args, 1, 1)?;
            let items = list.borrow().clone();
            seq_search(&items, &args[0], name, "list")
        }
        "reverse" => {
            arity(name, &args, 0, 0)?;
            list.borrow_mut().reverse();
            Ok(Value::None)
        }
        "clear" => {
            arity(name, &args, 0, 0)?;
            list.borrow_mut().clear();
            Ok(Value::None)
        }
        "copy" => {
            arity(name, &args, 0, 0)?;
            let items = list.borrow().clone();
            Ok(Value::list(items))
        }
        _ => Err(Exception::new(
            ExcType::AttributeError,
            format!("'list' object has no attribute '{name}'"),
        )),
    }
}

fn dict_method(ctx: &mut Ctx<'_>, receiver: &Value, name: &str, args: Vec<Value>, kwargs: Kwargs) -> EResult<Value> {
    let Value::Dict(dict) = receiver else {
        return Err(type_error("descriptor requires a 'dict' object"));
    };
    if name == "update" {
        arity(name, &args, 0, 1)?;
        let mut staged = dict.borrow().clone();
        if let Some(source) = args.first() {
            dict_update(ctx, &mut staged, source)?;
        }
        for (k, v) in kwargs {
            staged.insert(Value::str(k), v)?;
        }
        *dict.borrow_mut() = staged;
        return Ok(Value::None);
    }
    reject_kwargs(name, &kwargs)?;
    match name {
        "keys" | "values" | "items" | "clear" | "copy" => arity(name, &args, 0, 0)?,
        _ => arity(name, &args, 1, 2)?,
    }
    match name {
        "keys" => Ok(Value::list(dict.borrow().keys())),
        "values" => Ok(Value::list(dict.borrow().values())),
        "items" => Ok(Value::list(dict.borrow().items())),
        "get" => {
            let found = dict.borrow().get(&args[0])?;
            Ok(found.or_else(|| args.get(1).cloned()).unwrap_or(Value::None))
        }
        "pop" => {
            let removed = dict.borrow_mut().remove(&args[0])?;
            removed
                .or_else(|| args.get(1).cloned())
                .ok_or_else(|| Exception::new(ExcType::KeyError, args[0].py_repr()))
        }
        "setdefault" => {
            let existing = dict.borrow().get(&args[0])?;
            match existing {
                Some(v) => Ok(v),
                None => {
                    let default = args.get(1).cloned().unwrap_or(Value::None);
                    dict.borrow_mut().insert(args[0].clone(), default.clone())?;
                    Ok(default)
                }
            }
        }
        "clear" => {
            dict.borrow_mut().clear();
            Ok(Value::None)
        }
        "copy" => {
            let copy = dict.borrow().clone();
            Ok(Value::dict(copy))
        }
        _ => Err(Exception::new(
            ExcType::AttributeError,
            format!("'dict' object has no attribute '{name}'"),
        )),
    }
}

fn set_method(ctx: &mut Ctx<'_>, receiver: &Value, name: &str, args: Vec<Value>, kwargs: Kwargs) -> EResult<Value> {
    let Value::Set(set) = receiver else {
        return Err(type_error("descriptor requires a 'set' object"));
    };
    reject_kwargs(name, &kwargs)?;
    match name {
        "clear" | "copy" => arity(name, &args, 0, 0)?,
        _ => arity(name, &args, 1, 1)?,
    }
    match name {
        "add" => {
            set.borrow_mut().insert(args[0].clone())?;
            Ok(Value::None)
        }
        "remove" | "discard" => {
            let removed = set.borrow_mut().remove(&args[0])?;
            if removed || name == "discard" {
                Ok(Value::None)
            } else {
                Err(Exception::new(ExcType::KeyError, args[0].py_repr()))
            }
        }
        "union" | "intersection" | "difference" | "symmetric_difference" => {
            let other = Set::from_values(ctx.collect(&args[0])?)?;
            let mine = set.borrow();
            let result = match name {
                "union" => mine.union(&other),
                "intersection" => mine.intersection(&other),
                "difference" => mine.difference(&other),
                _ => mine.symmetric_difference(&other),
            };
            ctx.check_len(result.len())?;
            Ok(Value::from_set(result))
        }
        "clear" => {
            set.borrow_mut().clear();
            Ok(Value::None)
        }
        "copy" => Ok(Value::from_set(set.borrow().clone())),
        _ => Err(Exception::new(
            ExcType::AttributeError,
            format!("'set' object has no attribute '{name}'"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_names_resolve() {
        assert!(matches!(lookup_builtin("print"), Some(Value::Builtin(Builtin::Print))));
        assert!(matches!(lookup_builtin("isinstance"), Some(Value::Builtin(Builtin::Isinstance))));
        assert!(matches!(lookup_builtin("ValueError"), Some(Value::ExcClass(ExcType::ValueError))));
        assert!(lookup_builtin("InternalError").is_none());
        assert!(lookup_builtin("open").is_none());
    }

    #[test]
    fn math_functions() {
        assert!(matches!(math_attr("log10"), Ok(Value::MathFn(MathFn::Log10))));
        assert!(math_attr("nope").is_err());
        let root = call_math(MathFn::Sqrt, &[Value::Int(16)]).expect("sqrt");
        assert!(root.py_eq(&Value::Float(4.0)));
        assert!(call_math(MathFn::Sqrt, &[Value::Int(-1)]).is_err());
        let fact = call_math(MathFn::Factorial, &[Value::Int(5)]).expect("factorial");
        assert!(fact.py_eq(&Value::Int(120)));
    }

    #[test]
    fn int_parsing() {
        let parsed = |text: &str, base| to_int(&Value::str(text), base).expect("int").py_repr();
        assert_eq!(parsed(" 42 ", None), "42");
        assert_eq!(parsed("-7", None), "-7");
        assert_eq!(parsed("ff", Some(16)), "255");
        assert_eq!(parsed("123456789012345678901234567890", None), "123456789012345678901234567890");
        let err = to_int(&Value::str("abc"), None).unwrap_err();
        assert_eq!(err.message, "invalid literal for int() with base 10: 'abc'");
        assert_eq!(to_int(&Value::Float(-2.9), None).expect("int").py_repr(), "-2");
        assert_eq!(to_int(&Value::Float(1e20), None).expect("int").py_repr(), "100000000000000000000");
        let err = to_int(&Value::str("9".repeat(5000)), None).unwrap_err();
        assert!(err.message.starts_with("Exceeds the limit (4300 digits)"));
    }

    #[test]
    fn big_int_math() {
        let big = Value::from_bigint(BigInt::from(10).pow(30));
        assert_eq!(call_math(MathFn::Factorial, &[Value::Int(25)]).expect("fact").py_repr(), "15511210043330985984000000");
        assert_eq!(call_math(MathFn::Isqrt, &[big.clone()]).expect("isqrt").py_repr(), "1000000000000000");
        assert_eq!(
            call_math(MathFn::Gcd, &[big.clone(), Value::Int(-4_000)]).expect("gcd").py_repr(),
            "4000"
        );
        assert_eq!(round(&Value::Int(1_250), Some(-2)).expect("round").py_repr(), "1200");
        assert_eq!(round(&big, Some(-31)).expect("round").py_repr(), "0");
        let err = len_of(&Value::Range { start: -i64::MAX, stop: i64::MAX, step: 1 }).unwrap_err();
        assert_eq!(err.exc_type, ExcType::OverflowError);
        assert_eq!(len_of(&Value::Range { start: -i64::MAX, stop: i64::MAX, step: 2 }).expect("len"), i64::MAX);
    }

    #[test]
    fn rounding_is_bankers() {
        assert!(round(&Value::Float(2.5), None).expect("round").py_eq(&Value::Int(2)));
        assert!(round(&Value::Float(3.5), None).expect("round").py_eq(&Value::Int(4)));
        assert!(round(&Value::Float(3.14159), Some(2)).expect("round").py_eq(&Value::Float(3.14)));
    }

    #[test]
    fn whitespace_split() {
        assert_eq!(split("  a  b c ", None, -1).expect("split"), vec!["a", "b", "c"]);
        assert_eq!(split("a b c", None, 1).expect("split"), vec!["a", "b c"]);
        assert_eq!(split("a,b,,c", Some(&Value::str(",")), -1).expect("split"), vec!["a", "b", "", "c"]);
    }
}
