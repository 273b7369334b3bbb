//! Number rendering and the format-spec mini-language shared by f-strings,
//! `str.format()`, `format()` and `%` formatting.

use num_bigint::Sign;

use super::{
    error::{type_error, value_error, ExcType, Exception},
    num,
    resource::check_len,
    value::Value,
};

/// `repr()` of a float the way CPython prints it.
pub(crate) fn float_repr(f: f64) -> String {
    if f.is_nan() {
        return "nan".to_owned();
    }
    if f.is_infinite() {
        return if f > 0.0 { "inf" } else { "-inf" }.to_owned();
    }
    let abs = f.abs();
    if abs != 0.0 && !(1e-4..1e16).contains(&abs) {
        return python_exponent(&format!("{f:e}"));
    }
    if f == f.trunc() {
        format!("{f:.1}")
    } else {
        format!("{f}")
    }
}

/// Rewrites Rust's `1.5e-7` exponent form as Python's `1.5e-07`.
fn python_exponent(rust: &str) -> String {
    let Some((mantissa, exp)) = rust.split_once('e') else {
        return rust.to_owned();
    };
    let (sign, digits) = match exp.strip_prefix('-') {
        Some(d) => ('-', d),
        None => ('+', exp),
    };
    format!("{mantissa}e{sign}{digits:0>2}")
}

#[derive(Debug, Default, Clone, PartialEq)]
struct Spec {
    fill: Option<char>,
    align: Option<char>,
    sign: Option<char>,
    zero: bool,
    width: usize,
    grouping: Option<char>,
    precision: Option<usize>,
    kind: Option<char>,
}

fn parse_spec(spec: &str) -> Result<Spec, Exception> {
    let chars: Vec<char> = spec.chars().collect();
    let mut out = Spec::default();
    let mut i = 0;
    let is_align = |c: char| matches!(c, '<' | '>' | '^' | '=');

    if chars.len() >= 2 && is_align(chars[1]) {
        out.fill = Some(chars[0]);
        out.align = Some(chars[1]);
        i = 2;
    } else if chars.first().copied().is_some_and(is_align) {
        out.align = Some(chars[0]);
        i = 1;
    }
    if let Some(&c @ ('+' | '-' | ' ')) = chars.get(i) {
        out.sign = Some(c);
        i += 1;
    }
    if chars.get(i) == Some(&'0') {
        out.zero = true;
        i += 1;
    }
    let start = i;
    while chars.get(i).is_some_and(char::is_ascii_digit) {
        i += 1;
    }
    if i > start {
        out.width = spec_number(&chars[start..i])?;
    }
    if let Some(&c @ (',' | '_')) = chars.get(i) {
        out.grouping = Some(c);
        i += 1;
    }
    if chars.get(i) == Some(&'.') {
        i += 1;
        let start = i;
        while chars.get(i).is_some_and(char::is_ascii_digit) {
            i += 1;
        }
        if i == start {
            return Err(value_error("Format specifier missing precision"));
        }
        out.precision = Some(spec_number(&chars[start..i])?);
    }
    if let Some(&c) = chars.get(i) {
        out.kind = Some(c);
        i += 1;
    }
    if i != chars.len() {
        return Err(value_error("Invalid format specifier"));
    }
    Ok(out)
}

/// Width or precision digits. Both size the rendered text, so they are held to
/// the sandbox's sequence limit before anything is allocated.
fn spec_number(digits: &[char]) -> Result<usize, Exception> {
    let n: usize = digits
        .iter()
        .collect::<String>()
        .parse()
        .map_err(|_| value_error("Too many decimal digits in format string"))?;
    check_len(n)?;
    Ok(n)
}

/// `format(value, spec)`.
pub(crate) fn format_value(value: &Value, spec: &str) -> Result<String, Exception> {
    if spec.is_empty() {
        return Ok(value.py_str());
    }
    let spec = parse_spec(spec)?;
    let numeric = value.is_number();
    let body = match (spec.kind, value) {
        (None | Some('s'), Value::Str(s)) => match spec.precision {
            Some(p) => s.chars().take(p).collect(),
            None => s.to_string(),
        },
        (Some('s'), other) => {
            return Err(unknown_code('s', other));
        }
        (Some(c @ ('d' | 'n' | 'x' | 'X' | 'o' | 'b')), v) if v.is_int() => {
            let (digits, negative) = int_digits(v, c);
            let digits = if matches!(c, 'd' | 'n') { group(&digits, spec.grouping) } else { digits };
            signed(&digits, negative, spec.sign)
        }
        (Some(c @ ('f' | 'F' | 'e' | 'E' | '%' | 'g' | 'G')), v) if numeric => {
            render_float(num::float_of(v)?, c, spec.precision, spec.grouping, spec.sign)
        }
        (None, Value::Float(f)) => match spec.precision {
            Some(p) => render_float(*f, 'g', Some(p), spec.grouping, spec.sign),
            None => {
                let repr = float_repr(f.abs());
                signed(&group_float(&repr, spec.grouping), f.is_sign_negative(), spec.sign)
            }
        },
        (None, v) if v.is_int() && !matches!(v, Value::Bool(_)) => {
            let (digits, negative) = int_digits(v, 'd');
            signed(&group(&digits, spec.grouping), negative, spec.sign)
        }
        (None, other) => other.py_str(),
        (Some(c), other) => return Err(unknown_code(c, other)),
    };
    Ok(pad(&body, &spec, numeric))
}

/// Magnitude digits of an int in the radix `code` names, and whether it is negative.
fn int_digits(value: &Value, code: char) -> (String, bool) {
    let big = value.as_bigint().unwrap_or_default();
    let magnitude = big.magnitude();
    let digits = match code {
        'x' => format!("{magnitude:x}"),
        'X' => format!("{magnitude:X}"),
        'o' => format!("{magnitude:o}"),
        'b' => format!("{magnitude:b}"),
        _ => magnitude.to_string(),
    };
    (digits, big.sign() == Sign::Minus)
}

fn unknown_code(code: char, value: &Value) -> Exception {
    value_error(format!(
        "Unknown format code '{code}' for object of type '{}'",
        value.type_name()
    ))
}

fn render_float(f: f64, kind: char, precision: Option<usize>, grouping: Option<char>, sign: Option<char>) -> String {
    let prec = precision.unwrap_or(6);
    let negative = f.is_sign_negative() && f != 0.0;
    let abs = f.abs();
    if abs.is_nan() || abs.is_infinite() {
        let text = if abs.is_nan() { "nan" } else { "inf" };
        return signed(text, negative, sign);
    }
    let body = match kind {
        'f' | 'F' => group_float(&format!("{abs:.prec$}"), grouping),
        '%' => format!("{}%", group_float(&format!("{:.prec$}", abs * 100.0), grouping)),
        'e' | 'E' => {
            let text = python_exponent(&format!("{abs:.prec$e}"));
            if kind == 'E' { text.to_uppercase() } else { text }
        }
        _ => general(abs, prec.max(1)),
    };
    signed(&body, negative, sign)
}

/// `g` presentation: `prec` significant digits, trailing zeros removed.
fn general(abs: f64, prec: usize) -> String {
    if abs == 0.0 {
        return "0".to_owned();
    }
    let sci = format!("{abs:.*e}", prec - 1);
    let exp: i64 = sci.split_once('e').and_then(|(_, e)| e.parse().ok()).unwrap_or(0);
    let prec_i = i64::try_from(prec).unwrap_or(i64::MAX);
    if exp < -4 || exp >= prec_i {
        let (mantissa, _) = sci.split_once('e').unwrap_or((&sci, ""));
        let mantissa = trim_zeros(mantissa);
        python_exponent(&format!("{mantissa}e{exp}"))
    } else {
        let decimals = usize::try_from(prec_i - 1 - exp).unwrap_or(0);
        trim_zeros(&format!("{abs:.decimals$}")).to_owned()
    }
}

fn trim_zeros(text: &str) -> &str {
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.')
    } else {
        text
    }
}

fn signed(body: &str, negative: bool, sign: Option<char>) -> String {
    let prefix = match (negative, sign) {
        (true, _) => "-",
        (false, Some('+')) => "+",
        (false, Some(' ')) => " ",
        _ => "",
    };
    format!("{prefix}{body}")
}

fn group(digits: &str, sep: Option<char>) -> String {
    let Some(sep) = sep else {
        return digits.to_owned();
    };
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(sep);
        }
        out.push(c);
    }
    out
}

fn group_float(text: &str, sep: Option<char>) -> String {
    match text.split_once('.') {
        Some((int, frac)) => format!("{}.{frac}", group(int, sep)),
        None => group(text, sep),
    }
}

fn pad(body: &str, spec: &Spec, numeric: bool) -> String {
    let len = body.chars().count();
    if len >= spec.width {
        return body.to_owned();
    }
    let missing = spec.width - len;
    let (fill, align) = match (spec.fill, spec.align, spec.zero) {
        (Some(f), Some(a), _) => (f, a),
        (None, Some(a), _) => (' ', a),
        (None, None, true) if numeric => ('0', '='),
        _ => (' ', if numeric { '>' } else { '<' }),
    };
    let filler = |n: usize| fill.to_string().repeat(n);
    match align {
        '<' => format!("{body}{}", filler(missing)),
        '^' => format!("{}{body}{}", filler(missing / 2), filler(missing - missing / 2)),
        '=' => {
            let split = body.find(|c: char| c != '-' && c != '+' && c != ' ').unwrap_or(0);
            format!("{}{}{}", &body[..split], filler(missing), &body[split..])
        }
        _ => format!("{}{body}", filler(missing)),
    }
}

/// `template.format(*args, **kwargs)`.
pub(crate) fn str_format(template: &str, args: &[Value], kwargs: &[(String, Value)]) -> Result<String, Exception> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    let mut auto_index = 0usize;
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '}' => return Err(value_error("Single '}' encountered in format string")),
            '{' => {
                let mut field = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(c) => field.push(c),
                        None => return Err(value_error("Single '{' encountered in format string")),
                    }
                }
                let (name, spec) = field.split_once(':').unwrap_or((field.as_str(), ""));
                let (name, conversion) = match name.split_once('!') {
                    Some((n, conv)) => (n, Some(conv)),
                    None => (name, None),
                };
                let value = if name.is_empty() {
                    let v = args.get(auto_index).cloned();
                    auto_index += 1;
                    v.ok_or_else(|| {
                        Exception::new(
                            ExcType::IndexError,
                            format!("Replacement index {} out of range for positional args tuple", auto_index - 1),
                        )
                    })?
                } else if let Ok(index) = name.parse::<usize>() {
                    args.get(index).cloned().ok_or_else(|| {
                        Exception::new(
                            ExcType::IndexError,
                            format!("Replacement index {index} out of range for positional args tuple"),
                        )
                    })?
                } else {
                    kwargs
                        .iter()
                        .find(|(k, _)| k == name)
                        .map(|(_, v)| v.clone())
                        .ok_or_else(|| Exception::new(ExcType::KeyError, format!("'{name}'")))?
                };
                let value = match conversion {
                    Some("r") => Value::str(value.py_repr()),
                    Some("s") => Value::str(value.py_str()),
                    Some(other) => {
                        return Err(value_error(format!("Unknown conversion specifier {other}")));
                    }
                    None => value,
                };
                out.push_str(&format_value(&value, spec)?);
            }
            c => out.push(c),
        }
    }
    Ok(out)
}

/// `template % args` for strings.
pub(crate) fn percent_format(template: &str, args: &Value) -> Result<String, Exception> {
    let args: Vec<Value> = match args {
        Value::Tuple(items) => items.as_ref().clone(),
        other => vec![other.clone()],
    };
    let mut next = args.iter();
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let mut spec = String::new();
        let kind = loop {
            match chars.next() {
                Some(c) if c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | ' ') => spec.push(c),
                Some(c) => break c,
                None => return Err(value_error("incomplete format")),
            }
        };
        if kind == '%' {
            out.push('%');
            continue;
        }
        let value = next
            .next()
            .ok_or_else(|| type_error("not enough arguments for format string"))?;
        let left = spec.starts_with('-');
        let spec = spec.trim_start_matches('-');
        let rendered = match kind {
            's' => format_value(&Value::str(value.py_str()), spec)?,
            'r' => format_value(&Value::str(value.py_repr()), spec)?,
            'd' | 'i' => {
                let as_int = match value {
                    Value::Float(f) => num::from_float(*f)?,
                    v if v.is_int() => v.clone(),
                    other => {
                        return Err(type_error(format!(
                            "%{kind} format: a real number is required, not {}",
                            other.type_name()
                        )));
                    }
                };
                format_value(&as_int, &format!("{spec}d"))?
            }
            'f' | 'F' | 'e' | 'g' | 'x' | 'X' | 'o' => {
                if !value.is_number() {
                    return Err(type_error(format!(
                        "must be real number, not {}",
                        value.type_name()
                    )));
                }
                format_value(value, &format!("{spec}{kind}"))?
            }
            other => {
                return Err(value_error(format!("unsupported format character '{other}'")));
            }
        };
        if left {
            let width: usize = spec.split('.').next().and_then(|w| w.parse().ok()).unwrap_or(0);
            out.push_str(&format!("{:<width$}", rendered.trim_start()));
        } else {
            out.push_str(&rendered);
        }
    }
    if next.next().is_some() {
        return Err(type_error("not all arguments converted during string formatting"));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floats_print_like_python() {
        assert_eq!(float_repr(3.0), "3.0");
        assert_eq!(float_repr(0.1 + 0.2), "0.30000000000000004");
        assert_eq!(float_repr(1e16), "1e+16");
        assert_eq!(float_repr(1.5e-7), "1.5e-07");
        assert_eq!(float_repr(-2.5), "-2.5");
    }

    #[test]
    fn format_specs() {
        assert_eq!(format_value(&Value::Float(3.14159), ".2f").expect("fmt"), "3.14");
        assert_eq!(format_value(&Value::Int(42), ">5").expect("fmt"), "   42");
        assert_eq!(format_value(&Value::str("ab"), "*^6").expect("fmt"), "**ab**");
        assert_eq!(format_value(&Value::Int(1234567), ",").expect("fmt"), "1,234,567");
        assert_eq!(format_value(&Value::Int(7), "03d").expect("fmt"), "007");
        assert_eq!(format_value(&Value::Float(0.25), ".0%").expect("fmt"), "25%");
        assert_eq!(format_value(&Value::Float(3.14159), ".3").expect("fmt"), "3.14");
        let big = Value::from_bigint(-(num_bigint::BigInt::from(1) << 70u32));
        assert_eq!(format_value(&big, ",").expect("fmt"), "-1,180,591,620,717,411,303,424");
        assert_eq!(format_value(&big, "x").expect("fmt"), "-400000000000000000");
        assert!(format_value(&Value::str("x"), "d").is_err());
    }

    #[test]
    fn oversized_width_and_precision_are_memory_errors() {
        let err = format_value(&Value::Int(1), ">1000000000000000").unwrap_err();
        assert_eq!(err.exc_type, ExcType::MemoryError);
        assert!(err.fatal);
        let err = format_value(&Value::Float(1.5), ".5000000000f").unwrap_err();
        assert_eq!(err.exc_type, ExcType::MemoryError);
        let err = format_value(&Value::Int(1), "99999999999999999999999").unwrap_err();
        assert_eq!(err.exc_type, ExcType::ValueError);
        let err = str_format("{:^1000000000000}", &[Value::str("x")], &[]).unwrap_err();
        assert_eq!(err.exc_type, ExcType::MemoryError);
        let err = percent_format("%1000000000000d", &Value::Int(7)).unwrap_err();
        assert_eq!(err.exc_type, ExcType::MemoryError);
        assert_eq!(format_value(&Value::Int(1), ">1000000").expect("fmt").len(), 1_000_000);
    }

    #[test]
    fn str_format_fields() {
        let out = str_format(
            "{} + {1} = {total:.1f}",
            &[Value::Int(1), Value::Int(2)],
            &[("total".to_owned(), Value::Float(3.0))],
        )
        .expect("format");
        assert_eq!(out, "1 + 2 = 3.0");
    }

    #[test]
    fn percent_operator() {
        let args = Value::tuple(vec![Value::str("Ana"), Value::Float(9.5)]);
        assert_eq!(percent_format("%s scored %.1f%%", &args).expect("fmt"), "Ana scored 9.5%");
        assert!(percent_format("%d %d", &Value::Int(1)).is_err());
    }
}
