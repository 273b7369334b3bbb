use std::{
    cell::RefCell,
    cmp::Ordering,
    collections::HashMap,
    fmt::Write as _,
    rc::Rc,
};

use indexmap::IndexMap;
use num_bigint::BigInt;
use num_traits::{FromPrimitive, ToPrimitive};

use super::{
    ast::FunctionDef,
    builtins::{Builtin, MathFn},
    error::{type_error, ExcType, Exception},
    format::float_repr,
    num,
};

/// Nested containers deeper than this print as `[...]` and compare unequal.
const MAX_REPR_DEPTH: usize = 64;

/// Shared, mutable variable scope. Frames own one; closures keep the enclosing ones alive.
pub(crate) type Scope = Rc<RefCell<HashMap<String, Value>>>;

/// A runtime value.
///
/// Containers use `Rc<RefCell<..>>` so aliasing behaves like Python (`b = a; b.append(1)`
/// is visible through `a`). The interpreter is single-threaded by construction.
#[derive(Debug, Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    /// Ints outside the `i64` range. Never holds a value that fits in `Int`.
    BigInt(Rc<BigInt>),
    Float(f64),
    Str(Rc<str>),
    List(Rc<RefCell<Vec<Value>>>),
    Tuple(Rc<Vec<Value>>),
    Dict(Rc<RefCell<Dict>>),
    Set(Rc<RefCell<Set>>),
    Range { start: i64, stop: i64, step: i64 },
    Function(Rc<Function>),
    Builtin(Builtin),
    MathFn(MathFn),
    BoundMethod(Rc<BoundMethod>),
    Module(&'static str),
    ExcClass(ExcType),
    Exception(Rc<Exception>),
    /// Type objects without a constructor builtin (`type(len)`, `type(None)`, ...).
    Type(&'static str),
}

#[derive(Debug)]
pub struct Function {
    pub def: Rc<FunctionDef>,
    /// One entry per parameter; `None` when the parameter has no default.
    pub defaults: Vec<Option<Value>>,
    /// Enclosing function scopes, outermost first.
    pub closure: Vec<Scope>,
}

#[derive(Debug)]
pub struct BoundMethod {
    pub receiver: Value,
    pub name: String,
}

/// Hashable identity of a value, consistent with [`Value::py_eq`]: equal
/// values (`1`, `1.0`, `True`) produce equal keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum HashKey {
    None,
    Int(i64),
    BigInt(Rc<BigInt>),
    /// Bit pattern of a float with a fractional part (or NaN/inf).
    Float(u64),
    Str(Rc<str>),
    Tuple(Vec<HashKey>),
    Range(i64, i64, i64),
    /// Builtins, modules and types, by kind and name.
    Named(&'static str, &'static str),
    /// Functions and exceptions hash by identity.
    Identity(usize),
}

/// Insertion-ordered dictionary.
#[derive(Debug, Default, Clone)]
pub struct Dict {
    /// The original key is kept alongside the value, like CPython (`{1: 'a', 1.0: 'b'}` keeps `1`).
    entries: IndexMap<HashKey, (Value, Value)>,
}

impl Dict {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &Value) -> Result<Option<Value>, Exception> {
        Ok(self.entries.get(&key.hash_key()?).map(|(_, v)| v.clone()))
    }

    pub fn contains(&self, key: &Value) -> Result<bool, Exception> {
        Ok(self.entries.contains_key(&key.hash_key()?))
    }

    pub fn insert(&mut self, key: Value, value: Value) -> Result<(), Exception> {
        match self.entries.entry(key.hash_key()?) {
            indexmap::map::Entry::Occupied(mut slot) => slot.get_mut().1 = value,
            indexmap::map::Entry::Vacant(slot) => {
                slot.insert((key, value));
            }
        }
        Ok(())
    }

    pub fn remove(&mut self, key: &Value) -> Result<Option<Value>, Exception> {
        Ok(self.entries.shift_remove(&key.hash_key()?).map(|(_, v)| v))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn keys(&self) -> Vec<Value> {
        self.entries.values().map(|(k, _)| k.clone()).collect()
    }

    pub fn values(&self) -> Vec<Value> {
        self.entries.values().map(|(_, v)| v.clone()).collect()
    }

    pub fn items(&self) -> Vec<Value> {
        self.entries
            .values()
            .map(|(k, v)| Value::tuple(vec![k.clone(), v.clone()]))
            .collect()
    }

    fn pairs(&self) -> impl Iterator<Item = &(Value, Value)> {
        self.entries.values()
    }
}

/// Insertion-ordered set; the first of several equal items is the one kept.
#[derive(Debug, Default, Clone)]
pub struct Set {
    items: IndexMap<HashKey, Value>,
}

impl Set {
    pub fn from_values(values: Vec<Value>) -> Result<Self, Exception> {
        let mut set = Self::default();
        for value in values {
            set.insert(value)?;
        }
        Ok(set)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, value: &Value) -> Result<bool, Exception> {
        Ok(self.items.contains_key(&value.hash_key()?))
    }

    /// Returns `false` when an equal item was already present.
    pub fn insert(&mut self, value: Value) -> Result<bool, Exception> {
        match self.items.entry(value.hash_key()?) {
            indexmap::map::Entry::Occupied(_) => Ok(false),
            indexmap::map::Entry::Vacant(slot) => {
                slot.insert(value);
                Ok(true)
            }
        }
    }

    /// Returns `false` when the item was not present.
    pub fn remove(&mut self, value: &Value) -> Result<bool, Exception> {
        Ok(self.items.shift_remove(&value.hash_key()?).is_some())
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn values(&self) -> Vec<Value> {
        self.items.values().cloned().collect()
    }

    pub fn union(&self, other: &Set) -> Set {
        let mut out = self.clone();
        for (key, value) in &other.items {
            out.items.entry(key.clone()).or_insert_with(|| value.clone());
        }
        out
    }

    pub fn intersection(&self, other: &Set) -> Set {
        self.filtered(|key| other.items.contains_key(key))
    }

    pub fn difference(&self, other: &Set) -> Set {
        self.filtered(|key| !other.items.contains_key(key))
    }

    pub fn symmetric_difference(&self, other: &Set) -> Set {
        self.difference(other).union(&other.difference(self))
    }

    fn filtered(&self, keep: impl Fn(&HashKey) -> bool) -> Set {
        Set {
            items: self
                .items
                .iter()
                .filter(|(key, _)| keep(key))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        }
    }
}

impl Value {
    pub fn str(s: impl Into<Rc<str>>) -> Self {
        Self::Str(s.into())
    }

    pub fn list(items: Vec<Value>) -> Self {
        Self::List(Rc::new(RefCell::new(items)))
    }

    pub fn tuple(items: Vec<Value>) -> Self {
        Self::Tuple(Rc::new(items))
    }

    pub fn dict(dict: Dict) -> Self {
        Self::Dict(Rc::new(RefCell::new(dict)))
    }

    /// Builds a set value, dropping duplicates.
    pub fn set(items: Vec<Value>) -> Result<Self, Exception> {
        Set::from_values(items).map(Self::from_set)
    }

    pub fn from_set(set: Set) -> Self {
        Self::Set(Rc::new(RefCell::new(set)))
    }

    /// Wraps an integer, demoting it to `Int` when it fits.
    pub fn from_bigint(value: BigInt) -> Self {
        match value.to_i64() {
            Some(i) => Self::Int(i),
            None => Self::BigInt(Rc::new(value)),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::None => "NoneType",
            Self::Bool(_) => "bool",
            Self::Int(_) | Self::BigInt(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
            Self::List(_) => "list",
            Self::Tuple(_) => "tuple",
            Self::Dict(_) => "dict",
            Self::Set(_) => "set",
            Self::Range { .. } => "range",
            Self::Function(_) => "function",
            Self::Builtin(_) | Self::MathFn(_) => "builtin_function_or_method",
            Self::BoundMethod(_) => "method",
            Self::Module(_) => "module",
            Self::ExcClass(_) | Self::Type(_) => "type",
            Self::Exception(exc) => exc.exc_type.into(),
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Self::None => false,
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::BigInt(_) => true,
            Self::Float(f) => *f != 0.0,
            Self::Str(s) => !s.is_empty(),
            Self::List(items) => !items.borrow().is_empty(),
            Self::Set(items) => !items.borrow().is_empty(),
            Self::Tuple(items) => !items.is_empty(),
            Self::Dict(d) => !d.borrow().is_empty(),
            Self::Range { start, stop, step } => range_len(*start, *stop, *step) > 0,
            _ => true,
        }
    }

    /// `i64` view of ints and bools; `None` for big ints.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    /// Arbitrary-precision view of any int or bool.
    pub fn as_bigint(&self) -> Option<BigInt> {
        match self {
            Self::BigInt(b) => Some(b.as_ref().clone()),
            other => other.as_int().map(BigInt::from),
        }
    }

    /// Float view of any real number. Big ints beyond `f64` range come out infinite;
    /// arithmetic goes through [`num::float_of`] instead, which raises.
    #[allow(clippy::cast_precision_loss)]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::BigInt(b) => b.to_f64(),
            other => other.as_int().map(|i| i as f64),
        }
    }

    pub fn is_int(&self) -> bool {
        matches!(self, Self::Int(_) | Self::Bool(_) | Self::BigInt(_))
    }

    pub fn is_number(&self) -> bool {
        self.is_int() || matches!(self, Self::Float(_))
    }

    pub(crate) fn hash_key(&self) -> Result<HashKey, Exception> {
        Ok(match self {
            Self::None => HashKey::None,
            Self::Bool(b) => HashKey::Int(i64::from(*b)),
            Self::Int(i) => HashKey::Int(*i),
            Self::BigInt(b) => HashKey::BigInt(Rc::clone(b)),
            Self::Float(f) if f.is_finite() && f.fract() == 0.0 => match BigInt::from_f64(*f).map(Self::from_bigint) {
                Some(Self::Int(i)) => HashKey::Int(i),
                Some(Self::BigInt(b)) => HashKey::BigInt(b),
                _ => HashKey::Float(f.to_bits()),
            },
            Self::Float(f) => HashKey::Float(f.to_bits()),
            Self::Str(s) => HashKey::Str(Rc::clone(s)),
            Self::Tuple(items) => HashKey::Tuple(items.iter().map(Self::hash_key).collect::<Result<_, _>>()?),
            Self::Range { start, stop, step } => HashKey::Range(*start, *stop, *step),
            Self::Builtin(b) => HashKey::Named("builtin", b.name()),
            Self::MathFn(m) => HashKey::Named("math", (*m).into()),
            Self::Module(name) => HashKey::Named("module", *name),
            Self::ExcClass(t) => HashKey::Named("exception", (*t).into()),
            Self::Type(name) => HashKey::Named("type", *name),
            Self::Function(f) => HashKey::Identity(Rc::as_ptr(f) as usize),
            Self::Exception(e) => HashKey::Identity(Rc::as_ptr(e) as usize),
            Self::BoundMethod(m) => HashKey::Identity(Rc::as_ptr(m) as usize),
            Self::List(_) | Self::Dict(_) | Self::Set(_) => {
                return Err(type_error(format!("unhashable type: '{}'", self.type_name())));
            }
        })
    }

    /// `str(value)`.
    pub fn py_str(&self) -> String {
        match self {
            Self::Str(s) => s.to_string(),
            Self::Exception(exc) => exc.message.clone(),
            other => other.py_repr(),
        }
    }

    /// `repr(value)`.
    pub fn py_repr(&self) -> String {
        let mut out = String::new();
        self.write_repr(&mut out, 0);
        out
    }

    fn write_repr(&self, out: &mut String, depth: usize) {
        if depth > MAX_REPR_DEPTH {
            out.push_str("...");
            return;
        }
        match self {
            Self::None => out.push_str("None"),
            Self::Bool(true) => out.push_str("True"),
            Self::Bool(false) => out.push_str("False"),
            Self::Int(i) => {
                let _ = write!(out, "{i}");
            }
            Self::BigInt(b) => {
                let _ = write!(out, "{b}");
            }
            Self::Float(f) => out.push_str(&float_repr(*f)),
            Self::Str(s) => out.push_str(&str_repr(s)),
            Self::List(items) => {
                write_seq(out, "[", "]", &items.borrow(), depth, false);
            }
            Self::Tuple(items) => write_seq(out, "(", ")", items, depth, items.len() == 1),
            Self::Set(items) => {
                let items = items.borrow();
                if items.is_empty() {
                    out.push_str("set()");
                } else {
                    write_seq(out, "{", "}", &items.values(), depth, false);
                }
            }
            Self::Dict(d) => {
                out.push('{');
                for (i, (k, v)) in d.borrow().pairs().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    k.write_repr(out, depth + 1);
                    out.push_str(": ");
                    v.write_repr(out, depth + 1);
                }
                out.push('}');
            }
            Self::Range { start, stop, step } => {
                if *step == 1 {
                    let _ = write!(out, "range({start}, {stop})");
                } else {
                    let _ = write!(out, "range({start}, {stop}, {step})");
                }
            }
            Self::Function(f) => {
                let _ = write!(out, "<function {}>", f.def.name);
            }
            Self::Builtin(b) if b.type_name().is_some() => {
                let _ = write!(out, "<class '{}'>", b.name());
            }
            Self::Builtin(b) => {
                let _ = write!(out, "<built-in function {}>", b.name());
            }
            Self::MathFn(m) => {
                let name: &'static str = m.into();
                let _ = write!(out, "<built-in function {name}>");
            }
            Self::BoundMethod(m) => {
                let _ = write!(out, "<built-in method {} of {} object>", m.name, m.receiver.type_name());
            }
            Self::Module(name) => {
                let _ = write!(out, "<module '{name}'>");
            }
            Self::ExcClass(t) => {
                let _ = write!(out, "<class '{t}'>");
            }
            Self::Type(name) => {
                let _ = write!(out, "<class '{name}'>");
            }
            Self::Exception(exc) => {
                let _ = write!(out, "{}({})", exc.exc_type, str_repr(&exc.message));
            }
        }
    }

    /// `==` semantics: numbers compare across int/float/bool, containers element-wise.
    pub fn py_eq(&self, other: &Self) -> bool {
        self.eq_depth(other, 0)
    }

    fn eq_depth(&self, other: &Self, depth: usize) -> bool {
        if depth > MAX_REPR_DEPTH {
            return false;
        }
        match (self, other) {
            (Self::None, Self::None) => true,
            (Self::Str(a), Self::Str(b)) => a == b,
            (a, b) if a.is_number() && b.is_number() => num::compare(a, b) == Some(Ordering::Equal),
            (Self::List(a), Self::List(b)) => {
                Rc::ptr_eq(a, b) || seq_eq(&a.borrow(), &b.borrow(), depth)
            }
            (Self::Tuple(a), Self::Tuple(b)) => seq_eq(a, b, depth),
            (Self::Set(a), Self::Set(b)) => {
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len() && a.items.keys().all(|key| b.items.contains_key(key))
            }
            (Self::Dict(a), Self::Dict(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len()
                    && a.entries.iter().all(|(key, (_, v))| {
                        b.entries
                            .get(key)
                            .is_some_and(|(_, v2)| v.eq_depth(v2, depth + 1))
                    })
            }
            (
                Self::Range { start, stop, step },
                Self::Range {
                    start: s2,
                    stop: e2,
                    step: st2,
                },
            ) => start == s2 && stop == e2 && step == st2,
            (Self::Function(a), Self::Function(b)) => Rc::ptr_eq(a, b),
            (Self::Builtin(a), Self::Builtin(b)) => a == b,
            (Self::MathFn(a), Self::MathFn(b)) => a == b,
            (Self::Module(a), Self::Module(b)) | (Self::Type(a), Self::Type(b)) => a == b,
            (Self::ExcClass(a), Self::ExcClass(b)) => a == b,
            (Self::Exception(a), Self::Exception(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// `is` semantics. Immutable scalars compare by value.
    pub fn py_is(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::List(a), Self::List(b)) => Rc::ptr_eq(a, b),
            (Self::Set(a), Self::Set(b)) => Rc::ptr_eq(a, b),
            (Self::Dict(a), Self::Dict(b)) => Rc::ptr_eq(a, b),
            (Self::Tuple(a), Self::Tuple(b)) => Rc::ptr_eq(a, b),
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Bool(_), _) | (_, Self::Bool(_)) => false,
            (Self::Float(_), Self::Int(_) | Self::BigInt(_)) | (Self::Int(_) | Self::BigInt(_), Self::Float(_)) => false,
            _ => self.py_eq(other),
        }
    }

    /// Ordering for `<`, `sorted()`, `min()` and `max()`.
    pub fn py_cmp(&self, other: &Self, op: &str) -> Result<Ordering, Exception> {
        match (self, other) {
            (a, b) if a.is_number() && b.is_number() => Ok(num::compare(a, b).unwrap_or(Ordering::Equal)),
            (Self::Str(a), Self::Str(b)) => Ok(a.cmp(b)),
            (Self::List(a), Self::List(b)) => {
                let (a, b) = (a.borrow().clone(), b.borrow().clone());
                seq_cmp(&a, &b, op)
            }
            (Self::Tuple(a), Self::Tuple(b)) => seq_cmp(a, b, op),
            _ => Err(type_error(format!(
                "'{op}' not supported between instances of '{}' and '{}'",
                self.type_name(),
                other.type_name()
            ))),
        }
    }
}

fn write_seq(out: &mut String, open: &str, close: &str, items: &[Value], depth: usize, trailing_comma: bool) {
    out.push_str(open);
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        item.write_repr(out, depth + 1);
    }
    if trailing_comma {
        out.push(',');
    }
    out.push_str(close);
}

fn seq_eq(a: &[Value], b: &[Value], depth: usize) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.eq_depth(y, depth + 1))
}

fn seq_cmp(a: &[Value], b: &[Value], op: &str) -> Result<Ordering, Exception> {
    for (x, y) in a.iter().zip(b) {
        if !x.py_eq(y) {
            return x.py_cmp(y, op);
        }
    }
    Ok(a.len().cmp(&b.len()))
}

/// Python's `repr()` of a string: single quotes unless the text contains one.
pub fn str_repr(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') { '"' } else { '\'' };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

/// Number of items in a range. Wider than `i64` because `stop - start` may not fit.
pub fn range_len(start: i64, stop: i64, step: i64) -> i128 {
    let (start, stop, step) = (i128::from(start), i128::from(stop), i128::from(step));
    if step > 0 && start < stop {
        (stop - start - 1) / step + 1
    } else if step < 0 && start > stop {
        (start - stop - 1) / (-step) + 1
    } else {
        0
    }
}

/// `range(start, stop, step)[index]`, with Python's negative indexing.
pub fn range_item(start: i64, stop: i64, step: i64, index: i64) -> Option<i64> {
    let len = range_len(start, stop, step);
    let index = i128::from(index);
    let resolved = if index < 0 { index + len } else { index };
    if !(0..len).contains(&resolved) {
        return None;
    }
    i64::try_from(i128::from(start) + resolved * i128::from(step)).ok()
}

/// `value in range(start, stop, step)`.
pub fn range_contains(start: i64, stop: i64, step: i64, value: i64) -> bool {
    let inside = if step > 0 {
        start <= value && value < stop
    } else {
        stop < value && value <= start
    };
    inside && (i128::from(value) - i128::from(start)) % i128::from(step) == 0
}

/// Resolves a possibly negative index against `len`.
pub fn normalize_index(index: i64, len: usize) -> Option<usize> {
    let len = i64::try_from(len).ok()?;
    let resolved = if index < 0 { index + len } else { index };
    if (0..len).contains(&resolved) {
        usize::try_from(resolved).ok()
    } else {
        None
    }
}

/// Python slice semantics: returns the selected indices in order.
pub fn slice_indices(
    len: usize,
    lower: Option<i64>,
    upper: Option<i64>,
    step: Option<i64>,
) -> Result<Vec<usize>, Exception> {
    let step = step.unwrap_or(1);
    if step == 0 {
        return Err(Exception::new(ExcType::ValueError, "slice step cannot be zero"));
    }
    let len = i64::try_from(len).unwrap_or(i64::MAX);
    let clamp = |v: i64, lo: i64, hi: i64| v.max(lo).min(hi);
    let resolve = |v: i64| if v < 0 { v + len } else { v };

    let mut out = Vec::new();
    if step > 0 {
        let start = lower.map_or(0, |v| clamp(resolve(v), 0, len));
        let stop = upper.map_or(len, |v| clamp(resolve(v), 0, len));
        let mut i = start;
        while i < stop {
            out.push(usize::try_from(i).unwrap_or(0));
            i += step;
        }
    } else {
        let start = lower.map_or(len - 1, |v| clamp(resolve(v), -1, len - 1));
        let stop = upper.map_or(-1, |v| clamp(resolve(v), -1, len - 1));
        let mut i = start;
        while i > stop {
            out.push(usize::try_from(i).unwrap_or(0));
            i += step;
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repr_matches_python() {
        let v = Value::list(vec![
            Value::Int(1),
            Value::Float(2.0),
            Value::str("it's"),
            Value::None,
            Value::tuple(vec![Value::Bool(true)]),
        ]);
        assert_eq!(v.py_repr(), "[1, 2.0, \"it's\", None, (True,)]");
        assert_eq!(Value::str("hi").py_str(), "hi");
        assert_eq!(Value::str("hi").py_repr(), "'hi'");
    }

    #[test]
    fn numbers_compare_across_types() {
        assert!(Value::Int(1).py_eq(&Value::Float(1.0)));
        assert!(Value::Bool(true).py_eq(&Value::Int(1)));
        assert!(!Value::Int(1).py_eq(&Value::str("1")));
        assert_eq!(
            Value::Int(2).py_cmp(&Value::Float(2.5), "<").expect("cmp"),
            Ordering::Less
        );
        assert!(Value::Int(1).py_cmp(&Value::str("a"), "<").is_err());
    }

    #[test]
    fn self_referencing_list_does_not_recurse_forever() {
        let list = Value::list(Vec::new());
        if let Value::List(items) = &list {
            items.borrow_mut().push(list.clone());
        }
        assert!(list.py_repr().contains("..."));
    }

    #[test]
    fn slices_follow_python_rules() {
        assert_eq!(slice_indices(5, Some(1), Some(3), None).expect("slice"), vec![1, 2]);
        assert_eq!(slice_indices(5, None, None, Some(-1)).expect("slice"), vec![4, 3, 2, 1, 0]);
        assert_eq!(slice_indices(5, Some(-2), None, None).expect("slice"), vec![3, 4]);
        assert!(slice_indices(5, None, None, Some(0)).is_err());
        assert_eq!(normalize_index(-1, 3), Some(2));
        assert_eq!(normalize_index(3, 3), None);
        assert_eq!(range_len(0, 10, 3), 4);
        assert_eq!(range_len(10, 0, -2), 5);
    }

    #[test]
    fn extreme_ranges_do_not_overflow() {
        let (lo, hi) = (-i64::MAX, i64::MAX);
        assert_eq!(range_len(lo, hi, 1), 2 * i128::from(i64::MAX));
        assert_eq!(range_len(hi, lo, i64::MIN), 2);
        assert_eq!(range_item(lo, hi, 1, -1), Some(i64::MAX - 1));
        assert_eq!(range_item(hi, lo, -1, 0), Some(hi));
        assert_eq!(range_item(0, 3, 1, 3), None);
        assert!(range_contains(lo, hi, 1, hi - 1));
        assert!(range_contains(hi, lo, -3, hi - 3));
        assert!(!range_contains(lo, hi, 2, hi - 1));
        assert!(!range_contains(hi, lo, i64::MIN, lo));
    }

    #[test]
    fn unhashable_keys_are_rejected() {
        let mut dict = Dict::default();
        let err = dict.insert(Value::list(Vec::new()), Value::None).unwrap_err();
        assert_eq!(err.message, "unhashable type: 'list'");
        let nested = Value::tuple(vec![Value::Int(1), Value::list(Vec::new())]);
        assert!(Set::default().insert(nested).is_err());
    }

    #[test]
    fn equal_numbers_share_a_key() {
        let mut dict = Dict::default();
        dict.insert(Value::Int(1), Value::str("int")).expect("insert");
        dict.insert(Value::Float(1.0), Value::str("float")).expect("insert");
        dict.insert(Value::Bool(true), Value::str("bool")).expect("insert");
        assert_eq!(dict.len(), 1);
        assert_eq!(Value::dict(dict).py_repr(), "{1: 'bool'}");
        let big = Value::from_bigint(BigInt::from(2).pow(70));
        let mut set = Set::from_values(vec![big.clone(), Value::Float(2f64.powi(70))]).expect("set");
        assert_eq!(set.len(), 1);
        assert!(set.contains(&Value::Float(2f64.powi(70))).expect("contains"));
        assert!(set.remove(&big).expect("remove"));
        assert!(set.is_empty());
    }

    #[test]
    fn dicts_keep_insertion_order_after_removal() {
        let mut dict = Dict::default();
        for (i, key) in ["c", "a", "b"].into_iter().enumerate() {
            dict.insert(Value::str(key), Value::Int(i64::try_from(i).expect("index"))).expect("insert");
        }
        dict.remove(&Value::str("c")).expect("remove");
        dict.insert(Value::str("c"), Value::Int(9)).expect("insert");
        assert_eq!(Value::dict(dict).py_repr(), "{'a': 1, 'b': 2, 'c': 9}");
    }

    #[test]
    fn big_ints_are_normalized() {
        assert!(matches!(Value::from_bigint(BigInt::from(5)), Value::Int(5)));
        let big = Value::from_bigint(BigInt::from(i64::MAX) + 1);
        assert!(matches!(big, Value::BigInt(_)));
        assert!(big.py_eq(&Value::Float(9_223_372_036_854_775_808.0)));
        assert_eq!(big.py_cmp(&Value::Int(i64::MAX), "<").expect("cmp"), Ordering::Greater);
    }
}
