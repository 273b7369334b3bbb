use std::fmt;

/// Python exception classes the sandbox can raise.
///
/// Names double as the user-visible class names, so the variants are spelled
/// exactly like CPython's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString, strum::IntoStaticStr)]
pub enum ExcType {
    Exception,
    ArithmeticError,
    ZeroDivisionError,
    OverflowError,
    LookupError,
    IndexError,
    KeyError,
    NameError,
    UnboundLocalError,
    TypeError,
    ValueError,
    AttributeError,
    ImportError,
    EOFError,
    RuntimeError,
    RecursionError,
    TimeoutError,
    MemoryError,
    AssertionError,
    StopIteration,
    /// Host-side failure (a bug in the sandbox, never student-raised).
    InternalError,
}

impl ExcType {
    /// True when an `except handler:` clause naming `handler` catches `self`.
    #[must_use]
    pub fn is_subclass_of(self, handler: Self) -> bool {
        if self == handler {
            return true;
        }
        match handler {
            Self::Exception => !matches!(self, Self::InternalError),
            Self::ArithmeticError => matches!(self, Self::ZeroDivisionError | Self::OverflowError),
            Self::LookupError => matches!(self, Self::IndexError | Self::KeyError),
            Self::NameError => matches!(self, Self::UnboundLocalError),
            Self::RuntimeError => matches!(self, Self::RecursionError),
            _ => false,
        }
    }
}

/// A raised Python exception.
#[derive(Debug, Clone, PartialEq)]
pub struct Exception {
    pub exc_type: ExcType,
    pub message: String,
    /// Source line of the statement that raised, filled in while unwinding.
    pub line: Option<u32>,
    /// Resource-limit exceptions cannot be caught by student `except` clauses.
    pub fatal: bool,
}

impl Exception {
    pub fn new(exc_type: ExcType, message: impl Into<String>) -> Self {
        Self {
            exc_type,
            message: message.into(),
            line: None,
            fatal: false,
        }
    }

    pub(crate) fn fatal(exc_type: ExcType, message: impl Into<String>) -> Self {
        Self {
            fatal: true,
            ..Self::new(exc_type, message)
        }
    }

    pub(crate) fn with_line(mut self, line: u32) -> Self {
        if self.line.is_none() {
            self.line = Some(line);
        }
        self
    }

    /// CPython-style traceback text written to stderr.
    #[must_use]
    pub fn traceback(&self) -> String {
        let mut out = String::from("Traceback (most recent call last):\n");
        if let Some(line) = self.line {
            out.push_str(&format!("  line {line}\n"));
        }
        out.push_str(&self.to_string());
        out.push('\n');
        out
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.exc_type)
        } else {
            write!(f, "{}: {}", self.exc_type, self.message)
        }
    }
}

impl std::error::Error for Exception {}

pub(crate) fn type_error(message: impl Into<String>) -> Exception {
    Exception::new(ExcType::TypeError, message)
}

pub(crate) fn value_error(message: impl Into<String>) -> Exception {
    Exception::new(ExcType::ValueError, message)
}

/// Code that does not parse. Carries a 1-based position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    pub message: String,
    pub line: u32,
    pub column: u32,
}

impl SyntaxError {
    pub(crate) fn new(message: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            message: message.into(),
            line,
            column,
        }
    }
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SyntaxError: {} (line {})", self.message, self.line)
    }
}

impl std::error::Error for SyntaxError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exception_hierarchy_matches_python() {
        assert!(ExcType::ZeroDivisionError.is_subclass_of(ExcType::ArithmeticError));
        assert!(ExcType::KeyError.is_subclass_of(ExcType::LookupError));
        assert!(ExcType::ValueError.is_subclass_of(ExcType::Exception));
        assert!(!ExcType::ValueError.is_subclass_of(ExcType::TypeError));
        assert!(!ExcType::InternalError.is_subclass_of(ExcType::Exception));
    }

    #[test]
    fn traceback_names_line_and_type() {
        let exc = Exception::new(ExcType::NameError, "name 'y' is not defined").with_line(3);
        let tb = exc.traceback();
        assert!(tb.starts_with("Traceback (most recent call last):"));
        assert!(tb.contains("line 3"));
        assert!(tb.ends_with("NameError: name 'y' is not defined\n"));
    }
}
