use super::error::{ExcType, Exception};

/// Receives everything a program prints.
///
/// The sandbox collects output in memory; tests and the prelude loader can plug in
/// their own writer.
pub trait PrintWriter {
    /// Appends text produced by `print()` or `input()` prompts.
    fn stdout_write(&mut self, text: &str) -> Result<(), Exception>;

    /// Appends diagnostic text such as tracebacks. Never fails.
    fn stderr_write(&mut self, text: &str);
}

/// In-memory writer with a cap on stdout size.
#[derive(Debug, Default)]
pub struct CollectedOutput {
    stdout: String,
    stderr: String,
    max_stdout_bytes: usize,
}

impl CollectedOutput {
    #[must_use]
    pub fn new(max_stdout_bytes: usize) -> Self {
        Self {
            stdout: String::new(),
            stderr: String::new(),
            max_stdout_bytes,
        }
    }

    pub fn stdout(&self) -> &str {
        &self.stdout
    }

    pub fn stderr(&self) -> &str {
        &self.stderr
    }

    pub fn into_parts(self) -> (String, String) {
        (self.stdout, self.stderr)
    }
}

impl PrintWriter for CollectedOutput {
    fn stdout_write(&mut self, text: &str) -> Result<(), Exception> {
        if self.stdout.len() + text.len() > self.max_stdout_bytes {
            let room = self.max_stdout_bytes.saturating_sub(self.stdout.len());
            let mut cut = room.min(text.len());
            while !text.is_char_boundary(cut) {
                cut -= 1;
            }
            self.stdout.push_str(&text[..cut]);
            return Err(Exception::fatal(
                ExcType::MemoryError,
                format!("output limit exceeded ({} bytes)", self.max_stdout_bytes),
            ));
        }
        self.stdout.push_str(text);
        Ok(())
    }

    fn stderr_write(&mut self, text: &str) {
        self.stderr.push_str(text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stdout_is_capped() {
        let mut out = CollectedOutput::new(8);
        out.stdout_write("hello").expect("fits");
        let err = out.stdout_write(" world").unwrap_err();
        assert_eq!(err.exc_type, ExcType::MemoryError);
        assert!(err.fatal);
        assert_eq!(out.stdout(), "hello wo");
    }
}
