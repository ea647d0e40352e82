use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Span { pub start: u32, pub end: u32 }
impl Span {
    pub fn new(start: usize, end: usize) -> Self { Self { start: start as u32, end: end as u32 } }
    pub fn len(&self) -> u32 { self.end.saturating_sub(self.start) }
    pub fn is_empty(&self) -> bool { self.start == self.end }
}


#[derive(Debug, Clone)]
pub struct BazicError(pub String);
impl std::fmt::Display for BazicError { fn fmt(&self, f:&mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "{}", self.0) } }
impl std::error::Error for BazicError {}


pub type Result<T> = std::result::Result<T, BazicError>;


#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity { Error, Warning }

/// One problem found while parsing or analyzing a program. Hosts ship these
/// to editors as-is, hence the serde derives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub line: u32,
    pub column: u32,
    pub offset: u32,
    pub length: u32,
    pub severity: Severity,
    pub message: String,
}

impl Diagnostic {
    pub fn error(line: u32, column: u32, offset: u32, length: u32, message: impl Into<String>) -> Self {
        Self { line, column, offset, length, severity: Severity::Error, message: message.into() }
    }
    pub fn warning(line: u32, column: u32, offset: u32, length: u32, message: impl Into<String>) -> Self {
        Self { line, column, offset, length, severity: Severity::Warning, message: message.into() }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sev = match self.severity { Severity::Error => "error", Severity::Warning => "warning" };
        write!(f, "{} at line {}, column {}: {}", sev, self.line, self.column, self.message)
    }
}
