//! Diagnostics collected while parsing.
//!
//! Parsing never fails outright: unrecognised input is skipped and reported
//! here, and the caller decides whether the result is usable.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    /// 1-based line in the source text
    pub line: usize,
    /// 1-based column in the source text
    pub column: usize,
    pub hint: Option<String>,
}

impl Diagnostic {
    pub fn new(severity: Severity, message: impl Into<String>, line: usize, column: usize) -> Self {
        Diagnostic {
            severity,
            message: message.into(),
            line,
            column,
            hint: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:?} at {}:{}: {}",
            self.severity, self.line, self.column, self.message
        )?;
        if let Some(hint) = &self.hint {
            write!(f, " ({hint})")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    /// Input could not be used; the parser skipped it
    Error,
    /// Parsed with an assumption the author may not have meant
    Warning,
    /// A default was filled in the way the ABC standard prescribes
    Info,
}

/// Position-aware sink the parser reports into.
#[derive(Debug)]
pub(crate) struct Diagnostics {
    items: Vec<Diagnostic>,
    line: usize,
    column: usize,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Diagnostics {
            items: Vec::new(),
            line: 1,
            column: 1,
        }
    }
}

impl Diagnostics {
    pub fn at(&mut self, line: usize, column: usize) -> &mut Self {
        self.line = line;
        self.column = column;
        self
    }

    pub fn error(&mut self, message: impl Into<String>) {
        let d = Diagnostic::new(Severity::Error, message, self.line, self.column);
        self.items.push(d);
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        let d = Diagnostic::new(Severity::Warning, message, self.line, self.column);
        self.items.push(d);
    }

    pub fn info(&mut self, message: impl Into<String>) {
        let d = Diagnostic::new(Severity::Info, message, self.line, self.column);
        self.items.push(d);
    }

    pub fn error_with_hint(&mut self, message: impl Into<String>, hint: impl Into<String>) {
        let d = Diagnostic::new(Severity::Error, message, self.line, self.column).with_hint(hint);
        self.items.push(d);
    }

    pub fn warning_with_hint(&mut self, message: impl Into<String>, hint: impl Into<String>) {
        let d = Diagnostic::new(Severity::Warning, message, self.line, self.column).with_hint(hint);
        self.items.push(d);
    }

    pub fn finish(self) -> Vec<Diagnostic> {
        self.items
    }
}

/// A parsed value together with everything noticed along the way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parsed<T> {
    pub value: T,
    pub diagnostics: Vec<Diagnostic>,
}

impl<T> Parsed<T> {
    pub fn has_errors(&self) -> bool {
        self.errors().next().is_some()
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positions_follow_at() {
        let mut diags = Diagnostics::default();
        diags.warning("missing meter");
        diags.at(5, 10).error("bad key");

        let items = diags.finish();
        assert_eq!(items.len(), 2);
        assert_eq!((items[0].line, items[0].column), (1, 1));
        assert_eq!((items[1].line, items[1].column), (5, 10));
    }

    #[test]
    fn parsed_filters_by_severity() {
        let parsed = Parsed {
            value: (),
            diagnostics: vec![
                Diagnostic::new(Severity::Warning, "w", 1, 1),
                Diagnostic::new(Severity::Error, "e", 2, 1).with_hint("fix it"),
            ],
        };
        assert!(parsed.has_errors());
        assert_eq!(parsed.warnings().count(), 1);
        assert_eq!(parsed.errors().next().unwrap().to_string(), "Error at 2:1: e (fix it)");
    }
}
