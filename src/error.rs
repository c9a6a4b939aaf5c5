use ariadne::{Color, Fmt, Label, Report, ReportKind, Source};
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn single(pos: usize) -> Self {
        Self {
            start: pos,
            end: pos + 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexErrorKind {
    UnexpectedCharacter,
    UnterminatedString,
    NumberParseFailure,
    InconsistentIndentation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    UnexpectedToken,
    InvalidAssignmentTarget,
    MissingBlockDelimiter,
    InvalidStateTransition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeErrorKind {
    UndefinedVariable,
    TypeMismatch,
    ArityMismatch,
    InvalidScenarioContext,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Lex(LexErrorKind),
    Parse(ParseErrorKind),
    Runtime(RuntimeErrorKind),
}

/// A fault from any of the three pipeline stages. Carries both a byte span
/// (for ariadne reports) and a line/column pair (for the plain
/// `file:line:column message` rendering on the error stream).
#[derive(Debug, Clone, PartialEq)]
pub struct FableError {
    pub kind: ErrorKind,
    pub span: Span,
    pub line: usize,
    pub column: usize,
    pub message: String,
    pub help: Option<String>,
}

impl FableError {
    pub fn new(kind: ErrorKind, span: Span, line: usize, column: usize, message: String) -> Self {
        Self {
            kind,
            span,
            line,
            column,
            message,
            help: None,
        }
    }

    pub fn with_help(mut self, help: String) -> Self {
        self.help = Some(help);
        self
    }

    pub fn lex(kind: LexErrorKind, span: Span, line: usize, column: usize, message: String) -> Self {
        Self::new(ErrorKind::Lex(kind), span, line, column, message)
    }

    pub fn parse(
        kind: ParseErrorKind,
        span: Span,
        line: usize,
        column: usize,
        message: String,
    ) -> Self {
        Self::new(ErrorKind::Parse(kind), span, line, column, message)
    }

    pub fn runtime(
        kind: RuntimeErrorKind,
        span: Span,
        line: usize,
        column: usize,
        message: String,
    ) -> Self {
        Self::new(ErrorKind::Runtime(kind), span, line, column, message)
    }

    /// Plain single-line rendering: `<file>:<line>:<column> <message>`.
    pub fn diagnostic(&self, filename: &str) -> String {
        format!("{}:{}:{} {}", filename, self.line, self.column, self.message)
    }

    pub fn report(&self, source: &str, filename: Option<&str>) {
        let filename = filename.unwrap_or("<repl>");

        let color = match self.kind {
            ErrorKind::Lex(_) => Color::Red,
            ErrorKind::Parse(_) => Color::Yellow,
            ErrorKind::Runtime(_) => Color::Magenta,
        };

        let kind_str = match self.kind {
            ErrorKind::Lex(_) => "Lexical Error",
            ErrorKind::Parse(_) => "Parse Error",
            ErrorKind::Runtime(_) => "Runtime Error",
        };

        // Spans from synthetic tokens can sit one past the end of the source.
        let end = self.span.end.min(source.len());
        let start = self.span.start.min(end);

        let mut report_builder = Report::build(ReportKind::Error, filename, start)
            .with_message(format!("{}: {}", kind_str.fg(color), self.message))
            .with_label(
                Label::new((filename, start..end))
                    .with_message(&self.message)
                    .with_color(color),
            );

        if let Some(ref help_text) = self.help {
            report_builder =
                report_builder.with_note(format!("{}: {}", "help".fg(Color::Cyan), help_text));
        }

        let _ = report_builder
            .finish()
            .eprint((filename, Source::from(source)));

        if let ErrorKind::Runtime(_) = self.kind {
            eprintln!("[line {}]", self.line);
        }
    }
}

impl fmt::Display for FableError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{} {}", self.line, self.column, self.message)
    }
}

impl std::error::Error for FableError {}
