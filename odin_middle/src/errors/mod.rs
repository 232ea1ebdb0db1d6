//! User-facing diagnostics.
//!
//! The checker never stops at the first problem: every error and warning
//! is collected in [`Diagnostics`] and checking carries on with an invalid
//! operand or type in place of the broken one. The driver decides what to
//! do with the collection afterwards.

mod builder;
mod span;

pub use self::builder::DiagnosticBuilder;
pub use self::span::Span;

use std::fmt;

use crate::ast::{FileId, Program, TokenPos};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Level {
    ICE,
    Error,
    Warning,
    Help,
    Info,
    Note,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let res = match self {
            Level::ICE => "internal compiler error",
            Level::Error => "error",
            Level::Warning => "warning",
            Level::Help => "help",
            Level::Info => "info",
            Level::Note => "note",
        };

        f.write_str(res)
    }
}

/// Source text of one file, for rendering snippets.
pub struct DiagnosticsContext<'src> {
    source: &'src str,
    origin: Option<String>,
    color: bool,
}

impl<'src> DiagnosticsContext<'src> {
    pub fn new(source: &'src str, origin: Option<String>) -> Self {
        Self {
            source,
            origin,
            color: true,
        }
    }

    pub fn without_color(mut self) -> Self {
        self.color = false;
        self
    }

    pub fn build(&self, level: Level, message: impl ToString) -> DiagnosticBuilder<'_, 'src> {
        DiagnosticBuilder::new(message.to_string(), level, self)
    }

    pub fn build_span(&self, level: Level, span: Span, message: impl ToString) -> DiagnosticBuilder<'_, 'src> {
        self.build(level, message).span_label(span, "")
    }
}

/// A secondary position attached to a diagnostic, such as the other
/// declaration of a redeclared name.
#[derive(Clone, Debug, PartialEq)]
pub struct Note {
    pub path: String,
    pub pos: TokenPos,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Diagnostic {
    pub level: Level,
    pub path: String,
    pub pos: TokenPos,
    pub message: String,
    pub notes: Vec<Note>,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}:{}) {}", self.path, self.pos.line, self.pos.column, self.message)?;

        for note in &self.notes {
            write!(
                f,
                "\n\t{} at {}({}:{})",
                note.message, note.path, note.pos.line, note.pos.column
            )?;
        }

        Ok(())
    }
}

#[derive(Clone, Debug, Default)]
pub struct Diagnostics {
    paths: Vec<String>,
    list: Vec<Diagnostic>,
    error_count: usize,
    warning_count: usize,
}

impl Diagnostics {
    /// `paths[i]` is the full path of the file with id `i`.
    pub fn new(paths: Vec<String>) -> Self {
        Self {
            paths,
            ..Self::default()
        }
    }

    pub fn path(&self, file: FileId) -> &str {
        self.paths.get(file.index()).map_or("", String::as_str)
    }

    fn push(&mut self, level: Level, pos: TokenPos, message: String, notes: Vec<(TokenPos, String)>) {
        match level {
            Level::ICE | Level::Error => self.error_count += 1,
            Level::Warning => self.warning_count += 1,
            _ => {},
        }

        let notes = notes
            .into_iter()
            .map(|(pos, message)| Note {
                path: self.path(pos.file).to_owned(),
                pos,
                message,
            })
            .collect();

        let diagnostic = Diagnostic {
            level,
            path: self.path(pos.file).to_owned(),
            pos,
            message,
            notes,
        };

        odin_log::debug!("{}", diagnostic);
        self.list.push(diagnostic);
    }

    pub fn error(&mut self, pos: TokenPos, message: impl ToString) {
        self.push(Level::Error, pos, message.to_string(), Vec::new());
    }

    pub fn error_with_note(&mut self, pos: TokenPos, message: impl ToString, other: TokenPos, note: impl ToString) {
        self.push(
            Level::Error,
            pos,
            message.to_string(),
            vec![(other, note.to_string())],
        );
    }

    /// An error followed by several notes, such as the edges of a
    /// declaration cycle.
    pub fn error_with_notes(&mut self, pos: TokenPos, message: impl ToString, notes: Vec<(TokenPos, String)>) {
        self.push(Level::Error, pos, message.to_string(), notes);
    }

    pub fn warning(&mut self, pos: TokenPos, message: impl ToString) {
        self.push(Level::Warning, pos, message.to_string(), Vec::new());
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    pub fn warning_count(&self) -> usize {
        self.warning_count
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.list.iter()
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.list.iter().filter(|d| d.level == Level::Error)
    }

    /// Prints every diagnostic to stderr, with a source snippet for files
    /// whose text is available.
    pub fn emit_all(&self, program: &Program) {
        for diagnostic in &self.list {
            let source = program.file(diagnostic.pos.file).and_then(|f| f.source.as_deref());

            let source = match source {
                Some(source) => source,
                None => {
                    eprintln!("{}", diagnostic);
                    continue;
                },
            };

            let ctx = DiagnosticsContext::new(source, Some(diagnostic.path.clone()));
            let mut builder = ctx.build_span(diagnostic.level, Span::at(&diagnostic.pos), "");
            for note in &diagnostic.notes {
                builder = if note.pos.file == diagnostic.pos.file {
                    builder.note_label(Span::at(&note.pos), &note.message)
                } else {
                    builder.note(format!(
                        "{} at {}({}:{})",
                        note.message, note.path, note.pos.line, note.pos.column
                    ))
                };
            }

            eprintln!("{}", diagnostic);
            builder.emit();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(line: u32, column: u32, offset: usize) -> TokenPos {
        TokenPos::new(FileId::new(0), line, column, offset)
    }

    #[test]
    fn counts_and_format() {
        let mut diags = Diagnostics::new(vec!["main.odin".to_owned()]);
        diags.error_with_note(
            pos(3, 1, 20),
            "Redeclaration of `x` in this scope",
            pos(1, 1, 0),
            "other declaration",
        );
        diags.warning(pos(4, 2, 30), "Unused variable `y`");

        assert_eq!(diags.error_count(), 1);
        assert_eq!(diags.warning_count(), 1);

        let first = diags.iter().next().unwrap().to_string();
        assert_eq!(
            first,
            "main.odin(3:1) Redeclaration of `x` in this scope\n\tother declaration at main.odin(1:1)"
        );
    }

    #[test]
    fn snippet_rendering() {
        let source = "x := 1\nx := 2\n";
        let ctx = DiagnosticsContext::new(source, Some("main.odin".to_owned())).without_color();
        let res = ctx
            .build_span(Level::Error, Span::new(7, 1), "Redeclaration of `x` in this scope")
            .note_label(Span::new(0, 1), "other declaration")
            .note("declarations in one scope must have distinct names")
            .render();

        assert!(res.contains("Redeclaration of `x` in this scope"));
        assert!(res.contains("main.odin"));
        assert!(res.contains("other declaration"));
    }

    #[test]
    fn out_of_range_spans_do_not_panic() {
        let ctx = DiagnosticsContext::new("ab", None).without_color();
        let res = ctx.build_span(Level::Warning, Span::new(10, 3), "far away").render();
        assert!(res.contains("far away"));
    }
}
