use annotate_snippets::{
    display_list::{DisplayList, FormatOptions},
    snippet::{Annotation, AnnotationType, Slice, Snippet, SourceAnnotation},
};

use super::{span::Span, DiagnosticsContext, Level};

impl From<Level> for AnnotationType {
    fn from(level: Level) -> Self {
        match level {
            Level::ICE | Level::Error => AnnotationType::Error,
            Level::Warning => AnnotationType::Warning,
            Level::Help => AnnotationType::Help,
            Level::Info => AnnotationType::Info,
            Level::Note => AnnotationType::Note,
        }
    }
}

struct Label {
    contents: String,
    level: Level,
    span: Span,
}

/// Renders one diagnostic against a file's source text.
#[must_use = "must emit the diagnostic for it to be seen"]
pub struct DiagnosticBuilder<'ctx, 'src> {
    title: String,
    level: Level,
    labels: Vec<Label>,
    footers: Vec<Label>,
    context: &'ctx DiagnosticsContext<'src>,
}

impl<'ctx, 'src> DiagnosticBuilder<'ctx, 'src> {
    pub(super) fn new(title: String, level: Level, context: &'ctx DiagnosticsContext<'src>) -> Self {
        Self {
            title,
            level,
            labels: Vec::new(),
            footers: Vec::new(),
            context,
        }
    }

    /// Add a label to a highlighted span with the current level.
    pub fn span_label(mut self, span: Span, message: impl ToString) -> Self {
        self.labels.push(Label {
            contents: message.to_string(),
            level: self.level,
            span,
        });
        self
    }

    /// Add a label to a highlighted span with the `Level::Note` level.
    pub fn note_label(mut self, span: Span, message: impl ToString) -> Self {
        self.labels.push(Label {
            contents: message.to_string(),
            level: Level::Note,
            span,
        });
        self
    }

    /// Adds a `note: ...` footer.
    pub fn note(mut self, message: impl ToString) -> Self {
        self.footers.push(Label {
            contents: message.to_string(),
            level: Level::Note,
            span: Span::empty(),
        });
        self
    }

    pub fn render(self) -> String {
        let source = self.context.source;
        let annotations = self
            .labels
            .iter()
            .map(|label| {
                let range = label.span.clamped(source.len());
                SourceAnnotation {
                    label: &label.contents,
                    range: (range.start, range.end),
                    annotation_type: label.level.into(),
                }
            })
            .collect();

        let snippet = Snippet {
            title: Some(Annotation {
                label: Some(&self.title),
                id: None,
                annotation_type: self.level.into(),
            }),

            footer: self
                .footers
                .iter()
                .map(|footer| Annotation {
                    label: Some(&footer.contents),
                    id: None,
                    annotation_type: footer.level.into(),
                })
                .collect(),

            slices: vec![Slice {
                source,
                line_start: 1,
                origin: self.context.origin.as_deref(),
                fold: true,
                annotations,
            }],

            opt: FormatOptions {
                color: self.context.color,
                ..Default::default()
            },
        };

        DisplayList::from(snippet).to_string()
    }

    pub fn emit(self) {
        eprintln!("{}", self.render());
    }
}
