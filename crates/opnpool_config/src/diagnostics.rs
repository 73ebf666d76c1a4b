use std::io::Write;
use std::ops::Range;
use std::path::PathBuf;

/// Source information for where a diagnostic came from
#[derive(Debug, Clone)]
pub struct SourceInfo {
    pub file_path: PathBuf,
    pub content: String,
}

/// A diagnostic message that can be either a warning or an error
#[derive(Debug, Clone)]
pub enum Diagnostic {
    Warning(Warning),
    Error(Error),
}

/// Warning messages that don't prevent config loading
#[derive(Debug, Clone)]
pub enum Warning {
    EmptyConfig { file_path: PathBuf },
}

/// Error messages that indicate problems with the config
#[derive(Debug, Clone)]
pub enum Error {
    Merge(MergeError),
    Validation(ValidationError),
    Load(LoadError),
}

/// The same field was set by more than one config file
#[derive(Debug, Clone)]
pub struct MergeError {
    pub field_path: String,
    pub message: String,
    pub conflicts: Vec<MergeConflictLocation>,
}

#[derive(Debug, Clone)]
pub struct MergeConflictLocation {
    pub file_path: PathBuf,
    pub span: Range<usize>,
    pub content: String,
}

/// A value was present but not acceptable
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field_path: String,
    pub message: String,
    pub span: Option<Range<usize>>,
    pub source: Option<SourceInfo>,
}

impl ValidationError {
    /// Build a validation error pointing at `span` inside `source`
    pub fn at(
        field_path: impl Into<String>,
        message: impl Into<String>,
        span: Range<usize>,
        source: &SourceInfo,
    ) -> Self {
        Self {
            field_path: field_path.into(),
            message: message.into(),
            span: Some(span),
            source: Some(source.clone()),
        }
    }
}

/// Error type for config loading failures (parse errors, IO errors, etc.)
///
/// The wrapped errors are kept as strings so diagnostics stay `Clone`.
#[derive(Debug, Clone)]
pub enum LoadError {
    Io { path: PathBuf, error: String },
    Parse { path: PathBuf, error: String },
    ImportCycle { path: PathBuf, cycle: Vec<PathBuf> },
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadError::Io { path, error } => {
                write!(f, "Failed to read config file '{}': {}", path.display(), error)
            }
            LoadError::Parse { path, error } => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), error)
            }
            LoadError::ImportCycle { path, cycle } => write!(
                f,
                "Import cycle detected at '{}': involves {} file(s)",
                path.display(),
                cycle.len()
            ),
        }
    }
}

impl std::error::Error for LoadError {}

/// A collection of diagnostics (warnings and/or errors)
#[derive(Debug, Clone, Default)]
pub struct Diagnostics(pub Vec<Diagnostic>);

impl Diagnostics {
    pub fn has_errors(&self) -> bool {
        self.0.iter().any(Diagnostic::is_error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Warning> {
        self.0.iter().filter_map(|d| match d {
            Diagnostic::Warning(w) => Some(w),
            Diagnostic::Error(_) => None,
        })
    }

    pub fn errors(&self) -> impl Iterator<Item = &Error> {
        self.0.iter().filter_map(|d| match d {
            Diagnostic::Error(e) => Some(e),
            Diagnostic::Warning(_) => None,
        })
    }
}

impl std::fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", format_diagnostics(&self.0))
    }
}

impl std::error::Error for Diagnostics {}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", format_diagnostics(std::slice::from_ref(self)))
    }
}

impl Diagnostic {
    /// Returns true if this diagnostic is an error
    pub fn is_error(&self) -> bool {
        matches!(self, Diagnostic::Error(_))
    }

    /// Returns true if this diagnostic is a warning
    pub fn is_warning(&self) -> bool {
        matches!(self, Diagnostic::Warning(_))
    }
}

/// Format all diagnostics for display using Ariadne, with terminal colors
pub fn format_diagnostics(diagnostics: &[Diagnostic]) -> String {
    render_diagnostics(diagnostics, true)
}

/// Format all diagnostics for display using Ariadne
///
/// With `color` off the output is plain text, which is what logs and tests want.
pub fn render_diagnostics(diagnostics: &[Diagnostic], color: bool) -> String {
    use ariadne::Color;
    use ariadne::Label;
    use ariadne::Report;
    use ariadne::ReportKind;
    use ariadne::Source;

    let config = ariadne::Config::default().with_color(color);
    let paint = |code: &str, text: &str| {
        if color {
            format!("\x1b[{}m{}\x1b[0m", code, text)
        } else {
            text.to_string()
        }
    };

    let mut output = Vec::new();

    for diagnostic in diagnostics {
        match diagnostic {
            Diagnostic::Warning(Warning::EmptyConfig { file_path }) => {
                // ariadne needs a non-empty source to anchor a report
                writeln!(&mut output, "{}: Empty configuration file", paint("33", "Warning")).ok();
                writeln!(&mut output, "  ┌─ {}:1:1", file_path.display()).ok();
                writeln!(&mut output, "  │").ok();
                writeln!(
                    &mut output,
                    "  = Config file '{}' is empty and has no effect",
                    file_path.display()
                )
                .ok();
                writeln!(&mut output).ok();
            }
            Diagnostic::Error(Error::Merge(merge_error)) => {
                let Some(first_conflict) = merge_error.conflicts.first() else {
                    writeln!(
                        &mut output,
                        "{}: Merge conflict in field '{}': {}",
                        paint("31", "Error"),
                        merge_error.field_path,
                        merge_error.message
                    )
                    .ok();
                    continue;
                };

                let mut report = Report::build(
                    ReportKind::Error,
                    (
                        first_conflict.file_path.to_string_lossy().to_string(),
                        first_conflict.span.clone(),
                    ),
                )
                .with_config(config)
                .with_message(format!("Merge conflict in field '{}'", merge_error.field_path))
                .with_note(&merge_error.message);

                for (idx, conflict) in merge_error.conflicts.iter().enumerate() {
                    let label_msg = if idx == 0 {
                        "first definition here"
                    } else {
                        "conflicts with this definition"
                    };

                    report = report.with_label(
                        Label::new((
                            conflict.file_path.to_string_lossy().to_string(),
                            conflict.span.clone(),
                        ))
                        .with_message(label_msg)
                        .with_color(if idx == 0 { Color::Red } else { Color::Yellow }),
                    );
                }

                let finished_report = report.finish();

                // One rendering per distinct file; ariadne only resolves labels
                // against the source it is handed.
                let mut written_files = std::collections::HashSet::new();
                for conflict in &merge_error.conflicts {
                    let file_id = conflict.file_path.to_string_lossy().to_string();
                    if written_files.insert(file_id.clone()) {
                        let source = Source::from(conflict.content.clone());
                        finished_report.write((file_id, source), &mut output).ok();
                    }
                }
            }
            Diagnostic::Error(Error::Validation(validation_error)) => {
                if let (Some(span), Some(source_info)) =
                    (&validation_error.span, &validation_error.source)
                {
                    let file_id = source_info.file_path.to_string_lossy().to_string();
                    let report = Report::build(ReportKind::Error, (file_id.clone(), span.clone()))
                        .with_config(config)
                        .with_message(format!(
                            "Validation error in '{}'",
                            validation_error.field_path
                        ))
                        .with_label(
                            Label::new((file_id.clone(), span.clone()))
                                .with_message(&validation_error.message)
                                .with_color(Color::Red),
                        )
                        .finish();

                    let source = Source::from(source_info.content.clone());
                    report.write((file_id, source), &mut output).ok();
                } else {
                    let file_path = validation_error
                        .source
                        .as_ref()
                        .map(|s| s.file_path.display().to_string())
                        .unwrap_or_else(|| "<unknown>".to_string());

                    writeln!(
                        &mut output,
                        "{}: Validation error in '{}'",
                        paint("31", "Error"),
                        validation_error.field_path
                    )
                    .ok();
                    writeln!(&mut output, "  ┌─ {}:1:1", file_path).ok();
                    writeln!(&mut output, "  │").ok();
                    writeln!(&mut output, "  = {}", validation_error.message).ok();
                    writeln!(&mut output).ok();
                }
            }
            Diagnostic::Error(Error::Load(load_error)) => {
                writeln!(&mut output, "{}: {}", paint("31", "Error"), load_error).ok();
            }
        }
    }

    String::from_utf8_lossy(&output).to_string()
}
