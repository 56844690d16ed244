use codespan_reporting::diagnostic::{Diagnostic, Label};
use codespan_reporting::files::SimpleFiles;
use codespan_reporting::term;
use codespan_reporting::term::termcolor::{ColorChoice, StandardStream};
use evaluator::{Error, ErrorKind};

/// Renders evaluation errors against the loaded sources.
pub struct Reporter {
    writer: StandardStream,
    config: term::Config,
}

impl Reporter {
    pub fn new(no_color: bool) -> Self {
        let color_choice = if no_color {
            ColorChoice::Never
        } else {
            ColorChoice::Auto
        };
        Reporter {
            writer: StandardStream::stderr(color_choice),
            config: term::Config::default(),
        }
    }

    pub fn emit(&self, files: &SimpleFiles<String, String>, error: &Error) {
        for diagnostic in to_diagnostics(files, error) {
            match diagnostic {
                Some(diagnostic) => {
                    let _ = term::emit_to_write_style(
                        &mut self.writer.lock(),
                        &self.config,
                        files,
                        &diagnostic,
                    );
                }
                None => eprintln!("error: {}", error),
            }
        }
    }
}

/// One diagnostic per parse error, otherwise one for the whole error.
/// `None` means the error has no location in any loaded file.
fn to_diagnostics(
    files: &SimpleFiles<String, String>,
    error: &Error,
) -> Vec<Option<Diagnostic<usize>>> {
    if let ErrorKind::Parse(errors) = &error.kind {
        return errors.iter().map(|e| Some(e.to_diagnostic())).collect();
    }
    let Some(range) = &error.range else {
        return vec![None];
    };
    let Some(file_id) = file_id(files, &range.filename) else {
        return vec![None];
    };
    let message = match &error.context {
        Some(context) => format!("{}: {}", context, error.kind),
        None => error.kind.to_string(),
    };
    vec![Some(
        Diagnostic::error()
            .with_message(message)
            .with_labels(vec![Label::primary(file_id, range.bytes())]),
    )]
}

fn file_id(files: &SimpleFiles<String, String>, name: &str) -> Option<usize> {
    use codespan_reporting::files::Files;
    (0..).map_while(|id| files.name(id).ok().map(|n| (id, n))).find_map(
        |(id, n)| (n == name).then_some(id),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use evaluator::{Evaluator, Registry, Variables};
    use std::sync::Arc;

    fn load(sources: &[(&str, &str)]) -> (SimpleFiles<String, String>, Error) {
        let mut files = SimpleFiles::new();
        let mut parsed = Vec::new();
        let mut parse_errors = Vec::new();
        for (name, source) in sources {
            let id = files.add(name.to_string(), source.to_string());
            match sdl::parse(source, name, id) {
                Ok(file) => parsed.push(file),
                Err(errs) => parse_errors.extend(errs),
            }
        }
        if !parse_errors.is_empty() {
            return (files, Error::new(ErrorKind::Parse(parse_errors)));
        }
        let err = Evaluator::with_registry(Arc::new(Registry::default()))
            .eval_resource(&parsed, &Variables::new())
            .unwrap_err();
        (files, err)
    }

    #[test]
    fn located_errors_point_into_their_file() {
        let (files, err) = load(&[("a.hcl", "x = 1\n"), ("b.hcl", "y = var.missing\n")]);
        let diagnostics = to_diagnostics(&files, &err);
        let diagnostic = diagnostics[0].as_ref().unwrap();
        assert_eq!(diagnostic.labels[0].file_id, 1);
        assert!(diagnostic.message.contains("missing"));
    }

    #[test]
    fn each_parse_error_is_reported() {
        let (files, err) = load(&[("a.hcl", "x = \n")]);
        let diagnostics = to_diagnostics(&files, &err);
        assert!(!diagnostics.is_empty());
        assert!(diagnostics.iter().all(Option::is_some));
    }

    #[test]
    fn unlocated_errors_fall_back_to_plain_text() {
        let files = SimpleFiles::new();
        let err = Error::new(ErrorKind::Validation(vec!["bad".into()]));
        assert!(to_diagnostics(&files, &err)[0].is_none());
    }
}
