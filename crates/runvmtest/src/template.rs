//! Interpolation of extracted artifact paths into variable templates
//!
//! The only supported action is a field lookup of the form
//! `{{.Files.name}}` (whitespace inside the braces is ignored). Everything
//! outside an action is copied verbatim.

use std::collections::BTreeMap;

use camino::Utf8PathBuf;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";
const FILES_PREFIX: &str = ".Files.";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub(crate) enum TemplateError {
    #[error("unclosed action starting at offset {0}")]
    Unclosed(usize),
    #[error("empty action at offset {0}")]
    EmptyAction(usize),
    #[error("unsupported action {{{{{0}}}}}: only {{{{.Files.<name>}}}} is allowed")]
    UnsupportedAction(String),
    #[error("no file or directory named {0:?}")]
    UnknownName(String),
}

#[derive(Debug, PartialEq, Eq)]
enum Segment<'t> {
    Literal(&'t str),
    File(&'t str),
}

/// A parsed template, borrowing from its source text.
#[derive(Debug)]
pub(crate) struct Template<'t> {
    segments: Vec<Segment<'t>>,
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_alphabetic() || first == '_') && chars.all(|c| c.is_alphanumeric() || c == '_')
}

impl<'t> Template<'t> {
    pub(crate) fn parse(src: &'t str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut offset = 0;
        let mut rest = src;
        while let Some(start) = rest.find(OPEN) {
            if start > 0 {
                segments.push(Segment::Literal(&rest[..start]));
            }
            let action_offset = offset + start;
            let body_and_rest = &rest[start + OPEN.len()..];
            let end = body_and_rest
                .find(CLOSE)
                .ok_or(TemplateError::Unclosed(action_offset))?;
            let body = body_and_rest[..end].trim();
            if body.is_empty() {
                return Err(TemplateError::EmptyAction(action_offset));
            }
            let name = body
                .strip_prefix(FILES_PREFIX)
                .filter(|name| is_identifier(name))
                .ok_or_else(|| TemplateError::UnsupportedAction(body.to_owned()))?;
            segments.push(Segment::File(name));

            let consumed = start + OPEN.len() + end + CLOSE.len();
            offset += consumed;
            rest = &rest[consumed..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest));
        }
        Ok(Self { segments })
    }

    /// Substitute each referenced name with its host path.
    pub(crate) fn render(
        &self,
        files: &BTreeMap<&str, Utf8PathBuf>,
    ) -> Result<String, TemplateError> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(s) => out.push_str(s),
                Segment::File(name) => {
                    let path = files
                        .get(*name)
                        .ok_or_else(|| TemplateError::UnknownName((*name).to_owned()))?;
                    out.push_str(path.as_str());
                }
            }
        }
        Ok(out)
    }
}
