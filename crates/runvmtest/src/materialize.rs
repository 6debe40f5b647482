//! Render variable templates into environment assignments.

use std::fmt::Display;

use color_eyre::eyre::Context;
use color_eyre::Result;
use itertools::Itertools;

use crate::resolve::PendingVar;
use crate::template::Template;

/// A single `NAME=value` environment assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Assignment {
    pub(crate) name: String,
    pub(crate) value: String,
}

impl Display for Assignment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={}", self.name, self.value)
    }
}

/// Render every pending variable, in order.
///
/// Fails on the first malformed template or unresolved name, naming the
/// offending variable.
pub(crate) fn materialize(vars: &[PendingVar]) -> Result<Vec<Assignment>> {
    vars.iter()
        .map(|var| -> Result<Assignment> {
            let name = var.name;
            let tmpl = Template::parse(var.spec.template)
                .with_context(|| format!("invalid {name} template"))?;
            let value = tmpl
                .render(&var.files)
                .with_context(|| format!("failed to substitute {name} template variables"))?;
            Ok(Assignment {
                name: name.to_owned(),
                value,
            })
        })
        .collect()
}

/// Format assignments the way a shell would accept them as a prefix.
pub(crate) fn join(assignments: &[Assignment]) -> String {
    assignments.iter().join(" ")
}
