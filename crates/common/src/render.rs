// Handlebars rendering of decoded updates.

use std::path::Path;

use handlebars::Handlebars;
use thiserror::Error;

use crate::payload::UpdateRecord;

const TEMPLATE_NAME: &str = "update";

#[derive(Debug, Error)]
pub enum TemplateCompileError {
    #[error("failed to read template `{path}`: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid template: {0}")]
    Syntax(#[from] Box<handlebars::TemplateError>),
}

#[derive(Debug, Error)]
#[error("failed to render update: {0}")]
pub struct RenderError(#[from] handlebars::RenderError);

/// A template compiled once and rendered for every update.
///
/// Templates see the record under its PascalCase names: `Title`, `Url`,
/// `ImageUrl`, `TotalEps`, `WatchedEps`, `Rewatching`, `CurrentEpisode.Title`
/// and `CurrentEpisode.Number`.
pub struct TemplateRenderer {
    registry: Handlebars<'static>,
}

impl TemplateRenderer {
    pub fn compile(source: &str) -> Result<Self, TemplateCompileError> {
        let mut registry = Handlebars::new();
        registry.register_template_string(TEMPLATE_NAME, source).map_err(Box::new)?;
        Ok(Self { registry })
    }

    pub fn from_file(path: &Path) -> Result<Self, TemplateCompileError> {
        let source = std::fs::read_to_string(path).map_err(|source| {
            TemplateCompileError::Read { path: path.display().to_string(), source }
        })?;
        Self::compile(&source)
    }

    pub fn render(&self, record: &UpdateRecord) -> Result<String, RenderError> {
        Ok(self.registry.render(TEMPLATE_NAME, record)?)
    }
}

impl std::fmt::Debug for TemplateRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateRenderer").field("template", &TEMPLATE_NAME).finish()
    }
}
