//! Response templates
//!
//! User-facing reply texts live outside the code in a JSON file of named
//! handlebars templates, so wording can change without a rebuild. Missing
//! keys render as a visible placeholder instead of failing the command.

use crate::error::{JukebirdError, Result};
use handlebars::Handlebars;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

/// Registry of named reply templates.
pub struct Responses {
    handlebars: Handlebars<'static>,
}

impl Responses {
    /// Builds a registry from an in-memory template map.
    pub fn from_map(templates: HashMap<String, String>) -> Result<Self> {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(false);
        handlebars.register_escape_fn(handlebars::no_escape);
        for (name, template) in templates {
            handlebars
                .register_template_string(&name, &template)
                .map_err(|e| JukebirdError::Template(format!("template {name}: {e}")))?;
        }
        Ok(Self { handlebars })
    }

    /// Loads the registry from a JSON file of `name: template` pairs.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            JukebirdError::Template(format!("cannot read responses file {}: {e}", path.display()))
        })?;
        let templates: HashMap<String, String> = serde_json::from_str(&raw).map_err(|e| {
            JukebirdError::Template(format!(
                "malformed responses file {}: {e}",
                path.display()
            ))
        })?;
        info!(templates = templates.len(), file = %path.display(), "response templates loaded");
        Self::from_map(templates)
    }

    /// Renders the named template with the given data. An unknown name
    /// yields a placeholder so the command still answers something.
    pub fn render(&self, name: &str, data: &HashMap<String, Value>) -> String {
        match self.handlebars.render(name, data) {
            Ok(text) => text,
            Err(e) => {
                warn!(template = %name, error = %e, "cannot render response template");
                format!("<missing response: {name}>")
            }
        }
    }

    /// Renders a template that takes no data.
    pub fn render_plain(&self, name: &str) -> String {
        self.render(name, &HashMap::new())
    }
}

/// Shorthand for building the render data map.
pub fn response_data<const N: usize>(pairs: [(&str, &str); N]) -> HashMap<String, Value> {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
        .collect()
}
