//! Subject and body rendering.
//!
//! Templates are minijinja sources rendered against a
//! [`NotificationContext`]. Undefined variables are errors, so a typo in a
//! custom template fails loudly instead of rendering blanks.

use super::context::NotificationContext;
use crate::config::NotifyConfig;
use crate::{Error, Result};
use minijinja::{Environment, UndefinedBehavior};
use std::path::Path;

/// Default subject template.
pub const DEFAULT_SUBJECT_TEMPLATE: &str = "JS_ERROR: {{ message }}";

/// Default body template.
pub const DEFAULT_BODY_TEMPLATE: &str = "## {{ message }}

Where:      {{ line }} in {{ url }}
UserAgent:  {{ user_agent }}
When:       {{ when }}
On Page:    {{ page }}
Date:       {{ created_at }}
RemoteAddr: {{ remote_addr }}
UserID:     {{ user_id }}
SessionKey: {{ session_key }}

{% for key, value in meta|items %}{{ key }}: {{ value }}
{% endfor %}";

/// Templating collaborator of the dispatcher.
pub trait NotificationRenderer: Send + Sync {
    /// Renders the subject line (before prefixing and trimming).
    ///
    /// # Errors
    ///
    /// Returns [`Error::RenderFailed`] if the template cannot be rendered.
    fn render_subject(&self, ctx: &NotificationContext) -> Result<String>;

    /// Renders the body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RenderFailed`] if the template cannot be rendered.
    fn render_body(&self, ctx: &NotificationContext) -> Result<String>;
}

/// minijinja-backed renderer.
///
/// Both templates are compiled once at construction and registered under
/// the names `subject` and `body`.
pub struct TemplateRenderer {
    env: Environment<'static>,
}

impl TemplateRenderer {
    /// Creates a renderer with the built-in templates.
    #[must_use]
    pub fn new() -> Self {
        Self::with_templates(DEFAULT_SUBJECT_TEMPLATE, DEFAULT_BODY_TEMPLATE)
            .unwrap_or_else(|_| unreachable!())
    }

    /// Creates a renderer from template sources.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RenderFailed`] if either template has a syntax error.
    pub fn with_templates(subject: impl Into<String>, body: impl Into<String>) -> Result<Self> {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_keep_trailing_newline(true);

        for (name, source) in [("subject", subject.into()), ("body", body.into())] {
            env.add_template_owned(name, source)
                .map_err(|e| Error::RenderFailed {
                    template: name,
                    cause: e.to_string(),
                })?;
        }
        Ok(Self { env })
    }

    /// Creates a renderer honoring the configured template overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if an override file cannot be read or does not compile.
    pub fn from_config(config: &NotifyConfig) -> Result<Self> {
        let subject = match &config.subject_template {
            Some(path) => read_template(path)?,
            None => DEFAULT_SUBJECT_TEMPLATE.to_string(),
        };
        let body = match &config.body_template {
            Some(path) => read_template(path)?,
            None => DEFAULT_BODY_TEMPLATE.to_string(),
        };
        Self::with_templates(subject, body)
    }

    fn render(&self, name: &'static str, ctx: &NotificationContext) -> Result<String> {
        self.env
            .get_template(name)
            .and_then(|template| template.render(ctx))
            .map_err(|e| {
                tracing::warn!(template = name, error = %e, "Failed to render notification template");
                Error::RenderFailed {
                    template: name,
                    cause: e.to_string(),
                }
            })
    }
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationRenderer for TemplateRenderer {
    fn render_subject(&self, ctx: &NotificationContext) -> Result<String> {
        self.render("subject", ctx)
    }

    fn render_body(&self, ctx: &NotificationContext) -> Result<String> {
        self.render("body", ctx)
    }
}

fn read_template(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| Error::OperationFailed {
        operation: "read_template".to_string(),
        cause: format!("{}: {e}", path.display()),
    })
}
