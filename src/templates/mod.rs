//! Template engine
//!
//! Pages and emails are tera templates. The stock set is embedded in the
//! binary; files in an optional override directory replace embedded templates
//! of the same name, or add new ones.

use rust_embed::RustEmbed;
use serde::Serialize;
use std::error::Error as StdError;
use std::fs;
use std::path::Path;
use tera::{Context as TeraContext, Tera};

mod error;

pub use error::TemplateError;

#[derive(RustEmbed)]
#[folder = "templates/"]
#[include = "*.html"]
struct EmbeddedTemplates;

/// Site name shown in page titles and emails
pub const SITE_NAME: &str = "Cyclone";

/// Variables every page gets.
pub struct StandardVars<'a, U: Serialize> {
    pub current_user: Option<&'a U>,
    pub request_path: &'a str,
}

/// Renders pages and email bodies.
pub struct TemplateEngine {
    tera: Tera,
}

impl TemplateEngine {
    /// Load embedded templates, then overrides from `override_dir`
    pub fn new(override_dir: Option<&Path>) -> Result<Self, TemplateError> {
        let mut templates: Vec<(String, String)> = Vec::new();
        for name in EmbeddedTemplates::iter() {
            let Some(file) = EmbeddedTemplates::get(&name) else {
                continue;
            };
            let content = String::from_utf8_lossy(&file.data).into_owned();
            templates.push((name.into_owned(), content));
        }

        if let Some(dir) = override_dir {
            let mut overrides = Vec::new();
            collect_templates_from_dir(dir, dir, &mut overrides)?;
            for (name, content) in overrides {
                tracing::debug!("Template override: {}", name);
                templates.retain(|(existing, _)| existing != &name);
                templates.push((name, content));
            }
        }

        let mut tera = Tera::default();
        tera.add_raw_templates(templates)
            .map_err(|e| TemplateError::Render(flatten_error(&e)))?;

        tracing::info!(
            "Loaded {} templates",
            tera.get_template_names().count()
        );
        Ok(Self { tera })
    }

    pub fn has_template(&self, name: &str) -> bool {
        self.tera.get_template_names().any(|n| n == name)
    }

    /// Render a template with context
    pub fn render(&self, template: &str, context: &TeraContext) -> Result<String, TemplateError> {
        if !self.has_template(template) {
            return Err(TemplateError::NotFound(template.to_string()));
        }
        self.tera
            .render(template, context)
            .map_err(|e| TemplateError::Render(format!("Failed to render '{}': {}", template, flatten_error(&e))))
    }

    /// Render with the standard page variables added
    pub fn render_page<U: Serialize>(
        &self,
        template: &str,
        context: &TeraContext,
        vars: &StandardVars<'_, U>,
    ) -> Result<String, TemplateError> {
        let mut full_context = context.clone();
        full_context.insert("site_name", SITE_NAME);
        full_context.insert("request_path", vars.request_path);
        full_context.insert("media_url", "/media/");
        full_context.insert("is_authenticated", &vars.current_user.is_some());
        if let Some(user) = vars.current_user {
            full_context.insert("current_user", user);
        }
        self.render(template, &full_context)
    }
}

/// Last-resort page when no template can be rendered
pub fn simple_error_page(status: u16, message: &str) -> String {
    let mut escaped = String::with_capacity(message.len());
    for c in message.chars() {
        match c {
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '&' => escaped.push_str("&amp;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\"><head><meta charset=\"UTF-8\"><title>{status} | {site}</title></head>\
         <body><h1>{status}</h1><p>{message}</p><p><a href=\"/\">Back to {site}</a></p></body></html>",
        status = status,
        site = SITE_NAME,
        message = escaped
    )
}

fn collect_templates_from_dir(
    base_path: &Path,
    current_path: &Path,
    templates: &mut Vec<(String, String)>,
) -> Result<(), TemplateError> {
    if !current_path.exists() {
        return Ok(());
    }

    for entry in fs::read_dir(current_path)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_templates_from_dir(base_path, &path, templates)?;
        } else if path.extension().is_some_and(|ext| ext == "html") {
            let relative = path
                .strip_prefix(base_path)
                .map_err(|_| TemplateError::Render(format!("Bad template path: {:?}", path)))?;
            let name = relative.to_string_lossy().replace('\\', "/");
            templates.push((name, fs::read_to_string(&path)?));
        }
    }
    Ok(())
}

fn flatten_error(e: &tera::Error) -> String {
    let mut message = e.to_string();
    let mut source = e.source();
    while let Some(s) = source {
        message.push_str(&format!("\n  Caused by: {}", s));
        source = s.source();
    }
    message
}
