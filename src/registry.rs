//! Template registry – validated templates looked up by id.
//!
//! Templates are registered at startup (built-ins plus any JSON template
//! source) and only read afterwards, so a registry can be shared behind an
//! `Arc` by concurrent formatting requests.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{FormatError, TemplateError};
use crate::template::{
    base_rules, builtin_templates, Category, RuleOverride, Template, TemplateSummary,
    STANDARD_BASE,
};

/// Named, validated templates.
#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    templates: BTreeMap<String, Template>,
}

impl TemplateRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in `fiction` and `nonFiction` templates.
    /// Fails if any of them does not validate.
    pub fn with_builtin() -> Result<Self, TemplateError> {
        Self::with_templates(builtin_templates())
    }

    /// A registry holding `templates`, all of which must validate.
    pub fn with_templates(
        templates: impl IntoIterator<Item = Template>,
    ) -> Result<Self, TemplateError> {
        let mut registry = Self::new();
        for template in templates {
            registry.register(template)?;
        }
        Ok(registry)
    }

    /// Validate and add a template. An existing template with the same id is
    /// replaced.
    pub fn register(&mut self, template: Template) -> Result<(), TemplateError> {
        template.validate()?;
        let id = template.id.clone();
        if self.templates.insert(id.clone(), template).is_some() {
            log::info!("template '{id}' replaced");
        } else {
            log::debug!("template '{id}' registered");
        }
        Ok(())
    }

    /// Look up a template. Unknown ids are an error, never a silent default.
    pub fn get(&self, id: &str) -> Result<&Template, FormatError> {
        self.templates.get(id).ok_or_else(|| FormatError::NotFound {
            id: id.to_string(),
        })
    }

    pub fn contains(&self, id: &str) -> bool {
        self.templates.contains_key(id)
    }

    /// Summaries of every registered template, ordered by id.
    pub fn list(&self) -> Vec<TemplateSummary> {
        self.templates.values().map(Template::summary).collect()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Register every template in a JSON template source. Nothing is
    /// registered unless every template in the source is valid.
    pub fn load_json(&mut self, json: &str) -> Result<usize, TemplateError> {
        let source: TemplateSource = serde_json::from_str(json)?;
        let templates = source.into_templates()?;
        for template in &templates {
            template.validate()?;
        }
        let count = templates.len();
        for template in templates {
            self.register(template)?;
        }
        log::info!("loaded {count} templates from template source");
        Ok(count)
    }
}

// ---------------------------------------------------------------------------
// Template source
// ---------------------------------------------------------------------------

/// Static template configuration:
///
/// ```json
/// { "templates": {
///     "poetry": {
///       "name": "Poetry",
///       "description": "Verse collections",
///       "base": "standard",
///       "overrides": { "chapter.paragraph": { "textIndent": "0in" } }
///     } } }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplateSource {
    pub templates: BTreeMap<String, TemplateDefinition>,
}

/// One template in a [`TemplateSource`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Built-in base rule set to derive from.
    #[serde(default = "TemplateDefinition::default_base")]
    pub base: String,
    #[serde(default)]
    pub overrides: BTreeMap<Category, BTreeMap<String, String>>,
}

impl TemplateDefinition {
    fn default_base() -> String {
        STANDARD_BASE.to_string()
    }

    pub fn into_template(self, id: &str) -> Result<Template, TemplateError> {
        let base = base_rules(&self.base).ok_or_else(|| TemplateError::UnknownBase {
            template: id.to_string(),
            base: self.base.clone(),
        })?;
        let overrides = self
            .overrides
            .into_iter()
            .fold(RuleOverride::new(), |o, (category, attributes)| {
                o.patch(category, attributes)
            });
        Ok(Template::derive(
            id,
            self.name,
            self.description,
            &base,
            &overrides,
        ))
    }
}

impl TemplateSource {
    pub fn into_templates(self) -> Result<Vec<Template>, TemplateError> {
        self.templates
            .into_iter()
            .map(|(id, def)| def.into_template(&id))
            .collect()
    }
}
