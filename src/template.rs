//! Template model – named collections of typographic rules.
//!
//! A [`RuleSet`] maps a closed set of [`Category`] names to attribute
//! mappings. Templates are built from a base rule set plus a
//! [`RuleOverride`]: each overridden category is patched attribute-by-attribute
//! against the base and the patched category then replaces the base category
//! wholesale, so reading a category never yields a mix of two rule sets.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TemplateError;
use crate::units::Dimension;

/// Id of the template used when a request names an unknown one.
pub const DEFAULT_TEMPLATE_ID: &str = "fiction";

/// Name of the built-in base rule set templates derive from.
pub const STANDARD_BASE: &str = "standard";

/// A style category. Serialized with its dotted name (`chapter.title`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "titlePage.title")]
    TitlePageTitle,
    #[serde(rename = "titlePage.author")]
    TitlePageAuthor,
    #[serde(rename = "chapter.title")]
    ChapterTitle,
    #[serde(rename = "chapter.firstParagraph")]
    ChapterFirstParagraph,
    #[serde(rename = "chapter.paragraph")]
    ChapterParagraph,
    #[serde(rename = "section.title")]
    SectionTitle,
    /// Global defaults overlaid beneath every block category.
    #[serde(rename = "text")]
    Text,
    #[serde(rename = "page.margin")]
    PageMargin,
    #[serde(rename = "page.size")]
    PageSize,
}

impl Category {
    pub const ALL: [Category; 9] = [
        Category::TitlePageTitle,
        Category::TitlePageAuthor,
        Category::ChapterTitle,
        Category::ChapterFirstParagraph,
        Category::ChapterParagraph,
        Category::SectionTitle,
        Category::Text,
        Category::PageMargin,
        Category::PageSize,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Category::TitlePageTitle => "titlePage.title",
            Category::TitlePageAuthor => "titlePage.author",
            Category::ChapterTitle => "chapter.title",
            Category::ChapterFirstParagraph => "chapter.firstParagraph",
            Category::ChapterParagraph => "chapter.paragraph",
            Category::SectionTitle => "section.title",
            Category::Text => "text",
            Category::PageMargin => "page.margin",
            Category::PageSize => "page.size",
        }
    }

    pub fn is_page(self) -> bool {
        matches!(self, Category::PageMargin | Category::PageSize)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Category {
    type Err = TemplateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.name() == s)
            .ok_or_else(|| TemplateError::UnknownCategory(s.to_string()))
    }
}

/// Attribute name → value, e.g. `fontSize` → `"16pt"`.
pub type Attributes = BTreeMap<String, String>;

/// Build an [`Attributes`] map from literal pairs.
pub fn attrs(pairs: &[(&str, &str)]) -> Attributes {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

// ---------------------------------------------------------------------------
// Rule sets
// ---------------------------------------------------------------------------

/// Category → attributes. May be incomplete until validated.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleSet {
    categories: BTreeMap<Category, Attributes>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, category: Category, attributes: Attributes) -> Self {
        self.categories.insert(category, attributes);
        self
    }

    pub fn insert(&mut self, category: Category, attributes: Attributes) {
        self.categories.insert(category, attributes);
    }

    pub fn remove(&mut self, category: Category) -> Option<Attributes> {
        self.categories.remove(&category)
    }

    pub fn get(&self, category: Category) -> Option<&Attributes> {
        self.categories.get(&category)
    }

    pub fn contains(&self, category: Category) -> bool {
        self.categories.contains_key(&category)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Category, &Attributes)> {
        self.categories.iter().map(|(c, a)| (*c, a))
    }

    /// Categories from [`Category::ALL`] this set does not define.
    pub fn missing_categories(&self) -> Vec<Category> {
        Category::ALL
            .into_iter()
            .filter(|c| !self.contains(*c))
            .collect()
    }

    /// Category-level merge: every category `other` defines replaces this
    /// set's value for that category; all others are kept.
    pub fn merge(&self, other: &RuleSet) -> RuleSet {
        let mut merged = self.clone();
        for (category, attributes) in &other.categories {
            merged.categories.insert(*category, attributes.clone());
        }
        merged
    }
}

/// Attribute patches applied on top of a base rule set.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleOverride {
    patches: BTreeMap<Category, Attributes>,
}

impl RuleOverride {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn patch(mut self, category: Category, attributes: Attributes) -> Self {
        self.patches
            .entry(category)
            .or_default()
            .extend(attributes);
        self
    }

    /// Expand each patch into a complete category value: the base
    /// category's attributes with the patched attributes replacing them.
    pub fn resolve_against(&self, base: &RuleSet) -> RuleSet {
        let mut resolved = RuleSet::new();
        for (category, patch) in &self.patches {
            let mut full = base.get(*category).cloned().unwrap_or_default();
            full.extend(patch.iter().map(|(k, v)| (k.clone(), v.clone())));
            resolved.insert(*category, full);
        }
        resolved
    }

    /// Deep-merge this override into `base`.
    pub fn apply_to(&self, base: &RuleSet) -> RuleSet {
        base.merge(&self.resolve_against(base))
    }
}

// ---------------------------------------------------------------------------
// Templates
// ---------------------------------------------------------------------------

/// A named set of style rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub id: String,
    pub display_name: String,
    pub description: String,
    pub rules: RuleSet,
}

/// Listing entry for a template (styles omitted).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateSummary {
    pub id: String,
    pub display_name: String,
    pub description: String,
}

impl Template {
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        description: impl Into<String>,
        rules: RuleSet,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            description: description.into(),
            rules,
        }
    }

    /// Build a template by deep-merging `overrides` into `base`.
    pub fn derive(
        id: impl Into<String>,
        display_name: impl Into<String>,
        description: impl Into<String>,
        base: &RuleSet,
        overrides: &RuleOverride,
    ) -> Self {
        Self::new(id, display_name, description, overrides.apply_to(base))
    }

    pub fn summary(&self) -> TemplateSummary {
        TemplateSummary {
            id: self.id.clone(),
            display_name: self.display_name.clone(),
            description: self.description.clone(),
        }
    }

    /// Check the merged rule set is complete and every value well-formed.
    pub fn validate(&self) -> Result<(), TemplateError> {
        if let Some(category) = self.rules.missing_categories().into_iter().next() {
            return Err(TemplateError::MissingCategory {
                template: self.id.clone(),
                category,
            });
        }
        for (category, attributes) in self.rules.iter() {
            for (name, value) in attributes {
                self.validate_attribute(category, name, value)?;
            }
            for required in required_attributes(category) {
                if !attributes.contains_key(*required) {
                    return Err(TemplateError::MissingAttribute {
                        template: self.id.clone(),
                        category,
                        attribute: required.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    fn validate_attribute(
        &self,
        category: Category,
        name: &str,
        value: &str,
    ) -> Result<(), TemplateError> {
        let kind =
            attribute_kind(category, name).ok_or_else(|| TemplateError::UnknownAttribute {
                template: self.id.clone(),
                category,
                attribute: name.to_string(),
            })?;
        let invalid = |expected: &'static str| TemplateError::InvalidValue {
            template: self.id.clone(),
            category,
            attribute: name.to_string(),
            value: value.to_string(),
            expected,
        };

        match kind {
            AttributeKind::Dimension | AttributeKind::AbsoluteDimension => {
                let dim: Dimension =
                    value.parse().map_err(|_| TemplateError::InvalidDimension {
                        template: self.id.clone(),
                        category,
                        attribute: name.to_string(),
                        value: value.to_string(),
                    })?;
                if kind == AttributeKind::AbsoluteDimension && !dim.unit.is_absolute() {
                    return Err(invalid("an absolute dimension (in or pt)"));
                }
            }
            AttributeKind::Number => match value.parse::<f32>() {
                Ok(v) if v > 0.0 && v.is_finite() => {}
                _ => return Err(invalid("a positive number")),
            },
            AttributeKind::LineCount => match value.parse::<u32>() {
                Ok(n) if n >= 1 => {}
                _ => return Err(invalid("a whole number of lines, at least 1")),
            },
            AttributeKind::Color => {
                if !is_hex_color(value) {
                    return Err(invalid("a #rgb or #rrggbb color"));
                }
            }
            AttributeKind::FontFamily => {
                if value.trim().is_empty() {
                    return Err(invalid("a font family name"));
                }
            }
            AttributeKind::Token(allowed) => {
                if !allowed.contains(&value) {
                    return Err(invalid(token_description(allowed)));
                }
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Attribute schema
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttributeKind {
    Dimension,
    AbsoluteDimension,
    Number,
    LineCount,
    Color,
    FontFamily,
    Token(&'static [&'static str]),
}

const ALIGNMENTS: &[&str] = &["left", "center", "right", "justify"];
const WEIGHTS: &[&str] = &["normal", "bold"];
const FONT_STYLES: &[&str] = &["normal", "italic"];
const BREAKS: &[&str] = &["always", "auto", "avoid"];

fn token_description(allowed: &[&str]) -> &'static str {
    if allowed == ALIGNMENTS {
        "one of left, center, right, justify"
    } else if allowed == WEIGHTS {
        "normal or bold"
    } else if allowed == FONT_STYLES {
        "normal or italic"
    } else {
        "one of always, auto, avoid"
    }
}

fn attribute_kind(category: Category, name: &str) -> Option<AttributeKind> {
    match category {
        Category::PageMargin => match name {
            "top" | "right" | "bottom" | "left" => Some(AttributeKind::AbsoluteDimension),
            _ => None,
        },
        Category::PageSize => match name {
            "width" | "height" => Some(AttributeKind::AbsoluteDimension),
            _ => None,
        },
        _ => match name {
            "fontSize" | "marginTop" | "marginBottom" | "marginLeft" | "marginRight"
            | "textIndent" => Some(AttributeKind::Dimension),
            "lineHeight" => Some(AttributeKind::Number),
            "orphans" | "widows" => Some(AttributeKind::LineCount),
            "color" => Some(AttributeKind::Color),
            "fontFamily" => Some(AttributeKind::FontFamily),
            "textAlign" => Some(AttributeKind::Token(ALIGNMENTS)),
            "fontWeight" => Some(AttributeKind::Token(WEIGHTS)),
            "fontStyle" => Some(AttributeKind::Token(FONT_STYLES)),
            "pageBreakBefore" | "pageBreakAfter" => Some(AttributeKind::Token(BREAKS)),
            _ => None,
        },
    }
}

fn required_attributes(category: Category) -> &'static [&'static str] {
    match category {
        Category::PageMargin => &["top", "right", "bottom", "left"],
        Category::PageSize => &["width", "height"],
        _ => &[],
    }
}

fn is_hex_color(value: &str) -> bool {
    value
        .strip_prefix('#')
        .map(|hex| (hex.len() == 3 || hex.len() == 6) && hex.chars().all(|c| c.is_ascii_hexdigit()))
        .unwrap_or(false)
}

// ---------------------------------------------------------------------------
// Built-in rules
// ---------------------------------------------------------------------------

/// The base rule set every built-in template derives from: a 6×9 in trade
/// paperback with 0.75 in margins, Times at 12 pt.
pub fn standard_rules() -> RuleSet {
    RuleSet::new()
        .with(
            Category::TitlePageTitle,
            attrs(&[
                ("fontSize", "24pt"),
                ("fontWeight", "bold"),
                ("textAlign", "center"),
                ("marginTop", "2in"),
                ("marginBottom", "1in"),
            ]),
        )
        .with(
            Category::TitlePageAuthor,
            attrs(&[
                ("fontSize", "16pt"),
                ("textAlign", "center"),
                ("marginBottom", "2in"),
            ]),
        )
        .with(
            Category::ChapterTitle,
            attrs(&[
                ("fontSize", "16pt"),
                ("fontWeight", "bold"),
                ("textAlign", "center"),
                ("marginTop", "1in"),
                ("marginBottom", "0.5in"),
                ("pageBreakBefore", "always"),
            ]),
        )
        .with(
            Category::ChapterFirstParagraph,
            attrs(&[("textIndent", "0in"), ("marginTop", "0.5in")]),
        )
        .with(
            Category::ChapterParagraph,
            attrs(&[
                ("textIndent", "0.25in"),
                ("lineHeight", "1.15"),
                ("marginBottom", "0.5em"),
                ("orphans", "2"),
                ("widows", "2"),
            ]),
        )
        .with(
            Category::SectionTitle,
            attrs(&[
                ("fontSize", "14pt"),
                ("fontWeight", "bold"),
                ("marginTop", "0.5in"),
                ("marginBottom", "0.25in"),
            ]),
        )
        .with(
            Category::Text,
            attrs(&[
                ("fontFamily", "Times New Roman"),
                ("fontSize", "12pt"),
                ("color", "#000000"),
            ]),
        )
        .with(
            Category::PageMargin,
            attrs(&[
                ("top", "0.75in"),
                ("bottom", "0.75in"),
                ("left", "0.75in"),
                ("right", "0.75in"),
            ]),
        )
        .with(
            Category::PageSize,
            attrs(&[("width", "6in"), ("height", "9in")]),
        )
}

/// Look up a built-in base rule set by name.
pub fn base_rules(name: &str) -> Option<RuleSet> {
    match name {
        STANDARD_BASE => Some(standard_rules()),
        _ => None,
    }
}

pub fn fiction_template() -> Template {
    Template::derive(
        "fiction",
        "Fiction",
        "Standard fiction book formatting",
        &standard_rules(),
        &RuleOverride::new().patch(
            Category::ChapterTitle,
            attrs(&[("fontSize", "18pt"), ("marginTop", "1.5in")]),
        ),
    )
}

pub fn non_fiction_template() -> Template {
    Template::derive(
        "nonFiction",
        "Non-Fiction",
        "Academic and non-fiction book formatting",
        &standard_rules(),
        &RuleOverride::new()
            .patch(
                Category::ChapterTitle,
                attrs(&[("fontSize", "16pt"), ("marginTop", "1in")]),
            )
            .patch(
                Category::SectionTitle,
                attrs(&[("fontSize", "14pt"), ("marginTop", "0.75in")]),
            ),
    )
}

pub fn builtin_templates() -> Vec<Template> {
    vec![fiction_template(), non_fiction_template()]
}
