//! Sandbox template chain
//!
//! An ordered list of templates tried for every execution. The first candidate
//! that runs the code wins; later candidates are only used as fallbacks.

use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

/// One entry of the fallback chain
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateCandidate {
    /// Template identifier (None selects the provider's default template)
    pub id: Option<String>,
    /// Human readable description, reported back in fallback mode
    pub description: String,
    /// Code prepended to the user's code when running on this template
    pub prelude: Option<String>,
}

impl TemplateCandidate {
    pub fn named(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            description: description.into(),
            prelude: None,
        }
    }

    /// Build the code actually sent to the sandbox
    pub fn wrap_code(&self, code: &str) -> String {
        match &self.prelude {
            Some(prelude) => format!("{}\n# Execute user code\n{}\n", prelude.trim_end(), code),
            None => code.to_string(),
        }
    }
}

/// Ordered, non-empty list of template candidates
#[derive(Debug, Clone)]
pub struct TemplateChain {
    candidates: Vec<TemplateCandidate>,
}

/// Raw TOML layout of a chain file
#[derive(Debug, Deserialize)]
struct RawChain {
    #[serde(default, rename = "template")]
    templates: Vec<RawTemplate>,
}

#[derive(Debug, Deserialize)]
struct RawTemplate {
    id: Option<String>,
    description: String,
    prelude: Option<String>,
}

impl TemplateChain {
    /// Chain with exactly one named template
    pub fn single(template_id: &str) -> Self {
        Self {
            candidates: vec![TemplateCandidate::named(template_id, "configured template")],
        }
    }

    /// Load a chain from a TOML file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read template chain {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid template chain {}", path.display()))
    }

    /// Parse a chain from TOML text
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let raw: RawChain = toml::from_str(content)?;

        let mut candidates = Vec::with_capacity(raw.templates.len());
        for (idx, entry) in raw.templates.into_iter().enumerate() {
            let id = match entry.id {
                Some(id) if id.trim().is_empty() => {
                    anyhow::bail!("Template #{} has an empty id", idx + 1)
                }
                Some(id) => Some(id.trim().to_string()),
                None => None,
            };
            candidates.push(TemplateCandidate {
                id,
                description: entry.description,
                prelude: entry.prelude.filter(|p| !p.trim().is_empty()),
            });
        }

        if candidates.is_empty() {
            anyhow::bail!("Template chain must contain at least one [[template]] entry");
        }

        Ok(Self { candidates })
    }

    pub fn candidates(&self) -> &[TemplateCandidate] {
        &self.candidates
    }

    /// True when more than one candidate is configured
    pub fn is_fallback(&self) -> bool {
        self.candidates.len() > 1
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }
}
