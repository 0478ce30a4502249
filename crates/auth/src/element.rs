use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Code of a business element: a resource kind protected by access rules
/// (e.g. "products", "orders").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementCode(Cow<'static, str>);

impl ElementCode {
    pub fn new(code: impl Into<Cow<'static, str>>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for ElementCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Administrative record for a business element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessElement {
    pub code: ElementCode,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl BusinessElement {
    pub fn new(code: ElementCode, name: impl Into<String>) -> Self {
        Self {
            code,
            name: name.into(),
            description: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}
