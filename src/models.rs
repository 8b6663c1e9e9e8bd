//! Model registry
//!
//! The web app picks a model through the `x-goog-ext-525001261-jspb` header.
//! A [`Model`] is just a name plus the headers to merge into the generate
//! request.

use crate::constants::MODEL_HEADER_KEY;
use crate::error::{GeminiError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// (name, mode id). An empty mode id sends no header.
const MODELS: &[(&str, &str)] = &[
    ("unspecified", ""),
    ("gemini-3.0-pro", "9d8ca3786ebdfbea"),
    ("gemini-2.5-pro", "4af6c7f5da75d65d"),
    ("gemini-2.5-flash", "9ec249fc9ad08861"),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Model {
    pub name: String,
    pub headers: BTreeMap<String, String>,
}

impl Model {
    fn from_entry((name, mode_id): (&str, &str)) -> Self {
        let mut headers = BTreeMap::new();
        if !mode_id.is_empty() {
            headers.insert(
                MODEL_HEADER_KEY.to_string(),
                format!(r#"[1,null,null,null,"{mode_id}",null,null,0,[4]]"#),
            );
        }
        Self {
            name: name.to_string(),
            headers,
        }
    }

    /// The default model: no selector header, the server decides.
    pub fn unspecified() -> Self {
        Self::from_entry(MODELS[0])
    }

    /// Look up a registered model by name.
    pub fn from_name(name: &str) -> Result<Self> {
        MODELS
            .iter()
            .find(|(id, _)| *id == name)
            .map(|entry| Self::from_entry(*entry))
            .ok_or_else(|| {
                GeminiError::ModelInvalid(format!(
                    "Unknown model name: {name}. Available models: {}",
                    Self::available().join(", ")
                ))
            })
    }

    /// Build a descriptor for a model the registry does not know about.
    pub fn custom(name: impl Into<String>, headers: BTreeMap<String, String>) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() || headers.is_empty() {
            return Err(GeminiError::InvalidInput(
                "A custom model needs both a name and at least one header".to_string(),
            ));
        }
        Ok(Self {
            name,
            headers,
        })
    }

    pub fn available() -> Vec<&'static str> {
        MODELS.iter().map(|(id, _)| *id).collect()
    }

    pub fn all() -> Vec<Model> {
        MODELS.iter().map(|entry| Self::from_entry(*entry)).collect()
    }
}

impl Default for Model {
    fn default() -> Self {
        Self::unspecified()
    }
}

/// How a caller names the model for a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSpec {
    Named(String),
    Custom(Model),
}

impl ModelSpec {
    pub fn resolve(&self) -> Result<Model> {
        match self {
            ModelSpec::Named(name) => Model::from_name(name),
            ModelSpec::Custom(model) => Ok(model.clone()),
        }
    }
}

impl Default for ModelSpec {
    fn default() -> Self {
        ModelSpec::Custom(Model::unspecified())
    }
}

impl From<&str> for ModelSpec {
    fn from(name: &str) -> Self {
        ModelSpec::Named(name.to_string())
    }
}

impl From<String> for ModelSpec {
    fn from(name: String) -> Self {
        ModelSpec::Named(name)
    }
}

impl From<Model> for ModelSpec {
    fn from(model: Model) -> Self {
        ModelSpec::Custom(model)
    }
}
