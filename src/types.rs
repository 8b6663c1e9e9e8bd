//! Data carried in and out of a conversation turn

use crate::error::{GeminiError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::fmt;

/// Cookie name to value.
pub type Cookies = BTreeMap<String, String>;

/// An image the model found on the web and cited in its reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebImage {
    pub url: String,
    pub title: String,
    pub alt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
}

/// An image produced by the model. Fetching it requires the session cookies.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedImage {
    pub url: String,
    pub title: String,
    pub alt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
    #[serde(default)]
    pub cookies: Cookies,
}

impl fmt::Debug for GeneratedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratedImage")
            .field("url", &self.url)
            .field("title", &self.title)
            .field("alt", &self.alt)
            .field("proxy", &self.proxy)
            .field("cookies", &"[redacted]")
            .finish()
    }
}

/// Either kind of image attached to a candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Image {
    Web(WebImage),
    Generated(GeneratedImage),
}

impl Image {
    pub fn url(&self) -> &str {
        match self {
            Image::Web(img) => &img.url,
            Image::Generated(img) => &img.url,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Image::Web(img) => &img.title,
            Image::Generated(img) => &img.title,
        }
    }

    pub fn alt(&self) -> &str {
        match self {
            Image::Web(img) => &img.alt,
            Image::Generated(img) => &img.alt,
        }
    }
}

/// One alternative reply for a turn. Immutable once decoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub rcid: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thoughts: Option<String>,
    #[serde(default)]
    pub web_images: Vec<WebImage>,
    #[serde(default)]
    pub generated_images: Vec<GeneratedImage>,
}

impl Candidate {
    /// Web images first, then generated ones.
    pub fn images(&self) -> Vec<Image> {
        self.web_images
            .iter()
            .cloned()
            .map(Image::Web)
            .chain(self.generated_images.iter().cloned().map(Image::Generated))
            .collect()
    }
}

/// A decoded reply: the turn metadata plus every candidate.
///
/// The reply always holds at least one candidate and the chosen index is
/// always in range. `text`, `rcid` and `images` are read through the chosen
/// candidate, so they follow [`ModelOutput::select`] automatically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelOutput {
    metadata: Vec<Option<String>>,
    candidates: Vec<Candidate>,
    chosen: usize,
}

impl ModelOutput {
    /// Returns `None` when `candidates` is empty.
    pub fn new(metadata: Vec<Option<String>>, candidates: Vec<Candidate>) -> Option<Self> {
        if candidates.is_empty() {
            return None;
        }
        Some(Self {
            metadata,
            candidates,
            chosen: 0,
        })
    }

    /// Conversation and response ids as reported by the server (`[cid, rid, ...]`).
    pub fn metadata(&self) -> &[Option<String>] {
        &self.metadata
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn chosen_index(&self) -> usize {
        self.chosen
    }

    pub fn chosen(&self) -> &Candidate {
        &self.candidates[self.chosen]
    }

    pub fn text(&self) -> &str {
        &self.chosen().text
    }

    pub fn thoughts(&self) -> Option<&str> {
        self.chosen().thoughts.as_deref()
    }

    pub fn rcid(&self) -> &str {
        &self.chosen().rcid
    }

    pub fn images(&self) -> Vec<Image> {
        self.chosen().images()
    }

    /// Make `index` the chosen candidate. Leaves the reply untouched when
    /// `index` is out of range.
    pub fn select(&mut self, index: usize) -> Result<&Candidate> {
        if index >= self.candidates.len() {
            return Err(GeminiError::CandidateOutOfRange {
                index,
                len: self.candidates.len(),
            });
        }
        self.chosen = index;
        Ok(self.chosen())
    }
}

impl fmt::Display for ModelOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text())
    }
}

/// One logical call inside a batchexecute request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcData {
    pub rpcid: String,
    pub payload: String,
    pub identifier: Option<String>,
}

impl RpcData {
    pub fn new(rpcid: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            rpcid: rpcid.into(),
            payload: payload.into(),
            identifier: None,
        }
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    /// `[rpcid, payload, null, identifier]`
    pub fn serialize(&self) -> Value {
        json!([self.rpcid, self.payload, null, self.identifier])
    }
}

/// A persona ("gem") that can be attached to a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gem {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
    pub predefined: bool,
}

/// Gems fetched from the server, in server order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GemJar {
    gems: Vec<Gem>,
}

impl GemJar {
    pub fn new(gems: Vec<Gem>) -> Self {
        Self { gems }
    }

    pub fn get(&self, id: &str) -> Option<&Gem> {
        self.gems.iter().find(|g| g.id == id)
    }

    pub fn get_by_name(&self, name: &str) -> Option<&Gem> {
        self.gems.iter().find(|g| g.name == name)
    }

    /// Gems matching `predefined`, or all of them when `None`.
    pub fn filter(&self, predefined: Option<bool>) -> Vec<&Gem> {
        self.gems
            .iter()
            .filter(|g| predefined.is_none_or(|p| g.predefined == p))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Gem> {
        self.gems.iter()
    }

    pub fn len(&self) -> usize {
        self.gems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gems.is_empty()
    }
}
