//! Gems (server side personas)
//!
//! A gem bundles a name, a description and a system prompt. Gems are managed
//! through batchexecute RPCs and selected per turn by id.

use crate::client::GeminiClient;
use crate::constants::rpc;
use crate::error::{GeminiError, Result};
use crate::parsing::{extract_frames, frame_body, get_array, get_str};
use crate::types::{Gem, GemJar, RpcData};
use async_trait::async_trait;
use serde_json::{Value, json};

const SYSTEM_IDENTIFIER: &str = "system";
const CUSTOM_IDENTIFIER: &str = "custom";

/// Gem management capability.
#[async_trait]
pub trait GemManager {
    /// Fetch predefined and custom gems and cache them on the client.
    /// `include_hidden` also lists predefined gems the web app hides.
    async fn fetch_gems(&self, include_hidden: bool) -> Result<GemJar>;

    /// The jar cached by the last [`GemManager::fetch_gems`].
    fn gems(&self) -> Result<GemJar>;

    async fn create_gem(&self, name: &str, prompt: &str, description: &str) -> Result<Gem>;

    async fn update_gem(
        &self,
        gem_id: &str,
        name: &str,
        prompt: &str,
        description: &str,
    ) -> Result<Gem>;

    async fn delete_gem(&self, gem_id: &str) -> Result<()>;
}

fn gem_fields(name: &str, prompt: &str, description: &str) -> Vec<Value> {
    vec![
        json!(name),
        json!(description),
        json!(prompt),
        Value::Null,
        Value::Null,
        Value::Null,
        Value::Null,
        Value::Null,
        json!(0),
        Value::Null,
        json!(1),
        Value::Null,
        Value::Null,
        Value::Null,
        json!([]),
    ]
}

pub fn create_gem_payload(name: &str, prompt: &str, description: &str) -> String {
    json!([gem_fields(name, prompt, description)]).to_string()
}

pub fn update_gem_payload(gem_id: &str, name: &str, prompt: &str, description: &str) -> String {
    let mut fields = gem_fields(name, prompt, description);
    fields.push(json!(0));
    json!([gem_id, fields]).to_string()
}

pub fn delete_gem_payload(gem_id: &str) -> String {
    json!([gem_id]).to_string()
}

fn parse_gem(raw: &Value, predefined: bool) -> Option<Gem> {
    Some(Gem {
        id: get_str(raw, &[0])?.to_string(),
        name: get_str(raw, &[1, 0]).unwrap_or_default().to_string(),
        description: get_str(raw, &[1, 1]).map(str::to_string),
        prompt: get_str(raw, &[2, 0])
            .filter(|p| !p.is_empty())
            .map(str::to_string),
        predefined,
    })
}

/// Parse a gem listing response. `None` when neither the system nor the
/// custom listing frame is present; an empty listing is a valid empty jar.
pub fn parse_gem_list(text: &str) -> Option<GemJar> {
    let mut predefined = Vec::new();
    let mut custom = Vec::new();
    let mut seen = false;

    for frame in extract_frames(text) {
        let tag = frame
            .as_array()
            .and_then(|items| items.last())
            .and_then(Value::as_str);
        let target = match tag {
            Some(SYSTEM_IDENTIFIER) => &mut predefined,
            Some(CUSTOM_IDENTIFIER) => &mut custom,
            _ => continue,
        };
        let Some(body) = frame_body(&frame) else {
            continue;
        };
        seen = true;
        target.extend(get_array(&body, &[2]).iter().cloned());
    }

    if !seen {
        return None;
    }
    let gems = predefined
        .iter()
        .filter_map(|g| parse_gem(g, true))
        .chain(custom.iter().filter_map(|g| parse_gem(g, false)))
        .collect();
    Some(GemJar::new(gems))
}

/// Id of a freshly created gem.
pub fn parse_created_gem_id(text: &str) -> Option<String> {
    extract_frames(text)
        .iter()
        .filter_map(frame_body)
        .find_map(|body| get_str(&body, &[0]).map(str::to_string))
}

#[async_trait]
impl GemManager for GeminiClient {
    async fn fetch_gems(&self, include_hidden: bool) -> Result<GemJar> {
        let system_payload = if include_hidden { "[4]" } else { "[3]" };
        let body = self
            .batch_execute(&[
                RpcData::new(rpc::LIST_GEMS, system_payload).with_identifier(SYSTEM_IDENTIFIER),
                RpcData::new(rpc::LIST_GEMS, "[2]").with_identifier(CUSTOM_IDENTIFIER),
            ])
            .await?;

        let Some(jar) = parse_gem_list(&body) else {
            self.close_now();
            tracing::debug!(body = %body, "Invalid gem list response");
            return Err(GeminiError::Api(
                "Failed to fetch gems. Invalid response data received. \
                 Client will try to re-initialize on next request."
                    .to_string(),
            ));
        };
        tracing::debug!(count = jar.len(), "Fetched gems");
        self.store_gems(jar.clone());
        Ok(jar)
    }

    fn gems(&self) -> Result<GemJar> {
        self.cached_gems().ok_or_else(|| {
            GeminiError::InvalidInput(
                "Gems not fetched yet. Call fetch_gems() to fetch gems from gemini.google.com."
                    .to_string(),
            )
        })
    }

    async fn create_gem(&self, name: &str, prompt: &str, description: &str) -> Result<Gem> {
        let body = self
            .batch_execute(&[RpcData::new(
                rpc::CREATE_GEM,
                create_gem_payload(name, prompt, description),
            )])
            .await?;

        let Some(id) = parse_created_gem_id(&body) else {
            self.close_now();
            tracing::debug!(body = %body, "Invalid create gem response");
            return Err(GeminiError::Api(
                "Failed to create gem. Invalid response data received. \
                 Client will try to re-initialize on next request."
                    .to_string(),
            ));
        };
        Ok(Gem {
            id,
            name: name.to_string(),
            description: Some(description.to_string()),
            prompt: Some(prompt.to_string()),
            predefined: false,
        })
    }

    async fn update_gem(
        &self,
        gem_id: &str,
        name: &str,
        prompt: &str,
        description: &str,
    ) -> Result<Gem> {
        self.batch_execute(&[RpcData::new(
            rpc::UPDATE_GEM,
            update_gem_payload(gem_id, name, prompt, description),
        )])
        .await?;
        Ok(Gem {
            id: gem_id.to_string(),
            name: name.to_string(),
            description: Some(description.to_string()),
            prompt: Some(prompt.to_string()),
            predefined: false,
        })
    }

    async fn delete_gem(&self, gem_id: &str) -> Result<()> {
        self.batch_execute(&[RpcData::new(rpc::DELETE_GEM, delete_gem_payload(gem_id))])
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(tag: &str, gems: Value) -> Value {
        json!(["wrb.fr", rpc::LIST_GEMS, json!([null, null, gems]).to_string(), null, null, null, tag])
    }

    #[test]
    fn create_payload_has_fifteen_fields() {
        let payload: Value = serde_json::from_str(&create_gem_payload("Coach", "be kind", "d")).unwrap();
        let fields = payload[0].as_array().unwrap();
        assert_eq!(fields.len(), 15);
        assert_eq!(fields[0], json!("Coach"));
        assert_eq!(fields[1], json!("d"));
        assert_eq!(fields[2], json!("be kind"));
        assert_eq!(fields[8], json!(0));
        assert_eq!(fields[10], json!(1));
        assert_eq!(fields[14], json!([]));
    }

    #[test]
    fn update_payload_wraps_id_and_trailing_flag() {
        let payload: Value = serde_json::from_str(&update_gem_payload("g1", "n", "p", "")).unwrap();
        assert_eq!(payload[0], json!("g1"));
        let fields = payload[1].as_array().unwrap();
        assert_eq!(fields.len(), 16);
        assert_eq!(fields[15], json!(0));
        assert_eq!(delete_gem_payload("g1"), r#"["g1"]"#);
    }

    #[test]
    fn listing_splits_system_and_custom() {
        let line = json!([
            listing("system", json!([["sys1", ["Brainstormer", "Ideas"], ["Think wide"]]])),
            listing("custom", json!([["mine1", ["Mine", ""], null]])),
        ]);
        let jar = parse_gem_list(&format!(")]}}'\n\n{line}\n")).unwrap();
        assert_eq!(jar.len(), 2);

        let sys = jar.get("sys1").unwrap();
        assert!(sys.predefined);
        assert_eq!(sys.name, "Brainstormer");
        assert_eq!(sys.prompt.as_deref(), Some("Think wide"));

        let mine = jar.get_by_name("Mine").unwrap();
        assert!(!mine.predefined);
        assert_eq!(mine.prompt, None);
    }

    #[test]
    fn empty_listing_is_an_empty_jar() {
        let line = json!([listing("system", json!([])), listing("custom", Value::Null)]);
        let jar = parse_gem_list(&line.to_string()).unwrap();
        assert!(jar.is_empty());
    }

    #[test]
    fn unrelated_response_is_rejected() {
        assert!(parse_gem_list("garbage").is_none());
        assert!(parse_gem_list(r#"[["wrb.fr","x","[]",null,null,null,"other"]]"#).is_none());
    }

    #[test]
    fn created_id_comes_from_first_body() {
        let line = json!([["wrb.fr", rpc::CREATE_GEM, r#"["new-gem-id"]"#, null, null, null, "generic"]]);
        assert_eq!(parse_created_gem_id(&line.to_string()).as_deref(), Some("new-gem-id"));
    }
}
