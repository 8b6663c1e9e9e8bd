//! Conversation state
//!
//! The server links turns through a `(cid, rid, rcid)` triple: conversation
//! id, response id and the id of the candidate the user kept. Every turn
//! sends the current triple and receives the next one.

use crate::client::{GeminiClient, GenerateRequest};
use crate::error::{GeminiError, Result};
use crate::models::ModelSpec;
use crate::types::ModelOutput;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use tokio::sync::Mutex;

/// The `(cid, rid, rcid)` turn linkage. All empty means a new conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationState {
    slots: [Option<String>; 3],
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the full triple.
    pub fn get(&self) -> [Option<String>; 3] {
        self.slots.clone()
    }

    pub fn cid(&self) -> Option<&str> {
        self.slots[0].as_deref()
    }

    pub fn rid(&self) -> Option<&str> {
        self.slots[1].as_deref()
    }

    pub fn rcid(&self) -> Option<&str> {
        self.slots[2].as_deref()
    }

    pub fn is_new(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    /// Positional partial update: `values[i]` overwrites slot `i`, slots
    /// past `values.len()` keep their current value. More than three
    /// values is an error and leaves the state untouched.
    pub fn set_all(&mut self, values: &[Option<String>]) -> Result<()> {
        if values.len() > 3 {
            return Err(GeminiError::InvalidInput(
                "metadata cannot exceed 3 elements".to_string(),
            ));
        }
        for (slot, value) in self.slots.iter_mut().zip(values) {
            *slot = value.clone();
        }
        Ok(())
    }

    /// Replace the whole triple.
    pub fn replace(&mut self, triple: [Option<String>; 3]) {
        self.slots = triple;
    }

    pub fn set_cid(&mut self, cid: Option<String>) {
        self.slots[0] = cid;
    }

    pub fn set_rid(&mut self, rid: Option<String>) {
        self.slots[1] = rid;
    }

    pub fn set_candidate_id(&mut self, rcid: Option<String>) {
        self.slots[2] = rcid;
    }

    /// Carry a finished turn forward: server metadata, then the chosen rcid.
    pub fn apply_reply(&mut self, output: &ModelOutput) -> Result<()> {
        self.set_all(output.metadata())?;
        self.set_candidate_id(Some(output.rcid().to_string()));
        Ok(())
    }

    /// `[cid, rid, rcid]` as sent on the wire.
    pub fn to_value(&self) -> Value {
        Value::Array(
            self.slots
                .iter()
                .map(|s| s.clone().map(Value::String).unwrap_or(Value::Null))
                .collect(),
        )
    }
}

struct ChatTurnState {
    conversation: ConversationState,
    last_output: Option<ModelOutput>,
}

/// A multi-turn conversation bound to a client.
///
/// Turns are serialized: a second `send_message` waits for the first to
/// finish, so the triple read for a request is always the one written by
/// the previous turn.
pub struct ChatSession {
    client: GeminiClient,
    model: ModelSpec,
    gem: Option<String>,
    state: Mutex<ChatTurnState>,
}

impl ChatSession {
    pub fn new(client: GeminiClient) -> Self {
        Self {
            client,
            model: ModelSpec::default(),
            gem: None,
            state: Mutex::new(ChatTurnState {
                conversation: ConversationState::new(),
                last_output: None,
            }),
        }
    }

    pub fn with_model(mut self, model: impl Into<ModelSpec>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_gem(mut self, gem_id: impl Into<String>) -> Self {
        self.gem = Some(gem_id.into());
        self
    }

    /// Continue an existing conversation from a saved triple (or prefix).
    pub fn with_metadata(mut self, metadata: &[Option<String>]) -> Result<Self> {
        self.state.get_mut().conversation.set_all(metadata)?;
        Ok(self)
    }

    pub fn with_cid(mut self, cid: impl Into<String>) -> Self {
        self.state.get_mut().conversation.set_cid(Some(cid.into()));
        self
    }

    pub fn with_rid(mut self, rid: impl Into<String>) -> Self {
        self.state.get_mut().conversation.set_rid(Some(rid.into()));
        self
    }

    pub fn with_rcid(mut self, rcid: impl Into<String>) -> Self {
        self.state
            .get_mut()
            .conversation
            .set_candidate_id(Some(rcid.into()));
        self
    }

    pub fn client(&self) -> &GeminiClient {
        &self.client
    }

    pub async fn metadata(&self) -> ConversationState {
        self.state.lock().await.conversation.clone()
    }

    pub async fn last_output(&self) -> Option<ModelOutput> {
        self.state.lock().await.last_output.clone()
    }

    /// Send one turn and advance the conversation.
    pub async fn send_message(&self, prompt: &str, files: Vec<PathBuf>) -> Result<ModelOutput> {
        let mut state = self.state.lock().await;
        let request = GenerateRequest {
            prompt: prompt.to_string(),
            files,
            model: self.model.clone(),
            gem_id: self.gem.clone(),
        };
        let output = self
            .client
            .generate_content(request, Some(&mut state.conversation))
            .await?;
        state.last_output = Some(output.clone());
        Ok(output)
    }

    /// Keep a different candidate of the last reply; the next turn continues
    /// from it.
    pub async fn choose_candidate(&self, index: usize) -> Result<ModelOutput> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let output = state.last_output.as_mut().ok_or_else(|| {
            GeminiError::InvalidInput(
                "No previous output data found in this chat session.".to_string(),
            )
        })?;
        let rcid = output.select(index)?.rcid.clone();
        state.conversation.set_candidate_id(Some(rcid));
        Ok(output.clone())
    }
}
