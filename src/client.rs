//! Gemini web client
//!
//! Owns the credentials and the transport binding for one session, sends
//! turns to the StreamGenerate endpoint and batched RPCs to batchexecute,
//! and runs the two background tasks: periodic cookie rotation and the
//! optional idle auto-close.
//!
//! A failed request that leaves the session in an unknown state (non-200,
//! undecodable body) closes the client; later calls fail with
//! [`GeminiError::NotInitialized`] until [`GeminiClient::init`] runs again.

use crate::auth::{CookieCache, CredentialManager, Credentials, FileCookieCache};
use crate::config::ClientConfig;
use crate::constants::{
    BATCH_EXEC_URL, GENERATE_URL, SECURE_1PSID, SECURE_1PSIDTS, gemini_headers,
};
use crate::decoder::{self, ImageContext};
use crate::error::{GeminiError, Result};
use crate::models::ModelSpec;
use crate::session::{ChatSession, ConversationState};
use crate::transport::{
    FileUploader, HttpRequest, ReqwestTransport, ReqwestUploader, Transport, TransportOptions,
    validate_file,
};
use crate::types::{Cookies, GemJar, ModelOutput, RpcData};
use parking_lot::{Mutex, RwLock};
use serde_json::{Value, json};
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::task::JoinHandle;

/// Null slots between the conversation metadata and a gem id.
const GEM_PLACEHOLDER_NULLS: usize = 16;

/// Session behaviour chosen at [`GeminiClient::init`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    /// Deadline of every request the session sends: init probes, cookie
    /// rotation, generate and batchexecute calls. File uploads use the
    /// builder's [`GeminiClientBuilder::timeout`].
    pub timeout: Duration,
    pub auto_close: bool,
    pub close_delay: Duration,
    pub auto_refresh: bool,
    pub refresh_interval: Duration,
    pub verbose: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            auto_close: false,
            close_delay: Duration::from_secs(300),
            auto_refresh: true,
            refresh_interval: Duration::from_secs(540),
            verbose: true,
        }
    }
}

/// One turn's input.
#[derive(Debug, Clone, Default)]
pub struct GenerateRequest {
    pub prompt: String,
    pub files: Vec<PathBuf>,
    pub model: ModelSpec,
    pub gem_id: Option<String>,
}

impl GenerateRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    pub fn with_files(mut self, files: Vec<PathBuf>) -> Self {
        self.files = files;
        self
    }

    pub fn with_model(mut self, model: impl Into<ModelSpec>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_gem(mut self, gem_id: impl Into<String>) -> Self {
        self.gem_id = Some(gem_id.into());
        self
    }
}

/// A file already pushed to the upload service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub reference: String,
    pub name: String,
}

/// Build the `f.req` value for a generate call.
///
/// Inner layout: `[prompt_part, null, metadata]`, followed by 16 nulls and
/// the gem id when a gem is selected. `prompt_part` is `[prompt]`, or
/// `[prompt, 0, null, files]` with each file as `[[[reference], name]]`.
pub fn build_generate_payload(
    prompt: &str,
    files: &[UploadedFile],
    metadata: Option<&ConversationState>,
    gem_id: Option<&str>,
) -> String {
    let prompt_part = if files.is_empty() {
        json!([prompt])
    } else {
        let file_data: Vec<Value> = files
            .iter()
            .map(|f| json!([[[f.reference], f.name]]))
            .collect();
        json!([prompt, 0, null, file_data])
    };

    let mut inner = vec![
        prompt_part,
        Value::Null,
        metadata.map(ConversationState::to_value).unwrap_or(Value::Null),
    ];
    if let Some(gem_id) = gem_id {
        inner.extend(std::iter::repeat_n(Value::Null, GEM_PLACEHOLDER_NULLS));
        inner.push(json!(gem_id));
    }

    json!([null, Value::Array(inner).to_string()]).to_string()
}

fn request_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    (millis % 900_000 + 100_000).to_string()
}

struct ActiveSession {
    credentials: Credentials,
    options: ClientOptions,
}

#[derive(Default)]
struct BackgroundTasks {
    refresh: Option<JoinHandle<()>>,
    close: Option<JoinHandle<()>>,
}

struct ClientInner {
    proxy: Option<String>,
    transport: Arc<dyn Transport>,
    uploader: Arc<dyn FileUploader>,
    cache: Arc<dyn CookieCache>,
    /// Latest known cookie set; survives `close` so `init` can reuse it.
    cookies: RwLock<Cookies>,
    session: RwLock<Option<ActiveSession>>,
    tasks: Mutex<BackgroundTasks>,
    gems: RwLock<Option<GemJar>>,
}

impl ClientInner {
    fn credential_manager(&self, options: &ClientOptions) -> CredentialManager {
        CredentialManager::new(self.transport.clone(), self.cache.clone())
            .with_verbose(options.verbose)
            .with_timeout(options.timeout)
    }

    fn shutdown(&self) {
        *self.session.write() = None;
        let mut tasks = self.tasks.lock();
        if let Some(handle) = tasks.refresh.take() {
            handle.abort();
        }
        if let Some(handle) = tasks.close.take() {
            handle.abort();
        }
    }

    fn apply_rotated_cookie(&self, value: String) {
        self.cookies
            .write()
            .insert(SECURE_1PSIDTS.to_string(), value.clone());
        if let Some(session) = self.session.write().as_mut() {
            session
                .credentials
                .cookies
                .insert(SECURE_1PSIDTS.to_string(), value);
        }
    }
}

/// Runs until the client is dropped or closed, or rotation is rejected.
async fn refresh_loop(inner: Weak<ClientInner>, interval: Duration) {
    loop {
        tokio::time::sleep(interval).await;
        let Some(inner) = inner.upgrade() else {
            return;
        };
        let (cookies, options) = match inner.session.read().as_ref() {
            Some(session) => (
                session.credentials.cookies.clone(),
                ClientOptions {
                    verbose: false,
                    ..session.options.clone()
                },
            ),
            None => return,
        };

        match inner.credential_manager(&options).rotate(&cookies).await {
            Ok(Some(new_psidts)) => {
                inner.apply_rotated_cookie(new_psidts);
                tracing::debug!("Cookies refreshed. New __Secure-1PSIDTS applied.");
            }
            Ok(None) => {}
            Err(e) if e.is_terminal_for_refresh() => {
                tracing::warn!(error = %e, "Failed to refresh cookies. Auto refresh task canceled.");
                return;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Unexpected error while refreshing cookies");
            }
        }
    }
}

/// Session handle. Cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct GeminiClient {
    inner: Arc<ClientInner>,
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("proxy", &self.inner.proxy)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

/// Builder for [`GeminiClient`]. Unset collaborators default to the
/// reqwest transport/uploader and the file cookie cache.
#[derive(Default)]
pub struct GeminiClientBuilder {
    cookies: Cookies,
    proxy: Option<String>,
    timeout: Option<Duration>,
    transport: Option<Arc<dyn Transport>>,
    uploader: Option<Arc<dyn FileUploader>>,
    cache: Option<Arc<dyn CookieCache>>,
}

impl GeminiClientBuilder {
    pub fn secure_1psid(self, value: impl Into<String>) -> Self {
        self.cookie(SECURE_1PSID, value)
    }

    pub fn secure_1psidts(self, value: impl Into<String>) -> Self {
        self.cookie(SECURE_1PSIDTS, value)
    }

    pub fn cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.insert(name.into(), value.into());
        self
    }

    pub fn proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    /// Default timeout of the reqwest collaborators. Governs file uploads;
    /// session requests use [`ClientOptions::timeout`].
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn uploader(mut self, uploader: Arc<dyn FileUploader>) -> Self {
        self.uploader = Some(uploader);
        self
    }

    pub fn cookie_cache(mut self, cache: Arc<dyn CookieCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn build(self) -> Result<GeminiClient> {
        let options = TransportOptions {
            proxy: self.proxy.clone(),
            timeout: self.timeout.unwrap_or(Duration::from_secs(30)),
        };
        let transport: Arc<dyn Transport> = match self.transport {
            Some(t) => t,
            None => Arc::new(ReqwestTransport::new(&options)?),
        };
        let uploader: Arc<dyn FileUploader> = match self.uploader {
            Some(u) => u,
            None => Arc::new(ReqwestUploader::new(&options)?),
        };
        let cache: Arc<dyn CookieCache> = self
            .cache
            .unwrap_or_else(|| Arc::new(FileCookieCache::new(FileCookieCache::default_dir())));

        Ok(GeminiClient {
            inner: Arc::new(ClientInner {
                proxy: self.proxy,
                transport,
                uploader,
                cache,
                cookies: RwLock::new(self.cookies),
                session: RwLock::new(None),
                tasks: Mutex::new(BackgroundTasks::default()),
                gems: RwLock::new(None),
            }),
        })
    }
}

impl GeminiClient {
    pub fn builder() -> GeminiClientBuilder {
        GeminiClientBuilder::default()
    }

    /// Client with the default collaborators and the given session cookies.
    pub fn new(
        secure_1psid: Option<String>,
        secure_1psidts: Option<String>,
        proxy: Option<String>,
    ) -> Result<Self> {
        let mut builder = Self::builder();
        if let Some(psid) = secure_1psid {
            builder = builder.secure_1psid(psid);
            if let Some(psidts) = secure_1psidts {
                builder = builder.secure_1psidts(psidts);
            }
        }
        if let Some(proxy) = proxy {
            builder = builder.proxy(proxy);
        }
        builder.build()
    }

    /// Client wired from a loaded configuration.
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let mut builder = Self::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .cookie_cache(Arc::new(FileCookieCache::new(config.cookie_cache_dir())));
        if let Some(psid) = &config.secure_1psid {
            builder = builder.secure_1psid(psid.clone());
            if let Some(psidts) = &config.secure_1psidts {
                builder = builder.secure_1psidts(psidts.clone());
            }
        }
        if let Some(proxy) = &config.proxy {
            builder = builder.proxy(proxy.clone());
        }
        builder.build()
    }

    pub fn is_running(&self) -> bool {
        self.inner.session.read().is_some()
    }

    /// Current cookie set, including the latest rotated value.
    pub fn cookies(&self) -> Cookies {
        self.inner.cookies.read().clone()
    }

    pub fn proxy(&self) -> Option<&str> {
        self.inner.proxy.as_deref()
    }

    /// Acquire credentials and start the background tasks. Any failure
    /// leaves the client closed.
    pub async fn init(&self, options: ClientOptions) -> Result<()> {
        let seed = self.cookies();
        let credentials = match self
            .inner
            .credential_manager(&options)
            .acquire_token(&seed)
            .await
        {
            Ok(credentials) => credentials,
            Err(e) => {
                self.inner.shutdown();
                return Err(e);
            }
        };

        self.inner.shutdown();
        *self.inner.cookies.write() = credentials.cookies.clone();
        *self.inner.session.write() = Some(ActiveSession {
            credentials,
            options: options.clone(),
        });

        if options.auto_refresh {
            let handle = tokio::spawn(refresh_loop(
                Arc::downgrade(&self.inner),
                options.refresh_interval,
            ));
            self.inner.tasks.lock().refresh = Some(handle);
        }
        if options.auto_close {
            self.reset_close_task(options.close_delay);
        }

        if options.verbose {
            tracing::info!("Gemini client initialized successfully.");
        }
        Ok(())
    }

    /// Close the session after `delay`, cancelling the background tasks.
    pub async fn close(&self, delay: Duration) {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.inner.shutdown();
    }

    fn reset_close_task(&self, delay: Duration) {
        let weak = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                tracing::debug!("Closing idle Gemini client");
                inner.shutdown();
            }
        });
        if let Some(previous) = self.inner.tasks.lock().close.replace(handle) {
            previous.abort();
        }
    }

    /// Credentials and options of the running session.
    fn session_snapshot(&self) -> Result<(Credentials, ClientOptions)> {
        self.inner
            .session
            .read()
            .as_ref()
            .map(|s| (s.credentials.clone(), s.options.clone()))
            .ok_or(GeminiError::NotInitialized)
    }

    /// Upload files concurrently, keeping input order.
    async fn upload_files(&self, files: &[PathBuf]) -> Result<Vec<UploadedFile>> {
        let uploads = files.iter().map(|path| async move {
            let name = validate_file(path).await?;
            let reference = self.inner.uploader.upload(path).await?;
            Ok::<_, GeminiError>(UploadedFile { reference, name })
        });
        futures::future::try_join_all(uploads).await
    }

    /// Send one turn. When `state` is given it is sent with the request and
    /// updated from the reply.
    pub async fn generate_content(
        &self,
        request: GenerateRequest,
        state: Option<&mut ConversationState>,
    ) -> Result<ModelOutput> {
        if request.prompt.is_empty() {
            return Err(GeminiError::InvalidInput("Prompt cannot be empty.".to_string()));
        }
        let model = request.model.resolve()?;

        let (credentials, options) = self.session_snapshot()?;
        if options.auto_close {
            self.reset_close_task(options.close_delay);
        }

        let files = self.upload_files(&request.files).await?;
        let payload = build_generate_payload(
            &request.prompt,
            &files,
            state.as_deref(),
            request.gem_id.as_deref(),
        );

        let url = match &credentials.build_label {
            Some(bl) => {
                let reqid = request_id();
                let mut params = vec![("bl", bl.as_str())];
                if let Some(sid) = &credentials.session_id {
                    params.push(("f.sid", sid.as_str()));
                }
                params.extend([("hl", "en"), ("_reqid", reqid.as_str()), ("rt", "c")]);
                reqwest::Url::parse_with_params(GENERATE_URL, &params)
                    .map(String::from)
                    .unwrap_or_else(|_| GENERATE_URL.to_string())
            }
            None => GENERATE_URL.to_string(),
        };

        let http_request = HttpRequest::post_form(
            url,
            vec![
                ("at".to_string(), credentials.access_token.clone()),
                ("f.req".to_string(), payload),
            ],
        )
        .with_headers(gemini_headers())
        .with_headers(model.headers.clone())
        .with_cookies(&credentials.cookies)
        .with_timeout(options.timeout);

        let resp = self
            .inner
            .transport
            .send(http_request)
            .await
            .map_err(|e| e.into_gemini("Generate content request timed out, please try again."))?;

        if resp.status != 200 {
            self.inner.shutdown();
            return Err(GeminiError::Api(format!(
                "Failed to generate contents. Request failed with status code {}",
                resp.status
            )));
        }

        let ctx = ImageContext {
            proxy: self.inner.proxy.clone(),
            cookies: credentials.cookies,
        };
        let output = match decoder::decode_response(&resp.body, &ctx) {
            Ok(output) => output,
            Err(failure) => {
                tracing::debug!(?failure, body = %resp.body, "Invalid generate response");
                if !failure.keeps_session() {
                    self.inner.shutdown();
                }
                return Err(failure.into_error(&model.name));
            }
        };

        if let Some(state) = state {
            state.apply_reply(&output)?;
        }
        Ok(output)
    }

    /// Send several RPC calls in one batchexecute request and return the
    /// raw response body.
    pub async fn batch_execute(&self, payloads: &[RpcData]) -> Result<String> {
        let (credentials, options) = self.session_snapshot()?;
        let calls: Vec<Value> = payloads.iter().map(RpcData::serialize).collect();
        let request = HttpRequest::post_form(
            BATCH_EXEC_URL,
            vec![
                ("at".to_string(), credentials.access_token.clone()),
                ("f.req".to_string(), json!([calls]).to_string()),
            ],
        )
        .with_headers(gemini_headers())
        .with_cookies(&credentials.cookies)
        .with_timeout(options.timeout);

        let resp = self
            .inner
            .transport
            .send(request)
            .await
            .map_err(|e| e.into_gemini("Batch execute request timed out."))?;

        if resp.status != 200 {
            self.inner.shutdown();
            return Err(GeminiError::Api(format!(
                "Batch execution failed with status code {}",
                resp.status
            )));
        }
        Ok(resp.body)
    }

    /// Start a conversation bound to this client.
    pub fn start_chat(&self) -> ChatSession {
        ChatSession::new(self.clone())
    }

    pub(crate) fn close_now(&self) {
        self.inner.shutdown();
    }

    pub(crate) fn cached_gems(&self) -> Option<GemJar> {
        self.inner.gems.read().clone()
    }

    pub(crate) fn store_gems(&self, jar: GemJar) {
        *self.inner.gems.write() = Some(jar);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_inner(payload: &str) -> Value {
        let outer: Value = serde_json::from_str(payload).unwrap();
        assert_eq!(outer[0], Value::Null);
        serde_json::from_str(outer[1].as_str().unwrap()).unwrap()
    }

    #[test]
    fn payload_without_files_or_gem() {
        let mut state = ConversationState::new();
        state.replace([Some("c1".into()), Some("r1".into()), Some("rc1".into())]);
        let inner = decode_inner(&build_generate_payload("prompt", &[], Some(&state), None));
        assert_eq!(inner, json!([["prompt"], null, ["c1", "r1", "rc1"]]));
    }

    #[test]
    fn payload_without_state_sends_null_metadata() {
        let inner = decode_inner(&build_generate_payload("hi", &[], None, None));
        assert_eq!(inner, json!([["hi"], null, null]));
    }

    #[test]
    fn payload_embeds_upload_references() {
        let files = vec![UploadedFile {
            reference: "/contrib_service/ttl_1d/abc".into(),
            name: "cat.png".into(),
        }];
        let inner = decode_inner(&build_generate_payload("describe", &files, None, None));
        assert_eq!(
            inner[0],
            json!(["describe", 0, null, [[[["/contrib_service/ttl_1d/abc"], "cat.png"]]]])
        );
    }

    #[test]
    fn gem_id_follows_sixteen_nulls() {
        let inner = decode_inner(&build_generate_payload("hi", &[], None, Some("gem-1")));
        let items = inner.as_array().unwrap();
        assert_eq!(items.len(), 3 + 16 + 1);
        assert!(items[3..19].iter().all(Value::is_null));
        assert_eq!(items[19], json!("gem-1"));
    }
}
