//! Scripted collaborators for driving the client without a network.

#![allow(dead_code)]

use async_trait::async_trait;
use gemini_web_client::constants::{
    BATCH_EXEC_URL, GENERATE_URL, GOOGLE_URL, INIT_URL, ROTATE_COOKIES_URL, rpc,
};
use gemini_web_client::transport::{
    FileUploader, HttpRequest, HttpResponse, Transport, TransportError,
};
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::path::Path;

pub const ACCESS_TOKEN: &str = "AT-test";

type Handler = Box<dyn Fn(&HttpRequest) -> Result<HttpResponse, TransportError> + Send + Sync>;

/// Answers every request with `handler` and records it.
pub struct FakeTransport {
    handler: Handler,
    requests: Mutex<Vec<HttpRequest>>,
}

impl FakeTransport {
    pub fn new(
        handler: impl Fn(&HttpRequest) -> Result<HttpResponse, TransportError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Google home and a token bearing init page; `generate` answers the
    /// StreamGenerate endpoint, anything else is a 404.
    pub fn gemini(
        generate: impl Fn(&HttpRequest) -> Result<HttpResponse, TransportError> + Send + Sync + 'static,
    ) -> Self {
        Self::new(move |req| {
            if req.url.starts_with(GENERATE_URL) {
                generate(req)
            } else {
                session_page(req)
            }
        })
    }

    /// Same pages as [`FakeTransport::gemini`], with `batch` answering
    /// batchexecute instead.
    pub fn batch(
        batch: impl Fn(&HttpRequest) -> Result<HttpResponse, TransportError> + Send + Sync + 'static,
    ) -> Self {
        Self::new(move |req| {
            if req.url.starts_with(BATCH_EXEC_URL) {
                batch(req)
            } else {
                session_page(req)
            }
        })
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    pub fn requests_to(&self, url_prefix: &str) -> Vec<HttpRequest> {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.url.starts_with(url_prefix))
            .cloned()
            .collect()
    }

    pub fn rotations(&self) -> usize {
        self.requests_to(ROTATE_COOKIES_URL).len()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let response = (self.handler)(&request);
        self.requests.lock().push(request);
        response
    }
}

/// Returns `/contrib_service/<file name>` for every upload.
#[derive(Default)]
pub struct FakeUploader {
    pub uploaded: Mutex<Vec<String>>,
}

#[async_trait]
impl FileUploader for FakeUploader {
    async fn upload(&self, path: &Path) -> gemini_web_client::Result<String> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        self.uploaded.lock().push(name.clone());
        Ok(format!("/contrib_service/{name}"))
    }
}

fn session_page(req: &HttpRequest) -> Result<HttpResponse, TransportError> {
    if req.url == GOOGLE_URL {
        Ok(HttpResponse::new(200, "").with_cookie("NID", "anon"))
    } else if req.url == INIT_URL {
        Ok(HttpResponse::new(200, init_page(ACCESS_TOKEN)))
    } else {
        Ok(HttpResponse::new(404, ""))
    }
}

pub fn init_page(token: &str) -> String {
    format!(
        r#"<html><script>window.WIZ_global_data = {{"SNlM0e":"{token}","cfb2h":"boq_bard_test","FdrFJe":"-1234"}};</script></html>"#
    )
}

/// A StreamGenerate response carrying `body` in a single frame.
pub fn stream_response(body: &Value) -> String {
    let frames = json!([["wrb.fr", null, body.to_string()]]);
    format!(")]}}'\n\n{}\n{frames}\n", frames.to_string().len())
}

/// Body with conversation metadata and `(rcid, text)` candidates.
pub fn reply_body(cid: &str, rid: &str, candidates: &[(&str, &str)]) -> Value {
    let candidates: Vec<Value> = candidates
        .iter()
        .map(|(rcid, text)| json!([rcid, [text]]))
        .collect();
    json!([null, [cid, rid], null, null, candidates])
}

/// The inner `f.req` array of a generate request.
pub fn generate_inner(request: &HttpRequest) -> Value {
    let f_req = request.form_field("f.req").expect("f.req field");
    let outer: Value = serde_json::from_str(f_req).expect("outer f.req");
    assert_eq!(outer[0], Value::Null);
    serde_json::from_str(outer[1].as_str().expect("inner string")).expect("inner f.req")
}

/// One gem list frame, tagged `system` or `custom`.
pub fn gem_listing(tag: &str, gems: Value) -> Value {
    json!([
        "wrb.fr",
        rpc::LIST_GEMS,
        json!([null, null, gems]).to_string(),
        null,
        null,
        null,
        tag
    ])
}
