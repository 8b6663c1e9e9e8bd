mod common;

use common::{ACCESS_TOKEN, FakeTransport, init_page};
use gemini_web_client::auth::{CookieCache, CredentialManager, FileCookieCache, MemoryCookieCache};
use gemini_web_client::constants::{
    GOOGLE_URL, INIT_URL, ROTATE_COOKIES_BODY, ROTATE_COOKIES_URL, SECURE_1PSID, SECURE_1PSIDTS,
};
use gemini_web_client::transport::{HttpResponse, Method, RequestBody};
use gemini_web_client::types::Cookies;
use gemini_web_client::GeminiError;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

fn cookies(pairs: &[(&str, &str)]) -> Cookies {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Serves a token only to requests whose `__Secure-1PSIDTS` equals `valid`.
fn accepting_psidts(valid: &'static str) -> Arc<FakeTransport> {
    Arc::new(FakeTransport::new(move |req| {
        if req.url == GOOGLE_URL {
            return Ok(HttpResponse::new(200, "").with_cookie("NID", "anon"));
        }
        if req.cookies.get(SECURE_1PSIDTS).map(String::as_str) == Some(valid) {
            Ok(HttpResponse::new(200, init_page(ACCESS_TOKEN)))
        } else {
            Ok(HttpResponse::new(200, "<html>Sign in</html>"))
        }
    }))
}

#[tokio::test]
async fn seed_cookies_are_tried_first() {
    let transport = accepting_psidts("ts-seed");
    let cache = Arc::new(MemoryCookieCache::new());
    cache.write("psid", "ts-cached").await.unwrap();
    let manager = CredentialManager::new(transport.clone(), cache);

    let creds = manager
        .acquire_token(&cookies(&[(SECURE_1PSID, "psid"), (SECURE_1PSIDTS, "ts-seed")]))
        .await
        .unwrap();
    assert_eq!(creds.access_token, ACCESS_TOKEN);
    assert_eq!(creds.build_label.as_deref(), Some("boq_bard_test"));
    assert_eq!(creds.session_id.as_deref(), Some("-1234"));
    assert_eq!(creds.cookies.get("NID").map(String::as_str), Some("anon"));
    assert_eq!(transport.requests_to(INIT_URL).len(), 1);
}

#[tokio::test]
async fn falls_back_to_cached_rotating_cookie() {
    let transport = accepting_psidts("ts-cached");
    let cache = Arc::new(MemoryCookieCache::new());
    cache.write("psid", "ts-cached").await.unwrap();
    let manager = CredentialManager::new(transport.clone(), cache);

    let creds = manager
        .acquire_token(&cookies(&[(SECURE_1PSID, "psid"), (SECURE_1PSIDTS, "ts-stale")]))
        .await
        .unwrap();
    assert_eq!(
        creds.cookies.get(SECURE_1PSIDTS).map(String::as_str),
        Some("ts-cached")
    );

    let probes = transport.requests_to(INIT_URL);
    assert_eq!(probes.len(), 2);
    assert_eq!(
        probes[0].cookies.get(SECURE_1PSIDTS).map(String::as_str),
        Some("ts-stale")
    );
}

#[tokio::test]
async fn seed_without_rotating_cookie_uses_the_cache_only() {
    let transport = accepting_psidts("ts-cached");
    let cache = Arc::new(MemoryCookieCache::new());
    cache.write("psid", "ts-cached").await.unwrap();
    let manager = CredentialManager::new(transport.clone(), cache);

    manager
        .acquire_token(&cookies(&[(SECURE_1PSID, "psid")]))
        .await
        .unwrap();
    assert_eq!(transport.requests_to(INIT_URL).len(), 1);
}

#[tokio::test]
async fn without_session_id_every_cache_entry_is_tried() {
    let transport = accepting_psidts("ts-b");
    let cache = Arc::new(MemoryCookieCache::new());
    cache.write("psid-a", "ts-a").await.unwrap();
    cache.write("psid-b", "ts-b").await.unwrap();
    let manager = CredentialManager::new(transport.clone(), cache);

    let creds = manager.acquire_token(&Cookies::new()).await.unwrap();
    assert_eq!(creds.cookies.get(SECURE_1PSID).map(String::as_str), Some("psid-b"));
    assert_eq!(transport.requests_to(INIT_URL).len(), 2);
}

#[tokio::test]
async fn no_candidates_is_an_auth_error() {
    let transport = accepting_psidts("never");
    let manager = CredentialManager::new(transport.clone(), Arc::new(MemoryCookieCache::new()));

    let err = manager
        .acquire_token(&cookies(&[(SECURE_1PSID, "psid")]))
        .await
        .unwrap_err();
    assert!(matches!(err, GeminiError::Auth(ref m) if m.contains("No valid cookies")));
    assert!(transport.requests_to(INIT_URL).is_empty());
}

#[tokio::test]
async fn exhausted_candidates_report_attempt_count() {
    let transport = accepting_psidts("never");
    let cache = Arc::new(MemoryCookieCache::new());
    cache.write("psid", "ts-cached").await.unwrap();
    let manager = CredentialManager::new(transport, cache).with_verbose(true);

    let err = manager
        .acquire_token(&cookies(&[(SECURE_1PSID, "psid"), (SECURE_1PSIDTS, "ts-seed")]))
        .await
        .unwrap_err();
    assert!(matches!(err, GeminiError::Auth(ref m) if m.contains("Failed initialization attempts: 2")));
}

#[tokio::test]
async fn failing_probe_moves_on_to_the_next_candidate() {
    let transport = Arc::new(FakeTransport::new(|req| {
        if req.url == GOOGLE_URL {
            return Ok(HttpResponse::new(500, ""));
        }
        match req.cookies.get(SECURE_1PSIDTS).map(String::as_str) {
            Some("ts-cached") => Ok(HttpResponse::new(200, init_page(ACCESS_TOKEN))),
            _ => Ok(HttpResponse::new(500, "boom")),
        }
    }));
    let cache = Arc::new(MemoryCookieCache::new());
    cache.write("psid", "ts-cached").await.unwrap();
    let manager = CredentialManager::new(transport, cache);

    let creds = manager
        .acquire_token(&cookies(&[(SECURE_1PSID, "psid"), (SECURE_1PSIDTS, "ts-seed")]))
        .await
        .unwrap();
    assert!(!creds.cookies.contains_key("NID"));
}

fn set_file_age(path: &std::path::Path, age: Duration) {
    let file = std::fs::File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::now() - age).unwrap();
}

fn rotating_transport(status: u16) -> Arc<FakeTransport> {
    Arc::new(FakeTransport::new(move |req| {
        assert_eq!(req.url, ROTATE_COOKIES_URL);
        Ok(HttpResponse::new(status, "").with_cookie(SECURE_1PSIDTS, "ts-new"))
    }))
}

#[tokio::test]
async fn recent_cache_write_debounces_rotation() {
    let dir = tempfile::tempdir().unwrap();
    let cache = Arc::new(FileCookieCache::new(dir.path()));
    cache.write("psid", "ts-old").await.unwrap();
    set_file_age(&cache.path_for("psid"), Duration::from_secs(10));

    let transport = rotating_transport(200);
    let manager = CredentialManager::new(transport.clone(), cache);
    let rotated = manager
        .rotate(&cookies(&[(SECURE_1PSID, "psid"), (SECURE_1PSIDTS, "ts-old")]))
        .await
        .unwrap();
    assert_eq!(rotated, None);
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn stale_cache_rotates_and_persists() {
    let dir = tempfile::tempdir().unwrap();
    let cache = Arc::new(FileCookieCache::new(dir.path()));
    cache.write("psid", "ts-old").await.unwrap();
    set_file_age(&cache.path_for("psid"), Duration::from_secs(120));

    let transport = rotating_transport(200);
    let manager = CredentialManager::new(transport.clone(), cache.clone());
    let rotated = manager
        .rotate(&cookies(&[(SECURE_1PSID, "psid"), (SECURE_1PSIDTS, "ts-old")]))
        .await
        .unwrap();
    assert_eq!(rotated.as_deref(), Some("ts-new"));
    assert_eq!(cache.read("psid").await.unwrap().as_deref(), Some("ts-new"));

    let sent = transport.requests();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].method, Method::Post);
    assert_eq!(
        sent[0].body,
        Some(RequestBody::Raw(ROTATE_COOKIES_BODY.to_string()))
    );
    assert_eq!(sent[0].header("content-type"), Some("application/json"));
}

#[tokio::test]
async fn rotation_without_cache_entry_goes_through() {
    let transport = rotating_transport(200);
    let cache = Arc::new(MemoryCookieCache::new());
    let manager = CredentialManager::new(transport, cache.clone());
    let rotated = manager
        .rotate(&cookies(&[(SECURE_1PSID, "psid")]))
        .await
        .unwrap();
    assert_eq!(rotated.as_deref(), Some("ts-new"));
    assert_eq!(cache.read("psid").await.unwrap().as_deref(), Some("ts-new"));
}

#[tokio::test]
async fn rejected_rotation_is_terminal() {
    let manager = CredentialManager::new(rotating_transport(401), Arc::new(MemoryCookieCache::new()));
    let err = manager
        .rotate(&cookies(&[(SECURE_1PSID, "psid")]))
        .await
        .unwrap_err();
    assert!(matches!(err, GeminiError::Auth(_)));
    assert!(err.is_terminal_for_refresh());
}

#[tokio::test]
async fn server_error_during_rotation_is_transient() {
    let manager = CredentialManager::new(rotating_transport(503), Arc::new(MemoryCookieCache::new()));
    let err = manager
        .rotate(&cookies(&[(SECURE_1PSID, "psid")]))
        .await
        .unwrap_err();
    assert!(matches!(err, GeminiError::Api(_)));
    assert!(!err.is_terminal_for_refresh());
}

#[tokio::test]
async fn rotation_requires_a_session_id() {
    let transport = rotating_transport(200);
    let manager = CredentialManager::new(transport.clone(), Arc::new(MemoryCookieCache::new()));
    let err = manager.rotate(&Cookies::new()).await.unwrap_err();
    assert!(matches!(err, GeminiError::Auth(_)));
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn configured_timeout_reaches_every_request() {
    let transport = accepting_psidts("ts-cached");
    let cache = Arc::new(MemoryCookieCache::new());
    cache.write("psid", "ts-cached").await.unwrap();
    let manager = CredentialManager::new(transport.clone(), cache)
        .with_timeout(Duration::from_secs(7));

    manager
        .acquire_token(&cookies(&[(SECURE_1PSID, "psid"), (SECURE_1PSIDTS, "ts-seed")]))
        .await
        .unwrap();
    let sent = transport.requests();
    assert_eq!(sent.len(), 3);
    assert!(sent.iter().all(|req| req.timeout == Some(Duration::from_secs(7))));

    let transport = rotating_transport(200);
    CredentialManager::new(transport.clone(), Arc::new(MemoryCookieCache::new()))
        .with_timeout(Duration::from_secs(7))
        .rotate(&cookies(&[(SECURE_1PSID, "psid")]))
        .await
        .unwrap();
    assert_eq!(transport.requests()[0].timeout, Some(Duration::from_secs(7)));
}
