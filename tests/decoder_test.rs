use gemini_web_client::decoder::{DecodeFailure, ImageContext, decode_response};
use gemini_web_client::types::{Cookies, Image};
use gemini_web_client::GeminiError;
use serde_json::{Value, json};

fn frame(body: &Value) -> Value {
    json!(["wrb.fr", null, body.to_string()])
}

/// Candidate array with the given slots filled in.
fn candidate(rcid: &str, text: &str, slots: &[(usize, Value)]) -> Value {
    let mut items = vec![Value::Null; 38];
    items[0] = json!(rcid);
    items[1] = json!([text]);
    for (index, value) in slots {
        items[*index] = value.clone();
    }
    Value::Array(items)
}

fn body(candidates: Vec<Value>) -> Value {
    json!([null, ["c1", "r1"], null, null, candidates])
}

fn image_context() -> ImageContext {
    let mut cookies = Cookies::new();
    cookies.insert("__Secure-1PSID".into(), "psid".into());
    ImageContext {
        proxy: Some("http://proxy:8080".into()),
        cookies,
    }
}

#[test]
fn body_on_second_line_after_framing_noise() {
    let text = format!(
        ")]}}'\n{}\n{}",
        frame(&body(vec![candidate("rc1", "Hello", &[])])),
        json!(["di", 42])
    );
    let output = decode_response(&text, &ImageContext::default()).unwrap();
    assert_eq!(output.text(), "Hello");
    assert_eq!(output.rcid(), "rc1");
    assert_eq!(output.metadata(), &[Some("c1".to_string()), Some("r1".to_string())]);
}

#[test]
fn body_is_found_after_leading_frames() {
    let text = format!(
        ")]}}'\n\n{}\n{}\n",
        json!([["wrb.fr", null, null], ["di", 12]]),
        json!([frame(&body(vec![candidate("rc1", "late body", &[])]))])
    );
    let output = decode_response(&text, &ImageContext::default()).unwrap();
    assert_eq!(output.text(), "late body");
}

#[test]
fn missing_body_without_code_is_a_plain_failure() {
    let failure = decode_response(")]}'\n\n[[\"e\",4,null,null,144]]\n", &ImageContext::default())
        .unwrap_err();
    assert_eq!(failure, DecodeFailure::NoBody { error_code: None });
    assert!(!failure.keeps_session());
    assert!(matches!(failure.into_error("unspecified"), GeminiError::Api(_)));
}

#[test]
fn missing_body_reports_remote_code() {
    let blocked = json!([[null, null, null, null, null, [null, null, [[null, [1060]]]]]]);
    let failure = decode_response(&format!(")]}}'\n{blocked}\n"), &ImageContext::default())
        .unwrap_err();
    assert_eq!(failure, DecodeFailure::NoBody { error_code: Some(1060) });
    assert!(matches!(
        failure.into_error("unspecified"),
        GeminiError::TemporarilyBlocked(_)
    ));
}

#[test]
fn thoughts_and_web_images_are_decoded() {
    let web_image = json!([
        [["https://example.com/cat.jpg"], null, null, null, "a cat"],
        null, null, null, null, null, null,
        ["Cat picture"]
    ]);
    let cand = candidate(
        "rc1",
        "Here is a cat",
        &[
            (12, json!([null, [web_image]])),
            (37, json!([["I should find a cat."]])),
        ],
    );
    let text = json!([frame(&body(vec![cand]))]).to_string();
    let output = decode_response(&text, &image_context()).unwrap();

    assert_eq!(output.thoughts(), Some("I should find a cat."));
    let images = output.images();
    assert_eq!(images.len(), 1);
    let Image::Web(img) = &images[0] else {
        panic!("expected a web image");
    };
    assert_eq!(img.url, "https://example.com/cat.jpg");
    assert_eq!(img.title, "Cat picture");
    assert_eq!(img.alt, "a cat");
    assert_eq!(img.proxy.as_deref(), Some("http://proxy:8080"));
}

fn generated_image(url: &str, number: Value, alts: Value) -> Value {
    json!([
        [null, null, null, [null, null, null, url]],
        null,
        null,
        [null, null, null, null, null, alts, number]
    ])
}

#[test]
fn generated_images_come_from_a_later_frame() {
    let placeholder = candidate(
        "rc1",
        "Generating...",
        &[(12, json!([null, null, null, null, null, null, null, [true]]))],
    );
    let finished = candidate(
        "rc1",
        "Here you go http://googleusercontent.com/image_generation_content/0",
        &[(
            12,
            json!([null, null, null, null, null, null, null, [[
                generated_image("https://lh3/a", json!(1), json!(["a red fox", "a blue fox"])),
                generated_image("https://lh3/b", json!(2), json!(["", "a blue fox"])),
                generated_image("https://lh3/c", Value::Null, Value::Null)
            ]]]),
        )],
    );
    let text = format!(
        ")]}}'\n{}\n{}\n",
        json!([frame(&body(vec![placeholder]))]),
        json!([frame(&body(vec![finished]))])
    );

    let output = decode_response(&text, &image_context()).unwrap();
    assert_eq!(output.text(), "Here you go");

    let generated = &output.chosen().generated_images;
    assert_eq!(generated.len(), 3);
    assert_eq!(generated[0].title, "[Generated Image 1]");
    assert_eq!(generated[0].alt, "a red fox");
    assert_eq!(generated[1].alt, "a blue fox");
    assert_eq!(generated[2].title, "[Generated Image]");
    assert_eq!(generated[2].alt, "");
    assert_eq!(
        generated[0].cookies.get("__Secure-1PSID").map(String::as_str),
        Some("psid")
    );
}

#[test]
fn announced_images_that_never_arrive_fail_the_turn() {
    let placeholder = candidate(
        "rc1",
        "Generating...",
        &[(12, json!([null, null, null, null, null, null, null, [true]]))],
    );
    let text = json!([frame(&body(vec![placeholder]))]).to_string();

    let failure = decode_response(&text, &ImageContext::default()).unwrap_err();
    assert_eq!(failure, DecodeFailure::ImagesMissing { candidate_index: 0 });
    assert!(failure.keeps_session());
    assert!(matches!(
        failure.into_error("unspecified"),
        GeminiError::ImageGeneration(_)
    ));
}
