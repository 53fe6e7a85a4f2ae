use super::*;
use serde_json::json;

fn draft() -> NoteDraft {
    NoteDraft {
        title: "Rust ownership".into(),
        content: "Borrowing rules.".into(),
        category: "编程".into(),
        tags: Tags::parse("rust, memory"),
    }
}

// =============================================================
// Tags
// =============================================================

#[test]
fn tags_parse_trims_and_drops_empty_entries() {
    let tags = Tags::parse(" a, ,b ,c,");
    assert_eq!(tags.as_slice(), ["a", "b", "c"]);
    assert_eq!(tags.joined(), "a, b, c");
}

#[test]
fn tags_parse_accepts_json_array_string() {
    let tags = Tags::parse(r#"["x", " y ", ""]"#);
    assert_eq!(tags.as_slice(), ["x", "y"]);
}

#[test]
fn tags_deserialize_from_string_list_or_null() {
    let from_str: Tags = serde_json::from_value(json!("a,b")).unwrap();
    let from_list: Tags = serde_json::from_value(json!(["a", "b"])).unwrap();
    let from_null: Tags = serde_json::from_value(json!(null)).unwrap();
    assert_eq!(from_str, from_list);
    assert!(from_null.is_empty());
}

#[test]
fn tags_serialize_as_comma_string() {
    assert_eq!(serde_json::to_value(Tags::parse("a,b")).unwrap(), json!("a, b"));
}

// =============================================================
// Note decoding
// =============================================================

#[test]
fn list_item_without_content_decodes() {
    let note: Note = serde_json::from_value(json!({
        "id": 1,
        "title": "t",
        "category": "c",
        "tags": "x,y",
        "filename": "1.md",
        "created_at": null
    }))
    .unwrap();
    assert_eq!(note.content, "");
    assert_eq!(note.tags.as_slice(), ["x", "y"]);
    assert_eq!(note.created_at, None);
}

#[test]
fn update_body_flattens_draft() {
    let d = draft();
    let body = serde_json::to_value(NoteUpdate { id: 7, draft: &d }).unwrap();
    assert_eq!(
        body,
        json!({
            "id": 7,
            "title": "Rust ownership",
            "content": "Borrowing rules.",
            "category": "编程",
            "tags": "rust, memory"
        })
    );
}

// =============================================================
// NoteDraft::validate
// =============================================================

#[test]
fn valid_draft_passes() {
    assert!(draft().validate().is_ok());
}

#[test]
fn blank_title_and_content_are_both_reported() {
    let d = NoteDraft { title: "  ".into(), content: String::new(), ..draft() };
    let NoteError::Invalid(errors) = d.validate().unwrap_err();
    assert_eq!(errors, vec!["标题不能为空".to_owned(), "内容不能为空".to_owned()]);
}

#[test]
fn limits_count_characters_not_bytes() {
    let d = NoteDraft { title: "笔".repeat(TITLE_MAX_CHARS), ..draft() };
    assert!(d.validate().is_ok());

    let d = NoteDraft { title: "笔".repeat(TITLE_MAX_CHARS + 1), ..draft() };
    assert!(d.validate().is_err());

    let d = NoteDraft { category: "c".repeat(CATEGORY_MAX_CHARS + 1), ..draft() };
    assert!(d.validate().unwrap_err().to_string().contains("分类长度"));
}

#[test]
fn search_query_rules() {
    assert!(validate_search_query("rust").is_ok());
    assert!(validate_search_query("   ").is_err());
    assert!(validate_search_query(&"q".repeat(QUERY_MAX_CHARS + 1)).is_err());
}

// =============================================================
// Session / optimize wire types
// =============================================================

#[test]
fn credentials_default_model() {
    let creds: Credentials = serde_json::from_value(json!({"api_url": "https://ai", "api_key": "k"})).unwrap();
    assert_eq!(creds.model, DEFAULT_MODEL);
}

#[test]
fn optimize_request_omits_missing_prompt() {
    let body = serde_json::to_value(OptimizeRequest { content: "c".into(), prompt: None }).unwrap();
    assert_eq!(body, json!({"content": "c"}));
}

#[test]
fn optimize_response_tolerates_sparse_body() {
    let resp: OptimizeResponse = serde_json::from_value(json!({"optimized": "better"})).unwrap();
    assert_eq!(resp.optimized.as_deref(), Some("better"));
    assert_eq!(resp.tags, None);
    assert_eq!(resp.graph, None);
}
