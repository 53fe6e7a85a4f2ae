use super::*;
use crate::net::types::ApiError;

#[test]
fn busy_is_informational() {
    let notice = ai_failure_notice(&AiError::Busy).unwrap();
    assert!(!notice.is_error());
    assert_eq!(notice.message(), "AI优化重写正在进行中，请稍候...");
}

#[test]
fn cancelled_is_silent() {
    assert_eq!(ai_failure_notice(&AiError::Cancelled), None);
}

#[test]
fn everything_else_is_an_error() {
    assert_eq!(ai_failure_notice(&AiError::Unauthenticated), Some(Notice::Error("请先登录".into())));
    assert!(ai_failure_notice(&AiError::Timeout { after_ms: 1 }).unwrap().is_error());
    assert_eq!(
        ai_failure_notice(&AiError::Failure { message: "bad".into() }),
        Some(Notice::Error("bad".into()))
    );
}

#[test]
fn api_errors_render_their_message() {
    let err = ApiError::Api { message: "笔记不存在".into(), status: Some(404) };
    assert_eq!(failure_notice(&err), Notice::Error("笔记不存在".into()));
}
