use super::*;

fn timeouts() -> HttpTimeouts {
    HttpTimeouts { request_secs: 5, connect_secs: 1 }
}

#[test]
fn methods_map_to_reqwest() {
    assert_eq!(to_reqwest_method(Method::Get), reqwest::Method::GET);
    assert_eq!(to_reqwest_method(Method::Post), reqwest::Method::POST);
    assert_eq!(to_reqwest_method(Method::Put), reqwest::Method::PUT);
    assert_eq!(to_reqwest_method(Method::Delete), reqwest::Method::DELETE);
}

#[tokio::test]
async fn malformed_url_is_invalid_url() {
    let transport = ReqwestTransport::new(timeouts()).unwrap();
    let err = transport
        .send(HttpRequest { method: Method::Get, url: "not a url".into(), body: None })
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::InvalidUrl(_)), "got {err:?}");
}

#[tokio::test]
async fn refused_connection_is_network_error() {
    let transport = ReqwestTransport::new(timeouts()).unwrap();
    let err = transport
        .send(HttpRequest { method: Method::Get, url: "http://127.0.0.1:9/api/notes".into(), body: None })
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Network(_)), "got {err:?}");
}
