use std::time::Duration;

use threadline_http::{HttpClient, HttpError, RequestOpts};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> HttpClient {
    HttpClient::new(&server.uri())
        .unwrap()
        .with_retries(2)
        .with_backoff(Duration::from_millis(5))
}

#[tokio::test]
async fn retries_server_errors_then_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/account/u1"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/account/u1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"_id":"u1"}"#))
        .expect(1)
        .mount(&server)
        .await;

    let body = client_for(&server)
        .get_text("account/u1", RequestOpts::default())
        .await
        .unwrap();
    assert_eq!(body, r#"{"_id":"u1"}"#);
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/account/missing"))
        .respond_with(
            ResponseTemplate::new(404).set_body_string(r#"{"message":"account not found"}"#),
        )
        .expect(1)
        .mount(&server)
        .await;

    let err = client_for(&server)
        .get_text("account/missing", RequestOpts::default())
        .await
        .unwrap_err();
    match err {
        HttpError::Api {
            status, message, ..
        } => {
            assert_eq!(status.as_u16(), 404);
            assert_eq!(message, "account not found");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn gives_up_after_retry_budget() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/thread/"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let err = client_for(&server)
        .get_text("thread/", RequestOpts::default())
        .await
        .unwrap_err();
    assert!(matches!(err, HttpError::Api { .. }));
}

#[tokio::test]
async fn query_params_are_sent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/thread/"))
        .and(query_param("hashtag", "rust"))
        .and(query_param("page_size", "5"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"data":[]}"#))
        .expect(1)
        .mount(&server)
        .await;

    let body = client_for(&server)
        .get_text(
            "thread/",
            RequestOpts {
                query: Some(vec![("hashtag", "rust".into()), ("page_size", "5".into())]),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(body, r#"{"data":[]}"#);
}

#[tokio::test]
async fn non_utf8_body_is_a_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xff, 0xfe, 0x00]))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .get_text("broken", RequestOpts::default())
        .await
        .unwrap_err();
    assert!(matches!(err, HttpError::Decode(_, _)));
}
