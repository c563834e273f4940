use std::time::Duration;

use threadline_common::ThreadlineError;
use threadline_social::{SocialApi, SocialData, SocialRepository};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn repository_for(server: &MockServer) -> SocialRepository {
    let api = SocialApi::new(&server.uri())
        .unwrap()
        .with_retries(1)
        .with_backoff(Duration::from_millis(5));
    SocialRepository::new(api)
}

#[tokio::test]
async fn lists_first_page_of_threads() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/thread/"))
        .and(query_param("hashtag", "golang"))
        .and(query_param("page_size", "5"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"data":[
                {"_id":"t1","text":"go!","user_id":"u1","likes":1,"parent_thread":"","repost_count":0},
                {"_id":"t2","text":"gophers","user_id":"u2","likes":4,"parent_thread":"t1","repost_count":2}
            ],"next_page":"abc"}"#,
        ))
        .expect(1)
        .mount(&server)
        .await;

    let page = repository_for(&server).list_threads("golang").await.unwrap();
    assert_eq!(page.data.len(), 2);
    assert_eq!(page.data[1].parent_thread, "t1");
    assert_eq!(page.next_page, "abc");
}

#[tokio::test]
async fn fetches_account_by_user_id() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/account/u1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"_id":"u1","display_name":"Gopher","username":"gopher",
                "profile_image_url":"","description":"","follower":7,"following":3}"#,
        ))
        .expect(1)
        .mount(&server)
        .await;

    let account = repository_for(&server).get_account_info("u1").await.unwrap();
    assert_eq!(account.id, "u1");
    assert_eq!(account.follower, 7);
}

#[tokio::test]
async fn malformed_body_is_a_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/account/u9"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let err = repository_for(&server)
        .get_account_info("u9")
        .await
        .unwrap_err();
    assert!(matches!(err, ThreadlineError::Decode(_)));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn missing_account_surfaces_upstream_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/account/ghost"))
        .respond_with(ResponseTemplate::new(404).set_body_string(r#"{"message":"not found"}"#))
        .expect(1)
        .mount(&server)
        .await;

    let err = repository_for(&server)
        .get_account_info("ghost")
        .await
        .unwrap_err();
    match err {
        ThreadlineError::Upstream { status, message } => {
            assert_eq!(status, 404);
            assert_eq!(message, "not found");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn blank_user_id_is_rejected_locally() {
    let server = MockServer::start().await;
    let err = repository_for(&server)
        .get_account_info("  ")
        .await
        .unwrap_err();
    assert!(matches!(err, ThreadlineError::InvalidInput(_)));
}
