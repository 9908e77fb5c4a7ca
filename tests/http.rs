mod common;

use actix_web::{App, http::StatusCode, test, web};
use chrono::{Duration, Utc};
use serde_json::{Value, json};

use common::*;
use raffle_backend::handlers;
use raffle_backend::middlewares::AuthMiddleware;
use raffle_backend::utils::JwtService;

const SECRET: &str = "http-test-secret";

fn bearer(user: &str) -> (&'static str, String) {
    let token = JwtService::new(SECRET, 3600)
        .generate_access_token(user)
        .unwrap();
    ("Authorization", format!("Bearer {token}"))
}

macro_rules! app {
    ($harness:expr) => {
        test::init_service(
            App::new()
                .wrap(AuthMiddleware::new(JwtService::new(SECRET, 3600)))
                .app_data(web::Data::new($harness.service.clone()))
                .service(web::scope("/api/v1").configure(handlers::raffle_config)),
        )
        .await
    };
}

fn create_body() -> Value {
    json!({
        "name": "Launch party",
        "group_id": "group-1",
        "deadline": (Utc::now() + Duration::hours(1)).to_rfc3339(),
        "prize_lines": [
            { "name": "Gold", "description": "gold coin", "count": 1 },
            { "name": "none", "description": "none", "count": 2 }
        ],
        "keyword": "party"
    })
}

#[actix_web::test]
async fn test_requests_without_token_are_rejected() {
    let h = Harness::memory();
    let app = app!(h);

    let req = test::TestRequest::get()
        .uri("/api/v1/raffles/open?group_id=group-1")
        .to_request();
    let resp = test::try_call_service(&app, req).await;
    let status = match resp {
        Ok(resp) => resp.status(),
        Err(e) => e.error_response().status(),
    };
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn test_create_join_and_cancel_flow() {
    let h = Harness::memory();
    let app = app!(h);

    let req = test::TestRequest::post()
        .uri("/api/v1/raffles")
        .insert_header(bearer("owner"))
        .set_json(create_body())
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["state"], "active");
    assert_eq!(body["data"]["creator_id"], "owner");
    let id = body["data"]["id"].as_str().unwrap().to_string();

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/raffles/{id}"))
        .insert_header(bearer("alice"))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["prize_lines"][0]["is_no_win"], false);
    assert_eq!(body["data"]["prize_lines"][1]["is_no_win"], true);

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/raffles/{id}/join"))
        .insert_header(bearer("alice"))
        .set_json(json!({ "display_name": "Alice" }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["result"], "joined");

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/raffles/{id}/join"))
        .insert_header(bearer("alice"))
        .set_json(json!({ "display_name": "Alice" }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["result"], "already_joined");

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/raffles/{id}/participants/me"))
        .insert_header(bearer("alice"))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["joined"], true);
    assert_eq!(body["data"]["participant_count"], 1);

    let req = test::TestRequest::get()
        .uri("/api/v1/raffles/match?group_id=group-1&keyword=PARTY")
        .insert_header(bearer("alice"))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"][0]["id"], id.as_str());

    // 非创建者不能取消
    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/raffles/{id}/cancel"))
        .insert_header(bearer("alice"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/raffles/{id}/cancel"))
        .insert_header(bearer("owner"))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["activity"]["state"], "cancelled");

    // 取消后报名返回 409
    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/raffles/{id}/join"))
        .insert_header(bearer("bob"))
        .set_json(json!({ "display_name": "Bob" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "CONFLICT");

    let req = test::TestRequest::get()
        .uri("/api/v1/raffles/history?group_id=group-1")
        .insert_header(bearer("owner"))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["total"], 1);

    let req = test::TestRequest::delete()
        .uri(&format!("/api/v1/raffles/{id}"))
        .insert_header(bearer("owner"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/raffles/{id}"))
        .insert_header(bearer("owner"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn test_invalid_create_is_bad_request() {
    let h = Harness::memory();
    let app = app!(h);

    let mut body = create_body();
    body["prize_lines"] = json!([]);
    let req = test::TestRequest::post()
        .uri("/api/v1/raffles")
        .insert_header(bearer("owner"))
        .set_json(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}
