//! API integration tests
//!
//! These need a running server backed by a migrated database.

use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

const BASE_URL: &str = "http://localhost:8080/api/v1";

fn unique(prefix: &str) -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("clock before epoch")
        .as_nanos();
    format!("{}_{}", prefix, nanos)
}

/// Sign up a fresh account and return (user id, token)
async fn sign_up_and_in(client: &Client) -> (i64, String) {
    let username = unique("reader");

    let response = client
        .post(format!("{}/auth/signup", BASE_URL))
        .json(&json!({
            "username": username,
            "password": "correct horse",
            "fullName": "Test Reader",
            "email": format!("{}@example.org", username)
        }))
        .send()
        .await
        .expect("Failed to send signup request");
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = client
        .post(format!("{}/auth/signin", BASE_URL))
        .json(&json!({ "username": username, "password": "correct horse" }))
        .send()
        .await
        .expect("Failed to send signin request");
    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse signin response");
    let token = body["token"].as_str().expect("No token in response").to_string();
    let user_id = body["user"]["id"].as_i64().expect("No user id in response");
    (user_id, token)
}

async fn create_book(client: &Client, token: &str) -> i64 {
    let response = client
        .post(format!("{}/books", BASE_URL))
        .bearer_auth(token)
        .json(&json!({
            "title": "A Wizard of Earthsea",
            "author": "Ursula K. Le Guin",
            "isbn": "9780547773742",
            "publishedDate": "1968-11-01T00:00:00Z"
        }))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::CREATED);

    let body: Value = response.json().await.expect("Failed to parse response");
    body["id"].as_i64().expect("No book id")
}

async fn book_available(client: &Client, token: &str, id: i64) -> bool {
    let body: Value = client
        .get(format!("{}/books/{}", BASE_URL, id))
        .bearer_auth(token)
        .send()
        .await
        .expect("Failed to send request")
        .json()
        .await
        .expect("Failed to parse response");
    body["isAvailable"].as_bool().expect("No availability flag")
}

#[tokio::test]
#[ignore] // Run with: cargo test -- --ignored
async fn test_health_check() {
    let client = Client::new();

    let response = client
        .get(format!("{}/health", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
#[ignore]
async fn test_signin_and_me() {
    let client = Client::new();
    let (user_id, token) = sign_up_and_in(&client).await;

    let response = client
        .get(format!("{}/auth/me", BASE_URL))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");
    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["id"].as_i64(), Some(user_id));
    assert!(body.get("password").is_none());
}

#[tokio::test]
#[ignore]
async fn test_wrong_password_is_rejected() {
    let client = Client::new();

    let response = client
        .post(format!("{}/auth/signin", BASE_URL))
        .json(&json!({ "username": unique("nobody"), "password": "nope" }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
#[ignore]
async fn test_loans_require_token() {
    let client = Client::new();

    let response = client
        .get(format!("{}/loans/1", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = client
        .get(format!("{}/loans/1", BASE_URL))
        .bearer_auth("not-a-jwt")
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
#[ignore]
async fn test_loan_lifecycle() {
    let client = Client::new();
    let (user_id, token) = sign_up_and_in(&client).await;
    let book_id = create_book(&client, &token).await;

    let response = client
        .post(format!("{}/loans/{}", BASE_URL, user_id))
        .bearer_auth(&token)
        .json(&json!({ "data": [{ "bookId": book_id, "dueDate": "2030-01-15T00:00:00Z" }] }))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::CREATED);

    let loans: Value = response.json().await.expect("Failed to parse response");
    let loan_id = loans[0]["id"].as_i64().expect("No loan id");
    assert_eq!(loans[0]["isReturned"], false);
    assert!(loans[0]["returnDate"].is_null());
    assert!(!book_available(&client, &token, book_id).await);

    // Second loan on the same book must fail and leave nothing behind
    let response = client
        .post(format!("{}/loans/{}", BASE_URL, user_id))
        .bearer_auth(&token)
        .json(&json!({ "data": [{ "bookId": book_id, "dueDate": "2030-02-01T00:00:00Z" }] }))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let user_loans: Value = client
        .get(format!("{}/loans/user/{}", BASE_URL, user_id))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request")
        .json()
        .await
        .expect("Failed to parse response");
    assert_eq!(user_loans.as_array().map(Vec::len), Some(1));

    let response = client
        .patch(format!("{}/loans/{}", BASE_URL, loan_id))
        .bearer_auth(&token)
        .json(&json!({ "dueDate": "2030-03-01T00:00:00Z" }))
        .send()
        .await
        .expect("Failed to send request");
    assert!(response.status().is_success());
    let updated: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(updated["isReturned"], false);

    let response = client
        .patch(format!("{}/loans/return", BASE_URL))
        .bearer_auth(&token)
        .json(&json!({ "id": [loan_id] }))
        .send()
        .await
        .expect("Failed to send request");
    assert!(response.status().is_success());
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["count"], 1);
    assert!(book_available(&client, &token, book_id).await);

    // Returning again matches nothing
    let response = client
        .patch(format!("{}/loans/return", BASE_URL))
        .bearer_auth(&token)
        .json(&json!({ "id": [loan_id] }))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
#[ignore]
async fn test_malformed_requests() {
    let client = Client::new();
    let (_user_id, token) = sign_up_and_in(&client).await;

    let response = client
        .get(format!("{}/loans/abc", BASE_URL))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = client
        .patch(format!("{}/loans/return", BASE_URL))
        .bearer_auth(&token)
        .json(&json!({ "id": [] }))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = client
        .patch(format!("{}/loans/1", BASE_URL))
        .bearer_auth(&token)
        .json(&json!({ "bookId": 3 }))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
