//! Friendship lifecycle E2E tests

mod common;

use common::{TestServer, TestUser};

async fn send_request(server: &TestServer, from: &TestUser, to: &TestUser) -> String {
    let response = server
        .post(
            from,
            "/api/friends/request",
            &serde_json::json!({ "username": to.username }),
        )
        .await;
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    body["requestId"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn request_accept_and_list() {
    let server = TestServer::new().await;
    let alice = server.register("alice").await;
    let bob = server.register("bob").await;

    let request_id = send_request(&server, &alice, &bob).await;

    // Bob sees the incoming request, Alice sees it as sent
    let incoming: serde_json::Value = server
        .get(&bob, "/api/friends/requests")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(incoming.as_array().unwrap().len(), 1);
    assert_eq!(incoming[0]["requestId"], request_id.as_str());
    assert_eq!(incoming[0]["username"], "alice");

    let sent: serde_json::Value = server
        .get(&alice, "/api/friends/requests/sent")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(sent.as_array().unwrap().len(), 1);
    assert_eq!(sent[0]["username"], "bob");

    // Accept and verify both friend lists
    let response = server
        .post(
            &bob,
            &format!("/api/friends/{}/accept", request_id),
            &serde_json::json!({}),
        )
        .await;
    assert_eq!(response.status(), 200);

    for (user, expected_other) in [(&alice, "bob"), (&bob, "alice")] {
        let friends: serde_json::Value = server
            .get(user, "/api/friends")
            .await
            .json()
            .await
            .unwrap();
        let list = friends.as_array().unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0]["username"], expected_other);
    }
}

#[tokio::test]
async fn only_the_receiver_can_accept() {
    let server = TestServer::new().await;
    let alice = server.register("alice").await;
    let bob = server.register("bob").await;

    let request_id = send_request(&server, &alice, &bob).await;

    // The requester accepting their own request is forbidden
    let response = server
        .post(
            &alice,
            &format!("/api/friends/{}/accept", request_id),
            &serde_json::json!({}),
        )
        .await;
    assert_eq!(response.status(), 403);
}

#[tokio::test]
async fn duplicate_and_crossing_requests_conflict() {
    let server = TestServer::new().await;
    let alice = server.register("alice").await;
    let bob = server.register("bob").await;

    send_request(&server, &alice, &bob).await;

    // Same direction again
    let response = server
        .post(
            &alice,
            "/api/friends/request",
            &serde_json::json!({ "username": "bob" }),
        )
        .await;
    assert_eq!(response.status(), 409);

    // Crossing request from the other side also conflicts; the existing
    // edge stays authoritative.
    let response = server
        .post(
            &bob,
            "/api/friends/request",
            &serde_json::json!({ "username": "alice" }),
        )
        .await;
    assert_eq!(response.status(), 409);
}

#[tokio::test]
async fn self_request_is_invalid() {
    let server = TestServer::new().await;
    let alice = server.register("alice").await;

    let response = server
        .post(
            &alice,
            "/api/friends/request",
            &serde_json::json!({ "username": "alice" }),
        )
        .await;
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn reject_deletes_the_edge() {
    let server = TestServer::new().await;
    let alice = server.register("alice").await;
    let bob = server.register("bob").await;

    let request_id = send_request(&server, &alice, &bob).await;

    let response = server
        .post(
            &bob,
            &format!("/api/friends/{}/reject", request_id),
            &serde_json::json!({}),
        )
        .await;
    assert_eq!(response.status(), 200);

    // The pair is free again
    send_request(&server, &bob, &alice).await;
}

#[tokio::test]
async fn cancel_withdraws_a_sent_request() {
    let server = TestServer::new().await;
    let alice = server.register("alice").await;
    let bob = server.register("bob").await;

    send_request(&server, &alice, &bob).await;

    let response = server
        .delete(&alice, &format!("/api/friends/cancel/{}", bob.id))
        .await;
    assert_eq!(response.status(), 200);

    let incoming: serde_json::Value = server
        .get(&bob, "/api/friends/requests")
        .await
        .json()
        .await
        .unwrap();
    assert!(incoming.as_array().unwrap().is_empty());

    // Nothing left to cancel
    let response = server
        .delete(&alice, &format!("/api/friends/cancel/{}", bob.id))
        .await;
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn unfriend_removes_an_accepted_edge_only() {
    let server = TestServer::new().await;
    let alice = server.register("alice").await;
    let bob = server.register("bob").await;

    let request_id = send_request(&server, &alice, &bob).await;

    // Pending edge cannot be unfriended
    let response = server
        .delete(&alice, &format!("/api/friends/unfriend/{}", bob.id))
        .await;
    assert_eq!(response.status(), 409);

    server
        .post(
            &bob,
            &format!("/api/friends/{}/accept", request_id),
            &serde_json::json!({}),
        )
        .await;

    let response = server
        .delete(&alice, &format!("/api/friends/unfriend/{}", bob.id))
        .await;
    assert_eq!(response.status(), 200);

    let friends: serde_json::Value = server
        .get(&bob, "/api/friends")
        .await
        .json()
        .await
        .unwrap();
    assert!(friends.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn search_reports_friendship_state() {
    let server = TestServer::new().await;
    let alice = server.register("alice").await;
    let bob = server.register("bob").await;

    let result: serde_json::Value = server
        .get(&alice, "/api/users/search?username=bob")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(result["friendStatus"], "NONE");
    assert!(result["requestId"].is_null());

    let request_id = send_request(&server, &alice, &bob).await;

    let from_alice: serde_json::Value = server
        .get(&alice, "/api/users/search?username=bob")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(from_alice["friendStatus"], "PENDING_SENT");
    assert_eq!(from_alice["requestId"], request_id.as_str());

    let from_bob: serde_json::Value = server
        .get(&bob, "/api/users/search?username=alice")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(from_bob["friendStatus"], "PENDING_RECEIVED");
    assert_eq!(from_bob["requestId"], request_id.as_str());

    server
        .post(
            &bob,
            &format!("/api/friends/{}/accept", request_id),
            &serde_json::json!({}),
        )
        .await;

    let result: serde_json::Value = server
        .get(&alice, "/api/users/search?username=bob")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(result["friendStatus"], "FRIEND");
}
