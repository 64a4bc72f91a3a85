use std::sync::Arc;
use std::time::Duration;

use giftful::api::{Api, Credentials};
use giftful::models::{ItemStatus, ItemUpdate, WishlistItem};
use giftful::{
    AccessGate, Error, ErrorKind, FeatureFlags, FollowToggle, ItemActions, MutationStrategy,
    WishlistView,
};
use serde_json::{json, Value};
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct SignedIn(&'static str);

impl Credentials for SignedIn {
    fn access_token(&self) -> Option<String> {
        Some(format!("token-{}", self.0))
    }

    fn user_id(&self) -> Option<String> {
        Some(self.0.to_string())
    }
}

fn api(server: &MockServer, user_id: &'static str) -> Api {
    Api::new(
        &server.uri(),
        "anon",
        reqwest::Client::new(),
        Arc::new(SignedIn(user_id)),
    )
}

fn item_row(id: &str, status: &str, order: i64) -> Value {
    json!({
        "id": id,
        "wishlist_id": "w1",
        "name": format!("Item {}", id),
        "status": status,
        "order": order
    })
}

fn ids(items: &[WishlistItem]) -> Vec<&str> {
    items.iter().map(|i| i.id.as_str()).collect()
}

async fn mount_wishlists(server: &MockServer, user_id: &str, wishlists: Value) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/wishlists"))
        .and(query_param("user_id", format!("eq.{}", user_id).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(wishlists))
        .mount(server)
        .await;
}

async fn mount_items(server: &MockServer, wishlist_id: &str, items: Value) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/wishlist_items"))
        .and(query_param("wishlist_id", format!("eq.{}", wishlist_id).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(items))
        .mount(server)
        .await;
}

async fn mount_reorder_ok(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/reorder_wishlist_items"))
        .respond_with(ResponseTemplate::new(204))
        .mount(server)
        .await;
}

fn two_wishlists() -> Value {
    json!([
        { "id": "w1", "user_id": "u1", "name": "Birthday", "event_id": "e1", "visibility": "public" },
        { "id": "w0", "user_id": "u1", "name": "Anniversary", "visibility": "private" }
    ])
}

async fn loaded_view(server: &MockServer, items: Value, strategy: MutationStrategy) -> ItemActions {
    mount_wishlists(server, "u1", two_wishlists()).await;
    mount_items(server, "w1", items).await;
    let view = Arc::new(WishlistView::new(api(server, "u1"), "u1", FeatureFlags::default()));
    view.fetch().await.unwrap();
    ItemActions::new(view, strategy)
}

#[tokio::test]
async fn test_single_wishlist_mode_keeps_backend_first() {
    let mock_server = MockServer::start().await;
    mount_wishlists(&mock_server, "u1", two_wishlists()).await;
    mount_items(&mock_server, "w1", json!([])).await;

    let view = WishlistView::new(api(&mock_server, "u1"), "u1", FeatureFlags::default());
    view.fetch().await.unwrap();

    let wishlists = view.wishlists();
    assert_eq!(wishlists.len(), 1);
    assert_eq!(wishlists[0].id, "w1");
    assert_eq!(wishlists[0].event_id.as_deref(), Some("e1"));
    assert!(!view.loading());

    let multi = WishlistView::new(
        api(&mock_server, "u1"),
        "u1",
        FeatureFlags {
            multi_wishlists: true,
            ..Default::default()
        },
    );
    multi.fetch().await.unwrap();
    let names: Vec<String> = multi.wishlists().into_iter().map(|w| w.name).collect();
    assert_eq!(names, vec!["Birthday", "Anniversary"]);
}

#[tokio::test]
async fn test_fetch_sorts_pinned_first() {
    let mock_server = MockServer::start().await;
    let actions = loaded_view(
        &mock_server,
        json!([
            item_row("a", "pending", 0),
            item_row("b", "pinned", 1),
            item_row("c", "pending", 2),
            item_row("d", "pinned", 3)
        ]),
        MutationStrategy::Rollback,
    )
    .await;

    assert_eq!(ids(&actions.view().items()), vec!["b", "d", "a", "c"]);
    assert_eq!(actions.view().active_wishlist_id().as_deref(), Some("w1"));
}

#[tokio::test]
async fn test_fetch_failure_sets_visible_error() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/wishlists"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream timeout"))
        .mount(&mock_server)
        .await;

    let view = WishlistView::new(api(&mock_server, "u1"), "u1", FeatureFlags::default());
    assert!(view.fetch().await.is_err());

    let state = view.state();
    assert!(!state.loading);
    assert_eq!(state.error.map(|e| e.kind), Some(ErrorKind::Unclassified));
}

#[tokio::test]
async fn test_pin_twice_restores_status() {
    let mock_server = MockServer::start().await;
    let actions = loaded_view(
        &mock_server,
        json!([item_row("a", "pending", 0), item_row("b", "pending", 1)]),
        MutationStrategy::Rollback,
    )
    .await;
    mount_reorder_ok(&mock_server).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/toggle_item_pin"))
        .respond_with(ResponseTemplate::new(200).set_body_json(item_row("b", "pinned", 1)))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/toggle_item_pin"))
        .respond_with(ResponseTemplate::new(200).set_body_json(item_row("b", "pending", 0)))
        .mount(&mock_server)
        .await;

    let view = actions.view().clone();
    let b = view.item("b").unwrap();
    actions.toggle_pin(&b).await.unwrap();
    assert_eq!(view.item("b").unwrap().status, ItemStatus::Pinned);
    assert_eq!(ids(&view.items()), vec!["b", "a"]);

    let b = view.item("b").unwrap();
    actions.toggle_pin(&b).await.unwrap();
    assert_eq!(view.item("b").unwrap().status, ItemStatus::Pending);
}

#[tokio::test]
async fn test_pin_then_reorder_persists_regrouped_order() {
    let mock_server = MockServer::start().await;
    let actions = loaded_view(
        &mock_server,
        json!([
            item_row("a", "pending", 0),
            item_row("b", "pending", 1),
            item_row("c", "pending", 2)
        ]),
        MutationStrategy::Rollback,
    )
    .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/toggle_item_pin"))
        .and(body_json(json!({ "item_id": "c" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(item_row("c", "pinned", 2)))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/reorder_wishlist_items"))
        .and(body_json(json!({ "wishlist_id": "w1", "item_ids": ["c", "a", "b"] })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;

    let c = actions.view().item("c").unwrap();
    actions.toggle_pin(&c).await.unwrap();

    let items = actions.view().items();
    assert_eq!(ids(&items), vec!["c", "a", "b"]);
    assert_eq!(items.iter().map(|i| i.order).collect::<Vec<_>>(), vec![0, 1, 2]);
}

#[tokio::test]
async fn test_raw_reorder_does_not_regroup_pinned() {
    let mock_server = MockServer::start().await;
    let actions = loaded_view(
        &mock_server,
        json!([
            item_row("p", "pinned", 0),
            item_row("a", "pending", 1),
            item_row("b", "pending", 2)
        ]),
        MutationStrategy::Rollback,
    )
    .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/reorder_wishlist_items"))
        .and(body_json(json!({ "wishlist_id": "w1", "item_ids": ["b", "p", "a"] })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;

    let order = vec!["b".to_string(), "p".to_string(), "a".to_string()];
    actions.reorder(&order).await.unwrap();

    assert_eq!(ids(&actions.view().items()), vec!["b", "p", "a"]);
}

#[tokio::test]
async fn test_failed_pin_restores_exact_snapshot() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/wishlists"))
        .respond_with(ResponseTemplate::new(200).set_body_json(two_wishlists()))
        .expect(1)
        .mount(&mock_server)
        .await;
    mount_items(
        &mock_server,
        "w1",
        json!([item_row("a", "pinned", 0), item_row("b", "pending", 1)]),
    )
    .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/toggle_item_pin"))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .mount(&mock_server)
        .await;

    let view = Arc::new(WishlistView::new(
        api(&mock_server, "u1"),
        "u1",
        FeatureFlags::default(),
    ));
    view.fetch().await.unwrap();
    let before = view.items();
    let actions = ItemActions::new(view.clone(), MutationStrategy::Rollback);

    let b = view.item("b").unwrap();
    assert!(actions.toggle_pin(&b).await.is_err());
    assert_eq!(view.items(), before);
}

#[tokio::test]
async fn test_failed_delete_restores_item() {
    let mock_server = MockServer::start().await;
    let actions = loaded_view(
        &mock_server,
        json!([item_row("a", "pending", 0), item_row("b", "pending", 1)]),
        MutationStrategy::Rollback,
    )
    .await;
    Mock::given(method("DELETE"))
        .and(path("/rest/v1/wishlist_items"))
        .and(query_param("id", "eq.a"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "code": "42501",
            "message": "permission denied for table wishlist_items"
        })))
        .mount(&mock_server)
        .await;

    let a = actions.view().item("a").unwrap();
    let err = actions.delete(&a).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientPrivilege);
    assert_eq!(ids(&actions.view().items()), vec!["a", "b"]);
}

#[tokio::test]
async fn test_update_reconciles_with_server_row() {
    let mock_server = MockServer::start().await;
    let actions = loaded_view(
        &mock_server,
        json!([item_row("a", "pending", 0)]),
        MutationStrategy::Rollback,
    )
    .await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/wishlist_items"))
        .and(query_param("id", "eq.a"))
        .and(body_json(json!({ "name": "Teapot" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": "a",
            "wishlist_id": "w1",
            "name": "Teapot (cast iron)",
            "status": "pending",
            "order": 0
        }])))
        .mount(&mock_server)
        .await;

    let update = ItemUpdate {
        name: Some("Teapot".to_string()),
        ..Default::default()
    };
    actions.update("a", &update).await.unwrap();
    assert_eq!(actions.view().item("a").unwrap().name, "Teapot (cast iron)");
}

#[tokio::test]
async fn test_stale_pin_response_does_not_overwrite_newer_edit() {
    let mock_server = MockServer::start().await;
    let actions = loaded_view(
        &mock_server,
        json!([item_row("a", "pending", 0), item_row("b", "pending", 1)]),
        MutationStrategy::Rollback,
    )
    .await;
    mount_reorder_ok(&mock_server).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/toggle_item_pin"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(item_row("b", "pinned", 1))
                .set_delay(Duration::from_millis(300)),
        )
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/toggle_item_pin"))
        .respond_with(ResponseTemplate::new(200).set_body_json(item_row("b", "pending", 1)))
        .mount(&mock_server)
        .await;

    let view = actions.view().clone();
    let b = view.item("b").unwrap();
    let first = actions.toggle_pin(&b);
    let second = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let current = view.item("b").unwrap();
        assert_eq!(current.status, ItemStatus::Pinned);
        actions.toggle_pin(&current).await
    };
    let (first, second) = tokio::join!(first, second);
    first.unwrap();
    second.unwrap();

    assert_eq!(view.item("b").unwrap().status, ItemStatus::Pending);
}

#[tokio::test]
async fn test_refetch_strategy_refetches_after_failed_pin() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/wishlists"))
        .respond_with(ResponseTemplate::new(200).set_body_json(two_wishlists()))
        .expect(2)
        .mount(&mock_server)
        .await;
    mount_items(&mock_server, "w1", json!([item_row("a", "pending", 0)])).await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/toggle_item_pin"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let view = Arc::new(WishlistView::new(
        api(&mock_server, "u1"),
        "u1",
        FeatureFlags::default(),
    ));
    view.fetch().await.unwrap();
    let actions = ItemActions::new(view.clone(), MutationStrategy::Refetch);

    let a = view.item("a").unwrap();
    assert!(actions.toggle_pin(&a).await.is_err());
    assert_eq!(view.item("a").unwrap().status, ItemStatus::Pending);
}

#[tokio::test]
async fn test_cancelled_view_never_writes_state() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/wishlists"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(two_wishlists())
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&mock_server)
        .await;

    let view = WishlistView::new(api(&mock_server, "u1"), "u1", FeatureFlags::default());
    let (result, _) = tokio::join!(view.fetch(), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        view.teardown();
    });

    assert!(matches!(result, Err(Error::Cancelled)));
    let state = view.state();
    assert!(state.wishlists.is_empty());
    assert_eq!(state.revision, 0);
    assert!(view.remove_item("a").is_none());
    assert!(matches!(view.fetch().await, Err(Error::Cancelled)));
}

#[tokio::test]
async fn test_follow_rolls_back_on_failure() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/follows"))
        .and(body_json(json!({ "follower_id": "u1", "following_id": "u2" })))
        .respond_with(ResponseTemplate::new(503).set_body_string("network unreachable"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let toggle = FollowToggle::new(api(&mock_server, "u1"), "u2");
    assert!(!toggle.is_following());

    assert!(toggle.toggle().await.is_err());
    assert!(!toggle.is_following());
    assert!(!toggle.state().pending);
}

#[tokio::test]
async fn test_follow_and_unfollow() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/follows"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            { "follower_id": "u1", "following_id": "u2" }
        ])))
        .mount(&mock_server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/rest/v1/follows"))
        .and(query_param("follower_id", "eq.u1"))
        .and(query_param("following_id", "eq.u2"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;

    let toggle = FollowToggle::new(api(&mock_server, "u1"), "u2");
    assert!(toggle.toggle().await.unwrap());
    assert!(toggle.is_following());
    assert!(!toggle.toggle().await.unwrap());
    assert!(!toggle.is_following());
}

async fn mount_shared_wishlist(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/validate_share_token"))
        .and(body_json(json!({ "wishlist_id": "w1", "token": "t1" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(true)))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/validate_share_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(false)))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/wishlists"))
        .and(query_param("id", "eq.w1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "w1", "user_id": "u2", "name": "Birthday", "visibility": "private"
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/profiles"))
        .and(query_param("id", "eq.u2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "u2", "name": "Grace" })))
        .mount(server)
        .await;
    mount_items(
        server,
        "w1",
        json!([item_row("a", "pending", 0), item_row("b", "pinned", 1)]),
    )
    .await;
}

#[tokio::test]
async fn test_access_with_valid_token() {
    let mock_server = MockServer::start().await;
    mount_shared_wishlist(&mock_server).await;

    let gate = AccessGate::new(api(&mock_server, "u1"));
    let check = gate
        .check(Some("u1"), "u2", Some("w1"), Some("t1"))
        .await
        .unwrap();

    assert!(check.has_access);
    assert_eq!(check.profile.unwrap().name, "Grace");
    assert_eq!(check.wishlists.len(), 1);
    assert_eq!(ids(&check.wishlist_items), vec!["b", "a"]);
}

#[tokio::test]
async fn test_token_for_another_wishlist_is_denied() {
    let mock_server = MockServer::start().await;
    mount_shared_wishlist(&mock_server).await;

    let gate = AccessGate::new(api(&mock_server, "u1"));
    let check = gate
        .check(Some("u1"), "u2", Some("w2"), Some("t1"))
        .await
        .unwrap();

    assert!(!check.has_access);
    assert!(check.profile.is_none());
    assert!(check.wishlist_items.is_empty());
}

#[tokio::test]
async fn test_token_for_wishlist_of_other_user_is_denied() {
    let mock_server = MockServer::start().await;
    mount_shared_wishlist(&mock_server).await;

    let gate = AccessGate::new(api(&mock_server, "u1"));
    let check = gate
        .check(Some("u1"), "u3", Some("w1"), Some("t1"))
        .await
        .unwrap();
    assert!(!check.has_access);
}

#[tokio::test]
async fn test_no_token_denied_without_requests() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let gate = AccessGate::new(api(&mock_server, "u1"));
    let check = gate.check(Some("u1"), "u2", Some("w1"), None).await.unwrap();
    assert!(!check.has_access);

    let check = gate.check(None, "u2", None, None).await.unwrap();
    assert!(!check.has_access);
}

#[tokio::test]
async fn test_owner_granted_regardless_of_token() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/validate_share_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(false)))
        .expect(0)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/profiles"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "u1", "name": "Ada" })))
        .mount(&mock_server)
        .await;
    mount_wishlists(&mock_server, "u1", two_wishlists()).await;
    mount_items(&mock_server, "w1", json!([item_row("a", "pending", 0)])).await;

    let gate = AccessGate::new(api(&mock_server, "u1"));
    let check = gate
        .check(Some("u1"), "u1", Some("w-unknown"), Some("garbage"))
        .await
        .unwrap();

    assert!(check.has_access);
    assert_eq!(check.wishlists.len(), 2);
    assert_eq!(ids(&check.wishlist_items), vec!["a"]);
}

async fn view_with_slow_refetch(server: &MockServer, refetched: Value) -> Arc<WishlistView> {
    mount_wishlists(server, "u1", two_wishlists()).await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/wishlist_items"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([item_row("a", "pending", 0), item_row("b", "pending", 1)])),
        )
        .up_to_n_times(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/wishlist_items"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(refetched)
                .set_delay(Duration::from_millis(100)),
        )
        .mount(server)
        .await;

    let view = Arc::new(WishlistView::new(api(server, "u1"), "u1", FeatureFlags::default()));
    view.fetch().await.unwrap();
    view
}

#[tokio::test]
async fn test_pin_confirmed_after_refetch_landed_mid_flight() {
    let mock_server = MockServer::start().await;
    let view = view_with_slow_refetch(
        &mock_server,
        json!([item_row("a", "pending", 0), item_row("b", "pending", 1)]),
    )
    .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/toggle_item_pin"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(item_row("b", "pinned", 1))
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/reorder_wishlist_items"))
        .and(body_json(json!({ "wishlist_id": "w1", "item_ids": ["b", "a"] })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;

    let actions = ItemActions::new(view.clone(), MutationStrategy::Rollback);
    let b = view.item("b").unwrap();
    let (refetched, pinned) = tokio::join!(view.refetch(), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        actions.toggle_pin(&b).await
    });
    refetched.unwrap();
    pinned.unwrap();

    assert_eq!(view.item("b").unwrap().status, ItemStatus::Pinned);
    assert_eq!(ids(&view.items()), vec!["b", "a"]);
}

#[tokio::test]
async fn test_failed_delete_keeps_state_refetched_mid_flight() {
    let mock_server = MockServer::start().await;
    let view = view_with_slow_refetch(&mock_server, json!([item_row("b", "pending", 0)])).await;
    Mock::given(method("DELETE"))
        .and(path("/rest/v1/wishlist_items"))
        .respond_with(
            ResponseTemplate::new(503)
                .set_body_string("unavailable")
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&mock_server)
        .await;

    let actions = ItemActions::new(view.clone(), MutationStrategy::Rollback);
    let a = view.item("a").unwrap();
    let (refetched, deleted) = tokio::join!(view.refetch(), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        actions.delete(&a).await
    });
    refetched.unwrap();
    assert!(deleted.is_err());

    // The snapshot predates the refetch, so it is not restored
    assert_eq!(ids(&view.items()), vec!["b"]);
}

#[tokio::test]
async fn test_cancelled_follow_restores_state() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/follows"))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(json!([{ "follower_id": "u1", "following_id": "u2" }]))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&mock_server)
        .await;

    let toggle = FollowToggle::new(api(&mock_server, "u1"), "u2");
    let (result, _) = tokio::join!(toggle.toggle(), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(toggle.state().pending);
        toggle.teardown();
    });

    assert!(matches!(result, Err(Error::Cancelled)));
    assert!(!toggle.is_following());
    assert!(!toggle.state().pending);
}

#[tokio::test]
async fn test_owner_load_failure_is_not_a_denial() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/profiles"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "u1", "name": "Ada" })))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/wishlists"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "code": "42501",
            "message": "permission denied for table wishlists"
        })))
        .mount(&mock_server)
        .await;

    let gate = AccessGate::new(api(&mock_server, "u1"));
    let err = gate.check(Some("u1"), "u1", None, None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientPrivilege);
}
