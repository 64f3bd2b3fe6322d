mod common;

use assert_matches::assert_matches;
use common::TestApp;
use rust_decimal_macros::dec;
use storefront_api::errors::ServiceError;
use uuid::Uuid;

#[tokio::test]
async fn toggle_adds_then_removes() {
    let app = TestApp::new().await;
    let customer_id = app.seed_user("wish@test.dev").await;
    let product_id = app.seed_product("Widget", dec!(12.00)).await;

    let first = app
        .state
        .services
        .wishlists
        .toggle(customer_id, product_id)
        .await
        .expect("toggle add");
    assert!(first.added);

    let listed = app
        .state
        .services
        .wishlists
        .list(customer_id)
        .await
        .expect("list");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].product_id, product_id);
    assert_eq!(listed[0].price, dec!(12.00));

    let second = app
        .state
        .services
        .wishlists
        .toggle(customer_id, product_id)
        .await
        .expect("toggle remove");
    assert!(!second.added);

    let listed = app
        .state
        .services
        .wishlists
        .list(customer_id)
        .await
        .expect("list");
    assert!(listed.is_empty());
}

#[tokio::test]
async fn toggling_unknown_product_is_rejected() {
    let app = TestApp::new().await;
    let customer_id = app.seed_user("wish@test.dev").await;

    let err = app
        .state
        .services
        .wishlists
        .toggle(customer_id, Uuid::new_v4())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
async fn wishlists_are_scoped_per_account() {
    let app = TestApp::new().await;
    let alice = app.seed_user("alice@test.dev").await;
    let bob = app.seed_user("bob@test.dev").await;
    let product_id = app.seed_product("Widget", dec!(9.99)).await;

    app.state
        .services
        .wishlists
        .toggle(alice, product_id)
        .await
        .expect("toggle");

    let bobs = app
        .state
        .services
        .wishlists
        .list(bob)
        .await
        .expect("list");
    assert!(bobs.is_empty());
}
