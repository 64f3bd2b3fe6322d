mod common;

use assert_matches::assert_matches;
use common::TestApp;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use storefront_api::{
    errors::ServiceError,
    services::{AddItemInput, UpdateProductInput},
};
use uuid::Uuid;

#[tokio::test]
async fn cart_is_created_lazily_on_first_add() {
    let app = TestApp::new().await;
    let customer_id = app.seed_user("cart@test.dev").await;

    // No cart yet: the read returns an empty detail without creating one
    let detail = app
        .state
        .services
        .carts
        .get_cart(customer_id)
        .await
        .expect("get cart");
    assert!(detail.cart.is_none());
    assert!(detail.items.is_empty());
    assert_eq!(detail.total, Decimal::ZERO);

    let product_id = app.seed_product("Widget", dec!(19.99)).await;
    let detail = app
        .state
        .services
        .carts
        .add_item(
            customer_id,
            AddItemInput {
                product_id,
                quantity: 2,
            },
        )
        .await
        .expect("add item");

    assert!(detail.cart.is_some());
    assert_eq!(detail.items.len(), 1);
    assert_eq!(detail.items[0].unit_price, dec!(19.99));
    assert_eq!(detail.items[0].line_total, dec!(39.98));
    assert_eq!(detail.total, dec!(39.98));
}

#[tokio::test]
async fn adding_an_existing_product_increments_quantity() {
    let app = TestApp::new().await;
    let customer_id = app.seed_user("cart@test.dev").await;
    let product_id = app.seed_product("Widget", dec!(5.00)).await;

    for _ in 0..2 {
        app.state
            .services
            .carts
            .add_item(
                customer_id,
                AddItemInput {
                    product_id,
                    quantity: 1,
                },
            )
            .await
            .expect("add item");
    }

    let detail = app
        .state
        .services
        .carts
        .get_cart(customer_id)
        .await
        .expect("get cart");
    assert_eq!(detail.items.len(), 1);
    assert_eq!(detail.items[0].quantity, 2);
    assert_eq!(detail.total, dec!(10.00));
}

#[tokio::test]
async fn updating_quantity_recomputes_total_and_zero_removes() {
    let app = TestApp::new().await;
    let customer_id = app.seed_user("cart@test.dev").await;
    let product_id = app.seed_product("Widget", dec!(4.00)).await;

    app.state
        .services
        .carts
        .add_item(
            customer_id,
            AddItemInput {
                product_id,
                quantity: 1,
            },
        )
        .await
        .expect("add item");

    let detail = app
        .state
        .services
        .carts
        .update_item(customer_id, product_id, 5)
        .await
        .expect("update quantity");
    assert_eq!(detail.items[0].quantity, 5);
    assert_eq!(detail.total, dec!(20.00));

    let detail = app
        .state
        .services
        .carts
        .update_item(customer_id, product_id, 0)
        .await
        .expect("remove via zero");
    assert!(detail.items.is_empty());
    assert_eq!(detail.total, Decimal::ZERO);
}

#[tokio::test]
async fn cart_total_reflects_catalog_price_on_next_mutation() {
    let app = TestApp::new().await;
    let customer_id = app.seed_user("cart@test.dev").await;
    let product_a = app.seed_product("Widget", dec!(10.00)).await;
    let product_b = app.seed_product("Gadget", dec!(1.00)).await;

    app.state
        .services
        .carts
        .add_item(
            customer_id,
            AddItemInput {
                product_id: product_a,
                quantity: 1,
            },
        )
        .await
        .expect("add item");

    // Reprice while the cart sits idle: the cached total goes stale
    app.state
        .services
        .products
        .update_product(
            product_a,
            UpdateProductInput {
                price: Some(dec!(15.00)),
                ..Default::default()
            },
        )
        .await
        .expect("reprice");

    let stale = app
        .state
        .services
        .carts
        .get_cart(customer_id)
        .await
        .expect("get cart");
    assert_eq!(stale.cart.as_ref().unwrap().total, dec!(10.00));
    // Lines are always resolved live, so the detail view already shows 15
    assert_eq!(stale.items[0].unit_price, dec!(15.00));

    // Any mutation reconciles the cached total
    let detail = app
        .state
        .services
        .carts
        .add_item(
            customer_id,
            AddItemInput {
                product_id: product_b,
                quantity: 1,
            },
        )
        .await
        .expect("second add");
    assert_eq!(detail.cart.as_ref().unwrap().total, dec!(16.00));
    assert_eq!(detail.total, dec!(16.00));
}

#[tokio::test]
async fn clear_cart_empties_items_and_zeroes_total() {
    let app = TestApp::new().await;
    let customer_id = app.seed_user("cart@test.dev").await;
    let product_id = app.seed_product("Widget", dec!(2.50)).await;

    app.state
        .services
        .carts
        .add_item(
            customer_id,
            AddItemInput {
                product_id,
                quantity: 4,
            },
        )
        .await
        .expect("add item");

    app.state
        .services
        .carts
        .clear_cart(customer_id)
        .await
        .expect("clear");

    let detail = app
        .state
        .services
        .carts
        .get_cart(customer_id)
        .await
        .expect("get cart");
    assert!(detail.items.is_empty());
    assert_eq!(detail.cart.unwrap().total, Decimal::ZERO);
}

#[tokio::test]
async fn clearing_a_nonexistent_cart_is_a_noop() {
    let app = TestApp::new().await;
    let customer_id = app.seed_user("cart@test.dev").await;

    app.state
        .services
        .carts
        .clear_cart(customer_id)
        .await
        .expect("clear should be a no-op");
}

#[tokio::test]
async fn adding_unknown_product_is_rejected() {
    let app = TestApp::new().await;
    let customer_id = app.seed_user("cart@test.dev").await;

    let err = app
        .state
        .services
        .carts
        .add_item(
            customer_id,
            AddItemInput {
                product_id: Uuid::new_v4(),
                quantity: 1,
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
async fn zero_quantity_add_is_rejected() {
    let app = TestApp::new().await;
    let customer_id = app.seed_user("cart@test.dev").await;
    let product_id = app.seed_product("Widget", dec!(1.00)).await;

    let err = app
        .state
        .services
        .carts
        .add_item(
            customer_id,
            AddItemInput {
                product_id,
                quantity: 0,
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn updating_a_product_not_in_cart_is_not_found() {
    let app = TestApp::new().await;
    let customer_id = app.seed_user("cart@test.dev").await;
    let in_cart = app.seed_product("Widget", dec!(1.00)).await;
    let not_in_cart = app.seed_product("Gadget", dec!(2.00)).await;

    app.state
        .services
        .carts
        .add_item(
            customer_id,
            AddItemInput {
                product_id: in_cart,
                quantity: 1,
            },
        )
        .await
        .expect("add item");

    let err = app
        .state
        .services
        .carts
        .update_item(customer_id, not_in_cart, 3)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}
