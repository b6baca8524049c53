mod common;

use axum::http::{Method, StatusCode};
use common::{dec_field, read_json, TestApp};
use rust_decimal_macros::dec;
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn the_cart_is_created_lazily_and_empty() {
    let app = TestApp::new().await;
    let (_, token) = app.customer();

    let response = app
        .request(Method::GET, "/api/v1/cart", None, Some(&token))
        .await;
    let (status, body) = read_json(response).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["items"].as_array().expect("items").is_empty());
    assert_eq!(dec_field(&body["data"], "subtotal"), dec!(0));
}

#[tokio::test]
async fn lines_merge_on_product_and_size() {
    let app = TestApp::new().await;
    let (_, token) = app.customer();
    let product = app
        .seed_sized_product("Raglan Tee", dec!(499), &[("M", 10), ("L", 10)])
        .await;

    app.add_to_cart(&token, product.id, Some("M"), 2).await;
    app.add_to_cart(&token, product.id, Some("M"), 3).await;
    app.add_to_cart(&token, product.id, Some("L"), 1).await;

    let response = app
        .request(Method::GET, "/api/v1/cart", None, Some(&token))
        .await;
    let (_, body) = read_json(response).await;
    let items = body["data"]["items"].as_array().expect("items");
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["size"], "M");
    assert_eq!(items[0]["quantity"], 5);
    assert_eq!(dec_field(&items[0], "line_total"), dec!(2495));
    assert_eq!(items[1]["size"], "L");
    assert_eq!(items[1]["quantity"], 1);
    assert_eq!(dec_field(&body["data"], "subtotal"), dec!(2994));
}

#[tokio::test]
async fn line_quantity_caps_at_ten() {
    let app = TestApp::new().await;
    let (_, token) = app.customer();
    let product = app
        .seed_sized_product("Oversize Tee", dec!(599), &[("M", 30)])
        .await;

    app.add_to_cart(&token, product.id, Some("M"), 7).await;
    app.add_to_cart(&token, product.id, Some("M"), 7).await;

    let response = app
        .request(Method::GET, "/api/v1/cart", None, Some(&token))
        .await;
    let (_, body) = read_json(response).await;
    assert_eq!(body["data"]["items"][0]["quantity"], 10);
}

#[tokio::test]
async fn quantities_outside_the_range_are_rejected() {
    let app = TestApp::new().await;
    let (_, token) = app.customer();
    let product = app.seed_flat_product("Canvas Cap", dec!(299), 20).await;

    for quantity in [0, 11] {
        let response = app
            .request(
                Method::POST,
                "/api/v1/cart/items",
                Some(json!({ "product_id": product.id, "quantity": quantity })),
                Some(&token),
            )
            .await;
        let (status, body) = read_json(response).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "quantity {quantity}");
        assert_eq!(body["error"], "Bad Request");
    }
}

#[tokio::test]
async fn the_size_must_be_one_the_product_offers() {
    let app = TestApp::new().await;
    let (_, token) = app.customer();
    let product = app
        .seed_sized_product("Raglan Tee", dec!(499), &[("M", 5), ("L", 5)])
        .await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/cart/items",
            Some(json!({ "product_id": product.id, "size": "XS", "quantity": 1 })),
            Some(&token),
        )
        .await;
    let (status, body) = read_json(response).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["message"],
        "Validation error: size XS is not offered for Raglan Tee"
    );
}

#[tokio::test]
async fn updating_and_removing_lines_reprices_the_cart() {
    let app = TestApp::new().await;
    let (_, token) = app.customer();
    let product = app
        .seed_sized_product("Raglan Tee", dec!(499), &[("M", 10)])
        .await;
    app.add_to_cart(&token, product.id, Some("M"), 2).await;

    let response = app
        .request(Method::GET, "/api/v1/cart", None, Some(&token))
        .await;
    let (_, body) = read_json(response).await;
    assert_eq!(dec_field(&body["data"], "subtotal"), dec!(998));
    let item_id = body["data"]["items"][0]["id"].as_str().expect("id").to_string();

    let response = app
        .request(
            Method::PATCH,
            &format!("/api/v1/cart/items/{item_id}"),
            Some(json!({ "quantity": 5 })),
            Some(&token),
        )
        .await;
    let (status, body) = read_json(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["items"][0]["quantity"], 5);
    assert_eq!(dec_field(&body["data"], "subtotal"), dec!(2495));

    let response = app
        .request(
            Method::DELETE,
            &format!("/api/v1/cart/items/{item_id}"),
            None,
            Some(&token),
        )
        .await;
    let (status, body) = read_json(response).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["items"].as_array().expect("items").is_empty());
    assert_eq!(dec_field(&body["data"], "subtotal"), dec!(0));
}

#[tokio::test]
async fn cart_lines_belong_to_their_owner() {
    let app = TestApp::new().await;
    let (_, owner) = app.customer();
    let (_, other) = app.customer();
    let product = app
        .seed_sized_product("Raglan Tee", dec!(499), &[("M", 10)])
        .await;
    app.add_to_cart(&owner, product.id, Some("M"), 1).await;

    let response = app
        .request(Method::GET, "/api/v1/cart", None, Some(&owner))
        .await;
    let (_, body) = read_json(response).await;
    let item_id = body["data"]["items"][0]["id"].as_str().expect("id").to_string();

    let response = app
        .request(
            Method::PATCH,
            &format!("/api/v1/cart/items/{item_id}"),
            Some(json!({ "quantity": 3 })),
            Some(&other),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .request(
            Method::DELETE,
            &format!("/api/v1/cart/items/{}", Uuid::new_v4()),
            None,
            Some(&owner),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn clearing_the_cart_leaves_it_usable() {
    let app = TestApp::new().await;
    let (_, token) = app.customer();
    let tee = app
        .seed_sized_product("Raglan Tee", dec!(499), &[("M", 10)])
        .await;
    let cap = app.seed_flat_product("Canvas Cap", dec!(299), 20).await;
    app.add_to_cart(&token, tee.id, Some("M"), 2).await;
    app.add_to_cart(&token, cap.id, None, 1).await;

    let response = app
        .request(Method::DELETE, "/api/v1/cart", None, Some(&token))
        .await;
    let (status, body) = read_json(response).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["items"].as_array().expect("items").is_empty());

    app.add_to_cart(&token, cap.id, None, 1).await;
    let response = app
        .request(Method::GET, "/api/v1/cart", None, Some(&token))
        .await;
    let (_, body) = read_json(response).await;
    assert_eq!(body["data"]["items"].as_array().expect("items").len(), 1);
}

#[tokio::test]
async fn deactivated_products_stay_visible_but_unavailable() {
    let app = TestApp::new().await;
    let (_, admin) = app.admin();
    let (_, token) = app.customer();
    let product = app.seed_flat_product("Canvas Cap", dec!(299), 5).await;
    app.add_to_cart(&token, product.id, None, 2).await;

    let response = app
        .request(
            Method::DELETE,
            &format!("/api/v1/admin/products/{}", product.id),
            None,
            Some(&admin),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .request(Method::GET, "/api/v1/cart", None, Some(&token))
        .await;
    let (_, body) = read_json(response).await;
    let line = &body["data"]["items"][0];
    assert_eq!(line["available"], false);
    assert_eq!(dec_field(line, "line_total"), dec!(598));
    // Unavailable lines are priced but never counted.
    assert_eq!(dec_field(&body["data"], "subtotal"), dec!(0));

    let response = app
        .request(
            Method::POST,
            "/api/v1/cart/items",
            Some(json!({ "product_id": product.id, "quantity": 1 })),
            Some(&token),
        )
        .await;
    let (status, body) = read_json(response).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(
        body["message"],
        format!("product unavailable: {}", product.id)
    );
}

#[tokio::test]
async fn guest_cart_merge_reports_merged_and_skipped() {
    let app = TestApp::new().await;
    let (_, admin) = app.admin();
    let (_, token) = app.customer();
    let tee = app
        .seed_sized_product("Raglan Tee", dec!(499), &[("M", 10)])
        .await;
    let cap = app.seed_flat_product("Canvas Cap", dec!(299), 20).await;
    let retired = app.seed_flat_product("Old Badge", dec!(99), 5).await;
    let response = app
        .request(
            Method::DELETE,
            &format!("/api/v1/admin/products/{}", retired.id),
            None,
            Some(&admin),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .request(
            Method::POST,
            "/api/v1/cart/merge",
            Some(json!({
                "lines": [
                    { "product_id": tee.id, "size": "M", "quantity": 2 },
                    { "product_id": cap.id, "size": null, "quantity": 1 },
                    { "product_id": cap.id, "size": null, "quantity": 0 },
                    { "product_id": Uuid::new_v4(), "size": null, "quantity": 1 },
                    { "product_id": retired.id, "size": null, "quantity": 1 },
                    { "product_id": tee.id, "size": "XXL", "quantity": 1 }
                ]
            })),
            Some(&token),
        )
        .await;
    let (status, body) = read_json(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["merged"], 2);
    assert_eq!(body["data"]["skipped"], 4);
    let cart = &body["data"]["cart"];
    assert_eq!(cart["items"].as_array().expect("items").len(), 2);
    assert_eq!(dec_field(cart, "subtotal"), dec!(1297));
}

#[tokio::test]
async fn merge_caps_combined_quantities() {
    let app = TestApp::new().await;
    let (_, token) = app.customer();
    let product = app
        .seed_sized_product("Raglan Tee", dec!(499), &[("M", 30)])
        .await;
    app.add_to_cart(&token, product.id, Some("M"), 8).await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/cart/merge",
            Some(json!({
                "lines": [{ "product_id": product.id, "size": "M", "quantity": 7 }]
            })),
            Some(&token),
        )
        .await;
    let (status, body) = read_json(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["merged"], 1);
    assert_eq!(body["data"]["cart"]["items"][0]["quantity"], 10);
}

#[tokio::test]
async fn cart_routes_need_a_token() {
    let app = TestApp::new().await;

    let response = app.request(Method::GET, "/api/v1/cart", None, None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .request(
            Method::POST,
            "/api/v1/cart/items",
            Some(json!({ "product_id": Uuid::new_v4(), "quantity": 1 })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
