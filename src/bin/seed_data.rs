//! Seed script that fills an empty database with demo catalog data.
//!
//! Run with: cargo run --bin seed-data

use std::sync::Arc;

use rust_decimal_macros::dec;
use tracing::info;

use storefront_api::db::{establish_connection_with_config, run_migrations, DbConfig};
use storefront_api::services::catalog::{CreateProductInput, SizeInput};
use storefront_api::services::CatalogService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "sqlite://storefront.db?mode=rwc".to_string());

    let db = establish_connection_with_config(DbConfig {
        url: database_url,
        max_connections: 5,
        min_connections: 1,
        ..DbConfig::default()
    })
    .await?;
    run_migrations(&db).await?;

    let catalog = CatalogService::new(Arc::new(db));

    let inputs = demo_products();
    let count = inputs.len();
    for input in inputs {
        let product = catalog.create_product(input).await?;
        info!(slug = %product.slug, stock = product.stock, "seeded product");
    }

    info!("seeded {count} products");
    info!("browse them at http://localhost:8080/api/v1/products");
    info!("or interactively at http://localhost:8080/swagger-ui");
    Ok(())
}

fn sizes(rows: &[(&str, i32)]) -> Vec<SizeInput> {
    rows.iter()
        .map(|(label, stock)| SizeInput {
            label: (*label).to_string(),
            stock: *stock,
        })
        .collect()
}

fn demo_products() -> Vec<CreateProductInput> {
    vec![
        CreateProductInput {
            name: "Classic Crew Tee".to_string(),
            slug: "classic-crew-tee".to_string(),
            description: Some("Mid-weight cotton tee with a ribbed collar.".to_string()),
            brand: Some("Andaman".to_string()),
            price: dec!(499),
            original_price: Some(dec!(699)),
            category: "T-Shirts".to_string(),
            image_urls: vec!["https://cdn.shophub.in/tees/crew-white.jpg".to_string()],
            stock: None,
            is_active: true,
            sizes: sizes(&[("S", 12), ("M", 20), ("L", 15), ("XL", 8)]),
        },
        CreateProductInput {
            name: "Linen Resort Shirt".to_string(),
            slug: "linen-resort-shirt".to_string(),
            description: Some("Relaxed-fit linen shirt for warm weather.".to_string()),
            brand: Some("Andaman".to_string()),
            price: dec!(1299),
            original_price: Some(dec!(1799)),
            category: "Shirts".to_string(),
            image_urls: vec!["https://cdn.shophub.in/shirts/linen-sand.jpg".to_string()],
            stock: None,
            is_active: true,
            sizes: sizes(&[("M", 10), ("L", 10), ("XL", 6)]),
        },
        CreateProductInput {
            name: "Slim Indigo Jeans".to_string(),
            slug: "slim-indigo-jeans".to_string(),
            description: Some("Stretch denim, mid rise, slim through the leg.".to_string()),
            brand: Some("Marine Drive".to_string()),
            price: dec!(1799),
            original_price: Some(dec!(2499)),
            category: "Jeans".to_string(),
            image_urls: vec!["https://cdn.shophub.in/jeans/slim-indigo.jpg".to_string()],
            stock: None,
            is_active: true,
            sizes: sizes(&[("30", 8), ("32", 14), ("34", 12), ("36", 5)]),
        },
        CreateProductInput {
            name: "Everyday Hoodie".to_string(),
            slug: "everyday-hoodie".to_string(),
            description: Some("Brushed fleece hoodie with a kangaroo pocket.".to_string()),
            brand: Some("Marine Drive".to_string()),
            price: dec!(1499),
            original_price: None,
            category: "Hoodies".to_string(),
            image_urls: vec!["https://cdn.shophub.in/hoodies/charcoal.jpg".to_string()],
            stock: None,
            is_active: true,
            sizes: sizes(&[("S", 6), ("M", 12), ("L", 9)]),
        },
        CreateProductInput {
            name: "Oversized Graphic Tee".to_string(),
            slug: "oversized-graphic-tee".to_string(),
            description: Some("Drop-shoulder tee with a back print.".to_string()),
            brand: Some("Andaman".to_string()),
            price: dec!(649),
            original_price: Some(dec!(899)),
            category: "T-Shirts".to_string(),
            image_urls: vec!["https://cdn.shophub.in/tees/graphic-black.jpg".to_string()],
            stock: None,
            is_active: true,
            sizes: sizes(&[("M", 18), ("L", 18), ("XL", 10)]),
        },
        // Accessories sell without size variants; flat stock.
        CreateProductInput {
            name: "Canvas Tote".to_string(),
            slug: "canvas-tote".to_string(),
            description: Some("Heavy canvas tote with an inner pocket.".to_string()),
            brand: None,
            price: dec!(399),
            original_price: Some(dec!(499)),
            category: "Accessories".to_string(),
            image_urls: vec!["https://cdn.shophub.in/accessories/tote-natural.jpg".to_string()],
            stock: Some(40),
            is_active: true,
            sizes: Vec::new(),
        },
        CreateProductInput {
            name: "Ribbed Beanie".to_string(),
            slug: "ribbed-beanie".to_string(),
            description: None,
            brand: None,
            price: dec!(299),
            original_price: None,
            category: "Accessories".to_string(),
            image_urls: vec!["https://cdn.shophub.in/accessories/beanie-olive.jpg".to_string()],
            stock: Some(25),
            is_active: true,
            sizes: Vec::new(),
        },
        CreateProductInput {
            name: "Piqué Polo".to_string(),
            slug: "pique-polo".to_string(),
            description: Some("Two-button polo in breathable piqué knit.".to_string()),
            brand: Some("Marine Drive".to_string()),
            price: dec!(899),
            original_price: Some(dec!(1199)),
            category: "Shirts".to_string(),
            image_urls: vec!["https://cdn.shophub.in/shirts/polo-navy.jpg".to_string()],
            stock: None,
            is_active: true,
            sizes: sizes(&[("S", 7), ("M", 11), ("L", 11), ("XL", 4)]),
        },
    ]
}
