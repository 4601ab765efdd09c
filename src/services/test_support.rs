//! Database fixtures shared by the service tests

use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::orders::{OrderLineRequest, OrderStatus};
use crate::error::ApiError;
use crate::services::orders::{apply_status, insert_order, Actor, PlacedOrder, StatusChange};

pub struct Vendor {
    pub id: Uuid,
    pub owner_id: Uuid,
}

async fn profile(pool: &PgPool, role: &str) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO profiles (id, email, role) VALUES ($1, $2, $3)")
        .bind(id)
        .bind(format!("{}@example.com", id.simple()))
        .bind(role)
        .execute(pool)
        .await
        .unwrap();
    id
}

pub async fn customer(pool: &PgPool) -> Uuid {
    profile(pool, "customer").await
}

/// An open vendor accepting orders
pub async fn vendor(pool: &PgPool, name: &str) -> Vendor {
    let owner_id = profile(pool, "vendor").await;
    let id: Uuid = sqlx::query_scalar(
        "INSERT INTO vendors (owner_id, name, is_open) VALUES ($1, $2, TRUE) RETURNING id",
    )
    .bind(owner_id)
    .bind(name)
    .fetch_one(pool)
    .await
    .unwrap();
    Vendor { id, owner_id }
}

pub async fn menu_item(pool: &PgPool, vendor_id: Uuid, price: &str, stock: Option<i32>) -> Uuid {
    sqlx::query_scalar(
        r#"
        INSERT INTO menu_items (vendor_id, name, price, stock_quantity)
        VALUES ($1, 'Masala Dosa', $2, $3)
        RETURNING id
        "#,
    )
    .bind(vendor_id)
    .bind(price.parse::<Decimal>().unwrap())
    .bind(stock)
    .fetch_one(pool)
    .await
    .unwrap()
}

pub async fn try_place(
    pool: &PgPool,
    customer_id: Uuid,
    vendor_id: Uuid,
    menu_item_id: Uuid,
    quantity: u32,
) -> Result<PlacedOrder, ApiError> {
    let mut tx = pool.begin().await?;
    let lines = [OrderLineRequest {
        menu_item_id,
        quantity,
    }];
    let placed = insert_order(&mut *tx, customer_id, vendor_id, &lines, None).await?;
    tx.commit().await?;
    Ok(placed)
}

pub async fn place(
    pool: &PgPool,
    customer_id: Uuid,
    vendor_id: Uuid,
    menu_item_id: Uuid,
    quantity: u32,
) -> PlacedOrder {
    try_place(pool, customer_id, vendor_id, menu_item_id, quantity)
        .await
        .unwrap()
}

pub async fn set_status(
    pool: &PgPool,
    order_id: Uuid,
    actor: Actor,
    next: OrderStatus,
) -> Result<StatusChange, ApiError> {
    let mut tx = pool.begin().await?;
    let change = apply_status(&mut *tx, order_id, actor, next, None).await?;
    tx.commit().await?;
    Ok(change)
}

/// Walk an order through the kitchen to `completed`
pub async fn complete(pool: &PgPool, order_id: Uuid, vendor_id: Uuid) {
    for next in [
        OrderStatus::Accepted,
        OrderStatus::Preparing,
        OrderStatus::Ready,
        OrderStatus::Completed,
    ] {
        set_status(pool, order_id, Actor::Vendor(vendor_id), next)
            .await
            .unwrap();
    }
}

/// `(bill_number, queue_position)` of every order of a vendor, by bill
pub async fn queue(pool: &PgPool, vendor_id: Uuid) -> Vec<(i32, Option<i32>)> {
    sqlx::query_as(
        "SELECT bill_number, queue_position FROM orders WHERE vendor_id = $1 ORDER BY bill_number",
    )
    .bind(vendor_id)
    .fetch_all(pool)
    .await
    .unwrap()
}
