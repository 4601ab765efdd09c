//! Shopping cart
//!
//! Carts live in Redis and only hold item ids and quantities; prices are
//! always resolved from the current menu.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

use super::orders::{OrderLineRequest, OrderableItem, MAX_LINE_QUANTITY, MAX_ORDER_LINES};
use crate::error::ApiError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CartLine {
    pub menu_item_id: Uuid,
    pub quantity: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cart {
    pub vendor_id: Option<Uuid>,
    pub lines: Vec<CartLine>,
    pub updated_at: DateTime<Utc>,
}

impl Default for Cart {
    fn default() -> Self {
        Self {
            vendor_id: None,
            lines: Vec::new(),
            updated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CartError {
    #[error("Cart already contains items from another vendor")]
    VendorMismatch,

    #[error("Quantity cannot exceed {MAX_LINE_QUANTITY}")]
    QuantityTooLarge,

    #[error("Cart cannot contain more than {MAX_ORDER_LINES} different items")]
    TooManyLines,
}

impl From<CartError> for ApiError {
    fn from(err: CartError) -> Self {
        match err {
            CartError::VendorMismatch => ApiError::Conflict(err.to_string()),
            _ => ApiError::BadRequest(err.to_string()),
        }
    }
}

impl Cart {
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Set the quantity of an item; zero removes the line. With `replace`,
    /// a cart holding another vendor's items is emptied first.
    pub fn set_quantity(
        &mut self,
        vendor_id: Uuid,
        menu_item_id: Uuid,
        quantity: u32,
        replace: bool,
    ) -> Result<(), CartError> {
        if quantity > MAX_LINE_QUANTITY {
            return Err(CartError::QuantityTooLarge);
        }

        match self.vendor_id {
            Some(current) if current != vendor_id && !self.lines.is_empty() => {
                if !replace {
                    return Err(CartError::VendorMismatch);
                }
                self.lines.clear();
            }
            _ => {}
        }

        match self.lines.iter().position(|l| l.menu_item_id == menu_item_id) {
            Some(i) if quantity == 0 => {
                self.lines.remove(i);
            }
            Some(i) => self.lines[i].quantity = quantity,
            None if quantity == 0 => {}
            None => {
                if self.lines.len() >= MAX_ORDER_LINES {
                    return Err(CartError::TooManyLines);
                }
                self.lines.push(CartLine {
                    menu_item_id,
                    quantity,
                });
            }
        }

        self.vendor_id = if self.lines.is_empty() {
            None
        } else {
            Some(vendor_id)
        };
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn order_lines(&self) -> Vec<OrderLineRequest> {
        self.lines
            .iter()
            .map(|l| OrderLineRequest {
                menu_item_id: l.menu_item_id,
                quantity: l.quantity,
            })
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetCartItemRequest {
    pub menu_item_id: Uuid,
    pub quantity: u32,
    #[serde(default)]
    pub replace: bool,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct CheckoutRequest {
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CartLineView {
    pub menu_item_id: Uuid,
    pub name: Option<String>,
    pub unit_price: Option<Decimal>,
    pub quantity: u32,
    pub line_total: Option<Decimal>,
    pub available: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CartView {
    pub vendor_id: Option<Uuid>,
    pub vendor_name: Option<String>,
    pub lines: Vec<CartLineView>,
    pub item_count: u32,
    pub subtotal: Decimal,
    pub has_unavailable: bool,
}

impl CartView {
    /// Resolve cart lines against current menu rows. Lines whose item is gone,
    /// hidden, moved vendor or short on stock are flagged and left out of
    /// the subtotal.
    pub fn build(cart: &Cart, items: &[OrderableItem], vendor_name: Option<String>) -> Self {
        let by_id: HashMap<Uuid, &OrderableItem> = items.iter().map(|i| (i.id, i)).collect();
        let mut subtotal = Decimal::ZERO;
        let mut item_count = 0;

        let lines: Vec<CartLineView> = cart
            .lines
            .iter()
            .map(|line| {
                let item = by_id.get(&line.menu_item_id);
                let available = item.map_or(false, |i| {
                    i.is_available
                        && Some(i.vendor_id) == cart.vendor_id
                        && i.stock_quantity.map_or(true, |s| s >= line.quantity as i32)
                });
                let line_total = item.map(|i| i.price * Decimal::from(line.quantity));

                if available {
                    subtotal += line_total.unwrap_or_default();
                    item_count += line.quantity;
                }

                CartLineView {
                    menu_item_id: line.menu_item_id,
                    name: item.map(|i| i.name.clone()),
                    unit_price: item.map(|i| i.price),
                    quantity: line.quantity,
                    line_total,
                    available,
                }
            })
            .collect();

        Self {
            vendor_id: cart.vendor_id,
            vendor_name,
            has_unavailable: lines.iter().any(|l| !l.available),
            lines,
            item_count,
            subtotal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn orderable(vendor_id: Uuid, price: &str, stock: Option<i32>) -> OrderableItem {
        OrderableItem {
            id: Uuid::new_v4(),
            vendor_id,
            name: "Thali".to_string(),
            price: price.parse().unwrap(),
            is_available: true,
            stock_quantity: stock,
        }
    }

    #[test]
    fn set_add_update_remove() {
        let vendor = Uuid::new_v4();
        let item = Uuid::new_v4();
        let mut cart = Cart::default();

        cart.set_quantity(vendor, item, 2, false).unwrap();
        assert_eq!(cart.vendor_id, Some(vendor));
        cart.set_quantity(vendor, item, 5, false).unwrap();
        assert_eq!(cart.lines, vec![CartLine { menu_item_id: item, quantity: 5 }]);

        cart.set_quantity(vendor, item, 0, false).unwrap();
        assert!(cart.is_empty());
        assert_eq!(cart.vendor_id, None);
    }

    #[test]
    fn single_vendor_per_cart() {
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        let mut cart = Cart::default();
        cart.set_quantity(first, Uuid::new_v4(), 1, false).unwrap();

        assert_eq!(
            cart.set_quantity(second, Uuid::new_v4(), 1, false),
            Err(CartError::VendorMismatch)
        );

        let item = Uuid::new_v4();
        cart.set_quantity(second, item, 3, true).unwrap();
        assert_eq!(cart.vendor_id, Some(second));
        assert_eq!(cart.order_lines().len(), 1);
        assert_eq!(cart.order_lines()[0].menu_item_id, item);
    }

    #[test]
    fn rejects_oversized_quantity() {
        let mut cart = Cart::default();
        assert_eq!(
            cart.set_quantity(Uuid::new_v4(), Uuid::new_v4(), MAX_LINE_QUANTITY + 1, false),
            Err(CartError::QuantityTooLarge)
        );
    }

    #[test]
    fn view_excludes_unavailable_lines_from_subtotal() {
        let vendor = Uuid::new_v4();
        let thali = orderable(vendor, "150.00", None);
        let mut lassi = orderable(vendor, "60.00", Some(1));
        lassi.name = "Lassi".to_string();
        let gone = Uuid::new_v4();

        let mut cart = Cart::default();
        cart.set_quantity(vendor, thali.id, 2, false).unwrap();
        cart.set_quantity(vendor, lassi.id, 2, false).unwrap();
        cart.set_quantity(vendor, gone, 1, false).unwrap();

        let view = CartView::build(&cart, &[thali, lassi], Some("Annapurna".to_string()));
        assert_eq!(view.subtotal, "300.00".parse::<Decimal>().unwrap());
        assert_eq!(view.item_count, 2);
        assert!(view.has_unavailable);
        assert!(!view.lines[1].available);
        assert!(view.lines[2].name.is_none());
    }
}
