//! Menu domain types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const MAX_PRICE: i64 = 100_000;
pub const DEFAULT_LOW_STOCK_THRESHOLD: i32 = 5;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MenuItem {
    pub id: Uuid,
    pub vendor_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub category: Option<String>,
    pub image_url: Option<String>,
    pub is_available: bool,
    pub is_vegetarian: bool,
    /// `None` when the vendor does not track stock for this item
    pub stock_quantity: Option<i32>,
    pub preparation_minutes: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateMenuItemRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price: Decimal,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default = "default_true")]
    pub is_available: bool,
    #[serde(default)]
    pub is_vegetarian: bool,
    #[serde(default)]
    pub stock_quantity: Option<i32>,
    #[serde(default)]
    pub preparation_minutes: Option<i32>,
}

impl CreateMenuItemRequest {
    pub fn validate(&self) -> Result<(), String> {
        validate_name(&self.name)?;
        validate_price(self.price)?;
        validate_non_negative("stock_quantity", self.stock_quantity)?;
        validate_non_negative("preparation_minutes", self.preparation_minutes)
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct UpdateMenuItemRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub is_vegetarian: Option<bool>,
    #[serde(default)]
    pub preparation_minutes: Option<i32>,
}

impl UpdateMenuItemRequest {
    pub fn validate(&self) -> Result<(), String> {
        if let Some(name) = &self.name {
            validate_name(name)?;
        }
        if let Some(price) = self.price {
            validate_price(price)?;
        }
        validate_non_negative("preparation_minutes", self.preparation_minutes)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateAvailabilityRequest {
    pub is_available: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateStockRequest {
    /// `null` stops stock tracking for the item
    pub stock_quantity: Option<i32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct MenuQuery {
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub vegetarian: Option<bool>,
    #[serde(default)]
    pub include_unavailable: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct InventoryQuery {
    #[serde(default)]
    pub threshold: Option<i32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MenuCategory {
    pub name: String,
    pub items: Vec<MenuItem>,
}

pub fn validate_name(name: &str) -> Result<(), String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err("Name is required".to_string());
    }
    if trimmed.chars().count() > 120 {
        return Err("Name cannot exceed 120 characters".to_string());
    }
    Ok(())
}

pub fn validate_price(price: Decimal) -> Result<(), String> {
    if price <= Decimal::ZERO {
        return Err("Price must be greater than zero".to_string());
    }
    if price.normalize().scale() > 2 {
        return Err("Price cannot have more than two decimal places".to_string());
    }
    if price > Decimal::from(MAX_PRICE) {
        return Err(format!("Price cannot exceed {}", MAX_PRICE));
    }
    Ok(())
}

fn validate_non_negative(field: &str, value: Option<i32>) -> Result<(), String> {
    match value {
        Some(v) if v < 0 => Err(format!("{} cannot be negative", field)),
        _ => Ok(()),
    }
}

/// Availability after a vendor sets stock: running out hides the item,
/// restocking an item that had run out shows it again. Anything else keeps
/// the vendor's own availability choice.
pub fn availability_after_stock_change(
    is_available: bool,
    old_stock: Option<i32>,
    new_stock: Option<i32>,
) -> bool {
    match (old_stock, new_stock) {
        (_, Some(0)) => false,
        (Some(0), Some(n)) if n > 0 => true,
        (Some(0), None) => true,
        _ => is_available,
    }
}

/// Filter a vendor's items by the storefront query
pub fn filter_items(items: Vec<MenuItem>, query: &MenuQuery) -> Vec<MenuItem> {
    items
        .into_iter()
        .filter(|item| {
            query
                .category
                .as_deref()
                .map_or(true, |c| item.category.as_deref().map_or(false, |ic| ic.eq_ignore_ascii_case(c)))
        })
        .filter(|item| query.vegetarian != Some(true) || item.is_vegetarian)
        .collect()
}

/// Group items into categories, in order of first appearance.
/// Uncategorised items go under "Other".
pub fn group_by_category(items: Vec<MenuItem>) -> Vec<MenuCategory> {
    let mut categories: Vec<MenuCategory> = Vec::new();

    for item in items {
        let name = item
            .category
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or("Other")
            .to_string();

        match categories.iter_mut().find(|c| c.name == name) {
            Some(category) => category.items.push(item),
            None => categories.push(MenuCategory {
                name,
                items: vec![item],
            }),
        }
    }

    categories
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn menu_item(name: &str, category: Option<&str>, veg: bool) -> MenuItem {
        MenuItem {
            id: Uuid::new_v4(),
            vendor_id: Uuid::nil(),
            name: name.to_string(),
            description: None,
            price: dec("50"),
            category: category.map(str::to_string),
            image_url: None,
            is_available: true,
            is_vegetarian: veg,
            stock_quantity: None,
            preparation_minutes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn price_validation() {
        assert!(validate_price(dec("120.50")).is_ok());
        assert!(validate_price(dec("120.500")).is_ok());
        assert!(validate_price(dec("0")).is_err());
        assert!(validate_price(dec("9.999")).is_err());
        assert!(validate_price(dec("100001")).is_err());
    }

    #[test]
    fn create_request_rejects_blank_name_and_negative_stock() {
        let mut req = CreateMenuItemRequest {
            name: "  ".to_string(),
            description: None,
            price: dec("10"),
            category: None,
            image_url: None,
            is_available: true,
            is_vegetarian: false,
            stock_quantity: None,
            preparation_minutes: None,
        };
        assert!(req.validate().is_err());

        req.name = "Poha".to_string();
        req.stock_quantity = Some(-1);
        assert!(req.validate().is_err());

        req.stock_quantity = Some(0);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn stock_changes_drive_availability() {
        assert!(!availability_after_stock_change(true, Some(4), Some(0)));
        assert!(availability_after_stock_change(false, Some(0), Some(12)));
        assert!(availability_after_stock_change(false, Some(0), None));
        // Hidden by the vendor on purpose: restocking keeps it hidden
        assert!(!availability_after_stock_change(false, Some(3), Some(10)));
        assert!(availability_after_stock_change(true, None, Some(10)));
    }

    #[test]
    fn groups_and_filters_menu() {
        let items = vec![
            menu_item("Samosa", Some("Snacks"), true),
            menu_item("Chicken Roll", Some("Rolls"), false),
            menu_item("Paneer Roll", Some("Rolls"), true),
            menu_item("Water", None, true),
        ];

        let veg = filter_items(
            items.clone(),
            &MenuQuery {
                vegetarian: Some(true),
                ..Default::default()
            },
        );
        assert_eq!(veg.len(), 3);

        let rolls = filter_items(
            items.clone(),
            &MenuQuery {
                category: Some("rolls".to_string()),
                ..Default::default()
            },
        );
        assert_eq!(rolls.len(), 2);

        let grouped = group_by_category(items);
        let names: Vec<_> = grouped.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Snacks", "Rolls", "Other"]);
        assert_eq!(grouped[1].items.len(), 2);
    }
}
