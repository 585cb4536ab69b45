//! In-memory item store backing the CRUD routes.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use thiserror::Error;
use uuid::Uuid;

pub const NAME_MAX_CHARS: usize = 100;
pub const DESCRIPTION_MAX_CHARS: usize = 500;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub price: f64,
    /// Epoch milliseconds.
    pub created_at: i64,
    /// Epoch milliseconds.
    pub updated_at: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateItem {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price: f64,
}

/// Partial update. Omitted fields keep their current value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateItem {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ItemError {
    #[error("{0}")]
    Validation(String),

    #[error("Item {0} not found")]
    NotFound(String),
}

fn validate_name(name: &str) -> Result<(), ItemError> {
    let chars = name.chars().count();
    if chars == 0 || chars > NAME_MAX_CHARS {
        return Err(ItemError::Validation(format!(
            "name must be between 1 and {NAME_MAX_CHARS} characters"
        )));
    }
    Ok(())
}

fn validate_description(description: Option<&str>) -> Result<(), ItemError> {
    if description.is_some_and(|d| d.chars().count() > DESCRIPTION_MAX_CHARS) {
        return Err(ItemError::Validation(format!(
            "description must be at most {DESCRIPTION_MAX_CHARS} characters"
        )));
    }
    Ok(())
}

fn validate_price(price: f64) -> Result<(), ItemError> {
    if !price.is_finite() || price <= 0.0 {
        return Err(ItemError::Validation("price must be greater than 0".to_string()));
    }
    Ok(())
}

impl CreateItem {
    pub fn validate(&self) -> Result<(), ItemError> {
        validate_name(&self.name)?;
        validate_description(self.description.as_deref())?;
        validate_price(self.price)
    }
}

impl UpdateItem {
    pub fn validate(&self) -> Result<(), ItemError> {
        if let Some(name) = &self.name {
            validate_name(name)?;
        }
        validate_description(self.description.as_deref())?;
        if let Some(price) = self.price {
            validate_price(price)?;
        }
        Ok(())
    }
}

/// Thread-safe item store. Lock poisoning is recovered, not propagated.
#[derive(Debug, Default)]
pub struct ItemStore {
    items: RwLock<HashMap<String, Item>>,
}

impl ItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, input: CreateItem) -> Result<Item, ItemError> {
        input.validate()?;
        let now = Utc::now().timestamp_millis();
        let item = Item {
            id: Uuid::new_v4().to_string(),
            name: input.name,
            description: input.description,
            price: input.price,
            created_at: now,
            updated_at: now,
        };
        let mut items = self.items.write().unwrap_or_else(|e| e.into_inner());
        items.insert(item.id.clone(), item.clone());
        Ok(item)
    }

    pub fn get(&self, id: &str) -> Result<Item, ItemError> {
        let items = self.items.read().unwrap_or_else(|e| e.into_inner());
        items
            .get(id)
            .cloned()
            .ok_or_else(|| ItemError::NotFound(id.to_string()))
    }

    pub fn update(&self, id: &str, input: UpdateItem) -> Result<Item, ItemError> {
        input.validate()?;
        let mut items = self.items.write().unwrap_or_else(|e| e.into_inner());
        let item = items
            .get_mut(id)
            .ok_or_else(|| ItemError::NotFound(id.to_string()))?;

        if let Some(name) = input.name {
            item.name = name;
        }
        if let Some(description) = input.description {
            item.description = Some(description);
        }
        if let Some(price) = input.price {
            item.price = price;
        }
        item.updated_at = Utc::now().timestamp_millis().max(item.created_at);
        Ok(item.clone())
    }

    pub fn delete(&self, id: &str) -> Result<(), ItemError> {
        let mut items = self.items.write().unwrap_or_else(|e| e.into_inner());
        items
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| ItemError::NotFound(id.to_string()))
    }

    /// Oldest items first, at most `limit`.
    pub fn list(&self, limit: usize) -> Vec<Item> {
        let items = self.items.read().unwrap_or_else(|e| e.into_inner());
        let mut all: Vec<Item> = items.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        all.truncate(limit);
        all
    }

    pub fn len(&self) -> usize {
        self.items.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
