//! Inventory records and metadata patches.

use crate::{RecordId, ServerTimestamp};
use serde::{Deserialize, Serialize};

/// A product as stored in the document store and mirrored in the local cache.
///
/// `quantity` is unsigned: no persisted version can go below zero.
/// Only transactions change it; edits go through [`MetadataPatch`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryRecord {
    /// Stable product identifier
    pub id: RecordId,
    pub name: String,
    pub category: String,
    /// Units on hand
    pub quantity: u32,
    /// Low-stock alert threshold (not conflict-managed)
    pub min_stock: u32,
    pub location: String,
    #[serde(default)]
    pub notes: String,
    /// Last update, assigned by the server or stamped locally while offline
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<ServerTimestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
}

impl InventoryRecord {
    /// Create a new record with empty notes and no timestamp.
    pub fn new(
        id: impl Into<RecordId>,
        name: impl Into<String>,
        category: impl Into<String>,
        quantity: u32,
        min_stock: u32,
        location: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            category: category.into(),
            quantity,
            min_stock,
            location: location.into(),
            notes: String::new(),
            last_updated: None,
            image_url: None,
            thumbnail_url: None,
        }
    }

    /// Builder-style timestamp setter.
    pub fn with_last_updated(mut self, at: impl Into<ServerTimestamp>) -> Self {
        self.last_updated = Some(at.into());
        self
    }

    /// Builder-style notes setter.
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }

    /// Apply a signed delta, clamping at zero and at `u32::MAX`.
    ///
    /// Returns the delta that actually took effect.
    pub fn apply_delta(&mut self, delta: i64) -> i64 {
        let before = self.quantity;
        self.quantity = clamp_quantity(i128::from(before) + i128::from(delta));
        i64::from(self.quantity) - i64::from(before)
    }

    /// Whether the conflict-managed metadata fields differ.
    ///
    /// Image URLs are not part of the comparison.
    pub fn metadata_differs(&self, other: &InventoryRecord) -> bool {
        self.name != other.name
            || self.category != other.category
            || self.location != other.location
            || self.min_stock != other.min_stock
            || self.notes != other.notes
    }

    /// Whether the quantities differ.
    pub fn quantity_differs(&self, other: &InventoryRecord) -> bool {
        self.quantity != other.quantity
    }
}

/// Clamp an exact sum into the valid quantity range.
pub(crate) fn clamp_quantity(value: i128) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

/// A partial metadata update from the edit path.
///
/// Quantity is deliberately absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_stock: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
}

impl MetadataPatch {
    /// Create an empty patch.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn min_stock(mut self, min_stock: u32) -> Self {
        self.min_stock = Some(min_stock);
        self
    }

    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// True when the patch sets nothing.
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.category.is_none()
            && self.location.is_none()
            && self.min_stock.is_none()
            && self.notes.is_none()
            && self.image_url.is_none()
            && self.thumbnail_url.is_none()
    }

    /// Write the set fields onto a record.
    pub fn apply_to(&self, record: &mut InventoryRecord) {
        if let Some(name) = &self.name {
            record.name = name.clone();
        }
        if let Some(category) = &self.category {
            record.category = category.clone();
        }
        if let Some(location) = &self.location {
            record.location = location.clone();
        }
        if let Some(min_stock) = self.min_stock {
            record.min_stock = min_stock;
        }
        if let Some(notes) = &self.notes {
            record.notes = notes.clone();
        }
        if let Some(image_url) = &self.image_url {
            record.image_url = Some(image_url.clone());
        }
        if let Some(thumbnail_url) = &self.thumbnail_url {
            record.thumbnail_url = Some(thumbnail_url.clone());
        }
    }
}
