//! Read-only views onto data owned by other systems: shelf/inventory
//! configuration and the staff directory.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::db::SharedDatabase;
use crate::error::EngineError;

/// What a shelf is expected to hold, and where.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShelfConfig {
    pub shelf_id: String,
    pub capacity: u32,
    /// Staff member responsible for this shelf; new alerts are assigned to them.
    pub assigned_staff: Option<String>,
    /// Lowercased product name → expected location on this shelf.
    pub expected_locations: HashMap<String, String>,
}

impl ShelfConfig {
    pub fn new(shelf_id: impl Into<String>, capacity: u32) -> Self {
        Self {
            shelf_id: shelf_id.into(),
            capacity,
            assigned_staff: None,
            expected_locations: HashMap::new(),
        }
    }

    pub fn with_product(mut self, product: &str, location: impl Into<String>) -> Self {
        self.expected_locations.insert(product.to_lowercase(), location.into());
        self
    }

    pub fn with_assigned_staff(mut self, staff_id: impl Into<String>) -> Self {
        self.assigned_staff = Some(staff_id.into());
        self
    }

    /// Expected location of `product` on this shelf, or `None` if the shelf
    /// does not stock it.
    pub fn expected_location(&self, product: &str) -> Option<&str> {
        self.expected_locations.get(&product.to_lowercase()).map(String::as_str)
    }
}

/// Where a product is supposed to live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductLocation {
    pub shelf_id: String,
    pub location: String,
}

impl std::fmt::Display for ProductLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "shelf {} / {}", self.shelf_id, self.location)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffMember {
    pub staff_id: String,
    pub name: String,
    pub role: String,
    pub active: bool,
}

/// Shelf/inventory configuration lookup.
pub trait ShelfCatalog: Send + Sync {
    /// `Ok(None)` when the shelf has no configuration; callers treat that as recoverable.
    fn shelf_config(&self, shelf_id: &str) -> Result<Option<ShelfConfig>, EngineError>;

    /// Find the shelf and location a product belongs to.
    fn locate_product(&self, product: &str) -> Result<Option<ProductLocation>, EngineError>;
}

/// Staff directory lookup.
pub trait StaffDirectory: Send + Sync {
    fn staff_member(&self, staff_id: &str) -> Result<Option<StaffMember>, EngineError>;
}

/// In-memory snapshot of shelves and staff for fast lookups.
#[derive(Debug, Clone, Default)]
pub struct CatalogSnapshot {
    shelves: BTreeMap<String, ShelfConfig>,
    staff: HashMap<String, StaffMember>,
}

impl CatalogSnapshot {
    /// Load all shelves, inventory placements and staff from the database into memory.
    pub fn load_from_db(db: &SharedDatabase) -> Result<Self, rusqlite::Error> {
        let mut snapshot = Self::default();
        for shelf in db.all_shelves()? {
            snapshot.shelves.insert(shelf.shelf_id.clone(), shelf);
        }
        for member in db.all_staff()? {
            snapshot.staff.insert(member.staff_id.clone(), member);
        }
        tracing::info!(
            "Catalog loaded {} shelves and {} staff members into memory",
            snapshot.shelves.len(),
            snapshot.staff.len()
        );
        Ok(snapshot)
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_shelf(mut self, shelf: ShelfConfig) -> Self {
        self.shelves.insert(shelf.shelf_id.clone(), shelf);
        self
    }

    pub fn with_staff(mut self, member: StaffMember) -> Self {
        self.staff.insert(member.staff_id.clone(), member);
        self
    }
}

impl ShelfCatalog for CatalogSnapshot {
    fn shelf_config(&self, shelf_id: &str) -> Result<Option<ShelfConfig>, EngineError> {
        Ok(self.shelves.get(shelf_id).cloned())
    }

    fn locate_product(&self, product: &str) -> Result<Option<ProductLocation>, EngineError> {
        Ok(self.shelves.values().find_map(|shelf| {
            shelf.expected_location(product).map(|location| ProductLocation {
                shelf_id: shelf.shelf_id.clone(),
                location: location.to_string(),
            })
        }))
    }
}

impl StaffDirectory for CatalogSnapshot {
    fn staff_member(&self, staff_id: &str) -> Result<Option<StaffMember>, EngineError> {
        Ok(self.staff.get(staff_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> CatalogSnapshot {
        CatalogSnapshot::empty()
            .with_shelf(ShelfConfig::new("A1", 40).with_product("Milk", "R1"))
            .with_shelf(ShelfConfig::new("B2", 20).with_product("Bread", "R3"))
            .with_staff(StaffMember {
                staff_id: "EMP001".into(),
                name: "Dana".into(),
                role: "staff".into(),
                active: true,
            })
    }

    #[test]
    fn shelf_lookup_hit_and_miss() {
        let catalog = snapshot();
        assert_eq!(catalog.shelf_config("A1").unwrap().unwrap().capacity, 40);
        assert!(catalog.shelf_config("Z9").unwrap().is_none());
    }

    #[test]
    fn expected_location_is_case_insensitive() {
        let shelf = ShelfConfig::new("A1", 10).with_product("Whole Milk", "R1");
        assert_eq!(shelf.expected_location("whole milk"), Some("R1"));
        assert_eq!(shelf.expected_location("WHOLE MILK"), Some("R1"));
        assert_eq!(shelf.expected_location("Bread"), None);
    }

    #[test]
    fn locate_product_across_shelves() {
        let catalog = snapshot();
        let found = catalog.locate_product("bread").unwrap().unwrap();
        assert_eq!(found.shelf_id, "B2");
        assert_eq!(found.to_string(), "shelf B2 / R3");
        assert!(catalog.locate_product("Caviar").unwrap().is_none());
    }

    #[test]
    fn staff_lookup() {
        let catalog = snapshot();
        assert!(catalog.staff_member("EMP001").unwrap().unwrap().active);
        assert!(catalog.staff_member("EMP999").unwrap().is_none());
    }
}
