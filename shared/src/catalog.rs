//! Registry of item classes.
//!
//! Definitions come from the built-in set or from the `[[items]]` tables of
//! a TOML world file:
//!
//! ```toml
//! [[items]]
//! class = "apple"
//! display_name = "Apple"
//! weight = 0.2
//! max_stack_size = 5
//! kind = { food = { heal_amount = 20.0 } }
//! ```

use crate::error::CatalogError;
use crate::item::{ItemClassId, ItemDef, ItemKind, ItemRarity};
use crate::{MAX_ITEM_DESCRIPTION_LEN, MAX_ITEM_NAME_LEN};
use log::info;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Default)]
pub struct ItemCatalog {
    defs: BTreeMap<ItemClassId, ItemDef>,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    items: Vec<ItemDef>,
}

impl ItemCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wood, stone, apple and axe
    pub fn with_defaults() -> Self {
        let mut catalog = Self::new();
        let defaults = [
            ItemDef::new("wood", "Wood")
                .with_weight(1.0)
                .with_max_stack(10),
            ItemDef::new("stone", "Stone")
                .with_weight(2.0)
                .with_max_stack(10),
            ItemDef::new("apple", "Apple")
                .with_weight(0.2)
                .with_max_stack(5)
                .with_kind(ItemKind::Food { heal_amount: 20.0 }),
            {
                let mut axe = ItemDef::new("axe", "Axe").with_weight(3.0).non_stackable();
                axe.rarity = ItemRarity::Uncommon;
                axe
            },
        ];
        for def in defaults {
            catalog.defs.insert(def.class.clone(), def);
        }
        catalog
    }

    pub fn from_toml_str(source: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = toml::from_str(source)?;
        let mut catalog = Self::new();
        catalog.extend(file.items)?;
        Ok(catalog)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let source = std::fs::read_to_string(path.as_ref())?;
        let catalog = Self::from_toml_str(&source)?;
        info!(
            "Loaded {} item classes from {}",
            catalog.len(),
            path.as_ref().display()
        );
        Ok(catalog)
    }

    pub fn register(&mut self, def: ItemDef) -> Result<(), CatalogError> {
        validate(&def)?;
        if self.defs.contains_key(&def.class) {
            return Err(CatalogError::DuplicateClass(def.class));
        }
        self.defs.insert(def.class.clone(), def);
        Ok(())
    }

    pub fn extend(&mut self, defs: impl IntoIterator<Item = ItemDef>) -> Result<(), CatalogError> {
        for def in defs {
            self.register(def)?;
        }
        Ok(())
    }

    pub fn get(&self, class: &ItemClassId) -> Option<&ItemDef> {
        self.defs.get(class)
    }

    /// Like [`ItemCatalog::get`] but an unknown class is an error
    pub fn require(&self, class: &ItemClassId) -> Result<&ItemDef, CatalogError> {
        self.get(class)
            .ok_or_else(|| CatalogError::UnknownClass(class.clone()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ItemDef> {
        self.defs.values()
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }
}

fn validate(def: &ItemDef) -> Result<(), CatalogError> {
    let invalid = |reason: &str| CatalogError::InvalidDefinition {
        class: def.class.clone(),
        reason: reason.to_string(),
    };

    if def.class.as_str().is_empty() {
        return Err(invalid("class id is empty"));
    }
    if def.class.as_str().len() > MAX_ITEM_NAME_LEN || def.display_name.len() > MAX_ITEM_NAME_LEN {
        return Err(invalid("class id and display name are limited to 64 bytes"));
    }
    if def.description.len() > MAX_ITEM_DESCRIPTION_LEN {
        return Err(invalid("description is limited to 1024 bytes"));
    }
    if !def.weight.is_finite() || def.weight < 0.0 {
        return Err(invalid("weight must be finite and non-negative"));
    }
    if def.stackable && def.max_stack_size < 1 {
        return Err(invalid("stackable items need max_stack_size >= 1"));
    }
    if let ItemKind::Food { heal_amount } = def.kind {
        if !heal_amount.is_finite() {
            return Err(invalid("heal_amount must be finite"));
        }
    }
    Ok(())
}
