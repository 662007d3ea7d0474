//! Command line arguments and the TOML world file.
//!
//! ```toml
//! [player]
//! inventory_capacity = 20
//! weight_capacity = 60.0
//! max_health = 100.0
//!
//! [[items]]
//! class = "berry"
//! display_name = "Berry"
//! kind = { food = { heal_amount = 5.0 } }
//!
//! [[pickups]]
//! class = "wood"
//! quantity = 5
//! x = 200.0
//! y = 150.0
//! ```

use clap::Parser;
use serde::Deserialize;
use shared::{
    CatalogError, ItemCatalog, ItemClassId, ItemDef, ItemTemplate, DEFAULT_INVENTORY_CAPACITY,
    DEFAULT_MAX_HEALTH, DEFAULT_WEIGHT_CAPACITY,
};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    pub host: String,

    /// Server port to listen on
    #[arg(short, long, default_value_t = 8080)]
    pub port: u16,

    /// Tick rate (updates per second)
    #[arg(short, long, default_value_t = 30)]
    pub tick_rate: u32,

    /// Maximum number of connected clients
    #[arg(short, long, default_value_t = 16)]
    pub max_clients: usize,

    /// World file with player settings, item classes and starting pickups
    #[arg(short, long)]
    pub world: Option<PathBuf>,

    /// Ticks between full state resends to every client
    #[arg(short, long, default_value_t = 150)]
    pub resync_interval: u32,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read world file: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not parse world file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("pickup at ({x}, {y}) uses unknown item class '{class}'")]
    UnknownPickupClass { class: ItemClassId, x: f32, y: f32 },

    #[error("tick rate must be between 1 and 1000, got {0}")]
    InvalidTickRate(u32),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub inventory_capacity: u32,
    pub weight_capacity: f32,
    pub max_health: f32,
    /// Health on spawn, `max_health` if unset
    pub starting_health: Option<f32>,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            inventory_capacity: DEFAULT_INVENTORY_CAPACITY,
            weight_capacity: DEFAULT_WEIGHT_CAPACITY,
            max_health: DEFAULT_MAX_HEALTH,
            starting_health: None,
        }
    }
}

/// A pickup placed in the world at startup
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PickupSpawn {
    pub class: ItemClassId,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    pub x: f32,
    pub y: f32,
}

fn default_quantity() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorldConfig {
    #[serde(default)]
    pub player: PlayerConfig,

    /// Start from the built-in item classes before adding `items`
    #[serde(default = "default_true")]
    pub default_items: bool,

    #[serde(default)]
    pub items: Vec<ItemDef>,

    #[serde(default)]
    pub pickups: Vec<PickupSpawn>,
}

impl Default for WorldConfig {
    fn default() -> Self {
        let pickup = |class: &str, quantity, x, y| PickupSpawn {
            class: class.into(),
            quantity,
            x,
            y,
        };
        Self {
            player: PlayerConfig::default(),
            default_items: true,
            items: Vec::new(),
            pickups: vec![
                pickup("wood", 5, 200.0, 150.0),
                pickup("wood", 8, 260.0, 180.0),
                pickup("stone", 3, 520.0, 300.0),
                pickup("apple", 4, 400.0, 420.0),
                pickup("axe", 1, 620.0, 120.0),
            ],
        }
    }
}

impl WorldConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }

    pub fn catalog(&self) -> Result<ItemCatalog, ConfigError> {
        let mut catalog = if self.default_items {
            ItemCatalog::with_defaults()
        } else {
            ItemCatalog::new()
        };
        catalog.extend(self.items.iter().cloned())?;
        Ok(catalog)
    }

    /// Resolves every starting pickup against `catalog`
    pub fn pickup_templates(
        &self,
        catalog: &ItemCatalog,
    ) -> Result<Vec<(ItemTemplate, f32, f32)>, ConfigError> {
        self.pickups
            .iter()
            .map(|spawn| -> Result<_, ConfigError> {
                let def = catalog
                    .get(&spawn.class)
                    .ok_or_else(|| ConfigError::UnknownPickupClass {
                        class: spawn.class.clone(),
                        x: spawn.x,
                        y: spawn.y,
                    })?;
                let template = ItemTemplate {
                    def: def.clone(),
                    quantity: spawn.quantity,
                };
                Ok((template, spawn.x, spawn.y))
            })
            .collect()
    }
}

impl Args {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_rate == 0 || self.tick_rate > 1000 {
            return Err(ConfigError::InvalidTickRate(self.tick_rate));
        }
        Ok(())
    }

    pub fn world_config(&self) -> Result<WorldConfig, ConfigError> {
        match &self.world {
            Some(path) => WorldConfig::load(path),
            None => Ok(WorldConfig::default()),
        }
    }
}
