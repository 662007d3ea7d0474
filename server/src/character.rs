use crate::config::PlayerConfig;
use log::{debug, info};
use shared::{
    CharacterState, InputState, Inventory, InventoryError, InventoryId, InteractionState, ItemId,
    ItemUser, Lifecycle, UseOutcome, PLAYER_SIZE, PLAYER_SPEED, WORLD_HEIGHT, WORLD_WIDTH,
};

/// The authoritative representation of one connected player
#[derive(Debug)]
pub struct Character {
    pub id: u32,
    pub x: f32,
    pub y: f32,
    pub health: f32,
    pub max_health: f32,
    inventory: Inventory,
    interaction: InteractionState,
    /// Interact flag of the last applied input, for edge detection
    interact_input: bool,
}

impl Character {
    pub fn new(id: u32, x: f32, y: f32, config: &PlayerConfig) -> Self {
        Self {
            id,
            x,
            y,
            health: config.starting_health.unwrap_or(config.max_health),
            max_health: config.max_health,
            inventory: Inventory::new(
                InventoryId(id),
                id,
                config.inventory_capacity,
                config.weight_capacity,
            ),
            interaction: InteractionState::new(),
            interact_input: false,
        }
    }

    pub fn inventory(&self) -> &Inventory {
        &self.inventory
    }

    pub fn inventory_mut(&mut self) -> &mut Inventory {
        &mut self.inventory
    }

    pub fn interaction(&self) -> &InteractionState {
        &self.interaction
    }

    pub fn interaction_mut(&mut self) -> &mut InteractionState {
        &mut self.interaction
    }

    /// Stores the interact flag and reports whether it was just pressed
    /// (`Some(true)`) or just released (`Some(false)`)
    pub fn interact_edge(&mut self, interact: bool) -> Option<bool> {
        if interact == self.interact_input {
            return None;
        }
        self.interact_input = interact;
        Some(interact)
    }

    pub fn apply_movement(&mut self, input: &InputState, dt: f32) {
        let (dx, dy) = input.direction();
        let len = (dx * dx + dy * dy).sqrt();
        if len == 0.0 {
            return;
        }

        self.x += dx / len * PLAYER_SPEED * dt;
        self.y += dy / len * PLAYER_SPEED * dt;
        self.x = self.x.clamp(0.0, WORLD_WIDTH - PLAYER_SIZE);
        self.y = self.y.clamp(0.0, WORLD_HEIGHT - PLAYER_SIZE);
    }

    /// Uses one item from the inventory on this character. Items with an
    /// effect lose one unit.
    pub fn use_item(&mut self, item: ItemId) -> Result<UseOutcome, InventoryError> {
        let used = self
            .inventory
            .item(item)
            .cloned()
            .ok_or(InventoryError::UnknownItem(item))?;

        let outcome = used.use_on(self);
        if outcome == UseOutcome::Consumed {
            self.inventory.consume_item(item, 1)?;
        }
        Ok(outcome)
    }

    pub fn state(&self, interact_percentage: f32) -> CharacterState {
        CharacterState {
            id: self.id,
            inventory: self.inventory.id(),
            x: self.x,
            y: self.y,
            health: self.health,
            max_health: self.max_health,
            viewed: self.interaction.viewed(),
            interacting: self.interaction.is_interacting(),
            interact_percentage,
        }
    }
}

impl ItemUser for Character {
    fn heal(&mut self, amount: f32) {
        self.health = (self.health + amount).clamp(0.0, self.max_health);
        debug!("Character {} healed to {:.1}", self.id, self.health);
    }
}

impl Lifecycle for Character {
    fn init(&mut self) {
        info!(
            "Character {} spawned at ({:.0}, {:.0}) with {} slots / {:.0} weight",
            self.id,
            self.x,
            self.y,
            self.inventory.capacity(),
            self.inventory.weight_capacity()
        );
    }

    fn on_destroy(&mut self) {
        info!(
            "Character {} removed, dropping {} inventory slots",
            self.id,
            self.inventory.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use shared::{ItemDef, ItemKind};

    fn input(left: bool, right: bool, up: bool, down: bool) -> InputState {
        InputState {
            sequence: 1,
            timestamp: 0,
            left,
            right,
            up,
            down,
            interact: false,
        }
    }

    #[test]
    fn test_character_creation() {
        let character = Character::new(3, 100.0, 200.0, &PlayerConfig::default());

        assert_eq!(character.inventory().id(), InventoryId(3));
        assert_eq!(character.inventory().capacity(), 20);
        assert_approx_eq!(character.inventory().weight_capacity(), 60.0);
        assert_approx_eq!(character.health, character.max_health);
    }

    #[test]
    fn test_movement_is_clamped() {
        let mut character = Character::new(1, 5.0, 5.0, &PlayerConfig::default());

        character.apply_movement(&input(true, false, true, false), 1.0);

        assert_approx_eq!(character.x, 0.0);
        assert_approx_eq!(character.y, 0.0);

        character.apply_movement(&input(false, true, false, false), 0.1);
        assert_approx_eq!(character.x, PLAYER_SPEED * 0.1);
    }

    #[test]
    fn test_interact_edge() {
        let mut character = Character::new(1, 0.0, 0.0, &PlayerConfig::default());

        assert_eq!(character.interact_edge(false), None);
        assert_eq!(character.interact_edge(true), Some(true));
        assert_eq!(character.interact_edge(true), None);
        assert_eq!(character.interact_edge(false), Some(false));
    }

    #[test]
    fn test_eating_heals_and_consumes() {
        let config = PlayerConfig {
            starting_health: Some(50.0),
            ..PlayerConfig::default()
        };
        let mut character = Character::new(1, 0.0, 0.0, &config);
        let apple = ItemDef::new("apple", "Apple")
            .with_max_stack(5)
            .with_kind(ItemKind::Food { heal_amount: 80.0 });
        character
            .inventory_mut()
            .try_add_item_from_class(&apple, 2)
            .unwrap();
        let id = character.inventory().items()[0].id();

        assert_eq!(character.use_item(id).unwrap(), UseOutcome::Consumed);

        assert_approx_eq!(character.health, 100.0);
        assert_eq!(character.inventory().items()[0].quantity(), 1);
    }

    #[test]
    fn test_using_material_keeps_it() {
        let mut character = Character::new(1, 0.0, 0.0, &PlayerConfig::default());
        let wood = ItemDef::new("wood", "Wood").with_max_stack(10);
        character
            .inventory_mut()
            .try_add_item_from_class(&wood, 3)
            .unwrap();
        let id = character.inventory().items()[0].id();

        assert_eq!(character.use_item(id).unwrap(), UseOutcome::NoEffect);
        assert_eq!(character.inventory().items()[0].quantity(), 3);
    }

    #[test]
    fn test_use_unknown_item() {
        let mut character = Character::new(1, 0.0, 0.0, &PlayerConfig::default());

        assert_eq!(
            character.use_item(ItemId(u64::MAX)),
            Err(InventoryError::UnknownItem(ItemId(u64::MAX)))
        );
    }
}
