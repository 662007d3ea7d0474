//! Focus and hold-to-interact mechanics.
//!
//! ### Pieces
//!
//! - [`Interactable`] lives on a world object and tracks who is interacting
//!   with it.
//! - [`InteractionState`] lives on a character and tracks what it is looking
//!   at, whether the interact input is held and the countdown.
//! - [`InteractTimer`] is the countdown, advanced by the owner's tick.
//!
//! ### Flow
//!
//! A proximity scan produces [`FocusCandidate`]s. The state moves focus
//! between interactables, arms the timer on `begin_interact` and cancels it
//! when the input is released or focus is lost. When the timer runs out the
//! interaction fires once and the id of the target is handed back to the
//! caller, which applies the effect.

use crate::events::{Observers, SubscriptionId};
use crate::pickup::PickupId;
use log::debug;

const TIME_EPSILON: f32 = 1e-6;

/// Cancellable countdown owned by one character
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InteractTimer {
    remaining: Option<f32>,
}

impl InteractTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts (or restarts) the countdown
    pub fn arm(&mut self, seconds: f32) {
        self.remaining = Some(seconds.max(0.0));
    }

    pub fn cancel(&mut self) {
        self.remaining = None;
    }

    /// Advances the countdown by `dt` seconds. Returns true exactly once,
    /// on the tick the countdown completes; the timer is disarmed after.
    pub fn advance(&mut self, dt: f32) -> bool {
        match self.remaining {
            Some(remaining) => {
                let left = remaining - dt;
                if left <= 0.0 {
                    self.remaining = None;
                    true
                } else {
                    self.remaining = Some(left);
                    false
                }
            }
            None => false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.remaining.is_some()
    }

    /// Seconds left, zero when the timer is not armed
    pub fn remaining(&self) -> f32 {
        self.remaining.unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionEvent {
    BeginFocus(u32),
    EndFocus(u32),
    BeginInteract(u32),
    EndInteract(u32),
    Interact(u32),
    /// Name or action text changed
    RefreshWidget,
}

/// A world object characters can focus and interact with
#[derive(Debug)]
pub struct Interactable {
    /// Seconds the interact input must be held. Zero means instant.
    pub interaction_time: f32,
    /// Furthest distance from which the object can be focused
    pub interaction_distance: f32,
    pub allow_multiple_interactors: bool,
    name_text: String,
    action_text: String,
    active: bool,
    interactors: Vec<u32>,
    focused_by: Vec<u32>,
    observers: Observers<InteractionEvent>,
}

impl Default for Interactable {
    fn default() -> Self {
        Self {
            interaction_time: 0.0,
            interaction_distance: 200.0,
            allow_multiple_interactors: true,
            name_text: "Interactable Object".to_string(),
            action_text: "Interact".to_string(),
            active: true,
            interactors: Vec::new(),
            focused_by: Vec::new(),
            observers: Observers::new(),
        }
    }
}

impl Interactable {
    pub fn new(interaction_time: f32, interaction_distance: f32) -> Self {
        Self {
            interaction_time,
            interaction_distance,
            ..Self::default()
        }
    }

    pub fn name_text(&self) -> &str {
        &self.name_text
    }

    pub fn action_text(&self) -> &str {
        &self.action_text
    }

    pub fn set_name_text(&mut self, text: impl Into<String>) {
        self.name_text = text.into();
        self.observers.notify(&InteractionEvent::RefreshWidget);
    }

    pub fn set_action_text(&mut self, text: impl Into<String>) {
        self.action_text = text.into();
        self.observers.notify(&InteractionEvent::RefreshWidget);
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Asks observers to redraw, e.g. after the held item changed
    pub fn refresh_widget(&mut self) {
        self.observers.notify(&InteractionEvent::RefreshWidget);
    }

    /// Characters currently interacting, oldest first
    pub fn interactors(&self) -> &[u32] {
        &self.interactors
    }

    /// The character whose progress is shown by the UI
    pub fn primary_interactor(&self) -> Option<u32> {
        self.interactors.first().copied()
    }

    pub fn is_focused(&self) -> bool {
        !self.focused_by.is_empty()
    }

    pub fn can_interact(&self, _character: u32) -> bool {
        let already_taken = !self.allow_multiple_interactors && !self.interactors.is_empty();
        self.active && !already_taken
    }

    pub fn begin_focus(&mut self, character: u32) {
        if !self.active {
            return;
        }
        if !self.focused_by.contains(&character) {
            self.focused_by.push(character);
        }
        self.observers.notify(&InteractionEvent::BeginFocus(character));
        self.observers.notify(&InteractionEvent::RefreshWidget);
    }

    pub fn end_focus(&mut self, character: u32) {
        self.focused_by.retain(|c| *c != character);
        self.observers.notify(&InteractionEvent::EndFocus(character));
    }

    pub fn begin_interact(&mut self, character: u32) {
        if self.can_interact(character) {
            if !self.interactors.contains(&character) {
                self.interactors.push(character);
            }
            self.observers.notify(&InteractionEvent::BeginInteract(character));
        }
    }

    /// Removes the character; the order of the remaining interactors is kept
    pub fn end_interact(&mut self, character: u32) {
        self.interactors.retain(|c| *c != character);
        self.observers.notify(&InteractionEvent::EndInteract(character));
    }

    /// Fires the interaction. Returns false if the character may not
    /// interact.
    pub fn interact(&mut self, character: u32) -> bool {
        if !self.can_interact_now(character) {
            return false;
        }
        self.observers.notify(&InteractionEvent::Interact(character));
        true
    }

    /// Ends focus and interaction for everyone and stops accepting new ones
    pub fn deactivate(&mut self) {
        for character in self.interactors.clone().into_iter().rev() {
            self.end_focus(character);
            self.end_interact(character);
        }
        for character in std::mem::take(&mut self.focused_by) {
            self.observers.notify(&InteractionEvent::EndFocus(character));
        }
        self.interactors.clear();
        self.active = false;
    }

    /// Progress in `0..=1` given the primary interactor's remaining time,
    /// or zero when nobody is interacting
    pub fn interact_percentage(&self, remaining: Option<f32>) -> f32 {
        match (self.primary_interactor(), remaining) {
            (Some(_), Some(remaining)) if self.interaction_time > TIME_EPSILON => {
                (1.0 - (remaining / self.interaction_time).abs()).clamp(0.0, 1.0)
            }
            _ => 0.0,
        }
    }

    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(&InteractionEvent) + Send + 'static,
    {
        self.observers.subscribe(callback)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.observers.unsubscribe(id)
    }

    // An interactor that already holds the object still counts when
    // multiple interactors are disallowed
    fn can_interact_now(&self, character: u32) -> bool {
        self.can_interact(character) || (self.active && self.interactors.contains(&character))
    }
}

/// Output of the proximity scan: the closest object in front of a character
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FocusCandidate {
    pub target: PickupId,
    pub distance: f32,
}

/// Lookup of interactables by target id, implemented by whatever owns the
/// world objects
pub trait InteractableSource {
    fn interactable_mut(&mut self, target: PickupId) -> Option<&mut Interactable>;
}

/// Per-character interaction bookkeeping
#[derive(Debug, Clone, Default)]
pub struct InteractionState {
    viewed: Option<PickupId>,
    interact_held: bool,
    timer: InteractTimer,
}

impl InteractionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn viewed(&self) -> Option<PickupId> {
        self.viewed
    }

    pub fn interact_held(&self) -> bool {
        self.interact_held
    }

    pub fn timer(&self) -> &InteractTimer {
        &self.timer
    }

    pub fn is_interacting(&self) -> bool {
        self.timer.is_active()
    }

    pub fn remaining_interact_time(&self) -> f32 {
        self.timer.remaining()
    }

    /// Applies the result of a proximity scan
    pub fn handle_focus(
        &mut self,
        character: u32,
        candidate: Option<FocusCandidate>,
        world: &mut dyn InteractableSource,
    ) {
        let Some(candidate) = candidate else {
            self.couldnt_find_interactable(character, world);
            return;
        };

        let Some(distance) = world
            .interactable_mut(candidate.target)
            .map(|interactable| interactable.interaction_distance)
        else {
            self.couldnt_find_interactable(character, world);
            return;
        };

        if candidate.distance > distance {
            if self.viewed.is_some() {
                self.couldnt_find_interactable(character, world);
            }
        } else if self.viewed != Some(candidate.target) {
            self.found_new_interactable(character, candidate.target, world);
        }
    }

    pub fn found_new_interactable(
        &mut self,
        character: u32,
        target: PickupId,
        world: &mut dyn InteractableSource,
    ) {
        self.end_interact(character, world);

        if let Some(old) = self.viewed.and_then(|old| world.interactable_mut(old)) {
            old.end_focus(character);
        }

        self.viewed = Some(target);
        if let Some(interactable) = world.interactable_mut(target) {
            interactable.begin_focus(character);
        }
        debug!("Character {} now focusing {:?}", character, target);
    }

    pub fn couldnt_find_interactable(&mut self, character: u32, world: &mut dyn InteractableSource) {
        self.timer.cancel();

        if let Some(viewed) = self.viewed.take() {
            if let Some(interactable) = world.interactable_mut(viewed) {
                interactable.end_focus(character);
                if self.interact_held {
                    interactable.end_interact(character);
                }
            }
        }
        self.interact_held = false;
    }

    /// Handles the interact input being pressed. Returns the target if the
    /// interaction fired immediately.
    pub fn begin_interact(
        &mut self,
        character: u32,
        world: &mut dyn InteractableSource,
    ) -> Option<PickupId> {
        self.interact_held = true;

        let target = self.viewed?;
        let interactable = world.interactable_mut(target)?;
        interactable.begin_interact(character);
        let interaction_time = interactable.interaction_time;

        if interaction_time.abs() < TIME_EPSILON {
            self.interact(character, world)
        } else {
            self.timer.arm(interaction_time);
            None
        }
    }

    /// Handles the interact input being released
    pub fn end_interact(&mut self, character: u32, world: &mut dyn InteractableSource) {
        self.interact_held = false;
        self.timer.cancel();

        if let Some(interactable) = self.viewed.and_then(|target| world.interactable_mut(target)) {
            interactable.end_interact(character);
        }
    }

    /// Fires the interaction with the viewed object
    pub fn interact(
        &mut self,
        character: u32,
        world: &mut dyn InteractableSource,
    ) -> Option<PickupId> {
        self.timer.cancel();

        let target = self.viewed?;
        let interactable = world.interactable_mut(target)?;
        interactable.interact(character).then_some(target)
    }

    /// Advances the countdown. Returns the target when it completes and the
    /// interaction fired.
    pub fn update(
        &mut self,
        character: u32,
        dt: f32,
        world: &mut dyn InteractableSource,
    ) -> Option<PickupId> {
        if self.timer.advance(dt) {
            self.interact(character, world)
        } else {
            None
        }
    }

    /// Progress of this character's own interaction in `0..=1`
    pub fn interact_percentage(&self, interaction_time: f32) -> f32 {
        if !self.timer.is_active() || interaction_time <= TIME_EPSILON {
            return 0.0;
        }
        (1.0 - self.timer.remaining() / interaction_time).clamp(0.0, 1.0)
    }
}
