//! Console commands and the sequenced input stream sent to the server

use shared::InputState;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Left,
    Right,
    Up,
    Down,
}

/// A line typed on the console
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Inventory { json: bool },
    Pickups,
    Status,
    /// Press and hold the interact button
    Take,
    /// Let go of the interact button
    Release,
    Move(Direction),
    Stop,
    Use { item: String },
    Drop { item: String, quantity: u32 },
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("empty command")]
    Empty,

    #[error("unknown command '{0}', try 'help'")]
    Unknown(String),

    #[error("'{command}' needs {argument}")]
    MissingArgument {
        command: &'static str,
        argument: &'static str,
    },

    #[error("'{0}' is not a direction (left, right, up, down)")]
    InvalidDirection(String),

    #[error("'{0}' is not a positive quantity")]
    InvalidQuantity(String),
}

pub const HELP: &str = "\
commands:
  inv [--json]        show your inventory
  pickups             list pickups, closest first
  status              show what you are looking at
  take                hold interact on the closest pickup
  release             let go of interact
  move <dir>          walk left/right/up/down until 'stop'
  stop                stop walking
  use <item>          use an item (slot number or class)
  drop <item> <qty>   drop items next to you
  quit";

impl Command {
    pub fn parse(line: &str) -> Result<Command, CommandError> {
        let mut words = line.split_whitespace();
        let name = words.next().ok_or(CommandError::Empty)?;

        let command = match name.to_ascii_lowercase().as_str() {
            "inv" | "inventory" | "i" => Command::Inventory {
                json: words.any(|word| word == "--json"),
            },
            "pickups" | "p" => Command::Pickups,
            "status" | "s" => Command::Status,
            "take" | "t" => Command::Take,
            "release" | "r" => Command::Release,
            "move" | "m" => {
                let dir = words.next().ok_or(CommandError::MissingArgument {
                    command: "move",
                    argument: "a direction",
                })?;
                Command::Move(parse_direction(dir)?)
            }
            "stop" => Command::Stop,
            "use" | "u" => Command::Use {
                item: words
                    .next()
                    .ok_or(CommandError::MissingArgument {
                        command: "use",
                        argument: "an item",
                    })?
                    .to_string(),
            },
            "drop" | "d" => {
                let item = words.next().ok_or(CommandError::MissingArgument {
                    command: "drop",
                    argument: "an item",
                })?;
                let quantity = match words.next() {
                    Some(word) => word
                        .parse::<u32>()
                        .ok()
                        .filter(|quantity| *quantity > 0)
                        .ok_or_else(|| CommandError::InvalidQuantity(word.to_string()))?,
                    None => 1,
                };
                Command::Drop {
                    item: item.to_string(),
                    quantity,
                }
            }
            "help" | "h" | "?" => Command::Help,
            "quit" | "exit" | "q" => Command::Quit,
            other => return Err(CommandError::Unknown(other.to_string())),
        };
        Ok(command)
    }
}

fn parse_direction(word: &str) -> Result<Direction, CommandError> {
    match word.to_ascii_lowercase().as_str() {
        "left" | "l" | "a" => Ok(Direction::Left),
        "right" | "r" | "d" => Ok(Direction::Right),
        "up" | "u" | "w" => Ok(Direction::Up),
        "down" | "s" => Ok(Direction::Down),
        _ => Err(CommandError::InvalidDirection(word.to_string())),
    }
}

/// Turns held console state into sequenced inputs
pub struct InputManager {
    next_sequence: u32,
    current_input: InputState,
    last_input_sent: Instant,
    keep_alive: Duration,

    movement: Option<Direction>,
    interact: bool,
}

impl InputManager {
    pub fn new() -> Self {
        Self {
            next_sequence: 1,
            current_input: InputState::default(),
            last_input_sent: Instant::now(),
            keep_alive: Duration::from_millis(100),
            movement: None,
            interact: false,
        }
    }

    pub fn set_movement(&mut self, movement: Option<Direction>) {
        self.movement = movement;
    }

    pub fn set_interact(&mut self, interact: bool) {
        self.interact = interact;
    }

    pub fn is_interacting(&self) -> bool {
        self.interact
    }

    /// Returns an input to send when the held state changed, while moving,
    /// or when the keep-alive period ran out
    pub fn update(&mut self) -> Option<InputState> {
        let left = self.movement == Some(Direction::Left);
        let right = self.movement == Some(Direction::Right);
        let up = self.movement == Some(Direction::Up);
        let down = self.movement == Some(Direction::Down);

        let changed = left != self.current_input.left
            || right != self.current_input.right
            || up != self.current_input.up
            || down != self.current_input.down
            || self.interact != self.current_input.interact;
        let moving = self.movement.is_some();
        let time_to_send = self.last_input_sent.elapsed() >= self.keep_alive;

        if !(changed || moving || time_to_send) {
            return None;
        }

        self.current_input = InputState {
            sequence: self.next_sequence,
            timestamp: Self::get_timestamp(),
            left,
            right,
            up,
            down,
            interact: self.interact,
        };
        self.next_sequence += 1;
        self.last_input_sent = Instant::now();
        Some(self.current_input.clone())
    }

    pub fn get_current_input(&self) -> &InputState {
        &self.current_input
    }

    fn get_timestamp() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::from_secs(0))
            .as_millis() as u64
    }
}

impl Default for InputManager {
    fn default() -> Self {
        Self::new()
    }
}
