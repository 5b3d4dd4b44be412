//! Player input for one frame.
//!
//! Input tokens are the five-character strings replay files are made of:
//! one position per button, in the order up, down, left, right, fire, each
//! holding the button letter when pressed or `.` when released.
//!
//! ```
//! use rawvm::virtual_machine::input::PlayerInput;
//!
//! let input: PlayerInput = "U..RF".parse().unwrap();
//! assert!(input.up && input.right && input.fire);
//! assert!(!input.down && !input.left);
//! assert_eq!(input.to_string(), "U..RF");
//! ```

use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::vm::SpecialKeys;
use std::fmt;
use std::str::FromStr;

const BUTTONS: [char; 5] = ['U', 'D', 'L', 'R', 'F'];

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PlayerInput {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
    pub fire: bool,
    /// Last typed character, 0 when none.
    pub last_char: u8,
    pub keys: SpecialKeys,
}

impl PlayerInput {
    /// No buttons held.
    pub fn released() -> Self {
        Self::default()
    }

    fn buttons(&self) -> [bool; 5] {
        [self.up, self.down, self.left, self.right, self.fire]
    }
}

impl FromStr for PlayerInput {
    type Err = VMError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        let invalid = || VMError::InvalidInput {
            token: token.to_string(),
        };

        let chars: Vec<char> = token.chars().collect();
        if chars.len() != BUTTONS.len() {
            return Err(invalid());
        }

        let mut pressed = [false; 5];
        for (i, (c, button)) in chars.iter().zip(BUTTONS).enumerate() {
            pressed[i] = match *c {
                '.' => false,
                c if c == button => true,
                _ => return Err(invalid()),
            };
        }

        let [up, down, left, right, fire] = pressed;
        Ok(Self {
            up,
            down,
            left,
            right,
            fire,
            ..Self::default()
        })
    }
}

impl fmt::Display for PlayerInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (held, button) in self.buttons().into_iter().zip(BUTTONS) {
            write!(f, "{}", if held { button } else { '.' })?;
        }
        Ok(())
    }
}
