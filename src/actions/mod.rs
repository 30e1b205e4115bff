//! Translation of chat text into timed input actions.

mod actionset;
mod macros;
mod verb;

pub use actionset::{Actionset, ActionsetDef};
pub use macros::MacroFile;
pub use verb::{InputType, VerbParams, parse_action_text, ParsedVerb};
