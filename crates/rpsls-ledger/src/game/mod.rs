//! Move definitions and outcome resolution.

mod moves;
mod resolver;

pub use moves::{Move, MoveError, WinRelation, WIN_RELATION};
pub use resolver::{resolve, Outcome};
