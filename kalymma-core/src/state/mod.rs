//! Controller state definitions and the persisted snapshot codec

pub mod machine;
pub mod stored;

pub use machine::{Direction, ShutterState};
pub use stored::StoredState;
