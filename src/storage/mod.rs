pub mod frame;
pub mod layered;

pub use frame::{Frame, StoredValue};
pub use layered::LayeredStorage;
