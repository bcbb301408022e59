pub mod enums;
pub mod reminder;
pub mod therapy;

pub use enums::*;
pub use reminder::*;
pub use therapy::*;
