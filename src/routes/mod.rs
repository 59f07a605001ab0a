// Route modules
pub mod briefing;
pub mod index;

pub use briefing::*;
pub use index::*;
