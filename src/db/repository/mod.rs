mod conversation;
mod disease;
mod drug;
mod search_log;

pub use conversation::*;
pub use disease::*;
pub use drug::*;
pub use search_log::*;
