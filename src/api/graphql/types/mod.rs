mod session;
mod table;

pub use session::*;
pub use table::*;
