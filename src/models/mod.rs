pub mod context;
pub mod result;
pub mod revision;
pub mod rule;

pub use context::*;
pub use result::*;
pub use revision::*;
pub use rule::*;
