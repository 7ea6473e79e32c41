pub mod builder;
pub mod operation;

pub use builder::*;
pub use operation::*;
