pub mod acceleration;
pub mod catalog;
pub mod query;

pub use acceleration::*;
pub use catalog::*;
pub use query::*;
