pub mod acceleration;
pub mod catalog;
pub mod session;

pub use catalog::AppState;
