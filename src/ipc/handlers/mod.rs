pub mod attendance;
pub mod classes;
pub mod core;
pub mod messaging;
pub mod promotion;
pub mod reports;
pub mod schools;
pub mod students;
