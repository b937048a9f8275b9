pub mod attendance;
pub mod core;
pub mod results;
pub mod sections;
pub mod students;
