#[allow(non_snake_case)]
pub mod errno;

#[macro_use]
pub mod strong_type;

pub mod ids;

// Re-export commonly used items at the crate root.
pub use errno::*;
pub use ids::*;
