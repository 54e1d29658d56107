pub mod clock;
pub mod errors;
