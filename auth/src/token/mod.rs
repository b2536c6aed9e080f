pub mod errors;
pub mod generator;

pub use errors::TokenGeneratorError;
pub use generator::TokenGenerator;
