pub mod generate;
pub mod index;
pub mod list;
pub mod pull;
