pub mod canonical;
pub mod mapping;
