mod client;
mod dead_letter_repository;
mod metadata_repository;
mod schema;

pub use client::*;
pub use dead_letter_repository::*;
pub use metadata_repository::*;
pub use schema::*;
