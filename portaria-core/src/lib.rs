pub mod error;
pub mod feed;
pub mod repository;
pub mod settings;

// Note: entity types live in portaria-types and are imported from there directly
