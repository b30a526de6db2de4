use diesel_migrations::{EmbeddedMigrations, embed_migrations};

pub mod config;
pub mod error;
pub mod events;
pub mod identity;
pub mod schema;
pub mod state;

#[cfg(test)]
mod test;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!();
