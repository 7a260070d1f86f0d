//! SQLite connections for connwatch pools

mod connection;
mod factory;

#[cfg(test)]
mod tests;

pub use connection::{SqliteConnection, SqliteTransaction};
pub use factory::SqliteConnectionFactory;
