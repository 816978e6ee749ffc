//! `SQLite` database for the portal server.

pub use vigimeteo_core::db::DatabaseError;

vigimeteo_core::define_database!(PortalDatabase, "Portal database migrations complete");
