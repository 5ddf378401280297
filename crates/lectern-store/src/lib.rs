pub mod courses;
pub mod database;
pub mod error;
pub mod feedback;
pub mod moments;
pub mod questions;
pub mod row_helpers;
pub mod schema;
pub mod sessions;

pub use database::Database;
pub use error::StoreError;
