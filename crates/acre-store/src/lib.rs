pub mod areas;
pub mod database;
pub mod error;
pub mod schema;
pub mod users;

pub use areas::{AreaRepo, AreaRow, AreaVersionRow};
pub use database::Database;
pub use error::StoreError;
pub use users::{UserRepo, UserRow};
