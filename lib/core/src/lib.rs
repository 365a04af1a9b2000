pub mod config;
pub mod directory;
pub mod error;
pub mod module;
pub mod types;

pub use config::ServiceConfig;
pub use directory::{AllowAll, Directory, EmptyDirectory, Role, StaticDirectory};
pub use error::ServiceError;
pub use module::Module;
pub use types::{ListParams, ListResult, merge_patch, new_id, now_rfc3339, today_utc};
