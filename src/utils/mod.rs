pub mod collection_ext;
pub mod error;
pub mod scheduled_executor;
pub mod similarity;
pub mod string_ext;
pub mod user_context;

pub use collection_ext::{diff_sets, group_by, unique_ordered, vec_to_map, vec_to_map_with};
pub use error::{AppError, AppResult};
pub use scheduled_executor::{ScheduledExecutor, ScheduledTask};
pub use string_ext::{clean_optional_string, trim_string, StringExt};
pub use user_context::UserContext;
