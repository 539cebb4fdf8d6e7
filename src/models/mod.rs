pub mod conversation;
pub mod deep_dive;
pub mod email;
pub mod follow_up;
pub mod llm_provider;
pub mod photo;
pub mod quick_scan;
pub mod report;
pub mod subscription;
pub mod tracking;

pub use conversation::*;
pub use deep_dive::*;
pub use email::*;
pub use follow_up::*;
pub use llm_provider::*;
pub use photo::*;
pub use quick_scan::*;
pub use report::*;
pub use subscription::*;
pub use tracking::*;
