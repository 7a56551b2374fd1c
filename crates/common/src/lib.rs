//! common - 通用类型和工具库

pub mod entity_kind;
pub mod retry;
pub mod types;
pub mod utils;

pub use entity_kind::*;
pub use retry::*;
pub use types::*;
pub use utils::*;
