//! ports - 抽象 trait 层
//!
//! 定义租户目录、连接器和记录存储的抽象接口，具体实现位于 adapters

mod connector;
mod directory;
mod record;
mod store;

pub use connector::*;
pub use directory::*;
pub use record::*;
pub use store::*;
