//! retail-adapter-postgres - PostgreSQL 适配器
//!
//! 每个租户一个连接池，`search_path` 指向租户 schema；
//! 实体以 jsonb 文档加固定审计列的形式保存。

mod config;
mod connection;
mod directory;
mod error;
mod store;
mod transaction;

pub use config::*;
pub use connection::*;
pub use directory::*;
pub use error::*;
pub use store::*;
pub use transaction::*;
