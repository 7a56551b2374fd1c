//! retail-adapter-memory - 内存存储适配器
//!
//! 实现与 PostgreSQL 适配器相同的存储语义（唯一约束、软删除过滤、事务隔离），
//! 用于本地开发和测试。

mod connector;
mod store;

pub use connector::*;
pub use store::*;
