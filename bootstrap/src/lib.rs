//! retail-bootstrap - 统一服务启动骨架
//!
//! 所有服务复用的启动逻辑：遥测初始化、租户基础设施装配、优雅关闭

mod infrastructure;
mod runtime;
mod shutdown;

pub use infrastructure::*;
pub use runtime::*;
pub use shutdown::*;
