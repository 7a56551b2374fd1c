//! retail-customers - 会员服务
//!
//! 在租户仓储之上实现会员注册、资料维护和积分转移

pub mod application;
pub mod domain;
