//! Customer commands

use retail_common::UserId;
use retail_errors::{AppError, AppResult};
use uuid::Uuid;

/// 注册会员命令
#[derive(Debug, Clone)]
pub struct RegisterCustomerCommand {
    pub tenant_id: String,
    pub user_id: Option<UserId>,
    pub email: String,
    pub name: String,
    pub phone: Option<String>,
}

/// 修改会员名称命令
#[derive(Debug, Clone)]
pub struct RenameCustomerCommand {
    pub tenant_id: String,
    pub user_id: Option<UserId>,
    pub customer_id: Uuid,
    pub name: String,
}

/// 积分转移命令
#[derive(Debug, Clone)]
pub struct TransferPointsCommand {
    pub tenant_id: String,
    pub user_id: Option<UserId>,
    pub from: Uuid,
    pub to: Uuid,
    pub points: i64,
}

impl TransferPointsCommand {
    pub fn validate(&self) -> AppResult<()> {
        if self.points <= 0 {
            return Err(AppError::validation("points to transfer must be positive"));
        }
        if self.from == self.to {
            return Err(AppError::validation(
                "cannot transfer points to the same customer",
            ));
        }
        Ok(())
    }
}
