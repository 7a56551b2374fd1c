//! retail-errors - 统一错误处理
//!
//! 租户数据访问层的错误分类，基于 RFC 7807 Problem Details 规范对外呈现。
//! 校验、未找到、冲突类错误原样返回给调用方；基础设施类错误只携带租户 ID，
//! 驱动层细节在日志中记录，不会出现在错误信息里。

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 应用错误类型
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AppError {
    /// 租户 ID 或请求数据格式错误，在任何 I/O 之前失败
    #[error("Validation error: {0}")]
    Validation(String),

    /// 租户目录中没有该租户
    #[error("Tenant not found: {0}")]
    TenantNotFound(String),

    /// 租户目录本身不可用（区别于租户不存在）
    #[error("Tenant directory unavailable: {0}")]
    DirectoryUnavailable(String),

    /// 建立租户连接池失败
    #[error("Tenant database unavailable: {0}")]
    ConnectionInit(String),

    /// 租户内实体不存在
    #[error("Not found: {0}")]
    NotFound(String),

    /// 实体层唯一性冲突或状态冲突
    #[error("Conflict: {0}")]
    Conflict(String),

    /// 已建立的租户连接在执行时出现基础设施故障
    #[error("Tenant database unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn tenant_not_found(tenant: impl Into<String>) -> Self {
        Self::TenantNotFound(tenant.into())
    }

    pub fn directory_unavailable(msg: impl Into<String>) -> Self {
        Self::DirectoryUnavailable(msg.into())
    }

    pub fn connection_init(tenant: impl Into<String>) -> Self {
        Self::ConnectionInit(tenant.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn unavailable(tenant: impl Into<String>) -> Self {
        Self::Unavailable(tenant.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// 是否为基础设施故障（目录、连接、执行期）
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            Self::DirectoryUnavailable(_) | Self::ConnectionInit(_) | Self::Unavailable(_)
        )
    }

    /// 转换为 HTTP 状态码
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::TenantNotFound(_) => 404,
            Self::DirectoryUnavailable(_) => 503,
            Self::ConnectionInit(_) => 503,
            Self::NotFound(_) => 404,
            Self::Conflict(_) => 409,
            Self::Unavailable(_) => 503,
            Self::Internal(_) => 500,
        }
    }

    /// 转换为 Problem Details
    pub fn to_problem_details(&self) -> ProblemDetails {
        ProblemDetails {
            r#type: format!("{}/{}", PROBLEM_BASE_URI, self.problem_slug()),
            title: self.problem_title().to_string(),
            status: self.status_code(),
            detail: self.to_string(),
            instance: None,
        }
    }

    fn problem_slug(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::TenantNotFound(_) => "tenant-not-found",
            Self::DirectoryUnavailable(_) => "directory-unavailable",
            Self::ConnectionInit(_) => "tenant-database-unavailable",
            Self::NotFound(_) => "not-found",
            Self::Conflict(_) => "conflict",
            Self::Unavailable(_) => "tenant-database-unavailable",
            Self::Internal(_) => "internal",
        }
    }

    fn problem_title(&self) -> &'static str {
        match self {
            Self::Validation(_) => "Validation Error",
            Self::TenantNotFound(_) => "Tenant Not Found",
            Self::DirectoryUnavailable(_) => "Tenant Directory Unavailable",
            Self::ConnectionInit(_) => "Tenant Database Unavailable",
            Self::NotFound(_) => "Resource Not Found",
            Self::Conflict(_) => "Conflict",
            Self::Unavailable(_) => "Tenant Database Unavailable",
            Self::Internal(_) => "Internal Server Error",
        }
    }
}

const PROBLEM_BASE_URI: &str = "https://api.retail-backend.dev/problems";

/// RFC 7807 Problem Details
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProblemDetails {
    pub r#type: String,
    pub title: String,
    pub status: u16,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
}

/// Result 类型别名
pub type AppResult<T> = Result<T, AppError>;
