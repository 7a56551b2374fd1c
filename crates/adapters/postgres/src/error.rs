//! sqlx 错误归类

use retail_ports::StoreError;

/// 把 sqlx 错误归类为存储层错误
///
/// 唯一约束冲突保留约束名，其余错误只保留文本，由租户层记录日志后统一对外。
pub fn classify(error: sqlx::Error) -> StoreError {
    match &error {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            StoreError::unique(db_err.constraint().unwrap_or("unknown"))
        }
        sqlx::Error::PoolClosed => StoreError::Closed,
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::WorkerCrashed => StoreError::Connect(error.to_string()),
        sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::Decode(_) => StoreError::Decode(error.to_string()),
        _ => StoreError::Query(error.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_pool_errors() {
        assert_eq!(classify(sqlx::Error::PoolClosed), StoreError::Closed);
        assert!(matches!(
            classify(sqlx::Error::PoolTimedOut),
            StoreError::Connect(_)
        ));
        assert!(matches!(
            classify(sqlx::Error::WorkerCrashed),
            StoreError::Connect(_)
        ));
    }

    #[test]
    fn test_classify_decode_and_query_errors() {
        assert!(matches!(
            classify(sqlx::Error::ColumnNotFound("data".to_string())),
            StoreError::Decode(_)
        ));
        assert!(matches!(
            classify(sqlx::Error::RowNotFound),
            StoreError::Query(_)
        ));
    }
}
