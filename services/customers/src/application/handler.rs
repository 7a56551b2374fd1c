//! Business logic handler

use std::sync::Arc;

use retail_common::{PagedResult, Pagination, UserId};
use retail_errors::{AppError, AppResult};
use retail_ports::Filter;
use retail_tenancy::{FindOptions, Record, Repository, TenantRepositoryFactory};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use super::commands::*;
use crate::domain::{Customer, normalize_email};

pub struct CustomerService {
    factory: Arc<TenantRepositoryFactory>,
}

impl CustomerService {
    pub fn new(factory: Arc<TenantRepositoryFactory>) -> Self {
        Self { factory }
    }

    async fn repo(&self, tenant_id: &str) -> AppResult<Repository<Customer>> {
        self.factory.repository::<Customer>(tenant_id).await
    }

    /// 注册会员
    pub async fn register(&self, cmd: RegisterCustomerCommand) -> AppResult<Record<Customer>> {
        let repo = self.repo(&cmd.tenant_id).await?;

        let mut customer = Customer::new(&cmd.email, &cmd.name);
        if let Some(phone) = cmd.phone {
            customer = customer.with_phone(phone);
        }

        // 唯一约束仍会兜底，这里先给出更明确的提示
        if repo
            .exists(Filter::new().eq("email", customer.email.as_str()))
            .await?
        {
            return Err(AppError::conflict(format!(
                "customer {} is already registered",
                customer.email
            )));
        }

        let record = repo.create(customer, cmd.user_id).await?;
        info!(
            tenant_id = %cmd.tenant_id,
            customer_id = %record.id,
            "Customer registered"
        );
        Ok(record)
    }

    pub async fn get(&self, tenant_id: &str, id: Uuid) -> AppResult<Record<Customer>> {
        self.repo(tenant_id).await?.find_by_id_or_fail(id).await
    }

    /// 按邮箱查找未删除的会员
    pub async fn find_by_email(
        &self,
        tenant_id: &str,
        email: &str,
    ) -> AppResult<Option<Record<Customer>>> {
        let repo = self.repo(tenant_id).await?;
        let options = FindOptions::new().paginate(Pagination::new(1, 1));
        let mut found = repo
            .find_all(
                Filter::new().eq("email", normalize_email(email)),
                &options,
            )
            .await?;
        Ok(found.pop())
    }

    pub async fn list(
        &self,
        tenant_id: &str,
        pagination: &Pagination,
    ) -> AppResult<PagedResult<Record<Customer>>> {
        self.repo(tenant_id)
            .await?
            .find_page(Filter::new(), pagination)
            .await
    }

    pub async fn rename(&self, cmd: RenameCustomerCommand) -> AppResult<Record<Customer>> {
        self.repo(&cmd.tenant_id)
            .await?
            .update(cmd.customer_id, json!({ "name": cmd.name.trim() }), cmd.user_id)
            .await
    }

    /// 停用会员（软删除），邮箱可被重新注册
    pub async fn deactivate(
        &self,
        tenant_id: &str,
        id: Uuid,
        user_id: Option<UserId>,
    ) -> AppResult<()> {
        self.repo(tenant_id).await?.soft_delete(id, user_id).await?;
        info!(tenant_id = %tenant_id, customer_id = %id, "Customer deactivated");
        Ok(())
    }

    pub async fn reactivate(
        &self,
        tenant_id: &str,
        id: Uuid,
        user_id: Option<UserId>,
    ) -> AppResult<Record<Customer>> {
        self.repo(tenant_id).await?.restore(id, user_id).await
    }

    /// 调整积分余额，`delta` 可以为负
    pub async fn adjust_points(
        &self,
        tenant_id: &str,
        id: Uuid,
        delta: i64,
        user_id: Option<UserId>,
    ) -> AppResult<Record<Customer>> {
        let repo = self.repo(tenant_id).await?;
        repo.run_in_transaction(|tx| async move {
            let customer = tx.find_by_id_or_fail(id).await?;
            let balance = customer
                .data
                .points
                .checked_add(delta)
                .filter(|b| *b >= 0)
                .ok_or_else(|| AppError::conflict("insufficient points"))?;
            tx.update(id, json!({ "points": balance }), user_id).await
        })
        .await
    }

    /// 在两个会员之间转移积分，两次写入在同一事务中完成
    pub async fn transfer_points(&self, cmd: TransferPointsCommand) -> AppResult<()> {
        cmd.validate()?;
        let repo = self.repo(&cmd.tenant_id).await?;

        let TransferPointsCommand {
            from,
            to,
            points,
            user_id,
            ..
        } = cmd.clone();

        repo.run_in_transaction(|tx| async move {
            let source = tx.find_by_id_or_fail(from).await?;
            let target = tx.find_by_id_or_fail(to).await?;

            if source.data.points < points {
                return Err(AppError::conflict("insufficient points"));
            }
            let credited = target
                .data
                .points
                .checked_add(points)
                .ok_or_else(|| AppError::validation("points balance overflow"))?;

            tx.update(
                from,
                json!({ "points": source.data.points - points }),
                user_id.clone(),
            )
            .await?;
            tx.update(to, json!({ "points": credited }), user_id).await?;
            Ok(())
        })
        .await?;

        info!(
            tenant_id = %cmd.tenant_id,
            from = %cmd.from,
            to = %cmd.to,
            points = cmd.points,
            "Points transferred"
        );
        Ok(())
    }
}
