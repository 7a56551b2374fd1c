//! 会员实体

use retail_common::EntityKind;
use retail_tenancy::{Entity, Payload};
use serde::{Deserialize, Serialize};

const MAX_NAME_LEN: usize = 100;

/// 会员
///
/// `email` 在同一租户的未删除会员中唯一，保存前统一转为小写。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub email: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default)]
    pub points: i64,
}

impl Customer {
    pub fn new(email: &str, name: &str) -> Self {
        Self {
            email: normalize_email(email),
            name: name.trim().to_string(),
            phone: None,
            points: 0,
        }
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }
}

impl Payload for Customer {
    fn validate(&self) -> Result<(), String> {
        if !is_valid_email(&self.email) {
            return Err(format!("invalid email: {}", self.email));
        }
        if self.name.trim().is_empty() {
            return Err("customer name must not be empty".to_string());
        }
        if self.name.chars().count() > MAX_NAME_LEN {
            return Err(format!("customer name exceeds {MAX_NAME_LEN} characters"));
        }
        if self.points < 0 {
            return Err("points balance must not be negative".to_string());
        }
        Ok(())
    }
}

impl Entity for Customer {
    const KIND: EntityKind = EntityKind::Customer;
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn is_valid_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.contains(char::is_whitespace)
        }
        None => false,
    }
}
