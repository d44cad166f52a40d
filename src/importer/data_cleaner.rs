// ==========================================
// 会员导入引擎 - 字段值清洗与解析
// ==========================================
// 职责: 按字段数据类型解析单元格文本（日期/整数/布尔/金额/邮箱）
// 红线: 只做解析与格式判定，不做业务规则判定
// ==========================================

use crate::domain::import::MappedRow;
use crate::domain::types::{
    ContactId, DateFormat, EntityLabel, FieldDataType, MembershipId, MembershipStatusId,
    MembershipTypeId,
};
use crate::importer::error::{ImportError, ImportResult};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)+$")
        .expect("Valid regex pattern")
});

#[derive(Debug, Clone, Copy, Default)]
pub struct DataCleaner {
    date_format: DateFormat,
}

impl DataCleaner {
    pub fn new(date_format: DateFormat) -> Self {
        Self { date_format }
    }

    /// 按配置的日期格式解析；ISO 格式（YYYY-MM-DD）始终可用
    pub fn parse_date(&self, value: &str) -> Option<NaiveDate> {
        let value = value.trim();
        // 带时间部分的取日期部分
        let date_part = value.split_whitespace().next().unwrap_or(value);
        self.date_format
            .patterns()
            .iter()
            .chain(std::iter::once(&"%Y-%m-%d"))
            .find_map(|pattern| NaiveDate::parse_from_str(date_part, pattern).ok())
    }

    pub fn parse_integer(&self, value: &str) -> Option<i64> {
        value.trim().parse::<i64>().ok()
    }

    pub fn parse_bool(&self, value: &str) -> Option<bool> {
        match value.trim().to_lowercase().as_str() {
            "1" | "y" | "yes" | "true" => Some(true),
            "0" | "n" | "no" | "false" => Some(false),
            _ => None,
        }
    }

    /// 金额：允许货币符号与千分位
    pub fn parse_money(&self, value: &str) -> Option<f64> {
        let cleaned: String = value
            .trim()
            .chars()
            .filter(|c| !matches!(c, '$' | '€' | '£' | '¥' | ',' | ' '))
            .collect();
        cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
    }

    pub fn is_valid_email(&self, value: &str) -> bool {
        EMAIL_REGEX.is_match(value.trim())
    }

    /// 判断值是否符合字段数据类型
    pub fn is_valid(&self, data_type: FieldDataType, value: &str) -> bool {
        match data_type {
            FieldDataType::String => true,
            FieldDataType::Integer => self.parse_integer(value).is_some(),
            FieldDataType::Date => self.parse_date(value).is_some(),
            FieldDataType::Boolean => self.parse_bool(value).is_some(),
            FieldDataType::Money => self.parse_money(value).is_some(),
            FieldDataType::Email => self.is_valid_email(value),
        }
    }
}

// ==========================================
// MembershipRowValues - 行内会员字段的类型化视图
// ==========================================
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MembershipRowValues {
    pub id: Option<MembershipId>,
    pub contact_id: Option<ContactId>,
    pub membership_type_id: Option<MembershipTypeId>,
    pub join_date: Option<NaiveDate>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub status_id: Option<MembershipStatusId>,
    pub is_override: Option<bool>,
    pub source: Option<String>,
    pub external_identifier: Option<String>,
    pub custom: BTreeMap<String, String>,
}

impl DataCleaner {
    /// 解析行内会员字段（调用前行已通过校验；仍失败时返回格式错误）
    pub fn membership_values(&self, row: &MappedRow) -> ImportResult<MembershipRowValues> {
        let mut invalid = Vec::new();

        let mut integer = |name: &str| -> Option<i64> {
            let raw = row.membership_text(name)?;
            let parsed = self.parse_integer(raw);
            if parsed.is_none() {
                invalid.push(name.to_string());
            }
            parsed
        };
        let id = integer("id");
        let contact_id = integer("contact_id");
        let membership_type_id = integer("membership_type_id");
        let status_id = integer("status_id");

        let mut date = |name: &str| -> Option<NaiveDate> {
            let raw = row.membership_text(name)?;
            let parsed = self.parse_date(raw);
            if parsed.is_none() {
                invalid.push(name.to_string());
            }
            parsed
        };
        let join_date = date("join_date");
        let start_date = date("start_date");
        let end_date = date("end_date");

        let is_override = match row.membership_text("is_override") {
            None => None,
            Some(raw) => {
                let parsed = self.parse_bool(raw);
                if parsed.is_none() {
                    invalid.push("is_override".to_string());
                }
                parsed
            }
        };

        if !invalid.is_empty() {
            return Err(ImportError::Validation(invalid));
        }

        let custom = row
            .entity(EntityLabel::Membership)
            .map(|fields| {
                fields
                    .iter()
                    .filter(|(name, _)| name.starts_with("custom_"))
                    .filter_map(|(name, value)| {
                        value
                            .first_text(name)
                            .map(|v| (name.clone(), v.trim().to_string()))
                    })
                    .filter(|(_, v)| !v.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(MembershipRowValues {
            id,
            contact_id,
            membership_type_id,
            join_date,
            start_date,
            end_date,
            status_id,
            is_override,
            source: row.membership_text("source").map(str::to_string),
            external_identifier: row
                .contact_text("external_identifier")
                .map(str::to_string),
            custom,
        })
    }
}
