// ==========================================
// 会员导入引擎 - 行校验器
// ==========================================
// 职责: 字段格式校验 + 必填组合 + 会员业务校验（起始/入会日期、覆盖状态）
// 红线: 收集全部违规后一次性拒绝整行，不逐条抛出
// ==========================================

use crate::domain::import::{ImportField, MappedRow, RequiredFields};
use crate::domain::membership::ExistingMembership;
use crate::domain::types::{DateFormat, EntityLabel};
use crate::importer::data_cleaner::DataCleaner;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::field_catalog::title_of;
use tracing::debug;

pub const START_DATE_REQUIRED: &str = "Membership Start Date is required to create a memberships.";
pub const STATUS_REQUIRED_ON_OVERRIDE: &str = "Required parameter missing: Status";

pub struct Validator {
    cleaner: DataCleaner,
    required: RequiredFields,
    update_existing: bool,
}

impl Validator {
    /// # 参数
    /// - update_existing: 是否为"按 id 更新已有记录"模式
    pub fn new(date_format: DateFormat, required: RequiredFields, update_existing: bool) -> Self {
        Self {
            cleaner: DataCleaner::new(date_format),
            required,
            update_existing,
        }
    }

    /// 校验一行
    ///
    /// # 参数
    /// - fields: 字段目录（用于格式规则与标题）
    /// - existing: 行内 id 对应的已有会员（其日期可满足起始/入会日期要求）
    ///
    /// # 返回
    /// - Err(MissingRequiredFields): 仅缺必填组合
    /// - Err(Validation): 其余所有违规（含必填）合并为一条
    pub fn validate(
        &self,
        row: &MappedRow,
        fields: &[ImportField],
        existing: Option<&ExistingMembership>,
    ) -> ImportResult<()> {
        let mut errors = self.invalid_values(row, fields);

        let missing_required = self.missing_required(row, fields);
        if let Some(message) = &missing_required {
            errors.push(format!("Missing required fields: {}", message));
        }

        let existing_has_dates = existing
            .map(|e| e.start_date.is_some() || e.join_date.is_some())
            .unwrap_or(false);
        if row.membership_text("start_date").is_none()
            && row.membership_text("join_date").is_none()
            && !existing_has_dates
        {
            errors.push(START_DATE_REQUIRED.to_string());
        }

        let is_override = row
            .membership_text("is_override")
            .and_then(|v| self.cleaner.parse_bool(v))
            .unwrap_or(false);
        if self.update_existing && is_override && row.membership_text("status_id").is_none() {
            errors.push(STATUS_REQUIRED_ON_OVERRIDE.to_string());
        }

        match (errors.len(), missing_required) {
            (0, _) => Ok(()),
            (1, Some(message)) => Err(ImportError::MissingRequiredFields(message)),
            _ => {
                debug!(row_number = row.row_number, count = errors.len(), "行校验失败");
                Err(ImportError::Validation(errors))
            }
        }
    }

    /// 格式不合法的字段标题
    fn invalid_values(&self, row: &MappedRow, fields: &[ImportField]) -> Vec<String> {
        let mut invalid = Vec::new();
        for (entity, values) in &row.entities {
            for (name, value) in values {
                let text = match value.first_text(name).map(str::trim) {
                    Some(t) if !t.is_empty() => t,
                    _ => continue,
                };
                let field = fields
                    .iter()
                    .find(|f| f.entity == Some(*entity) && &f.name == name);
                if let Some(field) = field {
                    if !self.cleaner.is_valid(field.data_type, text) {
                        invalid.push(field.title.clone());
                    }
                }
            }
        }
        invalid
    }

    /// 未满足任何必填组合时返回 "A OR B" 形式的描述
    fn missing_required(&self, row: &MappedRow, fields: &[ImportField]) -> Option<String> {
        if self
            .required
            .is_satisfied(|f| row.membership_text(f).is_some())
        {
            return None;
        }
        let alternatives: Vec<String> = self
            .required
            .alternatives()
            .map(|set| {
                set.iter()
                    .map(|name| title_of(fields, EntityLabel::Membership, name))
                    .collect::<Vec<_>>()
                    .join(" and ")
            })
            .collect();
        Some(alternatives.join(" OR "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::import::FieldValue;
    use crate::domain::types::FieldDataType;

    fn catalog() -> Vec<ImportField> {
        use EntityLabel::{Contact as C, Membership as M};
        vec![
            ImportField::new(M, "id", "Membership ID", FieldDataType::Integer),
            ImportField::new(M, "membership_type_id", "Membership Type", FieldDataType::Integer)
                .required(),
            ImportField::new(M, "start_date", "Membership Start Date", FieldDataType::Date),
            ImportField::new(M, "join_date", "Member Since", FieldDataType::Date),
            ImportField::new(M, "status_id", "Membership Status", FieldDataType::Integer),
            ImportField::new(M, "is_override", "Status Override", FieldDataType::Boolean),
            ImportField::new(C, "email", "Email", FieldDataType::Email),
        ]
    }

    fn required() -> RequiredFields {
        RequiredFields {
            match_sets: vec![vec!["id".to_string()]],
            create: vec!["membership_type_id".to_string()],
        }
    }

    fn row(membership: &[(&str, &str)], contact: &[(&str, &str)]) -> MappedRow {
        let mut row = MappedRow::new(1);
        for (k, v) in membership {
            row.entity_mut(EntityLabel::Membership)
                .insert(k.to_string(), FieldValue::Text(v.to_string()));
        }
        for (k, v) in contact {
            row.entity_mut(EntityLabel::Contact)
                .insert(k.to_string(), FieldValue::Text(v.to_string()));
        }
        row
    }

    #[test]
    fn test_valid_create_row() {
        let validator = Validator::new(DateFormat::default(), required(), true);
        let r = row(&[("membership_type_id", "5"), ("start_date", "2024-01-01")], &[]);
        assert!(validator.validate(&r, &catalog(), None).is_ok());
    }

    #[test]
    fn test_missing_start_and_join_mentions_start_date() {
        let validator = Validator::new(DateFormat::default(), required(), true);
        let r = row(&[("membership_type_id", "5")], &[]);
        let err = validator.validate(&r, &catalog(), None).unwrap_err();
        assert!(err.to_string().contains("Start Date"));
    }

    #[test]
    fn test_existing_dates_satisfy_start_date_rule() {
        let validator = Validator::new(DateFormat::default(), required(), true);
        let existing = ExistingMembership {
            id: 77,
            contact_id: 1,
            membership_type_id: 5,
            join_date: chrono::NaiveDate::from_ymd_opt(2020, 1, 1),
            start_date: chrono::NaiveDate::from_ymd_opt(2020, 1, 1),
            end_date: None,
            status_id: Some(2),
            is_override: false,
        };
        let r = row(&[("id", "77"), ("status_id", "9"), ("is_override", "1")], &[]);
        assert!(validator.validate(&r, &catalog(), Some(&existing)).is_ok());
    }

    #[test]
    fn test_override_without_status_on_update_mentions_status() {
        let validator = Validator::new(DateFormat::default(), required(), true);
        let r = row(&[("id", "77"), ("start_date", "2024-01-01"), ("is_override", "yes")], &[]);
        let err = validator.validate(&r, &catalog(), None).unwrap_err();
        assert!(err.to_string().contains("Status"));

        // 非更新模式不要求
        let validator = Validator::new(DateFormat::default(), required(), false);
        assert!(validator.validate(&r, &catalog(), None).is_ok());
    }

    #[test]
    fn test_only_missing_required_fields() {
        let validator = Validator::new(DateFormat::default(), required(), true);
        let r = row(&[("start_date", "2024-01-01")], &[]);
        match validator.validate(&r, &catalog(), None) {
            Err(ImportError::MissingRequiredFields(message)) => {
                assert_eq!(message, "Membership ID OR Membership Type");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_all_violations_collected() {
        let validator = Validator::new(DateFormat::default(), required(), true);
        let r = row(
            &[("membership_type_id", "five"), ("start_date", "2024-13-01")],
            &[("email", "nope")],
        );
        let err = validator.validate(&r, &catalog(), None).unwrap_err();
        match &err {
            ImportError::Validation(messages) => {
                assert!(messages.contains(&"Membership Type".to_string()));
                assert!(messages.contains(&"Membership Start Date".to_string()));
                assert!(messages.contains(&"Email".to_string()));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(err.to_string().starts_with("Invalid value for field(s) : "));
    }
}
