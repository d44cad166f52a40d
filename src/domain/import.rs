// ==========================================
// 会员导入引擎 - 导入领域模型
// ==========================================
// 职责: 字段目录条目、列映射、按实体拆分的行记录、行级结果与批次汇总
// ==========================================

use crate::domain::types::{
    ContactType, DateFormat, EntityLabel, FieldDataType, ImportStatus, OnDuplicate, RowState,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ==========================================
// ImportField - 字段目录条目
// ==========================================
// 生命周期: 加载后不可变，按联系人类型缓存
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportField {
    pub name: String,
    pub title: String,
    /// None = "do not import" 哨兵
    pub entity: Option<EntityLabel>,
    pub is_required: bool,
    /// 落库目标属性（custom_N / 表字段名）
    pub target_property: String,
    pub data_type: FieldDataType,
}

impl ImportField {
    pub fn new(
        entity: EntityLabel,
        name: &str,
        title: &str,
        data_type: FieldDataType,
    ) -> Self {
        Self {
            name: name.to_string(),
            title: title.to_string(),
            entity: Some(entity),
            is_required: false,
            target_property: name.to_string(),
            data_type,
        }
    }

    pub fn required(mut self) -> Self {
        self.is_required = true;
        self
    }

    /// "do not import" 哨兵条目
    pub fn do_not_import() -> Self {
        Self {
            name: String::new(),
            title: "- do not import -".to_string(),
            entity: None,
            is_required: false,
            target_property: String::new(),
            data_type: FieldDataType::String,
        }
    }
}

// ==========================================
// RequiredFields - 必填字段组合
// ==========================================
// 规则: 满足 create 全部字段，或满足任一 match_sets 全部字段
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequiredFields {
    pub match_sets: Vec<Vec<String>>,
    pub create: Vec<String>,
}

impl RequiredFields {
    /// 全部备选组合：先 match_sets，后 create
    pub fn alternatives(&self) -> impl Iterator<Item = &Vec<String>> {
        self.match_sets
            .iter()
            .chain(std::iter::once(&self.create))
            .filter(|set| !set.is_empty())
    }

    pub fn is_satisfied<F>(&self, present: F) -> bool
    where
        F: Fn(&str) -> bool,
    {
        self.alternatives()
            .any(|set| set.iter().all(|field| present(field)))
    }
}

// ==========================================
// 列映射配置
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappedColumn {
    pub entity: EntityLabel,
    pub field_name: String,
    /// 带地点类型的联系人字段（email/phone）会生成嵌套值
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_type_id: Option<i64>,
}

/// 列下标 → 目标字段；None 表示该列不导入
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub columns: Vec<Option<MappedColumn>>,
}

impl ColumnMapping {
    pub fn new(columns: Vec<Option<MappedColumn>>) -> Self {
        Self { columns }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

// ==========================================
// FieldValue / MappedRow
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    /// 如 email: [{email: "a@b.c", location_type_id: "1"}]
    Nested(Vec<BTreeMap<String, String>>),
}

impl FieldValue {
    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Text(v) => v.trim().is_empty(),
            FieldValue::Nested(items) => items
                .iter()
                .all(|item| item.values().all(|v| v.trim().is_empty())),
        }
    }

    /// 取标量值；嵌套值取首个元素中与字段同名的值
    pub fn first_text(&self, field_name: &str) -> Option<&str> {
        match self {
            FieldValue::Text(v) => Some(v.as_str()),
            FieldValue::Nested(items) => items
                .first()
                .and_then(|item| item.get(field_name))
                .map(|v| v.as_str()),
        }
    }
}

/// 按实体拆分的行记录：实体 → (字段名 → 值)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappedRow {
    pub row_number: usize,
    pub entities: BTreeMap<EntityLabel, BTreeMap<String, FieldValue>>,
}

impl MappedRow {
    pub fn new(row_number: usize) -> Self {
        let mut entities = BTreeMap::new();
        entities.insert(EntityLabel::Membership, BTreeMap::new());
        entities.insert(EntityLabel::Contact, BTreeMap::new());
        Self {
            row_number,
            entities,
        }
    }

    pub fn entity(&self, entity: EntityLabel) -> Option<&BTreeMap<String, FieldValue>> {
        self.entities.get(&entity)
    }

    pub fn entity_mut(&mut self, entity: EntityLabel) -> &mut BTreeMap<String, FieldValue> {
        self.entities.entry(entity).or_default()
    }

    pub fn text(&self, entity: EntityLabel, field_name: &str) -> Option<&str> {
        self.entity(entity)
            .and_then(|fields| fields.get(field_name))
            .and_then(|v| v.first_text(field_name))
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    pub fn membership_text(&self, field_name: &str) -> Option<&str> {
        self.text(EntityLabel::Membership, field_name)
    }

    pub fn contact_text(&self, field_name: &str) -> Option<&str> {
        self.text(EntityLabel::Contact, field_name)
    }

    pub fn contact_fields(&self) -> BTreeMap<String, FieldValue> {
        self.entity(EntityLabel::Contact).cloned().unwrap_or_default()
    }
}

// ==========================================
// ImportOutcome - 行级结果（每行恰好一条）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportOutcome {
    pub row_number: usize,
    pub status: ImportStatus,
    pub message: String,
    pub created_id: Option<i64>,
    pub final_state: RowState,
}

impl ImportOutcome {
    pub fn imported(row_number: usize, membership_id: i64) -> Self {
        Self {
            row_number,
            status: ImportStatus::Imported,
            message: String::new(),
            created_id: Some(membership_id),
            final_state: RowState::Committed,
        }
    }

    pub fn error(row_number: usize, message: String, final_state: RowState) -> Self {
        Self {
            row_number,
            status: ImportStatus::Error,
            message,
            created_id: None,
            final_state,
        }
    }

    pub fn duplicate(row_number: usize, message: String) -> Self {
        Self {
            row_number,
            status: ImportStatus::Duplicate,
            message,
            created_id: None,
            final_state: RowState::Rejected,
        }
    }
}

// ==========================================
// ImportSummary - 批次汇总
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub job_id: String,
    pub total_rows: usize,
    pub imported: usize,
    pub errors: usize,
    pub duplicates: usize,
    /// 断点续跑时跳过的已完成行
    pub already_finished: usize,
    pub cancelled: bool,
    pub elapsed_ms: u64,
}

impl ImportSummary {
    pub fn record(&mut self, outcome: &ImportOutcome) {
        match outcome.status {
            ImportStatus::Imported => self.imported += 1,
            ImportStatus::Error => self.errors += 1,
            ImportStatus::Duplicate => self.duplicates += 1,
        }
    }

    pub fn merge(&mut self, other: ImportSummary) {
        self.total_rows += other.total_rows;
        self.imported += other.imported;
        self.errors += other.errors;
        self.duplicates += other.duplicates;
        self.already_finished += other.already_finished;
        self.cancelled |= other.cancelled;
    }

    pub fn processed(&self) -> usize {
        self.imported + self.errors + self.duplicates
    }
}

// ==========================================
// ImportOptions - 单次导入运行参数
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportOptions {
    pub job_id: String,
    pub contact_type: ContactType,
    pub on_duplicate: OnDuplicate,
    pub date_format: DateFormat,
    pub create_missing_contacts: bool,
    pub worker_count: usize,
}

impl ImportOptions {
    pub fn new(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            contact_type: ContactType::default(),
            on_duplicate: OnDuplicate::default(),
            date_format: DateFormat::default(),
            create_missing_contacts: false,
            worker_count: 1,
        }
    }

    /// 是否按 id 更新已有记录
    pub fn is_update_existing(&self) -> bool {
        matches!(self.on_duplicate, OnDuplicate::Update)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapped_row_text_reads_nested_first_value() {
        let mut row = MappedRow::new(3);
        let mut email = BTreeMap::new();
        email.insert("email".to_string(), " jane@example.org ".to_string());
        email.insert("location_type_id".to_string(), "1".to_string());
        row.entity_mut(EntityLabel::Contact)
            .insert("email".to_string(), FieldValue::Nested(vec![email]));

        assert_eq!(row.contact_text("email"), Some("jane@example.org"));
        assert_eq!(row.contact_text("first_name"), None);
    }

    #[test]
    fn test_field_value_emptiness() {
        assert!(FieldValue::Text("   ".to_string()).is_empty());
        assert!(FieldValue::Nested(vec![]).is_empty());
        assert!(!FieldValue::Text("0".to_string()).is_empty());
    }

    #[test]
    fn test_summary_counts_each_status() {
        let mut summary = ImportSummary::default();
        summary.record(&ImportOutcome::imported(1, 10));
        summary.record(&ImportOutcome::error(2, "bad".to_string(), RowState::Rejected));
        summary.record(&ImportOutcome::duplicate(3, "dup".to_string()));
        assert_eq!((summary.imported, summary.errors, summary.duplicates), (1, 1, 1));
        assert_eq!(summary.processed(), 3);
    }

    #[test]
    fn test_required_fields_any_alternative() {
        let required = RequiredFields {
            match_sets: vec![vec!["id".to_string()]],
            create: vec!["membership_type_id".to_string()],
        };
        assert!(required.is_satisfied(|f| f == "id"));
        assert!(required.is_satisfied(|f| f == "membership_type_id"));
        assert!(!required.is_satisfied(|f| f == "start_date"));
        assert_eq!(required.alternatives().count(), 2);
    }

    #[test]
    fn test_column_mapping_from_json() {
        let json = r#"{"columns":[{"entity":"Membership","field_name":"membership_type_id"},null,
            {"entity":"Contact","field_name":"email","location_type_id":1}]}"#;
        let mapping: ColumnMapping = serde_json::from_str(json).unwrap();
        assert_eq!(mapping.len(), 3);
        assert!(mapping.columns[1].is_none());
        assert_eq!(mapping.columns[2].as_ref().unwrap().location_type_id, Some(1));
    }
}
