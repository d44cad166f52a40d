// ==========================================
// 会员导入引擎 - 行映射器
// ==========================================
// 职责: 原始行（按列顺序的单元格） + 列映射 → 按实体拆分的 MappedRow
// 红线: 同一输入 + 同一映射 → 同一输出；缺失的尾部列按空值补齐
// ==========================================

use crate::domain::import::{ColumnMapping, FieldValue, MappedRow};
use crate::importer::error::{ImportError, ImportResult};
use std::collections::BTreeMap;
use std::path::Path;

pub struct RowMapper {
    mapping: ColumnMapping,
}

impl RowMapper {
    pub fn new(mapping: ColumnMapping) -> Self {
        Self { mapping }
    }

    /// 从 JSON 文件加载已保存的列映射
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> ImportResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ImportError::FileNotFound(path.display().to_string()));
        }
        let raw = std::fs::read_to_string(path)?;
        let mapping: ColumnMapping = serde_json::from_str(&raw)?;
        if mapping.is_empty() {
            return Err(ImportError::MappingConfigError(
                "mapping contains no columns".to_string(),
            ));
        }
        Ok(Self::new(mapping))
    }

    pub fn mapping(&self) -> &ColumnMapping {
        &self.mapping
    }

    /// 映射一行
    ///
    /// # 说明
    /// - 多出映射的列被忽略；不足映射的列视为空
    /// - 带 location_type_id 的联系人字段生成嵌套值
    /// - 同一字段映射多次时后出现的列覆盖先出现的列
    pub fn map(&self, raw_row: &[String], row_number: usize) -> MappedRow {
        let mut row = MappedRow::new(row_number);

        for (idx, column) in self.mapping.columns.iter().enumerate() {
            let Some(column) = column else {
                continue;
            };
            let cell = raw_row.get(idx).map(|v| v.trim()).unwrap_or("");

            let value = match column.location_type_id {
                Some(location_type_id) if !cell.is_empty() => {
                    let mut item = BTreeMap::new();
                    item.insert(column.field_name.clone(), cell.to_string());
                    item.insert("location_type_id".to_string(), location_type_id.to_string());
                    FieldValue::Nested(vec![item])
                }
                _ => FieldValue::Text(cell.to_string()),
            };

            row.entity_mut(column.entity)
                .insert(column.field_name.clone(), value);
        }

        row
    }
}

/// 去除空值（空值表示"未提供"，而非"清空"）
pub fn remove_empty_values(row: &mut MappedRow) {
    for fields in row.entities.values_mut() {
        fields.retain(|_, value| !value.is_empty());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::import::MappedColumn;
    use crate::domain::types::EntityLabel;

    fn column(entity: EntityLabel, field: &str) -> Option<MappedColumn> {
        Some(MappedColumn {
            entity,
            field_name: field.to_string(),
            location_type_id: None,
        })
    }

    fn mapper() -> RowMapper {
        RowMapper::new(ColumnMapping::new(vec![
            column(EntityLabel::Membership, "membership_type_id"),
            None,
            column(EntityLabel::Contact, "first_name"),
            Some(MappedColumn {
                entity: EntityLabel::Contact,
                field_name: "email".to_string(),
                location_type_id: Some(1),
            }),
            column(EntityLabel::Membership, "start_date"),
        ]))
    }

    fn cells(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_map_splits_by_entity_and_pads_short_rows() {
        let row = mapper().map(&cells(&["5", "ignored", " Jane "]), 1);

        assert_eq!(row.row_number, 1);
        assert_eq!(row.membership_text("membership_type_id"), Some("5"));
        assert_eq!(row.contact_text("first_name"), Some("Jane"));
        assert_eq!(row.membership_text("start_date"), None);
        // 补齐的列仍然存在（空值）
        assert!(row
            .entity(EntityLabel::Membership)
            .unwrap()
            .contains_key("start_date"));
    }

    #[test]
    fn test_map_is_deterministic() {
        let m = mapper();
        let input = cells(&["5", "x", "Jane", "jane@example.org", "2024-01-01"]);
        assert_eq!(m.map(&input, 2), m.map(&input, 2));
    }

    #[test]
    fn test_location_typed_field_is_nested() {
        let row = mapper().map(&cells(&["5", "", "", "jane@example.org"]), 1);
        match row.entity(EntityLabel::Contact).unwrap().get("email") {
            Some(FieldValue::Nested(items)) => {
                assert_eq!(items[0].get("email").map(String::as_str), Some("jane@example.org"));
                assert_eq!(items[0].get("location_type_id").map(String::as_str), Some("1"));
            }
            other => panic!("unexpected value: {:?}", other),
        }
    }

    #[test]
    fn test_remove_empty_values_keeps_entities() {
        let mut row = mapper().map(&cells(&["5", "", "  ", ""]), 1);
        remove_empty_values(&mut row);

        let membership = row.entity(EntityLabel::Membership).unwrap();
        assert_eq!(membership.len(), 1);
        assert!(row.entity(EntityLabel::Contact).unwrap().is_empty());
    }
}
