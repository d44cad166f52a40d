// ==========================================
// 会员导入引擎 - 联系人解析器
// ==========================================
// 职责: 按判重规则（Unsupervised）把行内联系人字段解析为 无匹配 / 唯一 / 多个
// 红线: 多个匹配必须拒绝，不猜测；描述文本只用于诊断消息，不参与匹配
// 并发: 相同匹配键的解析在键锁内串行，避免并行工作者重复建联系人
// ==========================================

use crate::domain::import::FieldValue;
use crate::domain::types::{ContactId, ContactType, DedupeRuleMode};
use crate::importer::error::ImportResult;
use crate::repository::import_repo::ContactMatcher;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

/// 联系人解析结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContactResolution {
    NotFound { description: String },
    Unique(ContactId),
    Ambiguous(Vec<ContactId>),
}

/// 持有匹配键锁的解析结果（落库完成前不要释放）
pub struct LockedResolution {
    pub resolution: ContactResolution,
    _guard: OwnedMutexGuard<()>,
}

// ==========================================
// ContactResolutionLocks - 按匹配键的异步锁表
// ==========================================
#[derive(Debug, Default)]
pub struct ContactResolutionLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl ContactResolutionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, key: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        // 清理无人持有的键
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        Arc::clone(
            locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
        )
    }

    /// 当前登记的键数量
    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ==========================================
// ContactResolver
// ==========================================
pub struct ContactResolver {
    matcher: Arc<dyn ContactMatcher>,
    locks: Arc<ContactResolutionLocks>,
}

impl ContactResolver {
    pub fn new(matcher: Arc<dyn ContactMatcher>, locks: Arc<ContactResolutionLocks>) -> Self {
        Self { matcher, locks }
    }

    /// 解析联系人（不加锁）
    pub async fn resolve(
        &self,
        contact_fields: &BTreeMap<String, FieldValue>,
        contact_type: ContactType,
    ) -> ImportResult<ContactResolution> {
        let rule_fields = self
            .matcher
            .rule_fields(contact_type, DedupeRuleMode::Unsupervised)
            .await?;
        self.resolve_with_rules(contact_fields, contact_type, &rule_fields)
            .await
    }

    /// 解析联系人并持有匹配键锁
    pub async fn resolve_locked(
        &self,
        contact_fields: &BTreeMap<String, FieldValue>,
        contact_type: ContactType,
    ) -> ImportResult<LockedResolution> {
        let rule_fields = self
            .matcher
            .rule_fields(contact_type, DedupeRuleMode::Unsupervised)
            .await?;

        let key = format!(
            "{}|{}",
            contact_type,
            describe_contact(contact_fields, &rule_fields).to_lowercase()
        );
        let guard = self.locks.lock_for(&key).lock_owned().await;

        let resolution = self
            .resolve_with_rules(contact_fields, contact_type, &rule_fields)
            .await?;
        Ok(LockedResolution {
            resolution,
            _guard: guard,
        })
    }

    async fn resolve_with_rules(
        &self,
        contact_fields: &BTreeMap<String, FieldValue>,
        contact_type: ContactType,
        rule_fields: &[String],
    ) -> ImportResult<ContactResolution> {
        let ids = self
            .matcher
            .find_duplicates(contact_fields, contact_type, DedupeRuleMode::Unsupervised)
            .await?;
        debug!(matches = ids.len(), "联系人匹配完成");

        Ok(match ids.as_slice() {
            [] => ContactResolution::NotFound {
                description: describe_contact(contact_fields, rule_fields),
            },
            [id] => ContactResolution::Unique(*id),
            _ => ContactResolution::Ambiguous(ids),
        })
    }
}

/// 诊断描述：按规则字段顺序拼接已提供的值（每个值后跟一个空格），
/// 外部标识存在时以 "AND <ext>" 追加，或单独使用
pub fn describe_contact(contact_fields: &BTreeMap<String, FieldValue>, rule_fields: &[String]) -> String {
    let mut description = String::new();
    for field in rule_fields.iter().map(|f| f.trim()) {
        if let Some(value) = contact_fields.get(field).and_then(|v| v.first_text(field)) {
            description.push_str(value.trim());
            description.push(' ');
        }
    }

    let external = contact_fields
        .get("external_identifier")
        .and_then(|v| v.first_text("external_identifier"))
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ext) = external {
        if description.is_empty() {
            description = ext.to_string();
        } else {
            description.push_str("AND ");
            description.push_str(ext);
        }
    }
    description
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::error::RepositoryResult;
    use async_trait::async_trait;

    struct FixedMatcher {
        ids: Vec<ContactId>,
    }

    #[async_trait]
    impl ContactMatcher for FixedMatcher {
        async fn rule_fields(
            &self,
            _contact_type: ContactType,
            _mode: DedupeRuleMode,
        ) -> RepositoryResult<Vec<String>> {
            Ok(vec!["first_name".to_string(), "email".to_string()])
        }

        async fn find_duplicates(
            &self,
            _contact_fields: &BTreeMap<String, FieldValue>,
            _contact_type: ContactType,
            _mode: DedupeRuleMode,
        ) -> RepositoryResult<Vec<ContactId>> {
            Ok(self.ids.clone())
        }
    }

    fn fields(pairs: &[(&str, &str)]) -> BTreeMap<String, FieldValue> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), FieldValue::Text(v.to_string())))
            .collect()
    }

    fn resolver(ids: Vec<ContactId>) -> ContactResolver {
        ContactResolver::new(
            Arc::new(FixedMatcher { ids }),
            Arc::new(ContactResolutionLocks::new()),
        )
    }

    #[test]
    fn test_description_in_rule_order_with_external_id() {
        let rules = vec!["first_name".to_string(), "email".to_string()];
        let mut contact = fields(&[("email", " jane@example.org "), ("first_name", "Jane")]);
        assert_eq!(describe_contact(&contact, &rules), "Jane jane@example.org ");

        contact.insert(
            "external_identifier".to_string(),
            FieldValue::Text("EXT-1".to_string()),
        );
        assert_eq!(describe_contact(&contact, &rules), "Jane jane@example.org AND EXT-1");

        let only_ext = fields(&[("external_identifier", "EXT-1")]);
        assert_eq!(describe_contact(&only_ext, &rules), "EXT-1");
    }

    #[test]
    fn test_description_uses_first_nested_value() {
        let rules = vec!["email".to_string()];
        let mut item = BTreeMap::new();
        item.insert("email".to_string(), "jane@example.org".to_string());
        item.insert("location_type_id".to_string(), "1".to_string());
        let mut contact = BTreeMap::new();
        contact.insert("email".to_string(), FieldValue::Nested(vec![item]));
        assert_eq!(describe_contact(&contact, &rules), "jane@example.org ");
    }

    #[tokio::test]
    async fn test_resolution_is_tagged() {
        let contact = fields(&[("first_name", "Jane")]);
        let ct = ContactType::Individual;

        assert_eq!(
            resolver(vec![]).resolve(&contact, ct).await.unwrap(),
            ContactResolution::NotFound {
                description: "Jane ".to_string()
            }
        );
        assert_eq!(
            resolver(vec![7]).resolve(&contact, ct).await.unwrap(),
            ContactResolution::Unique(7)
        );
        assert_eq!(
            resolver(vec![7, 8]).resolve(&contact, ct).await.unwrap(),
            ContactResolution::Ambiguous(vec![7, 8])
        );
    }

    #[tokio::test]
    async fn test_locks_released_after_resolution_dropped() {
        let locks = Arc::new(ContactResolutionLocks::new());
        let resolver = ContactResolver::new(Arc::new(FixedMatcher { ids: vec![1] }), Arc::clone(&locks));
        let contact = fields(&[("first_name", "Jane")]);

        let locked = resolver
            .resolve_locked(&contact, ContactType::Individual)
            .await
            .unwrap();
        assert_eq!(locked.resolution, ContactResolution::Unique(1));
        assert_eq!(locks.len(), 1);
        drop(locked);

        // 下一次取锁时清理已释放的键
        let again = resolver
            .resolve_locked(&fields(&[("first_name", "John")]), ContactType::Individual)
            .await
            .unwrap();
        assert_eq!(locks.len(), 1);
        drop(again);
    }
}
