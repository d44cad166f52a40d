// ==========================================
// 会员导入引擎 - 字段目录
// ==========================================
// 职责: 按联系人类型提供可导入字段、必填字段组合
// 缓存: 注入式 FieldCache（首次填充、之后只读；未命中时单写者）
// 红线: 缓存失效由外部调用 FieldCache::invalidate，目录自身从不清理
// ==========================================

use crate::domain::import::{ImportField, RequiredFields};
use crate::domain::types::{ContactType, EntityLabel};
use crate::importer::error::ImportResult;
use crate::repository::import_repo::FieldMetadataStore;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

// ==========================================
// FieldCache - 字段元数据缓存
// ==========================================
#[derive(Debug, Default)]
pub struct FieldCache {
    entries: RwLock<HashMap<ContactType, Arc<Vec<ImportField>>>>,
}

impl FieldCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// 读取缓存；未命中时在写锁内填充（双重检查，只有一个填充者）
    pub async fn get_or_populate<F, Fut>(
        &self,
        contact_type: ContactType,
        populate: F,
    ) -> ImportResult<Arc<Vec<ImportField>>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = ImportResult<Vec<ImportField>>>,
    {
        if let Some(fields) = self.entries.read().await.get(&contact_type) {
            return Ok(Arc::clone(fields));
        }

        let mut entries = self.entries.write().await;
        if let Some(fields) = entries.get(&contact_type) {
            return Ok(Arc::clone(fields));
        }

        let fields = Arc::new(populate().await?);
        debug!(contact_type = %contact_type, count = fields.len(), "字段缓存填充");
        entries.insert(contact_type, Arc::clone(&fields));
        Ok(fields)
    }

    /// 失效缓存（None = 全部）
    pub async fn invalidate(&self, contact_type: Option<ContactType>) {
        let mut entries = self.entries.write().await;
        match contact_type {
            Some(ct) => {
                entries.remove(&ct);
            }
            None => entries.clear(),
        }
    }

    pub async fn is_populated(&self, contact_type: ContactType) -> bool {
        self.entries.read().await.contains_key(&contact_type)
    }
}

// ==========================================
// FieldCatalog
// ==========================================
pub struct FieldCatalog {
    store: Arc<dyn FieldMetadataStore>,
    cache: Arc<FieldCache>,
}

impl FieldCatalog {
    pub fn new(store: Arc<dyn FieldMetadataStore>, cache: Arc<FieldCache>) -> Self {
        Self { store, cache }
    }

    /// 可导入字段（首项为 "do not import" 哨兵）
    pub async fn fields(&self, contact_type: ContactType) -> ImportResult<Arc<Vec<ImportField>>> {
        let store = Arc::clone(&self.store);
        self.cache
            .get_or_populate(contact_type, || async move {
                let mut fields = vec![ImportField::do_not_import()];
                fields.extend(store.importable_fields(contact_type).await?);
                Ok(fields)
            })
            .await
    }

    /// 必填字段组合：有 id 即可匹配；新建至少需要会员类型
    pub fn required_fields(&self) -> RequiredFields {
        RequiredFields {
            match_sets: vec![vec!["id".to_string()]],
            create: vec!["membership_type_id".to_string()],
        }
    }
}

/// 字段标题（找不到时回退为字段名）
pub fn title_of<'a>(fields: &'a [ImportField], entity: EntityLabel, name: &'a str) -> &'a str {
    fields
        .iter()
        .find(|f| f.entity == Some(entity) && f.name == name)
        .map(|f| f.title.as_str())
        .unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::FieldDataType;
    use crate::repository::error::RepositoryResult;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingStore {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl FieldMetadataStore for CountingStore {
        async fn importable_fields(
            &self,
            _contact_type: ContactType,
        ) -> RepositoryResult<Vec<ImportField>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![ImportField::new(
                EntityLabel::Membership,
                "membership_type_id",
                "Membership Type",
                FieldDataType::Integer,
            )
            .required()])
        }
    }

    #[tokio::test]
    async fn test_fields_populate_once_until_invalidated() {
        let store = Arc::new(CountingStore {
            calls: AtomicUsize::new(0),
        });
        let cache = Arc::new(FieldCache::new());
        let catalog = FieldCatalog::new(store.clone(), Arc::clone(&cache));

        let first = catalog.fields(ContactType::Individual).await.unwrap();
        let second = catalog.fields(ContactType::Individual).await.unwrap();
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].title, "- do not import -");
        assert!(Arc::ptr_eq(&first, &second));

        cache.invalidate(Some(ContactType::Individual)).await;
        assert!(!cache.is_populated(ContactType::Individual).await);
        catalog.fields(ContactType::Individual).await.unwrap();
        assert_eq!(store.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_title_lookup_falls_back_to_name() {
        let store = Arc::new(CountingStore {
            calls: AtomicUsize::new(0),
        });
        let catalog = FieldCatalog::new(store, Arc::new(FieldCache::new()));
        let fields = catalog.fields(ContactType::Organization).await.unwrap();

        assert_eq!(
            title_of(&fields, EntityLabel::Membership, "membership_type_id"),
            "Membership Type"
        );
        assert_eq!(title_of(&fields, EntityLabel::Membership, "id"), "id");
    }
}
