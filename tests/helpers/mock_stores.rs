// ==========================================
// Mock 协作方实现 - 用于导入管道测试
// ==========================================
// 职责: 以内存状态实现全部存储/匹配/规则/行状态接口
// 说明: 日期与状态规则复用 engine 层算法，仅规则数据放在内存中
// ==========================================

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::NaiveDate;
use member_import::domain::import::{FieldValue, ImportField};
use member_import::domain::membership::{
    CalculatedDates, ContactRef, DurationUnit, EventAdjust, ExistingMembership,
    FormattedMembership, MembershipStatusRule, MembershipType, PeriodType, StatusEvent,
    StatusResult,
};
use member_import::domain::types::{
    ContactId, ContactType, DedupeRuleMode, ImportStatus, MembershipId, MembershipTypeId,
};
use member_import::engine::{MembershipDateEngine, MembershipStatusEngine, StatusDates};
use member_import::importer::{ContactResolutionLocks, FieldCache, ImportCollaborators};
use member_import::repository::{
    contact_matching_fields, membership_native_fields, ContactMatcher, ContactStore,
    FieldMetadataStore, ImportProgressSink, MembershipStatusRules, MembershipStore,
    MembershipTypeDateRules, RepositoryError, RepositoryResult,
};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// 日期规则中 "today" 的固定值
pub const MOCK_TODAY: (i32, u32, u32) = (2024, 6, 1);

#[derive(Debug, Clone, PartialEq)]
pub struct MockContact {
    pub id: ContactId,
    pub contact_type: ContactType,
    pub email: Option<String>,
    pub external_identifier: Option<String>,
}

/// set_row_status 的一次调用
#[derive(Debug, Clone, PartialEq)]
pub struct RowStatusCall {
    pub job_id: String,
    pub row_number: usize,
    pub status: ImportStatus,
    pub message: String,
    pub created_id: Option<i64>,
}

// ==========================================
// MockStores
// ==========================================
pub struct MockStores {
    pub rule_fields: Vec<String>,
    pub contacts: Mutex<Vec<MockContact>>,
    pub memberships: Mutex<BTreeMap<MembershipId, ExistingMembership>>,
    pub writes: Mutex<Vec<FormattedMembership>>,
    pub row_statuses: Mutex<Vec<RowStatusCall>>,
    pub field_loads: AtomicI64,
    /// 该行的 set_row_status 返回错误
    pub failing_status_row: Mutex<Option<usize>>,
    types: Vec<MembershipType>,
    status_rules: Vec<MembershipStatusRule>,
    next_id: AtomicI64,
}

impl MockStores {
    /// 默认数据:
    /// - 联系人 42（Individual, jane@example.org, EXT-42）与 43（Individual, EXT-43）
    /// - 会员类型 5（1 年滚动）
    /// - 状态 New / Current / Grace / Expired / Honorary(admin)
    pub fn new() -> Self {
        Self {
            rule_fields: vec!["email".to_string()],
            contacts: Mutex::new(vec![
                MockContact {
                    id: 42,
                    contact_type: ContactType::Individual,
                    email: Some("jane@example.org".to_string()),
                    external_identifier: Some("EXT-42".to_string()),
                },
                MockContact {
                    id: 43,
                    contact_type: ContactType::Individual,
                    email: None,
                    external_identifier: Some("EXT-43".to_string()),
                },
            ]),
            memberships: Mutex::new(BTreeMap::new()),
            writes: Mutex::new(Vec::new()),
            row_statuses: Mutex::new(Vec::new()),
            field_loads: AtomicI64::new(0),
            failing_status_row: Mutex::new(None),
            types: vec![MembershipType {
                id: 5,
                name: "General".to_string(),
                duration_unit: DurationUnit::Year,
                duration_interval: 1,
                period_type: PeriodType::Rolling,
                fixed_period_start_day: None,
            }],
            status_rules: standard_status_rules(),
            next_id: AtomicI64::new(1000),
        }
    }

    pub fn add_contact(&self, contact: MockContact) {
        self.contacts.lock().unwrap().push(contact);
    }

    pub fn add_membership(&self, membership: ExistingMembership) {
        self.memberships
            .lock()
            .unwrap()
            .insert(membership.id, membership);
    }

    pub fn membership(&self, id: MembershipId) -> Option<ExistingMembership> {
        self.memberships.lock().unwrap().get(&id).cloned()
    }

    pub fn writes(&self) -> Vec<FormattedMembership> {
        self.writes.lock().unwrap().clone()
    }

    pub fn row_statuses(&self) -> Vec<RowStatusCall> {
        self.row_statuses.lock().unwrap().clone()
    }

    pub fn contact_count(&self) -> usize {
        self.contacts.lock().unwrap().len()
    }

    pub fn mark_finished(&self, job_id: &str, row_number: usize) {
        self.row_statuses.lock().unwrap().push(RowStatusCall {
            job_id: job_id.to_string(),
            row_number,
            status: ImportStatus::Imported,
            message: String::new(),
            created_id: None,
        });
    }

    pub fn fail_row_status_at(&self, row_number: usize) {
        *self.failing_status_row.lock().unwrap() = Some(row_number);
    }

    fn allocate_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    fn resolve_contact(&self, contact: &ContactRef) -> ContactId {
        match contact {
            ContactRef::Existing(id) => *id,
            ContactRef::New(new_contact) => {
                let id = self.allocate_id();
                self.add_contact(MockContact {
                    id,
                    contact_type: new_contact.contact_type,
                    email: new_contact.fields.get("email").cloned(),
                    external_identifier: new_contact.fields.get("external_identifier").cloned(),
                });
                id
            }
        }
    }

    fn store(&self, id: MembershipId, record: &FormattedMembership) {
        let contact_id = self.resolve_contact(&record.contact);
        self.add_membership(ExistingMembership {
            id,
            contact_id,
            membership_type_id: record.membership_type_id,
            join_date: record.join_date,
            start_date: record.start_date,
            end_date: record.end_date,
            status_id: record.status_id,
            is_override: record.is_override,
        });
        self.writes.lock().unwrap().push(record.clone());
    }
}

/// 常用状态规则
pub fn standard_status_rules() -> Vec<MembershipStatusRule> {
    let rule = |id: i64,
                name: &str,
                start: Option<StatusEvent>,
                start_adjust: Option<EventAdjust>,
                end: Option<StatusEvent>,
                end_adjust: Option<EventAdjust>,
                is_admin: bool,
                weight: i32| MembershipStatusRule {
        id,
        name: name.to_string(),
        start_event: start,
        start_adjust,
        end_event: end,
        end_adjust,
        is_current_member: !is_admin,
        is_admin,
        is_active: true,
        weight,
    };
    let months = |interval: i32| {
        Some(EventAdjust {
            unit: DurationUnit::Month,
            interval,
        })
    };

    vec![
        rule(1, "New", Some(StatusEvent::JoinDate), None, Some(StatusEvent::JoinDate), months(3), false, 1),
        rule(2, "Current", Some(StatusEvent::StartDate), None, Some(StatusEvent::EndDate), None, false, 2),
        rule(3, "Grace", Some(StatusEvent::EndDate), None, Some(StatusEvent::EndDate), months(1), false, 3),
        rule(4, "Expired", Some(StatusEvent::EndDate), months(1), None, None, false, 4),
        rule(9, "Honorary", Some(StatusEvent::JoinDate), None, None, None, true, 0),
    ]
}

fn text<'a>(fields: &'a BTreeMap<String, FieldValue>, name: &str) -> Option<&'a str> {
    fields
        .get(name)
        .and_then(|v| v.first_text(name))
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

#[async_trait]
impl FieldMetadataStore for MockStores {
    async fn importable_fields(
        &self,
        contact_type: ContactType,
    ) -> RepositoryResult<Vec<ImportField>> {
        self.field_loads.fetch_add(1, Ordering::SeqCst);
        let mut fields = contact_matching_fields(contact_type);
        fields.extend(membership_native_fields());
        Ok(fields)
    }
}

#[async_trait]
impl MembershipStore for MockStores {
    async fn get(&self, id: MembershipId) -> RepositoryResult<Option<ExistingMembership>> {
        Ok(self.membership(id))
    }

    async fn create(&self, record: &FormattedMembership) -> RepositoryResult<MembershipId> {
        let id = self.allocate_id();
        self.store(id, record);
        Ok(id)
    }

    async fn update(&self, record: &FormattedMembership) -> RepositoryResult<MembershipId> {
        let id = record
            .id
            .ok_or_else(|| RepositoryError::InternalError("update without id".to_string()))?;
        if self.membership(id).is_none() {
            return Err(RepositoryError::NotFound {
                entity: "Membership".to_string(),
                id: id.to_string(),
            });
        }
        self.store(id, record);
        Ok(id)
    }
}

#[async_trait]
impl ContactMatcher for MockStores {
    async fn rule_fields(
        &self,
        _contact_type: ContactType,
        _mode: DedupeRuleMode,
    ) -> RepositoryResult<Vec<String>> {
        Ok(self.rule_fields.clone())
    }

    async fn find_duplicates(
        &self,
        contact_fields: &BTreeMap<String, FieldValue>,
        contact_type: ContactType,
        _mode: DedupeRuleMode,
    ) -> RepositoryResult<Vec<ContactId>> {
        let email = text(contact_fields, "email").map(str::to_lowercase);
        let external = text(contact_fields, "external_identifier");
        let contacts = self.contacts.lock().unwrap();

        let ids = contacts
            .iter()
            .filter(|c| c.contact_type == contact_type)
            .filter(|c| match (&email, external) {
                (Some(email), _) => c.email.as_deref().map(str::to_lowercase).as_ref() == Some(email),
                (None, Some(ext)) => c.external_identifier.as_deref() == Some(ext),
                (None, None) => false,
            })
            .map(|c| c.id)
            .collect();
        Ok(ids)
    }
}

#[async_trait]
impl ContactStore for MockStores {
    async fn find_by_external_identifier(
        &self,
        external_identifier: &str,
    ) -> RepositoryResult<Option<ContactId>> {
        Ok(self
            .contacts
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.external_identifier.as_deref() == Some(external_identifier))
            .map(|c| c.id))
    }

    async fn contact_type_of(
        &self,
        contact_id: ContactId,
    ) -> RepositoryResult<Option<ContactType>> {
        Ok(self
            .contacts
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == contact_id)
            .map(|c| c.contact_type))
    }
}

#[async_trait]
impl MembershipTypeDateRules for MockStores {
    async fn dates_for_type(
        &self,
        type_id: MembershipTypeId,
        join_date: Option<NaiveDate>,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> RepositoryResult<CalculatedDates> {
        let membership_type = self
            .types
            .iter()
            .find(|t| t.id == type_id)
            .ok_or_else(|| RepositoryError::NotFound {
                entity: "MembershipType".to_string(),
                id: type_id.to_string(),
            })?;
        let (y, m, d) = MOCK_TODAY;
        Ok(MembershipDateEngine::new().dates_for_type(
            membership_type,
            join_date,
            start_date,
            end_date,
            date(y, m, d),
        ))
    }
}

#[async_trait]
impl MembershipStatusRules for MockStores {
    async fn status_by_date(
        &self,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
        join_date: Option<NaiveDate>,
        as_of: NaiveDate,
        exclude_admin: bool,
        _type_id: MembershipTypeId,
        _context: Option<&FormattedMembership>,
    ) -> RepositoryResult<Option<StatusResult>> {
        let dates = StatusDates {
            join_date,
            start_date,
            end_date,
        };
        Ok(MembershipStatusEngine::new().status_by_date(
            &self.status_rules,
            dates,
            as_of,
            exclude_admin,
        ))
    }
}

#[async_trait]
impl ImportProgressSink for MockStores {
    async fn set_row_status(
        &self,
        job_id: &str,
        row_number: usize,
        status: ImportStatus,
        message: &str,
        created_id: Option<i64>,
    ) -> RepositoryResult<()> {
        if *self.failing_status_row.lock().unwrap() == Some(row_number) {
            return Err(RepositoryError::DatabaseQueryError(
                "disk I/O error".to_string(),
            ));
        }
        self.row_statuses.lock().unwrap().push(RowStatusCall {
            job_id: job_id.to_string(),
            row_number,
            status,
            message: message.to_string(),
            created_id,
        });
        Ok(())
    }

    async fn finished_rows(&self, job_id: &str) -> RepositoryResult<HashSet<usize>> {
        Ok(self
            .row_statuses
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.job_id == job_id && call.status.is_finished())
            .map(|call| call.row_number)
            .collect())
    }
}

/// 由同一个 MockStores 提供全部协作方
pub fn collaborators(stores: &Arc<MockStores>) -> ImportCollaborators {
    ImportCollaborators {
        field_store: stores.clone(),
        memberships: stores.clone(),
        contact_matcher: stores.clone(),
        contacts: stores.clone(),
        date_rules: stores.clone(),
        status_rules: stores.clone(),
        progress: stores.clone(),
    }
}

/// 新的共享缓存与锁表
pub fn shared_state() -> (Arc<FieldCache>, Arc<ContactResolutionLocks>) {
    (
        Arc::new(FieldCache::new()),
        Arc::new(ContactResolutionLocks::new()),
    )
}
