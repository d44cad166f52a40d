// ==========================================
// 会员导入引擎 - 会员类型/状态规则 Repository
// ==========================================
// 职责: 定义日期规则与状态规则接口，并提供基于 SQLite 规则表的实现
// 红线: 规则算法在 engine 层，此处只负责加载规则数据并转交
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::membership::{
    CalculatedDates, DurationUnit, EventAdjust, FormattedMembership, MembershipStatusRule,
    MembershipType, PeriodType, StatusEvent, StatusResult,
};
use crate::domain::types::MembershipTypeId;
use crate::engine::{MembershipDateEngine, MembershipStatusEngine, StatusDates};
use crate::repository::error::{RepositoryError, RepositoryResult};
use async_trait::async_trait;
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

// ==========================================
// MembershipTypeDateRules Trait
// ==========================================
#[async_trait]
pub trait MembershipTypeDateRules: Send + Sync {
    /// 按会员类型补齐日期
    ///
    /// # 返回
    /// - Ok(CalculatedDates): 每项可能为 None（无法推导）
    /// - Err(NotFound): 会员类型不存在
    async fn dates_for_type(
        &self,
        type_id: MembershipTypeId,
        join_date: Option<NaiveDate>,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> RepositoryResult<CalculatedDates>;
}

// ==========================================
// MembershipStatusRules Trait
// ==========================================
#[async_trait]
pub trait MembershipStatusRules: Send + Sync {
    /// 按日期判定会员状态
    ///
    /// # 参数
    /// - as_of: 参考日期（"now" = 今天）
    /// - exclude_admin: 是否排除管理类状态
    /// - context: 当前已格式化的会员记录（可能为 None）
    ///
    /// # 返回
    /// - Ok(None): 没有适用的状态
    #[allow(clippy::too_many_arguments)]
    async fn status_by_date(
        &self,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
        join_date: Option<NaiveDate>,
        as_of: NaiveDate,
        exclude_admin: bool,
        type_id: MembershipTypeId,
        context: Option<&FormattedMembership>,
    ) -> RepositoryResult<Option<StatusResult>>;
}

// ==========================================
// SqliteMembershipRules
// ==========================================
pub struct SqliteMembershipRules {
    conn: Arc<Mutex<Connection>>,
    date_engine: MembershipDateEngine,
    status_engine: MembershipStatusEngine,
}

impl SqliteMembershipRules {
    /// 创建新的规则仓储
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        Ok(Self::from_connection(Arc::new(Mutex::new(conn))))
    }

    /// 从已有连接创建
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self {
            conn,
            date_engine: MembershipDateEngine::new(),
            status_engine: MembershipStatusEngine::new(),
        }
    }

    /// 读取会员类型
    pub fn load_membership_type(
        &self,
        type_id: MembershipTypeId,
    ) -> RepositoryResult<Option<MembershipType>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))?;

        let raw = conn
            .query_row(
                r#"
                SELECT id, name, duration_unit, duration_interval, period_type, fixed_period_start_day
                FROM membership_type
                WHERE id = ?1 AND is_active = 1
                "#,
                params![type_id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, Option<i64>>(5)?,
                    ))
                },
            )
            .optional()?;

        let (id, name, unit, interval, period, fixed_day) = match raw {
            Some(r) => r,
            None => return Ok(None),
        };

        Ok(Some(MembershipType {
            id,
            name,
            duration_unit: parse_field::<DurationUnit>("duration_unit", &unit)?,
            duration_interval: duration_interval(interval)?,
            period_type: parse_field::<PeriodType>("period_type", &period)?,
            fixed_period_start_day: fixed_day
                .map(|d| checked_int::<u32>("fixed_period_start_day", d))
                .transpose()?,
        }))
    }

    /// 读取全部状态规则
    pub fn load_status_rules(&self) -> RepositoryResult<Vec<MembershipStatusRule>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))?;

        let mut stmt = conn.prepare(
            r#"
            SELECT id, name, start_event, start_event_adjust_unit, start_event_adjust_interval,
                   end_event, end_event_adjust_unit, end_event_adjust_interval,
                   is_current_member, is_admin, is_active, weight
            FROM membership_status
            ORDER BY weight, id
            "#,
        )?;

        let raw_rows = stmt
            .query_map([], RawStatusRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        raw_rows.into_iter().map(RawStatusRow::into_rule).collect()
    }
}

#[async_trait]
impl MembershipTypeDateRules for SqliteMembershipRules {
    async fn dates_for_type(
        &self,
        type_id: MembershipTypeId,
        join_date: Option<NaiveDate>,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> RepositoryResult<CalculatedDates> {
        let membership_type =
            self.load_membership_type(type_id)?
                .ok_or_else(|| RepositoryError::NotFound {
                    entity: "MembershipType".to_string(),
                    id: type_id.to_string(),
                })?;

        let today = chrono::Local::now().date_naive();
        Ok(self
            .date_engine
            .dates_for_type(&membership_type, join_date, start_date, end_date, today))
    }
}

#[async_trait]
impl MembershipStatusRules for SqliteMembershipRules {
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
        let rules = self.load_status_rules()?;
        let dates = StatusDates {
            join_date,
            start_date,
            end_date,
        };
        Ok(self
            .status_engine
            .status_by_date(&rules, dates, as_of, exclude_admin))
    }
}

// ==========================================
// 行映射辅助
// ==========================================
struct RawStatusRow {
    id: i64,
    name: String,
    start_event: Option<String>,
    start_unit: Option<String>,
    start_interval: Option<i64>,
    end_event: Option<String>,
    end_unit: Option<String>,
    end_interval: Option<i64>,
    is_current_member: bool,
    is_admin: bool,
    is_active: bool,
    weight: i64,
}

impl RawStatusRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            start_event: row.get(2)?,
            start_unit: row.get(3)?,
            start_interval: row.get(4)?,
            end_event: row.get(5)?,
            end_unit: row.get(6)?,
            end_interval: row.get(7)?,
            is_current_member: row.get::<_, i64>(8)? != 0,
            is_admin: row.get::<_, i64>(9)? != 0,
            is_active: row.get::<_, i64>(10)? != 0,
            weight: row.get(11)?,
        })
    }

    fn into_rule(self) -> RepositoryResult<MembershipStatusRule> {
        Ok(MembershipStatusRule {
            id: self.id,
            name: self.name,
            start_event: parse_optional::<StatusEvent>("start_event", self.start_event)?,
            start_adjust: parse_adjust(self.start_unit, self.start_interval)?,
            end_event: parse_optional::<StatusEvent>("end_event", self.end_event)?,
            end_adjust: parse_adjust(self.end_unit, self.end_interval)?,
            is_current_member: self.is_current_member,
            is_admin: self.is_admin,
            is_active: self.is_active,
            weight: checked_int::<i32>("weight", self.weight)?,
        })
    }
}

fn parse_field<T>(field: &str, raw: &str) -> RepositoryResult<T>
where
    T: std::str::FromStr<Err = String>,
{
    raw.parse::<T>().map_err(|message| RepositoryError::FieldValueError {
        field: field.to_string(),
        message,
    })
}

/// 整数列转换；超出目标类型范围时报错，不截断
fn checked_int<T>(field: &str, raw: i64) -> RepositoryResult<T>
where
    T: TryFrom<i64>,
{
    T::try_from(raw).map_err(|_| RepositoryError::FieldValueError {
        field: field.to_string(),
        message: format!("value {} is out of range", raw),
    })
}

/// 周期长度：非负且不超过 i32 范围（日期偏移按 i32 计算）
fn duration_interval(raw: i64) -> RepositoryResult<u32> {
    let interval = checked_int::<i32>("duration_interval", raw)?;
    checked_int::<u32>("duration_interval", i64::from(interval))
}

fn parse_optional<T>(field: &str, raw: Option<String>) -> RepositoryResult<Option<T>>
where
    T: std::str::FromStr<Err = String>,
{
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) => parse_field(field, v).map(Some),
    }
}

fn parse_adjust(
    unit: Option<String>,
    interval: Option<i64>,
) -> RepositoryResult<Option<EventAdjust>> {
    let unit = parse_optional::<DurationUnit>("event_adjust_unit", unit)?;
    Ok(match (unit, interval) {
        (Some(unit), Some(interval)) => Some(EventAdjust {
            unit,
            interval: checked_int::<i32>("event_adjust_interval", interval)?,
        }),
        _ => None,
    })
}
