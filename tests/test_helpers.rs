// ==========================================
// 测试辅助函数
// ==========================================
// 职责: 提供测试所需的数据库初始化、测试数据生成等功能
// ==========================================

#![allow(dead_code)]

use member_import::db::{init_schema, open_sqlite_connection};
use rusqlite::{params, Connection};
use std::error::Error;
use std::io::Write;
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;

/// 创建临时测试数据库并初始化 schema
///
/// # 返回
/// - NamedTempFile: 临时数据库文件（需要保持存活）
/// - String: 数据库文件路径
pub fn create_test_db() -> Result<(NamedTempFile, String), Box<dyn Error>> {
    let temp_file = NamedTempFile::new()?;
    let db_path = temp_file.path().to_str().unwrap().to_string();

    let conn = open_sqlite_connection(&db_path)?;
    init_schema(&conn)?;

    Ok((temp_file, db_path))
}

/// 打开共享连接（ConfigManager / 仓储共用）
pub fn shared_connection(db_path: &str) -> Arc<Mutex<Connection>> {
    Arc::new(Mutex::new(open_sqlite_connection(db_path).unwrap()))
}

/// 写入会员类型与状态规则
///
/// - 类型 5: 1 年滚动
/// - 类型 6: 1 年固定周期（1 月 1 日起）
/// - 状态: New(1) / Current(2) / Grace(3) / Expired(4) / Deceased(6, admin) / Honorary(9, admin)
pub fn seed_membership_rules(conn: &Connection) -> Result<(), Box<dyn Error>> {
    conn.execute_batch(
        r#"
        INSERT INTO membership_type (id, name, duration_unit, duration_interval, period_type, fixed_period_start_day)
        VALUES (5, 'General', 'year', 1, 'rolling', NULL),
               (6, 'Student', 'year', 1, 'fixed', 101);

        INSERT INTO membership_status
            (id, name, start_event, start_event_adjust_unit, start_event_adjust_interval,
             end_event, end_event_adjust_unit, end_event_adjust_interval,
             is_current_member, is_admin, is_active, weight)
        VALUES
            (1, 'New', 'join_date', NULL, NULL, 'join_date', 'month', 3, 1, 0, 1, 1),
            (2, 'Current', 'start_date', NULL, NULL, 'end_date', NULL, NULL, 1, 0, 1, 2),
            (3, 'Grace', 'end_date', NULL, NULL, 'end_date', 'month', 1, 1, 0, 1, 3),
            (4, 'Expired', 'end_date', 'month', 1, NULL, NULL, NULL, 0, 0, 1, 4),
            (6, 'Deceased', NULL, NULL, NULL, NULL, NULL, NULL, 0, 1, 1, 6),
            (9, 'Honorary', NULL, NULL, NULL, NULL, NULL, NULL, 1, 1, 1, 9);
        "#,
    )?;
    Ok(())
}

/// 写入联系人，返回 id
pub fn insert_contact(
    conn: &Connection,
    contact_type: &str,
    email: Option<&str>,
    external_identifier: Option<&str>,
) -> Result<i64, Box<dyn Error>> {
    conn.execute(
        "INSERT INTO contact (contact_type, email, external_identifier) VALUES (?1, ?2, ?3)",
        params![contact_type, email, external_identifier],
    )?;
    Ok(conn.last_insert_rowid())
}

/// 写入已有会员，返回 id
#[allow(clippy::too_many_arguments)]
pub fn insert_membership(
    conn: &Connection,
    contact_id: i64,
    membership_type_id: i64,
    join_date: &str,
    start_date: &str,
    end_date: &str,
    status_id: i64,
) -> Result<i64, Box<dyn Error>> {
    conn.execute(
        r#"
        INSERT INTO membership (contact_id, membership_type_id, join_date, start_date, end_date, status_id)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
        params![contact_id, membership_type_id, join_date, start_date, end_date, status_id],
    )?;
    Ok(conn.last_insert_rowid())
}

/// 写入临时 CSV 文件（首行为表头）
pub fn write_csv(lines: &[&str]) -> NamedTempFile {
    let mut temp_file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
    for line in lines {
        writeln!(temp_file, "{}", line).unwrap();
    }
    temp_file.flush().unwrap();
    temp_file
}

/// 写入临时 JSON 文件
pub fn write_json(content: &str) -> NamedTempFile {
    let mut temp_file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
    temp_file.write_all(content.as_bytes()).unwrap();
    temp_file.flush().unwrap();
    temp_file
}
