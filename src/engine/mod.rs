// ==========================================
// 会员导入引擎 - 规则引擎层
// ==========================================
// 职责: 会员类型日期规则、会员状态规则
// 红线: Engine 不拼 SQL, 规则数据由 repository 层加载后传入
// ==========================================

pub mod membership_dates;
pub mod membership_status;

// 重导出核心引擎
pub use membership_dates::{shift_date, MembershipDateEngine};
pub use membership_status::{MembershipStatusEngine, StatusDates};
