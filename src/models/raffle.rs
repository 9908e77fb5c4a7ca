use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::{
    ActivityState, activity_entity, participant_entity, prize_line_entity, winner_entity,
};

use super::PaginatedResponse;

/// 约定的 "未中奖" 奖品行名称/描述（大小写不敏感）
pub const NO_WIN_SENTINEL: &str = "none";

/// 抽奖活动
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Activity {
    pub id: Uuid,
    pub name: String,
    pub group_id: String,
    pub deadline: DateTime<Utc>,
    pub state: ActivityState,
    pub creator_id: String,
    pub created_at: DateTime<Utc>,
    /// 文本报名口令（由聊天层匹配）
    pub keyword: Option<String>,
    /// 报名手势标识（例如指定的表情回应）
    pub gesture_id: Option<String>,
    /// 公告消息引用
    pub announcement_ref: Option<String>,
    pub participant_count: i32,
    pub drawn_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub draw_attempts: i32,
    /// 非空表示开奖重试耗尽，等待运维重新触发
    pub draw_error: Option<String>,
}

impl Activity {
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.deadline <= now
    }

    pub fn needs_operator(&self) -> bool {
        self.state == ActivityState::Active && self.draw_error.is_some()
    }
}

impl From<activity_entity::Model> for Activity {
    fn from(m: activity_entity::Model) -> Self {
        Activity {
            id: m.id,
            name: m.name,
            group_id: m.group_id,
            deadline: m.deadline,
            state: m.state,
            creator_id: m.creator_id,
            created_at: m.created_at,
            keyword: m.keyword,
            gesture_id: m.gesture_id,
            announcement_ref: m.announcement_ref,
            participant_count: m.participant_count,
            drawn_at: m.drawn_at,
            cancelled_at: m.cancelled_at,
            draw_attempts: m.draw_attempts,
            draw_error: m.draw_error,
        }
    }
}

/// 奖品行：name 奖品名，count 可中奖人数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PrizeLine {
    pub name: String,
    pub description: String,
    pub count: i32,
    /// 名称与描述都为 "none" 的 "未中奖" 行，仅供展示层过滤；
    /// 开奖时与普通奖品一样占用名额。由服务端根据名称计算
    #[serde(default, skip_deserializing)]
    #[schema(read_only)]
    pub is_no_win: bool,
}

impl PrizeLine {
    pub fn new(name: impl Into<String>, description: impl Into<String>, count: i32) -> Self {
        let name = name.into();
        let description = description.into();
        let is_no_win = is_no_win_sentinel(&name, &description);
        Self {
            name,
            description,
            count,
            is_no_win,
        }
    }
}

fn is_no_win_sentinel(name: &str, description: &str) -> bool {
    name.trim().eq_ignore_ascii_case(NO_WIN_SENTINEL)
        && description.trim().eq_ignore_ascii_case(NO_WIN_SENTINEL)
}

impl From<prize_line_entity::Model> for PrizeLine {
    fn from(m: prize_line_entity::Model) -> Self {
        PrizeLine::new(m.name, m.description, m.count)
    }
}

/// 报名用户
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Participant {
    pub user_id: String,
    pub display_name: String,
    pub joined_at: DateTime<Utc>,
}

impl From<participant_entity::Model> for Participant {
    fn from(m: participant_entity::Model) -> Self {
        Participant {
            user_id: m.user_id,
            display_name: m.display_name,
            joined_at: m.joined_at,
        }
    }
}

/// 中奖记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct WinnerRecord {
    pub activity_id: Uuid,
    pub user_id: String,
    pub display_name: String,
    pub prize_name: String,
    pub won_at: DateTime<Utc>,
}

impl From<winner_entity::Model> for WinnerRecord {
    fn from(m: winner_entity::Model) -> Self {
        WinnerRecord {
            activity_id: m.activity_id,
            user_id: m.user_id,
            display_name: m.display_name,
            prize_name: m.prize_name,
            won_at: m.won_at,
        }
    }
}

/// 活动详情（活动 + 奖品行 + 报名 + 中奖）
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ActivityDetail {
    pub activity: Activity,
    pub prize_lines: Vec<PrizeLine>,
    pub participants: Vec<Participant>,
    pub winners: Vec<WinnerRecord>,
}

impl ActivityDetail {
    pub fn total_prize_count(&self) -> i64 {
        self.prize_lines.iter().map(|p| p.count.max(0) as i64).sum()
    }
}

/// 写入存储的新活动（id / 时间戳由存储生成，初始状态 pending）
#[derive(Debug, Clone)]
pub struct NewActivity {
    pub name: String,
    pub group_id: String,
    pub deadline: DateTime<Utc>,
    pub creator_id: String,
    pub keyword: Option<String>,
    pub gesture_id: Option<String>,
}

/// 创建活动请求
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateActivityRequest {
    pub name: String,
    pub group_id: String,
    /// 开奖时间，必须晚于当前时间
    pub deadline: DateTime<Utc>,
    /// 至少一行，每行 count > 0
    pub prize_lines: Vec<PrizeLine>,
    #[serde(default)]
    pub keyword: Option<String>,
    #[serde(default)]
    pub gesture_id: Option<String>,
}

/// 报名请求
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct JoinRequest {
    pub display_name: String,
}

/// 报名结果：三种都是正常业务结果，不是错误
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum JoinResult {
    Joined,
    AlreadyJoined,
    ActivityNotOpen { state: ActivityState },
}

/// 是否已报名
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HasJoinedResponse {
    pub joined: bool,
    pub participant_count: i64,
}

/// 挂载公告消息引用
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AttachAnnouncementRequest {
    pub message_ref: String,
}

/// 活动列表查询
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ActivityListQuery {
    pub group_id: String,
    pub state: Option<ActivityState>,
}

/// 群组查询（进行中活动）
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GroupQuery {
    pub group_id: String,
}

/// 历史活动查询参数
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ActivityHistoryQuery {
    pub group_id: String,
    /// 页码 (默认 1)
    pub page: Option<u32>,
    /// 每页数量 (默认 20)
    pub per_page: Option<u32>,
}

/// 口令 / 手势匹配查询
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct JoinMatchQuery {
    pub group_id: String,
    pub keyword: Option<String>,
    pub gesture_id: Option<String>,
}

/// 取消结果
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CancelResponse {
    pub activity: Activity,
}

/// 调度器推送给外部投递方的事件（开奖完成 / 活动取消）
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RaffleEvent {
    Drawn {
        activity: Activity,
        participant_count: usize,
        winners: Vec<WinnerRecord>,
    },
    Cancelled {
        activity: Activity,
        participant_count: usize,
    },
}

impl RaffleEvent {
    pub fn activity(&self) -> &Activity {
        match self {
            RaffleEvent::Drawn { activity, .. } | RaffleEvent::Cancelled { activity, .. } => {
                activity
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RaffleEvent::Drawn { .. } => "drawn",
            RaffleEvent::Cancelled { .. } => "cancelled",
        }
    }
}

/// 历史活动分页响应
pub type ActivityHistoryPageResponse = PaginatedResponse<Activity>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_win_sentinel_is_case_insensitive() {
        assert!(PrizeLine::new("None", "NONE", 3).is_no_win);
        assert!(PrizeLine::new(" none ", "none", 1).is_no_win);
        assert!(!PrizeLine::new("none", "a sticker", 1).is_no_win);
        assert!(!PrizeLine::new("Gold", "none", 1).is_no_win);
    }

    #[test]
    fn test_no_win_flag_is_serialized_but_not_accepted() {
        let json = serde_json::to_value(PrizeLine::new("none", "none", 2)).unwrap();
        assert_eq!(json["is_no_win"], true);

        let line: PrizeLine = serde_json::from_value(serde_json::json!({
            "name": "Gold",
            "description": "gold coin",
            "count": 1,
            "is_no_win": true
        }))
        .unwrap();
        assert!(!line.is_no_win);
    }

    #[test]
    fn test_join_result_serialization() {
        let json = serde_json::to_value(JoinResult::ActivityNotOpen {
            state: ActivityState::Drawn,
        })
        .unwrap();
        assert_eq!(json["result"], "activity_not_open");
        assert_eq!(json["state"], "drawn");

        let json = serde_json::to_value(JoinResult::AlreadyJoined).unwrap();
        assert_eq!(json["result"], "already_joined");
    }
}
