//! Prize allocation.
//!
//! 逻辑:
//! 1. 无人报名 -> 无中奖者（正常结果）
//! 2. 报名用户均匀随机洗牌
//! 3. 按奖品行存储顺序依次消耗，每行从洗牌结果头部取 count 人，人数不足时提前结束
//! 4. 中奖总数 = min(奖品总数, 报名人数)，其余用户未中奖
//!
//! 每个用户最多中一次，每行中奖人数不超过 count。"none" 行不做特殊处理。

use chrono::{DateTime, Utc};
use rand::Rng;
use rand::seq::SliceRandom;
use uuid::Uuid;

use crate::models::{Participant, PrizeLine, WinnerRecord};

/// 一次开奖的结果
#[derive(Debug, Clone, Default)]
pub struct Allocation {
    pub winners: Vec<WinnerRecord>,
    pub non_winners: Vec<Participant>,
}

pub fn allocate<R: Rng + ?Sized>(
    activity_id: Uuid,
    prize_lines: &[PrizeLine],
    participants: &[Participant],
    won_at: DateTime<Utc>,
    rng: &mut R,
) -> Allocation {
    if participants.is_empty() {
        return Allocation::default();
    }

    let mut pool: Vec<Participant> = participants.to_vec();
    pool.shuffle(rng);

    let mut drawn = pool.into_iter();
    let mut winners = Vec::new();

    'lines: for line in prize_lines {
        // count <= 0 在创建时已被拒绝，这里按 0 处理
        let slots = line.count.max(0) as usize;
        for _ in 0..slots {
            let Some(p) = drawn.next() else {
                break 'lines;
            };
            winners.push(WinnerRecord {
                activity_id,
                user_id: p.user_id,
                display_name: p.display_name,
                prize_name: line.name.clone(),
                won_at,
            });
        }
    }

    Allocation {
        winners,
        non_winners: drawn.collect(),
    }
}
