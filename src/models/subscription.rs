//! Subscription tier, read-only input to this system (§3, §6.3 of the design notes).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Free,
    Basic,
    Pro,
    ProPlus,
    Max,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Basic => "basic",
            Self::Pro => "pro",
            Self::ProPlus => "pro_plus",
            Self::Max => "max",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "basic" => Self::Basic,
            "pro" => Self::Pro,
            "pro_plus" => Self::ProPlus,
            "max" => Self::Max,
            _ => Self::Free,
        }
    }

    pub fn is_premium(&self) -> bool {
        !matches!(self, Self::Free)
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct SubscriptionRow {
    pub user_id: String,
    pub tier: String,
    pub status: String,
    pub period_end: Option<DateTime<Utc>>,
}

/// Per-tier feature flags, mirrored from the original `get_user_tier_info()` table
/// (not persisted; compiled defaults consumed by ModelSelector/ContextManager).
#[derive(Debug, Clone, Copy)]
pub struct TierFeatures {
    pub max_tokens_per_request: u32,
    pub rate_limit_per_hour: u32,
    pub can_use_reasoning: bool,
    pub can_use_ultra_think: bool,
}

impl TierFeatures {
    pub fn for_tier(tier: Tier) -> Self {
        match tier {
            Tier::Free => Self {
                max_tokens_per_request: 2_000,
                rate_limit_per_hour: 10,
                can_use_reasoning: false,
                can_use_ultra_think: false,
            },
            Tier::Basic => Self {
                max_tokens_per_request: 4_000,
                rate_limit_per_hour: 60,
                can_use_reasoning: true,
                can_use_ultra_think: false,
            },
            Tier::Pro => Self {
                max_tokens_per_request: 8_000,
                rate_limit_per_hour: 200,
                can_use_reasoning: true,
                can_use_ultra_think: true,
            },
            Tier::ProPlus => Self {
                max_tokens_per_request: 12_000,
                rate_limit_per_hour: 500,
                can_use_reasoning: true,
                can_use_ultra_think: true,
            },
            Tier::Max => Self {
                max_tokens_per_request: 16_000,
                rate_limit_per_hour: 2_000,
                can_use_reasoning: true,
                can_use_ultra_think: true,
            },
        }
    }
}
