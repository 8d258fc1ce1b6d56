//! 分发模式与发布模式
//!
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

bitflags! {
    /// 事件的分发目标：本地处理器、外部传输或两者。
    /// 空集（`UNDEFINED`）表示“尚未决定”，交由路由器解析。
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct DistributionMode: u8 {
        const LOCAL = 0b01;
        const EXTERNAL = 0b10;
        const LOCAL_AND_EXTERNAL = Self::LOCAL.bits() | Self::EXTERNAL.bits();
    }
}

impl DistributionMode {
    pub const UNDEFINED: Self = Self::empty();

    pub fn is_undefined(&self) -> bool {
        self.is_empty()
    }

    pub fn is_local(&self) -> bool {
        self.contains(Self::LOCAL)
    }

    pub fn is_external(&self) -> bool {
        self.contains(Self::EXTERNAL)
    }
}

impl Default for DistributionMode {
    fn default() -> Self {
        Self::LOCAL
    }
}

impl fmt::Display for DistributionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.is_local(), self.is_external()) {
            (true, true) => f.write_str("LocalAndExternal"),
            (true, false) => f.write_str("Local"),
            (false, true) => f.write_str("External"),
            (false, false) => f.write_str("Undefined"),
        }
    }
}

/// 发布方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishMode {
    /// 使用 `PublisherOptions::default_mode`
    #[default]
    Default,
    /// 立即经由分发器投递
    Now,
    /// 暂存至发件箱，提交时再投递
    Outbox,
}

impl fmt::Display for PublishMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Default => "Default",
            Self::Now => "Now",
            Self::Outbox => "Outbox",
        };
        f.write_str(s)
    }
}
