//! 运行时配置
//!
//! 所有配置均提供 `Default`、`bon::Builder` 以及 serde 反序列化（缺省字段取默认值），
//! 时间类字段在 JSON 中以毫秒表示。
//!
use crate::context::ContextFactory;
use crate::distribution::{DistributionMode, PublishMode};
use crate::error::{MediatorError, MediatorResult};
use bon::Builder;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 发件箱重试与批处理配置
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[serde(default)]
pub struct OutboxOptions {
    /// 最大尝试次数（含首次投递）
    #[builder(default = 3)]
    pub max_retry_attempts: u32,
    /// 首次重试延迟；为零时失败条目可立即再次被拉取
    #[builder(default = Duration::ZERO)]
    #[serde(with = "duration_ms")]
    pub initial_retry_delay: Duration,
    /// 指数退避因子
    #[builder(default = 2.0)]
    pub backoff_factor: f64,
    /// 单次提交处理的最大条目数
    pub batch_size: Option<usize>,
}

impl Default for OutboxOptions {
    fn default() -> Self {
        Self {
            max_retry_attempts: 3,
            initial_retry_delay: Duration::ZERO,
            backoff_factor: 2.0,
            batch_size: None,
        }
    }
}

impl OutboxOptions {
    /// 计算第 `attempts` 次失败（从 0 计数）后的重试延迟：
    /// `initial_retry_delay × backoff_factor^attempts`。
    /// 延迟为零时返回 `None`，表示无需等待；结果超出 `Duration` 范围时封顶为 `Duration::MAX`。
    pub fn retry_delay(&self, attempts: u32) -> Option<Duration> {
        if self.initial_retry_delay.is_zero() {
            return None;
        }

        let exponent = i32::try_from(attempts).unwrap_or(i32::MAX);
        let secs = self.initial_retry_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        let delay = Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX);
        (!delay.is_zero()).then_some(delay)
    }

    /// 退避因子必须是不小于 1 的有限数
    pub fn validate(&self) -> MediatorResult<()> {
        if !self.backoff_factor.is_finite() || self.backoff_factor < 1.0 {
            return Err(MediatorError::failure(format!(
                "invalid options: backoff_factor must be a finite number >= 1.0, got {}",
                self.backoff_factor
            )));
        }
        Ok(())
    }
}

/// 事件处理器的编排策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchStrategy {
    /// 按注册顺序逐个执行
    #[default]
    Sequential,
    /// 并发执行并等待全部完成
    Concurrent,
}

#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherOptions {
    /// 未命中静态特征与路由过滤器时使用的分发模式
    #[builder(default = DistributionMode::LOCAL)]
    pub default_distribution_mode: DistributionMode,
    #[builder(default)]
    pub dispatch_strategy: DispatchStrategy,
}

impl Default for DispatcherOptions {
    fn default() -> Self {
        Self {
            default_distribution_mode: DistributionMode::LOCAL,
            dispatch_strategy: DispatchStrategy::Sequential,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[serde(default)]
pub struct PublisherOptions {
    #[builder(default = PublishMode::Now)]
    pub default_mode: PublishMode,
}

impl Default for PublisherOptions {
    fn default() -> Self {
        Self {
            default_mode: PublishMode::Now,
        }
    }
}

impl PublisherOptions {
    /// 将 `PublishMode::Default` 解析为实际的发布方式；
    /// 配置本身为 `Default` 时按 `Now` 处理。
    pub fn resolve(&self, mode: PublishMode) -> PublishMode {
        match mode {
            PublishMode::Default => match self.default_mode {
                PublishMode::Default => PublishMode::Now,
                configured => configured,
            },
            explicit => explicit,
        }
    }
}

/// 中介者整体配置
#[derive(Debug, Clone, Default, PartialEq, Builder, Serialize, Deserialize)]
#[serde(default)]
pub struct MediatorOptions {
    #[builder(default)]
    pub outbox: OutboxOptions,
    #[builder(default)]
    pub dispatcher: DispatcherOptions,
    #[builder(default)]
    pub publisher: PublisherOptions,
    #[builder(default)]
    pub context_factory: ContextFactory,
}

impl MediatorOptions {
    pub fn from_json(json: &str) -> MediatorResult<Self> {
        let options: Self = serde_json::from_str(json)
            .map_err(|e| MediatorError::failure(format!("invalid options: {e}")))?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> MediatorResult<()> {
        self.outbox.validate()
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
