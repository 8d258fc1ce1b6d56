use super::Context;
use crate::mediator::Mediator;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// 默认工厂写入的创建时间元数据键（RFC 3339）
pub const OCCURRED_AT_KEY: &str = "occurred_at";

/// 上下文工厂
/// - `Default`：UUIDv7 关联 ID（按时间有序），并写入 `occurred_at`
/// - `Slim`：UUIDv4 关联 ID，不写入任何元数据
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextFactory {
    #[default]
    Default,
    Slim,
}

impl ContextFactory {
    pub fn create(&self, mediator: &Mediator) -> Context {
        match self {
            Self::Default => {
                let occurred_at = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
                Context::new(
                    mediator.clone(),
                    Uuid::now_v7(),
                    [(OCCURRED_AT_KEY.to_string(), Value::String(occurred_at))],
                    CancellationToken::new(),
                )
            }
            Self::Slim => Context::new(
                mediator.clone(),
                Uuid::new_v4(),
                Vec::new(),
                CancellationToken::new(),
            ),
        }
    }
}

/// 显式构造上下文：沿用上游的关联 ID、附带初始元数据或共享取消令牌
#[derive(Debug)]
pub struct ContextBuilder {
    mediator: Mediator,
    correlation_id: Option<Uuid>,
    metadata: Vec<(String, Value)>,
    cancellation: Option<CancellationToken>,
}

impl ContextBuilder {
    pub(crate) fn new(mediator: Mediator) -> Self {
        Self {
            mediator,
            correlation_id: None,
            metadata: Vec::new(),
            cancellation: None,
        }
    }

    pub fn correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.push((key.into(), value.into()));
        self
    }

    pub fn cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn build(self) -> Context {
        Context::new(
            self.mediator,
            self.correlation_id.unwrap_or_else(Uuid::now_v7),
            self.metadata,
            self.cancellation.unwrap_or_default(),
        )
    }
}
