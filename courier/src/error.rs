//! 中介者运行时错误类型
//!
//! 所有对外操作统一返回 `MediatorResult<T>`：
//! - 配置类错误（缺失处理器、重复注册、类型不匹配）
//! - 管道类错误（CQRS 边界、校验失败、处理器自身失败）
//! - 分发类错误（传输、发件箱存储、未知分发模式）
//! - 多处理器的失败通过 `Aggregate` 合并返回
//!

pub type MediatorResult<T> = Result<T, MediatorError>;

#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum MediatorError {
    #[error("no {kind} handler registered for {name}")]
    MissingHandler {
        kind: &'static str,
        name: &'static str,
    },

    #[error("the feature {0} is not available in the current context")]
    MissingContextFeature(&'static str),

    #[error(
        "cqrs boundary violation: cannot send request '{attempted}' within a request handler, boundary was previously crossed by '{active}'"
    )]
    CqrsBoundaryViolation {
        active: String,
        attempted: &'static str,
    },

    #[error("cqrs boundary marker for '{request}' was removed by another component")]
    CqrsBoundaryTampered { request: &'static str },

    #[error("validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("{reason}")]
    Failure { reason: String },

    #[error("handler: {0}")]
    Handler(#[from] anyhow::Error),

    #[error("transport: {reason}")]
    Transport { reason: String },

    #[error("dispatch of {event} failed: {reason}")]
    Dispatch { event: String, reason: String },

    #[error("no outbox dispatcher registered for event type {0}")]
    NoDispatcherRegistered(String),

    #[error("unknown distribution mode: {0}")]
    UnknownDistributionMode(String),

    #[error("handler already registered: {kind}={name}")]
    AlreadyRegistered {
        kind: &'static str,
        name: &'static str,
    },

    #[error("type mismatch: expected={expected}, found={found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("outbox entry not found: {0}")]
    OutboxEntryNotFound(uuid::Uuid),

    #[error("storage: {reason}")]
    Storage { reason: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error("{} errors occurred: [{}]", .0.len(), join_errors(.0))]
    Aggregate(Vec<MediatorError>),
}

fn join_errors(errors: &[MediatorError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl MediatorError {
    pub fn failure(reason: impl Into<String>) -> Self {
        Self::Failure {
            reason: reason.into(),
        }
    }

    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport {
            reason: reason.into(),
        }
    }

    pub fn storage(reason: impl Into<String>) -> Self {
        Self::Storage {
            reason: reason.into(),
        }
    }

    /// 致命错误：重试不会改变结果（配置缺失、边界违规、取消等）。
    /// 发件箱遇到致命错误时直接进入死信，而不是按退避策略重试。
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::MissingHandler { .. }
            | Self::MissingContextFeature(_)
            | Self::CqrsBoundaryViolation { .. }
            | Self::CqrsBoundaryTampered { .. }
            | Self::NoDispatcherRegistered(_)
            | Self::UnknownDistributionMode(_)
            | Self::AlreadyRegistered { .. }
            | Self::TypeMismatch { .. }
            | Self::Cancelled => true,
            Self::Aggregate(errors) => errors.iter().all(Self::is_fatal),
            _ => false,
        }
    }

    /// 合并多个结果：
    /// - 全部成功 → `Ok(())`
    /// - 仅一个失败 → 原样返回该错误
    /// - 多个失败 → `Aggregate`（嵌套的 `Aggregate` 会被展开）
    pub fn combine<I>(results: I) -> MediatorResult<()>
    where
        I: IntoIterator<Item = MediatorResult<()>>,
    {
        let mut errors = Vec::new();
        for result in results {
            match result {
                Ok(()) => {}
                Err(Self::Aggregate(inner)) => errors.extend(inner),
                Err(e) => errors.push(e),
            }
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(Self::Aggregate(errors)),
        }
    }

    /// 展开为单个错误列表（非 `Aggregate` 时返回只含自身的列表）
    pub fn into_errors(self) -> Vec<MediatorError> {
        match self {
            Self::Aggregate(errors) => errors,
            other => vec![other],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combine_all_ok_is_ok() {
        assert!(MediatorError::combine(vec![Ok(()), Ok(())]).is_ok());
        assert!(MediatorError::combine(Vec::new()).is_ok());
    }

    #[test]
    fn combine_single_failure_is_returned_unchanged() {
        let err = MediatorError::combine(vec![Ok(()), Err(MediatorError::failure("boom"))])
            .unwrap_err();
        assert!(matches!(err, MediatorError::Failure { ref reason } if reason == "boom"));
    }

    #[test]
    fn combine_flattens_nested_aggregates() {
        let nested = Err(MediatorError::Aggregate(vec![
            MediatorError::failure("a"),
            MediatorError::failure("b"),
        ]));
        let err = MediatorError::combine(vec![nested, Err(MediatorError::failure("c"))])
            .unwrap_err();

        let errors = err.into_errors();
        assert_eq!(errors.len(), 3);
        assert_eq!(errors[2].to_string(), "c");
    }

    #[test]
    fn fatal_classification() {
        assert!(MediatorError::Cancelled.is_fatal());
        assert!(MediatorError::NoDispatcherRegistered("E".into()).is_fatal());
        assert!(!MediatorError::failure("x").is_fatal());
        assert!(!MediatorError::Handler(anyhow::anyhow!("x")).is_fatal());
        assert!(
            !MediatorError::Aggregate(vec![MediatorError::Cancelled, MediatorError::failure("x")])
                .is_fatal()
        );
    }

    #[test]
    fn violation_message_names_both_requests() {
        let err = MediatorError::CqrsBoundaryViolation {
            active: "PlaceOrder".into(),
            attempted: "ReserveStock",
        };
        let msg = err.to_string();
        assert!(msg.contains("PlaceOrder"));
        assert!(msg.contains("ReserveStock"));
    }
}
