//! 操作上下文（Context）
//!
//! 一次逻辑操作（例如一个入站请求）对应一个 `Context`，承载：
//! - 关联 ID（`correlation_id`）：同时作为发件箱分区键
//! - 元数据：字符串键 → JSON 值，后写覆盖
//! - 特性槽：按类型存取的运行时能力
//! - 取消令牌：贯穿请求、事件分发、发件箱与流
//! - 对中介者的引用：发布事件与提交发件箱的入口
//!
//! `Context` 内部为 `Arc`，克隆代价很低；克隆体共享同一份状态。
//!
mod ambient;
mod builder;

pub use builder::{ContextBuilder, ContextFactory, OCCURRED_AT_KEY};

use crate::distribution::{DistributionMode, PublishMode};
use crate::error::{MediatorError, MediatorResult};
use crate::mediator::Mediator;
use crate::message::Event;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::any::{Any, TypeId, type_name};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    correlation_id: Uuid,
    metadata: DashMap<String, Value>,
    features: DashMap<TypeId, Arc<dyn Any + Send + Sync>>,
    cancellation: CancellationToken,
    mediator: Mediator,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("correlation_id", &self.inner.correlation_id)
            .field("metadata", &self.metadata())
            .field("features", &self.inner.features.len())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl Context {
    pub(crate) fn new(
        mediator: Mediator,
        correlation_id: Uuid,
        metadata: impl IntoIterator<Item = (String, Value)>,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                correlation_id,
                metadata: metadata.into_iter().collect(),
                features: DashMap::new(),
                cancellation,
                mediator,
            }),
        }
    }

    pub fn correlation_id(&self) -> Uuid {
        self.inner.correlation_id
    }

    pub fn mediator(&self) -> &Mediator {
        &self.inner.mediator
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.inner.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancellation.is_cancelled()
    }

    /// 取消当前操作：进行中的流在下一次产出前结束，发件箱在条目之间停止
    pub fn cancel(&self) {
        self.inner.cancellation.cancel();
    }

    /// 两个 `Context` 是否指向同一份状态
    pub fn ptr_eq(&self, other: &Context) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // ---------- 元数据 ----------

    pub fn set_metadata(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.inner.metadata.insert(key.into(), value.into());
    }

    pub fn remove_metadata(&self, key: &str) -> bool {
        self.inner.metadata.remove(key).is_some()
    }

    pub fn contains_metadata(&self, key: &str) -> bool {
        self.inner.metadata.contains_key(key)
    }

    pub fn metadata_value(&self, key: &str) -> Option<Value> {
        self.inner.metadata.get(key).map(|v| v.value().clone())
    }

    /// 读取并反序列化元数据；键不存在或类型不匹配时返回 `None`
    pub fn try_get_metadata<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.metadata_value(key)?;
        serde_json::from_value(value).ok()
    }

    /// 元数据快照（按键排序）
    pub fn metadata(&self) -> BTreeMap<String, Value> {
        self.inner
            .metadata
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    // ---------- 特性 ----------

    pub fn set_feature<T: Send + Sync + 'static>(&self, feature: T) {
        self.set_feature_arc(Arc::new(feature));
    }

    pub fn set_feature_arc<T: Send + Sync + 'static>(&self, feature: Arc<T>) {
        self.inner.features.insert(TypeId::of::<T>(), feature);
    }

    pub fn remove_feature<T: Send + Sync + 'static>(&self) -> bool {
        self.inner.features.remove(&TypeId::of::<T>()).is_some()
    }

    pub fn has_feature<T: Send + Sync + 'static>(&self) -> bool {
        self.inner.features.contains_key(&TypeId::of::<T>())
    }

    pub fn feature<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        let feature = self.inner.features.get(&TypeId::of::<T>())?.value().clone();
        feature.downcast::<T>().ok()
    }

    pub fn must_feature<T: Send + Sync + 'static>(&self) -> MediatorResult<Arc<T>> {
        self.feature::<T>()
            .ok_or(MediatorError::MissingContextFeature(type_name::<T>()))
    }

    // ---------- 发布与提交 ----------

    /// 按发布方式与分发模式发布事件
    pub async fn publish_event<E: Event>(
        &self,
        event: E,
        publish_mode: PublishMode,
        distribution: DistributionMode,
    ) -> MediatorResult<()> {
        self.inner
            .mediator
            .publish_with(self, event, publish_mode, distribution)
            .await
    }

    /// 提交当前关联 ID 下的发件箱
    pub async fn commit_outbox(&self) -> MediatorResult<()> {
        self.inner.mediator.commit(self).await
    }
}
