//! 分发路由（Distribution Router）
//!
//! 按以下顺序为事件类型决定分发模式：
//! 1. 按类型缓存的结果
//! 2. 注册时声明的静态特征（`publish_trait`）
//! 3. 路由过滤器（按 `priority` 升序，首个返回 `Some` 者胜出）
//! 4. 配置的默认模式
//!
//! 决策按事件**类型**缓存：只有某类型的首次分发会执行过滤器，
//! 之后无论环境上下文如何变化都复用该结果。
//!
use crate::distribution::DistributionMode;
use crate::message::AnyEvent;
use dashmap::DashMap;
use std::any::{TypeId, type_name};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};

pub trait RoutingFilter: Send + Sync {
    /// 数值越小越先执行
    fn priority(&self) -> i32 {
        0
    }

    fn name(&self) -> &str {
        type_name::<Self>()
    }

    /// 返回 `None`（或 `Some(UNDEFINED)`）表示交由后续过滤器/默认值决定
    fn decide(&self, event: &dyn AnyEvent) -> Option<DistributionMode>;
}

pub struct DistributionRouter {
    traits: HashMap<TypeId, DistributionMode>,
    filters: Vec<Arc<dyn RoutingFilter>>,
    default_mode: DistributionMode,
    cache: DashMap<TypeId, DistributionMode>,
}

impl DistributionRouter {
    pub fn new(
        traits: HashMap<TypeId, DistributionMode>,
        mut filters: Vec<Arc<dyn RoutingFilter>>,
        default_mode: DistributionMode,
    ) -> Self {
        // 稳定排序：同优先级保持注册顺序
        filters.sort_by_key(|f| f.priority());
        Self {
            traits,
            filters,
            default_mode,
            cache: DashMap::new(),
        }
    }

    pub fn default_mode(&self) -> DistributionMode {
        self.default_mode
    }

    /// 已缓存的决策（测试与诊断用）
    pub fn cached(&self, event_type: TypeId) -> Option<DistributionMode> {
        self.cache.get(&event_type).map(|m| *m)
    }

    pub fn resolve(&self, event: &dyn AnyEvent) -> DistributionMode {
        let event_type = event.event_type_id();
        if let Some(mode) = self.cached(event_type) {
            trace!(event = event.name(), %mode, "using cached distribution mode");
            return mode;
        }

        let mode = self.decide(event, event_type);
        // 并发首次解析时以先写入者为准
        *self.cache.entry(event_type).or_insert(mode)
    }

    fn decide(&self, event: &dyn AnyEvent, event_type: TypeId) -> DistributionMode {
        if let Some(mode) = self.traits.get(&event_type).filter(|m| !m.is_undefined()) {
            debug!(event = event.name(), %mode, "distribution mode from publish trait");
            return *mode;
        }

        for filter in &self.filters {
            match filter.decide(event) {
                Some(mode) if !mode.is_undefined() => {
                    debug!(
                        event = event.name(),
                        filter = filter.name(),
                        priority = filter.priority(),
                        %mode,
                        "distribution mode from routing filter"
                    );
                    return mode;
                }
                _ => trace!(event = event.name(), filter = filter.name(), "routing filter deferred"),
            }
        }

        debug!(event = event.name(), mode = %self.default_mode, "using default distribution mode");
        self.default_mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Event, Message};
    use serde::Serialize;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Serialize)]
    struct Audited;

    impl Message for Audited {
        const NAME: &'static str = "Audited";
    }

    impl Event for Audited {}

    #[derive(Serialize)]
    struct Shipped;

    impl Message for Shipped {
        const NAME: &'static str = "Shipped";
    }

    impl Event for Shipped {}

    struct Fixed {
        priority: i32,
        mode: Option<DistributionMode>,
        calls: Arc<AtomicUsize>,
    }

    impl RoutingFilter for Fixed {
        fn priority(&self) -> i32 {
            self.priority
        }

        fn decide(&self, _event: &dyn AnyEvent) -> Option<DistributionMode> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.mode
        }
    }

    fn filter(priority: i32, mode: Option<DistributionMode>) -> (Arc<dyn RoutingFilter>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let filter = Arc::new(Fixed {
            priority,
            mode,
            calls: calls.clone(),
        });
        (filter, calls)
    }

    #[test]
    fn filters_run_in_priority_order_and_result_is_cached() {
        let (late, late_calls) = filter(100, Some(DistributionMode::LOCAL_AND_EXTERNAL));
        let (early, early_calls) = filter(50, None);
        // 注册顺序与优先级相反
        let router = DistributionRouter::new(
            HashMap::new(),
            vec![late, early],
            DistributionMode::LOCAL,
        );

        assert_eq!(router.resolve(&Audited), DistributionMode::LOCAL_AND_EXTERNAL);
        assert_eq!(early_calls.load(Ordering::SeqCst), 1);
        assert_eq!(late_calls.load(Ordering::SeqCst), 1);

        assert_eq!(router.resolve(&Audited), DistributionMode::LOCAL_AND_EXTERNAL);
        assert_eq!(early_calls.load(Ordering::SeqCst), 1);
        assert_eq!(late_calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            router.cached(TypeId::of::<Audited>()),
            Some(DistributionMode::LOCAL_AND_EXTERNAL)
        );
    }

    #[test]
    fn publish_trait_wins_over_filters() {
        let (f, calls) = filter(0, Some(DistributionMode::LOCAL));
        let router = DistributionRouter::new(
            HashMap::from([(TypeId::of::<Shipped>(), DistributionMode::EXTERNAL)]),
            vec![f],
            DistributionMode::LOCAL,
        );

        assert_eq!(router.resolve(&Shipped), DistributionMode::EXTERNAL);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(router.resolve(&Audited), DistributionMode::LOCAL);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn default_is_used_and_cached_when_every_filter_defers() {
        let (a, a_calls) = filter(1, None);
        let (b, b_calls) = filter(2, Some(DistributionMode::UNDEFINED));
        let router = DistributionRouter::new(HashMap::new(), vec![a, b], DistributionMode::EXTERNAL);

        assert_eq!(router.resolve(&Audited), DistributionMode::EXTERNAL);
        assert_eq!(router.resolve(&Audited), DistributionMode::EXTERNAL);
        assert_eq!(a_calls.load(Ordering::SeqCst), 1);
        assert_eq!(b_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cache_is_per_type() {
        let (f, calls) = filter(0, Some(DistributionMode::EXTERNAL));
        let router = DistributionRouter::new(HashMap::new(), vec![f], DistributionMode::LOCAL);

        router.resolve(&Audited);
        router.resolve(&Shipped);
        router.resolve(&Shipped);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
