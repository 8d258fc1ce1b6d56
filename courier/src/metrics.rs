//! 可观测性埋点
//!
//! 运行时只负责在关键位置调用 `MediatorMetrics`，具体的计数器/直方图后端由使用方提供。
//! 所有方法都有空实现，按需覆盖即可。
//!
use crate::distribution::DistributionMode;
use std::time::Duration;

pub trait MediatorMetrics: Send + Sync {
    /// 事件发往外部传输
    fn record_published(&self, _event: &'static str) {}

    /// 事件被本地处理器消费
    fn record_consumed(&self, _event: &'static str) {}

    fn record_retry(&self, _event: &'static str, _attempt: u32) {}

    fn record_dead_lettered(&self, _event: &'static str) {}

    fn record_publish_latency(&self, _event: &'static str, _elapsed: Duration) {}

    fn record_consume_latency(&self, _event: &'static str, _elapsed: Duration) {}

    fn record_event_dispatched(&self, _event: &'static str, _mode: DistributionMode, _success: bool) {
    }

    fn record_dispatch_latency(
        &self,
        _event: &'static str,
        _mode: DistributionMode,
        _elapsed: Duration,
    ) {
    }

    fn record_outbox_processed(&self, _event: &'static str) {}

    /// 一次提交开始时待处理条目的数量
    fn record_outbox_depth(&self, _depth: usize) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MediatorMetrics for NoopMetrics {}
