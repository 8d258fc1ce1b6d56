use courier::pipeline::stream::{StreamBehavior, TypedStreamBehavior};
use courier::pipeline::{AnyItem, StreamNext};
use courier::{
    AnyMessage, Context, Mediator, MediatorError, ResultStream, StreamRequest,
    StreamRequestHandler,
};
use futures_util::StreamExt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(StreamRequest)]
#[stream_request(item = u32)]
struct Countdown {
    from: u32,
    fail_on: Option<u32>,
}

#[derive(StreamRequest)]
#[stream_request(item = String, name = "ticker")]
struct Ticker;

/// 惰性生产者：记录已产生的元素个数
struct CountdownHandler {
    produced: Arc<AtomicUsize>,
}

impl StreamRequestHandler<Countdown> for CountdownHandler {
    fn handle(&self, _ctx: Context, request: Arc<Countdown>) -> ResultStream<u32> {
        let produced = self.produced.clone();
        let stream = async_stream::stream! {
            for n in (1..=request.from).rev() {
                produced.fetch_add(1, Ordering::SeqCst);
                if request.fail_on == Some(n) {
                    yield Err(MediatorError::failure(format!("cannot count {n}")));
                } else {
                    yield Ok(n);
                }
            }
        };
        stream.boxed()
    }
}

/// 无限流，每项之间短暂休眠
struct TickerHandler;

impl StreamRequestHandler<Ticker> for TickerHandler {
    fn handle(&self, _ctx: Context, _request: Arc<Ticker>) -> ResultStream<String> {
        let stream = async_stream::stream! {
            let mut tick = 0u64;
            loop {
                tick += 1;
                yield Ok(format!("tick-{tick}"));
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        };
        stream.boxed()
    }
}

/// 每经过一个元素计数一次，原样转发
struct Counting {
    seen: Arc<AtomicUsize>,
}

impl TypedStreamBehavior<Countdown> for Counting {
    fn handle(
        &self,
        _ctx: Context,
        _request: Arc<Countdown>,
        next: StreamNext<u32>,
    ) -> ResultStream<u32> {
        let seen = self.seen.clone();
        next.run()
            .inspect(move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            })
            .boxed()
    }
}

/// 丢弃失败的元素
struct OnlySuccesses;

impl StreamBehavior for OnlySuccesses {
    fn handle(
        &self,
        _ctx: Context,
        _request: Arc<dyn AnyMessage>,
        next: StreamNext<AnyItem>,
    ) -> ResultStream<AnyItem> {
        next.run()
            .filter(|item| std::future::ready(item.is_ok()))
            .boxed()
    }
}

fn countdown(from: u32, fail_on: Option<u32>) -> Countdown {
    Countdown { from, fail_on }
}

#[tokio::test]
async fn stream_without_behaviors_yields_every_result() {
    let produced = Arc::new(AtomicUsize::new(0));
    let mediator = Mediator::builder()
        .stream_handler::<Countdown, _>(Arc::new(CountdownHandler {
            produced: produced.clone(),
        }))
        .build()
        .unwrap();
    let ctx = mediator.context();

    let items: Vec<_> = mediator
        .send_stream(&ctx, countdown(3, Some(2)))
        .unwrap()
        .collect()
        .await;

    assert_eq!(items.len(), 3);
    assert_eq!(*items[0].as_ref().unwrap(), 3);
    assert!(items[1].is_err());
    assert_eq!(*items[2].as_ref().unwrap(), 1);
}

#[tokio::test]
async fn behaviors_count_and_filter_lazily() {
    let produced = Arc::new(AtomicUsize::new(0));
    let seen = Arc::new(AtomicUsize::new(0));
    let mediator = Mediator::builder()
        .stream_handler::<Countdown, _>(Arc::new(CountdownHandler {
            produced: produced.clone(),
        }))
        .stream_behavior(Arc::new(OnlySuccesses))
        .typed_stream_behavior::<Countdown, _>(Arc::new(Counting { seen: seen.clone() }))
        .build()
        .unwrap();
    let ctx = mediator.context();

    let mut stream = mediator.send_stream(&ctx, countdown(5, Some(4))).unwrap();
    assert_eq!(produced.load(Ordering::SeqCst), 0);

    assert_eq!(stream.next().await.unwrap().unwrap(), 5);
    assert_eq!(stream.next().await.unwrap().unwrap(), 3);
    // 过滤在计数之外：计数行为看到了失败的 4
    assert_eq!(produced.load(Ordering::SeqCst), 3);
    assert_eq!(seen.load(Ordering::SeqCst), 3);

    let rest: Vec<u32> = stream.map(|item| item.unwrap()).collect().await;
    assert_eq!(rest, vec![2, 1]);
    assert_eq!(produced.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn conditional_stream_behavior_skips_other_requests() {
    let mediator = Mediator::builder()
        .stream_handler::<Countdown, _>(Arc::new(CountdownHandler {
            produced: Arc::new(AtomicUsize::new(0)),
        }))
        .stream_handler::<Ticker, _>(Arc::new(TickerHandler))
        .conditional_stream_behavior(Arc::new(OnlySuccesses), |m: &dyn AnyMessage| {
            m.name() == "ticker"
        })
        .build()
        .unwrap();
    let ctx = mediator.context();

    let items: Vec<_> = mediator
        .send_stream(&ctx, countdown(2, Some(1)))
        .unwrap()
        .collect()
        .await;
    assert!(items[1].is_err());

    let ticks: Vec<String> = mediator
        .send_stream(&ctx, Ticker)
        .unwrap()
        .take(2)
        .map(|item| item.unwrap())
        .collect()
        .await;
    assert_eq!(ticks, vec!["tick-1", "tick-2"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancellation_ends_an_unbounded_stream() {
    let mediator = Mediator::builder()
        .stream_handler::<Ticker, _>(Arc::new(TickerHandler))
        .build()
        .unwrap();
    let ctx = mediator.context();

    let mut stream = mediator.send_stream(&ctx, Ticker).unwrap();
    assert_eq!(stream.next().await.unwrap().unwrap(), "tick-1");
    assert_eq!(stream.next().await.unwrap().unwrap(), "tick-2");

    ctx.cancel();
    assert!(stream.next().await.is_none());
    assert!(matches!(
        mediator.send_stream(&ctx, Ticker),
        Err(MediatorError::Cancelled)
    ));
}

#[tokio::test]
async fn missing_stream_handler_is_reported() {
    let mediator = Mediator::builder().build().unwrap();
    let ctx = mediator.context();

    assert!(matches!(
        mediator.send_stream(&ctx, Ticker),
        Err(MediatorError::MissingHandler { kind: "stream", name: "ticker" })
    ));
}

#[derive(StreamRequest)]
#[stream_request(item = Option<String>)]
struct WhoAmI;

/// 在流内部读取环境上下文
struct WhoAmIHandler;

impl StreamRequestHandler<WhoAmI> for WhoAmIHandler {
    fn handle(&self, _ctx: Context, _request: Arc<WhoAmI>) -> ResultStream<Option<String>> {
        let stream = async_stream::stream! {
            for _ in 0..2 {
                yield Ok(Context::current().map(|c| c.correlation_id().to_string()));
            }
        };
        stream.boxed()
    }
}

/// 记录行为在转发元素时看到的关联 ID
struct AmbientRecorder {
    seen: Arc<std::sync::Mutex<Vec<Option<String>>>>,
}

impl StreamBehavior for AmbientRecorder {
    fn handle(
        &self,
        _ctx: Context,
        _request: Arc<dyn AnyMessage>,
        next: StreamNext<AnyItem>,
    ) -> ResultStream<AnyItem> {
        let seen = self.seen.clone();
        next.run()
            .inspect(move |_| {
                seen.lock()
                    .unwrap()
                    .push(Context::current().map(|c| c.correlation_id().to_string()));
            })
            .boxed()
    }
}

#[tokio::test]
async fn producer_and_behaviors_see_the_ambient_context() {
    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let mediator = Mediator::builder()
        .stream_handler::<WhoAmI, _>(Arc::new(WhoAmIHandler))
        .stream_behavior(Arc::new(AmbientRecorder { seen: seen.clone() }))
        .build()
        .unwrap();
    let ctx = mediator.context();
    let expected = Some(ctx.correlation_id().to_string());

    let items: Vec<_> = mediator
        .send_stream(&ctx, WhoAmI)
        .unwrap()
        .map(|item| item.unwrap())
        .collect()
        .await;

    assert_eq!(items, vec![expected.clone(), expected.clone()]);
    assert_eq!(*seen.lock().unwrap(), vec![expected.clone(), expected]);
    assert!(Context::current().is_none());
}
