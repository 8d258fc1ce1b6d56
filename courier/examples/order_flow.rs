use anyhow::Result;
use async_trait::async_trait;
use courier::dispatch::TransportDispatcher;
use courier::options::{OutboxOptions, PublisherOptions};
use courier::pipeline::logging::{LoggingBehavior, LoggingEnrichmentBehavior};
use courier::pipeline::validation::RequestValidator;
use courier::{
    AnyEvent, Context, DistributionMode, Event, EventHandler, Mediator, MediatorError,
    MediatorOptions, MediatorResult, PublishMode, Request, RequestHandler,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Request)]
#[request(response = u64, name = "orders.place")]
struct PlaceOrder {
    customer: String,
    amount: u64,
}

#[derive(Debug, Serialize, Event)]
#[event(name = "orders.placed")]
struct OrderPlaced {
    order_id: u64,
    customer: String,
    amount: u64,
}

#[derive(Debug, Serialize, Event)]
#[event(name = "orders.audit")]
struct OrderAudited {
    order_id: u64,
}

struct PlaceOrderHandler;

#[async_trait]
impl RequestHandler<PlaceOrder> for PlaceOrderHandler {
    async fn handle(&self, ctx: &Context, request: &PlaceOrder) -> MediatorResult<u64> {
        let order_id = 1001;
        // 订单事件写入发件箱，提交后再投递
        ctx.publish_event(
            OrderPlaced {
                order_id,
                customer: request.customer.clone(),
                amount: request.amount,
            },
            PublishMode::Default,
            DistributionMode::UNDEFINED,
        )
        .await?;
        ctx.publish_event(
            OrderAudited { order_id },
            PublishMode::Outbox,
            DistributionMode::EXTERNAL,
        )
        .await?;
        Ok(order_id)
    }
}

struct PositiveAmount;

#[async_trait]
impl RequestValidator<PlaceOrder> for PositiveAmount {
    async fn validate(&self, _ctx: &Context, request: &PlaceOrder) -> MediatorResult<()> {
        if request.amount == 0 {
            return Err(MediatorError::Validation(vec!["amount must be positive".into()]));
        }
        Ok(())
    }
}

struct SendConfirmation;

#[async_trait]
impl EventHandler<OrderPlaced> for SendConfirmation {
    async fn handle(&self, ctx: &Context, event: &OrderPlaced) -> MediatorResult<()> {
        tracing::info!(
            correlation_id = %ctx.correlation_id(),
            order_id = event.order_id,
            customer = %event.customer,
            "confirmation sent"
        );
        Ok(())
    }
}

/// 只打印事件内容的外部传输
struct StdoutTransport;

#[async_trait]
impl TransportDispatcher for StdoutTransport {
    async fn dispatch(&self, _ctx: &Context, event: &dyn AnyEvent) -> MediatorResult<()> {
        let payload = event
            .to_json()
            .map_err(|e| MediatorError::transport(e.to_string()))?;
        println!("-> {}: {payload}", event.name());
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let options = MediatorOptions::builder()
        .publisher(PublisherOptions::builder().default_mode(PublishMode::Outbox).build())
        .outbox(
            OutboxOptions::builder()
                .initial_retry_delay(Duration::from_millis(200))
                .build(),
        )
        .build();

    let mediator = Mediator::builder()
        .options(options)
        .request_handler::<PlaceOrder, _>(Arc::new(PlaceOrderHandler))
        .event_handler::<OrderPlaced, _>(Arc::new(SendConfirmation))
        .event::<OrderAudited>()
        .publish_trait::<OrderPlaced>(DistributionMode::LOCAL_AND_EXTERNAL)
        .request_behavior(Arc::new(LoggingEnrichmentBehavior))
        .request_behavior(Arc::new(LoggingBehavior))
        .event_behavior(Arc::new(LoggingBehavior))
        .validator::<PlaceOrder, _>(Arc::new(PositiveAmount))
        .transport(Arc::new(StdoutTransport))
        .enable_cqrs_boundary_enforcement()
        .build()?;

    println!("=== 下单 ===");
    let ctx = mediator.context_builder().metadata("tenant", "acme").build();
    let order_id = mediator
        .send_with_response(
            &ctx,
            PlaceOrder {
                customer: "alice".into(),
                amount: 42,
            },
        )
        .await?;
    println!("order placed: {order_id}");
    println!(
        "pending outbox entries: {}",
        mediator.outbox().pending(&ctx).await?.len()
    );

    println!("\n=== 提交发件箱 ===");
    ctx.commit_outbox().await?;
    println!(
        "pending outbox entries: {}",
        mediator.outbox().pending(&ctx).await?.len()
    );

    println!("\n=== 校验失败 ===");
    let ctx = mediator.context();
    if let Err(e) = mediator
        .send_with_response(
            &ctx,
            PlaceOrder {
                customer: "bob".into(),
                amount: 0,
            },
        )
        .await
    {
        println!("rejected: {e}");
    }

    Ok(())
}
