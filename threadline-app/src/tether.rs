//! Process wiring for the three subcommands.
use std::sync::Arc;

use anyhow::{Context, Result};
use threadline_actors::{
    builder::Builder,
    publisher::publish_hashtags,
    timeline::{JobConsumer, QueueSink, Timeline, timeline},
};
use threadline_api::AppState;
use threadline_config::ThreadlineConfig;
use threadline_queue::QueueConnection;
use threadline_social::{SocialApi, SocialRepository};
use threadline_store::{HashtagRepository, MongoStore, UserRepository};

const TIMELINE_MAILBOX: usize = 16;

async fn connect_store(cfg: &ThreadlineConfig) -> Result<MongoStore> {
    MongoStore::connect(
        &cfg.mongodb.uri,
        &cfg.mongodb.database,
        cfg.mongodb.timeout(),
    )
    .await
    .context("failed to set up the MongoDB client")
}

pub async fn run_api(cfg: &ThreadlineConfig) -> Result<()> {
    let store = connect_store(cfg).await?;
    let users = UserRepository::new(store.clone(), &cfg.mongodb.users_collection);
    let state = AppState::new(Arc::new(users), Arc::new(store.clone()));

    let addr = cfg.server.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    threadline_api::serve(listener, state, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "api.signal_failed");
        }
        tracing::info!("api.shutting_down");
    })
    .await?;

    store.shutdown().await;
    Ok(())
}

pub async fn run_worker(cfg: &ThreadlineConfig) -> Result<()> {
    let api = SocialApi::new(&cfg.social.base_url)?
        .with_page_size(cfg.social.page_size)
        .with_timeout(cfg.social.timeout())
        .with_retries(cfg.social.retries)
        .with_token(cfg.social.api_token.clone());
    let social = Arc::new(SocialRepository::new(api));
    let sink = Arc::new(QueueSink::new(&cfg.amqp.uri, &cfg.amqp.result_queue));

    let mut builder = Builder::new();
    let addr = builder.spawn::<Timeline>(
        "timeline",
        TIMELINE_MAILBOX,
        timeline(
            social,
            sink,
            cfg.worker.concurrency,
            cfg.worker.job_timeout(),
        ),
    );

    let consumer = JobConsumer::new(addr, &cfg.amqp.uri, &cfg.amqp.job_queue);
    builder.supervise("job-consumer", move || {
        let consumer = consumer.clone();
        async move { consumer.run_once().await }
    });

    tracing::info!(
        job_queue = %cfg.amqp.job_queue,
        result_queue = %cfg.amqp.result_queue,
        concurrency = cfg.worker.concurrency,
        "worker.started"
    );
    builder.run_until_ctrl_c().await
}

pub async fn run_publisher(cfg: &ThreadlineConfig) -> Result<()> {
    let store = connect_store(cfg).await?;
    let hashtags = HashtagRepository::new(store.clone(), &cfg.mongodb.hashtags_collection);

    let conn = QueueConnection::connect(&cfg.amqp.uri)
        .await
        .context("failed to connect to the broker")?;
    conn.declare(&cfg.amqp.job_queue).await?;
    let publisher = conn.publisher(&cfg.amqp.job_queue);

    let published = publish_hashtags(&hashtags, &publisher).await;

    if let Err(e) = conn.close().await {
        tracing::warn!(error = %e, "publisher.close_failed");
    }
    store.shutdown().await;

    let published = published?;
    tracing::info!(published, queue = %cfg.amqp.job_queue, "publisher.finished");
    Ok(())
}
