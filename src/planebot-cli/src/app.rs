//! Process wiring: builds the bridge components from a [`BridgeConfig`]
//! and runs them.

use std::sync::Arc;

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use planebot_notify::{
    BridgeConfig, CommandHandler, DailySchedule, DispatchReport, LinkBuilder,
    NotificationPipeline, UserMappingStore, run_schedule,
};
use planebot_slack::{BotOptions, SlackBot};
use planebot_tracker::{PlaneClient, TrackerApi};
use tokio::sync::watch;
use tracing::{error, info};

use crate::webhook;

/// Components shared by the listener, the scheduler and one-shot runs.
pub struct Bridge {
    pub tracker: Arc<PlaneClient>,
    pub bot: Arc<SlackBot>,
    pub mapping: Arc<UserMappingStore>,
    pub pipeline: Arc<NotificationPipeline>,
}

impl Bridge {
    pub fn build(config: &BridgeConfig) -> anyhow::Result<Self> {
        let tracker = Arc::new(
            PlaneClient::new(config.tracker.clone()).context("failed to create tracker client")?,
        );

        let options = BotOptions {
            api_timeout: config.http_timeout,
            ..BotOptions::default()
        };
        let bot = Arc::new(
            SlackBot::with_options(config.slack.clone(), options)
                .context("failed to create Slack client")?,
        );

        let mapping = Arc::new(UserMappingStore::new(
            config.mapping_path.clone(),
            config.mapping_header,
        ));

        let links = LinkBuilder::new(config.app_url.clone(), config.tracker.workspace_slug());
        let pipeline = Arc::new(NotificationPipeline::new(
            tracker.clone(),
            bot.clone(),
            Arc::clone(&mapping),
            links,
            config.overview_channel.clone(),
        ));

        Ok(Self {
            tracker,
            bot,
            mapping,
            pipeline,
        })
    }

    fn command_handler(&self) -> CommandHandler {
        let tracker: Arc<dyn TrackerApi> = self.tracker.clone();
        CommandHandler::new(tracker, Arc::clone(&self.mapping))
    }
}

/// Today's date in the schedule timezone.
pub fn today(config: &BridgeConfig) -> anyhow::Result<NaiveDate> {
    let tz = config.timezone()?;
    Ok(Utc::now().with_timezone(&tz).date_naive())
}

/// One assignee notification run.
pub async fn notify_once(config: &BridgeConfig) -> anyhow::Result<DispatchReport> {
    let bridge = Bridge::build(config)?;
    Ok(bridge.pipeline.run_assignee_notifications().await?)
}

/// One digest run for `date`.
pub async fn digest_once(config: &BridgeConfig, date: NaiveDate) -> anyhow::Result<()> {
    let bridge = Bridge::build(config)?;
    let categorized = bridge.pipeline.run_daily_digest(date).await?;
    info!(
        issues = categorized.total(),
        unresolved = categorized.unresolved().len(),
        "Digest sent"
    );
    Ok(())
}

/// Resolves once `rx` reads `true` or its sender is gone.
async fn wait_for_shutdown(mut rx: watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

/// Run the Socket Mode listener, the scheduler and (when configured) the
/// webhook receiver until `shutdown` flips to `true`.
///
/// A listener that stops on its own (bad credentials) stops the others too.
pub async fn run(config: BridgeConfig, shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
    let schedule = DailySchedule::from_config(&config)?;
    let bridge = Bridge::build(&config)?;
    bridge.bot.set_command_handler(bridge.command_handler()).await;

    let (stop_tx, stop_rx) = watch::channel(false);

    let pipeline = Arc::clone(&bridge.pipeline);
    let scheduler = tokio::spawn(run_schedule(schedule, stop_rx.clone(), move |date| {
        let pipeline = Arc::clone(&pipeline);
        async move { pipeline.run_daily(date).await }
    }));

    let webhook = config.webhook_addr.map(|addr| {
        let log_path = config.webhook_log_path.clone();
        tokio::spawn(webhook::serve(addr, log_path, wait_for_shutdown(stop_rx.clone())))
    });

    let bot = Arc::clone(&bridge.bot);
    let mut listener = tokio::spawn(async move { bot.start().await });

    let listener_result = tokio::select! {
        result = &mut listener => result,
        _ = wait_for_shutdown(shutdown) => {
            info!("Shutdown requested, stopping planebot...");
            bridge.bot.shutdown();
            listener.await
        }
    };

    stop_tx.send_replace(true);
    bridge.bot.shutdown();

    if let Err(e) = scheduler.await {
        error!("Scheduler task failed: {}", e);
    }
    if let Some(webhook) = webhook {
        match webhook.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Webhook receiver failed: {}", e),
            Err(e) => error!("Webhook task failed: {}", e),
        }
    }

    listener_result
        .context("Slack listener task failed")?
        .context("Slack listener stopped")?;

    info!("planebot stopped");
    Ok(())
}
