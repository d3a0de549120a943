use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use wab_api::ApiState;
use wab_core::{
    bot::{BotConfig, BotDeps, BotProcess},
    clinical::{HandoffSource, MemoryClinicalStore, ShiftRepository},
    config::{Config, SessionBackend},
    messaging::{client::SessionClient, port::MessagingPort, throttled::ThrottledMessenger},
    scheduler::HandoffScheduler,
    session_store::{FileSessionStore, MemorySessionStore, SessionStore, SessionVault},
    settings::{SettingsSource, StaticSettingsSource},
};
use wab_firestore::{FirestoreClient, FirestoreClinicalStore, FirestoreSessionStore, FirestoreSettingsSource};
use wab_gateway::{EventPump, GatewayClient};
use wab_postgres::PgSessionStore;

const EVENT_BUFFER: usize = 256;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    wab_core::logging::init("wab")?;

    let cfg = Config::load()?;
    let shutdown = CancellationToken::new();

    let vault = SessionVault::new(session_store(&cfg).await?);
    tracing::info!(backend = vault.backend_name(), client_id = %cfg.client_id, "session store ready");

    let gateway = GatewayClient::new(cfg.gateway_url.clone(), cfg.client_id.clone(), cfg.gateway_token.clone())?;
    let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
    let pump = EventPump::new(gateway.clone(), events_tx).spawn(shutdown.clone());

    let client: Arc<dyn SessionClient> = Arc::new(gateway.clone());
    let messenger: Arc<dyn MessagingPort> = Arc::new(ThrottledMessenger::new(Arc::new(gateway), cfg.throttle));
    let (shifts, handoffs, settings) = clinical_sources(&cfg);

    let (process, bot) = BotProcess::new(
        BotConfig::from_config(&cfg),
        BotDeps {
            client,
            messenger,
            vault,
            shifts,
            handoffs,
            settings,
        },
        events_rx,
    );

    let scheduler = HandoffScheduler::new(bot.clone());
    scheduler.start().await;

    let api = tokio::spawn(wab_api::serve(
        cfg.api_addr,
        ApiState::new(bot, cfg.api_token.clone()),
        shutdown.clone(),
    ));

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("ctrl-c received, shutting down");
            }
            shutdown.cancel();
        });
    }

    let result = process.run(shutdown.clone()).await;

    shutdown.cancel();
    scheduler.stop().await;
    let _ = pump.await;
    match api.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(error = %e, "bot api failed"),
        Err(e) => tracing::error!(error = %e, "bot api task panicked"),
    }

    result.context("bot process failed")
}

async fn session_store(cfg: &Config) -> anyhow::Result<Arc<dyn SessionStore>> {
    let store: Arc<dyn SessionStore> = match cfg.session_backend {
        SessionBackend::File => Arc::new(FileSessionStore::new(cfg.session_dir.clone())),
        SessionBackend::Memory => {
            tracing::warn!("memory session store: the linked session is lost on restart");
            Arc::new(MemorySessionStore::new())
        }
        SessionBackend::Firestore => {
            let fs = cfg
                .firestore
                .as_ref()
                .context("firestore session backend requires FIRESTORE_PROJECT_ID")?;
            Arc::new(FirestoreSessionStore::new(
                FirestoreClient::new(fs),
                cfg.session_collection.clone(),
            ))
        }
        SessionBackend::Postgres => {
            let url = cfg
                .database_url
                .as_deref()
                .context("postgres session backend requires DATABASE_URL")?;
            Arc::new(PgSessionStore::connect(url).await?)
        }
    };
    Ok(store)
}

// Shared Firestore documents when a project is configured, env fallback otherwise.
fn clinical_sources(
    cfg: &Config,
) -> (
    Arc<dyn ShiftRepository>,
    Arc<dyn HandoffSource>,
    Arc<dyn SettingsSource>,
) {
    let Some(fs) = &cfg.firestore else {
        tracing::info!("no firestore project configured; shifts kept in memory, settings from env");
        let clinical = Arc::new(MemoryClinicalStore::new());
        let settings: Arc<dyn SettingsSource> = Arc::new(StaticSettingsSource::new(cfg.fallback_settings.clone()));
        let shifts: Arc<dyn ShiftRepository> = clinical.clone();
        let handoffs: Arc<dyn HandoffSource> = clinical;
        return (shifts, handoffs, settings);
    };

    let client = FirestoreClient::new(fs);
    let clinical = Arc::new(FirestoreClinicalStore::new(client.clone()));
    let settings: Arc<dyn SettingsSource> =
        Arc::new(FirestoreSettingsSource::new(client, cfg.fallback_settings.clone()));
    let shifts: Arc<dyn ShiftRepository> = clinical.clone();
    let handoffs: Arc<dyn HandoffSource> = clinical;
    (shifts, handoffs, settings)
}
