use anyhow::{Context, Result};
use std::env;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use vkinder::bot::{run_long_poll, DialogueManager};
use vkinder::config::BotConfig;
use vkinder::db::PgStore;
use vkinder::localization::{detect_language, init_localization};
use vkinder::store::{MemoryStore, PreferenceStore};
use vkinder::vk::{LongPoll, MessageGateway, VkApi, VkClient};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json"));

    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    init_tracing();
    info!("Starting VKinder bot");

    let config = BotConfig::from_env()?;
    init_localization()?;
    let language = detect_language(Some(&config.language));

    let store: Arc<dyn PreferenceStore> = match &config.database_url {
        Some(url) => {
            info!("Connecting to PostgreSQL");
            Arc::new(
                PgStore::connect(url)
                    .await
                    .context("Failed to initialize the database")?,
            )
        }
        None => {
            warn!("DATABASE_URL not set, state will be kept in memory and lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    // Search and profile lookups need a user token, messaging needs the community token
    let user_client = Arc::new(VkClient::new(&config.user_token, &config.api_version, &config.recovery)?);
    let group_client = Arc::new(VkClient::new(&config.group_token, &config.api_version, &config.recovery)?);

    let api: Arc<dyn VkApi> = user_client;
    let gateway: Arc<dyn MessageGateway> = Arc::clone(&group_client) as Arc<dyn MessageGateway>;
    let dialogue = Arc::new(DialogueManager::new(
        store,
        api,
        gateway,
        config.search.clone(),
        language,
    ));

    info!(group_id = config.group_id, language, "Bot initialized, starting long poll");
    let poll = LongPoll::new(group_client, config.group_id);
    run_long_poll(poll, dialogue).await
}
