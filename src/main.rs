use dotenvy::dotenv;
use media_sweeper::bot::handlers::{self, Command};
use media_sweeper::bot::{callbacks, AdminCache, PendingActions};
use media_sweeper::config::{
    Settings, ADMIN_CACHE_MAX_CAPACITY, PENDING_ACTION_MAX_CAPACITY,
};
use media_sweeper::storage::{R2Storage, StorageProvider};
use media_sweeper::sweep::deleter::TelegramDeleter;
use media_sweeper::sweep::Sweeper;
use media_sweeper::watchlist::Watchlist;
use regex::Regex;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;
use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use teloxide::types::CallbackQuery;
use tracing::{error, info};
use tracing_subscriber::{prelude::*, EnvFilter};

/// Regex patterns for redacting the bot token from logs
struct RedactionPatterns {
    token_url: Regex,
    token_bare: Regex,
    token_prefixed: Regex,
}

impl RedactionPatterns {
    /// Initialize all regex patterns
    ///
    /// # Errors
    ///
    /// Returns an error if any regex pattern is invalid
    fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            token_url: Regex::new(r"(https?://[^/]+/bot)([0-9]+:[A-Za-z0-9_-]+)(/['\s]*)")?,
            token_bare: Regex::new(r"([0-9]{8,10}:[A-Za-z0-9_-]{35})")?,
            token_prefixed: Regex::new(r"(bot[0-9]{8,10}:)[A-Za-z0-9_-]+")?,
        })
    }

    fn redact(&self, input: &str) -> String {
        let mut output = input.to_string();
        output = self
            .token_url
            .replace_all(&output, "$1[TELEGRAM_TOKEN]$3")
            .to_string();
        output = self
            .token_bare
            .replace_all(&output, "[TELEGRAM_TOKEN]")
            .to_string();
        output = self
            .token_prefixed
            .replace_all(&output, "$1[TELEGRAM_TOKEN]")
            .to_string();
        output
    }
}

struct RedactingWriter<W: Write> {
    inner: W,
    patterns: Arc<RedactionPatterns>,
}

impl<W: Write> RedactingWriter<W> {
    const fn new(inner: W, patterns: Arc<RedactionPatterns>) -> Self {
        Self { inner, patterns }
    }
}

impl<W: Write> Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let s = String::from_utf8_lossy(buf);
        let redacted = self.patterns.redact(&s);
        self.inner.write_all(redacted.as_bytes())?;
        // We return the original buffer length to satisfy the contract,
        // even if the redacted string length differs.
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

struct RedactingMakeWriter<F> {
    make_inner: F,
    patterns: Arc<RedactionPatterns>,
}

impl<F> RedactingMakeWriter<F> {
    const fn new(make_inner: F, patterns: Arc<RedactionPatterns>) -> Self {
        Self {
            make_inner,
            patterns,
        }
    }
}

impl<'a, F, W> tracing_subscriber::fmt::MakeWriter<'a> for RedactingMakeWriter<F>
where
    F: Fn() -> W + 'static,
    W: Write,
{
    type Writer = RedactingWriter<W>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter::new((self.make_inner)(), self.patterns.clone())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file
    dotenv().ok();

    // Initialize redaction patterns early (before logging)
    let patterns = Arc::new(RedactionPatterns::new().map_err(|e| {
        eprintln!("Failed to compile regex patterns: {e}");
        e
    })?);

    init_logging(patterns);

    info!("Starting Media Sweeper bot...");

    let settings = init_settings();
    let storage = init_storage(&settings).await;
    let store: Arc<dyn StorageProvider> = storage;

    let watchlist = Arc::new(Watchlist::new(store.clone()));
    let admin_cache = Arc::new(AdminCache::new(
        settings.admin_cache_ttl_secs,
        ADMIN_CACHE_MAX_CAPACITY,
    ));
    let pending = Arc::new(PendingActions::new(
        settings.pending_action_ttl_secs,
        PENDING_ACTION_MAX_CAPACITY,
    ));

    let bot = Bot::new(settings.telegram_token.clone());

    // Background sweep over the ledger; runs for the life of the process
    let sweeper = Sweeper::new(
        store.clone(),
        Arc::new(TelegramDeleter::new(bot.clone())),
        Duration::from_secs(settings.sweep_interval_secs),
    );
    tokio::spawn(sweeper.run());

    let handler = schema();

    info!("Bot is running...");

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![store, watchlist, admin_cache, pending, settings])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

fn init_logging(patterns: Arc<RedactionPatterns>) {
    let make_writer = RedactingMakeWriter::new(io::stderr, patterns);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(make_writer))
        .init();
}

fn init_settings() -> Arc<Settings> {
    match Settings::new() {
        Ok(s) => {
            info!("Configuration loaded successfully.");
            Arc::new(s)
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    }
}

async fn init_storage(settings: &Settings) -> Arc<R2Storage> {
    match R2Storage::new(settings).await {
        Ok(s) => {
            info!("R2 Storage initialized.");
            if s.check_connection().await.is_ok() {
                // Success message already logged in check_connection
            } else {
                error!("R2 Storage connection check returned error.");
            }
            Arc::new(s)
        }
        Err(e) => {
            error!("Failed to initialize R2 Storage: {}", e);
            std::process::exit(1);
        }
    }
}

fn schema() -> UpdateHandler<teloxide::RequestError> {
    dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handle_callback_query))
        .branch(
            Update::filter_channel_post()
                .filter(|msg: Message| handlers::has_media(&msg))
                .endpoint(handle_channel_post),
        )
        .branch(
            Update::filter_message()
                .branch(
                    dptree::entry()
                        .filter_command::<Command>()
                        .endpoint(handle_command),
                )
                .branch(
                    dptree::filter(|msg: Message| handlers::is_channel_forward(&msg))
                        .endpoint(handle_channel_forward),
                )
                // Replies in any chat: custom-time prompts are answered in
                // groups too, and non-prompt replies fall through to ingestion
                .branch(
                    dptree::filter(|msg: Message| msg.reply_to_message().is_some())
                        .endpoint(handle_pending_reply),
                )
                .branch(
                    dptree::filter(|msg: Message| handlers::has_media(&msg))
                        .endpoint(handle_group_media),
                ),
        )
}

async fn handle_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    watchlist: Arc<Watchlist>,
    admin_cache: Arc<AdminCache>,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = handlers::handle_command(bot, msg, cmd, watchlist, admin_cache).await {
        error!("Command error: {}", e);
    }
    respond(())
}

async fn handle_callback_query(
    bot: Bot,
    q: CallbackQuery,
    watchlist: Arc<Watchlist>,
    admin_cache: Arc<AdminCache>,
    pending: Arc<PendingActions>,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = callbacks::handle_callback(bot, q, watchlist, admin_cache, pending).await {
        error!("Callback handler error: {}", e);
    }
    respond(())
}

async fn handle_group_media(
    msg: Message,
    store: Arc<dyn StorageProvider>,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = handlers::handle_group_media(msg, store).await {
        error!("Media ingestion error: {}", e);
    }
    respond(())
}

async fn handle_channel_post(
    msg: Message,
    store: Arc<dyn StorageProvider>,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = handlers::handle_channel_post(msg, store).await {
        error!("Channel post ingestion error: {}", e);
    }
    respond(())
}

async fn handle_channel_forward(bot: Bot, msg: Message) -> Result<(), teloxide::RequestError> {
    if let Err(e) = handlers::handle_channel_forward(bot, msg).await {
        error!("Channel forward handler error: {}", e);
    }
    respond(())
}

async fn handle_pending_reply(
    bot: Bot,
    msg: Message,
    pending: Arc<PendingActions>,
    store: Arc<dyn StorageProvider>,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = handlers::handle_pending_reply(bot, msg, pending, store).await {
        error!("Pending reply handler error: {}", e);
    }
    respond(())
}
