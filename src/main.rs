use std::path::Path;
use std::sync::Arc;

use lead_relay::config::Config;
use lead_relay::dispatch::{DispatchPipeline, Dispatcher};
use lead_relay::mail::ImapSource;
use lead_relay::resolver::LeadResolver;
use lead_relay::store::{LeadStore, LibSqlLeadStore};
use lead_relay::watcher::{MailboxWatcher, WatcherConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    eprintln!("📬 Lead Relay v{}", env!("CARGO_PKG_VERSION"));
    eprintln!(
        "   Mailbox: {}@{}:{} ({})",
        config.mail.user, config.mail.host, config.mail.port, config.mail.folder
    );
    eprintln!("   Webhook: {}", config.webhook.url);
    eprintln!("   CRM: {}", config.crm.base_url);
    eprintln!("   Lead DB: {}", config.lead_db_path);
    eprintln!(
        "   Poll every {}s, backoff {}s, max {} attempts\n",
        config.poll_interval.as_secs(),
        config.backoff_delay.as_secs(),
        config.max_connect_attempts
    );

    let store: Arc<dyn LeadStore> = Arc::new(
        LibSqlLeadStore::new_local(Path::new(&config.lead_db_path))
            .await
            .unwrap_or_else(|e| {
                eprintln!("Error: Failed to open lead store at {}: {e}", config.lead_db_path);
                std::process::exit(1);
            }),
    );

    let resolver = LeadResolver::new(store);
    let dispatcher: Arc<dyn Dispatcher> = Arc::new(DispatchPipeline::new(
        config.webhook.clone(),
        config.crm.clone(),
    ));
    let source = ImapSource::new(config.mail.clone());

    let watcher_config = WatcherConfig {
        poll_interval: config.poll_interval,
        backoff_delay: config.backoff_delay,
        max_attempts: config.max_connect_attempts,
    };

    let mut watcher = MailboxWatcher::new(source, resolver, dispatcher, watcher_config);
    if let Err(e) = watcher.run().await {
        tracing::error!(error = %e, "Watcher terminated");
        std::process::exit(1);
    }

    Ok(())
}
