use anyhow::{Context, Result};
use gitlink::accounts::SqliteAccountStore;
use gitlink::api::{create_router, OAuthAppState};
use gitlink::config::{load_config_or_default, RequiredEnv};
use gitlink::credentials::{generate_key, CredentialCipher};
use gitlink::github::GitHubOAuth;
use gitlink::link::{run_state_cleanup, LinkManager, LinkOptions, StateManager};
use secrecy::ExposeSecret;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gitlink=info,tower_http=info".into()),
        )
        .init();

    if std::env::args().nth(1).as_deref() == Some("keygen") {
        println!("{}", generate_key());
        return Ok(());
    }

    info!("gitlink starting...");

    let config_path =
        std::env::var("GITLINK_CONFIG").unwrap_or_else(|_| "gitlink.toml".to_string());
    let config = load_config_or_default(&config_path).context("Failed to load configuration")?;

    // Missing or malformed secrets abort startup
    let env = RequiredEnv::from_env().context("Invalid environment configuration")?;

    info!(
        config_path = %config_path,
        callback_base_url = %env.callback_base_url,
        listen_addr = %config.server.listen_addr,
        require_state = config.oauth.require_state,
        "Configuration loaded"
    );

    let cipher = Arc::new(
        CredentialCipher::from_base64_key(env.encryption_key.expose_secret())
            .context("Failed to initialize credential cipher")?,
    );

    let store = Arc::new(
        SqliteAccountStore::new(
            &env.database_url,
            Duration::from_secs(config.timeouts.store_seconds),
        )
        .context("Failed to initialize account store")?,
    );
    info!("Account store initialized");

    let provider = Arc::new(
        GitHubOAuth::new(
            &config.oauth,
            env.client_id.clone(),
            env.client_secret,
            Duration::from_secs(config.timeouts.http_seconds),
        )
        .context("Failed to build OAuth client")?,
    );

    let states = StateManager::with_limits(
        config.oauth.state_expiry_seconds,
        config.oauth.max_pending_states_per_user,
        config.oauth.max_pending_states,
    );
    tokio::spawn(run_state_cleanup(
        states.clone(),
        config.oauth.state_cleanup_interval_seconds,
    ));

    let link_manager = Arc::new(LinkManager::new(
        cipher,
        store,
        provider,
        states,
        LinkOptions {
            callback_base_url: env.callback_base_url,
            require_state: config.oauth.require_state,
        },
    ));

    let router = create_router(OAuthAppState {
        link_manager,
        complete_url: config.server.complete_url.clone(),
    });

    let listener = tokio::net::TcpListener::bind(&config.server.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.listen_addr))?;
    info!(addr = %config.server.listen_addr, "OAuth callback server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await
        .context("HTTP server error")?;

    info!("gitlink stopped");
    Ok(())
}
