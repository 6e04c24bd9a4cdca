use std::{future::IntoFuture, net::SocketAddr, process, sync::Arc, time::Duration};

use bytes::Bytes;
use hiremebahamas::{
    application::{error::AppError, listings::ListingService},
    cache::{CacheConfig, TtlCache},
    config::{self, RateLimitSettings},
    infra::{
        cache_warmer::CacheWarmer,
        db::PostgresRepositories,
        error::InfraError,
        http::{self, HttpOptions, HttpState},
        telemetry,
    },
    rate_limit::{RateLimiter, RedisCounter},
};
use tokio::{net::TcpListener, sync::watch, try_join};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::CheckConfig => {
            info!(
                target = "hiremebahamas::config",
                addr = %settings.server.addr,
                admin_addr = %settings.server.admin_addr,
                trust_forwarded_headers = settings.rate_limit.trust_forwarded_headers,
                database_configured = settings.database.url.is_some(),
                redis_configured = settings.rate_limit.redis_url.is_some(),
                cache_max_entries = ?settings.cache.max_entries,
                rate_limit = settings.rate_limit.max_requests.get(),
                rate_limit_window_seconds = settings.rate_limit.window_seconds.get(),
                "configuration is valid"
            );
            Ok(())
        }
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let url = settings
        .database
        .url
        .as_deref()
        .ok_or_else(|| InfraError::configuration("database.url is required to serve"))?;
    let pool = PostgresRepositories::connect(url, settings.database.max_connections.get())
        .await
        .map_err(|err| InfraError::database(err.to_string()))?;
    let repositories = Arc::new(PostgresRepositories::new(pool));
    repositories
        .health_check()
        .await
        .map_err(|err| InfraError::database(format!("database is not reachable: {err}")))?;
    info!(
        target = "hiremebahamas::db",
        max_connections = settings.database.max_connections.get(),
        "database pool ready"
    );

    let cache_config = CacheConfig::from(&settings.cache);
    let cache = Arc::new(TtlCache::<Bytes>::new(&cache_config));
    let listings = ListingService::new(repositories, cache, cache_config.listing_ttl());
    let limiter = Arc::new(build_rate_limiter(&settings.rate_limit).await);

    if cache_config.warm_on_startup {
        let warmer = CacheWarmer::new(listings.clone(), settings.pagination.default_limit.get());
        if let Err(err) = warmer.warm_initial().await {
            warn!(
                target = "hiremebahamas::cache_warmer",
                error = %err,
                "cache warm-up failed; continuing with a cold cache"
            );
        }
    }

    let state = HttpState::new(listings, limiter, HttpOptions::from_settings(&settings));
    serve_http(&settings, state).await
}

async fn build_rate_limiter(settings: &RateLimitSettings) -> RateLimiter {
    let policy = settings.policy();

    let Some(url) = settings.redis_url.as_deref() else {
        info!(
            target = "hiremebahamas::rate_limit",
            limit = policy.limit,
            window_seconds = policy.window_secs(),
            "rate limiting in-process"
        );
        return RateLimiter::local(policy);
    };

    match RedisCounter::connect(url, settings.redis_timeout).await {
        Ok(counter) => {
            info!(
                target = "hiremebahamas::rate_limit",
                limit = policy.limit,
                window_seconds = policy.window_secs(),
                local_fallback = settings.local_fallback,
                "rate limiting through redis"
            );
            RateLimiter::with_remote(policy, Arc::new(counter), settings.local_fallback)
        }
        Err(err) => {
            warn!(
                target = "hiremebahamas::rate_limit",
                error = %err,
                "redis unavailable at startup; rate limiting in-process"
            );
            RateLimiter::local(policy)
        }
    }
}

async fn serve_http(settings: &config::Settings, state: HttpState) -> Result<(), AppError> {
    let public_addr = settings.server.addr;
    let admin_addr = settings.server.admin_addr;
    let public_listener = bind(public_addr).await?;
    let admin_listener = bind(admin_addr).await?;
    info!(
        target = "hiremebahamas::http",
        public_addr = %public_addr,
        admin_addr = %admin_addr,
        "listening"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown_tx.send_replace(true);
    });

    let public_server = axum::serve(
        public_listener,
        http::build_router(state.clone()).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(wait_for_shutdown(shutdown_rx.clone()));
    let admin_server = axum::serve(
        admin_listener,
        http::build_admin_router(state).into_make_service(),
    )
    .with_graceful_shutdown(wait_for_shutdown(shutdown_rx.clone()));

    let grace = settings.server.graceful_shutdown;
    tokio::select! {
        result = async {
            try_join!(public_server.into_future(), admin_server.into_future())
        } => {
            result
                .map(|_| ())
                .map_err(|err| AppError::unexpected(format!("server error: {err}")))
        }
        _ = drain_deadline(shutdown_rx, grace) => {
            warn!(
                target = "hiremebahamas::http",
                grace_seconds = grace.as_secs(),
                "graceful shutdown timed out; dropping open connections"
            );
            Ok(())
        }
    }
}

async fn bind(addr: SocketAddr) -> Result<TcpListener, InfraError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| InfraError::Bind { addr, source })
}

/// Resolves once shutdown is requested, or when the signal task is gone.
async fn wait_for_shutdown(mut shutdown: watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stopping| *stopping).await;
}

async fn drain_deadline(shutdown: watch::Receiver<bool>, grace: Duration) {
    wait_for_shutdown(shutdown).await;
    tokio::time::sleep(grace).await;
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(target = "hiremebahamas::http", error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(target = "hiremebahamas::http", error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!(target = "hiremebahamas::http", "shutdown signal received");
}
