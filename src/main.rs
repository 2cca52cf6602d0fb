use std::{process, sync::Arc};

use rescache::{
    application::{articles::ArticleService, error::AppError},
    cache::{self, CacheConfig, CacheInterceptor},
    config,
    infra::{
        error::InfraError,
        http::{self, HttpState},
        memory::InMemoryArticlesRepo,
        telemetry,
    },
};
use tokio::signal;
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

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Purge(args) => run_purge(settings, args).await,
    }
}

async fn build_interceptor(settings: &config::Settings) -> Result<CacheInterceptor, AppError> {
    let cache_config = CacheConfig::from(&settings.cache);
    let store = cache::connect_store(&cache_config, &settings.redis.url)
        .await
        .map_err(|err| AppError::from(InfraError::store(cache_config.backend, err)))?;

    info!(
        target = "rescache::cache",
        enabled = cache_config.enabled,
        backend = ?cache_config.backend,
        namespace = %cache_config.namespace,
        ttl_seconds = cache_config.ttl_seconds(),
        "response cache ready"
    );
    Ok(CacheInterceptor::new(store, cache_config))
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let interceptor = build_interceptor(&settings).await?;
    let state = HttpState {
        articles: Arc::new(ArticleService::new(Arc::new(InMemoryArticlesRepo::new()))),
    };
    let router = http::build_router(state, interceptor);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::bind(settings.server.addr, err)))?;
    info!(target = "rescache::http", addr = %settings.server.addr, "listening");

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let server = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.await;
        })
        .into_future();
    let mut server = std::pin::pin!(server);

    tokio::select! {
        result = &mut server => {
            return result.map_err(|err| AppError::from(InfraError::Serve(err)));
        }
        () = shutdown_signal() => {}
    }

    info!(
        target = "rescache::http",
        grace_seconds = settings.server.graceful_shutdown.as_secs(),
        "shutting down"
    );
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(settings.server.graceful_shutdown, server).await {
        Ok(result) => result.map_err(|err| AppError::from(InfraError::Serve(err))),
        Err(_) => {
            warn!(
                target = "rescache::http",
                "graceful shutdown timed out, dropping open connections"
            );
            Ok(())
        }
    }
}

async fn run_purge(settings: config::Settings, args: config::PurgeArgs) -> Result<(), AppError> {
    let interceptor = build_interceptor(&settings).await?;
    let removed = interceptor
        .purge(&args.resource)
        .await
        .map_err(|err| AppError::from(InfraError::purge(&args.resource, err)))?;

    info!(
        target = "rescache::purge",
        resource = %args.resource,
        removed,
        "purged cached responses"
    );
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
