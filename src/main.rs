// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use anyhow::{anyhow, Result};
use cert_injector::{
    config::{Config, LogFormat},
    constants::{
        ERROR_REQUEUE_DURATION_SECS, KIND_CERT_INJECTION, READY_REQUEUE_DURATION_SECS,
        TOKIO_WORKER_THREADS,
    },
    context::Context,
    crd::{CertInjection, HarborCluster, PackageInstall},
    errors::{error_category, is_terminal},
    extractors::CertSource,
    identity::TypeIdentity,
    labels::{enabled_selector, INJECTOR_APP_LABEL, INJECTOR_APP_NAME, OWNER_GVK_LABEL},
    metrics,
    reconcilers::{reconcile_certinjection, reconcile_source},
    server::{self, ServerState},
    store::{KubeStore, StoreResource},
};
use clap::Parser;
use futures::StreamExt;
use k8s_openapi::api::{apps::v1::DaemonSet, core::v1::Secret};
use kube::{
    runtime::{controller::Action, watcher::Config as WatcherConfig, Controller},
    Api, Client, Resource, ResourceExt,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

#[derive(Debug, thiserror::Error)]
#[error(transparent)]
struct ReconcileError(#[from] anyhow::Error);

type SharedContext = Arc<Context<KubeStore>>;

fn main() -> Result<()> {
    let config = Config::parse();

    // Build Tokio runtime with custom thread names
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(TOKIO_WORKER_THREADS)
        .thread_name("cert-injector")
        .enable_all()
        .build()?;

    runtime.block_on(async_main(config))
}

fn init_logging(format: LogFormat) {
    // Respects RUST_LOG if set, otherwise defaults to INFO level
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    match format {
        LogFormat::Json => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .json()
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }
}

async fn async_main(config: Config) -> Result<()> {
    init_logging(config.log_format);
    config.validate()?;

    info!(
        namespace = config.watch_namespace.as_deref().unwrap_or("<all>"),
        image = %config.injector_image,
        "Starting Harbor CA injector"
    );

    debug!("Initializing Kubernetes client");
    let client = Client::try_default().await?;
    debug!("Kubernetes client initialized successfully");

    let ctx: SharedContext = Arc::new(Context::new(
        KubeStore::new(client.clone()),
        config.injector_settings(),
        config.reconcile_timeout(),
    ));
    let state = Arc::new(ServerState::default());
    let namespace = config.watch_namespace.clone();

    info!("Starting all controllers");
    state.set_ready(true);

    // Controllers should never exit - if one fails, we log it and exit the main process
    let result = tokio::select! {
        result = run_source_controller::<HarborCluster>(client.clone(), ctx.clone(), namespace.clone()) => {
            error!("CRITICAL: HarborCluster controller exited unexpectedly: {:?}", result);
            result.and_then(|()| Err(anyhow!("HarborCluster controller exited unexpectedly without error")))
        }
        result = run_source_controller::<PackageInstall>(client.clone(), ctx.clone(), namespace.clone()) => {
            error!("CRITICAL: PackageInstall controller exited unexpectedly: {:?}", result);
            result.and_then(|()| Err(anyhow!("PackageInstall controller exited unexpectedly without error")))
        }
        result = run_source_controller::<Secret>(client.clone(), ctx.clone(), namespace.clone()) => {
            error!("CRITICAL: Secret controller exited unexpectedly: {:?}", result);
            result.and_then(|()| Err(anyhow!("Secret controller exited unexpectedly without error")))
        }
        result = run_certinjection_controller(client.clone(), ctx.clone(), namespace.clone()) => {
            error!("CRITICAL: CertInjection controller exited unexpectedly: {:?}", result);
            result.and_then(|()| Err(anyhow!("CertInjection controller exited unexpectedly without error")))
        }
        result = server::serve(config.metrics_bind_address, state.clone(), ctx.shutdown.clone()) => {
            error!("CRITICAL: Metrics server exited unexpectedly: {:?}", result);
            result.and_then(|()| Err(anyhow!("Metrics server exited unexpectedly without error")))
        }
        result = shutdown_signal() => {
            info!("Stopping all controllers...");
            result
        }
    };

    state.set_ready(false);
    ctx.shutdown.cancel();
    result
}

/// Resolves on SIGINT or, on unix, SIGTERM (pod termination).
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                info!("Received SIGINT, initiating graceful shutdown...");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM (pod termination), initiating graceful shutdown...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received SIGINT, initiating graceful shutdown...");
    }
    Ok(())
}

fn namespaced_or_all<K: StoreResource>(client: Client, namespace: Option<&str>) -> Api<K> {
    match namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    }
}

/// Run the controller of one source kind.
///
/// Only source objects carrying the opt-in label are watched. Records are watched
/// too, so a deleted or edited record is rebuilt from its source.
async fn run_source_controller<K>(
    client: Client,
    ctx: SharedContext,
    namespace: Option<String>,
) -> Result<()>
where
    K: CertSource,
{
    let kind = K::kind(&()).to_string();
    info!("Starting {} controller", kind);

    let sources = namespaced_or_all::<K>(client.clone(), namespace.as_deref());
    let records = namespaced_or_all::<CertInjection>(client, namespace.as_deref());
    let owned_records = format!(
        "{OWNER_GVK_LABEL}={}",
        TypeIdentity::of::<K>().label_value()
    );

    Controller::new(sources, WatcherConfig::default().labels(&enabled_selector()))
        .owns(records, WatcherConfig::default().labels(&owned_records))
        .run(reconcile_source_wrapper::<K>, error_policy::<K>, ctx)
        .for_each(|_| futures::future::ready(()))
        .await;

    Ok(())
}

/// Run the `CertInjection` controller
async fn run_certinjection_controller(
    client: Client,
    ctx: SharedContext,
    namespace: Option<String>,
) -> Result<()> {
    info!("Starting CertInjection controller");

    let records = namespaced_or_all::<CertInjection>(client.clone(), namespace.as_deref());
    let injectors = namespaced_or_all::<DaemonSet>(client, namespace.as_deref());
    let injector_selector = format!("{INJECTOR_APP_LABEL}={INJECTOR_APP_NAME}");

    Controller::new(records, WatcherConfig::default())
        .owns(injectors, WatcherConfig::default().labels(&injector_selector))
        .run(
            reconcile_certinjection_wrapper,
            error_policy::<CertInjection>,
            ctx,
        )
        .for_each(|_| futures::future::ready(()))
        .await;

    Ok(())
}

/// Outcome of a pass bounded by the context's reconcile timeout.
fn finish_pass(
    kind: &str,
    namespace: &str,
    name: &str,
    start: Instant,
    result: Result<()>,
) -> Result<Action, ReconcileError> {
    let duration = start.elapsed();
    match result {
        Ok(()) => {
            metrics::record_reconciliation_success(kind, duration);
            debug!(kind = %kind, namespace = %namespace, name = %name, "Successfully reconciled");
            Ok(Action::requeue(Duration::from_secs(READY_REQUEUE_DURATION_SECS)))
        }
        Err(e) => {
            metrics::record_reconciliation_error(kind, duration);
            error!(kind = %kind, namespace = %namespace, name = %name, "Failed to reconcile: {:#}", e);
            Err(e.into())
        }
    }
}

/// Reconcile wrapper shared by all source kinds
async fn reconcile_source_wrapper<K: CertSource>(
    source: Arc<K>,
    ctx: SharedContext,
) -> Result<Action, ReconcileError> {
    let kind = K::kind(&()).to_string();
    let namespace = source.namespace().unwrap_or_default();
    let name = source.name_any();
    let start = Instant::now();

    let cancel = ctx.pass_token();
    let result = tokio::time::timeout(
        ctx.reconcile_timeout,
        reconcile_source::<K, KubeStore>(&ctx, &namespace, &name, &cancel),
    )
    .await
    .unwrap_or_else(|_| {
        cancel.cancel();
        Err(anyhow!("reconcile timed out after {:?}", ctx.reconcile_timeout))
    });

    finish_pass(&kind, &namespace, &name, start, result)
}

/// Reconcile wrapper for `CertInjection`
async fn reconcile_certinjection_wrapper(
    record: Arc<CertInjection>,
    ctx: SharedContext,
) -> Result<Action, ReconcileError> {
    let namespace = record.namespace().unwrap_or_default();
    let name = record.name_any();
    let start = Instant::now();

    let cancel = ctx.pass_token();
    let result = tokio::time::timeout(
        ctx.reconcile_timeout,
        reconcile_certinjection::<KubeStore>(&ctx, &namespace, &name, &cancel),
    )
    .await
    .unwrap_or_else(|_| {
        cancel.cancel();
        Err(anyhow!("reconcile timed out after {:?}", ctx.reconcile_timeout))
    });

    finish_pass(KIND_CERT_INJECTION, &namespace, &name, start, result)
}

/// Error policy for all controllers
///
/// Terminal errors wait for the object to change; everything else is retried.
fn error_policy<K: Resource<DynamicType = ()>>(
    resource: Arc<K>,
    err: &ReconcileError,
    _ctx: SharedContext,
) -> Action {
    let kind = K::kind(&()).to_string();
    let category = error_category(&err.0);
    metrics::record_error(&kind, category);

    if is_terminal(&err.0) {
        warn!(kind = %kind, name = %resource.name_any(), error = %err, "Not retrying until the object changes");
        return Action::await_change();
    }

    metrics::record_reconciliation_requeue(&kind, category);
    Action::requeue(Duration::from_secs(ERROR_REQUEUE_DURATION_SECS))
}
