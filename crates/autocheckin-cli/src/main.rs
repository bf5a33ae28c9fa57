//! autocheckin - submits attendance check-ins for every stored user on a
//! fixed interval.

mod console;

use std::future::Future;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Local;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use autocheckin_core::api::ApiClient;
use autocheckin_core::auth::{
    CredentialPrompter, CredentialStore, FileCredentialStore, KeyringCredentialStore, TokenCache,
    TokenManager,
};
use autocheckin_core::{AttendanceRunner, Config, SecretBackend};

use console::ConsolePrompter;

/// Exit status after an interrupt (128 + SIGINT)
const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Log filter used when `RUST_LOG` is not set
const DEFAULT_LOG_FILTER: &str = "warn,autocheckin=info,autocheckin_core=info";

/// Initialize the tracing subscriber: stderr plus a daily log file.
fn init_tracing(log_dir: &Path) -> Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let file_appender = tracing_appender::rolling::daily(log_dir, "autocheckin.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(fmt::layer().with_ansi(false).with_writer(file_writer))
        .with(filter)
        .init();

    Ok(guard)
}

fn credential_store(config: &Config) -> Result<Arc<dyn CredentialStore>> {
    let path = config.credentials_path()?;
    Ok(match config.secret_backend {
        SecretBackend::File => Arc::new(FileCredentialStore::new(path)),
        SecretBackend::Keyring => Arc::new(KeyringCredentialStore::new(path)),
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let config = Config::load()?;
    let base_dir = config.base_dir()?;
    std::fs::create_dir_all(&base_dir)
        .with_context(|| format!("Failed to create {}", base_dir.display()))?;

    let _log_guard = init_tracing(&config.log_dir()?)?;
    info!(
        base_dir = %base_dir.display(),
        interval_minutes = config.interval_minutes,
        backend = ?config.secret_backend,
        "autocheckin starting"
    );

    let api = ApiClient::new(config.api_base_url.clone())?;
    let tokens = TokenManager::new(
        api.clone(),
        ConsolePrompter,
        credential_store(&config)?,
        TokenCache::new(base_dir),
    )
    .with_ttl(config.token_ttl()?)
    .with_max_recovery_attempts(config.max_recovery_attempts);
    let runner = AttendanceRunner::new(api, tokens);

    let _interrupt_watch = spawn_interrupt_watch(interrupt_signal()?, || {
        info!("Interrupted");
        std::process::exit(INTERRUPTED_EXIT_CODE);
    });

    run_schedule(&runner, config.interval()?).await;

    info!("autocheckin shutting down");
    Ok(())
}

/// Completes on the next SIGINT. The handler is installed before this returns.
#[cfg(unix)]
fn interrupt_signal() -> Result<impl Future<Output = ()> + Send + 'static> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupts =
        signal(SignalKind::interrupt()).context("Failed to install interrupt handler")?;
    Ok(async move {
        interrupts.recv().await;
    })
}

/// Completes on the next Ctrl-C. The handler is installed before this returns.
#[cfg(windows)]
fn interrupt_signal() -> Result<impl Future<Output = ()> + Send + 'static> {
    let mut interrupts =
        tokio::signal::windows::ctrl_c().context("Failed to install interrupt handler")?;
    Ok(async move {
        interrupts.recv().await;
    })
}

/// Run `on_interrupt` as soon as `interrupted` completes, independently of
/// whatever the schedule loop is doing at the time.
fn spawn_interrupt_watch<F, H>(interrupted: F, on_interrupt: H) -> JoinHandle<()>
where
    F: Future<Output = ()> + Send + 'static,
    H: FnOnce() + Send + 'static,
{
    tokio::spawn(async move {
        interrupted.await;
        on_interrupt();
    })
}

/// Run cycles until the operator declines a recovery.
async fn run_schedule<P: CredentialPrompter>(runner: &AttendanceRunner<P>, interval: Duration) {
    loop {
        info!(started_at = %Local::now().format("%Y-%m-%d %H:%M:%S"), "Check-in cycle starting");

        match runner.run_cycle().await {
            Ok(report) => {
                info!(
                    users = report.identities.len(),
                    checked_in = report.checked_in(),
                    "Check-in cycle finished"
                );
                if report.halted {
                    warn!("Operator chose not to update credentials, exiting");
                    return;
                }
            }
            Err(e) => {
                let detail = format!("{:#}", e);
                error!(error = %detail, "Check-in cycle failed");
            }
        }

        tokio::time::sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::oneshot;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_interrupt_is_handled_while_a_cycle_is_busy() {
        let (interrupt, interrupted) = oneshot::channel::<()>();
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();
        let watch = spawn_interrupt_watch(
            async move {
                let _ = interrupted.await;
            },
            move || flag.store(true, Ordering::SeqCst),
        );

        // A second cycle blocked on a prompt, long after the first sleep ended
        let busy = tokio::task::spawn_blocking(move || {
            std::thread::sleep(Duration::from_millis(20));
            interrupt.send(()).unwrap();
            std::thread::sleep(Duration::from_millis(200));
        });

        tokio::time::timeout(Duration::from_secs(5), watch)
            .await
            .expect("interrupt handler should run while the cycle is still busy")
            .unwrap();
        assert!(fired.load(Ordering::SeqCst));
        busy.await.unwrap();
    }

    #[tokio::test]
    async fn test_no_interrupt_no_handler() {
        let (_interrupt, interrupted) = oneshot::channel::<()>();
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();
        let watch = spawn_interrupt_watch(
            async move {
                let _ = interrupted.await;
            },
            move || flag.store(true, Ordering::SeqCst),
        );

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!fired.load(Ordering::SeqCst));
        assert!(!watch.is_finished());
        watch.abort();
    }
}
