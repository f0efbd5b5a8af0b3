//! Runs long-lived app processes side by side and shuts them down together.
//!
//! - every process gets a child of one cancellation token
//! - SIGINT/SIGTERM, or the first process error, cancels all of them
//! - cancelled processes get a grace period to finish in-flight work before being aborted
//! - closers run last, bounded by their own timeout
//!
//! # Example
//!
//! ```no_run
//! use lake_runner::Runner;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     Runner::new()
//!         .with_app_process("ticker", |ctx| async move {
//!             loop {
//!                 tokio::select! {
//!                     _ = ctx.cancelled() => break,
//!                     _ = tokio::time::sleep(Duration::from_secs(1)) => tracing::info!("tick"),
//!                 }
//!             }
//!             Ok(())
//!         })
//!         .with_closer(|| async move { Ok(()) })
//!         .with_shutdown_grace(Duration::from_secs(10))
//!         .run()
//!         .await;
//! }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub type AppProcess = Box<
    dyn FnOnce(CancellationToken) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>
        + Send,
>;

pub type Closer =
    Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>> + Send>;

struct NamedProcess {
    name: String,
    process: AppProcess,
}

pub struct Runner {
    app_processes: Vec<NamedProcess>,
    closers: Vec<Closer>,
    shutdown_grace: Duration,
    closer_timeout: Duration,
    cancellation_token: CancellationToken,
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

impl Runner {
    /// Grace period and closer timeout both default to 10 seconds.
    pub fn new() -> Self {
        Self {
            app_processes: Vec::new(),
            closers: Vec::new(),
            shutdown_grace: Duration::from_secs(10),
            closer_timeout: Duration::from_secs(10),
            cancellation_token: CancellationToken::new(),
        }
    }

    pub fn with_app_process<F, Fut>(self, name: impl Into<String>, process: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.with_boxed_process(name, Box::new(move |token| Box::pin(process(token))))
    }

    pub fn with_boxed_process(mut self, name: impl Into<String>, process: AppProcess) -> Self {
        self.app_processes.push(NamedProcess {
            name: name.into(),
            process,
        });
        self
    }

    /// Closers run after every process has stopped, whatever the outcome.
    pub fn with_closer<F, Fut>(mut self, closer: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.closers.push(Box::new(move || Box::pin(closer())));
        self
    }

    /// How long cancelled processes may keep running before they are aborted.
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn with_closer_timeout(mut self, timeout: Duration) -> Self {
        self.closer_timeout = timeout;
        self
    }

    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = token;
        self
    }

    /// Run to completion and exit the process: code 0, or 1 if any process failed.
    pub async fn run(self) {
        match self.execute().await {
            Ok(()) => {
                info!("application exiting normally");
                std::process::exit(0);
            }
            Err(err) => {
                error!("application exiting with error: {:#}", err);
                std::process::exit(1);
            }
        }
    }

    /// Run every process until shutdown, then the closers. Returns the first process error.
    pub async fn execute(self) -> anyhow::Result<()> {
        let token = self.cancellation_token;
        let mut join_set = JoinSet::new();

        for NamedProcess { name, process } in self.app_processes {
            let process_token = token.child_token();
            debug!(process = %name, "starting app process");
            join_set.spawn(async move { (name, process(process_token).await) });
        }

        let signal_listener = tokio::spawn(wait_for_shutdown_signal(token.clone()));

        let mut first_error = None;
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                joined = join_set.join_next() => match joined {
                    None => break,
                    Some(Ok((name, Ok(())))) => {
                        debug!(process = %name, "app process completed");
                    }
                    Some(Ok((name, Err(err)))) => {
                        error!(process = %name, "app process failed: {:#}", err);
                        first_error = Some(err.context(format!("process {name} failed")));
                        token.cancel();
                    }
                    Some(Err(err)) => {
                        error!("app process panicked: {}", err);
                        first_error = Some(anyhow::anyhow!("app process panicked: {err}"));
                        token.cancel();
                    }
                },
            }
        }

        signal_listener.abort();
        drain(&mut join_set, self.shutdown_grace).await;

        if !self.closers.is_empty() {
            info!("running closers with timeout of {:?}", self.closer_timeout);
            if tokio::time::timeout(self.closer_timeout, run_closers(self.closers))
                .await
                .is_err()
            {
                error!("closers timed out after {:?}", self.closer_timeout);
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

async fn wait_for_shutdown_signal(token: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    result = tokio::signal::ctrl_c() => {
                        if let Err(err) = result {
                            error!("error listening for SIGINT: {}", err);
                            return;
                        }
                        info!("received SIGINT");
                    }
                    _ = sigterm.recv() => info!("received SIGTERM"),
                }
            }
            Err(err) => {
                error!("error setting up SIGTERM handler: {}", err);
                if tokio::signal::ctrl_c().await.is_err() {
                    return;
                }
                info!("received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("error listening for shutdown signal: {}", err);
            return;
        }
        info!("received shutdown signal");
    }

    token.cancel();
}

/// Wait up to `grace` for the remaining processes, then abort the stragglers.
async fn drain(join_set: &mut JoinSet<(String, anyhow::Result<()>)>, grace: Duration) {
    if join_set.is_empty() {
        return;
    }

    info!(
        remaining = join_set.len(),
        "waiting up to {:?} for app processes to stop", grace
    );

    let finished = tokio::time::timeout(grace, async {
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((name, Ok(()))) => debug!(process = %name, "app process stopped"),
                Ok((name, Err(err))) => {
                    warn!(process = %name, "app process failed during shutdown: {:#}", err)
                }
                Err(err) => warn!("app process panicked during shutdown: {}", err),
            }
        }
    })
    .await;

    if finished.is_err() {
        warn!(
            remaining = join_set.len(),
            "grace period elapsed, aborting app processes"
        );
        join_set.shutdown().await;
    }
}

async fn run_closers(closers: Vec<Closer>) {
    let mut closer_set = JoinSet::new();

    for closer in closers {
        closer_set.spawn(closer());
    }

    while let Some(result) = closer_set.join_next().await {
        match result {
            Ok(Ok(())) => debug!("closer completed"),
            Ok(Err(err)) => error!("closer error: {:#}", err),
            Err(err) => error!("closer panicked: {}", err),
        }
    }
}
