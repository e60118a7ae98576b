//! # xtipipe environment state
//!
//! This module defines [`crate::env_state::XtiEnv`], the **shared environment object** passed to
//! every component that talks to the network or runs work in parallel. It provides:
//!
//! - A persistent **HTTP client** (catalog queries and archive downloads).
//! - A **tokio runtime** on which download batches are driven.
//! - A **bounded worker pool** helper used for downloads and compressions.
//!
//! ## Structure
//!
//! ```text
//! XtiEnv
//! ├── http_client       (reqwest::Client)
//! ├── runtime           (Arc<tokio::runtime::Runtime>)
//! ├── max_concurrent    (worker pool bound)
//! └── download_timeout  (per-file timeout)
//! ```
//!
//! ## Notes
//!
//! - [`XtiEnv`] is cheaply cloneable; clones share the same client and runtime.
//! - Every batch submitted through [`XtiEnv::run_bounded`] completes fully before the
//!   call returns, which is the synchronization barrier between pipeline stages.
//! - The blocking entry points must not be called from inside an async context.
use std::{future::Future, sync::Arc, time::Duration};

use reqwest::Client;
use tokio::{runtime::Runtime, sync::Semaphore, task::JoinSet};

use crate::{settings::AppConfig, xtipipe_errors::XtiPipeError};

#[derive(Debug, Clone)]
pub struct XtiEnv {
    pub http_client: Client,
    runtime: Arc<Runtime>,
    pub max_concurrent: usize,
    pub download_timeout: Duration,
}

impl XtiEnv {
    /// Create a new environment from the loaded configuration
    ///
    /// Arguments
    /// ---------
    /// * `config`: provides the worker pool bound and the per-file timeout
    ///
    /// Return
    /// ------
    /// * A new [`XtiEnv`], or an error if the HTTP client or runtime cannot be built
    pub fn new(config: &AppConfig) -> Result<Self, XtiPipeError> {
        let http_client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .user_agent(concat!("xtipipe/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;

        Ok(XtiEnv {
            http_client,
            runtime: Arc::new(runtime),
            max_concurrent: config.max_concurrent.max(1),
            download_timeout: config.download_timeout(),
        })
    }

    /// Drive a future to completion on the shared runtime.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    /// Blocking GET returning the response body as text.
    ///
    /// Arguments
    /// ---------
    /// * `url`: the requested URL
    /// * `query`: query string parameters, repeated keys allowed
    ///
    /// Return
    /// ------
    /// * The body on a success status, otherwise a [`XtiPipeError::Download`]
    pub fn get_text(&self, url: &str, query: &[(&str, &str)]) -> Result<String, XtiPipeError> {
        self.block_on(async {
            let response = self.http_client.get(url).query(query).send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(XtiPipeError::Download {
                    url: url.to_string(),
                    reason: format!("HTTP status {status}"),
                });
            }
            Ok(response.text().await?)
        })
    }

    /// Run independent blocking jobs on at most `max_concurrent` threads.
    ///
    /// Results are returned in completion order; the call returns only once
    /// every job has finished.
    ///
    /// Arguments
    /// ---------
    /// * `jobs`: closures with no ordering dependency between them
    ///
    /// Return
    /// ------
    /// * The job results, or [`XtiPipeError::WorkerPool`] if a worker could not be joined
    pub fn run_bounded<T, F>(&self, jobs: Vec<F>) -> Result<Vec<T>, XtiPipeError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let limit = Arc::new(Semaphore::new(self.max_concurrent));
        self.block_on(async move {
            let mut workers = JoinSet::new();
            for job in jobs {
                let permit = limit
                    .clone()
                    .acquire_owned()
                    .await
                    .map_err(|e| XtiPipeError::WorkerPool(e.to_string()))?;
                workers.spawn_blocking(move || {
                    let _permit = permit;
                    job()
                });
            }

            let mut results = Vec::with_capacity(workers.len());
            while let Some(joined) = workers.join_next().await {
                results.push(joined.map_err(|e| XtiPipeError::WorkerPool(e.to_string()))?);
            }
            Ok(results)
        })
    }
}
