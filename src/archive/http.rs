//! HTTP archive clients.
//!
//! [`HttpArchive`] walks the HTML directory index served by the archive,
//! the way a recursive `wget -r -np -R 'index*'` would, then downloads every
//! listed file. [`UrlListArchive`] skips the crawl and uses a list of file
//! URLs prepared beforehand.
//!
//! Both use [`download_all`]: files are streamed to `<file>.part` and renamed
//! once complete, at most `max_concurrent` at a time, each bounded by the
//! configured per-file timeout.
use std::{collections::VecDeque, sync::Arc};

use camino::{Utf8Path, Utf8PathBuf};
use indicatif::{ProgressBar, ProgressStyle};
use once_cell::sync::OnceCell;
use regex::Regex;
use reqwest::Client;
use tokio::{fs::File, io::AsyncWriteExt, sync::Semaphore, task::JoinSet};
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

use crate::{
    archive::{ArchivePath, ArchiveSource, DownloadFailure, DownloadReport, RemoteFile},
    env_state::XtiEnv,
    xtipipe_errors::XtiPipeError,
};

/// Crawler over the archive's HTTPS directory listing.
#[derive(Debug, Clone)]
pub struct HttpArchive {
    env: XtiEnv,
    base_url: String,
}

impl HttpArchive {
    pub fn new(env: XtiEnv, base_url: impl Into<String>) -> Self {
        HttpArchive {
            env,
            base_url: base_url.into(),
        }
    }

    /// List every file below `path`, following subdirectory links only.
    fn crawl(&self, path: &ArchivePath) -> Result<Vec<RemoteFile>, XtiPipeError> {
        let root = path.url(&self.base_url);
        let local_root = Utf8PathBuf::from(&path.obsid).join(&path.subpath);

        let mut pending = VecDeque::from([root.clone()]);
        let mut files = Vec::new();
        while let Some(dir_url) = pending.pop_front() {
            let listing = self.env.get_text(&dir_url, &[])?;
            for link in index_links(&listing)? {
                let url = format!("{dir_url}{link}");
                if link.ends_with('/') {
                    pending.push_back(url);
                } else if let Some(rest) = url.strip_prefix(&root) {
                    files.push(RemoteFile {
                        relative: local_root.join(rest),
                        url,
                    });
                }
            }
        }
        debug!("{} files listed under {root}", files.len());
        Ok(files)
    }
}

impl ArchiveSource for HttpArchive {
    fn fetch(&self, path: &ArchivePath, dest: &Utf8Path) -> Result<DownloadReport, XtiPipeError> {
        let files = match self.crawl(path) {
            Ok(files) => files,
            Err(e) => {
                warn!("Unable to list {path}: {e}");
                return Ok(DownloadReport {
                    failures: vec![DownloadFailure {
                        source: path.url(&self.base_url),
                        reason: e.to_string(),
                    }],
                    ..Default::default()
                });
            }
        };
        download_all(&self.env, files, dest)
    }
}

/// Archive variant driven by an explicit list of file URLs.
#[derive(Debug, Clone)]
pub struct UrlListArchive {
    env: XtiEnv,
    urls: Vec<String>,
}

impl UrlListArchive {
    pub fn new(env: XtiEnv, urls: Vec<String>) -> Self {
        UrlListArchive { env, urls }
    }

    /// Read one URL per line; blank lines and `#` comments are ignored.
    pub fn from_file(env: XtiEnv, path: &Utf8Path) -> Result<Self, XtiPipeError> {
        let contents = std::fs::read_to_string(path)?;
        let urls = contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string)
            .collect();
        Ok(UrlListArchive::new(env, urls))
    }
}

impl ArchiveSource for UrlListArchive {
    fn fetch(&self, path: &ArchivePath, dest: &Utf8Path) -> Result<DownloadReport, XtiPipeError> {
        download_all(&self.env, select_urls(&self.urls, path), dest)
    }
}

/// Keep the URLs lying under `/{obsid}/{subpath}/` and map them to local paths.
fn select_urls(urls: &[String], path: &ArchivePath) -> Vec<RemoteFile> {
    let marker = format!("/{}/{}/", path.obsid, path.subpath);
    let local_root = Utf8PathBuf::from(&path.obsid).join(&path.subpath);
    urls.iter()
        .filter_map(|url| {
            let (_, rest) = url.split_once(&marker)?;
            (!rest.is_empty() && !rest.ends_with('/')).then(|| RemoteFile {
                url: url.clone(),
                relative: local_root.join(rest),
            })
        })
        .collect()
}

fn href_regex() -> Result<&'static Regex, XtiPipeError> {
    static HREF: OnceCell<Regex> = OnceCell::new();
    HREF.get_or_try_init(|| Regex::new(r#"(?i)href\s*=\s*"([^"]+)""#))
        .map_err(XtiPipeError::from)
}

/// Relative links of a directory index page, without parent, sort or index links.
pub(crate) fn index_links(html: &str) -> Result<Vec<String>, XtiPipeError> {
    let links = href_regex()?
        .captures_iter(html)
        .filter_map(|cap| cap.get(1).map(|m| m.as_str()))
        .filter(|link| {
            !(link.starts_with('?')
                || link.starts_with('/')
                || link.starts_with('#')
                || link.starts_with("..")
                || link.contains("://")
                || link.starts_with("index"))
        })
        .map(str::to_string)
        .collect();
    Ok(links)
}

enum FetchStatus {
    Downloaded,
    Kept,
}

/// Download a list of files concurrently under `dest`.
///
/// Arguments
/// ---------
/// * `env`: provides the HTTP client, the worker bound and the per-file timeout
/// * `files`: files to retrieve, with their path relative to `dest`
/// * `dest`: destination root
///
/// Return
/// ------
/// * A [`DownloadReport`]; per-file errors are recorded in it, only a worker
///   join failure is returned as an error
pub(crate) fn download_all(
    env: &XtiEnv,
    files: Vec<RemoteFile>,
    dest: &Utf8Path,
) -> Result<DownloadReport, XtiPipeError> {
    let pb = progress_bar(files.len() as u64);
    let limit = Arc::new(Semaphore::new(env.max_concurrent));
    let timeout = env.download_timeout;

    env.block_on(async {
        let mut workers = JoinSet::new();
        for file in files {
            let permit = limit
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| XtiPipeError::WorkerPool(e.to_string()))?;
            let client = env.http_client.clone();
            let target = dest.join(&file.relative);
            workers.spawn(async move {
                let _permit = permit;
                let result =
                    match tokio::time::timeout(timeout, download_file(&client, &file.url, &target))
                        .await
                    {
                        Ok(result) => result,
                        Err(_) => Err(XtiPipeError::DownloadTimeout(file.url.clone())),
                    };
                if result.is_err() {
                    let _ = tokio::fs::remove_file(part_path(&target)).await;
                }
                (file.url, target, result)
            });
        }

        let mut report = DownloadReport::default();
        while let Some(joined) = workers.join_next().await {
            let (url, target, result) =
                joined.map_err(|e| XtiPipeError::WorkerPool(e.to_string()))?;
            match result {
                Ok(FetchStatus::Downloaded) => report.fetched.push(target),
                Ok(FetchStatus::Kept) => report.kept.push(target),
                Err(e) => {
                    warn!("{e}");
                    report.failures.push(DownloadFailure {
                        source: url,
                        reason: e.to_string(),
                    });
                }
            }
            pb.inc(1);
        }
        pb.finish_and_clear();
        info!(
            "{} downloaded, {} up to date, {} failed",
            report.fetched.len(),
            report.kept.len(),
            report.failures.len()
        );
        Ok::<_, XtiPipeError>(report)
    })
}

/// Stream one file to `<target>.part` then rename it to `target`.
///
/// An existing non-empty `target` whose size equals the announced length is kept.
async fn download_file(
    client: &Client,
    url: &str,
    target: &Utf8Path,
) -> Result<FetchStatus, XtiPipeError> {
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(XtiPipeError::Download {
            url: url.to_string(),
            reason: format!("HTTP status {status}"),
        });
    }

    if let (Some(expected), Ok(meta)) = (response.content_length(), target.metadata()) {
        if meta.len() > 0 && meta.len() == expected {
            return Ok(FetchStatus::Kept);
        }
    }

    let part = part_path(target);
    let mut file = File::create(&part).await?;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        file.write_all(&chunk?).await?;
    }
    file.flush().await?;
    drop(file);

    tokio::fs::rename(&part, target).await?;
    Ok(FetchStatus::Downloaded)
}

fn part_path(target: &Utf8Path) -> Utf8PathBuf {
    let mut part = target.as_str().to_string();
    part.push_str(".part");
    Utf8PathBuf::from(part)
}

fn progress_bar(len: u64) -> ProgressBar {
    let pb = ProgressBar::new(len.max(1));
    let style = ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} | {per_sec} | {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb
}
