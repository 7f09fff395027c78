//! `mtdl get` – download URLs through the engine and report progress.

use anyhow::{bail, Result};
use mtdl_core::config::MtdlConfig;
use mtdl_core::scheduler::{DownloadStatus, Engine, TerminalStatus};
use std::path::PathBuf;
use std::time::Duration;

const STATUS_INTERVAL: Duration = Duration::from_millis(1000);

/// Command-line overrides for one `get` run.
#[derive(Debug, Clone, Default)]
pub struct GetOptions {
    pub urls: Vec<String>,
    pub max_downloads: Option<usize>,
    pub max_threads: Option<usize>,
    pub split: Option<usize>,
    pub dir: Option<PathBuf>,
}

impl GetOptions {
    /// Config with the command-line overrides applied.
    pub fn apply(&self, cfg: &MtdlConfig) -> MtdlConfig {
        let mut cfg = cfg.clone();
        if let Some(n) = self.max_downloads {
            cfg.download.max_downloads = n;
        }
        if let Some(n) = self.max_threads {
            cfg.download.max_threads = n;
        }
        if let Some(n) = self.split {
            cfg.download.split_num = n;
        }
        if let Some(dir) = &self.dir {
            cfg.download.download_path = Some(dir.clone());
        }
        cfg
    }
}

pub fn run_get(cfg: &MtdlConfig, opts: GetOptions) -> Result<()> {
    let cfg = opts.apply(cfg);
    let engine = Engine::from_config(&cfg)?;

    let mut submitted = Vec::new();
    for url in &opts.urls {
        match engine.submit(url) {
            Ok(()) => submitted.push(url.trim().to_string()),
            Err(e) => eprintln!("skipping {}: {}", url, e),
        }
    }
    let rejected = opts.urls.len() - submitted.len();

    while !engine.wait_idle(STATUS_INTERVAL) {
        for url in &submitted {
            println!("{}", status_line(&engine, url));
        }
    }

    let records = engine.list_completed();
    let mut unfinished = rejected;
    for r in &records {
        match (&r.status, &r.reason, &r.path) {
            (TerminalStatus::Finished, _, Some(path)) => {
                println!("finished  {} -> {}", r.url, path.display())
            }
            (status, Some(reason), _) => {
                println!("{:<9} {} ({})", status.to_string(), r.url, reason)
            }
            (status, None, _) => println!("{:<9} {}", status.to_string(), r.url),
        }
        if r.status != TerminalStatus::Finished {
            unfinished += 1;
        }
    }
    engine.shutdown();

    if unfinished > 0 {
        bail!("{} of {} downloads did not finish", unfinished, opts.urls.len());
    }
    Ok(())
}

fn status_line(engine: &Engine, url: &str) -> String {
    match (engine.status(url), engine.progress(url)) {
        (Some(DownloadStatus::Active { .. }), Some(p)) => {
            let eta = p
                .eta_secs()
                .map(|s| format!("{:.0}s", s))
                .unwrap_or_else(|| "-".to_string());
            format!(
                "{:>3}%  {:.1}/{:.1} MiB  {:.2} MiB/s  eta {}  {}",
                p.percent(),
                p.bytes_done as f64 / 1_048_576.0,
                p.total_bytes as f64 / 1_048_576.0,
                p.bytes_per_sec() / 1_048_576.0,
                eta,
                url
            )
        }
        (Some(status), _) => format!("{:<9} {}", status.to_string(), url),
        (None, _) => format!("unknown   {}", url),
    }
}
