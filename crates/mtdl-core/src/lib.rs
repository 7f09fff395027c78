pub mod config;
pub mod logging;
pub mod paths;

pub mod downloader;
pub mod fetch_head;
pub mod retry;
pub mod scheduler;
pub mod segmenter;
pub mod storage;
pub mod transport;
pub mod url_model;

pub use scheduler::{
    CancelOutcome, CompletionRecord, DownloadStatus, Engine, EngineConfig, SubmitError,
    TerminalStatus,
};
