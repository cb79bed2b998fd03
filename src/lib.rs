pub mod app;
pub mod config;
pub mod downloads;
pub mod eject;
pub mod episode;
pub mod error;
pub mod feed;
pub mod http;
pub mod lock;
pub mod progress;
pub mod refresh;
pub mod retention;
pub mod store;
pub mod sync;
pub mod tags;

// Re-export main types for convenience
pub use app::App;
pub use config::{Config, DEFAULT_CONFIG_FILE, TagOverride, TitlePolicy};
pub use downloads::{DownloadOutcome, DownloadStatus, DownloadSummary};
pub use error::{
    ConfigError, DownloadError, EjectError, Error, FeedError, LockError, RetentionError,
    StoreError, SyncError, TagError,
};
pub use http::{HttpClient, HttpResponse, ReqwestClient};
pub use progress::{NoopReporter, ProgressEvent, ProgressReporter, SharedProgressReporter};
pub use retention::Location;
pub use store::{AddOutcome, Episode, Podcast, Store};
