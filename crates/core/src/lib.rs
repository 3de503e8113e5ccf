pub mod blob;
pub mod config;
pub mod convert;
pub mod dispatch;
pub mod error;
pub mod metrics;
pub mod ratelimit;
pub mod reaper;
pub mod task;
pub mod testing;

pub use blob::{BlobId, BlobMetadata, BlobStore, BlobStoreError, NewBlob, SqliteBlobStore};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, DatabaseConfig,
    ServerConfig,
};
pub use convert::{
    AudioConverter, ConversionOutput, ConversionRequest, ConverterConfig, FfmpegConverter,
    OutputFormat, PipelineError, ProbeInfo,
};
pub use dispatch::{DispatchConfig, Dispatcher};
pub use error::{ErrorCode, TaskError};
pub use ratelimit::{RateLimitError, RateLimitStore, RateLimiter, SqliteRateLimitStore};
pub use reaper::{Reaper, ReaperConfig};
pub use task::{
    poll, submit, NewTask, PollOutcome, SqliteTaskStore, SubmitRequest, Task, TaskId, TaskState,
    TaskStore, TaskStoreError, DEFAULT_PITCH, DEFAULT_TEMPO,
};
