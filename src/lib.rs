pub mod batch;
pub mod cli;
pub mod constants;
pub mod encoder;
pub mod error;
pub mod formats;
pub mod logger;
pub mod optimizer;
pub mod report;
pub mod utils;
pub mod validation;

pub use batch::{
    batch_optimize, batch_optimize_with, collect_image_files, generate_output_path,
    resolve_inputs, BatchOptions, BatchRecord, OutputMode, RecordOutcome,
};
pub use encoder::{CodecEncoder, EncodeParams, Encoder, SourceImage};
pub use error::{CompressionError, ErrorKind, Result};
pub use formats::ImageKind;
pub use optimizer::{
    EncodeAttempt, OptimizationRequest, OptimizationResult, Optimized, Optimizer, SearchOptions,
    Stage,
};
pub use report::BatchSummary;
