pub const MIN_QUALITY: u8 = 1;
pub const MAX_QUALITY: u8 = 100;

pub const DEFAULT_MIN_QUALITY: u8 = 10;
pub const DEFAULT_MAX_QUALITY: u8 = 85;
pub const DEFAULT_MAX_ITERATIONS: u32 = 8;
pub const DEFAULT_SAFETY_MARGIN: u64 = 1024;

/// Quality reported when a file is copied through untouched.
pub const UNCHANGED_QUALITY: u8 = 100;

/// Lowest quality tried when the binary search never met the target.
pub const FLOOR_QUALITY: u8 = 10;

pub const AGGRESSIVE_START_OFFSET: u8 = 5;
pub const AGGRESSIVE_STEP: u8 = 2;

pub const PNG_COMPRESSION_LEVEL: u8 = 9;
pub const PNG_EFFORT: u8 = 10;

pub const MAX_OXIPNG_PRESET: u8 = 6;
pub const LIBDEFLATER_MAX_LEVEL: u8 = 12;

/// Maximum input file size in bytes (200MB)
pub const MAX_FILE_SIZE: u64 = 200 * 1024 * 1024;

pub const PROGRESS_BAR_TEMPLATE: &str =
    "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}";

pub const SUPPORTED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];
