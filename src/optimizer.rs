use crate::constants::{
    AGGRESSIVE_START_OFFSET, AGGRESSIVE_STEP, DEFAULT_MAX_ITERATIONS, DEFAULT_MAX_QUALITY,
    DEFAULT_MIN_QUALITY, DEFAULT_SAFETY_MARGIN, FLOOR_QUALITY, MAX_QUALITY, MIN_QUALITY,
    UNCHANGED_QUALITY,
};
use crate::encoder::{EncodeParams, Encoder, SourceImage};
use crate::error::{CompressionError, Result};
use crate::formats::ImageKind;
use crate::utils::{calculate_savings, calculate_savings_percent};
use crate::validation::validate_input_file;
use serde::Serialize;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// Tunables for the quality search, shared by every file in a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchOptions {
    pub min_quality: u8,
    pub max_quality: u8,
    pub max_iterations: u32,
    pub safety_margin: u64,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            min_quality: DEFAULT_MIN_QUALITY,
            max_quality: DEFAULT_MAX_QUALITY,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            safety_margin: DEFAULT_SAFETY_MARGIN,
        }
    }
}

impl SearchOptions {
    pub fn new(
        min_quality: Option<u8>,
        max_quality: Option<u8>,
        max_iterations: Option<u32>,
        safety_margin: Option<u64>,
    ) -> Result<Self> {
        let min_quality = min_quality.unwrap_or(DEFAULT_MIN_QUALITY);
        let max_quality = max_quality.unwrap_or(DEFAULT_MAX_QUALITY);
        let max_iterations = max_iterations.unwrap_or(DEFAULT_MAX_ITERATIONS);

        for quality in [min_quality, max_quality] {
            if !(MIN_QUALITY..=MAX_QUALITY).contains(&quality) {
                return Err(CompressionError::InvalidQuality(quality));
            }
        }
        if min_quality > max_quality {
            return Err(CompressionError::InvalidQualityRange {
                min: min_quality,
                max: max_quality,
            });
        }
        if max_iterations == 0 {
            return Err(CompressionError::InvalidIterations(max_iterations));
        }

        Ok(Self {
            min_quality,
            max_quality,
            max_iterations,
            safety_margin: safety_margin.unwrap_or(DEFAULT_SAFETY_MARGIN),
        })
    }
}

/// Everything the search needs to know about one input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptimizationRequest {
    pub original_size: u64,
    pub format: ImageKind,
    pub target_size: Option<u64>,
    pub min_quality: u8,
    pub max_quality: u8,
    pub max_iterations: u32,
    pub safety_margin: u64,
}

impl OptimizationRequest {
    pub fn new(source: &SourceImage, target_size: Option<u64>, options: &SearchOptions) -> Self {
        Self {
            original_size: source.size(),
            format: source.kind(),
            target_size,
            min_quality: options.min_quality,
            max_quality: options.max_quality,
            max_iterations: options.max_iterations,
            safety_margin: options.safety_margin,
        }
    }

    /// Target minus the safety margin, never below zero.
    pub fn adjusted_target(&self) -> Option<u64> {
        self.target_size
            .map(|target| target.saturating_sub(self.safety_margin))
    }
}

/// One encoder invocation and what it produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeAttempt {
    pub quality: u8,
    pub aggressive: bool,
    pub bytes: Vec<u8>,
}

impl EncodeAttempt {
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Which phase produced the final bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Stage {
    /// Already under budget; source copied through.
    Unchanged,
    /// Single pass at the maximum quality, no target.
    QualityOnly,
    /// Best quality found by the binary search.
    Search,
    /// Search never met the budget; encoded at the floor quality.
    FloorFallback,
    /// Linear scan below the minimum quality with aggressive settings.
    Aggressive,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationResult {
    pub success: bool,
    pub original_size: u64,
    pub optimized_size: u64,
    pub quality: u8,
    pub iterations: u32,
    pub savings: i64,
    pub savings_percent: f64,
    pub under_target: bool,
    pub stage: Stage,
}

impl OptimizationResult {
    fn new(
        request: &OptimizationRequest,
        optimized_size: u64,
        quality: u8,
        iterations: u32,
        stage: Stage,
    ) -> Self {
        let under_target = match request.target_size {
            Some(target) => optimized_size <= target,
            None => true,
        };

        Self {
            success: under_target,
            original_size: request.original_size,
            optimized_size,
            quality,
            iterations,
            savings: calculate_savings(request.original_size, optimized_size),
            savings_percent: calculate_savings_percent(request.original_size, optimized_size),
            under_target,
            stage,
        }
    }
}

/// Result plus the bytes it describes.
#[derive(Debug, Clone, PartialEq)]
pub struct Optimized {
    pub result: OptimizationResult,
    pub bytes: Vec<u8>,
}

/// Runs the quality search for single images against an injectable encoder.
pub struct Optimizer<E> {
    encoder: E,
    options: SearchOptions,
}

impl<E: Encoder> Optimizer<E> {
    pub fn new(encoder: E, options: SearchOptions) -> Self {
        Self { encoder, options }
    }

    pub fn encoder(&self) -> &E {
        &self.encoder
    }

    /// Optimizes one file and writes the result to `output`.
    ///
    /// `output` may be the final destination or a temporary file; the bytes
    /// written there are exactly the ones the returned result describes.
    pub fn optimize_file(
        &self,
        input: &Path,
        output: &Path,
        target_size: Option<u64>,
    ) -> Result<OptimizationResult> {
        validate_input_file(input)?;
        let source = SourceImage::open(input)?;
        let optimized = self.optimize(&source, target_size)?;

        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|_| CompressionError::DirectoryCreationFailed(parent.to_path_buf()))?;
        }
        fs::write(output, &optimized.bytes)?;

        info!(
            input = %input.display(),
            output = %output.display(),
            original = optimized.result.original_size,
            optimized = optimized.result.optimized_size,
            quality = optimized.result.quality,
            iterations = optimized.result.iterations,
            "optimized image"
        );
        Ok(optimized.result)
    }

    /// Optimizes an in-memory source, choosing the mode from `target_size`.
    pub fn optimize(&self, source: &SourceImage, target_size: Option<u64>) -> Result<Optimized> {
        let request = OptimizationRequest::new(source, target_size, &self.options);
        debug!(
            format = %request.format,
            original = request.original_size,
            target = ?request.target_size,
            "optimizing"
        );
        match request.target_size {
            None => self.optimize_quality(source, &request),
            Some(target) => self.optimize_to_target(source, &request, target),
        }
    }

    fn optimize_quality(
        &self,
        source: &SourceImage,
        request: &OptimizationRequest,
    ) -> Result<Optimized> {
        let attempt = self.attempt(source, request.max_quality, false)?;
        let result = OptimizationResult::new(
            request,
            attempt.size(),
            attempt.quality,
            1,
            Stage::QualityOnly,
        );
        Ok(Optimized {
            result,
            bytes: attempt.bytes,
        })
    }

    fn optimize_to_target(
        &self,
        source: &SourceImage,
        request: &OptimizationRequest,
        target: u64,
    ) -> Result<Optimized> {
        let adjusted_target = request.adjusted_target().unwrap_or(target);

        if request.original_size <= adjusted_target {
            debug!(
                original = request.original_size,
                adjusted_target, "already under target, copying through"
            );
            let result =
                OptimizationResult::new(request, request.original_size, UNCHANGED_QUALITY, 0, Stage::Unchanged);
            return Ok(Optimized {
                result,
                bytes: source.bytes().to_vec(),
            });
        }

        let search = self.binary_search(source, request, adjusted_target)?;
        let iterations = search.iterations;

        let (mut current, mut stage) = match search.best_quality {
            None => {
                let floor = FLOOR_QUALITY.max(request.min_quality);
                debug!(floor, "no sampled quality met the target, using floor quality");
                (self.attempt(source, floor, false)?, Stage::FloorFallback)
            }
            Some(best) => match search.last {
                Some(last) if last.quality == best && !last.aggressive => (last, Stage::Search),
                _ => (self.attempt(source, best, false)?, Stage::Search),
            },
        };

        if current.size() > target {
            if let Some(attempt) = self.aggressive_fallback(source, request, target)? {
                current = attempt;
                stage = Stage::Aggressive;
            }
        }

        let result = OptimizationResult::new(request, current.size(), current.quality, iterations, stage);
        if !result.under_target {
            warn!(
                target,
                optimized = result.optimized_size,
                quality = result.quality,
                "could not reach target size"
            );
        }

        Ok(Optimized {
            result,
            bytes: current.bytes,
        })
    }

    /// Binary search for the highest quality whose output fits
    /// `adjusted_target`. Assumes output size grows with quality.
    fn binary_search(
        &self,
        source: &SourceImage,
        request: &OptimizationRequest,
        adjusted_target: u64,
    ) -> Result<SearchOutcome> {
        let mut low = request.min_quality;
        let mut high = request.max_quality;
        let mut outcome = SearchOutcome::default();

        while low <= high && outcome.iterations < request.max_iterations {
            outcome.iterations += 1;
            let quality = ((low as u16 + high as u16) / 2) as u8;
            let attempt = self.attempt(source, quality, false)?;
            let size = attempt.size();

            debug!(
                iteration = outcome.iterations,
                quality,
                size,
                adjusted_target,
                "search step"
            );

            if size <= adjusted_target {
                outcome.best_quality = Some(quality);
                low = quality + 1;
            } else {
                high = quality - 1;
            }
            outcome.last = Some(attempt);
        }

        Ok(outcome)
    }

    /// Linear scan downwards from just below `min_quality` until the
    /// unmargined target is met or quality runs out.
    fn aggressive_fallback(
        &self,
        source: &SourceImage,
        request: &OptimizationRequest,
        target: u64,
    ) -> Result<Option<EncodeAttempt>> {
        let mut quality = request
            .min_quality
            .saturating_sub(AGGRESSIVE_START_OFFSET)
            .max(MIN_QUALITY) as i16;
        let mut last = None;

        while quality >= MIN_QUALITY as i16 {
            let attempt = self.attempt(source, quality as u8, true)?;
            debug!(quality, size = attempt.size(), target, "aggressive fallback step");

            let fits = attempt.size() <= target;
            last = Some(attempt);
            if fits {
                break;
            }
            quality -= AGGRESSIVE_STEP as i16;
        }

        Ok(last)
    }

    fn attempt(&self, source: &SourceImage, quality: u8, aggressive: bool) -> Result<EncodeAttempt> {
        let params = if aggressive {
            EncodeParams::aggressive(source.kind(), quality)
        } else {
            EncodeParams::standard(source.kind(), quality)
        };
        let bytes = self.encoder.encode(source, &params)?;
        Ok(EncodeAttempt {
            quality,
            aggressive,
            bytes,
        })
    }
}

#[derive(Debug, Default)]
struct SearchOutcome {
    iterations: u32,
    best_quality: Option<u8>,
    last: Option<EncodeAttempt>,
}
