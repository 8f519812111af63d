use crate::batch::{BatchRecord, RecordOutcome};
use crate::optimizer::Stage;
use crate::utils::{calculate_savings_percent, format_file_size};
use serde::Serialize;

/// Totals over a batch, counting only files that produced output.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub total_files: usize,
    pub processed: usize,
    pub failed: usize,
    pub under_target: usize,
    pub total_original_size: u64,
    pub total_optimized_size: u64,
    pub total_savings: i64,
    pub savings_percent: f64,
}

impl BatchSummary {
    pub fn from_records(records: &[BatchRecord]) -> Self {
        let mut summary = BatchSummary {
            total_files: records.len(),
            ..Default::default()
        };

        for record in records {
            match &record.outcome {
                RecordOutcome::Optimized(result) => {
                    summary.processed += 1;
                    if result.under_target {
                        summary.under_target += 1;
                    }
                    summary.total_original_size += result.original_size;
                    summary.total_optimized_size += result.optimized_size;
                }
                RecordOutcome::Failed { .. } => summary.failed += 1,
            }
        }

        summary.total_savings =
            summary.total_original_size as i64 - summary.total_optimized_size as i64;
        summary.savings_percent =
            calculate_savings_percent(summary.total_original_size, summary.total_optimized_size);
        summary
    }

    /// True when every file was optimized and met its target.
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0 && self.under_target == self.processed
    }
}

#[derive(Serialize)]
struct JsonReport<'a> {
    results: &'a [BatchRecord],
    summary: &'a BatchSummary,
}

pub fn to_json(records: &[BatchRecord]) -> serde_json::Result<String> {
    let summary = BatchSummary::from_records(records);
    serde_json::to_string_pretty(&JsonReport {
        results: records,
        summary: &summary,
    })
}

/// One human-readable line per file
pub fn format_record(record: &BatchRecord) -> String {
    match &record.outcome {
        RecordOutcome::Optimized(result) => {
            let icon = if result.under_target { "✅" } else { "⚠️ " };
            let detail = match result.stage {
                Stage::Unchanged => "already under target, copied".to_string(),
                _ => format!(
                    "quality {}, {} iteration{}",
                    result.quality,
                    result.iterations,
                    if result.iterations == 1 { "" } else { "s" }
                ),
            };
            format!(
                "{} {}: {} -> {} ({:.2}%) [{}]",
                icon,
                record.filename,
                format_file_size(result.original_size),
                format_file_size(result.optimized_size),
                result.savings_percent,
                detail
            )
        }
        RecordOutcome::Failed { error, .. } => format!("❌ {}: {}", record.filename, error),
    }
}

pub fn print_records(records: &[BatchRecord]) {
    for record in records {
        println!("{}", format_record(record));
    }
}

pub fn print_summary(summary: &BatchSummary, target_size: Option<u64>) {
    println!("\n📊 Summary:");
    println!("  📁 Files: {}", summary.total_files);
    println!("  ✅ Optimized: {}", summary.processed);
    if let Some(target) = target_size {
        println!(
            "  🎯 Under {}: {}/{}",
            format_file_size(target),
            summary.under_target,
            summary.processed
        );
    }
    println!(
        "  📊 Total size: {} -> {}",
        format_file_size(summary.total_original_size),
        format_file_size(summary.total_optimized_size)
    );
    if summary.total_savings >= 0 {
        println!(
            "  💾 Saved: {} ({:.2}%)",
            format_file_size(summary.total_savings as u64),
            summary.savings_percent
        );
    } else {
        println!(
            "  ⚠️  Grew by: {} ({:.2}%)",
            format_file_size(summary.total_savings.unsigned_abs()),
            summary.savings_percent.abs()
        );
    }
    if summary.failed > 0 {
        println!("  ❌ Failed: {}", summary.failed);
    }
}
