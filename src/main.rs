use anyhow::{anyhow, Context, Result};
use clap::Parser;
use img_fit::cli::{Args, Commands, SearchArgs};
use img_fit::constants::PROGRESS_BAR_TEMPLATE;
use img_fit::batch::optimize_in_place;
use img_fit::report::{self, BatchSummary};
use img_fit::utils::format_file_size;
use img_fit::{
    batch_optimize_with, resolve_inputs, BatchOptions, CodecEncoder, Optimizer, OutputMode,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::process::ExitCode;

fn main() -> Result<ExitCode> {
    let args = Args::parse();
    img_fit::logger::init(args.quiet, args.verbose)
        .map_err(|e| anyhow!("failed to initialise logging: {}", e))?;

    let succeeded = match args.command {
        Commands::Compress {
            input,
            output,
            search,
        } => compress_one(&input, &output, &search, args.quiet)?,
        Commands::Batch {
            inputs,
            output,
            in_place,
            recursive,
            jobs,
            json,
            search,
        } => {
            let output = match (in_place, output) {
                (true, _) => OutputMode::InPlace,
                (false, Some(dir)) => OutputMode::Directory(dir),
                (false, None) => return Err(anyhow!("either --output or --in-place is required")),
            };
            run_batch(&inputs, output, recursive, jobs, json, &search, args.quiet)?
        }
    };

    Ok(if succeeded {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn compress_one(input: &Path, output: &Path, search: &SearchArgs, quiet: bool) -> Result<bool> {
    let optimizer = Optimizer::new(CodecEncoder, search.to_options()?);

    if !quiet {
        println!("🗜️  Compressing image: {:?}", input);
        println!("📁 Output: {:?}", output);
    }

    let result = if is_same_file(input, output) {
        optimize_in_place(&optimizer, input, search.target_size)
    } else {
        optimizer.optimize_file(input, output, search.target_size)
    }
    .with_context(|| format!("failed to compress {}", input.display()))?;

    if !quiet {
        println!("📊 Original size: {}", format_file_size(result.original_size));
        println!(
            "📈 Compressed size: {} (quality {}, {} iterations)",
            format_file_size(result.optimized_size),
            result.quality,
            result.iterations
        );
        println!("🎯 Savings: {:.2}%", result.savings_percent);
        if result.under_target {
            println!("✅ Done");
        } else {
            println!("⚠️  Could not reach the target size");
        }
    }

    Ok(result.success)
}

fn is_same_file(input: &Path, output: &Path) -> bool {
    match (input.canonicalize(), output.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn run_batch(
    inputs: &[String],
    output: OutputMode,
    recursive: bool,
    jobs: Option<usize>,
    json: bool,
    search: &SearchArgs,
    quiet: bool,
) -> Result<bool> {
    let files = resolve_inputs(inputs, recursive)?;
    if files.is_empty() {
        eprintln!("⚠️  No image files found in the input paths");
        return Ok(false);
    }

    let options = BatchOptions {
        output,
        target_size: search.target_size,
        search: search.to_options()?,
        jobs,
    };
    let optimizer = Optimizer::new(CodecEncoder, options.search);

    let progress = if quiet || json {
        ProgressBar::hidden()
    } else {
        println!("🚀 Optimizing {} image files...", files.len());
        let pb = ProgressBar::new(files.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(PROGRESS_BAR_TEMPLATE)
                .context("invalid progress template")?,
        );
        pb
    };

    let records = batch_optimize_with(&optimizer, &files, &options, &progress)?;
    progress.finish_and_clear();

    let summary = BatchSummary::from_records(&records);
    if json {
        println!("{}", report::to_json(&records)?);
    } else if !quiet {
        report::print_records(&records);
        report::print_summary(&summary, options.target_size);
    }

    Ok(summary.all_succeeded())
}
