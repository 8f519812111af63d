use crate::constants::{
    DEFAULT_MAX_ITERATIONS, DEFAULT_MAX_QUALITY, DEFAULT_MIN_QUALITY, DEFAULT_SAFETY_MARGIN,
};
use crate::error::Result;
use crate::optimizer::SearchOptions;
use crate::utils::parse_file_size;
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "img-fit",
    about = "Compress PNG and JPEG images, optionally to fit a byte budget",
    long_about = "img-fit re-encodes PNG and JPEG images either at a fixed quality or by searching \
                  for the highest quality whose output fits a target file size. \
                  When the search cannot reach the target it falls back to progressively \
                  more aggressive settings and reports honestly when the target was missed.",
    version,
    after_help = "EXAMPLES:\n  \
    img-fit compress photo.jpg small.jpg -t 40KB\n  \
    img-fit batch ./images -o ./compressed -r -t 100KB --max-quality 90\n  \
    img-fit batch \"./shots/*.png\" --in-place -q 70\n  \
    img-fit batch a.jpg b.png -o out --json"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short = 'Q', long, global = true, help = "Only print errors")]
    pub quiet: bool,

    #[arg(short, long, global = true, help = "Show search steps and debug logging")]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(
        about = "Compress a single image file",
        long_about = "Compress one image into an output file. With --target-size the quality is \
                      searched; without it the image is encoded once at --max-quality."
    )]
    Compress {
        #[arg(help = "Input image file path (png, jpg, jpeg)")]
        input: PathBuf,

        #[arg(help = "Output image file path")]
        output: PathBuf,

        #[command(flatten)]
        search: SearchArgs,
    },

    #[command(
        about = "Compress many images",
        long_about = "Compress files, directories or glob patterns. Results are written to an \
                      output directory, or replace the originals with --in-place."
    )]
    Batch {
        #[arg(
            required = true,
            help = "Input files, directories or glob patterns",
            long_help = "Inputs can be files, directories or glob expressions. \
                         Examples: './images', '*.jpg', '/path/to/images/*.png'"
        )]
        inputs: Vec<String>,

        #[arg(
            short,
            long,
            required_unless_present = "in_place",
            conflicts_with = "in_place",
            help = "Output directory path"
        )]
        output: Option<PathBuf>,

        #[arg(
            long,
            help = "Replace originals atomically after a successful optimization"
        )]
        in_place: bool,

        #[arg(short, long, help = "Process subdirectories recursively")]
        recursive: bool,

        #[arg(
            short = 'j',
            long,
            help = "Number of files processed in parallel (default: 1)"
        )]
        jobs: Option<usize>,

        #[arg(long, help = "Print results as JSON")]
        json: bool,

        #[command(flatten)]
        search: SearchArgs,
    },
}

#[derive(ClapArgs, Debug, Clone)]
pub struct SearchArgs {
    #[arg(
        short = 't',
        long,
        value_parser = parse_target_arg,
        help = "Target file size, e.g. 40KB, 1.5MB or 2048",
        long_help = "Upper bound for each output file. Without it every image is encoded once \
                     at --max-quality."
    )]
    pub target_size: Option<u64>,

    #[arg(long, help = "Lowest quality the search may pick (1-100)", default_value_t = DEFAULT_MIN_QUALITY)]
    pub min_quality: u8,

    #[arg(
        short = 'q',
        long,
        visible_alias = "quality",
        help = "Highest quality, and the quality used without a target (1-100)",
        default_value_t = DEFAULT_MAX_QUALITY
    )]
    pub max_quality: u8,

    #[arg(long, help = "Maximum binary-search iterations", default_value_t = DEFAULT_MAX_ITERATIONS)]
    pub max_iterations: u32,

    #[arg(
        long,
        value_parser = parse_size_arg,
        help = "Headroom subtracted from the target during the search, e.g. 1KB",
        default_value_t = DEFAULT_SAFETY_MARGIN
    )]
    pub margin: u64,
}

impl SearchArgs {
    pub fn to_options(&self) -> Result<SearchOptions> {
        SearchOptions::new(
            Some(self.min_quality),
            Some(self.max_quality),
            Some(self.max_iterations),
            Some(self.margin),
        )
    }
}

fn parse_size_arg(value: &str) -> std::result::Result<u64, String> {
    parse_file_size(value).map_err(|e| e.to_string())
}

fn parse_target_arg(value: &str) -> std::result::Result<u64, String> {
    match parse_size_arg(value)? {
        0 => Err("target size must be greater than zero".to_string()),
        bytes => Ok(bytes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CompressionError;

    #[test]
    fn test_parse_batch_args() {
        let args = Args::try_parse_from([
            "img-fit", "batch", "a.jpg", "dir", "-o", "out", "-t", "40KB", "-q", "90", "-j", "4",
        ])
        .unwrap();

        match args.command {
            Commands::Batch {
                inputs,
                output,
                in_place,
                jobs,
                search,
                ..
            } => {
                assert_eq!(inputs, vec!["a.jpg", "dir"]);
                assert_eq!(output, Some(PathBuf::from("out")));
                assert!(!in_place);
                assert_eq!(jobs, Some(4));
                assert_eq!(search.target_size, Some(40 * 1024));
                assert_eq!(search.max_quality, 90);
                assert_eq!(search.min_quality, DEFAULT_MIN_QUALITY);
                assert_eq!(search.margin, DEFAULT_SAFETY_MARGIN);
            }
            _ => panic!("expected batch command"),
        }
    }

    #[test]
    fn test_batch_requires_output_or_in_place() {
        assert!(Args::try_parse_from(["img-fit", "batch", "a.jpg"]).is_err());
        assert!(Args::try_parse_from(["img-fit", "batch", "a.jpg", "--in-place"]).is_ok());
        assert!(
            Args::try_parse_from(["img-fit", "batch", "a.jpg", "--in-place", "-o", "out"]).is_err()
        );
    }

    #[test]
    fn test_invalid_target_size_rejected() {
        assert!(Args::try_parse_from(["img-fit", "compress", "a.jpg", "b.jpg", "-t", "big"]).is_err());
        assert!(Args::try_parse_from(["img-fit", "compress", "a.jpg", "b.jpg", "-t", "0"]).is_err());
    }

    #[test]
    fn test_search_args_validation() {
        let args =
            Args::try_parse_from(["img-fit", "compress", "a.jpg", "b.jpg", "--min-quality", "90", "-q", "50"])
                .unwrap();
        let Commands::Compress { search, .. } = args.command else {
            panic!("expected compress command");
        };
        assert!(matches!(
            search.to_options(),
            Err(CompressionError::InvalidQualityRange { min: 90, max: 50 })
        ));
    }

    #[test]
    fn test_margin_accepts_units() {
        let args =
            Args::try_parse_from(["img-fit", "compress", "a.png", "b.png", "--margin", "2KB"]).unwrap();
        let Commands::Compress { search, .. } = args.command else {
            panic!("expected compress command");
        };
        assert_eq!(search.margin, 2048);
        assert_eq!(search.target_size, None);
    }
}
