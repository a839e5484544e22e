use clap::Parser;
use imago_engine::DownloadPrioritization;
use std::path::PathBuf;

/// Define CLI arguments
#[derive(Parser)]
#[command(
    author = "hua0512 <https://github.com/hua0512>",
    version,
    about = "Image download tool with a bounded memory cache",
    long_about = "Downloads images through a coordinator that shares work between\n\
                  identical requests, bounds the number of concurrent downloads and\n\
                  keeps recently used images in a memory cache.\n\
                  \n\
                  Repeated URLs are fetched once. Downloaded images are written to the\n\
                  output directory, named after the digest of their cache key."
)]
pub struct CliArgs {
    /// Image URL(s) to download
    #[arg(required = true, help = "URL(s) of the images to download")]
    pub urls: Vec<String>,

    /// Output directory for downloaded images
    #[arg(
        short,
        long,
        help = "Directory where downloaded images will be saved (default: ./images)"
    )]
    pub output_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, help = "Enable detailed debug logging")]
    pub verbose: bool,

    /// Maximum number of concurrent downloads
    #[arg(
        long,
        default_value = "4",
        help = "Maximum number of downloads running at the same time"
    )]
    pub max_active: usize,

    /// Admission order of queued downloads
    #[arg(
        long,
        value_enum,
        default_value_t = DownloadPrioritization::Fifo,
        help = "Order in which queued downloads start: fifo (oldest first) or lifo (newest first)"
    )]
    pub prioritization: DownloadPrioritization,

    /// Memory cache capacity with optional unit (B, KB, MB, GB, TB)
    #[arg(
        long,
        default_value = "100MB",
        help = "Memory cache capacity with optional unit (B, KB, MB, GB, TB). Examples: \"100MB\", \"1GB\""
    )]
    pub memory_capacity: String,

    /// Memory usage the cache purges down to
    #[arg(
        long,
        default_value = "60MB",
        help = "Memory usage the cache purges down to once the capacity is exceeded. Must be below the capacity"
    )]
    pub preferred_usage: String,

    /// Disable the memory cache
    #[arg(long, help = "Disable the memory cache entirely")]
    pub no_cache: bool,

    /// Overall timeout in seconds
    #[arg(
        long,
        default_value = "30",
        help = "Overall timeout in seconds for HTTP requests (0 disables it)"
    )]
    pub timeout: u64,

    /// Connection timeout in seconds
    #[arg(
        long,
        default_value = "10",
        help = "Connection timeout in seconds (time to establish initial connection)"
    )]
    pub connect_timeout: u64,

    /// Custom HTTP headers for download requests
    #[arg(
        long = "header",
        short = 'H',
        help = "Add custom HTTP header to requests (can be used multiple times). Format: 'Name: Value'",
        value_name = "HEADER"
    )]
    pub headers: Vec<String>,

    /// Show progress bars for downloads
    #[arg(
        short = 'P',
        long = "progress",
        default_value = "false",
        help = "Show progress bars for running downloads"
    )]
    pub show_progress: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = CliArgs::parse_from(["imago", "https://example.com/a.png"]);
        assert_eq!(args.urls, vec!["https://example.com/a.png"]);
        assert_eq!(args.max_active, 4);
        assert_eq!(args.prioritization, DownloadPrioritization::Fifo);
        assert_eq!(args.memory_capacity, "100MB");
        assert!(!args.no_cache);
    }

    #[test]
    fn test_options() {
        let args = CliArgs::parse_from([
            "imago",
            "--prioritization",
            "lifo",
            "--max-active",
            "2",
            "-H",
            "Referer: https://example.com",
            "https://example.com/a.png",
            "https://example.com/b.png",
        ]);
        assert_eq!(args.prioritization, DownloadPrioritization::Lifo);
        assert_eq!(args.max_active, 2);
        assert_eq!(args.headers.len(), 1);
        assert_eq!(args.urls.len(), 2);
    }
}
