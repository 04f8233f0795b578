use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "tgup",
    version,
    about = "Watch folders and stream media files to Telegram chats"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Send a text message and exit.
    SendText(SendTextArgs),
    /// Send images from the inputs, grouped into media batches.
    SendImages(SendArgs),
    /// Send documents from the inputs, one call per file.
    SendDocument(SendArgs),
    /// Send videos from the inputs, one call per file.
    SendVideo(SendArgs),
    /// Send audio files from the inputs, one call per file.
    SendAudio(SendArgs),
    /// Send every supported media kind found in the inputs.
    SendMixed(SendArgs),
    /// Watch directories and stream new media until interrupted.
    Watch(WatchArgs),
    /// Print the version and exit.
    Version,
}

#[derive(Debug, Args)]
pub struct TargetArgs {
    /// Chat id or @channelname to deliver to.
    #[arg(long)]
    pub chat: String,

    /// Message thread (forum topic) id.
    #[arg(long)]
    pub thread: Option<i64>,

    /// Credentials file with a [Telegram] api_url list and [Token*] sections.
    #[arg(long, value_name = "PATH", default_value = "tgup-credentials.ini")]
    pub credentials: PathBuf,
}

#[derive(Debug, Args)]
pub struct SendTextArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Message text.
    #[arg(long)]
    pub text: String,
}

#[derive(Debug, Args)]
pub struct SendArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Individual file to send (repeatable).
    #[arg(long = "file", value_name = "PATH")]
    pub files: Vec<PathBuf>,

    /// Directory to scan for inputs (repeatable).
    #[arg(long = "dir", value_name = "PATH")]
    pub dirs: Vec<PathBuf>,

    /// Zip archive whose matching entries are sent (repeatable).
    #[arg(long = "archive", value_name = "PATH")]
    pub archives: Vec<PathBuf>,

    /// Recurse into subdirectories of --dir inputs.
    #[arg(long)]
    pub recursive: bool,

    /// Glob a file must match to be sent; empty means everything (repeatable).
    #[arg(long = "include", value_name = "GLOB")]
    pub include: Vec<String>,

    /// Glob that excludes files, winning over --include (repeatable).
    #[arg(long = "exclude", value_name = "GLOB")]
    pub exclude: Vec<String>,

    /// Password tried against encrypted archive entries (repeatable).
    #[arg(long = "archive-password", value_name = "PASSWORD")]
    pub archive_passwords: Vec<String>,

    /// File with one archive password per line.
    #[arg(long = "archive-password-file", value_name = "PATH")]
    pub archive_password_file: Option<PathBuf>,

    /// Persist progress into this queue file so a re-run skips sent items.
    #[arg(long = "queue-file", value_name = "PATH")]
    pub queue_file: Option<PathBuf>,

    /// Retry budget per item.
    #[arg(long = "queue-retries", value_name = "N", default_value_t = 3)]
    pub queue_retries: u32,

    /// Seconds to sleep between batches.
    #[arg(long = "batch-delay", value_name = "SECONDS", default_value_t = 3)]
    pub batch_delay: u64,

    /// Consecutive images grouped into one media batch (1-10).
    #[arg(long = "group-size", value_name = "N", default_value_t = 4)]
    pub group_size: usize,

    /// Longest-edge ceiling for images, in pixels.
    #[arg(long = "max-dimension", value_name = "PIXELS", default_value_t = 2000)]
    pub max_dimension: u32,

    /// Payload ceiling per image, in bytes.
    #[arg(long = "max-bytes", value_name = "BYTES", default_value_t = 5_242_880)]
    pub max_bytes: u64,

    /// Initial PNG compression level for image re-encodes.
    #[arg(long = "png-start-level", value_name = "LEVEL", default_value_t = 8)]
    pub png_start_level: u8,
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Watch settings JSON file.
    #[arg(long, value_name = "PATH", default_value = "tgup-settings.json")]
    pub settings: PathBuf,

    /// Credentials file with a [Telegram] api_url list and [Token*] sections.
    #[arg(long, value_name = "PATH", default_value = "tgup-credentials.ini")]
    pub credentials: PathBuf,

    /// Override the queue file named in the settings.
    #[arg(long = "queue-file", value_name = "PATH")]
    pub queue_file: Option<PathBuf>,
}
