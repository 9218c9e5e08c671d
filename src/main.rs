use std::path::PathBuf;

use clap::{
    CommandFactory, Parser, Subcommand,
    builder::{
        Styles,
        styling::{AnsiColor, Effects},
    },
};
use clap_complete::{Shell, generate};

use tidecli::{cli, config, error, logging, types::MediaKind};

fn styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::White.on_default() | Effects::BOLD)
        .usage(AnsiColor::White.on_default() | Effects::BOLD)
        .literal(AnsiColor::BrightBlue.on_default())
        .placeholder(AnsiColor::BrightGreen.on_default())
}

#[derive(Parser, Debug, Clone)]
#[clap(
  version = env!("CARGO_PKG_VERSION"),
  name=env!("CARGO_PKG_NAME"),
  bin_name=env!("CARGO_PKG_NAME"),
  author=env!("CARGO_PKG_AUTHORS"),
  about=env!("CARGO_PKG_DESCRIPTION"),
  styles=styles(),
)]
struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Authorize this device with TIDAL
    Login,

    /// Forget the stored credentials
    Logout,

    /// Show who is logged in and when the token expires
    Status,

    /// Print the stream descriptor of a track or the tracks of a collection
    Resolve(TargetOptions),

    /// Play a track or every track of a collection
    Play(TargetOptions),

    /// Download a track or every track of a collection
    Download(DownloadOptions),

    /// Get shell completions
    Completions(CompletionsOption),
}

#[derive(Parser, Debug, Clone)]
pub struct TargetOptions {
    /// Catalog id (numeric, or a UUID for playlists)
    pub id: String,

    /// What kind of item the id refers to
    #[clap(long, value_enum, default_value = "track")]
    pub kind: MediaKind,
}

#[derive(Parser, Debug, Clone)]
pub struct DownloadOptions {
    #[clap(flatten)]
    pub target: TargetOptions,

    /// Destination directory (defaults to TIDECLI_DOWNLOAD_DIR)
    #[clap(long, short)]
    pub output: Option<PathBuf>,

    /// Replace files that already exist
    #[clap(long)]
    pub overwrite: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct CompletionsOption {
    shell: Shell,
}

#[tokio::main]
async fn main() {
    logging::init();

    if let Err(e) = config::load_env().await {
        error!("Cannot load environment. Err: {}", e);
    }

    let cli = Cli::parse();

    match cli.command {
        Command::Login => cli::login().await,
        Command::Logout => cli::logout().await,
        Command::Status => cli::status().await,
        Command::Resolve(opt) => cli::resolve(opt.id, opt.kind).await,
        Command::Play(opt) => cli::play(opt.id, opt.kind).await,
        Command::Download(opt) => {
            cli::download(opt.target.id, opt.target.kind, opt.output, opt.overwrite).await
        }
        Command::Completions(opt) => {
            let mut cmd = Cli::command_for_update();
            let name = cmd.get_name().to_string();
            generate(opt.shell, &mut cmd, name, &mut std::io::stdout())
        }
    }
}
