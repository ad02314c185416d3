#![forbid(unsafe_code)]

use cairn::cli::{self as prog_cli, OutputMode};
use cairn::config;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// `cairn`: a deduplicating, content-addressed backup tool.
#[derive(Parser, Debug)]
#[command(name = "cairn", version, about = "Deduplicating, content-addressed backup tool", long_about = None)]
struct Cli {
    /// Path to a config file (TOML). Defaults to `~/.cairn`.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Block size in bytes for chunking regular files during persist.
    #[arg(long, global = true)]
    block_size: Option<usize>,
    /// Verbosity, 1 (errors only) through 8 (full trace).
    #[arg(long, global = true, default_value_t = 5, value_parser = clap::value_parser!(u8).range(1..=8))]
    verbosity: u8,
    /// Passphrase wrapping the chosen backend(s) in a `CipherBackend`.
    /// Pass `-` to be prompted for it instead of putting it in argv.
    #[arg(long, global = true)]
    crypto_key: Option<String>,
    /// Output rendering for subcommands that print structured results.
    #[arg(long, global = true, value_enum, default_value_t = FormatArg::Human)]
    format: FormatArg,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, clap::ValueEnum)]
enum FormatArg {
    Human,
    Plain,
    Json,
}

impl From<FormatArg> for OutputMode {
    fn from(f: FormatArg) -> Self {
        match f {
            FormatArg::Human => OutputMode::Human,
            FormatArg::Plain => OutputMode::Plain,
            FormatArg::Json => OutputMode::Json,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Persist a local directory tree as blocks + a manifest.
    Persist {
        /// Root of the directory tree to snapshot.
        src_path: PathBuf,
        /// Destination backend URI, or `manifest_uri,label,data_uri`.
        dst_uri: String,
    },
    /// Reconstruct a directory tree from a manifest and its blocks.
    Materialize {
        /// Source backend URI, or `manifest_uri,label,data_uri`.
        src_uri: String,
        /// Destination directory; must already exist.
        dst_path: PathBuf,
    },
    /// List manifest names known to a backend.
    #[command(name = "list-manifest")]
    ListManifest {
        /// Backend URI to list.
        uri: String,
    },
    /// Print block digests referenced by every one of the given manifests.
    #[command(name = "common-blocks")]
    CommonBlocks {
        /// Backend URI holding the manifests.
        uri: String,
        /// Manifest names to intersect (at least one).
        #[arg(required = true, num_args = 1..)]
        manifests: Vec<String>,
    },
    /// Fetch a single block by digest.
    #[command(name = "get-block")]
    GetBlock {
        /// Backend URI holding the block.
        uri: String,
        /// Hex digest naming the block.
        block: String,
        /// Local file to write to; defaults to stdout.
        local: Option<PathBuf>,
    },
    /// Re-hash every block a manifest references and confirm it matches.
    Verify {
        /// Source URI, or `manifest_uri,label,data_uri`.
        uri: String,
    },
    /// Exercise put/get/list/delete once against a backend.
    #[command(name = "test-backend")]
    TestBackend {
        /// Backend URI to probe.
        uri: String,
    },
    /// Reserved; not implemented in this version.
    #[command(name = "garbage-collect")]
    GarbageCollect,
}

fn main() {
    let cli = Cli::parse();
    let cfg = config::load(cli.config.as_deref());

    if let Err(e) = cairn::logger::init(cli.verbosity, cfg.log_config.as_deref()) {
        eprintln!("warning: failed to initialize logging: {e}");
    }

    let block_size = cli.block_size.or(cfg.block_size).unwrap_or(config::DEFAULT_BLOCK_SIZE);
    // `--crypto-key -` means "don't put the passphrase in argv or shell
    // history; prompt for it instead".
    let crypto_key = if cli.crypto_key.as_deref() == Some("-") {
        match rpassword::prompt_password("crypto key: ") {
            Ok(key) => Some(key),
            Err(e) => {
                eprintln!("error: failed to read crypto key from prompt: {e}");
                std::process::exit(1);
            }
        }
    } else {
        config::resolve_crypto_key(cfg.crypto_key_env.as_deref(), cli.crypto_key.as_deref())
    };
    let mode: OutputMode = cli.format.into();

    let command = match cli.command {
        Commands::Persist { src_path, dst_uri } => {
            prog_cli::Command::Persist { src_path, dst_uri, block_size, crypto_key }
        }
        Commands::Materialize { src_uri, dst_path } => prog_cli::Command::Materialize { src_uri, dst_path, crypto_key },
        Commands::ListManifest { uri } => prog_cli::Command::ListManifest { uri, crypto_key },
        Commands::CommonBlocks { uri, manifests } => prog_cli::Command::CommonBlocks { uri, manifests, crypto_key },
        Commands::GetBlock { uri, block, local } => prog_cli::Command::GetBlock { uri, block, local, crypto_key },
        Commands::Verify { uri } => prog_cli::Command::Verify { uri, crypto_key },
        Commands::TestBackend { uri } => prog_cli::Command::TestBackend { uri, crypto_key },
        Commands::GarbageCollect => prog_cli::Command::GarbageCollect,
    };

    if let Err(e) = prog_cli::run(command, mode) {
        log::error!("{e}");
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
