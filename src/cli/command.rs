//! The program-level `Command` enum: one variant per CLI subcommand,
//! decoupled from `clap`'s derive types so `cli::runner::run` can be
//! exercised directly from tests without going through argument parsing.

use std::path::PathBuf;

pub enum Command {
    /// `persist <src_path> <dst_uri>`
    Persist { src_path: PathBuf, dst_uri: String, block_size: usize, crypto_key: Option<String> },
    /// `materialize <src_uri> <dst_path>`
    Materialize { src_uri: String, dst_path: PathBuf, crypto_key: Option<String> },
    /// `list-manifest <uri>`
    ListManifest { uri: String, crypto_key: Option<String> },
    /// `common-blocks <uri> <mf...>`
    CommonBlocks { uri: String, manifests: Vec<String>, crypto_key: Option<String> },
    /// `get-block <uri> <block> [<local>]`
    GetBlock { uri: String, block: String, local: Option<PathBuf>, crypto_key: Option<String> },
    /// `verify <uri>`: re-hash every block a manifest references and
    /// confirm the stored content still matches its digest.
    Verify { uri: String, crypto_key: Option<String> },
    /// `test-backend <uri>`: exercise put/get/list/delete once to sanity
    /// check a backend is reachable and well-behaved.
    TestBackend { uri: String, crypto_key: Option<String> },
    /// Reserved; unreferenced-block collection is not implemented in v1.
    GarbageCollect,
}
