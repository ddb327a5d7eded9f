//! CLI argument definitions for the cfai installer.
//!
//! Every option that shapes where the binary comes from or goes to can also
//! be set through a `CFAI_*` environment variable, so the installer works
//! unchanged when piped from a one-line bootstrap script.

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};

use crate::fetch::MirrorMode;
use crate::release::DEFAULT_API_URL;
use crate::resolver::TieBreak;

/// Default `owner/name` repository that publishes the binary.
pub const DEFAULT_REPO: &str = "DoBestone/cfai";

/// Install or update the cfai command-line tool from GitHub Releases.
#[derive(Parser, Debug)]
#[command(name = "cfai-installer")]
#[command(version, about)]
#[command(long_about = concat!(
    "Install or update the cfai command-line tool from GitHub Releases.\n\n",
    "The installer picks the release asset built for this platform, downloads it ",
    "(through a mirror when the direct path is degraded), unpacks it when it is an ",
    "archive, and places the binary in the install directory. `update` skips all ",
    "of this when the installed binary already reports the latest version.",
))]
#[command(after_help = concat!(
    "ENVIRONMENT:\n",
    "  CFAI_REPO          Repository to install from (owner/name)\n",
    "  CFAI_BIN_NAME      Binary name (defaults to the repository name)\n",
    "  CFAI_INSTALL_DIR   Preferred install directory\n",
    "  CFAI_PATH          Binary to update\n",
    "  CFAI_MIRROR        Mirror base URL prefixed to download URLs\n",
    "  CFAI_MIRROR_MODE   auto, always or never\n",
    "  CFAI_API_URL       Release API base URL\n\n",
    "EXAMPLES:\n",
    "  Install the latest release:\n",
    "    $ cfai-installer install\n\n",
    "  Install a specific release into your home directory:\n",
    "    $ cfai-installer install --version v1.2.0 --dir ~/.local/bin\n\n",
    "  Update in place, using sudo if the binary lives in a system directory:\n",
    "    $ cfai-installer update --elevate\n",
))]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Install the binary for the first time.
    Install(InstallArgs),

    /// Replace an installed binary with the latest release.
    Update(UpdateArgs),
}

/// Options shared by `install` and `update`.
#[derive(Args, Debug, Clone)]
pub struct ReleaseArgs {
    /// Repository publishing the releases.
    #[arg(
        long,
        env = "CFAI_REPO",
        default_value = DEFAULT_REPO,
        value_name = "OWNER/NAME",
        value_parser = parse_repo
    )]
    pub repo: String,

    /// Binary name, also used to match asset names [default: repository name].
    #[arg(long, env = "CFAI_BIN_NAME", value_name = "NAME")]
    pub bin_name: Option<String>,

    /// Release tag to install instead of the latest release.
    #[arg(long = "version", value_name = "TAG")]
    pub tag: Option<String>,

    /// Exact asset name to download, bypassing platform matching.
    #[arg(long, value_name = "NAME")]
    pub asset: Option<String>,

    /// Tie-break among several matching assets.
    #[arg(long, default_value_t = TieBreak::LargestSize, value_name = "first|largest")]
    pub prefer: TieBreak,

    /// Mirror base URL; downloads try `<MIRROR>/<url>` first when used.
    #[arg(long, env = "CFAI_MIRROR", value_name = "URL")]
    pub mirror: Option<String>,

    /// When to use the mirror.
    #[arg(
        long,
        env = "CFAI_MIRROR_MODE",
        default_value_t = MirrorMode::Auto,
        value_name = "auto|always|never"
    )]
    pub mirror_mode: MirrorMode,

    /// Release API base URL.
    #[arg(long, env = "CFAI_API_URL", default_value = DEFAULT_API_URL, value_name = "URL")]
    pub api_url: String,

    /// Use sudo when the install directory is not writable.
    #[arg(long)]
    pub elevate: bool,

    /// Overwrite an existing binary on install; skip the version check on update.
    #[arg(short, long)]
    pub force: bool,

    /// Increase log verbosity (repeatable: -v, -vv, -vvv).
    #[arg(
        short,
        long = "verbose",
        action = clap::ArgAction::Count,
        conflicts_with = "quiet"
    )]
    pub verbosity: u8,

    /// Suppress progress output (errors still shown).
    #[arg(short, long, conflicts_with = "verbosity")]
    pub quiet: bool,
}

/// Arguments for the install command.
#[derive(Args, Debug, Clone, Default)]
pub struct InstallArgs {
    /// Release selection and behaviour.
    #[command(flatten)]
    pub release: ReleaseArgs,

    /// Preferred install directory, or the full path of the binary
    /// [default: /usr/local/bin].
    #[arg(
        short,
        long,
        visible_alias = "path",
        env = "CFAI_INSTALL_DIR",
        value_name = "DIR"
    )]
    pub dir: Option<Utf8PathBuf>,
}

/// Arguments for the update command.
#[derive(Args, Debug, Clone, Default)]
pub struct UpdateArgs {
    /// Release selection and behaviour.
    #[command(flatten)]
    pub release: ReleaseArgs,

    /// Binary to update, or the directory holding it [default: found on PATH].
    #[arg(short, long, env = "CFAI_PATH", value_name = "PATH")]
    pub path: Option<Utf8PathBuf>,

    /// Install directory used when no binary is installed yet.
    #[arg(short, long, env = "CFAI_INSTALL_DIR", value_name = "DIR")]
    pub dir: Option<Utf8PathBuf>,
}

impl Default for ReleaseArgs {
    /// Creates `ReleaseArgs` matching the parser defaults with no
    /// environment overrides.
    ///
    /// # Examples
    ///
    /// ```
    /// use cfai_installer::cli::ReleaseArgs;
    ///
    /// let args = ReleaseArgs::default();
    /// assert_eq!(args.repo, "DoBestone/cfai");
    /// assert!(!args.force);
    /// ```
    fn default() -> Self {
        Self {
            repo: DEFAULT_REPO.to_owned(),
            bin_name: None,
            tag: None,
            asset: None,
            prefer: TieBreak::LargestSize,
            mirror: None,
            mirror_mode: MirrorMode::Auto,
            api_url: DEFAULT_API_URL.to_owned(),
            elevate: false,
            force: false,
            verbosity: 0,
            quiet: false,
        }
    }
}

impl Command {
    /// The shared release arguments of either subcommand.
    #[must_use]
    pub fn release_args(&self) -> &ReleaseArgs {
        match self {
            Self::Install(args) => &args.release,
            Self::Update(args) => &args.release,
        }
    }
}

/// Accept `owner/name` repository identifiers.
fn parse_repo(raw: &str) -> Result<String, String> {
    let trimmed = raw.trim().trim_matches('/');
    match trimmed.split_once('/') {
        Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {
            Ok(trimmed.to_owned())
        }
        _ => Err(format!("expected OWNER/NAME, got \"{raw}\"")),
    }
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
