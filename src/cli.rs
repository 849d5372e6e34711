use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::Level;

use crate::api::ApiRequest;
use crate::archive::ArchiveFormat;
use crate::catalog::{Category, ItemEncoding};
use crate::config::{DEFAULT_SCRIPT_EXTENSION, DEFAULT_SIDECAR, ShelfConfig};

#[derive(Parser, Debug)]
#[command(name = "scriptshelf")]
#[command(version)]
#[command(
    about = "Browse and download scripts and configs from a shelf directory",
    long_about = None
)]
#[command(after_help = "Examples:\n  \
  scriptshelf list module                  list module descriptors as JSON\n  \
  scriptshelf get config \"Fluro UI\" icon.png > icon.png\n  \
  scriptshelf download config fluro -p | tar -tz   (with --config-format tar-gz)")]
pub struct Cli {
    /// Shelf root holding the category directories
    #[arg(long, global = true, env = "SCRIPTSHELF_ROOT", default_value = ".", value_name = "DIR")]
    pub root: PathBuf,

    /// Module directory, relative to the root
    #[arg(long, global = true, env = "SCRIPTSHELF_MODULE_DIR", value_name = "DIR")]
    pub module_dir: Option<PathBuf>,

    /// Command directory, relative to the root
    #[arg(long, global = true, env = "SCRIPTSHELF_COMMAND_DIR", value_name = "DIR")]
    pub command_dir: Option<PathBuf>,

    /// Config directory, relative to the root
    #[arg(long, global = true, env = "SCRIPTSHELF_CONFIG_DIR", value_name = "DIR")]
    pub config_dir: Option<PathBuf>,

    /// Script extension for modules and commands
    #[arg(long, global = true, default_value = DEFAULT_SCRIPT_EXTENSION, value_name = "EXT")]
    pub script_ext: String,

    /// Descriptor file inside each config directory
    #[arg(long, global = true, default_value = DEFAULT_SIDECAR, value_name = "FILE")]
    pub sidecar: String,

    /// Archive format for modules and commands
    #[arg(long, global = true, value_enum, default_value = "tar-gz")]
    pub script_format: ArchiveFormat,

    /// Archive format for configs
    #[arg(long, global = true, value_enum, default_value = "zip")]
    pub config_format: ArchiveFormat,

    /// More logging (-vv => trace)
    #[arg(short = 'v', global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Less logging (-qq => errors only)
    #[arg(short = 'q', global = true, action = clap::ArgAction::Count)]
    pub quiet: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the descriptors of one category
    List { category: String },

    /// Print the descriptors of every category
    All,

    /// Write one file of an item to stdout
    Get {
        category: String,
        name: String,
        /// File inside a config item; omit for scripts
        file: Option<String>,
    },

    /// Download an item as an archive
    Download {
        category: String,
        name: String,

        /// Output path (default: ./<id>.<ext>)
        #[arg(short = 'o', value_name = "PATH", conflicts_with = "pipe")]
        output: Option<PathBuf>,

        /// Write the archive to stdout
        #[arg(short = 'p')]
        pipe: bool,

        /// Overwrite an existing output file
        #[arg(short = 'f', long)]
        force: bool,
    },
}

impl Cli {
    pub fn config(&self) -> ShelfConfig {
        let mut config = ShelfConfig::with_defaults(&self.root);

        for layout in &mut config.categories {
            let dir = match layout.category {
                Category::Module => &self.module_dir,
                Category::Command => &self.command_dir,
                Category::Generic => &self.config_dir,
            };
            if let Some(dir) = dir {
                layout.dir = dir.clone();
            }

            match layout.encoding {
                ItemEncoding::Header { .. } => {
                    layout.encoding = ItemEncoding::header(&self.script_ext);
                    layout.format = self.script_format;
                }
                ItemEncoding::Sidecar { .. } => {
                    layout.encoding = ItemEncoding::sidecar(&self.sidecar);
                    layout.format = self.config_format;
                }
            }
        }

        config
    }

    pub fn log_level(&self) -> Level {
        match self.verbose as i16 - self.quiet as i16 {
            i16::MIN..=-2 => Level::ERROR,
            -1 => Level::WARN,
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose > 0
    }

    pub fn request(&self) -> ApiRequest {
        match &self.command {
            Command::List { category } => ApiRequest::list(category),
            Command::All => ApiRequest::metadata_list(),
            Command::Get {
                category,
                name,
                file,
            } => ApiRequest::get_file(category, name, file.clone()),
            Command::Download { category, name, .. } => ApiRequest::download(category, name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Operation;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("scriptshelf").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn overrides_apply_to_layouts() {
        let cli = parse(&[
            "--root",
            "/srv/shelf",
            "--config-dir",
            "themes",
            "--script-ext",
            ".luau",
            "--config-format",
            "tar-gz",
            "all",
        ]);
        let config = cli.config();

        let generic = config.layout(Category::Generic).unwrap();
        assert_eq!(config.category_dir(generic), PathBuf::from("/srv/shelf/themes"));
        assert_eq!(generic.format, ArchiveFormat::TarGz);

        let module = config.layout(Category::Module).unwrap();
        assert_eq!(module.encoding, ItemEncoding::header("luau"));
        assert_eq!(cli.request(), ApiRequest::metadata_list());
    }

    #[test]
    fn commands_map_to_requests() {
        let cli = parse(&["get", "config", "Fluro UI", "icon.png"]);
        assert_eq!(
            cli.request().operation,
            Operation::GetFile {
                filename: Some("icon.png".into())
            }
        );

        let cli = parse(&["-vv", "download", "module", "zoom", "-p"]);
        assert_eq!(cli.request(), ApiRequest::download("module", "zoom"));
        assert_eq!(cli.log_level(), Level::TRACE);

        let both = ["scriptshelf", "download", "module", "zoom", "-p", "-o", "x"];
        assert!(Cli::try_parse_from(both).is_err());
    }

    #[test]
    fn quiet_lowers_level() {
        assert_eq!(parse(&["-q", "all"]).log_level(), Level::WARN);
        assert_eq!(parse(&["-qqq", "all"]).log_level(), Level::ERROR);
    }
}
