use anyhow::{Result, anyhow};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use metapack::artifact::DirArtifactResolver;
use metapack::catalog::{PACKAGES_FILENAME, PackageCatalog};
use metapack::consistency::verify_consistency;
use metapack::importer::ZipImporterFactory;
use metapack::install::{install_all, install_subset};
use metapack::runtime::{RealRuntime, Runtime};
use metapack::store::JsonFileStore;

/// metapack - metadata package installer
///
/// Installs versioned metadata packages exactly once, and verifies that the
/// configured package set does not carry order-dependent item conflicts.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Catalog file listing the configured packages (also via METAPACK_CATALOG)
    #[arg(
        long = "catalog",
        short = 'c',
        env = "METAPACK_CATALOG",
        value_name = "PATH",
        default_value = PACKAGES_FILENAME,
        global = true
    )]
    catalog: PathBuf,

    /// Directory holding the package artifacts (also via METAPACK_ARTIFACTS)
    #[arg(
        long = "artifacts",
        short = 'a',
        env = "METAPACK_ARTIFACTS",
        value_name = "DIR",
        default_value = ".",
        global = true
    )]
    artifacts: PathBuf,

    /// Installed-version state file (defaults to <data_dir>/metapack/installed.json)
    #[arg(
        long = "state",
        env = "METAPACK_STATE",
        value_name = "PATH",
        global = true
    )]
    state: Option<PathBuf>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Install every catalog package whose version is newer than installed
    Install(InstallArgs),

    /// Check the catalog for order-dependent item conflicts
    Verify(VerifyArgs),
}

#[derive(clap::Args, Debug)]
struct InstallArgs {
    /// Restrict installation to the named packages
    #[arg(long = "only", value_name = "NAME")]
    only: Vec<String>,
}

#[derive(clap::Args, Debug)]
struct VerifyArgs {}

fn state_path(runtime: &RealRuntime, state: Option<PathBuf>) -> Result<PathBuf> {
    match state {
        Some(path) => Ok(path),
        None => runtime
            .data_dir()
            .map(|dir| dir.join("metapack").join("installed.json"))
            .ok_or_else(|| anyhow!("Cannot determine the data directory; pass --state")),
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    let runtime = Arc::new(RealRuntime);
    let catalog = PackageCatalog::load(runtime.as_ref(), &cli.catalog)?;
    let resolver = DirArtifactResolver::new(Arc::clone(&runtime), cli.artifacts.clone());

    match cli.command {
        Commands::Install(args) => {
            let state = state_path(runtime.as_ref(), cli.state)?;
            let store = Arc::new(JsonFileStore::new(Arc::clone(&runtime), state));
            let factory = ZipImporterFactory::new(
                Arc::clone(&store) as Arc<dyn metapack::store::InstalledVersionStore>
            );

            let changed = if args.only.is_empty() {
                install_all(&catalog, store.as_ref(), &resolver, &factory)?
            } else {
                install_subset(&catalog, &args.only, store.as_ref(), &resolver, &factory)?
            };

            if changed {
                println!("Metadata packages installed.");
            } else {
                println!("No changes; all metadata packages already installed.");
            }
        }
        Commands::Verify(_args) => {
            // Verification never commits, so it needs no durable state; the
            // zip importer only touches the store on the install path.
            let store = Arc::new(NoState);
            let factory = ZipImporterFactory::new(store);

            let report = verify_consistency(&catalog, &resolver, &factory)?;
            println!("Total number of distinct items: {}", report.distinct_items);
            println!(
                "Number of distinct items in multiple packages: {}",
                report.shared.len()
            );
            for (key, owners) in &report.shared {
                println!("  {} -> {:?}", key, owners);
            }
        }
    }
    Ok(())
}

/// Store stand-in for the validation path, which never records anything.
struct NoState;

impl metapack::store::InstalledVersionStore for NoState {
    fn installed_version(&self, _group_id: &str) -> Result<Option<u32>> {
        Ok(None)
    }

    fn record_installed(&self, _group_id: &str, _version: u32) -> Result<()> {
        Err(anyhow!("the validation path must not record installs"))
    }
}
