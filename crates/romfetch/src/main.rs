use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use romfetch_core::config::AppConfig;
use romfetch_core::destination::resolve_destination;
use romfetch_core::disk::{disk_space, DiskLevel};
use romfetch_core::models::{
    existing_destinations, format_size, ConnectTarget, SortOrder, TransferJob,
};
use romfetch_engine::{Engine, EngineEvent, TransferEvent};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing_subscriber::EnvFilter;

/// Browse an SFTP server or mounted share and copy games to local disk.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List a folder
    Browse(BrowseArgs),
    /// Copy files or folders into the download directory
    Get(GetArgs),
    /// Show completed transfers
    History {
        /// Number of entries to show
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,
        /// Delete the whole history
        #[arg(long)]
        clear: bool,
    },
    /// Forget the saved password for USER@HOST
    Forget { key: String },
    /// Show or change settings
    Config(ConfigArgs),
}

#[derive(Args, Debug)]
struct ConnectArgs {
    /// sftp://[user[:password]@]host[:port][/path] or a local path.
    /// Defaults to the saved network path when auto connect is on.
    #[arg(short, long)]
    address: Option<String>,

    /// Save the password after a successful login
    #[arg(long)]
    remember: bool,
}

#[derive(Args, Debug)]
struct BrowseArgs {
    #[command(flatten)]
    connect: ConnectArgs,

    /// Folder to list (defaults to the address root)
    path: Option<String>,

    /// Only show entries whose name contains this text
    #[arg(short, long)]
    filter: Option<String>,

    #[arg(short, long, value_enum, default_value_t = SortArg::Name)]
    sort: SortArg,
}

#[derive(Args, Debug)]
struct GetArgs {
    #[command(flatten)]
    connect: ConnectArgs,

    /// Source paths, as shown by `browse`
    #[arg(required = true)]
    paths: Vec<String>,

    /// Destination root (defaults to the configured download path)
    #[arg(short, long)]
    dest: Option<PathBuf>,

    /// Overwrite existing files without asking
    #[arg(short, long)]
    yes: bool,
}

#[derive(Args, Debug)]
struct ConfigArgs {
    #[arg(long)]
    network_path: Option<String>,
    #[arg(long)]
    download_path: Option<PathBuf>,
    #[arg(long)]
    auto_connect: Option<bool>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum SortArg {
    Name,
    Size,
}

impl From<SortArg> for SortOrder {
    fn from(arg: SortArg) -> Self {
        match arg {
            SortArg::Name => SortOrder::Name,
            SortArg::Size => SortOrder::Size,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("romfetch=info,warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    tracing::debug!("Starting romfetch v{}", romfetch_core::VERSION);

    let mut config = AppConfig::load().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config, using defaults: {}", e);
        AppConfig::default()
    });

    if let Command::Config(args) = &cli.command {
        return configure(&mut config, args);
    }

    let (engine, events) = Engine::from_config(&config).context("Failed to open config directory")?;

    match cli.command {
        Command::Browse(args) => browse(&engine, &mut config, args).await,
        Command::Get(args) => get(&engine, events, &mut config, args).await,
        Command::History { limit, clear } => history(&engine, limit, clear),
        Command::Forget { key } => forget(&engine, &key),
        Command::Config(_) => Ok(()),
    }
}

/// Connect to the given or saved address and remember it.
async fn connect(engine: &Engine, config: &mut AppConfig, args: &ConnectArgs) -> Result<String> {
    let address = match (&args.address, config.connection.saved_address()) {
        (Some(address), _) => address.clone(),
        (None, Some(saved)) => {
            tracing::info!("Using saved address {}", saved);
            saved.to_string()
        }
        (None, None) => bail!(
            "No address given; pass --address, or save one and turn on `config --auto-connect true`"
        ),
    };

    let connection = engine.connect(&address, args.remember).await?;
    eprintln!("Connected to {}", connection.connection_string());

    // Never persist an inline password.
    let display = ConnectTarget::parse(&address)?.to_string();
    config.connection.network_path = display.clone();
    config.add_recent_connection(&display);
    if let Err(e) = config.save() {
        tracing::warn!("Could not save config: {}", e);
    }
    Ok(connection.root_path)
}

async fn browse(engine: &Engine, config: &mut AppConfig, args: BrowseArgs) -> Result<()> {
    let root = connect(engine, config, &args.connect).await?;
    let path = args.path.unwrap_or(root);
    let order = SortOrder::from(args.sort);

    let lister = engine.lister();
    let mut entries = lister.list(&path, order).await?;
    if let Some(query) = &args.filter {
        entries = lister.filtered(query, order);
    }

    println!("{}", path);
    for entry in &entries {
        let size = if entry.is_dir {
            "<DIR>".to_string()
        } else {
            entry.size_display()
        };
        println!("  {:>10}  {}", size, entry.name);
    }
    eprintln!("{} item(s)", entries.len());
    Ok(())
}

async fn get(
    engine: &Engine,
    mut events: UnboundedReceiver<EngineEvent>,
    config: &mut AppConfig,
    args: GetArgs,
) -> Result<()> {
    connect(engine, config, &args.connect).await?;
    let dest_root = args
        .dest
        .clone()
        .unwrap_or_else(|| config.transfer.download_path.clone());

    let mut jobs = Vec::with_capacity(args.paths.len());
    for path in &args.paths {
        let entry = engine.lister().stat(path).await?;
        let browsed_folder = Path::new(path)
            .parent()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let dest_dir = resolve_destination(&dest_root, &browsed_folder);
        jobs.push(if entry.is_dir {
            TransferJob::folder(entry.absolute_path, entry.name, dest_dir)
        } else {
            TransferJob::file(entry.absolute_path, entry.name, dest_dir)
        });
    }

    let existing = existing_destinations(&jobs);
    if !existing.is_empty() && !args.yes {
        eprintln!("Already present:");
        for job in &existing {
            eprintln!("  {}", job.destination_path().display());
        }
        if !confirm("Overwrite?").await? {
            eprintln!("Nothing copied");
            return Ok(());
        }
    }

    match disk_space(&dest_root) {
        Some(space) => {
            let planned = engine.planned_bytes(&jobs).await?;
            eprintln!("{}: {}", dest_root.display(), space);
            if !space.fits(planned) {
                tracing::warn!(
                    "{} to copy but only {} free",
                    format_size(planned),
                    format_size(space.free_bytes)
                );
                if !args.yes && !confirm("Not enough free space. Continue anyway?").await? {
                    eprintln!("Nothing copied");
                    return Ok(());
                }
            } else if space.level() != DiskLevel::Plenty {
                tracing::warn!("Download disk is low on space: {}", space);
            }
        }
        None => tracing::debug!("Free space unknown for {}", dest_root.display()),
    }

    engine.start_batch(jobs)?;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut cancelled = false;
    loop {
        tokio::select! {
            _ = &mut ctrl_c, if !cancelled => {
                eprintln!("\nCancelling...");
                engine.cancel();
                cancelled = true;
            }
            event = events.recv() => {
                let event = match event {
                    Some(EngineEvent::Transfer(event)) => event,
                    Some(_) => continue,
                    None => bail!("Transfer ended unexpectedly"),
                };
                match event {
                    TransferEvent::JobStarted { job, .. } => {
                        eprintln!("{} -> {}", job.source_path, job.destination_path().display());
                    }
                    TransferEvent::Progress(progress) => {
                        if !progress.state.is_terminal() {
                            eprint!("\r{}    ", progress.status_line());
                            let _ = std::io::stderr().flush();
                        }
                    }
                    TransferEvent::FileSkipped { path, error, .. } => {
                        eprintln!("\nSkipped {}: {}", path, error);
                    }
                    TransferEvent::JobFinished { progress, error, .. } => {
                        match error {
                            Some(error) => eprintln!("\nFailed: {}", error),
                            None => eprintln!("\r{}    ", progress.status_line()),
                        }
                    }
                    TransferEvent::BatchFinished(summary) => {
                        println!("{}", summary.summary_line());
                        if summary.jobs_failed > 0 {
                            bail!("{} item(s) failed", summary.jobs_failed);
                        }
                        return Ok(());
                    }
                    TransferEvent::BatchStarted { .. } => {}
                }
            }
        }
    }
}

async fn confirm(question: &str) -> Result<bool> {
    eprint!("{} [y/N] ", question);
    std::io::stderr().flush()?;
    let mut answer = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut answer)
        .await?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}

fn history(engine: &Engine, limit: usize, clear: bool) -> Result<()> {
    let log = engine.history();
    if clear {
        log.clear()?;
        eprintln!("History cleared");
        return Ok(());
    }
    for record in log.recent(limit) {
        println!(
            "{}  {:>10}  {}  ->  {}",
            record.timestamp.format("%Y-%m-%d %H:%M"),
            format_size(record.size_bytes),
            record.name,
            record.dest
        );
    }
    Ok(())
}

fn forget(engine: &Engine, key: &str) -> Result<()> {
    let Some((user, host)) = key.split_once('@') else {
        bail!("Expected USER@HOST, got '{}'", key);
    };
    if engine.credentials().forget(user, host)? {
        eprintln!("Forgot password for {}", key);
    } else {
        eprintln!("No saved password for {}", key);
    }
    Ok(())
}

fn configure(config: &mut AppConfig, args: &ConfigArgs) -> Result<()> {
    let mut changed = false;
    if let Some(path) = &args.network_path {
        config.connection.network_path = path.clone();
        changed = true;
    }
    if let Some(path) = &args.download_path {
        config.transfer.download_path = path.clone();
        changed = true;
    }
    if let Some(auto) = args.auto_connect {
        config.connection.auto_connect = auto;
        changed = true;
    }
    if changed {
        config.save()?;
    }

    println!("config file:     {}", AppConfig::config_path().display());
    println!("network path:    {}", config.connection.network_path);
    println!("download path:   {}", config.transfer.download_path.display());
    if let Some(space) = disk_space(&config.transfer.download_path) {
        println!("disk space:      {}", space);
    }
    println!("auto connect:    {}", config.connection.auto_connect);
    if !config.connection.recent_connections.is_empty() {
        println!("recent:");
        for address in &config.connection.recent_connections {
            println!("  {}", address);
        }
    }
    Ok(())
}
