// src/main.rs
//! Clipboard Image Saver
//!
//! Command line front end: watch the clipboard and save every new image into
//! a folder, open that folder, and manage the optional Google Sheets sync.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use clipboard_image_saver::config::{APP_NAME, GOOGLE_SETTINGS_FILE, POLL_INTERVAL};
use clipboard_image_saver::core::{
    shutdown_channel, ClipboardWatcher, ImageFolder, SystemClipboard, WatcherConfig,
};
use clipboard_image_saver::google::GoogleSheetSync;
use clipboard_image_saver::listeners::{
    spawn_sync_worker, ConsoleReporter, FileEventLogger, OutputFormat, SyncStats,
};
use clipboard_image_saver::settings::{AuthMode, GoogleSyncSettings, SettingsUpdate};

/// How long pending uploads may take to finish after Ctrl+C
const SYNC_DRAIN_TIMEOUT: Duration = Duration::from_secs(60);

/// Command line interface for the clipboard image saver
#[derive(Debug, Parser)]
#[command(
    name = "clip-saver",
    version,
    about = "Saves images that appear in the clipboard (screenshots, copied pictures)",
    long_about = "Polls the clipboard and writes every new image into a folder as img_1.png, img_2.png, ... Optionally uploads each image to Google Drive and embeds it into the Google Sheets cell that contains a search term."
)]
struct Args {
    /// Verbosity level for logging
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Google sync settings file
    #[arg(long, global = true, default_value = GOOGLE_SETTINGS_FILE)]
    settings: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Watch the clipboard and save new images until Ctrl+C
    Watch {
        /// Folder for saved images (created if missing)
        #[arg(short, long)]
        folder: PathBuf,

        /// Clipboard poll interval in milliseconds
        #[arg(long, default_value_t = POLL_INTERVAL.as_millis() as u64,
              value_parser = clap::value_parser!(u64).range(50..))]
        interval_ms: u64,

        /// Do not start Google sync even if it is enabled in the settings
        #[arg(long)]
        no_sync: bool,

        /// Output format for status lines
        #[arg(long, default_value = "human", value_enum)]
        format: OutputFormat,

        /// Append structured events to this file
        #[arg(long)]
        output_file: Option<PathBuf>,
    },

    /// Open a folder in the file manager
    OpenFolder {
        folder: PathBuf,
    },

    /// Show or change the Google sync settings
    SyncSettings {
        #[command(subcommand)]
        action: SettingsAction,
    },

    /// Upload one existing image and embed it into the sheet
    SyncFile {
        file: PathBuf,
    },
}

#[derive(Debug, Subcommand)]
enum SettingsAction {
    /// Print the current settings
    Show,
    /// Change settings; blank values restore defaults
    Set(SetArgs),
}

#[derive(Debug, clap::Args)]
struct SetArgs {
    /// Turn sync on or off
    #[arg(long)]
    enabled: Option<bool>,

    #[arg(long, value_enum)]
    auth_mode: Option<AuthMode>,

    /// Service account JSON key
    #[arg(long)]
    credentials_file: Option<String>,

    /// OAuth client secret (client_secret.json)
    #[arg(long)]
    client_secret_file: Option<String>,

    /// OAuth token cache (created/refreshed)
    #[arg(long)]
    token_file: Option<String>,

    #[arg(long)]
    spreadsheet_id: Option<String>,

    #[arg(long)]
    sheet_name: Option<String>,

    /// Text the target cell contains
    #[arg(long)]
    search_term: Option<String>,

    /// Drive folder for uploads (blank for none)
    #[arg(long)]
    drive_folder_id: Option<String>,
}

impl From<SetArgs> for SettingsUpdate {
    fn from(args: SetArgs) -> Self {
        SettingsUpdate {
            enabled: args.enabled,
            auth_mode: args.auth_mode,
            credentials_file: args.credentials_file,
            client_secret_file: args.client_secret_file,
            token_file: args.token_file,
            spreadsheet_id: args.spreadsheet_id,
            sheet_name: args.sheet_name,
            search_term: args.search_term,
            drive_folder_id: args.drive_folder_id,
        }
    }
}

/// Options for one watch session
struct WatchOptions {
    folder: PathBuf,
    interval: Duration,
    no_sync: bool,
    format: OutputFormat,
    output_file: Option<PathBuf>,
}

struct SaverApp {
    settings_path: PathBuf,
    start_time: Instant,
}

impl SaverApp {
    fn new(args: &Args) -> Result<Self> {
        Self::setup_logging(args.verbose)?;
        info!("🚀 Starting {} v{}", APP_NAME, env!("CARGO_PKG_VERSION"));

        Ok(Self {
            settings_path: args.settings.clone(),
            start_time: Instant::now(),
        })
    }

    /// Watch until Ctrl+C, then let queued uploads finish
    async fn watch(&self, options: WatchOptions) -> Result<()> {
        let config = WatcherConfig::new(&options.folder).with_poll_interval(options.interval);
        let mut watcher = ClipboardWatcher::new(SystemClipboard::new(), config)
            .context("Could not create/open folder")?;

        watcher.add_listener(ConsoleReporter::new(options.format));

        if let Some(path) = &options.output_file {
            let logger = FileEventLogger::new(path.clone())
                .with_context(|| format!("Could not open output file {}", path.display()))?;
            watcher.add_listener(logger);
            info!("📁 File output enabled: {}", path.display());
        }

        let sync_worker = if options.no_sync {
            info!("Google Sheets sync skipped (--no-sync)");
            None
        } else {
            let settings = GoogleSyncSettings::load(&self.settings_path);
            let (queue, handle) = spawn_sync_worker(settings);
            watcher.add_listener(queue);
            Some(handle)
        };

        let (shutdown, token) = shutdown_channel();
        let mut watch_task = tokio::spawn(watcher.run(token));

        let watcher = tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    warn!("Could not listen for Ctrl+C: {}", e);
                }
                info!("🛑 Initiating graceful shutdown...");
                shutdown.shutdown();
                watch_task.await
            }
            result = &mut watch_task => result,
        };
        let watcher = watcher
            .context("Watcher task failed")?
            .context("Clipboard poll failed")?;
        let saved = watcher.saved_count();
        // Dropping the watcher closes the sync queue.
        drop(watcher);

        if let Some(handle) = sync_worker {
            match tokio::time::timeout(SYNC_DRAIN_TIMEOUT, handle).await {
                Ok(Ok(stats)) if stats != SyncStats::default() => info!(
                    "Google sync: {} uploaded, {} failed, {} skipped",
                    stats.uploaded, stats.failed, stats.skipped
                ),
                Ok(Ok(_)) => {}
                Ok(Err(e)) => warn!("Sync worker failed: {}", e),
                Err(_) => warn!("Gave up waiting for pending uploads"),
            }
        }

        info!(
            "📊 Session completed. {} image(s) saved in {:.1}s",
            saved,
            self.start_time.elapsed().as_secs_f64()
        );
        Ok(())
    }

    fn open_folder(&self, folder: &Path) -> Result<()> {
        ImageFolder::open_in_file_manager(folder)
            .with_context(|| format!("Could not open {}", folder.display()))
    }

    fn show_settings(&self) -> Result<()> {
        let settings = GoogleSyncSettings::load(&self.settings_path);
        println!("# {}", self.settings_path.display());
        println!("{}", serde_json::to_string_pretty(&settings)?);
        Ok(())
    }

    fn update_settings(&self, update: SettingsUpdate) -> Result<()> {
        let mut settings = GoogleSyncSettings::load(&self.settings_path);
        settings.apply(update);
        settings
            .save(&self.settings_path)
            .context("Could not save Google sync settings")?;
        info!(
            "Google sync settings saved (enabled={}, mode={}).",
            settings.enabled, settings.auth_mode
        );
        Ok(())
    }

    async fn sync_file(&self, file: &Path) -> Result<()> {
        if !file.is_file() {
            anyhow::bail!("No such image: {}", file.display());
        }
        let settings = GoogleSyncSettings::load(&self.settings_path);
        let sync = GoogleSheetSync::new(settings)
            .await
            .context("Google Sheets sync not started")?;
        let result = sync
            .upload_and_update(file)
            .await
            .context("Google sync error")?;
        println!("Uploaded to Sheets ({}) via {}", result.cell, result.link);
        Ok(())
    }

    /// Set up logging based on verbosity level
    fn setup_logging(verbose: u8) -> Result<()> {
        use tracing_subscriber::{fmt, EnvFilter};

        let level = match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        };

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

        fmt()
            .with_env_filter(filter)
            .with_target(verbose > 1)
            .with_thread_ids(verbose > 2)
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let app = SaverApp::new(&args).context("Failed to initialize application")?;

    match args.command {
        Command::Watch {
            folder,
            interval_ms,
            no_sync,
            format,
            output_file,
        } => {
            app.watch(WatchOptions {
                folder,
                interval: Duration::from_millis(interval_ms),
                no_sync,
                format,
                output_file,
            })
            .await
        }
        Command::OpenFolder { folder } => app.open_folder(&folder),
        Command::SyncSettings { action } => match action {
            SettingsAction::Show => app.show_settings(),
            SettingsAction::Set(set) => app.update_settings(set.into()),
        },
        Command::SyncFile { file } => app.sync_file(&file).await,
    }
}
