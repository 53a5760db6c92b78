//! area-tile
//!
//! A master/stack tiling window manager for X11, written in Rust.

mod config;
mod wm;
mod x11_async;

use anyhow::{Context, Result, bail};
use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::signal::unix::{SignalKind, signal};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::wm::display::X11Display;
use crate::wm::{Control, WindowManager};
use crate::x11_async::X11EventStream;

/// Main application state
struct AreaTile {
    /// Protocol side of the window manager
    display: X11Display,

    /// Readability notifications for the X11 socket
    x11_stream: X11EventStream,

    /// Window-management core
    wm: WindowManager,

    /// Alternate config file from `--config`
    config_path: Option<PathBuf>,
}

impl AreaTile {
    fn new(config: Config, config_path: Option<PathBuf>) -> Result<Self> {
        let (conn, screen_num) = x11rb::connect(None).context("Failed to connect to X server")?;
        let conn = Arc::new(conn);
        info!("Connected to X server, screen {}", screen_num);

        let display = X11Display::new(conn.clone(), screen_num)?;
        let root = display.root();
        info!("Managing root window 0x{:x}", root);
        let mut wm = WindowManager::new(&config, display.screen())?;
        let x11_stream = X11EventStream::new(conn)?;

        wm.start(&display)?;
        Ok(Self {
            display,
            x11_stream,
            wm,
            config_path,
        })
    }

    async fn run(mut self) -> Result<()> {
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        info!("Starting main event loop");

        loop {
            // Replies may have buffered events, so drain before waiting
            while let Some(event) = self
                .x11_stream
                .poll_next_event()
                .context("X11 connection lost")?
            {
                let Some(event) = self.display.translate(&event) else {
                    continue;
                };
                if let Err(e) = self.wm.handle_event(&self.display, event) {
                    warn!("Failed to handle {:?}: {:#}", event, e);
                }
                match self.wm.take_control() {
                    Some(Control::Reload) => self.reload(),
                    Some(Control::Quit) => return self.shutdown("quit requested"),
                    None => {}
                }
            }

            self.x11_stream.flush().context("Failed to flush X11 requests")?;

            let stop = tokio::select! {
                () = self.x11_stream.wait_readable() => None,
                _ = sigterm.recv() => Some("SIGTERM"),
                _ = sigint.recv() => Some("SIGINT"),
            };
            if let Some(reason) = stop {
                return self.shutdown(reason);
            }
        }
    }

    /// Reload settings and key bindings in place. A broken config file
    /// keeps the running configuration.
    fn reload(&mut self) {
        let config = match Config::load(self.config_path.as_deref()) {
            Ok(config) => config,
            Err(e) => {
                error!("Reload aborted: {:#}", e);
                return;
            }
        };
        if let Err(e) = self.wm.reload(&self.display, &config) {
            error!("Reload failed: {:#}", e);
        }
    }

    fn shutdown(mut self, reason: &str) -> Result<()> {
        info!(
            "Shutting down ({}), {} managed windows",
            reason,
            self.wm.registry().len()
        );
        self.wm.teardown(&self.display)
    }
}

/// Log to `~/.local/share/area-tile/area-tile.log` and stderr
fn init_logging() -> Result<PathBuf> {
    let log_dir = dirs::data_dir()
        .context("Failed to get data directory")?
        .join("area-tile");
    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;
    let log_path = log_dir.join("area-tile.log");
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {:?}", log_path))?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "area_tile=debug,info".into()),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(log_file)),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
    Ok(log_path)
}

struct Args {
    config_path: Option<PathBuf>,
    check_config: bool,
}

fn parse_args() -> Result<Args> {
    let mut args = Args {
        config_path: None,
        check_config: false,
    };
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                let path = iter.next().context("--config needs a path")?;
                args.config_path = Some(PathBuf::from(path));
            }
            "--check-config" => args.check_config = true,
            other => bail!("Unknown argument {:?} (expected --config <path> or --check-config)", other),
        }
    }
    Ok(args)
}

#[tokio::main]
async fn main() -> Result<()> {
    let log_path = init_logging()?;
    info!("Starting area-tile, logging to {:?}", log_path);

    let args = parse_args()?;

    if args.check_config {
        let path = match args.config_path {
            Some(path) => path,
            None => Config::config_path()?,
        };
        Config::load_from(&path)?;
        info!("Configuration {:?} is valid", path);
        return Ok(());
    }

    let config = Config::load(args.config_path.as_deref()).context("Failed to load configuration")?;
    debug!("Window manager settings: {:?}", config.window_manager);
    wm::spawn::ignore_sigchld()?;

    let app = match AreaTile::new(config, args.config_path) {
        Ok(app) => app,
        Err(e) => {
            error!("Startup failed: {:#}", e);
            return Err(e);
        }
    };
    app.run().await
}
