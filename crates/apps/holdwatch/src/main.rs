//! Holdwatch - Prints messages as they land in the Mimecast hold queue
//!
//! Opens a session with the configured credentials, starts a rolling feed
//! and writes one line per newly held message to stdout. Attachments whose
//! content type is not known to be safe are flagged; for sandbox-failure
//! holds they are also saved to `HOLDWATCH_SAVE_DIR` when it is set.
//!
//! Ctrl-C closes the feed, after which the session logs out before exit.

use std::env;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use chrono::Local;
use log::{error, info, warn};
use mimecast::{
    Attachment, ClientOptions, Credentials, FeedOptions, HeldMessage, RollingFeed,
    SAFE_CONTENT_TYPES, Session, download_file, message_detail,
};

const WINDOW_ENV: &str = "HOLDWATCH_WINDOW_MINUTES";
const POLL_ENV: &str = "HOLDWATCH_POLL_MINUTES";
const SAVE_DIR_ENV: &str = "HOLDWATCH_SAVE_DIR";

fn main() -> Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    // Bootstrap config directory
    if let Err(e) = config::init() {
        error!("Failed to initialize config directory: {}", e);
    }

    let credentials = match Credentials::load() {
        Ok(creds) => creds,
        Err(e) => {
            warn!("Mimecast credentials not found: {}", e);
            if let Some(path) = Credentials::default_credentials_path() {
                warn!(
                    "To configure Mimecast access, either:\n\
                     1. Place your API credentials at: {}\n\
                     2. Or set environment variables: MIMECAST_USER, MIMECAST_PASSWORD, \
                     MIMECAST_APP_ID and MIMECAST_APP_KEY",
                    path.display()
                );
            }
            return Err(e).context("no Mimecast credentials");
        }
    };

    let options = FeedOptions::minutes(
        minutes_from_env(WINDOW_ENV, 30)?,
        minutes_from_env(POLL_ENV, 1)?,
    );

    let session = Session::connect(credentials, &ClientOptions::default())
        .context("failed to open Mimecast session")?;
    info!(
        "Session open on {}",
        session.host().unwrap_or_else(|| "unknown host".to_string())
    );

    let save_dir = env::var_os(SAVE_DIR_ENV).map(PathBuf::from);
    if let Some(dir) = &save_dir {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }

    let feed = Arc::new(
        RollingFeed::start(session.shared(), options).context("failed to start feed")?,
    );
    close_on_interrupt(Arc::clone(&feed))?;
    info!("Watching the hold queue");

    for message in feed.iter() {
        println!("{}", summary_line(&message));
        if message.has_attachments {
            report_attachments(&session, &message, save_dir.as_deref());
        }
    }

    // The feed only ends once it has been closed
    let stats = feed.stats();
    info!(
        "Feed closed after {} polls ({} delivered, {} failed)",
        stats.polls, stats.delivered, stats.failures
    );
    feed.close();
    session.close().context("logout failed")?;
    Ok(())
}

/// Close `feed` on the first Ctrl-C so the main loop can log out
fn close_on_interrupt(feed: Arc<RollingFeed>) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build signal runtime")?;

    thread::Builder::new()
        .name("holdwatch-signal".to_string())
        .spawn(move || {
            match runtime.block_on(tokio::signal::ctrl_c()) {
                Ok(()) => info!("Interrupted, closing feed"),
                Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
            }
            feed.close();
        })
        .context("failed to spawn signal thread")?;
    Ok(())
}

fn report_attachments(session: &Session, message: &HeldMessage, save_dir: Option<&Path>) {
    let detail = match message_detail(session, message.id.as_str()) {
        Ok(detail) => detail,
        Err(e) => {
            warn!("Failed to fetch detail for {}: {}", message.id, e);
            return;
        }
    };

    for attachment in &detail.attachments {
        println!("    attachment: {}", attachment.filename);
    }

    for attachment in detail.unsafe_attachments(SAFE_CONTENT_TYPES) {
        println!(
            "    potentially unsafe: {} ({})",
            attachment.filename,
            attachment.content_type.as_deref().unwrap_or("unknown type")
        );
        if let Some(dir) = save_dir
            && message.is_sandbox_failure()
        {
            match save_attachment(session, attachment, dir) {
                Ok(path) => println!("    saved as: {}", path.display()),
                Err(e) => warn!("Failed to save {}: {:#}", attachment.filename, e),
            }
        }
    }
}

fn save_attachment(session: &Session, attachment: &Attachment, dir: &Path) -> Result<PathBuf> {
    let path = dir.join(attachment.local_file_name());
    let file = File::create(&path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    let written = download_file(session, &attachment.id, &mut writer)?;
    writer.into_inner().map_err(|e| e.into_error())?.sync_all()?;
    info!("Saved {} bytes to {}", written, path.display());
    Ok(path)
}

fn minutes_from_env(name: &str, default: u64) -> Result<u64> {
    parse_minutes(name, env::var(name).ok(), default)
}

fn parse_minutes(name: &str, value: Option<String>, default: u64) -> Result<u64> {
    match value {
        Some(value) => value
            .trim()
            .parse()
            .with_context(|| format!("{} must be a whole number of minutes", name)),
        None => Ok(default),
    }
}

fn summary_line(message: &HeldMessage) -> String {
    format!(
        "{} [{}] {} from {}: {}",
        message
            .date_received
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S"),
        message.reason_id,
        message.id,
        message.from.as_deref().unwrap_or("-"),
        message.subject.as_deref().unwrap_or("(no subject)"),
    )
}
