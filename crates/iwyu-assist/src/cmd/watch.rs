//! `iwyu-assist watch`: keep the compilation database live.
//!
//! Reports the database status after every settled reload and re-reads the
//! project settings file whenever it changes, re-pointing the cache when
//! `compile_commands` moves.

use crate::cmd::assist::load_settings;
use crate::session::Session;
use crate::settings::{project_settings_path, Settings, SettingsLayer};
use anyhow::Result;
use iwyu_compdb::FileWatcher;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::sync::mpsc;

pub(crate) async fn run<W: Write>(
    root: PathBuf,
    settings: Settings,
    overrides: SettingsLayer,
    writer: &mut W,
) -> Result<ExitCode> {
    let mut session = Session::open(root, settings, true);
    let mut db_changes = session.cache().subscribe();

    let settings_path = project_settings_path(session.root());
    let (tx, mut settings_events) = mpsc::unbounded_channel();
    let _settings_watcher = match FileWatcher::new(&settings_path, tx) {
        Ok(watcher) => Some(watcher),
        Err(e) => {
            tracing::warn!("{e}; settings changes will not be picked up");
            None
        }
    };

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                tracing::info!("interrupted, shutting down");
                break;
            }
            changed = db_changes.changed() => {
                if changed.is_err() {
                    break;
                }
                report_status(&session, writer).await?;
            }
            Some(event) = settings_events.recv() => {
                tracing::debug!(?event, "settings file event");
                reload_settings(&mut session, &overrides);
            }
        }
    }

    session.cache().close();
    Ok(ExitCode::SUCCESS)
}

async fn report_status<W: Write>(session: &Session, writer: &mut W) -> Result<()> {
    let status = session.cache().status().await;
    let path = session
        .cache()
        .database_path()
        .map_or_else(|| "<none>".to_string(), |p| p.display().to_string());
    tracing::info!("{path}: {status}");
    writeln!(writer, "{path}: {status}")?;
    writer.flush()?;
    Ok(())
}

fn reload_settings(session: &mut Session, overrides: &SettingsLayer) {
    match load_settings(session.root(), overrides) {
        Ok(settings) => {
            if session.settings().database_changed(&settings) {
                tracing::info!(
                    "compile_commands changed to {:?}",
                    settings.compile_commands.display().to_string()
                );
            }
            session.apply_settings(settings);
        }
        // Keep the previous settings until the file is fixed.
        Err(e) => tracing::error!("{e:#}"),
    }
}
