//! Hot reloading of `night-display.toml`.
//!
//! A background thread watches the configuration directory. When the file
//! changes it is reloaded and validated; a valid file is pushed into every
//! user's controller as ordinary settings edits, so the service sees it through
//! the same events as any other edit. An invalid file is reported and ignored.

use anyhow::{Context, Result};
use notify::{
    Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use super::{Config, SettingsRegistry, load_from_path};
use crate::common::constants::CONFIG_DEBOUNCE_MS;
use crate::common::utils::private_path;
use crate::io::time_change::LocalBroadcast;
use crate::time::SystemClock;

/// Everything a reload can touch.
#[derive(Clone)]
pub struct ReloadTargets {
    pub settings: Arc<SettingsRegistry>,
    pub clock: Arc<SystemClock>,
    pub time_changes: Arc<LocalBroadcast>,
}

/// Push a freshly loaded configuration to the running service.
pub fn apply_reload(config: &Config, targets: &ReloadTargets) -> Result<()> {
    for (user, controller) in targets.settings.controllers() {
        controller
            .apply_config(config)
            .with_context(|| format!("Failed to apply settings for user {user}"))?;
    }

    let timezone = config.timezone()?;
    if targets.clock.set_timezone(timezone) {
        log_indented!("Timezone changed to {timezone}");
        targets.time_changes.notify_timezone_changed();
    }

    Ok(())
}

/// Start watching `config_path` for changes.
pub fn start_config_watcher(config_path: PathBuf, targets: ReloadTargets) -> Result<()> {
    let Some(config_dir) = config_path.parent().map(PathBuf::from) else {
        anyhow::bail!(
            "Cannot watch {}: no parent directory",
            private_path(&config_path)
        );
    };

    log_debug!("Watching {} for changes", private_path(&config_path));

    let (tx, rx) = std::sync::mpsc::channel();
    let mut watcher = RecommendedWatcher::new(
        move |res: Result<Event, notify::Error>| {
            if let Ok(event) = res
                && matches!(
                    event.kind,
                    EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
                )
            {
                let _ = tx.send(event);
            }
        },
        NotifyConfig::default(),
    )
    .context("Failed to create file watcher")?;

    // Editors often replace the file, so watch the directory rather than the file
    watcher
        .watch(&config_dir, RecursiveMode::NonRecursive)
        .with_context(|| format!("Failed to watch directory: {}", private_path(&config_dir)))?;

    thread::Builder::new()
        .name("config-watcher".to_string())
        .spawn(move || {
            let _watcher = watcher;
            let mut last_reload: Option<Instant> = None;

            for event in rx {
                if !event.paths.iter().any(|path| path == &config_path) {
                    continue;
                }

                if let Some(last) = last_reload
                    && last.elapsed() < Duration::from_millis(CONFIG_DEBOUNCE_MS)
                {
                    continue;
                }
                // Let the editor finish writing
                thread::sleep(Duration::from_millis(CONFIG_DEBOUNCE_MS / 5));
                last_reload = Some(Instant::now());

                log_pipe!();
                log_info!("Configuration change detected");

                match load_from_path(&config_path) {
                    Ok(config) => {
                        if let Err(e) = apply_reload(&config, &targets) {
                            log_warning!("Failed to apply reloaded configuration: {e:#}");
                        }
                    }
                    Err(e) => {
                        log_warning!("Ignoring invalid configuration: {e:#}");
                        log_indented!("Keeping the previous settings");
                    }
                }
            }
        })
        .context("failed to spawn config watcher thread")?;

    Ok(())
}
