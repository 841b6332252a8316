//! Small helpers shared by the CLI and the configuration layer.

use std::path::Path;

/// Replace the home directory prefix with `~` so logged paths don't leak the user name.
pub fn private_path(path: &Path) -> String {
    if let Some(home) = dirs::home_dir()
        && let Ok(stripped) = path.strip_prefix(&home)
    {
        return format!("~/{}", stripped.display());
    }
    path.display().to_string()
}
