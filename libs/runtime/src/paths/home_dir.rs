use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};

/// Resolve the server home directory into an absolute path.
///
/// - `None` => `<platform home>/<default_subdir>`
/// - `~` or `~/...` => expanded against the platform home
/// - relative paths => joined with the current working directory
///
/// When `create` is set the directory is created if missing.
pub fn resolve_home_dir(
    configured: Option<String>,
    default_subdir: &str,
    create: bool,
) -> Result<PathBuf> {
    let path = match configured {
        None => platform_home()?.join(default_subdir),
        Some(raw) => expand(&raw)?,
    };

    let path = if path.is_absolute() {
        path
    } else {
        std::env::current_dir()
            .context("cannot read current directory")?
            .join(path)
    };

    if create {
        std::fs::create_dir_all(&path)
            .with_context(|| format!("cannot create home_dir '{}'", path.display()))?;
    }

    Ok(path)
}

fn expand(raw: &str) -> Result<PathBuf> {
    if raw == "~" {
        return platform_home();
    }
    if let Some(rest) = raw.strip_prefix("~/").or_else(|| raw.strip_prefix("~\\")) {
        return Ok(platform_home()?.join(rest));
    }
    Ok(PathBuf::from(raw))
}

fn platform_home() -> Result<PathBuf> {
    // Windows: %APPDATA%, Unix/macOS: $HOME
    #[cfg(target_os = "windows")]
    let home = dirs::config_dir();
    #[cfg(not(target_os = "windows"))]
    let home = dirs::home_dir();

    home.ok_or_else(|| anyhow!("unable to determine the platform home directory"))
}
