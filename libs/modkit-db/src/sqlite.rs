//! SQLite DSN handling: memory detection, file path preparation and a small
//! whitelist of PRAGMA query parameters.

use std::{io, path::PathBuf, str::FromStr, time::Duration};

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqliteSynchronous};

const PRAGMA_PARAMS: &[&str] = &["wal", "journal_mode", "synchronous", "busy_timeout"];

/// PRAGMA settings accepted from DSN query parameters.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct Pragmas {
    pub journal_mode: Option<&'static str>,
    pub synchronous: Option<&'static str>,
    pub busy_timeout_ms: Option<u64>,
}

impl Pragmas {
    /// Parse whitelisted parameters; invalid values are logged and ignored.
    pub(crate) fn from_dsn(dsn: &str) -> Self {
        let mut out = Pragmas::default();
        let Some((_, query)) = dsn.split_once('?') else {
            return out;
        };

        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            let parsed = match key.to_ascii_lowercase().as_str() {
                "wal" => journal_from_wal(&value).map(|m| out.journal_mode = Some(m)),
                "journal_mode" => journal_mode(&value).map(|m| out.journal_mode = Some(m)),
                "synchronous" => synchronous(&value).map(|m| out.synchronous = Some(m)),
                "busy_timeout" => value
                    .parse::<u64>()
                    .ok()
                    .map(|ms| out.busy_timeout_ms = Some(ms)),
                _ => Some(()),
            };
            if parsed.is_none() {
                tracing::warn!(param = %key, value = %value, "ignoring invalid SQLite PRAGMA value");
            }
        }
        out
    }
}

fn journal_from_wal(v: &str) -> Option<&'static str> {
    match v.to_ascii_lowercase().as_str() {
        "true" | "1" => Some("WAL"),
        "false" | "0" => Some("DELETE"),
        _ => None,
    }
}

fn journal_mode(v: &str) -> Option<&'static str> {
    match v.to_ascii_uppercase().as_str() {
        "DELETE" => Some("DELETE"),
        "WAL" => Some("WAL"),
        "MEMORY" => Some("MEMORY"),
        "TRUNCATE" => Some("TRUNCATE"),
        "PERSIST" => Some("PERSIST"),
        "OFF" => Some("OFF"),
        _ => None,
    }
}

fn synchronous(v: &str) -> Option<&'static str> {
    match v.to_ascii_uppercase().as_str() {
        "OFF" => Some("OFF"),
        "NORMAL" => Some("NORMAL"),
        "FULL" => Some("FULL"),
        "EXTRA" => Some("EXTRA"),
        _ => None,
    }
}

pub(crate) fn is_memory_dsn(dsn: &str) -> bool {
    let lower = dsn.to_ascii_lowercase();
    lower.contains(":memory:") || lower.contains("mode=memory")
}

/// Remove PRAGMA parameters that sqlx would reject as unknown.
pub(crate) fn strip_pragmas(dsn: &str) -> String {
    let Some((base, query)) = dsn.split_once('?') else {
        return dsn.to_string();
    };

    let kept: Vec<String> = query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter(|pair| {
            let key = pair.split('=').next().unwrap_or("").to_ascii_lowercase();
            !PRAGMA_PARAMS.contains(&key.as_str())
        })
        .map(str::to_string)
        .collect();

    if kept.is_empty() {
        base.to_string()
    } else {
        format!("{base}?{}", kept.join("&"))
    }
}

fn file_path(dsn: &str) -> Option<PathBuf> {
    let rest = dsn
        .strip_prefix("sqlite://")
        .or_else(|| dsn.strip_prefix("sqlite:"))?;
    let path = rest.split('?').next().unwrap_or("");
    if path.is_empty() || path.starts_with("file:") {
        return None;
    }
    Some(PathBuf::from(path))
}

/// Create the parent directory of a file-backed database.
pub(crate) fn prepare_sqlite_path(dsn: &str, create_dirs: bool) -> io::Result<()> {
    if !create_dirs || is_memory_dsn(dsn) {
        return Ok(());
    }
    if let Some(parent) = file_path(dsn).as_deref().and_then(|p| p.parent()) {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Build typed connect options: file databases are created on demand and run in WAL mode
/// unless the DSN says otherwise.
pub(crate) fn connect_options(
    dsn: &str,
    busy_timeout: Option<Duration>,
) -> Result<SqliteConnectOptions, sqlx::Error> {
    let pragmas = Pragmas::from_dsn(dsn);
    let memory = is_memory_dsn(dsn);

    let mut opts = SqliteConnectOptions::from_str(&strip_pragmas(dsn))?.create_if_missing(true);

    let journal = pragmas
        .journal_mode
        .unwrap_or(if memory { "MEMORY" } else { "WAL" });
    opts = opts.journal_mode(SqliteJournalMode::from_str(journal)?);
    opts = opts.synchronous(SqliteSynchronous::from_str(
        pragmas.synchronous.unwrap_or("NORMAL"),
    )?);

    let busy = pragmas
        .busy_timeout_ms
        .map(Duration::from_millis)
        .or(busy_timeout);
    if let Some(t) = busy {
        opts = opts.busy_timeout(t);
    }

    Ok(opts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pragmas_whitelist_and_validation() {
        let p = Pragmas::from_dsn(
            "sqlite://users.db?wal=true&synchronous=full&busy_timeout=250&foo=bar",
        );
        assert_eq!(p.journal_mode, Some("WAL"));
        assert_eq!(p.synchronous, Some("FULL"));
        assert_eq!(p.busy_timeout_ms, Some(250));

        let bad = Pragmas::from_dsn("sqlite://users.db?wal=maybe&synchronous=yes&busy_timeout=-1");
        assert_eq!(bad, Pragmas::default());

        let explicit = Pragmas::from_dsn("sqlite://users.db?JOURNAL_MODE=truncate");
        assert_eq!(explicit.journal_mode, Some("TRUNCATE"));
    }

    #[test]
    fn strip_keeps_sqlx_params() {
        assert_eq!(
            strip_pragmas("sqlite://users.db?wal=true&mode=rwc&busy_timeout=5"),
            "sqlite://users.db?mode=rwc"
        );
        assert_eq!(strip_pragmas("sqlite://users.db?wal=1"), "sqlite://users.db");
        assert_eq!(strip_pragmas("sqlite::memory:"), "sqlite::memory:");
    }

    #[test]
    fn memory_detection() {
        assert!(is_memory_dsn("sqlite::memory:"));
        assert!(is_memory_dsn("sqlite://:memory:"));
        assert!(is_memory_dsn("sqlite:file:db1?mode=memory&cache=shared"));
        assert!(!is_memory_dsn("sqlite:///tmp/users.db"));
    }

    #[test]
    fn parent_dir_is_created_for_file_dsn() {
        let tmp = tempfile::tempdir().unwrap();
        let db = tmp.path().join("nested/dir/users.db");
        let dsn = format!("sqlite://{}", db.to_string_lossy().replace('\\', "/"));
        prepare_sqlite_path(&dsn, true).unwrap();
        assert!(db.parent().unwrap().exists());
    }
}
