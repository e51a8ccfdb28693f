use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

pub const GPX_EXTENSION: &str = "gpx";

/// Source of wall-clock time for naming default output files.
pub trait Clock: fmt::Debug + Send + Sync {
    fn now(&self) -> SystemTime;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// A clock that always reports the same instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub SystemTime);

impl Clock for FixedClock {
    fn now(&self) -> SystemTime {
        self.0
    }
}

/// Whether the extension is exactly `gpx` (case-sensitive).
pub fn has_gpx_extension(path: &Path) -> bool {
    path.extension().and_then(|ext| ext.to_str()) == Some(GPX_EXTENSION)
}

/// Append `.gpx` unless the path already ends in it: `out` becomes
/// `out.gpx`, `out.txt` becomes `out.txt.gpx`.
pub fn enforce_gpx_extension(path: PathBuf) -> PathBuf {
    if has_gpx_extension(&path) {
        return path;
    }
    let mut raw = OsString::from(path);
    raw.push(".");
    raw.push(GPX_EXTENSION);
    PathBuf::from(raw)
}

/// `<directory>/<unix seconds>.gpx`
pub fn default_destination(directory: &Path, clock: &dyn Clock) -> PathBuf {
    let seconds = clock
        .now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default();
    directory.join(format!("{seconds}.{GPX_EXTENSION}"))
}

/// Where a merge writes its output. An absent or empty destination falls
/// back to a time-based name in `directory`.
pub fn resolve_destination(
    destination: Option<&Path>,
    directory: &Path,
    clock: &dyn Clock,
) -> PathBuf {
    match destination {
        Some(path) if !path.as_os_str().is_empty() => enforce_gpx_extension(path.to_path_buf()),
        _ => default_destination(directory, clock),
    }
}
