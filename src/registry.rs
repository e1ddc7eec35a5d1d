use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::{ConfigError, RegistryError};

/// One crawl target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteDescriptor {
    pub url: String,
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Sites plus the global watermark, stored together as `homepage.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Registry {
    #[serde(rename = "data", default)]
    pub sites: Vec<SiteDescriptor>,
    #[serde(rename = "latestPostIndex", default = "unset_watermark")]
    pub watermark: i64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn unset_watermark() -> i64 {
    -1
}

impl Registry {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::RegistryUnreadable {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::RegistryInvalid {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Rewrite the whole file. Goes through a sibling temp file so a crash mid-write
    /// leaves the previous registry intact.
    pub fn save(&self, path: &Path) -> Result<(), RegistryError> {
        let mut body = serde_json::to_string_pretty(self)?;
        body.push('\n');

        let tmp = path.with_extension("json.tmp");
        let write_err = |source| RegistryError::Write {
            path: path.to_path_buf(),
            source,
        };
        fs::write(&tmp, body).map_err(write_err)?;
        fs::rename(&tmp, path).map_err(write_err)?;
        debug!(path = %path.display(), watermark = self.watermark, "registry saved");
        Ok(())
    }

    /// Raise the watermark; never lowers it.
    pub fn advance(&mut self, watermark: i64) -> bool {
        if watermark > self.watermark {
            self.watermark = watermark;
            true
        } else {
            false
        }
    }
}

/// Exclusive lock next to the registry (`homepage.json.lock`), held for the duration of
/// a run. The file records the holder's pid; a lock whose holder is gone is replaced.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
    pid: u32,
}

impl RunLock {
    pub fn acquire(registry_path: &Path) -> Result<Self, ConfigError> {
        let path = lock_path(registry_path);
        let pid = std::process::id();

        match Self::create(&path, pid) {
            Err(ConfigError::AlreadyRunning(_)) => {}
            other => return other,
        }

        match holder(&path) {
            Some(other) if process_alive(other) => return Err(ConfigError::AlreadyRunning(path)),
            recorded => {
                warn!(path = %path.display(), pid = ?recorded, "replacing stale run lock");
                if let Err(source) = fs::remove_file(&path) {
                    if source.kind() != ErrorKind::NotFound {
                        return Err(ConfigError::Lock { path, source });
                    }
                }
            }
        }
        Self::create(&path, pid)
    }

    fn create(path: &Path, pid: u32) -> Result<Self, ConfigError> {
        let lock_err = |source| ConfigError::Lock {
            path: path.to_path_buf(),
            source,
        };
        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
        {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(ConfigError::AlreadyRunning(path.to_path_buf()));
            }
            Err(source) => return Err(lock_err(source)),
        };
        let lock = RunLock {
            path: path.to_path_buf(),
            pid,
        };
        // From here on `lock` owns the file and removes it if the pid cannot be written.
        writeln!(file, "{}", pid)
            .and_then(|_| file.sync_all())
            .map_err(lock_err)?;
        Ok(lock)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        // A lock taken over after we were presumed dead is not ours to remove.
        if holder(&self.path).is_some_and(|pid| pid != self.pid) {
            return;
        }
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), "failed to release run lock: {}", e);
        }
    }
}

fn lock_path(registry_path: &Path) -> PathBuf {
    let mut name = registry_path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

/// Pid recorded in a lock file. Empty or garbled content counts as no holder.
fn holder(path: &Path) -> Option<u32> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

#[cfg(target_os = "linux")]
fn process_alive(pid: u32) -> bool {
    Path::new("/proc").join(pid.to_string()).exists()
}

/// Without procfs there is no cheap liveness check; the lock is assumed live.
#[cfg(not(target_os = "linux"))]
fn process_alive(_pid: u32) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
  "data": [
    { "url": "https://inthiswork.com/data", "name": "inthiswork", "homepage": "InThisWork" },
    { "url": "https://example.com/jobs", "name": "example" }
  ],
  "latestPostIndex": 41234
}"#;

    fn write_sample(dir: &tempfile::TempDir) -> PathBuf {
        let path = dir.path().join("homepage.json");
        fs::write(&path, SAMPLE).unwrap();
        path
    }

    #[test]
    fn load_reads_sites_and_watermark() {
        let dir = tempfile::tempdir().unwrap();
        let reg = Registry::load(&write_sample(&dir)).unwrap();
        assert_eq!(reg.watermark, 41234);
        assert_eq!(reg.sites.len(), 2);
        assert_eq!(reg.sites[0].name, "inthiswork");
        assert_eq!(reg.sites[0].extra["homepage"], "InThisWork");
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sample(&dir);
        let mut reg = Registry::load(&path).unwrap();
        reg.advance(41240);
        reg.save(&path).unwrap();

        let again = Registry::load(&path).unwrap();
        assert_eq!(again, reg);
        assert_eq!(again.watermark, 41240);
        assert!(!dir.path().join("homepage.json.tmp").exists());
    }

    #[test]
    fn save_is_pretty_printed() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sample(&dir);
        Registry::load(&path).unwrap().save(&path).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("\n  \"latestPostIndex\": 41234"));
    }

    #[test]
    fn advance_never_lowers() {
        let mut reg: Registry = serde_json::from_str(SAMPLE).unwrap();
        assert!(!reg.advance(10));
        assert_eq!(reg.watermark, 41234);
        assert!(reg.advance(41235));
        assert_eq!(reg.watermark, 41235);
    }

    #[test]
    fn missing_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Registry::load(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, ConfigError::RegistryUnreadable { .. }));
    }

    #[test]
    fn garbage_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("homepage.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            Registry::load(&path).unwrap_err(),
            ConfigError::RegistryInvalid { .. }
        ));
    }

    #[test]
    fn missing_watermark_defaults_to_unset() {
        let reg: Registry = serde_json::from_str(r#"{"data": []}"#).unwrap();
        assert_eq!(reg.watermark, -1);
    }

    #[test]
    fn lock_is_exclusive_and_released_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sample(&dir);

        let lock = RunLock::acquire(&path).unwrap();
        assert_eq!(lock.path(), dir.path().join("homepage.json.lock"));
        assert_eq!(
            fs::read_to_string(lock.path()).unwrap().trim(),
            std::process::id().to_string()
        );
        assert!(matches!(
            RunLock::acquire(&path).unwrap_err(),
            ConfigError::AlreadyRunning(_)
        ));

        let lock_path = lock.path().to_path_buf();
        drop(lock);
        assert!(!lock_path.exists());
        RunLock::acquire(&path).unwrap();
    }

    #[test]
    fn lock_left_by_dead_process_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sample(&dir);

        // A crashed run never drops its guard.
        let crashed = RunLock::acquire(&path).unwrap();
        let lock_path = crashed.path().to_path_buf();
        std::mem::forget(crashed);
        fs::write(&lock_path, "999999\n").unwrap();

        let lock = RunLock::acquire(&path).unwrap();
        assert_eq!(
            fs::read_to_string(lock.path()).unwrap().trim(),
            std::process::id().to_string()
        );
    }

    #[test]
    fn lock_with_garbled_pid_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sample(&dir);
        fs::write(lock_path(&path), "").unwrap();

        RunLock::acquire(&path).unwrap();
    }

    #[test]
    fn lock_held_by_live_process_is_respected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sample(&dir);
        fs::write(lock_path(&path), format!("{}\n", std::process::id())).unwrap();

        assert!(matches!(
            RunLock::acquire(&path).unwrap_err(),
            ConfigError::AlreadyRunning(_)
        ));
        assert!(lock_path(&path).exists());
    }

    #[test]
    fn taken_over_lock_is_not_removed_by_previous_holder() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sample(&dir);

        let lock = RunLock::acquire(&path).unwrap();
        fs::write(lock.path(), "999999\n").unwrap();
        let lock_path = lock.path().to_path_buf();
        drop(lock);
        assert!(lock_path.exists());
    }
}
