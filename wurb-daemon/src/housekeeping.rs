//! Free disk space watch on the recording directory

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use sysinfo::Disks;
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::controller::Controller;

const MB: u64 = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskSpace {
    pub total_mb: u64,
    pub free_mb: u64,
}

/// Space on the disk that holds `path`: the mount point with the longest
/// matching prefix wins.
pub fn disk_space(path: &Path) -> Option<DiskSpace> {
    let path = path.canonicalize().ok()?;
    let disks = Disks::new_with_refreshed_list();

    disks
        .list()
        .iter()
        .filter(|disk| path.starts_with(disk.mount_point()))
        .max_by_key(|disk| disk.mount_point().as_os_str().len())
        .map(|disk| DiskSpace {
            total_mb: disk.total_space() / MB,
            free_mb: disk.available_space() / MB,
        })
}

fn query_space(dir: &Path) -> Option<DiskSpace> {
    if !dir.exists() {
        debug!("Recording directory {} not present yet", dir.display());
        return None;
    }
    disk_space(dir)
}

pub struct DiskMonitor {
    dir: PathBuf,
    min_free_mb: u64,
    last_free_mb: Option<u64>,
}

impl DiskMonitor {
    pub fn new(dir: PathBuf, min_free_mb: u64) -> Self {
        Self {
            dir,
            min_free_mb,
            last_free_mb: None,
        }
    }

    /// Log changes and tell whether `space` is below the limit.
    pub fn evaluate(&mut self, space: DiskSpace) -> bool {
        if self.last_free_mb != Some(space.free_mb) {
            info!(
                "Disk space for {}: total {} MB, free {} MB",
                self.dir.display(),
                space.total_mb,
                space.free_mb
            );
            self.last_free_mb = Some(space.free_mb);
        }
        space.free_mb < self.min_free_mb
    }

    /// `Some(true)` when space is low. `None` when the directory does not
    /// exist yet or its disk cannot be found.
    pub fn check(&mut self) -> Option<bool> {
        let space = query_space(&self.dir)?;
        Some(self.evaluate(space))
    }

    /// [`check`](Self::check) with the filesystem queries on the blocking pool.
    pub async fn check_async(&mut self) -> Option<bool> {
        let dir = self.dir.clone();
        let space = match tokio::task::spawn_blocking(move || query_space(&dir)).await {
            Ok(space) => space?,
            Err(e) => {
                error!("Disk space query failed: {}", e);
                return None;
            }
        };
        Some(self.evaluate(space))
    }

    /// Check every `interval` until `stop` turns true.
    pub async fn run(
        mut self,
        controller: Arc<Controller>,
        interval: Duration,
        mut stop: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = stop.changed() => break,
            }
            if *stop.borrow() {
                break;
            }

            if self.check_async().await == Some(true) {
                error!(
                    "Free disk space below {} MB on {}",
                    self.min_free_mb,
                    self.dir.display()
                );
                if let Err(e) = controller.run_blocking(|c| c.out_of_disk_space()).await {
                    error!("Disk space action failed: {}", e);
                }
            }
        }
        debug!("Disk monitor stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit() {
        let mut monitor = DiskMonitor::new(PathBuf::from("/data"), 10);
        assert!(!monitor.evaluate(DiskSpace { total_mb: 100, free_mb: 10 }));
        assert!(monitor.evaluate(DiskSpace { total_mb: 100, free_mb: 9 }));
        assert_eq!(monitor.last_free_mb, Some(9));
    }

    #[test]
    fn test_missing_dir_is_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let mut monitor = DiskMonitor::new(tmp.path().join("not-mounted"), 10);
        assert_eq!(monitor.check(), None);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_async_check_matches_blocking_check() {
        let tmp = tempfile::tempdir().unwrap();
        let mut monitor = DiskMonitor::new(tmp.path().join("not-mounted"), 10);
        assert_eq!(monitor.check_async().await, None);

        let mut monitor = DiskMonitor::new(tmp.path().to_path_buf(), u64::MAX);
        if let Some(low) = monitor.check_async().await {
            assert!(low);
            assert!(monitor.last_free_mb.is_some());
        }
    }

    #[test]
    fn test_huge_limit_reports_low() {
        let tmp = tempfile::tempdir().unwrap();
        let mut monitor = DiskMonitor::new(tmp.path().to_path_buf(), u64::MAX);
        // Containers may hide their disks from sysinfo
        if let Some(low) = monitor.check() {
            assert!(low);
        }
    }
}
