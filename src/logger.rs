// Session-based log files with retention pruning.
// Lines are buffered in memory and flushed on demand or at shutdown.
use anyhow::Result;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

pub struct SessionLogger {
    buffer: Arc<Mutex<Vec<String>>>,
    log_path: PathBuf,
    log_dir: PathBuf,
    retention_count: usize,
}

impl SessionLogger {
    pub fn new(log_dir: PathBuf, retention_count: usize) -> Result<Self> {
        fs::create_dir_all(&log_dir)?;

        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let log_path = log_dir.join(format!("bubblecam_{}.log", timestamp));

        let logger = Self {
            buffer: Arc::new(Mutex::new(Vec::new())),
            log_path,
            log_dir,
            retention_count,
        };

        logger.prune_old_logs();

        Ok(logger)
    }

    fn line(&self, level: &str, message: &str) {
        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
        let entry = if level.is_empty() {
            format!("[{}] {}", timestamp, message)
        } else {
            format!("[{}] {}: {}", timestamp, level, message)
        };

        if let Ok(mut buffer) = self.buffer.lock() {
            buffer.push(entry);
        }
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.line("", message.as_ref());
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        self.line("WARN", message.as_ref());
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.line("ERROR", message.as_ref());
    }

    // Session files carry a sortable timestamp in the name, so pruning
    // works on filenames alone.
    fn prune_old_logs(&self) {
        let mut logs: Vec<PathBuf> = Vec::new();

        if let Ok(entries) = fs::read_dir(&self.log_dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                let is_session_log = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with("bubblecam_") && n.ends_with(".log"))
                    .unwrap_or(false);
                if is_session_log {
                    logs.push(path);
                }
            }
        }

        logs.sort();
        logs.reverse();

        for path in logs.iter().skip(self.retention_count) {
            let _ = fs::remove_file(path);
        }
    }

    pub fn flush_to_disk(&self) -> Result<()> {
        let mut buffer = match self.buffer.lock() {
            Ok(b) => b,
            Err(poisoned) => poisoned.into_inner(),
        };
        if buffer.is_empty() {
            return Ok(());
        }

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)?;

        for line in buffer.iter() {
            writeln!(file, "{}", line)?;
        }
        file.flush()?;
        buffer.clear();

        Ok(())
    }

    pub fn finalize(&self) -> Result<()> {
        self.info("=== Session ended ===");
        self.flush_to_disk()
    }
}

impl Drop for SessionLogger {
    fn drop(&mut self) {
        let _ = self.finalize();
    }
}

static LOGGER: once_cell::sync::OnceCell<SessionLogger> = once_cell::sync::OnceCell::new();

pub fn init_logger(log_dir: PathBuf, retention_count: usize) -> Result<()> {
    let logger = SessionLogger::new(log_dir, retention_count)?;
    logger.info("=== Session started ===");
    LOGGER
        .set(logger)
        .map_err(|_| anyhow::anyhow!("Logger already initialized"))?;
    Ok(())
}

pub fn log_info(message: impl AsRef<str>) {
    if let Some(logger) = LOGGER.get() {
        logger.info(message);
    }
}

pub fn log_warn(message: impl AsRef<str>) {
    if let Some(logger) = LOGGER.get() {
        logger.warn(message);
    }
}

pub fn log_error(message: impl AsRef<str>) {
    if let Some(logger) = LOGGER.get() {
        logger.error(message);
    }
}

pub fn flush_logs() -> Result<()> {
    if let Some(logger) = LOGGER.get() {
        logger.flush_to_disk()?;
    }
    Ok(())
}

pub fn finalize_logs() -> Result<()> {
    if let Some(logger) = LOGGER.get() {
        logger.finalize()?;
    }
    Ok(())
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::logger::log_info(format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::logger::log_warn(format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        $crate::logger::log_error(format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("bubblecam-logger-{}-{}", tag, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn flush_writes_buffered_lines() {
        let dir = temp_dir("flush");
        let logger = SessionLogger::new(dir.clone(), 5).unwrap();
        logger.info("hello");
        logger.warn("careful");
        logger.flush_to_disk().unwrap();

        let content = fs::read_to_string(&logger.log_path).unwrap();
        assert!(content.contains("hello"));
        assert!(content.contains("WARN: careful"));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn prune_keeps_newest_sessions() {
        let dir = temp_dir("prune");
        for i in 0..5 {
            let name = format!("bubblecam_2026010{}_000000.log", i);
            fs::write(dir.join(name), "old").unwrap();
        }
        fs::write(dir.join("unrelated.txt"), "keep").unwrap();

        let logger = SessionLogger::new(dir.clone(), 2).unwrap();
        drop(logger);

        let mut session_logs: Vec<_> = fs::read_dir(&dir)
            .unwrap()
            .flatten()
            .map(|e| e.file_name().to_string_lossy().to_string())
            .filter(|n| n.starts_with("bubblecam_") && n.ends_with(".log"))
            .collect();
        session_logs.sort();
        // Two retained plus the session file the logger itself created.
        assert!(session_logs.len() <= 3);
        assert!(dir.join("unrelated.txt").exists());

        let _ = fs::remove_dir_all(&dir);
    }
}
