use anyhow::{Context, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::RwLock;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

const SCHEMA_VERSION: i32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppState {
    #[serde(default = "default_size")]
    pub last_size: u32,
    #[serde(default)]
    pub last_device: Option<String>,
    #[serde(default)]
    pub window_pos: Option<(i32, i32)>,
    #[serde(default)]
    pub target_fps: Option<f32>,
    #[serde(default = "default_log_retention")]
    pub log_retention_count: usize,
}

fn default_size() -> u32 {
    crate::geometry::DEFAULT_SIZE
}

fn default_log_retention() -> usize {
    10
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            last_size: default_size(),
            last_device: None,
            window_pos: None,
            target_fps: None,
            log_retention_count: 10,
        }
    }
}

enum WriteCommand {
    Update(AppState),
    Shutdown,
}

/// Persisted settings. Reads go through an in-memory copy; writes are
/// handed to a dedicated thread so the event loop never waits on disk.
pub struct StateManager {
    data_dir: PathBuf,
    state: Arc<RwLock<AppState>>,
    write_sender: Sender<WriteCommand>,
    _write_thread: Option<thread::JoinHandle<()>>,
}

impl StateManager {
    pub fn new() -> Result<Self> {
        let data_dir = resolve_data_dir()?;
        let db_path = data_dir.join("state.db");

        std::fs::create_dir_all(&data_dir).context("Failed to create data directory")?;
        std::fs::create_dir_all(data_dir.join("logs")).context("Failed to create logs directory")?;
        std::fs::create_dir_all(data_dir.join("snapshots"))
            .context("Failed to create snapshots directory")?;

        let conn = Connection::open(&db_path).context("Failed to open state database")?;
        Self::init_database(&conn)?;

        let initial_state = Self::load_state(&conn)?;
        let state = Arc::new(RwLock::new(initial_state));

        let (write_sender, write_receiver): (Sender<WriteCommand>, Receiver<WriteCommand>) =
            unbounded();

        let db_path_clone = db_path.clone();
        let write_thread = thread::spawn(move || {
            Self::write_worker(db_path_clone, write_receiver);
        });

        Ok(Self {
            data_dir,
            state,
            write_sender,
            _write_thread: Some(write_thread),
        })
    }

    fn init_database(conn: &Connection) -> Result<()> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS state (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
            [],
        )?;

        let current_version: Option<i32> = conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
                row.get(0)
            })
            .ok();

        if current_version.is_none() {
            conn.execute(
                "INSERT INTO schema_version (version) VALUES (?1)",
                params![SCHEMA_VERSION],
            )?;
        }

        Ok(())
    }

    fn load_state(conn: &Connection) -> Result<AppState> {
        let json_str: Option<String> = conn
            .query_row(
                "SELECT value FROM state WHERE key = 'app_state'",
                [],
                |row| row.get(0),
            )
            .ok();

        match json_str {
            Some(json) => serde_json::from_str(&json).context("Failed to parse state JSON"),
            None => Ok(AppState::default()),
        }
    }

    fn store_state(conn: &Connection, state: &AppState) -> Result<()> {
        let json = serde_json::to_string(state)?;
        conn.execute(
            "INSERT OR REPLACE INTO state (key, value) VALUES ('app_state', ?1)",
            params![json],
        )?;
        Ok(())
    }

    fn write_worker(db_path: PathBuf, receiver: Receiver<WriteCommand>) {
        let conn = match Connection::open(&db_path) {
            Ok(c) => c,
            Err(e) => {
                crate::log_error!("Failed to open state database in write worker: {}", e);
                return;
            }
        };

        let _ = conn.pragma_update(None, "journal_mode", "WAL");
        let _ = conn.pragma_update(None, "synchronous", "NORMAL");

        while let Ok(cmd) = receiver.recv() {
            match cmd {
                WriteCommand::Update(state) => {
                    if let Err(e) = Self::store_state(&conn, &state) {
                        crate::log_error!("Failed to write state: {}", e);
                    }
                }
                WriteCommand::Shutdown => {
                    break;
                }
            }
        }

        let _ = conn.pragma_update(None, "wal_checkpoint", "TRUNCATE");
    }

    pub fn data_dir(&self) -> &PathBuf {
        &self.data_dir
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }

    pub fn snapshots_dir(&self) -> PathBuf {
        self.data_dir.join("snapshots")
    }

    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&AppState) -> R,
    {
        f(&self.state.read())
    }

    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut AppState),
    {
        let mut state = self.state.write();
        f(&mut state);
        let _ = self.write_sender.send(WriteCommand::Update(state.clone()));
    }
}

impl Drop for StateManager {
    fn drop(&mut self) {
        let _ = self.write_sender.send(WriteCommand::Shutdown);
        if let Some(handle) = self._write_thread.take() {
            let _ = handle.join();
        }
    }
}

fn resolve_data_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("XDG_DATA_HOME") {
        if !dir.is_empty() {
            return Ok(PathBuf::from(dir).join("bubblecam"));
        }
    }

    let home = std::env::var("HOME").context("Failed to get HOME environment variable")?;
    Ok(PathBuf::from(home).join(".local/share/bubblecam"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_yields_defaults() {
        let state: AppState = serde_json::from_str("{}").unwrap();
        assert_eq!(state.last_size, crate::geometry::DEFAULT_SIZE);
        assert_eq!(state.last_device, None);
        assert_eq!(state.window_pos, None);
        assert_eq!(state.log_retention_count, 10);
    }

    #[test]
    fn store_and_load_round_trip() {
        let conn = Connection::open_in_memory().unwrap();
        StateManager::init_database(&conn).unwrap();

        let loaded = StateManager::load_state(&conn).unwrap();
        assert_eq!(loaded.last_size, crate::geometry::DEFAULT_SIZE);

        let mut state = AppState::default();
        state.last_size = 260;
        state.last_device = Some("/dev/video2".to_string());
        state.window_pos = Some((120, -40));
        StateManager::store_state(&conn, &state).unwrap();

        let loaded = StateManager::load_state(&conn).unwrap();
        assert_eq!(loaded.last_size, 260);
        assert_eq!(loaded.last_device.as_deref(), Some("/dev/video2"));
        assert_eq!(loaded.window_pos, Some((120, -40)));
    }

    #[test]
    fn init_database_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        StateManager::init_database(&conn).unwrap();
        StateManager::init_database(&conn).unwrap();

        let version: i32 = conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }
}
