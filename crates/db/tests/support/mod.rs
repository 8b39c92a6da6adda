#![allow(dead_code)]

use std::path::PathBuf;

use bridge_core::CursorState;
use bridge_db::Db;
use tempfile::TempDir;

pub struct TestDb {
    pub _dir: TempDir,
    pub db: Db,
    pub path: PathBuf,
}

pub fn setup_db() -> TestDb {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("test.sqlite");
    let mut db = Db::open(&path).expect("open db");
    db.migrate().expect("migrate db");
    TestDb {
        _dir: dir,
        db,
        path,
    }
}

pub fn make_cursor(recorded: Option<&str>, compensated: Option<&str>) -> CursorState {
    CursorState {
        last_recorded_guid: recorded.map(str::to_string),
        last_recorded_timestamp: recorded.map(|_| "2025-12-19T10:00:00Z".to_string()),
        last_compensated_guid: compensated.map(str::to_string),
        last_compensated_timestamp: compensated.map(|_| "2025-12-19T09:00:00Z".to_string()),
        revision: None,
    }
}
