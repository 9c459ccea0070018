use std::collections::HashMap;

use rusqlite::{params, Connection, OptionalExtension};
use typebot_contracts::{LogRecord, LogStatus, Typebot};

#[derive(Default)]
pub(crate) struct MemoryStore {
    typebots: HashMap<String, Typebot>,
    logs: Vec<LogRecord>,
}

pub(crate) enum StoreBackend {
    Memory(MemoryStore),
    Sqlite(SqliteStore),
}

pub(crate) struct SqliteStore {
    conn: Connection,
}

impl StoreBackend {
    pub(crate) fn open(kind: &str, sqlite_path: Option<&str>) -> Result<Self, String> {
        if kind == "sqlite" {
            let path = sqlite_path
                .ok_or_else(|| "store.sqlite_path is required for sqlite store".to_string())?;
            Ok(StoreBackend::Sqlite(SqliteStore::new(path)?))
        } else {
            Ok(StoreBackend::Memory(MemoryStore::default()))
        }
    }

    pub(crate) fn get_typebot(&self, id: &str) -> Result<Option<Typebot>, String> {
        match self {
            StoreBackend::Memory(store) => Ok(store.typebots.get(id).cloned()),
            StoreBackend::Sqlite(store) => store.get_typebot(id),
        }
    }

    pub(crate) fn save_typebot(&mut self, typebot: &Typebot) -> Result<(), String> {
        match self {
            StoreBackend::Memory(store) => {
                store.typebots.insert(typebot.id.clone(), typebot.clone());
                Ok(())
            }
            StoreBackend::Sqlite(store) => store.save_typebot(typebot),
        }
    }

    pub(crate) fn append_log(&mut self, record: &LogRecord) -> Result<(), String> {
        match self {
            StoreBackend::Memory(store) => {
                store.logs.push(record.clone());
                Ok(())
            }
            StoreBackend::Sqlite(store) => store.append_log(record),
        }
    }

    pub(crate) fn list_logs(&self, result_id: &str) -> Result<Vec<LogRecord>, String> {
        match self {
            StoreBackend::Memory(store) => Ok(store
                .logs
                .iter()
                .filter(|r| r.result_id == result_id)
                .cloned()
                .collect()),
            StoreBackend::Sqlite(store) => store.list_logs(result_id),
        }
    }

    #[cfg(test)]
    pub(crate) fn log_count(&self) -> usize {
        match self {
            StoreBackend::Memory(store) => store.logs.len(),
            StoreBackend::Sqlite(store) => store
                .conn
                .query_row("SELECT COUNT(*) FROM webhook_logs", [], |row| {
                    row.get::<_, i64>(0)
                })
                .map(|n| n as usize)
                .unwrap_or(0),
        }
    }
}

impl SqliteStore {
    fn new(path: &str) -> Result<Self, String> {
        let conn = Connection::open(path).map_err(|e| e.to_string())?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS typebots (
                typebot_id TEXT PRIMARY KEY,
                document_json TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS webhook_logs (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                log_id TEXT NOT NULL UNIQUE,
                result_id TEXT NOT NULL,
                status TEXT NOT NULL,
                description TEXT NOT NULL,
                details_json TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS webhook_logs_result_id ON webhook_logs(result_id);
            ",
        )
        .map_err(|e| e.to_string())?;
        Ok(Self { conn })
    }

    fn get_typebot(&self, id: &str) -> Result<Option<Typebot>, String> {
        let document: Option<String> = self
            .conn
            .query_row(
                "SELECT document_json FROM typebots WHERE typebot_id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| e.to_string())?;
        match document {
            Some(v) => {
                let typebot: Typebot = serde_json::from_str(&v).map_err(|e| e.to_string())?;
                Ok(Some(typebot))
            }
            None => Ok(None),
        }
    }

    fn save_typebot(&mut self, typebot: &Typebot) -> Result<(), String> {
        let json = serde_json::to_string(typebot).map_err(|e| e.to_string())?;
        self.conn
            .execute(
                "
                INSERT INTO typebots(typebot_id, document_json, updated_at)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(typebot_id) DO UPDATE SET
                    document_json=excluded.document_json,
                    updated_at=excluded.updated_at
                ",
                params![typebot.id, json, chrono::Utc::now().to_rfc3339()],
            )
            .map_err(|e| e.to_string())?;
        Ok(())
    }

    fn append_log(&mut self, record: &LogRecord) -> Result<(), String> {
        let details = serde_json::to_string(&record.details).map_err(|e| e.to_string())?;
        self.conn
            .execute(
                "
                INSERT INTO webhook_logs
                (log_id, result_id, status, description, details_json, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ",
                params![
                    record.id,
                    record.result_id,
                    record.status.as_str(),
                    record.description,
                    details,
                    record.created_at
                ],
            )
            .map_err(|e| e.to_string())?;
        Ok(())
    }

    fn list_logs(&self, result_id: &str) -> Result<Vec<LogRecord>, String> {
        let mut stmt = self
            .conn
            .prepare(
                "
                SELECT log_id, result_id, status, description, details_json, created_at
                FROM webhook_logs WHERE result_id = ?1 ORDER BY seq
                ",
            )
            .map_err(|e| e.to_string())?;
        let rows = stmt
            .query_map(params![result_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })
            .map_err(|e| e.to_string())?;

        let mut records = Vec::new();
        for row in rows {
            let (id, result_id, status, description, details, created_at) =
                row.map_err(|e| e.to_string())?;
            records.push(LogRecord {
                id,
                result_id,
                status: if status == "success" {
                    LogStatus::Success
                } else {
                    LogStatus::Error
                },
                description,
                details: serde_json::from_str(&details).map_err(|e| e.to_string())?,
                created_at,
            });
        }
        Ok(records)
    }
}
