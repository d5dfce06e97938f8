use crate::data::{
    Day, Department, PeriodKey, PeriodTime, SchoolData, Subject, Teacher, TeacherRef,
    TimetableEntry, clock,
};
use crate::error::AppError;
use itertools::Itertools;
use log::{debug, info};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, Transaction, params};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

const ENTRY_COLUMNS: &str = "id, class_name, day_of_week, period, subject, teacher_id, teacher_name";

/// School data in SQLite, either in a database file or in `:memory:`.
///
/// Every access runs inside a [`SchoolTx`]. [`TimetableStore::transaction`]
/// commits when the closure succeeds; any error drops the transaction and
/// SQLite rolls the whole unit of work back.
#[derive(Debug)]
pub struct TimetableStore {
    conn: Mutex<Connection>,
}

impl TimetableStore {
    pub fn in_memory(seed: SchoolData) -> Result<Self, AppError> {
        Self::init(Connection::open_in_memory()?, seed)
    }

    /// Opens the database at `path`. `seed` is loaded only into a database
    /// that has never been seeded.
    pub fn open(path: impl AsRef<Path>, seed: SchoolData) -> Result<Self, AppError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        info!("Opened timetable database at {}", path.display());
        Self::init(conn, seed)
    }

    fn init(mut conn: Connection, seed: SchoolData) -> Result<Self, AppError> {
        create_schema(&conn)?;

        let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        if version == 0 {
            let tx = SchoolTx {
                tx: conn.transaction()?,
            };
            tx.seed(&seed)?;
            tx.tx.commit()?;
            info!(
                "Seeded {} subjects, {} teachers, {} classes and {} entries",
                seed.subjects.len(),
                seed.teachers.len(),
                seed.classes.len(),
                seed.entries.len()
            );
        } else {
            debug!("Database already seeded, ignoring seed data");
        }

        Ok(TimetableStore {
            conn: Mutex::new(conn),
        })
    }

    // A panic inside a transaction leaves nothing half-written: the
    // rusqlite transaction rolled back when it was dropped during unwinding.
    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `f` in a transaction that is never committed.
    pub fn read<T>(&self, f: impl FnOnce(&SchoolTx<'_>) -> Result<T, AppError>) -> Result<T, AppError> {
        let mut conn = self.lock();
        let tx = SchoolTx {
            tx: conn.transaction()?,
        };
        f(&tx)
    }

    /// Runs `f` in a transaction and commits it if `f` succeeds. The lock
    /// is held throughout.
    pub fn transaction<T>(
        &self,
        f: impl FnOnce(&SchoolTx<'_>) -> Result<T, AppError>,
    ) -> Result<T, AppError> {
        let mut conn = self.lock();
        let tx = SchoolTx {
            tx: conn.transaction()?,
        };
        let value = f(&tx)?;
        tx.tx.commit()?;
        debug!("Transaction committed");
        Ok(value)
    }

    #[cfg(test)]
    pub(crate) fn execute_batch(&self, sql: &str) -> Result<(), AppError> {
        self.lock().execute_batch(sql)?;
        Ok(())
    }
}

fn create_schema(conn: &Connection) -> Result<(), AppError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            code TEXT,
            classes TEXT NOT NULL,
            periods_per_week INTEGER NOT NULL,
            department TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS teachers(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            department TEXT,
            subject_ids TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            name TEXT PRIMARY KEY COLLATE NOCASE
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS school_days(
            position INTEGER PRIMARY KEY,
            day TEXT NOT NULL UNIQUE
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS periods(
            period_key TEXT PRIMARY KEY,
            start_time TEXT NOT NULL,
            end_time TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS timetable_entries(
            id TEXT PRIMARY KEY,
            class_name TEXT NOT NULL COLLATE NOCASE,
            day_of_week TEXT NOT NULL,
            period TEXT NOT NULL,
            subject TEXT NOT NULL,
            teacher_id TEXT NOT NULL,
            teacher_name TEXT NOT NULL,
            UNIQUE(day_of_week, period, teacher_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_timetable_entries_class ON timetable_entries(class_name)",
        [],
    )?;
    Ok(())
}

/// One open unit of work against the school tables.
pub struct SchoolTx<'c> {
    tx: Transaction<'c>,
}

impl SchoolTx<'_> {
    fn seed(&self, data: &SchoolData) -> Result<(), AppError> {
        for subject in &data.subjects {
            self.tx.execute(
                "INSERT OR REPLACE INTO subjects (id, name, code, classes, periods_per_week, department)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    subject.id,
                    subject.name,
                    subject.code,
                    serde_json::to_string(&subject.classes)?,
                    subject.periods_per_week,
                    subject.department.clone().map(String::from),
                ],
            )?;
        }
        for teacher in &data.teachers {
            self.tx.execute(
                "INSERT OR REPLACE INTO teachers (id, name, department, subject_ids)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    teacher.id,
                    teacher.name,
                    teacher.department,
                    serde_json::to_string(&teacher.subject_ids)?,
                ],
            )?;
        }
        for class in data.classes.iter().map(|c| c.trim()).filter(|c| !c.is_empty()) {
            self.tx
                .execute("INSERT OR IGNORE INTO classes (name) VALUES (?1)", params![class])?;
        }
        for (position, day) in data.days.iter().unique().enumerate() {
            self.tx.execute(
                "INSERT OR REPLACE INTO school_days (position, day) VALUES (?1, ?2)",
                params![position as i64, day.as_str()],
            )?;
        }
        for (key, time) in &data.periods {
            self.insert_period(key, time)?;
        }
        for entry in &data.entries {
            self.insert_entry(entry)?;
        }
        self.tx.execute_batch("PRAGMA user_version = 1")?;
        Ok(())
    }

    pub fn subjects(&self) -> Result<Vec<Subject>, AppError> {
        let mut stmt = self.tx.prepare(
            "SELECT id, name, code, classes, periods_per_week, department FROM subjects ORDER BY id",
        )?;
        let subjects = stmt
            .query_map([], |row| {
                Ok(Subject {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    code: row.get(2)?,
                    classes: json_column(row, 3)?,
                    periods_per_week: row.get(4)?,
                    department: row.get::<_, Option<String>>(5)?.map(Department::from),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(subjects)
    }

    pub fn teachers(&self) -> Result<Vec<Teacher>, AppError> {
        let mut stmt = self
            .tx
            .prepare("SELECT id, name, department, subject_ids FROM teachers ORDER BY id")?;
        let teachers = stmt
            .query_map([], |row| {
                Ok(Teacher {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    department: row.get(2)?,
                    subject_ids: json_column(row, 3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(teachers)
    }

    /// Configured classes plus every class that has entries, one spelling
    /// per class.
    pub fn classes(&self) -> Result<Vec<String>, AppError> {
        let mut stmt = self
            .tx
            .prepare("SELECT name FROM classes UNION SELECT class_name FROM timetable_entries")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names
            .into_iter()
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .sorted()
            .unique_by(|name| name.to_lowercase())
            .collect())
    }

    /// The stored spelling of `name` when the class is already known,
    /// otherwise `name` trimmed.
    pub fn canonical_class(&self, name: &str) -> Result<String, AppError> {
        let name = name.trim();
        let known: Option<String> = self
            .tx
            .query_row(
                "SELECT name FROM classes WHERE name = ?1
                 UNION ALL
                 SELECT class_name FROM timetable_entries WHERE class_name = ?1
                 LIMIT 1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(known.unwrap_or_else(|| name.to_string()))
    }

    pub fn days(&self) -> Result<Vec<Day>, AppError> {
        let mut stmt = self
            .tx
            .prepare("SELECT day FROM school_days ORDER BY position")?;
        let days = stmt
            .query_map([], |row| day_column(row, 0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(days)
    }

    pub fn periods(&self) -> Result<BTreeMap<PeriodKey, PeriodTime>, AppError> {
        let mut stmt = self
            .tx
            .prepare("SELECT period_key, start_time, end_time FROM periods")?;
        let periods = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    PeriodTime {
                        start: time_column(row, 1)?,
                        end: time_column(row, 2)?,
                    },
                ))
            })?
            .collect::<Result<BTreeMap<_, _>, _>>()?;
        Ok(periods)
    }

    pub fn insert_period(&self, key: &str, time: &PeriodTime) -> Result<(), AppError> {
        self.tx.execute(
            "INSERT INTO periods (period_key, start_time, end_time) VALUES (?1, ?2, ?3)",
            params![
                key,
                time.start.format(clock::FORMAT).to_string(),
                time.end.format(clock::FORMAT).to_string(),
            ],
        )?;
        Ok(())
    }

    /// All entries in insertion order.
    pub fn entries(&self) -> Result<Vec<TimetableEntry>, AppError> {
        let mut stmt = self.tx.prepare(&format!(
            "SELECT {} FROM timetable_entries ORDER BY rowid",
            ENTRY_COLUMNS
        ))?;
        let entries = stmt
            .query_map([], entry_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn entry(&self, id: &str) -> Result<Option<TimetableEntry>, AppError> {
        let entry = self
            .tx
            .query_row(
                &format!("SELECT {} FROM timetable_entries WHERE id = ?1", ENTRY_COLUMNS),
                params![id],
                entry_from_row,
            )
            .optional()?;
        Ok(entry)
    }

    /// The entry already holding `teacher_id` at `(day, period)`, ignoring
    /// the entry `except` itself.
    pub fn teacher_clash(
        &self,
        day: Day,
        period: &str,
        teacher_id: &str,
        except: &str,
    ) -> Result<Option<TimetableEntry>, AppError> {
        let entry = self
            .tx
            .query_row(
                &format!(
                    "SELECT {} FROM timetable_entries
                     WHERE day_of_week = ?1 AND period = ?2 AND teacher_id = ?3 AND id <> ?4",
                    ENTRY_COLUMNS
                ),
                params![day.as_str(), period, teacher_id, except],
                entry_from_row,
            )
            .optional()?;
        Ok(entry)
    }

    pub fn class_entry_count(&self, class_name: &str) -> Result<usize, AppError> {
        let count: i64 = self.tx.query_row(
            "SELECT COUNT(*) FROM timetable_entries WHERE class_name = ?1",
            params![class_name.trim()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    pub fn delete_class_entries(&self, class_name: &str) -> Result<usize, AppError> {
        let removed = self.tx.execute(
            "DELETE FROM timetable_entries WHERE class_name = ?1",
            params![class_name.trim()],
        )?;
        Ok(removed)
    }

    pub fn insert_entry(&self, entry: &TimetableEntry) -> Result<(), AppError> {
        self.tx.execute(
            &format!(
                "INSERT INTO timetable_entries ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                ENTRY_COLUMNS
            ),
            params![
                entry.id,
                entry.class_name,
                entry.day_of_week.as_str(),
                entry.period,
                entry.subject,
                entry.teacher.id,
                entry.teacher.name,
            ],
        )?;
        Ok(())
    }

    pub fn replace_entry(&self, entry: &TimetableEntry) -> Result<(), AppError> {
        let updated = self.tx.execute(
            "UPDATE timetable_entries
             SET class_name = ?2, day_of_week = ?3, period = ?4, subject = ?5,
                 teacher_id = ?6, teacher_name = ?7
             WHERE id = ?1",
            params![
                entry.id,
                entry.class_name,
                entry.day_of_week.as_str(),
                entry.period,
                entry.subject,
                entry.teacher.id,
                entry.teacher.name,
            ],
        )?;
        if updated == 0 {
            return Err(AppError::NotFound(format!("timetable entry {}", entry.id)));
        }
        Ok(())
    }

    pub fn delete_entry(&self, id: &str) -> Result<Option<TimetableEntry>, AppError> {
        let Some(entry) = self.entry(id)? else {
            return Ok(None);
        };
        self.tx
            .execute("DELETE FROM timetable_entries WHERE id = ?1", params![id])?;
        Ok(Some(entry))
    }
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<TimetableEntry> {
    Ok(TimetableEntry {
        id: row.get(0)?,
        class_name: row.get(1)?,
        day_of_week: day_column(row, 2)?,
        period: row.get(3)?,
        subject: row.get(4)?,
        teacher: TeacherRef {
            id: row.get(5)?,
            name: row.get(6)?,
        },
    })
}

fn json_column<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn day_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Day> {
    let raw: String = row.get(idx)?;
    raw.parse::<Day>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into()))
}

fn time_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<chrono::NaiveTime> {
    let raw: String = row.get(idx)?;
    clock::parse(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
