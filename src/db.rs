use chrono::Local;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{PersistenceError, Result, TrackerError};
use crate::models::{
    Application, ApplicationId, ApplicationPatch, ApplicationStatus, NewApplication, OwnerId,
    TimelineEntry,
};

/// Data access for applications and their timelines. Every read and write is
/// scoped to the owner passed in; nothing here caches or retries.
pub trait RecordStore {
    /// All rows for `owner`, newest application date first. No owner, no rows.
    fn list_by_owner(&self, owner: Option<&OwnerId>) -> Result<Vec<Application>>;

    fn insert(&self, owner: &OwnerId, fields: &NewApplication) -> Result<Application>;

    /// Fails with `NotFound` unless a row matches both `id` and `owner`.
    fn update(
        &self,
        id: &ApplicationId,
        owner: &OwnerId,
        patch: &ApplicationPatch,
    ) -> Result<Application>;

    /// Sets only the status. When `note` is given a timeline entry is appended
    /// with `old_status` exactly as supplied by the caller.
    fn update_status(
        &self,
        id: &ApplicationId,
        owner: &OwnerId,
        new_status: ApplicationStatus,
        old_status: Option<ApplicationStatus>,
        note: Option<&str>,
    ) -> Result<Application>;

    fn remove(&self, id: &ApplicationId, owner: &OwnerId) -> Result<()>;

    /// Newest entry first.
    fn list_timeline(
        &self,
        application_id: &ApplicationId,
        owner: &OwnerId,
    ) -> Result<Vec<TimelineEntry>>;
}

const APPLICATION_COLUMNS: &str = "id, wallet_address, company_name, position_title, platform,
    platform_other, application_date, status, salary_min, salary_max, salary_currency,
    salary_period, salary_not_specified, location_type, location_city, job_url,
    personal_notes, is_priority, created_at, updated_at";

const TIMELINE_COLUMNS: &str =
    "id, application_id, wallet_address, old_status, new_status, notes, changed_at";

const NOW: &str = "strftime('%Y-%m-%d %H:%M:%f', 'now')";

pub struct Database {
    conn: Connection,
    path: PathBuf,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    PersistenceError::Schema(format!(
                        "cannot create {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }
        let conn = Connection::open(path)?;
        Self::configure(conn, path.to_path_buf())
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::configure(conn, PathBuf::from(":memory:"))
    }

    fn configure(conn: Connection, path: PathBuf) -> Result<Self> {
        // Timeline rows are removed through ON DELETE CASCADE
        conn.pragma_update(None, "foreign_keys", true)?;
        debug!(path = %path.display(), "opened database");
        Ok(Self { conn, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn init(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS applications (
                id TEXT PRIMARY KEY NOT NULL DEFAULT (lower(hex(randomblob(16)))),
                wallet_address TEXT NOT NULL CHECK (length(trim(wallet_address)) > 0),
                company_name TEXT NOT NULL CHECK (length(trim(company_name)) > 0),
                position_title TEXT NOT NULL CHECK (length(trim(position_title)) > 0),
                platform TEXT NOT NULL CHECK (platform IN (
                    'linkedin', 'indeed', 'computrabajo', 'occ_mundial', 'glassdoor',
                    'sitio_empresa', 'email_directo', 'referido', 'otro')),
                platform_other TEXT,
                application_date TEXT NOT NULL DEFAULT (date('now')),
                status TEXT NOT NULL DEFAULT 'pendiente' CHECK (status IN (
                    'pendiente', 'en_revision', 'te_contestaron', 'entrevista_programada',
                    'rechazada', 'aceptada', 'descartada_por_mi')),
                salary_min REAL,
                salary_max REAL,
                salary_currency TEXT CHECK (salary_currency IN ('USD', 'MXN', 'EUR')),
                salary_period TEXT CHECK (salary_period IN ('mensual', 'anual')),
                salary_not_specified INTEGER NOT NULL DEFAULT 0,
                location_type TEXT CHECK (location_type IN ('remoto', 'presencial', 'hibrido')),
                location_city TEXT,
                job_url TEXT,
                personal_notes TEXT,
                is_priority INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')),
                updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now'))
            );

            CREATE TABLE IF NOT EXISTS application_timeline (
                id TEXT PRIMARY KEY NOT NULL DEFAULT (lower(hex(randomblob(16)))),
                application_id TEXT NOT NULL REFERENCES applications(id) ON DELETE CASCADE,
                wallet_address TEXT NOT NULL,
                old_status TEXT CHECK (old_status IN (
                    'pendiente', 'en_revision', 'te_contestaron', 'entrevista_programada',
                    'rechazada', 'aceptada', 'descartada_por_mi')),
                new_status TEXT NOT NULL CHECK (new_status IN (
                    'pendiente', 'en_revision', 'te_contestaron', 'entrevista_programada',
                    'rechazada', 'aceptada', 'descartada_por_mi')),
                notes TEXT,
                changed_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now'))
            );

            CREATE TRIGGER IF NOT EXISTS applications_identity_immutable
            BEFORE UPDATE OF id, wallet_address ON applications
            BEGIN
                SELECT RAISE(ABORT, 'id and wallet_address are immutable');
            END;

            CREATE TRIGGER IF NOT EXISTS application_timeline_append_only
            BEFORE UPDATE ON application_timeline
            BEGIN
                SELECT RAISE(ABORT, 'timeline entries are append-only');
            END;

            CREATE INDEX IF NOT EXISTS idx_applications_owner_date
                ON applications(wallet_address, application_date);
            CREATE INDEX IF NOT EXISTS idx_timeline_application
                ON application_timeline(application_id, changed_at);
            "#,
        )?;
        info!(path = %self.path.display(), "schema initialized");
        Ok(())
    }

    pub fn ensure_initialized(&self) -> Result<()> {
        let tables: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master
             WHERE type = 'table' AND name IN ('applications', 'application_timeline')",
            [],
            |row| row.get(0),
        )?;
        if tables < 2 {
            return Err(PersistenceError::Schema("run 'postula init' first".to_string()).into());
        }
        Ok(())
    }

    fn row_to_application(row: &rusqlite::Row) -> rusqlite::Result<Application> {
        Ok(Application {
            id: row.get(0)?,
            wallet_address: row.get(1)?,
            company_name: row.get(2)?,
            position_title: row.get(3)?,
            platform: row.get(4)?,
            platform_other: row.get(5)?,
            application_date: row.get(6)?,
            status: row.get(7)?,
            salary_min: row.get(8)?,
            salary_max: row.get(9)?,
            salary_currency: row.get(10)?,
            salary_period: row.get(11)?,
            salary_not_specified: row.get(12)?,
            location_type: row.get(13)?,
            location_city: row.get(14)?,
            job_url: row.get(15)?,
            personal_notes: row.get(16)?,
            is_priority: row.get(17)?,
            created_at: row.get(18)?,
            updated_at: row.get(19)?,
        })
    }

    fn row_to_timeline(row: &rusqlite::Row) -> rusqlite::Result<TimelineEntry> {
        Ok(TimelineEntry {
            id: row.get(0)?,
            application_id: row.get(1)?,
            wallet_address: row.get(2)?,
            old_status: row.get(3)?,
            new_status: row.get(4)?,
            notes: row.get(5)?,
            changed_at: row.get(6)?,
        })
    }
}

impl RecordStore for Database {
    fn list_by_owner(&self, owner: Option<&OwnerId>) -> Result<Vec<Application>> {
        let Some(owner) = owner else {
            return Ok(Vec::new());
        };

        let sql = format!(
            "SELECT {} FROM applications
             WHERE wallet_address = ?1
             ORDER BY application_date DESC, created_at DESC",
            APPLICATION_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([owner], Self::row_to_application)?;
        let applications = rows.collect::<rusqlite::Result<Vec<_>>>()?;

        debug!(owner = %owner, count = applications.len(), "listed applications");
        Ok(applications)
    }

    fn insert(&self, owner: &OwnerId, fields: &NewApplication) -> Result<Application> {
        let platform = fields
            .platform
            .ok_or_else(|| TrackerError::Validation("missing required fields: platform".into()))?;
        let application_date = fields
            .application_date
            .unwrap_or_else(|| Local::now().date_naive());
        let status = fields.status.unwrap_or(ApplicationStatus::Pendiente);

        let sql = format!(
            "INSERT INTO applications (
                wallet_address, company_name, position_title, platform, platform_other,
                application_date, status, salary_min, salary_max, salary_currency,
                salary_period, salary_not_specified, location_type, location_city, job_url,
                personal_notes, is_priority
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
             RETURNING {}",
            APPLICATION_COLUMNS
        );
        let application = self.conn.query_row(
            &sql,
            params![
                owner,
                fields.company_name,
                fields.position_title,
                platform,
                fields.platform_other,
                application_date,
                status,
                fields.salary_min,
                fields.salary_max,
                fields.salary_currency,
                fields.salary_period,
                fields.salary_not_specified,
                fields.location_type,
                fields.location_city,
                fields.job_url,
                fields.personal_notes,
                fields.is_priority,
            ],
            Self::row_to_application,
        )?;

        info!(owner = %owner, id = %application.id, "inserted application");
        Ok(application)
    }

    fn update(
        &self,
        id: &ApplicationId,
        owner: &OwnerId,
        patch: &ApplicationPatch,
    ) -> Result<Application> {
        let mut assignments = Assignments::default();
        if let Some(name) = &patch.company_name {
            assignments.set("company_name", name.clone());
        }
        if let Some(title) = &patch.position_title {
            assignments.set("position_title", title.clone());
        }
        if let Some(platform) = patch.platform {
            assignments.set("platform", platform.as_str().to_string());
        }
        if let Some(other) = &patch.platform_other {
            match patch.platform {
                Some(_) => assignments.set("platform_other", other.clone()),
                // Free text only sticks to records already on 'otro'
                None => assignments.set_when("platform_other", "platform = 'otro'", other.clone()),
            }
        }
        if let Some(date) = patch.application_date {
            assignments.set("application_date", date.format("%Y-%m-%d").to_string());
        }
        if let Some(status) = patch.status {
            assignments.set("status", status.as_str().to_string());
        }
        if let Some(min) = patch.salary_min {
            assignments.set("salary_min", min);
        }
        if let Some(max) = patch.salary_max {
            assignments.set("salary_max", max);
        }
        if let Some(currency) = patch.salary_currency {
            assignments.set("salary_currency", currency.map(|c| c.as_str().to_string()));
        }
        if let Some(period) = patch.salary_period {
            assignments.set("salary_period", period.map(|p| p.as_str().to_string()));
        }
        if let Some(flag) = patch.salary_not_specified {
            assignments.set("salary_not_specified", flag);
        }
        if let Some(location) = patch.location_type {
            assignments.set("location_type", location.map(|l| l.as_str().to_string()));
        }
        if let Some(city) = &patch.location_city {
            assignments.set("location_city", city.clone());
        }
        if let Some(url) = &patch.job_url {
            assignments.set("job_url", url.clone());
        }
        if let Some(notes) = &patch.personal_notes {
            assignments.set("personal_notes", notes.clone());
        }
        if let Some(flag) = patch.is_priority {
            assignments.set("is_priority", flag);
        }

        let application = assignments.apply(&self.conn, id, owner)?;
        info!(owner = %owner, id = %id, "updated application");
        Ok(application)
    }

    fn update_status(
        &self,
        id: &ApplicationId,
        owner: &OwnerId,
        new_status: ApplicationStatus,
        old_status: Option<ApplicationStatus>,
        note: Option<&str>,
    ) -> Result<Application> {
        let tx = self.conn.unchecked_transaction()?;

        let mut assignments = Assignments::default();
        assignments.set("status", new_status.as_str().to_string());
        let application = assignments.apply(&tx, id, owner)?;

        if let Some(note) = note.map(str::trim).filter(|n| !n.is_empty()) {
            tx.execute(
                "INSERT INTO application_timeline
                    (application_id, wallet_address, old_status, new_status, notes)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, owner, old_status, new_status, note],
            )?;
            debug!(id = %id, "appended timeline entry");
        }

        tx.commit()?;
        info!(owner = %owner, id = %id, status = %new_status, "updated status");
        Ok(application)
    }

    fn remove(&self, id: &ApplicationId, owner: &OwnerId) -> Result<()> {
        let deleted = self.conn.execute(
            "DELETE FROM applications WHERE id = ?1 AND wallet_address = ?2",
            params![id, owner],
        )?;
        if deleted == 0 {
            return Err(TrackerError::not_found(id));
        }
        info!(owner = %owner, id = %id, "removed application");
        Ok(())
    }

    fn list_timeline(
        &self,
        application_id: &ApplicationId,
        owner: &OwnerId,
    ) -> Result<Vec<TimelineEntry>> {
        let sql = format!(
            "SELECT {} FROM application_timeline
             WHERE application_id = ?1 AND wallet_address = ?2
             ORDER BY changed_at DESC, rowid DESC",
            TIMELINE_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![application_id, owner], Self::row_to_timeline)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

/// SET clause for a scoped UPDATE, built column by column.
#[derive(Default)]
struct Assignments {
    columns: Vec<String>,
    values: Vec<Value>,
}

impl Assignments {
    fn set(&mut self, column: &str, value: impl Into<Value>) {
        self.values.push(value.into());
        self.columns.push(format!("{} = ?{}", column, self.values.len()));
    }

    /// Assigns `value` where `condition` holds on the stored row, NULL otherwise.
    fn set_when(&mut self, column: &str, condition: &str, value: impl Into<Value>) {
        self.values.push(value.into());
        self.columns.push(format!(
            "{} = CASE WHEN {} THEN ?{} END",
            column,
            condition,
            self.values.len()
        ));
    }

    fn apply(mut self, conn: &Connection, id: &ApplicationId, owner: &OwnerId) -> Result<Application> {
        self.columns.push(format!("updated_at = {}", NOW));
        let id_param = self.values.len() + 1;
        let sql = format!(
            "UPDATE applications SET {} WHERE id = ?{} AND wallet_address = ?{} RETURNING {}",
            self.columns.join(", "),
            id_param,
            id_param + 1,
            APPLICATION_COLUMNS
        );
        self.values.push(Value::Text(id.as_str().to_string()));
        self.values.push(Value::Text(owner.as_str().to_string()));

        conn.query_row(&sql, params_from_iter(self.values.iter()), Database::row_to_application)
            .optional()?
            .ok_or_else(|| TrackerError::not_found(id))
    }
}
