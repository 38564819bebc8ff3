use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};

use crate::error::{Error, Result};
use crate::models::dashboard::{Dashboard, DashboardConfig, DashboardListFilter, LayoutItem};
use crate::models::template::{Template, TemplateListFilter};
use crate::repository::{DashboardRepository, TemplateRepository};

/// SQLite-backed config store for dashboards and templates. Widget config
/// and layout are stored as JSON documents; the analytics data itself lives
/// in ClickHouse and never touches this database.
pub struct ConfigDb {
    conn: Mutex<Connection>,
}

impl ConfigDb {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        let db = Self { conn: Mutex::new(conn) };
        db.run_migrations()?;
        Ok(db)
    }

    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS dashboards (
                id          TEXT PRIMARY KEY,
                project_id  TEXT NOT NULL,
                name        TEXT NOT NULL,
                description TEXT,
                config      TEXT NOT NULL DEFAULT '{}',
                layout      TEXT NOT NULL DEFAULT '[]',
                is_locked   INTEGER NOT NULL DEFAULT 0,
                created_by  TEXT,
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL,
                deleted_at  TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_dashboards_project ON dashboards(project_id, created_at DESC);
            CREATE UNIQUE INDEX IF NOT EXISTS idx_dashboards_live_name
                ON dashboards(project_id, name) WHERE deleted_at IS NULL;

            CREATE TABLE IF NOT EXISTS templates (
                id          TEXT PRIMARY KEY,
                name        TEXT NOT NULL UNIQUE,
                description TEXT,
                category    TEXT,
                is_active   INTEGER NOT NULL DEFAULT 1,
                config      TEXT NOT NULL DEFAULT '{}',
                layout      TEXT NOT NULL DEFAULT '[]',
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_templates_category ON templates(category);
            ",
        )?;
        Ok(())
    }
}

/// Column-shaped row; JSON and timestamp parsing happens outside the
/// rusqlite row closure.
struct RawDashboard {
    id: String,
    project_id: String,
    name: String,
    description: Option<String>,
    config: String,
    layout: String,
    is_locked: bool,
    created_by: Option<String>,
    created_at: String,
    updated_at: String,
    deleted_at: Option<String>,
}

const DASHBOARD_COLS: &str =
    "id, project_id, name, description, config, layout, is_locked, created_by, created_at, updated_at, deleted_at";

fn raw_dashboard(row: &rusqlite::Row) -> rusqlite::Result<RawDashboard> {
    Ok(RawDashboard {
        id: row.get(0)?,
        project_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        config: row.get(4)?,
        layout: row.get(5)?,
        is_locked: row.get(6)?,
        created_by: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
        deleted_at: row.get(10)?,
    })
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc))
}

impl RawDashboard {
    fn into_dashboard(self) -> Result<Dashboard> {
        let config: DashboardConfig = serde_json::from_str(&self.config)?;
        let layout: Vec<LayoutItem> = serde_json::from_str(&self.layout)?;
        Ok(Dashboard {
            id: self.id,
            project_id: self.project_id,
            name: self.name,
            description: self.description,
            config,
            layout,
            is_locked: self.is_locked,
            created_by: self.created_by,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
            deleted_at: self.deleted_at.as_deref().map(parse_ts).transpose()?,
        })
    }
}

impl DashboardRepository for ConfigDb {
    fn create(&self, d: &Dashboard) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO dashboards (id, project_id, name, description, config, layout, is_locked, created_by, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                d.id,
                d.project_id,
                d.name,
                d.description,
                serde_json::to_string(&d.config)?,
                serde_json::to_string(&d.layout)?,
                d.is_locked,
                d.created_by,
                d.created_at.to_rfc3339(),
                d.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn get_by_id(&self, id: &str) -> Result<Dashboard> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {DASHBOARD_COLS} FROM dashboards WHERE id = ?1 AND deleted_at IS NULL"
        ))?;
        let mut rows = stmt.query_map(params![id], raw_dashboard)?;
        match rows.next().transpose()? {
            Some(raw) => raw.into_dashboard(),
            None => Err(Error::not_found("dashboard")),
        }
    }

    fn update(&self, d: &Dashboard) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let count = conn.execute(
            "UPDATE dashboards SET name = ?2, description = ?3, config = ?4, layout = ?5,
                 is_locked = ?6, updated_at = ?7
             WHERE id = ?1 AND deleted_at IS NULL",
            params![
                d.id,
                d.name,
                d.description,
                serde_json::to_string(&d.config)?,
                serde_json::to_string(&d.layout)?,
                d.is_locked,
                Utc::now().to_rfc3339(),
            ],
        )?;
        if count == 0 {
            return Err(Error::not_found("dashboard"));
        }
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let count = conn.execute("DELETE FROM dashboards WHERE id = ?1", params![id])?;
        if count == 0 {
            return Err(Error::not_found("dashboard"));
        }
        Ok(())
    }

    fn soft_delete(&self, id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let count = conn.execute(
            "UPDATE dashboards SET deleted_at = ?2 WHERE id = ?1 AND deleted_at IS NULL",
            params![id, Utc::now().to_rfc3339()],
        )?;
        if count == 0 {
            return Err(Error::not_found("dashboard"));
        }
        Ok(())
    }

    fn get_by_project(&self, project_id: &str, filter: &DashboardListFilter) -> Result<Vec<Dashboard>> {
        let conn = self.conn.lock().unwrap();
        let pattern = filter.search.as_deref().map(|s| format!("%{s}%"));
        let limit = filter.limit.unwrap_or(100) as i64;
        let offset = filter.offset.unwrap_or(0) as i64;
        let mut stmt = conn.prepare(&format!(
            "SELECT {DASHBOARD_COLS} FROM dashboards
             WHERE project_id = ?1 AND deleted_at IS NULL
               AND (?2 IS NULL OR name LIKE ?2)
             ORDER BY created_at DESC LIMIT ?3 OFFSET ?4"
        ))?;
        let raws = stmt
            .query_map(params![project_id, pattern, limit, offset], raw_dashboard)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        raws.into_iter().map(RawDashboard::into_dashboard).collect()
    }

    fn get_by_name_and_project(&self, project_id: &str, name: &str) -> Result<Dashboard> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {DASHBOARD_COLS} FROM dashboards
             WHERE project_id = ?1 AND name = ?2 AND deleted_at IS NULL"
        ))?;
        let mut rows = stmt.query_map(params![project_id, name], raw_dashboard)?;
        match rows.next().transpose()? {
            Some(raw) => raw.into_dashboard(),
            None => Err(Error::not_found("dashboard")),
        }
    }

    fn count_by_project(&self, project_id: &str, filter: &DashboardListFilter) -> Result<u64> {
        let conn = self.conn.lock().unwrap();
        let pattern = filter.search.as_deref().map(|s| format!("%{s}%"));
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM dashboards
             WHERE project_id = ?1 AND deleted_at IS NULL
               AND (?2 IS NULL OR name LIKE ?2)",
            params![project_id, pattern],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

struct RawTemplate {
    id: String,
    name: String,
    description: Option<String>,
    category: Option<String>,
    is_active: bool,
    config: String,
    layout: String,
    created_at: String,
    updated_at: String,
}

const TEMPLATE_COLS: &str =
    "id, name, description, category, is_active, config, layout, created_at, updated_at";

fn raw_template(row: &rusqlite::Row) -> rusqlite::Result<RawTemplate> {
    Ok(RawTemplate {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        category: row.get(3)?,
        is_active: row.get(4)?,
        config: row.get(5)?,
        layout: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

impl RawTemplate {
    fn into_template(self) -> Result<Template> {
        Ok(Template {
            id: self.id,
            name: self.name,
            description: self.description,
            category: self.category,
            is_active: self.is_active,
            config: serde_json::from_str(&self.config)?,
            layout: serde_json::from_str(&self.layout)?,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
        })
    }
}

impl TemplateRepository for ConfigDb {
    fn list(&self, filter: &TemplateListFilter) -> Result<Vec<Template>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {TEMPLATE_COLS} FROM templates
             WHERE is_active = 1 AND (?1 IS NULL OR category = ?1)
             ORDER BY name ASC"
        ))?;
        let raws = stmt
            .query_map(params![filter.category], raw_template)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        raws.into_iter().map(RawTemplate::into_template).collect()
    }

    fn get_by_id(&self, id: &str) -> Result<Template> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!("SELECT {TEMPLATE_COLS} FROM templates WHERE id = ?1"))?;
        let mut rows = stmt.query_map(params![id], raw_template)?;
        match rows.next().transpose()? {
            Some(raw) => raw.into_template(),
            None => Err(Error::not_found("template")),
        }
    }

    fn get_by_name(&self, name: &str) -> Result<Template> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!("SELECT {TEMPLATE_COLS} FROM templates WHERE name = ?1"))?;
        let mut rows = stmt.query_map(params![name], raw_template)?;
        match rows.next().transpose()? {
            Some(raw) => raw.into_template(),
            None => Err(Error::not_found("template")),
        }
    }

    fn get_by_category(&self, category: &str) -> Result<Vec<Template>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {TEMPLATE_COLS} FROM templates WHERE category = ?1 AND is_active = 1 ORDER BY name ASC"
        ))?;
        let raws = stmt
            .query_map(params![category], raw_template)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        raws.into_iter().map(RawTemplate::into_template).collect()
    }

    fn create(&self, t: &Template) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO templates (id, name, description, category, is_active, config, layout, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                t.id,
                t.name,
                t.description,
                t.category,
                t.is_active,
                serde_json::to_string(&t.config)?,
                serde_json::to_string(&t.layout)?,
                t.created_at.to_rfc3339(),
                t.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn update(&self, t: &Template) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let count = conn.execute(
            "UPDATE templates SET name = ?2, description = ?3, category = ?4, is_active = ?5,
                 config = ?6, layout = ?7, updated_at = ?8
             WHERE id = ?1",
            params![
                t.id,
                t.name,
                t.description,
                t.category,
                t.is_active,
                serde_json::to_string(&t.config)?,
                serde_json::to_string(&t.layout)?,
                Utc::now().to_rfc3339(),
            ],
        )?;
        if count == 0 {
            return Err(Error::not_found("template"));
        }
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let count = conn.execute("DELETE FROM templates WHERE id = ?1", params![id])?;
        if count == 0 {
            return Err(Error::not_found("template"));
        }
        Ok(())
    }

    fn upsert(&self, t: &Template) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO templates (id, name, description, category, is_active, config, layout, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(name) DO UPDATE SET
                 description = excluded.description,
                 category = excluded.category,
                 is_active = excluded.is_active,
                 config = excluded.config,
                 layout = excluded.layout,
                 updated_at = excluded.updated_at",
            params![
                t.id,
                t.name,
                t.description,
                t.category,
                t.is_active,
                serde_json::to_string(&t.config)?,
                serde_json::to_string(&t.layout)?,
                t.created_at.to_rfc3339(),
                t.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }
}
