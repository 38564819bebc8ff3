use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::compiler::QueryCompiler;
use crate::error::{Error, Result};
use crate::models::dashboard::{
    CreateDashboardRequest, Dashboard, DashboardConfig, DashboardExport, DashboardListFilter,
    DashboardPage, ImportDashboardRequest, LayoutItem, UpdateDashboardRequest, Widget,
};
use crate::repository::DashboardRepository;

/// Domain rules for dashboards: uniqueness, the locked-flag gate, widget id
/// minting, and layout/widget referential integrity. The single writer path
/// for dashboard state.
pub struct DashboardService {
    repo: Arc<dyn DashboardRepository>,
    compiler: QueryCompiler,
}

impl DashboardService {
    pub fn new(repo: Arc<dyn DashboardRepository>, compiler: QueryCompiler) -> Self {
        Self { repo, compiler }
    }

    pub fn create_dashboard(
        &self,
        project_id: &str,
        user_id: Option<&str>,
        req: CreateDashboardRequest,
    ) -> Result<Dashboard> {
        let name = req.name.trim();
        if name.is_empty() {
            return Err(Error::validation("dashboard name must not be empty"));
        }
        self.ensure_name_free(project_id, name)?;

        let mut config = req.config.unwrap_or_default();
        mint_missing_widget_ids(&mut config);
        self.validate_config(&config)?;
        let layout = req.layout.unwrap_or_default();
        validate_layout_refs(&config, &layout)?;

        let now = Utc::now();
        let dashboard = Dashboard {
            id: Uuid::now_v7().to_string(),
            project_id: project_id.to_string(),
            name: name.to_string(),
            description: req.description,
            config,
            layout,
            is_locked: false,
            created_by: user_id.map(str::to_string),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        self.repo.create(&dashboard)?;
        tracing::info!("dashboard '{}' created in project {project_id}", dashboard.id);
        Ok(dashboard)
    }

    pub fn list_dashboards(
        &self,
        project_id: &str,
        filter: &DashboardListFilter,
    ) -> Result<DashboardPage> {
        let dashboards = self.repo.get_by_project(project_id, filter)?;
        let total = self.repo.count_by_project(project_id, filter)?;
        Ok(DashboardPage { dashboards, total })
    }

    pub fn get_dashboard(&self, id: &str) -> Result<Dashboard> {
        self.repo.get_by_id(id)
    }

    /// The authoritative accessor for mutating operations: a dashboard in
    /// another project is indistinguishable from a missing one.
    pub fn get_dashboard_by_project(&self, project_id: &str, id: &str) -> Result<Dashboard> {
        let dashboard = self.repo.get_by_id(id)?;
        if dashboard.project_id != project_id {
            return Err(Error::not_found("dashboard"));
        }
        Ok(dashboard)
    }

    pub fn update_dashboard(
        &self,
        project_id: &str,
        id: &str,
        req: UpdateDashboardRequest,
    ) -> Result<Dashboard> {
        let mut dashboard = self.get_dashboard_by_project(project_id, id)?;
        ensure_unlocked(&dashboard)?;

        if let Some(name) = req.name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(Error::validation("dashboard name must not be empty"));
            }
            if name != dashboard.name {
                self.ensure_name_free(project_id, &name)?;
                dashboard.name = name;
            }
        }
        if let Some(description) = req.description {
            dashboard.description = Some(description);
        }
        if let Some(mut config) = req.config {
            mint_missing_widget_ids(&mut config);
            self.validate_config(&config)?;
            dashboard.config = config;
        }
        if let Some(layout) = req.layout {
            dashboard.layout = layout;
        }
        validate_layout_refs(&dashboard.config, &dashboard.layout)?;

        dashboard.updated_at = Utc::now();
        self.repo.update(&dashboard)?;
        Ok(dashboard)
    }

    pub fn delete_dashboard(&self, project_id: &str, id: &str) -> Result<()> {
        let dashboard = self.get_dashboard_by_project(project_id, id)?;
        ensure_unlocked(&dashboard)?;
        self.repo.soft_delete(id)?;
        tracing::info!("dashboard '{id}' deleted in project {project_id}");
        Ok(())
    }

    pub fn add_widget(&self, project_id: &str, id: &str, mut widget: Widget) -> Result<Dashboard> {
        let mut dashboard = self.get_dashboard_by_project(project_id, id)?;
        ensure_unlocked(&dashboard)?;

        if widget.id.is_empty() {
            widget.id = Uuid::new_v4().to_string();
        } else if dashboard.config.widgets.iter().any(|w| w.id == widget.id) {
            return Err(Error::conflict(format!("widget id '{}' already exists", widget.id)));
        }
        self.compiler.validate_widget(&widget)?;

        dashboard.config.widgets.push(widget);
        dashboard.updated_at = Utc::now();
        self.repo.update(&dashboard)?;
        Ok(dashboard)
    }

    pub fn update_widget(
        &self,
        project_id: &str,
        id: &str,
        widget_id: &str,
        mut widget: Widget,
    ) -> Result<Dashboard> {
        let mut dashboard = self.get_dashboard_by_project(project_id, id)?;
        ensure_unlocked(&dashboard)?;

        let slot = dashboard
            .config
            .widgets
            .iter_mut()
            .find(|w| w.id == widget_id)
            .ok_or_else(|| Error::not_found("widget"))?;
        widget.id = widget_id.to_string();
        self.compiler.validate_widget(&widget)?;
        *slot = widget;

        dashboard.updated_at = Utc::now();
        self.repo.update(&dashboard)?;
        Ok(dashboard)
    }

    /// Removing a widget also purges its layout placements.
    pub fn remove_widget(&self, project_id: &str, id: &str, widget_id: &str) -> Result<Dashboard> {
        let mut dashboard = self.get_dashboard_by_project(project_id, id)?;
        ensure_unlocked(&dashboard)?;

        let before = dashboard.config.widgets.len();
        dashboard.config.widgets.retain(|w| w.id != widget_id);
        if dashboard.config.widgets.len() == before {
            return Err(Error::not_found("widget"));
        }
        dashboard.layout.retain(|item| item.widget_id != widget_id);

        dashboard.updated_at = Utc::now();
        self.repo.update(&dashboard)?;
        Ok(dashboard)
    }

    pub fn update_layout(
        &self,
        project_id: &str,
        id: &str,
        layout: Vec<LayoutItem>,
    ) -> Result<Dashboard> {
        let mut dashboard = self.get_dashboard_by_project(project_id, id)?;
        ensure_unlocked(&dashboard)?;
        validate_layout_refs(&dashboard.config, &layout)?;

        dashboard.layout = layout;
        dashboard.updated_at = Utc::now();
        self.repo.update(&dashboard)?;
        Ok(dashboard)
    }

    pub fn duplicate_dashboard(
        &self,
        project_id: &str,
        id: &str,
        new_name: &str,
    ) -> Result<Dashboard> {
        let source = self.get_dashboard_by_project(project_id, id)?;
        let name = new_name.trim();
        if name.is_empty() {
            return Err(Error::validation("dashboard name must not be empty"));
        }
        self.ensure_name_free(project_id, name)?;

        let (config, layout) = remap_widget_ids(&source.config, &source.layout);
        let now = Utc::now();
        let copy = Dashboard {
            id: Uuid::now_v7().to_string(),
            project_id: project_id.to_string(),
            name: name.to_string(),
            description: source.description.clone(),
            config,
            layout,
            is_locked: false,
            created_by: source.created_by.clone(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        self.repo.create(&copy)?;
        Ok(copy)
    }

    /// Idempotent: locking a locked dashboard (or unlocking an unlocked
    /// one) returns current state unchanged.
    pub fn set_locked(&self, project_id: &str, id: &str, locked: bool) -> Result<Dashboard> {
        let mut dashboard = self.get_dashboard_by_project(project_id, id)?;
        if dashboard.is_locked == locked {
            return Ok(dashboard);
        }
        dashboard.is_locked = locked;
        dashboard.updated_at = Utc::now();
        self.repo.update(&dashboard)?;
        Ok(dashboard)
    }

    pub fn export_dashboard(&self, project_id: &str, id: &str) -> Result<DashboardExport> {
        let dashboard = self.get_dashboard_by_project(project_id, id)?;
        Ok(DashboardExport {
            version: "1.0".to_string(),
            exported_at: Utc::now(),
            name: dashboard.name.clone(),
            description: dashboard.description.clone(),
            config: dashboard.config.clone(),
            layout: dashboard.layout.clone(),
        })
    }

    /// Imported dashboards get fresh widget ids and always start unlocked.
    pub fn import_dashboard(
        &self,
        project_id: &str,
        user_id: Option<&str>,
        req: ImportDashboardRequest,
    ) -> Result<Dashboard> {
        if req.data.version.split('.').next() != Some("1") {
            return Err(Error::validation(format!(
                "unsupported export version '{}'",
                req.data.version
            )));
        }
        let name = req.name.unwrap_or_else(|| req.data.name.clone());
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::validation("dashboard name must not be empty"));
        }
        self.ensure_name_free(project_id, name)?;

        let mut config = req.data.config;
        mint_missing_widget_ids(&mut config);
        self.validate_config(&config)?;
        validate_layout_refs(&config, &req.data.layout)?;
        let (config, layout) = remap_widget_ids(&config, &req.data.layout);

        let now = Utc::now();
        let dashboard = Dashboard {
            id: Uuid::now_v7().to_string(),
            project_id: project_id.to_string(),
            name: name.to_string(),
            description: req.data.description,
            config,
            layout,
            is_locked: false,
            created_by: user_id.map(str::to_string),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        self.repo.create(&dashboard)?;
        Ok(dashboard)
    }

    fn ensure_name_free(&self, project_id: &str, name: &str) -> Result<()> {
        match self.repo.get_by_name_and_project(project_id, name) {
            Ok(_) => Err(Error::conflict(format!(
                "a dashboard named '{name}' already exists in this project"
            ))),
            Err(Error::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn validate_config(&self, config: &DashboardConfig) -> Result<()> {
        let mut seen = HashSet::new();
        for widget in &config.widgets {
            if !seen.insert(widget.id.as_str()) {
                return Err(Error::conflict(format!("widget id '{}' already exists", widget.id)));
            }
            self.compiler.validate_widget(widget)?;
        }
        Ok(())
    }
}

fn ensure_unlocked(dashboard: &Dashboard) -> Result<()> {
    if dashboard.is_locked {
        return Err(Error::validation("dashboard is locked"));
    }
    Ok(())
}

fn mint_missing_widget_ids(config: &mut DashboardConfig) {
    for widget in &mut config.widgets {
        if widget.id.is_empty() {
            widget.id = Uuid::new_v4().to_string();
        }
    }
}

fn validate_layout_refs(config: &DashboardConfig, layout: &[LayoutItem]) -> Result<()> {
    let ids: HashSet<&str> = config.widgets.iter().map(|w| w.id.as_str()).collect();
    for item in layout {
        if !ids.contains(item.widget_id.as_str()) {
            return Err(Error::validation(format!(
                "layout references unknown widget '{}'",
                item.widget_id
            )));
        }
    }
    Ok(())
}

/// Deep-copy a config + layout, minting a fresh id for every widget and
/// rewriting layout references through the old→new map.
fn remap_widget_ids(
    config: &DashboardConfig,
    layout: &[LayoutItem],
) -> (DashboardConfig, Vec<LayoutItem>) {
    let mut config = config.clone();
    let mut id_map = HashMap::new();
    for widget in &mut config.widgets {
        let fresh = Uuid::new_v4().to_string();
        id_map.insert(widget.id.clone(), fresh.clone());
        widget.id = fresh;
    }
    let layout = layout
        .iter()
        .map(|item| LayoutItem {
            widget_id: id_map
                .get(&item.widget_id)
                .cloned()
                .unwrap_or_else(|| item.widget_id.clone()),
            ..item.clone()
        })
        .collect();
    (config, layout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ViewCatalog;
    use crate::config_db::ConfigDb;
    use crate::models::dashboard::WidgetType;
    use crate::models::query::WidgetQuery;

    fn service() -> DashboardService {
        let repo = Arc::new(ConfigDb::open(":memory:").unwrap());
        let compiler = QueryCompiler::new(Arc::new(ViewCatalog::default()));
        DashboardService::new(repo, compiler)
    }

    fn count_widget(id: &str) -> Widget {
        Widget {
            id: id.to_string(),
            widget_type: WidgetType::Stat,
            title: "requests".to_string(),
            description: String::new(),
            query: Some(WidgetQuery {
                view: "traces".to_string(),
                measures: vec!["count".to_string()],
                ..Default::default()
            }),
            config: Default::default(),
        }
    }

    fn two_widget_request(name: &str) -> CreateDashboardRequest {
        CreateDashboardRequest {
            name: name.to_string(),
            description: Some("llm traffic".to_string()),
            config: Some(DashboardConfig {
                widgets: vec![count_widget("a"), count_widget("b")],
                ..Default::default()
            }),
            layout: Some(vec![
                LayoutItem { widget_id: "a".into(), x: 0, y: 0, w: 6, h: 3 },
                LayoutItem { widget_id: "b".into(), x: 6, y: 0, w: 6, h: 3 },
            ]),
        }
    }

    #[test]
    fn create_enforces_name_uniqueness_per_project() {
        let svc = service();
        svc.create_dashboard("p1", None, two_widget_request("traffic")).unwrap();
        let err = svc
            .create_dashboard("p1", None, two_widget_request("traffic"))
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
        // Other projects are unaffected.
        svc.create_dashboard("p2", None, two_widget_request("traffic")).unwrap();
    }

    #[test]
    fn create_rejects_bad_widget_queries() {
        let svc = service();
        let mut req = two_widget_request("bad");
        req.config.as_mut().unwrap().widgets[0].query.as_mut().unwrap().measures =
            vec!["p42_duration".to_string()];
        assert!(matches!(
            svc.create_dashboard("p1", None, req),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn create_rejects_layout_referencing_unknown_widget() {
        let svc = service();
        let mut req = two_widget_request("bad");
        req.layout.as_mut().unwrap().push(LayoutItem {
            widget_id: "ghost".into(),
            x: 0, y: 3, w: 4, h: 2,
        });
        assert!(matches!(
            svc.create_dashboard("p1", None, req),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn cross_project_access_reads_as_not_found() {
        let svc = service();
        let d = svc.create_dashboard("p1", None, two_widget_request("traffic")).unwrap();
        assert!(matches!(
            svc.get_dashboard_by_project("p2", &d.id),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn lock_gates_mutation_and_is_idempotent() {
        let svc = service();
        let d = svc.create_dashboard("p1", Some("u1"), two_widget_request("traffic")).unwrap();

        let locked = svc.set_locked("p1", &d.id, true).unwrap();
        assert!(locked.is_locked);
        let again = svc.set_locked("p1", &d.id, true).unwrap();
        assert!(again.is_locked);

        let update = UpdateDashboardRequest {
            name: Some("renamed".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            svc.update_dashboard("p1", &d.id, update.clone()),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            svc.delete_dashboard("p1", &d.id),
            Err(Error::Validation(_))
        ));

        svc.set_locked("p1", &d.id, false).unwrap();
        let updated = svc.update_dashboard("p1", &d.id, update).unwrap();
        assert_eq!(updated.name, "renamed");
    }

    #[test]
    fn duplicate_mints_fresh_ids_and_remaps_layout() {
        let svc = service();
        let d = svc.create_dashboard("p1", Some("u1"), two_widget_request("traffic")).unwrap();
        let copy = svc.duplicate_dashboard("p1", &d.id, "traffic copy").unwrap();

        assert_ne!(copy.id, d.id);
        assert_eq!(copy.project_id, "p1");
        assert_eq!(copy.created_by.as_deref(), Some("u1"));
        assert_eq!(copy.config.widgets.len(), 2);

        let old_ids: HashSet<_> = d.config.widgets.iter().map(|w| w.id.clone()).collect();
        let new_ids: HashSet<_> = copy.config.widgets.iter().map(|w| w.id.clone()).collect();
        assert!(old_ids.is_disjoint(&new_ids));
        assert_eq!(new_ids.len(), 2);

        // Layout follows the remap and keeps its geometry.
        for (old_item, new_item) in d.layout.iter().zip(copy.layout.iter()) {
            assert_ne!(old_item.widget_id, new_item.widget_id);
            assert!(new_ids.contains(&new_item.widget_id));
            assert_eq!(
                (old_item.x, old_item.y, old_item.w, old_item.h),
                (new_item.x, new_item.y, new_item.w, new_item.h)
            );
        }
    }

    #[test]
    fn remove_widget_prunes_layout() {
        let svc = service();
        let d = svc.create_dashboard("p1", None, two_widget_request("traffic")).unwrap();
        let target = d.config.widgets[0].id.clone();

        let after = svc.remove_widget("p1", &d.id, &target).unwrap();
        assert_eq!(after.config.widgets.len(), 1);
        assert_eq!(after.layout.len(), 1);
        assert!(after.layout.iter().all(|item| item.widget_id != target));
    }

    #[test]
    fn add_widget_mints_id_and_rejects_duplicates() {
        let svc = service();
        let d = svc.create_dashboard("p1", None, two_widget_request("traffic")).unwrap();

        let added = svc.add_widget("p1", &d.id, count_widget("")).unwrap();
        assert_eq!(added.config.widgets.len(), 3);
        assert!(!added.config.widgets[2].id.is_empty());

        let existing = added.config.widgets[0].id.clone();
        assert!(matches!(
            svc.add_widget("p1", &d.id, count_widget(&existing)),
            Err(Error::Conflict(_))
        ));
    }

    #[test]
    fn update_layout_validates_references() {
        let svc = service();
        let d = svc.create_dashboard("p1", None, two_widget_request("traffic")).unwrap();
        let err = svc
            .update_layout("p1", &d.id, vec![LayoutItem {
                widget_id: "ghost".into(),
                x: 0, y: 0, w: 1, h: 1,
            }])
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn export_import_round_trips_modulo_widget_ids() {
        let svc = service();
        let d = svc.create_dashboard("p1", None, two_widget_request("traffic")).unwrap();
        let export = svc.export_dashboard("p1", &d.id).unwrap();
        assert_eq!(export.version, "1.0");

        let imported = svc
            .import_dashboard("p1", Some("u2"), ImportDashboardRequest {
                name: Some("traffic (imported)".to_string()),
                data: export.clone(),
            })
            .unwrap();
        assert!(!imported.is_locked);
        assert_eq!(imported.description, d.description);
        assert_eq!(imported.config.widgets.len(), d.config.widgets.len());
        assert_eq!(imported.layout.len(), d.layout.len());

        // Re-export equals the original export up to fresh ids and timestamp.
        let re_export = svc.export_dashboard("p1", &imported.id).unwrap();
        assert_eq!(re_export.version, export.version);
        let geometry = |l: &[LayoutItem]| {
            l.iter().map(|i| (i.x, i.y, i.w, i.h)).collect::<Vec<_>>()
        };
        assert_eq!(geometry(&re_export.layout), geometry(&export.layout));
        let old_ids: HashSet<_> = export.config.widgets.iter().map(|w| w.id.clone()).collect();
        assert!(re_export.config.widgets.iter().all(|w| !old_ids.contains(&w.id)));
    }

    #[test]
    fn import_rejects_other_major_versions() {
        let svc = service();
        let d = svc.create_dashboard("p1", None, two_widget_request("traffic")).unwrap();
        let mut export = svc.export_dashboard("p1", &d.id).unwrap();
        export.version = "2.0".to_string();
        assert!(matches!(
            svc.import_dashboard("p1", None, ImportDashboardRequest { name: None, data: export }),
            Err(Error::Validation(_))
        ));
    }
}
