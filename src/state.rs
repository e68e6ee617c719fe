//! Application state: the in-memory store, taxonomy providers, configuration
//! store, progression engine, and per-session form state.
//!
//! Everything is injected by reference from here; no module-level globals,
//! so tests can instantiate isolated instances.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::config::load_seed_bank_from_env;
use crate::persistence::{Db, MemoryDb};
use crate::progression::{FormSession, ProgressionEngine, SharedSession};
use crate::seeds;
use crate::store::ConfigStore;
use crate::taxonomy::{CategoryProvider, StudyFieldProvider};

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn Db>,
    pub categories: CategoryProvider,
    pub study_fields: StudyFieldProvider,
    pub configs: ConfigStore,
    pub engine: ProgressionEngine,
    sessions: Arc<RwLock<HashMap<String, SharedSession>>>,
}

impl AppState {
    /// Build state for the standalone server: seed the in-memory store with
    /// the built-in taxonomies plus the optional TOML seed bank, then wire
    /// up providers, store and engine around it.
    #[instrument(level = "info", skip_all)]
    pub async fn new() -> Self {
        let db = Arc::new(MemoryDb::new());
        seed_db(&db).await;
        Self::with_db(db)
    }

    /// Wire state around an existing store handle (used by tests).
    pub fn with_db(db: Arc<MemoryDb>) -> Self {
        let db: Arc<dyn Db> = db;
        let categories = CategoryProvider::new(db.clone());
        let study_fields = StudyFieldProvider::new(db.clone());
        let configs = ConfigStore::new(db.clone(), study_fields.clone());
        let engine = ProgressionEngine::new(categories.clone(), study_fields.clone(), db.clone());
        Self {
            db,
            categories,
            study_fields,
            configs,
            engine,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Start a form-fill session on the currently active configuration.
    #[instrument(level = "info", skip(self))]
    pub async fn open_session(&self, user_id: Option<String>) -> (String, SharedSession) {
        let config = self.configs.get_active().await;
        let session_id = Uuid::new_v4().to_string();
        let session: SharedSession = Arc::new(RwLock::new(FormSession::new(
            session_id.clone(),
            user_id,
            config,
        )));
        self.sessions.write().await.insert(session_id.clone(), session.clone());
        info!(target: "progression", %session_id, "Session opened");
        (session_id, session)
    }

    pub async fn session(&self, session_id: &str) -> Option<SharedSession> {
        self.sessions.read().await.get(session_id).cloned()
    }

    pub async fn close_session(&self, session_id: &str) {
        self.sessions.write().await.remove(session_id);
    }
}

/// Insert built-in defaults and the optional TOML seed bank. Seed entries
/// never overwrite rows an admin already created with the same id.
async fn seed_db(db: &Arc<MemoryDb>) {
    for category in seeds::default_categories() {
        if db.get_category(&category.category_id).await.ok().flatten().is_none() {
            let _ = db.upsert_category(&category).await;
        }
    }
    for field in seeds::default_study_fields() {
        if db.get_study_field(&field.field_id).await.ok().flatten().is_none() {
            let _ = db.upsert_study_field(&field).await;
        }
    }
    if let Some(bank) = load_seed_bank_from_env() {
        for category in &bank.categories {
            let _ = db.upsert_category(category).await;
        }
        for field in &bank.study_fields {
            let _ = db.upsert_study_field(field).await;
        }
    }
    info!(target: "formforge_backend", "Store seeded with built-in taxonomies");
}
