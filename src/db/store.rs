// SPDX-License-Identifier: MIT

//! Document store wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Connections (per-user OAuth credentials)
//! - Activities (normalized records keyed by the dedup id)
//!
//! Two backends: Firestore for production (with emulator support) and an
//! in-memory map for tests and offline development. The in-memory backend
//! enforces the same (owner_id, external_id) uniqueness as Firestore, so
//! the sync engine's idempotency is observable without GCP.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::db::collections;
use crate::error::AppError;
use crate::models::{ActivityRecord, Connection};

/// Document store client.
#[derive(Clone)]
pub struct Db {
    backend: Backend,
}

#[derive(Clone)]
enum Backend {
    Firestore(firestore::FirestoreDb),
    Memory(Arc<MemoryStore>),
}

#[derive(Default)]
struct MemoryStore {
    /// Keyed by user_id
    connections: RwLock<HashMap<String, Connection>>,
    /// Keyed by ActivityRecord::doc_id
    activities: RwLock<HashMap<String, ActivityRecord>>,
}

impl Db {
    /// Create a new Firestore-backed store.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn connect(project_id: &str) -> Result<Self, AppError> {
        // Emulator: unauthenticated connection to avoid local credential
        // warnings and leakage.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::connect_emulator(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            backend: Backend::Firestore(client),
        })
    }

    /// Firestore emulator client with a dummy token source.
    async fn connect_emulator(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        Ok(Self {
            backend: Backend::Firestore(client),
        })
    }

    /// Create an in-memory store (tests and offline development).
    pub fn new_memory() -> Self {
        Self {
            backend: Backend::Memory(Arc::new(MemoryStore::default())),
        }
    }

    // ─── Connection Operations ───────────────────────────────────

    /// Get a user's provider connection.
    pub async fn get_connection(&self, user_id: &str) -> Result<Option<Connection>, AppError> {
        match &self.backend {
            Backend::Firestore(client) => client
                .fluent()
                .select()
                .by_id_in(collections::CONNECTIONS)
                .obj()
                .one(user_id)
                .await
                .map_err(|e| AppError::Database(e.to_string())),
            Backend::Memory(store) => Ok(store
                .connections
                .read()
                .expect("connections lock poisoned")
                .get(user_id)
                .cloned()),
        }
    }

    /// Create or overwrite a connection. Refreshes mutate in place; old
    /// tokens are never kept around.
    pub async fn upsert_connection(&self, conn: &Connection) -> Result<(), AppError> {
        match &self.backend {
            Backend::Firestore(client) => {
                let _: () = client
                    .fluent()
                    .update()
                    .in_col(collections::CONNECTIONS)
                    .document_id(&conn.user_id)
                    .object(conn)
                    .execute()
                    .await
                    .map_err(|e| AppError::Database(e.to_string()))?;
                Ok(())
            }
            Backend::Memory(store) => {
                store
                    .connections
                    .write()
                    .expect("connections lock poisoned")
                    .insert(conn.user_id.clone(), conn.clone());
                Ok(())
            }
        }
    }

    /// Resolve the local connection owning an external athlete id.
    /// Returns None for athletes not connected through this engine.
    pub async fn find_connection_by_athlete(
        &self,
        athlete_id: u64,
    ) -> Result<Option<Connection>, AppError> {
        match &self.backend {
            Backend::Firestore(client) => {
                let mut results: Vec<Connection> = client
                    .fluent()
                    .select()
                    .from(collections::CONNECTIONS)
                    .filter(move |q| q.field("athlete_id").eq(athlete_id))
                    .limit(1)
                    .obj()
                    .query()
                    .await
                    .map_err(|e| AppError::Database(e.to_string()))?;
                Ok(results.pop())
            }
            Backend::Memory(store) => Ok(store
                .connections
                .read()
                .expect("connections lock poisoned")
                .values()
                .find(|c| c.athlete_id == athlete_id)
                .cloned()),
        }
    }

    /// Enumerate all connections (scheduler sweep).
    pub async fn list_connections(&self) -> Result<Vec<Connection>, AppError> {
        match &self.backend {
            Backend::Firestore(client) => client
                .fluent()
                .select()
                .from(collections::CONNECTIONS)
                .obj()
                .query()
                .await
                .map_err(|e| AppError::Database(e.to_string())),
            Backend::Memory(store) => {
                let mut conns: Vec<Connection> = store
                    .connections
                    .read()
                    .expect("connections lock poisoned")
                    .values()
                    .cloned()
                    .collect();
                conns.sort_by(|a, b| a.user_id.cmp(&b.user_id));
                Ok(conns)
            }
        }
    }

    // ─── Activity Operations ─────────────────────────────────────

    /// Check whether an activity record already exists for the dedup key.
    pub async fn activity_exists(
        &self,
        owner_id: &str,
        external_id: &str,
    ) -> Result<bool, AppError> {
        let doc_id = ActivityRecord::doc_id(owner_id, external_id);
        match &self.backend {
            Backend::Firestore(client) => {
                let existing: Option<ActivityRecord> = client
                    .fluent()
                    .select()
                    .by_id_in(collections::ACTIVITIES)
                    .obj()
                    .one(&doc_id)
                    .await
                    .map_err(|e| AppError::Database(e.to_string()))?;
                Ok(existing.is_some())
            }
            Backend::Memory(store) => Ok(store
                .activities
                .read()
                .expect("activities lock poisoned")
                .contains_key(&doc_id)),
        }
    }

    /// Insert an activity record only if the dedup key is absent.
    ///
    /// Returns `true` if the record was created, `false` if a record with
    /// the same (owner_id, external_id) already exists. The store is the
    /// final arbiter of the race between concurrent ingestion paths; the
    /// loser sees `false`, never an error.
    pub async fn insert_activity_if_absent(
        &self,
        record: &ActivityRecord,
    ) -> Result<bool, AppError> {
        let doc_id = ActivityRecord::doc_id(&record.owner_id, &record.external_id);
        match &self.backend {
            Backend::Firestore(client) => {
                let result: Result<ActivityRecord, _> = client
                    .fluent()
                    .insert()
                    .into(collections::ACTIVITIES)
                    .document_id(&doc_id)
                    .object(record)
                    .execute()
                    .await;

                match result {
                    Ok(_) => Ok(true),
                    Err(e) => {
                        let msg = e.to_string();
                        // Firestore rejects create-on-existing with AlreadyExists.
                        if msg.contains("AlreadyExists") || msg.contains("already exists") {
                            Ok(false)
                        } else {
                            Err(AppError::Database(msg))
                        }
                    }
                }
            }
            Backend::Memory(store) => {
                let mut activities = store.activities.write().expect("activities lock poisoned");
                if activities.contains_key(&doc_id) {
                    Ok(false)
                } else {
                    activities.insert(doc_id, record.clone());
                    Ok(true)
                }
            }
        }
    }

    /// Get activities for a user, newest first (downstream read surface).
    pub async fn get_activities_for_user(
        &self,
        owner_id: &str,
        limit: u32,
    ) -> Result<Vec<ActivityRecord>, AppError> {
        match &self.backend {
            Backend::Firestore(client) => {
                let owner = owner_id.to_string();
                client
                    .fluent()
                    .select()
                    .from(collections::ACTIVITIES)
                    .filter(move |q| q.field("owner_id").eq(owner.clone()))
                    .order_by([(
                        "started_at",
                        firestore::FirestoreQueryDirection::Descending,
                    )])
                    .limit(limit)
                    .obj()
                    .query()
                    .await
                    .map_err(|e| AppError::Database(e.to_string()))
            }
            Backend::Memory(store) => {
                let mut records: Vec<ActivityRecord> = store
                    .activities
                    .read()
                    .expect("activities lock poisoned")
                    .values()
                    .filter(|a| a.owner_id == owner_id)
                    .cloned()
                    .collect();
                records.sort_by(|a, b| b.started_at.cmp(&a.started_at));
                records.truncate(limit as usize);
                Ok(records)
            }
        }
    }
}
