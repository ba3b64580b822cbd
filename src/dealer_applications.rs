//! Dealer onboarding applications: validation, storage and review.

use crate::crypto::CredentialCipher;
use crate::errors::{AppError, ResultExt};
use crate::models::{ApplicationStatus, DbConnection, DealerApplication, DealerOnboardingRequest};
use crate::validation::{is_valid_email, is_valid_phone, non_blank};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::sync::{Arc, Mutex, PoisonError};
use uuid::Uuid;

pub const DEFAULT_REJECTION_REASON: &str = "Application did not meet requirements";

pub const SUBMITTED_MESSAGE: &str = "Your application has been submitted successfully. We'll review it and get back to you within 2-3 business days.";

#[async_trait]
pub trait DealerApplicationStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<DealerApplication>, AppError>;

    /// Insert a new application. Fails with `Conflict` on a duplicate email.
    async fn insert(&self, application: &DealerApplication) -> Result<(), AppError>;

    /// Applications, newest first, optionally filtered by status.
    async fn list(
        &self,
        status: Option<ApplicationStatus>,
    ) -> Result<Vec<DealerApplication>, AppError>;

    async fn get(&self, id: Uuid) -> Result<Option<DealerApplication>, AppError>;

    /// Returns `false` when no application has this id.
    async fn update_status(
        &self,
        id: Uuid,
        status: ApplicationStatus,
        rejection_reason: Option<String>,
    ) -> Result<bool, AppError>;
}

// ============ Postgres ============

pub struct PgDealerApplicationStore {
    pool: PgPool,
}

impl PgDealerApplicationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

type ApplicationRow = (
    Uuid,
    String,
    String,
    String,
    String,
    serde_json::Value,
    Option<String>,
    Option<String>,
    serde_json::Value,
    String,
    Option<String>,
    DateTime<Utc>,
    Option<DateTime<Utc>>,
);

const SELECT_COLUMNS: &str = "SELECT id, dealership_name, contact_name, email, phone, locations, \
     staff_capacity, inventory_range, db_connection, status, rejection_reason, created_at, updated_at \
     FROM dealer_applications";

fn application_from_row(row: ApplicationRow) -> Result<DealerApplication, AppError> {
    let (
        id,
        dealership_name,
        contact_name,
        email,
        phone,
        locations,
        staff_capacity,
        inventory_range,
        db_connection,
        status,
        rejection_reason,
        created_at,
        updated_at,
    ) = row;

    let corrupt = |what: &str, e: String| {
        AppError::InternalError(format!("Corrupt {} on dealer application {}: {}", what, id, e))
    };

    Ok(DealerApplication {
        id,
        dealership_name,
        contact_name,
        email,
        phone,
        locations: serde_json::from_value(locations).map_err(|e| corrupt("locations", e.to_string()))?,
        staff_capacity,
        inventory_range,
        db_connection: serde_json::from_value(db_connection)
            .map_err(|e| corrupt("db_connection", e.to_string()))?,
        status: status.parse().map_err(|e| corrupt("status", e))?,
        rejection_reason,
        created_at,
        updated_at,
    })
}

#[async_trait]
impl DealerApplicationStore for PgDealerApplicationStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<DealerApplication>, AppError> {
        let row = sqlx::query_as::<_, ApplicationRow>(&format!(
            "{} WHERE email = $1 LIMIT 1",
            SELECT_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.map(application_from_row).transpose()
    }

    async fn insert(&self, application: &DealerApplication) -> Result<(), AppError> {
        let locations = serde_json::to_value(&application.locations)
            .map_err(|e| AppError::InternalError(format!("Failed to encode locations: {}", e)))?;
        let db_connection = serde_json::to_value(&application.db_connection)
            .map_err(|e| AppError::InternalError(format!("Failed to encode db_connection: {}", e)))?;

        let result = sqlx::query(
            r#"
            INSERT INTO dealer_applications
                (id, dealership_name, contact_name, email, phone, locations, staff_capacity,
                 inventory_range, db_connection, status, rejection_reason, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(application.id)
        .bind(&application.dealership_name)
        .bind(&application.contact_name)
        .bind(&application.email)
        .bind(&application.phone)
        .bind(locations)
        .bind(&application.staff_capacity)
        .bind(&application.inventory_range)
        .bind(db_connection)
        .bind(application.status.as_str())
        .bind(&application.rejection_reason)
        .bind(application.created_at)
        .bind(application.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => Err(
                AppError::Conflict("An application with this email already exists".to_string()),
            ),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(
        &self,
        status: Option<ApplicationStatus>,
    ) -> Result<Vec<DealerApplication>, AppError> {
        let rows = match status {
            Some(status) => {
                sqlx::query_as::<_, ApplicationRow>(&format!(
                    "{} WHERE status = $1 ORDER BY created_at DESC",
                    SELECT_COLUMNS
                ))
                .bind(status.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, ApplicationRow>(&format!(
                    "{} ORDER BY created_at DESC",
                    SELECT_COLUMNS
                ))
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.into_iter().map(application_from_row).collect()
    }

    async fn get(&self, id: Uuid) -> Result<Option<DealerApplication>, AppError> {
        let row = sqlx::query_as::<_, ApplicationRow>(&format!("{} WHERE id = $1", SELECT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(application_from_row).transpose()
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: ApplicationStatus,
        rejection_reason: Option<String>,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE dealer_applications
            SET status = $2, rejection_reason = $3, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(rejection_reason)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

// ============ In-memory ============

#[derive(Default)]
pub struct InMemoryDealerApplicationStore {
    applications: Mutex<Vec<DealerApplication>>,
}

impl InMemoryDealerApplicationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DealerApplicationStore for InMemoryDealerApplicationStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<DealerApplication>, AppError> {
        Ok(self
            .applications
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|a| a.email == email)
            .cloned())
    }

    async fn insert(&self, application: &DealerApplication) -> Result<(), AppError> {
        let mut applications = self.applications.lock().unwrap_or_else(PoisonError::into_inner);
        if applications.iter().any(|a| a.email == application.email) {
            return Err(AppError::Conflict(
                "An application with this email already exists".to_string(),
            ));
        }
        applications.push(application.clone());
        Ok(())
    }

    async fn list(
        &self,
        status: Option<ApplicationStatus>,
    ) -> Result<Vec<DealerApplication>, AppError> {
        let mut found: Vec<_> = self
            .applications
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|a| status.map_or(true, |s| a.status == s))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn get(&self, id: Uuid) -> Result<Option<DealerApplication>, AppError> {
        Ok(self
            .applications
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|a| a.id == id)
            .cloned())
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: ApplicationStatus,
        rejection_reason: Option<String>,
    ) -> Result<bool, AppError> {
        let mut applications = self.applications.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(application) = applications.iter_mut().find(|a| a.id == id) else {
            return Ok(false);
        };
        application.status = status;
        application.rejection_reason = rejection_reason;
        application.updated_at = Some(Utc::now());
        Ok(true)
    }
}

// ============ Service ============

/// Onboarding workflow on top of a store and the credential cipher.
#[derive(Clone)]
pub struct DealerApplicationService {
    store: Arc<dyn DealerApplicationStore>,
    cipher: Arc<dyn CredentialCipher>,
}

impl DealerApplicationService {
    pub fn new(store: Arc<dyn DealerApplicationStore>, cipher: Arc<dyn CredentialCipher>) -> Self {
        Self { store, cipher }
    }

    /// Validate, seal the database password and store a pending application.
    ///
    /// # Errors
    ///
    /// * `BadRequest` for missing fields or a malformed email or phone.
    /// * `Conflict` when an application already uses this email.
    pub async fn submit(&self, request: DealerOnboardingRequest) -> Result<Uuid, AppError> {
        let (
            Some(dealership_name),
            Some(contact_name),
            Some(email),
            Some(phone),
            Some(db_host),
            Some(db_port),
            Some(db_name),
            Some(db_user),
            Some(db_password),
        ) = (
            non_blank(request.dealership_name),
            non_blank(request.contact_name),
            non_blank(request.email),
            non_blank(request.phone),
            non_blank(request.db_host),
            non_blank(request.db_port),
            non_blank(request.db_name),
            non_blank(request.db_user),
            // Passwords may legitimately carry surrounding spaces.
            request.db_password.filter(|p| !p.is_empty()),
        )
        else {
            return Err(AppError::BadRequest("Missing required fields".to_string()));
        };

        if !is_valid_email(&email) {
            return Err(AppError::BadRequest("Invalid email format".to_string()));
        }
        if !is_valid_phone(&phone) {
            return Err(AppError::BadRequest("Invalid phone format".to_string()));
        }

        let email = email.to_lowercase();
        if self.store.find_by_email(&email).await?.is_some() {
            return Err(AppError::Conflict(
                "An application with this email already exists".to_string(),
            ));
        }

        let application = DealerApplication {
            id: Uuid::new_v4(),
            dealership_name,
            contact_name,
            email,
            phone,
            locations: request
                .locations
                .unwrap_or_default()
                .into_iter()
                .filter_map(|l| non_blank(Some(l)))
                .collect(),
            staff_capacity: non_blank(request.staff_capacity),
            inventory_range: non_blank(request.inventory_range),
            db_connection: DbConnection {
                host: db_host,
                port: db_port,
                db_name,
                username: db_user,
                password: self.cipher.seal(&db_password)?,
            },
            status: ApplicationStatus::Pending,
            rejection_reason: None,
            created_at: Utc::now(),
            updated_at: None,
        };

        self.store.insert(&application).await?;
        tracing::info!(
            "Dealer application {} submitted by {}",
            application.id,
            application.dealership_name
        );
        Ok(application.id)
    }

    /// Applications with their sealed passwords redacted.
    pub async fn list(
        &self,
        status: Option<ApplicationStatus>,
    ) -> Result<Vec<DealerApplication>, AppError> {
        let applications = self.store.list(status).await?;
        Ok(applications.iter().map(DealerApplication::redacted).collect())
    }

    pub async fn approve(&self, id: Uuid) -> Result<(), AppError> {
        if !self
            .store
            .update_status(id, ApplicationStatus::Approved, None)
            .await
            .with_context(|| format!("Approving dealer application {}", id))?
        {
            return Err(AppError::NotFound("Application not found".to_string()));
        }
        tracing::info!("Dealer application {} approved", id);
        Ok(())
    }

    pub async fn reject(&self, id: Uuid, reason: Option<String>) -> Result<(), AppError> {
        let reason = non_blank(reason).unwrap_or_else(|| DEFAULT_REJECTION_REASON.to_string());
        if !self
            .store
            .update_status(id, ApplicationStatus::Rejected, Some(reason.clone()))
            .await
            .with_context(|| format!("Rejecting dealer application {}", id))?
        {
            return Err(AppError::NotFound("Application not found".to_string()));
        }
        tracing::info!("Dealer application {} rejected: {}", id, reason);
        Ok(())
    }

    pub async fn get(&self, id: Uuid) -> Result<DealerApplication, AppError> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Application not found".to_string()))
    }
}
