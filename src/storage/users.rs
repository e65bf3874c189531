// User directory
//
// Encrypted user database: identity, role, assigned therapist and the
// per-user plan list. At most one administrator exists system-wide, and
// plan ids are unique and monotonically assigned per user.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Local;
use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::plan::Plan;
use crate::storage::Vault;

const USERS_FILE: &str = "users.json.enc";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Role {
    Administrator,
    Therapist,
    Patient,
}

/// One user record as stored in the directory
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub password: String,
    pub role: Role,
    pub name: String,
    pub national_id: String,
    /// Registration date, `%Y-%m-%d`
    pub registered_on: String,
    /// Assigned therapist app id (patients only)
    #[serde(default)]
    pub therapist: Option<String>,
    #[serde(default)]
    pub plans: Vec<Plan>,
}

/// Registration input
#[derive(Debug, Clone)]
pub struct NewUser {
    pub app_id: String,
    pub password: String,
    pub role: Role,
    pub name: String,
    pub national_id: String,
    pub therapist: Option<String>,
}

/// Errors raised by directory operations
#[derive(Debug)]
pub enum DirectoryError {
    Storage(StorageError),
    /// An administrator already exists; only one is allowed
    AdministratorExists,
    DuplicateAppId { app_id: String },
    UnknownUser { app_id: String },
    BadCredentials,
    DuplicatePlanId { id: u32 },
}

impl fmt::Display for DirectoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DirectoryError::Storage(err) => write!(f, "user directory storage: {}", err),
            DirectoryError::AdministratorExists => {
                write!(f, "an administrator already exists; cannot create another")
            }
            DirectoryError::DuplicateAppId { app_id } => {
                write!(f, "app id {} already exists", app_id)
            }
            DirectoryError::UnknownUser { app_id } => write!(f, "no such user: {}", app_id),
            DirectoryError::BadCredentials => write!(f, "wrong password"),
            DirectoryError::DuplicatePlanId { id } => {
                write!(f, "duplicate plan id {}", id)
            }
        }
    }
}

impl std::error::Error for DirectoryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DirectoryError::Storage(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StorageError> for DirectoryError {
    fn from(err: StorageError) -> Self {
        DirectoryError::Storage(err)
    }
}

/// Encrypted user database under the data directory.
pub struct UserDirectory {
    path: PathBuf,
    vault: Arc<Vault>,
}

impl UserDirectory {
    pub fn new(data_dir: impl Into<PathBuf>, vault: Arc<Vault>) -> Self {
        Self {
            path: data_dir.into().join(USERS_FILE),
            vault,
        }
    }

    fn load(&self) -> BTreeMap<String, User> {
        if !self.path.exists() {
            return BTreeMap::new();
        }
        let json = match self.vault.read_encrypted(&self.path) {
            Ok(json) => json,
            Err(err) => {
                warn!("[Users] Unreadable user database, starting empty: {}", err);
                return BTreeMap::new();
            }
        };
        match serde_json::from_slice(&json) {
            Ok(db) => db,
            Err(err) => {
                warn!("[Users] Corrupt user database, starting empty: {}", err);
                BTreeMap::new()
            }
        }
    }

    fn save(&self, db: &BTreeMap<String, User>) -> Result<(), StorageError> {
        let json = serde_json::to_vec_pretty(db)?;
        self.vault.write_encrypted(&self.path, &json)
    }

    /// Register a new user, enforcing app-id uniqueness and the
    /// single-administrator rule.
    pub fn add_user(&self, new: NewUser) -> Result<(), DirectoryError> {
        let mut db = self.load();

        if new.role == Role::Administrator
            && db.values().any(|u| u.role == Role::Administrator)
        {
            return Err(DirectoryError::AdministratorExists);
        }
        if db.contains_key(&new.app_id) {
            return Err(DirectoryError::DuplicateAppId { app_id: new.app_id });
        }

        db.insert(
            new.app_id,
            User {
                password: new.password,
                role: new.role,
                name: new.name,
                national_id: new.national_id,
                registered_on: Local::now().format("%Y-%m-%d").to_string(),
                therapist: new.therapist,
                plans: Vec::new(),
            },
        );
        self.save(&db)?;
        Ok(())
    }

    /// Check credentials and return the user record.
    pub fn verify_login(&self, app_id: &str, password: &str) -> Result<User, DirectoryError> {
        let db = self.load();
        let user = db.get(app_id).ok_or_else(|| DirectoryError::UnknownUser {
            app_id: app_id.to_string(),
        })?;
        if user.password != password {
            return Err(DirectoryError::BadCredentials);
        }
        Ok(user.clone())
    }

    pub fn get(&self, app_id: &str) -> Option<User> {
        self.load().get(app_id).cloned()
    }

    pub fn all(&self) -> BTreeMap<String, User> {
        self.load()
    }

    /// Add a plan to a user, assigning the next monotonic plan id.
    pub fn add_plan(&self, app_id: &str, mut plan: Plan) -> Result<u32, DirectoryError> {
        let mut db = self.load();
        let user = db.get_mut(app_id).ok_or_else(|| DirectoryError::UnknownUser {
            app_id: app_id.to_string(),
        })?;

        let next_id = user.plans.iter().map(|p| p.id).max().map_or(1, |id| id + 1);
        plan.id = next_id;
        user.plans.push(plan);
        self.save(&db)?;
        Ok(next_id)
    }

    /// Replace a user's plan list wholesale, rejecting duplicate ids.
    pub fn upsert_plans(&self, app_id: &str, plans: Vec<Plan>) -> Result<(), DirectoryError> {
        let mut seen = std::collections::BTreeSet::new();
        for plan in &plans {
            if !seen.insert(plan.id) {
                return Err(DirectoryError::DuplicatePlanId { id: plan.id });
            }
        }

        let mut db = self.load();
        let user = db.get_mut(app_id).ok_or_else(|| DirectoryError::UnknownUser {
            app_id: app_id.to_string(),
        })?;
        user.plans = plans;
        self.save(&db)?;
        Ok(())
    }

    pub fn list_therapists(&self) -> Vec<String> {
        self.list_by_role(Role::Therapist)
    }

    pub fn list_patients(&self) -> Vec<String> {
        self.list_by_role(Role::Patient)
    }

    fn list_by_role(&self, role: Role) -> Vec<String> {
        self.load()
            .iter()
            .filter(|(_, u)| u.role == role)
            .map(|(id, _)| id.clone())
            .collect()
    }
}
