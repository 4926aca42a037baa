/**
 * User Model
 *
 * Users support OAuth-provider identities (`provider` +
 * `provider_user_id`) with a unique email. Authentication policy itself
 * is out of scope; these rows are the canonical example of a kind
 * managed by the generic resource engine.
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::resource::adapter::{BindValue, ColumnDef, ColumnType, ResourceAdapter};

/// Persisted user row
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    /// Identity provider ("local", "google", "github", ...)
    pub provider: String,
    pub provider_user_id: Option<String>,
    pub email: String,
    pub name: Option<String>,
    /// Avatar URL
    pub picture: Option<String>,
    pub is_active: bool,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Accepted shape for creating a user
#[derive(Debug, Clone, Deserialize)]
pub struct UserCreate {
    pub provider: String,
    pub provider_user_id: String,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
}

/// Accepted shape for partially updating a user
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

/// Publicly visible user shape; what gets returned and broadcast
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRead {
    pub id: i64,
    pub provider: String,
    pub email: String,
    pub name: Option<String>,
    pub picture: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

const USER_COLUMNS: &[ColumnDef] = &[
    ColumnDef::new("id", ColumnType::BigInt),
    ColumnDef::new("provider", ColumnType::Text),
    ColumnDef::new("provider_user_id", ColumnType::Text),
    ColumnDef::new("email", ColumnType::Text),
    ColumnDef::new("name", ColumnType::Text),
    ColumnDef::new("picture", ColumnType::Text),
    ColumnDef::new("is_active", ColumnType::Boolean),
    ColumnDef::new("is_verified", ColumnType::Boolean),
    ColumnDef::new("created_at", ColumnType::Timestamp),
    ColumnDef::new("updated_at", ColumnType::Timestamp),
];

/// Binds the `users` kind to the generic engine
pub struct UserAdapter;

impl ResourceAdapter for UserAdapter {
    type Stored = User;
    type Input = UserCreate;
    type Update = UserUpdate;
    type Output = UserRead;

    fn kind(&self) -> &'static str {
        "users"
    }

    fn event_prefix(&self) -> &'static str {
        "user"
    }

    fn columns(&self) -> &'static [ColumnDef] {
        USER_COLUMNS
    }

    fn validate_input(&self, input: &Self::Input) -> Result<(), AppError> {
        if input.email.trim().is_empty() || !input.email.contains('@') {
            return Err(AppError::validation("email", "must be a valid address"));
        }
        if input.provider.trim().is_empty() {
            return Err(AppError::validation("provider", "must not be empty"));
        }
        Ok(())
    }

    fn insert_values(&self, input: &Self::Input) -> Vec<(&'static str, BindValue)> {
        vec![
            ("provider", BindValue::Text(input.provider.clone())),
            (
                "provider_user_id",
                BindValue::Text(input.provider_user_id.clone()),
            ),
            ("email", BindValue::Text(input.email.clone())),
            ("name", input.name.clone().into()),
            ("picture", input.picture.clone().into()),
        ]
    }

    fn update_values(&self, update: &Self::Update) -> Vec<(&'static str, BindValue)> {
        let mut values = Vec::new();
        if let Some(name) = &update.name {
            values.push(("name", BindValue::Text(name.clone())));
        }
        if let Some(picture) = &update.picture {
            values.push(("picture", BindValue::Text(picture.clone())));
        }
        if let Some(is_active) = update.is_active {
            values.push(("is_active", BindValue::Boolean(is_active)));
        }
        values
    }

    fn project(&self, stored: Self::Stored) -> Self::Output {
        UserRead {
            id: stored.id,
            provider: stored.provider,
            email: stored.email,
            name: stored.name,
            picture: stored.picture,
            is_active: stored.is_active,
            created_at: stored.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> UserCreate {
        UserCreate {
            provider: "google".to_string(),
            provider_user_id: "x1".to_string(),
            email: "a@b".to_string(),
            name: None,
            picture: None,
        }
    }

    #[test]
    fn test_input_validation_rejects_bad_email() {
        let adapter = UserAdapter;
        let mut bad = input();
        bad.email = "not-an-email".to_string();
        assert!(adapter.validate_input(&bad).is_err());
        assert!(adapter.validate_input(&input()).is_ok());
    }

    #[test]
    fn test_update_values_only_include_supplied_fields() {
        let adapter = UserAdapter;
        let update = UserUpdate {
            name: Some("Ada".to_string()),
            ..Default::default()
        };
        let values = adapter.update_values(&update);
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].0, "name");
    }

    #[test]
    fn test_projection_hides_internal_fields() {
        let json = serde_json::to_value(UserRead {
            id: 1,
            provider: "google".to_string(),
            email: "a@b".to_string(),
            name: None,
            picture: None,
            is_active: true,
            created_at: Utc::now(),
        })
        .unwrap();
        assert!(json.get("is_verified").is_none());
        assert!(json.get("updated_at").is_none());
    }
}
