/**
 * Media Model
 *
 * Rows describing uploaded files. Byte storage and image encoding live
 * behind external seams; the rows track the storage path, processing
 * state, and the derived thumbnail once the background pipeline has run.
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::error::AppError;
use crate::resource::adapter::{BindValue, ColumnDef, ColumnType, ResourceAdapter};

/// Persisted media row
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Media {
    pub id: i64,
    pub filename: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub storage_path: String,
    pub thumbnail_path: Option<String>,
    pub processed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Accepted shape for registering a media file
#[derive(Debug, Clone, Deserialize)]
pub struct MediaCreate {
    pub filename: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub storage_path: String,
}

/// Accepted shape for partially updating a media row
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MediaUpdate {
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub processed: Option<bool>,
    #[serde(default)]
    pub thumbnail_path: Option<String>,
}

/// Publicly visible media shape (identical to the row for this kind)
pub type MediaRead = Media;

const MEDIA_COLUMNS: &[ColumnDef] = &[
    ColumnDef::new("id", ColumnType::BigInt),
    ColumnDef::new("filename", ColumnType::Text),
    ColumnDef::new("content_type", ColumnType::Text),
    ColumnDef::new("size_bytes", ColumnType::BigInt),
    ColumnDef::new("storage_path", ColumnType::Text),
    ColumnDef::new("thumbnail_path", ColumnType::Text),
    ColumnDef::new("processed", ColumnType::Boolean),
    ColumnDef::new("created_at", ColumnType::Timestamp),
    ColumnDef::new("updated_at", ColumnType::Timestamp),
];

/// Binds the `media` kind to the generic engine
pub struct MediaAdapter {
    max_file_size: u64,
}

impl MediaAdapter {
    pub fn new(max_file_size: u64) -> Self {
        Self { max_file_size }
    }
}

impl ResourceAdapter for MediaAdapter {
    type Stored = Media;
    type Input = MediaCreate;
    type Update = MediaUpdate;
    type Output = MediaRead;

    fn kind(&self) -> &'static str {
        "media"
    }

    fn event_prefix(&self) -> &'static str {
        "media"
    }

    fn columns(&self) -> &'static [ColumnDef] {
        MEDIA_COLUMNS
    }

    fn validate_input(&self, input: &Self::Input) -> Result<(), AppError> {
        if input.filename.trim().is_empty() {
            return Err(AppError::validation("filename", "must not be empty"));
        }
        if input.size_bytes < 0 {
            return Err(AppError::validation("size_bytes", "must be >= 0"));
        }
        if input.size_bytes as u64 > self.max_file_size {
            return Err(AppError::validation(
                "size_bytes",
                format!("exceeds the {} byte limit", self.max_file_size),
            ));
        }
        Ok(())
    }

    fn insert_values(&self, input: &Self::Input) -> Vec<(&'static str, BindValue)> {
        vec![
            ("filename", BindValue::Text(input.filename.clone())),
            ("content_type", BindValue::Text(input.content_type.clone())),
            ("size_bytes", BindValue::BigInt(input.size_bytes)),
            ("storage_path", BindValue::Text(input.storage_path.clone())),
        ]
    }

    fn update_values(&self, update: &Self::Update) -> Vec<(&'static str, BindValue)> {
        let mut values = Vec::new();
        if let Some(filename) = &update.filename {
            values.push(("filename", BindValue::Text(filename.clone())));
        }
        if let Some(processed) = update.processed {
            values.push(("processed", BindValue::Boolean(processed)));
        }
        if let Some(thumbnail_path) = &update.thumbnail_path {
            values.push(("thumbnail_path", BindValue::Text(thumbnail_path.clone())));
        }
        values
    }

    fn project(&self, stored: Self::Stored) -> Self::Output {
        stored
    }
}

/// Fetch one media row by id (domain helper for the processing jobs)
pub async fn get_media(pool: &PgPool, id: i64) -> Result<Option<Media>, sqlx::Error> {
    sqlx::query_as::<_, Media>("SELECT * FROM media WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Record a generated thumbnail path without touching processing state
pub async fn set_thumbnail(
    pool: &PgPool,
    id: i64,
    thumbnail_path: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE media SET thumbnail_path = $2, updated_at = NOW() WHERE id = $1")
        .bind(id)
        .bind(thumbnail_path)
        .execute(pool)
        .await?;
    Ok(())
}

/// Mark a media row processed, recording the generated thumbnail path.
/// Returns the updated row, or `None` when the id is unknown.
pub async fn mark_processed(
    pool: &PgPool,
    id: i64,
    thumbnail_path: Option<String>,
) -> Result<Option<Media>, sqlx::Error> {
    sqlx::query_as::<_, Media>(
        r#"
        UPDATE media
        SET processed = TRUE, thumbnail_path = COALESCE($2, thumbnail_path), updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(thumbnail_path)
    .fetch_optional(pool)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oversized_upload_is_rejected() {
        let adapter = MediaAdapter::new(1024);
        let input = MediaCreate {
            filename: "photo.jpg".to_string(),
            content_type: "image/jpeg".to_string(),
            size_bytes: 4096,
            storage_path: "/media/photo.jpg".to_string(),
        };
        assert!(adapter.validate_input(&input).is_err());
    }

    #[test]
    fn test_within_limit_is_accepted() {
        let adapter = MediaAdapter::new(10 * 1024 * 1024);
        let input = MediaCreate {
            filename: "photo.jpg".to_string(),
            content_type: "image/jpeg".to_string(),
            size_bytes: 4096,
            storage_path: "/media/photo.jpg".to_string(),
        };
        assert!(adapter.validate_input(&input).is_ok());
    }
}
