use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{db::PgStore, error::StoreError};

/// Recipe record. `owner` references a user and never changes after insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Recipe {
    pub id: Uuid,
    #[sqlx(rename = "owner_id")]
    pub owner: Uuid,
    pub title: String,
    pub ingredients: Vec<String>,
    pub steps: Vec<String>,
    pub image: Option<String>, // relative media path, e.g. /uploads/171234-abc.jpg
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewRecipe {
    pub owner: Uuid,
    pub title: String,
    pub ingredients: Vec<String>,
    pub steps: Vec<String>,
    pub image: Option<String>,
}

/// Partial update; `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecipePatch {
    pub title: Option<String>,
    pub ingredients: Option<Vec<String>>,
    pub steps: Option<Vec<String>>,
    pub image: Option<String>,
}

/// Resource store contract. `update_owned` and `delete_owned` match on
/// `(id, owner)` and mutate in the same atomic operation.
#[async_trait]
pub trait RecipeRepo: Send + Sync {
    async fn insert(&self, new: NewRecipe) -> Result<Recipe, StoreError>;
    /// Newest first.
    async fn list_all(&self) -> Result<Vec<Recipe>, StoreError>;
    async fn list_by_owner(&self, owner: Uuid) -> Result<Vec<Recipe>, StoreError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Recipe>, StoreError>;
    async fn update_owned(
        &self,
        id: Uuid,
        owner: Uuid,
        patch: RecipePatch,
    ) -> Result<Option<Recipe>, StoreError>;
    async fn delete_owned(&self, id: Uuid, owner: Uuid) -> Result<Option<Recipe>, StoreError>;
}

const RECIPE_COLUMNS: &str =
    "id, owner_id, title, ingredients, steps, image, created_at, updated_at";

#[async_trait]
impl RecipeRepo for PgStore {
    async fn insert(&self, new: NewRecipe) -> Result<Recipe, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO recipes (owner_id, title, ingredients, steps, image)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {RECIPE_COLUMNS}
            "#
        );
        let recipe = sqlx::query_as::<_, Recipe>(&sql)
            .bind(new.owner)
            .bind(&new.title)
            .bind(&new.ingredients)
            .bind(&new.steps)
            .bind(&new.image)
            .fetch_one(&self.pool)
            .await?;
        Ok(recipe)
    }

    async fn list_all(&self) -> Result<Vec<Recipe>, StoreError> {
        let sql = format!("SELECT {RECIPE_COLUMNS} FROM recipes ORDER BY created_at DESC");
        let rows = sqlx::query_as::<_, Recipe>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn list_by_owner(&self, owner: Uuid) -> Result<Vec<Recipe>, StoreError> {
        let sql = format!(
            "SELECT {RECIPE_COLUMNS} FROM recipes WHERE owner_id = $1 ORDER BY created_at DESC"
        );
        let rows = sqlx::query_as::<_, Recipe>(&sql)
            .bind(owner)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Recipe>, StoreError> {
        let sql = format!("SELECT {RECIPE_COLUMNS} FROM recipes WHERE id = $1");
        let row = sqlx::query_as::<_, Recipe>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn update_owned(
        &self,
        id: Uuid,
        owner: Uuid,
        patch: RecipePatch,
    ) -> Result<Option<Recipe>, StoreError> {
        let sql = format!(
            r#"
            UPDATE recipes
               SET title       = COALESCE($3, title),
                   ingredients = COALESCE($4, ingredients),
                   steps       = COALESCE($5, steps),
                   image       = COALESCE($6, image),
                   updated_at  = now()
             WHERE id = $1 AND owner_id = $2
            RETURNING {RECIPE_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, Recipe>(&sql)
            .bind(id)
            .bind(owner)
            .bind(patch.title)
            .bind(patch.ingredients)
            .bind(patch.steps)
            .bind(patch.image)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn delete_owned(&self, id: Uuid, owner: Uuid) -> Result<Option<Recipe>, StoreError> {
        let sql = format!(
            "DELETE FROM recipes WHERE id = $1 AND owner_id = $2 RETURNING {RECIPE_COLUMNS}"
        );
        let row = sqlx::query_as::<_, Recipe>(&sql)
            .bind(id)
            .bind(owner)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }
}
