use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo::Recipe;
use crate::{
    auth::repo::User,
    error::{AppError, AppResult},
};

/// Owner projection attached to a recipe read. `email` is only filled in for
/// single-recipe reads.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OwnerView {
    pub id: Uuid,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl OwnerView {
    pub fn name_only(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: None,
        }
    }

    pub fn with_contact(user: &User) -> Self {
        Self {
            email: Some(user.email.clone()),
            ..Self::name_only(user)
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RecipeView {
    pub id: Uuid,
    pub title: String,
    pub ingredients: Vec<String>,
    pub steps: Vec<String>,
    pub image: Option<String>,
    /// `None` if the owner row could not be resolved.
    pub owner: Option<OwnerView>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl RecipeView {
    pub fn new(recipe: Recipe, owner: Option<OwnerView>) -> Self {
        Self {
            id: recipe.id,
            title: recipe.title,
            ingredients: recipe.ingredients,
            steps: recipe.steps,
            image: recipe.image,
            owner,
            created_at: recipe.created_at,
            updated_at: recipe.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

/// Raw recipe form fields as they arrive from the client.
#[derive(Debug, Default)]
pub struct RecipeForm {
    pub title: Option<String>,
    pub ingredients: Option<String>,
    pub steps: Option<String>,
}

/// Validated input for creating a recipe. Ingredient and step text is still
/// newline separated here.
#[derive(Debug, Clone)]
pub struct RecipeDraft {
    pub title: String,
    pub ingredients: String,
    pub steps: String,
    pub image: Option<String>,
}

/// Validated input for a partial update; `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecipeChanges {
    pub title: Option<String>,
    pub ingredients: Option<String>,
    pub steps: Option<String>,
    pub image: Option<String>,
}

fn non_blank(v: Option<String>) -> Option<String> {
    v.filter(|s| !s.trim().is_empty())
}

impl RecipeForm {
    pub fn into_draft(self) -> AppResult<RecipeDraft> {
        let title = non_blank(self.title)
            .ok_or_else(|| AppError::validation("Title is required"))?
            .trim()
            .to_string();
        let ingredients =
            non_blank(self.ingredients).ok_or_else(|| AppError::validation("Ingredients are required"))?;
        let steps = non_blank(self.steps).ok_or_else(|| AppError::validation("Steps are required"))?;
        Ok(RecipeDraft {
            title,
            ingredients,
            steps,
            image: None,
        })
    }

    pub fn into_changes(self) -> RecipeChanges {
        RecipeChanges {
            title: non_blank(self.title).map(|t| t.trim().to_string()),
            ingredients: non_blank(self.ingredients),
            steps: non_blank(self.steps),
            image: None,
        }
    }
}
