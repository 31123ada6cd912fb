use std::{collections::HashMap, sync::Arc};

use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::{
    dto::{OwnerView, RecipeChanges, RecipeDraft, RecipeView},
    repo::{NewRecipe, Recipe, RecipePatch, RecipeRepo},
};
use crate::{
    auth::repo::{User, UserRepo},
    error::{AppError, AppResult},
};

/// Splits free text into one entry per line, trimming each and dropping
/// blank lines.
pub fn split_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Recipe CRUD. Writes are scoped to the owner; reads are open to any
/// authenticated caller.
#[derive(Clone)]
pub struct RecipeService {
    recipes: Arc<dyn RecipeRepo>,
    users: Arc<dyn UserRepo>,
}

impl RecipeService {
    pub fn new(recipes: Arc<dyn RecipeRepo>, users: Arc<dyn UserRepo>) -> Self {
        Self { recipes, users }
    }

    #[instrument(skip(self, draft))]
    pub async fn create(&self, draft: RecipeDraft, requester: Uuid) -> AppResult<Recipe> {
        let recipe = self
            .recipes
            .insert(NewRecipe {
                owner: requester,
                title: draft.title,
                ingredients: split_lines(&draft.ingredients),
                steps: split_lines(&draft.steps),
                image: draft.image,
            })
            .await?;
        info!(recipe_id = %recipe.id, "recipe created");
        Ok(recipe)
    }

    #[instrument(skip(self))]
    pub async fn list_all(&self) -> AppResult<Vec<RecipeView>> {
        let recipes = self.recipes.list_all().await?;
        let owners = self.resolve_owners(&recipes).await?;
        Ok(recipes
            .into_iter()
            .map(|r| {
                let owner = owners.get(&r.owner).map(OwnerView::name_only);
                RecipeView::new(r, owner)
            })
            .collect())
    }

    /// The caller's own recipes; the owner is already known so no lookup.
    #[instrument(skip_all, fields(user_id = %owner.id))]
    pub async fn list_by_owner(&self, owner: &User) -> AppResult<Vec<RecipeView>> {
        let recipes = self.recipes.list_by_owner(owner.id).await?;
        let projection = OwnerView::name_only(owner);
        Ok(recipes
            .into_iter()
            .map(|r| RecipeView::new(r, Some(projection.clone())))
            .collect())
    }

    #[instrument(skip(self))]
    pub async fn get_by_id(&self, id: Uuid) -> AppResult<RecipeView> {
        let recipe = self.recipes.find_by_id(id).await?.ok_or(AppError::NotFound)?;
        let owner = self
            .users
            .find_by_id(recipe.owner)
            .await?
            .as_ref()
            .map(OwnerView::with_contact);
        Ok(RecipeView::new(recipe, owner))
    }

    /// A missing recipe and someone else's recipe both come back as
    /// `NotFoundOrForbidden`.
    #[instrument(skip(self, changes))]
    pub async fn update(
        &self,
        id: Uuid,
        changes: RecipeChanges,
        requester: Uuid,
    ) -> AppResult<Recipe> {
        let patch = RecipePatch {
            title: changes.title,
            ingredients: changes.ingredients.as_deref().map(split_lines),
            steps: changes.steps.as_deref().map(split_lines),
            image: changes.image,
        };
        match self.recipes.update_owned(id, requester, patch).await? {
            Some(recipe) => {
                info!(recipe_id = %id, "recipe updated");
                Ok(recipe)
            }
            None => {
                warn!(recipe_id = %id, "update matched no owned recipe");
                Err(AppError::NotFoundOrForbidden)
            }
        }
    }

    /// Returns the removed record so the caller can clean up its media.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid, requester: Uuid) -> AppResult<Recipe> {
        match self.recipes.delete_owned(id, requester).await? {
            Some(recipe) => {
                info!(recipe_id = %id, "recipe deleted");
                Ok(recipe)
            }
            None => {
                warn!(recipe_id = %id, "delete matched no owned recipe");
                Err(AppError::NotFoundOrForbidden)
            }
        }
    }

    // Explicit reference resolution: one batched user lookup per listing.
    async fn resolve_owners(&self, recipes: &[Recipe]) -> AppResult<HashMap<Uuid, User>> {
        let mut ids: Vec<Uuid> = recipes.iter().map(|r| r.owner).collect();
        ids.sort_unstable();
        ids.dedup();
        let users = self.users.find_by_ids(&ids).await?;
        Ok(users.into_iter().map(|u| (u.id, u)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{auth::repo::NewUser, memory::MemoryStore};

    async fn setup() -> (RecipeService, User, User) {
        let store = Arc::new(MemoryStore::new());
        let mk = |name: &str, email: &str| NewUser {
            name: name.into(),
            email: email.into(),
            password_hash: "hash".into(),
            about: None,
        };
        let alice = store.create(mk("Alice", "alice@example.com")).await.unwrap();
        let bob = store.create(mk("Bob", "bob@example.com")).await.unwrap();
        (RecipeService::new(store.clone(), store), alice, bob)
    }

    fn soup() -> RecipeDraft {
        RecipeDraft {
            title: "Soup".into(),
            ingredients: "water\nsalt".into(),
            steps: "boil\nserve".into(),
            image: Some("/uploads/1-soup.jpg".into()),
        }
    }

    #[test]
    fn split_lines_handles_crlf_and_blanks() {
        assert_eq!(split_lines("water\nsalt"), ["water", "salt"]);
        assert_eq!(split_lines("a\r\n  b  \r\n\r\nc\n"), ["a", "b", "c"]);
        assert!(split_lines("\n\n").is_empty());
    }

    #[tokio::test]
    async fn created_recipe_is_listed_with_owner_name_only() {
        let (svc, alice, _) = setup().await;
        let recipe = svc.create(soup(), alice.id).await.unwrap();
        assert_eq!(recipe.owner, alice.id);
        assert_eq!(recipe.ingredients, ["water", "salt"]);
        assert_eq!(recipe.steps, ["boil", "serve"]);

        let all = svc.list_all().await.unwrap();
        let listed = all.iter().find(|r| r.id == recipe.id).expect("listed");
        let owner = listed.owner.as_ref().unwrap();
        assert_eq!(owner.name, "Alice");
        assert_eq!(owner.email, None);
    }

    #[tokio::test]
    async fn get_by_id_includes_owner_contact() {
        let (svc, alice, _) = setup().await;
        let recipe = svc.create(soup(), alice.id).await.unwrap();

        let view = svc.get_by_id(recipe.id).await.unwrap();
        let owner = view.owner.unwrap();
        assert_eq!(owner.name, "Alice");
        assert_eq!(owner.email.as_deref(), Some("alice@example.com"));

        let err = svc.get_by_id(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound));
    }

    #[tokio::test]
    async fn title_only_update_leaves_other_fields() {
        let (svc, alice, _) = setup().await;
        let recipe = svc.create(soup(), alice.id).await.unwrap();

        let updated = svc
            .update(
                recipe.id,
                RecipeChanges {
                    title: Some("Better Soup".into()),
                    ..Default::default()
                },
                alice.id,
            )
            .await
            .unwrap();
        assert_eq!(updated.title, "Better Soup");
        assert_eq!(updated.ingredients, recipe.ingredients);
        assert_eq!(updated.steps, recipe.steps);
        assert_eq!(updated.image, recipe.image);
    }

    #[tokio::test]
    async fn update_resplits_supplied_text() {
        let (svc, alice, _) = setup().await;
        let recipe = svc.create(soup(), alice.id).await.unwrap();
        let updated = svc
            .update(
                recipe.id,
                RecipeChanges {
                    steps: Some("chop\nboil\nserve".into()),
                    image: Some("/uploads/2-new.png".into()),
                    ..Default::default()
                },
                alice.id,
            )
            .await
            .unwrap();
        assert_eq!(updated.steps, ["chop", "boil", "serve"]);
        assert_eq!(updated.image.as_deref(), Some("/uploads/2-new.png"));
        assert_eq!(updated.title, "Soup");
    }

    #[tokio::test]
    async fn foreign_and_missing_recipes_collapse_to_the_same_error() {
        let (svc, alice, bob) = setup().await;
        let recipe = svc.create(soup(), alice.id).await.unwrap();
        let changes = RecipeChanges {
            title: Some("Hijacked".into()),
            ..Default::default()
        };

        let foreign = svc.update(recipe.id, changes.clone(), bob.id).await.unwrap_err();
        let missing = svc.update(Uuid::new_v4(), changes, bob.id).await.unwrap_err();
        assert!(matches!(foreign, AppError::NotFoundOrForbidden));
        assert!(matches!(missing, AppError::NotFoundOrForbidden));
        assert_eq!(foreign.to_string(), missing.to_string());

        let foreign = svc.delete(recipe.id, bob.id).await.unwrap_err();
        let missing = svc.delete(Uuid::new_v4(), bob.id).await.unwrap_err();
        assert!(matches!(foreign, AppError::NotFoundOrForbidden));
        assert!(matches!(missing, AppError::NotFoundOrForbidden));

        let still_there = svc.get_by_id(recipe.id).await.unwrap();
        assert_eq!(still_there.title, "Soup");
        assert!(svc.list_all().await.unwrap().iter().any(|r| r.id == recipe.id));
    }

    #[tokio::test]
    async fn owner_can_delete() {
        let (svc, alice, _) = setup().await;
        let recipe = svc.create(soup(), alice.id).await.unwrap();
        let removed = svc.delete(recipe.id, alice.id).await.unwrap();
        assert_eq!(removed.id, recipe.id);
        assert!(svc.list_all().await.unwrap().is_empty());
        assert!(matches!(
            svc.delete(recipe.id, alice.id).await.unwrap_err(),
            AppError::NotFoundOrForbidden
        ));
    }

    #[tokio::test]
    async fn list_by_owner_only_returns_own_recipes() {
        let (svc, alice, bob) = setup().await;
        svc.create(soup(), alice.id).await.unwrap();
        svc.create(soup(), bob.id).await.unwrap();

        let mine = svc.list_by_owner(&bob).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].owner.as_ref().unwrap().name, "Bob");
    }
}
