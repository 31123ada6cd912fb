use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    auth::repo::{NewUser, User, UserRepo},
    error::StoreError,
    recipes::repo::{NewRecipe, Recipe, RecipePatch, RecipeRepo},
};

/// In-process store. Each mutation runs under one write lock, which gives the
/// same atomicity the Postgres adapter gets from single statements.
#[derive(Default)]
pub struct MemoryStore {
    users: RwLock<HashMap<Uuid, User>>,
    // insertion order doubles as creation order
    recipes: RwLock<Vec<Recipe>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepo for MemoryStore {
    async fn create(&self, new: NewUser) -> Result<User, StoreError> {
        let mut users = self.users.write().await;
        if users.values().any(|u| u.email == new.email) {
            return Err(StoreError::UniqueViolation);
        }
        let user = User {
            id: Uuid::new_v4(),
            name: new.name,
            email: new.email,
            password_hash: new.password_hash,
            about: new.about,
            created_at: OffsetDateTime::now_utc(),
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let users = self.users.read().await;
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_by_ids(&self, ids: &[Uuid]) -> Result<Vec<User>, StoreError> {
        let users = self.users.read().await;
        Ok(ids.iter().filter_map(|id| users.get(id).cloned()).collect())
    }
}

#[async_trait]
impl RecipeRepo for MemoryStore {
    async fn insert(&self, new: NewRecipe) -> Result<Recipe, StoreError> {
        let now = OffsetDateTime::now_utc();
        let recipe = Recipe {
            id: Uuid::new_v4(),
            owner: new.owner,
            title: new.title,
            ingredients: new.ingredients,
            steps: new.steps,
            image: new.image,
            created_at: now,
            updated_at: now,
        };
        self.recipes.write().await.push(recipe.clone());
        Ok(recipe)
    }

    async fn list_all(&self) -> Result<Vec<Recipe>, StoreError> {
        Ok(self.recipes.read().await.iter().rev().cloned().collect())
    }

    async fn list_by_owner(&self, owner: Uuid) -> Result<Vec<Recipe>, StoreError> {
        let recipes = self.recipes.read().await;
        Ok(recipes
            .iter()
            .rev()
            .filter(|r| r.owner == owner)
            .cloned()
            .collect())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Recipe>, StoreError> {
        let recipes = self.recipes.read().await;
        Ok(recipes.iter().find(|r| r.id == id).cloned())
    }

    async fn update_owned(
        &self,
        id: Uuid,
        owner: Uuid,
        patch: RecipePatch,
    ) -> Result<Option<Recipe>, StoreError> {
        let mut recipes = self.recipes.write().await;
        let Some(recipe) = recipes.iter_mut().find(|r| r.id == id && r.owner == owner) else {
            return Ok(None);
        };
        if let Some(title) = patch.title {
            recipe.title = title;
        }
        if let Some(ingredients) = patch.ingredients {
            recipe.ingredients = ingredients;
        }
        if let Some(steps) = patch.steps {
            recipe.steps = steps;
        }
        if let Some(image) = patch.image {
            recipe.image = Some(image);
        }
        recipe.updated_at = OffsetDateTime::now_utc();
        Ok(Some(recipe.clone()))
    }

    async fn delete_owned(&self, id: Uuid, owner: Uuid) -> Result<Option<Recipe>, StoreError> {
        let mut recipes = self.recipes.write().await;
        let pos = recipes.iter().position(|r| r.id == id && r.owner == owner);
        Ok(pos.map(|i| recipes.remove(i)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            name: "n".into(),
            email: email.into(),
            password_hash: "h".into(),
            about: None,
        }
    }

    fn new_recipe(owner: Uuid, title: &str) -> NewRecipe {
        NewRecipe {
            owner,
            title: title.into(),
            ingredients: vec!["a".into()],
            steps: vec!["b".into()],
            image: None,
        }
    }

    #[tokio::test]
    async fn duplicate_email_is_a_unique_violation() {
        let store = MemoryStore::new();
        store.create(new_user("a@x.io")).await.unwrap();
        let err = store.create(new_user("a@x.io")).await.unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation));
    }

    #[tokio::test]
    async fn owner_filter_applies_to_update_and_delete() {
        let store = MemoryStore::new();
        let alice = Uuid::new_v4();
        let mallory = Uuid::new_v4();
        let recipe = store.insert(new_recipe(alice, "Soup")).await.unwrap();

        let patch = RecipePatch {
            title: Some("Stolen".into()),
            ..Default::default()
        };
        assert!(store
            .update_owned(recipe.id, mallory, patch.clone())
            .await
            .unwrap()
            .is_none());
        assert!(store.delete_owned(recipe.id, mallory).await.unwrap().is_none());

        let updated = store
            .update_owned(recipe.id, alice, patch)
            .await
            .unwrap()
            .expect("owner may update");
        assert_eq!(updated.title, "Stolen");
        assert_eq!(updated.ingredients, recipe.ingredients);

        assert!(store.delete_owned(recipe.id, alice).await.unwrap().is_some());
        assert!(RecipeRepo::find_by_id(&store, recipe.id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn listing_is_newest_first() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        store.insert(new_recipe(owner, "first")).await.unwrap();
        store.insert(new_recipe(owner, "second")).await.unwrap();
        store.insert(new_recipe(Uuid::new_v4(), "other")).await.unwrap();

        let titles: Vec<_> = store
            .list_all()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.title)
            .collect();
        assert_eq!(titles, ["other", "second", "first"]);

        let mine = store.list_by_owner(owner).await.unwrap();
        assert_eq!(mine.len(), 2);
        assert_eq!(mine[0].title, "second");
    }
}
