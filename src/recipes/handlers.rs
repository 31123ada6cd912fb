use axum::{
    extract::{multipart::Field, DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    middleware,
    routing::get,
    Json, Router,
};
use bytes::Bytes;
use tracing::{instrument, warn};
use uuid::Uuid;

use super::{
    dto::{MessageResponse, OwnerView, RecipeForm, RecipeView},
    repo::Recipe,
};
use crate::{
    auth::{extractors::CurrentUser, middleware::require_auth, repo::User},
    error::{AppError, AppResult},
    state::AppState,
};

pub fn recipe_routes(state: AppState) -> Router<AppState> {
    let body_limit = state.config.max_upload_bytes;
    Router::new()
        .route("/recipes", get(list_recipes).post(create_recipe))
        .route(
            "/recipes/:id",
            get(get_recipe).put(update_recipe).delete(delete_recipe),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .route_layer(middleware::from_fn_with_state(state, require_auth))
}

/// Image part of a recipe form, not yet handed to the media store.
struct ImageUpload {
    body: Bytes,
    content_type: String,
}

/// Reads `title`, `ingredients`, `steps` and an optional `image` file.
/// Unknown fields are ignored.
async fn read_form(mut mp: Multipart) -> AppResult<(RecipeForm, Option<ImageUpload>)> {
    let mut form = RecipeForm::default();
    let mut image = None;

    while let Some(field) = mp
        .next_field()
        .await
        .map_err(|e| AppError::validation(format!("Invalid form data: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "title" => form.title = Some(read_text(field).await?),
            "ingredients" => form.ingredients = Some(read_text(field).await?),
            "steps" => form.steps = Some(read_text(field).await?),
            "image" => {
                let content_type = field
                    .content_type()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "application/octet-stream".into());
                let body = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::validation(format!("Invalid image upload: {e}")))?;
                // browsers send an empty part when no file was picked
                if body.is_empty() {
                    continue;
                }
                if !content_type.starts_with("image/") {
                    return Err(AppError::validation("Image must be an image file"));
                }
                image = Some(ImageUpload { body, content_type });
            }
            _ => {}
        }
    }

    Ok((form, image))
}

async fn read_text(field: Field<'_>) -> AppResult<String> {
    field
        .text()
        .await
        .map_err(|e| AppError::validation(format!("Invalid form field: {e}")))
}

async fn store_image(state: &AppState, image: Option<ImageUpload>) -> AppResult<Option<String>> {
    match image {
        Some(img) => {
            let path = state
                .media
                .save(img.body, &img.content_type)
                .await
                .map_err(AppError::Internal)?;
            Ok(Some(path))
        }
        None => Ok(None),
    }
}

async fn discard_image(state: &AppState, path: Option<&str>) {
    if let Some(path) = path {
        if let Err(e) = state.media.remove(path).await {
            warn!(error = %e, path, "failed to remove media");
        }
    }
}

// Writes only ever touch the caller's own recipes.
fn owned_view(recipe: Recipe, owner: &User) -> RecipeView {
    RecipeView::new(recipe, Some(OwnerView::name_only(owner)))
}

// Unparsable ids cannot match anything.
fn parse_id(raw: &str, missing: AppError) -> AppResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| missing)
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn create_recipe(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    mp: Multipart,
) -> AppResult<(StatusCode, Json<RecipeView>)> {
    let (form, image) = read_form(mp).await?;
    let mut draft = form.into_draft()?;
    draft.image = store_image(&state, image).await?;
    let image_path = draft.image.clone();

    match state.recipes.create(draft, user.id).await {
        Ok(recipe) => Ok((StatusCode::CREATED, Json(owned_view(recipe, &user)))),
        Err(e) => {
            discard_image(&state, image_path.as_deref()).await;
            Err(e)
        }
    }
}

#[instrument(skip(state))]
pub async fn list_recipes(State(state): State<AppState>) -> AppResult<Json<Vec<RecipeView>>> {
    Ok(Json(state.recipes.list_all().await?))
}

#[instrument(skip(state))]
pub async fn get_recipe(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<RecipeView>> {
    let id = parse_id(&id, AppError::NotFound)?;
    Ok(Json(state.recipes.get_by_id(id).await?))
}

#[instrument(skip(state, user, mp), fields(user_id = %user.id))]
pub async fn update_recipe(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    mp: Multipart,
) -> AppResult<Json<RecipeView>> {
    let id = parse_id(&id, AppError::NotFoundOrForbidden)?;
    let (form, image) = read_form(mp).await?;
    let mut changes = form.into_changes();
    changes.image = store_image(&state, image).await?;
    let image_path = changes.image.clone();

    match state.recipes.update(id, changes, user.id).await {
        Ok(recipe) => Ok(Json(owned_view(recipe, &user))),
        Err(e) => {
            discard_image(&state, image_path.as_deref()).await;
            Err(e)
        }
    }
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn delete_recipe(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<MessageResponse>> {
    let id = parse_id(&id, AppError::NotFoundOrForbidden)?;
    let removed = state.recipes.delete(id, user.id).await?;
    discard_image(&state, removed.image.as_deref()).await;
    Ok(Json(MessageResponse {
        message: "Recipe deleted successfully",
    }))
}
