use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{Method, StatusCode},
    routing::{delete, get, patch, post, put},
    Json, Router,
};
use bazaar_shared::{authorize, authorize_ownership, CapabilitySet, Claims, RoleFlags};
use bazaar_store::{
    Category, CategoryInput, Database, DbPool, NewReview, NewUser, Product, ProductInput, Review,
    ReviewDeletion, ReviewReceipt, UserDeletion,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::auth::{AccessGate, Authenticated};
use crate::config::ServerConfig;
use crate::error::ServerError;

#[derive(Clone)]
pub struct AppState {
    pub pool: Arc<DbPool>,
    pub gate: AccessGate,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    /// Run blocking storage work on a pooled connection.
    pub async fn with_db<T, F>(&self, f: F) -> Result<T, ServerError>
    where
        F: FnOnce(&mut Database) -> Result<T, ServerError> + Send + 'static,
        T: Send + 'static,
    {
        let pool = Arc::clone(&self.pool);
        tokio::task::spawn_blocking(move || {
            let mut db = pool.get()?;
            f(&mut db)
        })
        .await
        .map_err(|e| ServerError::internal(format!("storage task failed: {e}")))?
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/auth/register", post(register))
        .route("/auth/token", post(login))
        .route("/auth/me", get(current_user))
        .route("/permissions/users/:user_id/supplier", patch(toggle_supplier))
        .route("/permissions/users/:user_id", delete(delete_user))
        .route("/categories", get(list_categories).post(create_category))
        .route("/categories/:id", put(update_category).delete(delete_category))
        .route("/products", get(list_products).post(create_product))
        .route("/products/category/:slug", get(products_by_category))
        .route(
            "/products/detail/:slug",
            get(product_detail).put(update_product).delete(delete_product),
        )
        .route("/reviews", get(list_reviews).post(submit_review))
        .route("/reviews/product/:slug", get(product_reviews))
        .route("/reviews/:review_id", delete(delete_review))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ─── Request / response bodies ───

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Deserialize)]
struct RegisterRequest {
    first_name: String,
    last_name: String,
    username: String,
    email: String,
    password: String,
}

#[derive(Serialize)]
struct RegisterResponse {
    id: i64,
}

#[derive(Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Serialize)]
struct TokenResponse {
    access_token: String,
    token_type: &'static str,
}

#[derive(Serialize)]
struct RoleToggleResponse {
    user_id: i64,
    #[serde(flatten)]
    roles: RoleFlags,
}

#[derive(Serialize)]
struct UserDeletionResponse {
    user_id: i64,
    status: UserDeletion,
}

// ─── Health ───

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ─── Auth ───

async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), ServerError> {
    if req.password.is_empty() {
        return Err(ServerError::bad_request("password must not be empty"));
    }

    let gate = state.gate.clone();
    let id = state
        .with_db(move |db| {
            let new_user = NewUser {
                password_verifier: gate.hash_password(&req.password)?,
                first_name: req.first_name,
                last_name: req.last_name,
                username: req.username,
                email: req.email,
                roles: RoleFlags::customer(),
            };
            Ok(db.create_user(&new_user)?)
        })
        .await?;

    Ok((StatusCode::CREATED, Json(RegisterResponse { id })))
}

async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, ServerError> {
    let gate = state.gate.clone();
    let claims = state
        .with_db(move |db| gate.authenticate(db, &req.username, &req.password))
        .await?;

    let access_token = state.gate.issue(&claims)?;
    info!(user_id = claims.user_id, "token issued");

    Ok(Json(TokenResponse {
        access_token,
        token_type: "bearer",
    }))
}

async fn current_user(Authenticated(claims): Authenticated) -> Json<Claims> {
    Json(claims)
}

// ─── Permissions ───

async fn toggle_supplier(
    State(state): State<AppState>,
    Authenticated(claims): Authenticated,
    Path(user_id): Path<i64>,
) -> Result<Json<RoleToggleResponse>, ServerError> {
    authorize(&claims, CapabilitySet::ADMIN)?;

    let roles = state.with_db(move |db| Ok(db.toggle_supplier(user_id)?)).await?;
    info!(user_id, admin_id = claims.user_id, "supplier/customer role toggled");

    Ok(Json(RoleToggleResponse { user_id, roles }))
}

async fn delete_user(
    State(state): State<AppState>,
    Authenticated(claims): Authenticated,
    Path(user_id): Path<i64>,
) -> Result<Json<UserDeletionResponse>, ServerError> {
    authorize(&claims, CapabilitySet::ADMIN)?;

    let status = state.with_db(move |db| Ok(db.deactivate_user(user_id)?)).await?;
    Ok(Json(UserDeletionResponse { user_id, status }))
}

// ─── Categories ───

async fn list_categories(State(state): State<AppState>) -> Result<Json<Vec<Category>>, ServerError> {
    let categories = state.with_db(|db| Ok(db.list_active_categories()?)).await?;
    Ok(Json(categories))
}

async fn create_category(
    State(state): State<AppState>,
    Authenticated(claims): Authenticated,
    Json(input): Json<CategoryInput>,
) -> Result<(StatusCode, Json<Category>), ServerError> {
    authorize(&claims, CapabilitySet::ADMIN)?;

    let category = state.with_db(move |db| Ok(db.create_category(&input)?)).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

async fn update_category(
    State(state): State<AppState>,
    Authenticated(claims): Authenticated,
    Path(id): Path<i64>,
    Json(input): Json<CategoryInput>,
) -> Result<Json<Category>, ServerError> {
    authorize(&claims, CapabilitySet::ADMIN)?;

    let category = state.with_db(move |db| Ok(db.update_category(id, &input)?)).await?;
    Ok(Json(category))
}

async fn delete_category(
    State(state): State<AppState>,
    Authenticated(claims): Authenticated,
    Path(id): Path<i64>,
) -> Result<StatusCode, ServerError> {
    authorize(&claims, CapabilitySet::ADMIN)?;

    state.with_db(move |db| Ok(db.deactivate_category(id)?)).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ─── Products ───

async fn list_products(State(state): State<AppState>) -> Result<Json<Vec<Product>>, ServerError> {
    let products = state.with_db(|db| Ok(db.list_active_products()?)).await?;
    Ok(Json(products))
}

async fn products_by_category(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<Vec<Product>>, ServerError> {
    let products = state
        .with_db(move |db| Ok(db.list_products_by_category_slug(&slug)?))
        .await?;
    Ok(Json(products))
}

async fn product_detail(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<Product>, ServerError> {
    let product = state.with_db(move |db| Ok(db.get_listed_product(&slug)?)).await?;
    Ok(Json(product))
}

async fn create_product(
    State(state): State<AppState>,
    Authenticated(claims): Authenticated,
    Json(input): Json<ProductInput>,
) -> Result<(StatusCode, Json<Product>), ServerError> {
    authorize(&claims, CapabilitySet::SUPPLIER_OR_ADMIN)?;

    let product = state
        .with_db(move |db| Ok(db.create_product(claims.user_id, &input)?))
        .await?;
    Ok((StatusCode::CREATED, Json(product)))
}

async fn update_product(
    State(state): State<AppState>,
    Authenticated(claims): Authenticated,
    Path(slug): Path<String>,
    Json(input): Json<ProductInput>,
) -> Result<Json<Product>, ServerError> {
    authorize(&claims, CapabilitySet::SUPPLIER_OR_ADMIN)?;

    let product = state
        .with_db(move |db| {
            let existing = db.get_product_by_slug(&slug)?;
            authorize_ownership(&claims, existing.supplier_id)?;
            Ok(db.update_product(existing.id, &input)?)
        })
        .await?;
    Ok(Json(product))
}

async fn delete_product(
    State(state): State<AppState>,
    Authenticated(claims): Authenticated,
    Path(slug): Path<String>,
) -> Result<StatusCode, ServerError> {
    authorize(&claims, CapabilitySet::SUPPLIER_OR_ADMIN)?;

    state
        .with_db(move |db| {
            let existing = db.get_product_by_slug(&slug)?;
            authorize_ownership(&claims, existing.supplier_id)?;
            Ok(db.deactivate_product(existing.id)?)
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// ─── Reviews ───

async fn list_reviews(State(state): State<AppState>) -> Result<Json<Vec<Review>>, ServerError> {
    let reviews = state.with_db(|db| Ok(db.list_active_reviews()?)).await?;
    Ok(Json(reviews))
}

async fn product_reviews(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<Vec<Review>>, ServerError> {
    let reviews = state
        .with_db(move |db| Ok(db.list_reviews_for_product(&slug)?))
        .await?;
    Ok(Json(reviews))
}

async fn submit_review(
    State(state): State<AppState>,
    Authenticated(claims): Authenticated,
    Json(review): Json<NewReview>,
) -> Result<(StatusCode, Json<ReviewReceipt>), ServerError> {
    authorize(&claims, CapabilitySet::CUSTOMER)?;

    let timeout = state.config.db_timeout;
    let receipt = state
        .with_db(move |db| Ok(db.submit_review(claims.user_id, &review, timeout)?))
        .await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

async fn delete_review(
    State(state): State<AppState>,
    Authenticated(claims): Authenticated,
    Path(review_id): Path<i64>,
) -> Result<Json<ReviewDeletion>, ServerError> {
    let deletion = state
        .with_db(move |db| Ok(db.delete_review(&claims, review_id)?))
        .await?;
    Ok(Json(deletion))
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
