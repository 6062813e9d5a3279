//! HTTP API server: axum router and request handlers.
//!
//! The server runs on the tokio async runtime while the render thread
//! runs on a plain `std::thread`. Handlers never touch the pixel buffer:
//! they send a [`RenderCommand`] and read the published [`DisplayStatus`].
//! Image and config files are read and written directly from the handlers.
//!
//! ## Rust concepts
//! - `async fn` and `.await` for non-blocking I/O
//! - axum extractors: `State`, `Query`, `Json`, `String` bodies
//! - `Arc` for sharing state across async tasks
//! - `tower-http` middleware for CORS and request tracing

use crate::config::{ConfigStore, DeviceConfig, EffectConfig, WifiConfig};
use crate::effect::EffectPreset;
use crate::media::{ImageStore, StorageUsage, StoreError};
use crate::render::{DeviceInfo, DisplayStatus, RenderCommand, lock_status};
use crate::{MatrixGeometry, parse_hex_level_or_default};
use axum::Router;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::get;
use serde::{Deserialize, Serialize};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

type ApiError = (StatusCode, String);

// ── App State ────────────────────────────────────────────────────────

/// Shared application state, passed to every handler via axum's `State` extractor.
///
/// Everything inside is cheap to clone: the stores only hold paths and the
/// status is behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Channel to send commands to the render thread
    pub command_tx: Sender<RenderCommand>,
    /// Shared display status (render thread writes, handlers read)
    pub status: Arc<Mutex<DisplayStatus>>,
    pub images: ImageStore,
    pub config: ConfigStore,
    pub geometry: MatrixGeometry,
}

// ── OpenAPI Documentation ────────────────────────────────────────────

#[derive(OpenApi)]
#[openapi(
    paths(
        set_effect,
        get_images,
        get_image,
        put_image,
        delete_image,
        get_storage,
        get_config,
        put_config,
        get_info,
        reboot,
    ),
    components(schemas(
        EffectStatus,
        FilesList,
        StorageUsage,
        DeviceConfig,
        WifiConfig,
        EffectConfig,
        DeviceInfo,
    )),
    tags(
        (name = "effect", description = "Effect selection"),
        (name = "images", description = "Stored pixel-art images"),
        (name = "system", description = "Configuration and device status"),
    ),
    info(
        title = "LED Effects API",
        version = env!("CARGO_PKG_VERSION"),
        description = "HTTP API for an addressable LED matrix or strip"
    )
)]
pub struct ApiDoc;

// ── Request/Response types ───────────────────────────────────────────

/// Query parameters of `/api/effect`. All optional and parsed leniently.
#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct EffectQuery {
    /// default, solid, off, beat, rainbow, northpole, quebec, festive, image, showcase
    #[param(example = "rainbow")]
    pub name: Option<String>,
    /// RRGGBB hex color for solid and beat
    #[param(example = "FF8800")]
    pub color: Option<String>,
    /// Two hex digits, 00-FF
    #[param(example = "80")]
    pub brightness: Option<String>,
    /// Stored image shown by the image effect
    pub imgname: Option<String>,
    /// `1` saves `name` as the boot effect
    pub setdefault: Option<String>,
    /// Travel speed in meters per second
    #[param(example = "1.0")]
    pub speed: Option<String>,
}

#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ImageQuery {
    #[param(example = "heart")]
    pub imgname: Option<String>,
    /// Concatenated RRGGBB values; the request body is used when absent
    pub imgdata: Option<String>,
}

#[derive(Debug, PartialEq, Serialize, utoipa::ToSchema)]
pub struct EffectStatus {
    #[schema(example = "rainbow")]
    pub effect: String,
    #[schema(example = 64)]
    pub brightness: u8,
}

#[derive(Debug, PartialEq, Serialize, utoipa::ToSchema)]
pub struct FilesList {
    #[serde(rename = "FilesList")]
    pub files_list: Vec<String>,
}

// ── Router ───────────────────────────────────────────────────────────

/// Build the axum router with all API endpoints.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(
            SwaggerUi::new("/docs")
                .url("/api-docs/openapi.json", ApiDoc::openapi())
                .config(utoipa_swagger_ui::Config::new(["/api-docs/openapi.json"]).validator_url("none")),
        )
        .route("/api/effect", get(set_effect).put(set_effect).post(set_effect))
        .route("/api/images", get(get_images))
        .route(
            "/api/image",
            get(get_image).put(put_image).post(put_image).delete(delete_image),
        )
        .route("/api/storage", get(get_storage))
        .route("/api/config", get(get_config).put(put_config).post(put_config))
        .route("/api/info", get(get_info))
        .route("/api/reboot", get(reboot))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ── Helpers ──────────────────────────────────────────────────────────

fn send(state: &AppState, command: RenderCommand) -> Result<(), ApiError> {
    state.command_tx.send(command).map_err(|_| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Render thread gone".to_string(),
        )
    })
}

fn store_error(e: StoreError) -> ApiError {
    let status = match e {
        StoreError::NotFound(_) => StatusCode::NOT_FOUND,
        StoreError::InvalidName(_) => StatusCode::BAD_REQUEST,
        StoreError::Io(_) | StoreError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, e.to_string())
}

fn required<'a>(value: &'a Option<String>, param: &str) -> Result<&'a str, ApiError> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| (StatusCode::BAD_REQUEST, format!("Missing parameter: {param}")))
}

// ── Effect ───────────────────────────────────────────────────────────

/// /api/effect — select an effect, adjust brightness and speed, report the result
///
/// Without `name` only brightness and speed are applied.
#[utoipa::path(
    method(get, put, post),
    path = "/api/effect",
    tag = "effect",
    params(EffectQuery),
    responses(
        (status = 200, description = "Effect applied", body = EffectStatus),
        (status = 400, description = "Unknown effect or missing image name"),
        (status = 404, description = "Image not found")
    )
)]
async fn set_effect(
    State(state): State<AppState>,
    Query(query): Query<EffectQuery>,
) -> Result<Json<EffectStatus>, ApiError> {
    // Validate everything before touching the render thread.
    let selection = match query.name.as_deref().filter(|n| !n.is_empty()) {
        Some(name) => {
            let preset = EffectPreset::parse(name).ok_or_else(|| {
                (StatusCode::BAD_REQUEST, format!("Unknown effect: {name}"))
            })?;
            let image = match preset {
                EffectPreset::Image => {
                    let imgname = required(&query.imgname, "imgname")?;
                    Some(state.images.read_image(imgname).map_err(store_error)?)
                }
                _ => None,
            };
            Some((preset, image))
        }
        None => None,
    };

    let brightness = query
        .brightness
        .as_deref()
        .map(|text| parse_hex_level_or_default(text, 0));
    if let Some(level) = brightness {
        send(&state, RenderCommand::SetBrightness(level))?;
    }

    if let Some(text) = query.speed.as_deref() {
        match text.trim().parse::<f32>() {
            Ok(speed) => send(&state, RenderCommand::SetTravelSpeed(speed))?,
            Err(_) => tracing::warn!("Ignoring travel speed {:?}", text),
        }
    }

    let mut status = {
        let current = lock_status(&state.status);
        EffectStatus {
            effect: current.effect.clone(),
            brightness: current.brightness,
        }
    };
    if let Some(level) = brightness {
        status.brightness = level.clamp(0, 255) as u8;
    }

    if let Some((preset, image)) = selection {
        send(
            &state,
            RenderCommand::SetEffect {
                preset,
                color: query.color.clone(),
                image,
            },
        )?;

        if matches!(query.setdefault.as_deref(), Some("1" | "true")) {
            state
                .config
                .update(|c| c.effect.default = preset.as_str().to_string())
                .map_err(store_error)?;
        }
        status.effect = preset.as_str().to_string();
    }

    Ok(Json(status))
}

// ── Images ───────────────────────────────────────────────────────────

/// GET /api/images — names of stored images
#[utoipa::path(
    get,
    path = "/api/images",
    tag = "images",
    responses(
        (status = 200, description = "Stored image names", body = FilesList)
    )
)]
async fn get_images(State(state): State<AppState>) -> Json<FilesList> {
    Json(FilesList {
        files_list: state.images.list_images(),
    })
}

/// GET /api/image — payload of one stored image
#[utoipa::path(
    get,
    path = "/api/image",
    tag = "images",
    params(ImageQuery),
    responses(
        (status = 200, description = "Image payload", body = String),
        (status = 404, description = "Image not found")
    )
)]
async fn get_image(
    State(state): State<AppState>,
    Query(query): Query<ImageQuery>,
) -> Result<String, ApiError> {
    let name = required(&query.imgname, "imgname")?;
    state.images.read_image(name).map_err(store_error)
}

/// PUT /api/image — store an image from `imgdata` or the request body
#[utoipa::path(
    method(put, post),
    path = "/api/image",
    tag = "images",
    params(ImageQuery),
    request_body(content = String, description = "Payload when imgdata is absent", content_type = "text/plain"),
    responses(
        (status = 200, description = "Image stored"),
        (status = 400, description = "Missing name or data")
    )
)]
async fn put_image(
    State(state): State<AppState>,
    Query(query): Query<ImageQuery>,
    body: String,
) -> Result<StatusCode, ApiError> {
    let name = required(&query.imgname, "imgname")?;
    let data = match query.imgdata.as_deref() {
        Some(data) if !data.is_empty() => data,
        _ => body.trim(),
    };
    if data.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Missing image data".to_string()));
    }

    let expected = state.geometry.image_hex_len();
    if data.len() != expected {
        tracing::warn!(
            "Image {} has {} hex chars, panel expects {}",
            name,
            data.len(),
            expected
        );
    }

    state.images.write_image(name, data).map_err(store_error)?;
    Ok(StatusCode::OK)
}

/// DELETE /api/image — remove a stored image
#[utoipa::path(
    delete,
    path = "/api/image",
    tag = "images",
    params(ImageQuery),
    responses(
        (status = 200, description = "Image deleted"),
        (status = 500, description = "Deletion failed")
    )
)]
async fn delete_image(
    State(state): State<AppState>,
    Query(query): Query<ImageQuery>,
) -> Result<StatusCode, ApiError> {
    let name = required(&query.imgname, "imgname")?;
    state.images.delete_image(name).map_err(store_error)?;
    Ok(StatusCode::OK)
}

/// GET /api/storage — storage budget and usage
#[utoipa::path(
    get,
    path = "/api/storage",
    tag = "images",
    responses(
        (status = 200, description = "Storage usage", body = StorageUsage)
    )
)]
async fn get_storage(State(state): State<AppState>) -> Json<StorageUsage> {
    Json(state.images.usage())
}

// ── System ───────────────────────────────────────────────────────────

/// GET /api/config — device configuration, password blanked
#[utoipa::path(
    get,
    path = "/api/config",
    tag = "system",
    responses(
        (status = 200, description = "Current configuration", body = DeviceConfig)
    )
)]
async fn get_config(State(state): State<AppState>) -> Result<Json<DeviceConfig>, ApiError> {
    let config = state.config.load().map_err(store_error)?;
    Ok(Json(config.masked()))
}

/// PUT /api/config — replace the configuration
///
/// An empty `wifi.pwd` keeps the stored password. Network settings apply
/// after a restart.
#[utoipa::path(
    method(put, post),
    path = "/api/config",
    tag = "system",
    request_body = DeviceConfig,
    responses(
        (status = 200, description = "Saved configuration", body = DeviceConfig)
    )
)]
async fn put_config(
    State(state): State<AppState>,
    Json(update): Json<DeviceConfig>,
) -> Result<Json<DeviceConfig>, ApiError> {
    let config = state
        .config
        .update(|c| c.merge_update(update))
        .map_err(store_error)?;
    Ok(Json(config.masked()))
}

/// GET /api/info — hostname, network link and firmware version
#[utoipa::path(
    get,
    path = "/api/info",
    tag = "system",
    responses(
        (status = 200, description = "Device information", body = DeviceInfo)
    )
)]
async fn get_info(State(state): State<AppState>) -> Json<DeviceInfo> {
    Json(lock_status(&state.status).info.clone())
}

/// GET /api/reboot — blank the strip and restart the service
#[utoipa::path(
    get,
    path = "/api/reboot",
    tag = "system",
    responses(
        (status = 200, description = "Restart scheduled")
    )
)]
async fn reboot(State(state): State<AppState>) -> Result<String, ApiError> {
    tracing::info!("Reboot requested over HTTP");
    send(&state, RenderCommand::Restart)?;
    Ok("Restarting".to_string())
}
