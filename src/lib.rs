#![allow(async_fn_in_trait)]

extern crate tracing_futures;

#[macro_use]
extern crate rocket;
#[macro_use]
extern crate serde;

use bson::doc;
use error::BackendError;
use mongodb::Client;
use rocket::data::{ByteUnit, Limits};
use rocket::http::Method;
use rocket::Rocket;
use rocket_cors::{AllowedHeaders, AllowedOrigins};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use crate::config::Config;
use crate::data::academic::db::AcademicDbExt;
use crate::data::assignment::db::AssignmentDbExt;
use crate::data::upload::db::UploadDbExt;
use crate::error::ConfigurationError;
use crate::media::{CloudinaryStore, MediaStore};
use crate::route::mount_api;
use crate::security::Security;

pub mod config;
pub mod data;
pub mod error;
pub mod media;
pub mod resp;
pub mod role;
pub mod route;
pub mod security;
pub mod util;

/// Headroom for multipart framing and the other form fields.
const FORM_OVERHEAD: u64 = 1024 * 1024;
/// Files accepted in a single assignment submission before the form is cut off.
const MAX_FILES_PER_FORM: u64 = 8;

fn upload_limits(max_upload_bytes: u64) -> Limits {
    Limits::default()
        .limit("file", ByteUnit::from(max_upload_bytes + FORM_OVERHEAD))
        .limit(
            "data-form",
            ByteUnit::from(max_upload_bytes * MAX_FILES_PER_FORM + FORM_OVERHEAD),
        )
}

pub async fn create(log_level: Option<Level>) -> Result<Rocket<rocket::Build>, BackendError> {
    if let Some(l) = log_level {
        let subscriber = FmtSubscriber::builder().with_max_level(l).finish();

        if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
            eprintln!("Unable to set global logger: {}", err);
        };
        if tracing_log::LogTracer::init().is_err() {
            tracing::debug!("log records are already forwarded.");
        }
    }

    tracing::info!("Reading .env file...");
    if dotenv::dotenv().is_err() {
        tracing::warn!("Unable to load .env file.");
    }

    tracing::info!("Loading configuration...");
    let c = match Config::load() {
        Ok(c) => {
            tracing::info!("Configuration loaded.");
            c
        }
        Err(ConfigurationError::NotFound(_)) => {
            let c = Config::default();
            if c.save().is_err() {
                tracing::warn!("Unable to save generated configuration.");
            }
            c
        }
        Err(other) => {
            tracing::error!("Configuration error: {}", other);
            return Err(other.into());
        }
    };

    tracing::info!("Initializing security information...");
    let security = Security::load()?;

    tracing::info!("Connecting to MongoDB: {}", c.mongodb_uri);
    let client = Client::with_uri_str(c.mongodb_uri.as_str()).await?;

    tracing::info!("Using MongoDB database: {}", c.mongodb_db);
    let db = client.database(c.mongodb_db.as_str());

    if let Err(e) = db.run_command(doc! { "ping": 1 }, None).await {
        tracing::error!("Unable to connect to MongoDB: {}", e);
        return Err(BackendError::DatabaseUnreachable(c.mongodb_uri.clone()));
    }

    tracing::info!("Ensuring indexes...");
    db.ensure_indexes().await?;
    db.ensure_upload_indexes().await?;
    db.ensure_assignment_indexes().await?;

    if !c.media.is_configured() {
        tracing::warn!("Media host credentials missing, uploads will be refused.");
    }
    let media: Box<dyn MediaStore> = Box::new(CloudinaryStore::new(c.media.clone())?);

    tracing::info!("Starting HTTP server...");
    let figment = rocket::Config::figment()
        .merge(("port", c.port))
        .merge(("limits", upload_limits(c.max_upload_bytes)));

    let mut r = rocket::custom(figment)
        .manage(c)
        .manage(security)
        .manage(db)
        .manage(media);

    tracing::info!("Setting up CORS...");
    let allowed_origins = AllowedOrigins::All;

    let cors = rocket_cors::CorsOptions {
        allowed_origins,
        allowed_methods: vec![Method::Get, Method::Put, Method::Post, Method::Delete]
            .into_iter()
            .map(From::from)
            .collect(),
        allowed_headers: AllowedHeaders::All,
        allow_credentials: true,
        ..Default::default()
    }
    .to_cors()?;

    r = r.attach(cors);
    r = mount_api(r);

    Ok(r)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn form_limits_leave_room_for_every_file() {
        let limits = upload_limits(10 * 1024 * 1024);

        let file = limits.get("file").expect("file limit");
        let form = limits.get("data-form").expect("form limit");
        assert!(file > ByteUnit::from(10 * 1024 * 1024));
        assert!(form >= ByteUnit::from(8 * 10 * 1024 * 1024));
    }
}
