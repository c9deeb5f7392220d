use std::path::PathBuf;
use std::{env, fs};

use rand::RngCore;

use crate::error::SecurityError;

const JWT_SECRET: &str = "jwt.secret";
const JWT_SECRET_ENV: &str = "JSON_TOKEN";
const MIN_SECRET_LEN: usize = 32;

/// Signing material for user auth tokens.
#[derive(Clone)]
pub struct Security {
    pub jwt_secret: Vec<u8>,
}

impl std::fmt::Debug for Security {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Security").finish_non_exhaustive()
    }
}

#[inline]
fn security_dir() -> PathBuf {
    PathBuf::from(env::var("SECURITY_DIR").unwrap_or("./security".to_string()))
}

impl Security {
    pub fn from_secret(secret: impl Into<Vec<u8>>) -> Security {
        Security {
            jwt_secret: secret.into(),
        }
    }

    pub fn load() -> Result<Security, SecurityError> {
        if let Ok(secret) = env::var(JWT_SECRET_ENV) {
            if !secret.is_empty() {
                tracing::info!("Using JWT secret from {}.", JWT_SECRET_ENV);
                return Ok(Security::from_secret(secret));
            }
        }

        let dir = security_dir();
        let path = dir.join(JWT_SECRET);

        tracing::info!("Loading JWT signing secret...");
        match fs::read(&path) {
            Ok(secret) if secret.len() >= MIN_SECRET_LEN => {
                tracing::info!("JWT secret found and loaded.");
                Ok(Security::from_secret(secret))
            }
            Ok(_) => Err(SecurityError::WeakSecret(path)),
            Err(_) if cfg!(feature = "generate-security") => {
                tracing::info!(
                    "JWT secret not found in '{}'. Generating a new one.",
                    path.display()
                );
                fs::create_dir_all(&dir)?;

                let mut secret = vec![0u8; 64];
                rand::thread_rng().fill_bytes(&mut secret);
                fs::write(&path, &secret)?;

                Ok(Security::from_secret(secret))
            }
            Err(_) => Err(SecurityError::MissingSecret(dir)),
        }
    }
}
