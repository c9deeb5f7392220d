use bson::oid::ObjectId;
use crypto::bcrypt::bcrypt;
use crypto::util::fixed_time_eq;
use base64::Engine;
use rand::RngCore;
use utoipa::ToSchema;

use crate::resp::problem::Problem;
use crate::role::{AssociatedCollection, Role};
use crate::util::{bcrypt_base64_engine, bson_number};

pub mod db;

pub static USER_COLLECTION_NAME: &str = "users";

const BCRYPT_MAX_INPUT: usize = 72;
const BCRYPT_SALT_LEN: usize = 16;
const BCRYPT_HASH_LEN: usize = 23;
const BCRYPT_ENCODED_SALT_LEN: usize = 22;

pub type Salt = [u8; BCRYPT_SALT_LEN];

/// A bcrypt hash in modular crypt format (`$2b$10$<salt><hash>`).
#[derive(Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PasswordHash(String);

impl std::fmt::Debug for PasswordHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PasswordHash(..)")
    }
}

struct ParsedHash {
    cost: u32,
    salt: Salt,
    hash: [u8; BCRYPT_HASH_LEN],
}

fn eks_blowfish(cost: u32, salt: &Salt, password: &str) -> [u8; BCRYPT_HASH_LEN] {
    let mut input = password.as_bytes().to_vec();
    input.push(0);
    input.truncate(BCRYPT_MAX_INPUT);

    let mut output = [0u8; 24];
    bcrypt(cost, salt, &input, &mut output);

    let mut hash = [0u8; BCRYPT_HASH_LEN];
    hash.copy_from_slice(&output[..BCRYPT_HASH_LEN]);
    hash
}

impl PasswordHash {
    pub fn new(password: impl AsRef<str>, cost: u32) -> PasswordHash {
        let mut salt: Salt = [0; BCRYPT_SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        PasswordHash::with_salt(password, cost, salt)
    }

    pub fn with_salt(password: impl AsRef<str>, cost: u32, salt: Salt) -> PasswordHash {
        let cost = cost.clamp(4, 31);
        let hash = eks_blowfish(cost, &salt, password.as_ref());
        let engine = bcrypt_base64_engine();

        PasswordHash(format!(
            "$2b${:02}${}{}",
            cost,
            engine.encode(salt),
            engine.encode(hash)
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn parse(&self) -> Option<ParsedHash> {
        let mut parts = self.0.split('$');
        if !parts.next()?.is_empty() {
            return None;
        }
        if !matches!(parts.next()?, "2a" | "2b" | "2y") {
            return None;
        }
        let cost: u32 = parts.next()?.parse().ok().filter(|it| (4..=31).contains(it))?;
        let rest = parts.next()?;
        if parts.next().is_some() || rest.len() != BCRYPT_ENCODED_SALT_LEN + 31 {
            return None;
        }

        let engine = bcrypt_base64_engine();
        let salt = engine.decode(&rest[..BCRYPT_ENCODED_SALT_LEN]).ok()?;
        let hash = engine.decode(&rest[BCRYPT_ENCODED_SALT_LEN..]).ok()?;

        Some(ParsedHash {
            cost,
            salt: salt.try_into().ok()?,
            hash: hash.try_into().ok()?,
        })
    }

    /// Checks a password against this hash. Malformed hashes never match.
    pub fn verify(&self, password: impl AsRef<str>) -> bool {
        match self.parse() {
            Some(parsed) => {
                let computed = eks_blowfish(parsed.cost, &parsed.salt, password.as_ref());
                fixed_time_eq(&computed, &parsed.hash)
            }
            None => {
                tracing::warn!("stored password hash isn't a valid bcrypt hash");
                false
            }
        }
    }
}

impl From<String> for PasswordHash {
    fn from(value: String) -> Self {
        PasswordHash(value)
    }
}

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Serialize, Deserialize)]
pub enum UserStatus {
    #[default]
    Active,
    Inactive,
    Suspended,
    Pending,
}

fn default_password_version() -> i64 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub username: String,
    pub email: String,
    pub password_hash: PasswordHash,
    #[serde(default = "default_password_version", with = "bson_number")]
    pub password_version: i64,
    pub role: Role,
    #[serde(default)]
    pub associated_id: Option<ObjectId>,
    #[serde(default)]
    pub associated_collection: Option<AssociatedCollection>,
    #[serde(default)]
    pub status: UserStatus,
    #[serde(default)]
    pub last_login: Option<bson::DateTime>,
}

impl User {
    /// Student record this account is bound to, if it's a student account.
    pub fn student_id(&self) -> Option<ObjectId> {
        match (self.role, self.associated_collection) {
            (Role::Student, Some(AssociatedCollection::Students)) => self.associated_id,
            _ => None,
        }
    }
}

/// Version stamp for a password changed at `now_millis`; always moves forward.
pub fn next_password_version(current: i64, now_millis: i64) -> i64 {
    now_millis.max(current + 1)
}

const MIN_PASSWORD_LEN: usize = 8;

#[derive(Clone, Deserialize, ToSchema)]
pub struct LoginData {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for LoginData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginData")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordData {
    pub current_password: String,
    pub new_password: String,
}

impl ChangePasswordData {
    /// Checks the new password fits what bcrypt can hash in full.
    pub fn validate(&self) -> Result<(), Problem> {
        let len = self.new_password.len();
        if len < MIN_PASSWORD_LEN {
            return Err(db::problem::bad_new_password(format!(
                "New password must be at least {} characters long.",
                MIN_PASSWORD_LEN
            )));
        }
        if len > BCRYPT_MAX_INPUT {
            return Err(db::problem::bad_new_password(format!(
                "New password can't be longer than {} bytes.",
                BCRYPT_MAX_INPUT
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    pub expires_in: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PasswordChanged {
    pub message: String,
    pub token: String,
    pub expires_in: String,
}
