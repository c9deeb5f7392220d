use std::iter::repeat;
use std::path::{Path, PathBuf};

use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use bson::oid::ObjectId;
use chrono::{DateTime, NaiveTime, Utc};
use rocket::http::Status;

use crate::resp::problem::Problem;

pub fn find_first_subpath<P: AsRef<Path>, F: Fn(&Path) -> bool>(
    root: impl AsRef<Path>,
    subpaths: &[P],
    search: F,
) -> Option<PathBuf> {
    subpaths
        .iter()
        .zip(repeat(root.as_ref()))
        .map(|(b, a)| a.join(b))
        .find(|it: &PathBuf| search(it))
}

/// Engine for the unpadded radix-64 variant used inside bcrypt hash strings.
pub fn bcrypt_base64_engine() -> GeneralPurpose {
    GeneralPurpose::new(
        &base64::alphabet::BCRYPT,
        GeneralPurposeConfig::new()
            .with_encode_padding(false)
            .with_decode_padding_mode(DecodePaddingMode::RequireNone)
            .with_decode_allow_trailing_bits(true),
    )
}

pub fn parse_object_id(kind: &str, value: &str) -> Result<ObjectId, Problem> {
    ObjectId::parse_str(value).map_err(|_| {
        Problem::new_untyped(Status::BadRequest, format!("Invalid {} id.", kind))
            .insert_str("id", value)
            .clone()
    })
}

pub fn start_of_day(at: DateTime<Utc>) -> DateTime<Utc> {
    at.date_naive().and_time(NaiveTime::MIN).and_utc()
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Deserializes numbers that may have been stored as int32, int64 or double.
pub mod bson_number {
    use bson::Bson;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &i64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(*value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        match Bson::deserialize(deserializer)? {
            Bson::Int32(it) => Ok(it as i64),
            Bson::Int64(it) => Ok(it),
            Bson::Double(it) if it.fract() == 0.0 => Ok(it as i64),
            other => Err(de::Error::custom(format!(
                "expected a whole number, found {:?}",
                other.element_type()
            ))),
        }
    }
}

/// Reads a BSON datetime into chrono; writes it the way chrono does.
pub mod bson_date {
    use bson::serde_helpers::chrono_datetime_as_bson_datetime;
    use chrono::{DateTime, Utc};
    use serde::{Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        value.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        chrono_datetime_as_bson_datetime::deserialize(deserializer)
    }
}

/// Reads an optional BSON datetime into chrono; writes it the way chrono does.
pub mod bson_date_opt {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        value.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        Ok(Option::<bson::DateTime>::deserialize(deserializer)?.map(|it| it.to_chrono()))
    }
}

/// Optional ObjectId written as its hex string.
pub fn serialize_opt_object_id_as_hex<S: serde::Serializer>(
    value: &Option<ObjectId>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match value {
        Some(id) => serializer.serialize_some(&id.to_hex()),
        None => serializer.serialize_none(),
    }
}
