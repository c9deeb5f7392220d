use std::str::FromStr;

use base64::Engine;
use bson::oid::ObjectId;
use bson::serde_helpers::serialize_object_id_as_hex_string;
use chrono::{DateTime, Utc};
use rocket::fs::TempFile;
use rocket::http::Status;
use tokio::io::AsyncReadExt;
use utoipa::ToSchema;

use crate::resp::problem::Problem;

pub mod db;

pub static UPLOAD_COLLECTION_NAME: &str = "uploads";

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize, ToSchema)]
pub enum DocumentType {
    AadhaarCard,
    Certificate,
    Marksheet,
    AdmissionForm,
    PassportPhoto,
}

impl DocumentType {
    pub fn as_str(self) -> &'static str {
        match self {
            DocumentType::AadhaarCard => "AadhaarCard",
            DocumentType::Certificate => "Certificate",
            DocumentType::Marksheet => "Marksheet",
            DocumentType::AdmissionForm => "AdmissionForm",
            DocumentType::PassportPhoto => "PassportPhoto",
        }
    }
}

impl FromStr for DocumentType {
    type Err = Problem;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "AadhaarCard" => Ok(DocumentType::AadhaarCard),
            "Certificate" => Ok(DocumentType::Certificate),
            "Marksheet" => Ok(DocumentType::Marksheet),
            "AdmissionForm" => Ok(DocumentType::AdmissionForm),
            "PassportPhoto" => Ok(DocumentType::PassportPhoto),
            _ => Err(Problem::new_untyped(
                Status::BadRequest,
                "Invalid or missing document type.",
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentUpload {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub associate_id: String,
    #[serde(rename = "type")]
    pub document_type: DocumentType,
    pub resource_url: String,
    pub public_id: String,
    pub created_at: bson::DateTime,
    pub updated_at: bson::DateTime,
}

impl DocumentUpload {
    pub fn new(
        associate_id: impl ToString,
        document_type: DocumentType,
        resource_url: String,
        public_id: String,
    ) -> DocumentUpload {
        let now = bson::DateTime::now();
        DocumentUpload {
            id: ObjectId::new(),
            associate_id: associate_id.to_string(),
            document_type,
            resource_url,
            public_id,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadDetails {
    #[serde(rename = "_id", serialize_with = "serialize_object_id_as_hex_string")]
    #[schema(value_type = String)]
    pub id: ObjectId,
    pub associate_id: String,
    #[serde(rename = "type")]
    pub document_type: DocumentType,
    pub resource_url: String,
    pub public_id: String,
    pub created_at: DateTime<Utc>,
}

impl From<DocumentUpload> for UploadDetails {
    fn from(value: DocumentUpload) -> Self {
        UploadDetails {
            id: value.id,
            associate_id: value.associate_id,
            document_type: value.document_type,
            resource_url: value.resource_url,
            public_id: value.public_id,
            created_at: value.created_at.to_chrono(),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DocumentUploaded {
    pub message: String,
    pub upload_details: UploadDetails,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProfilePictureUpdated {
    pub message: String,
    pub imageurl: String,
}

pub mod mime {
    pub const PDF: &str = "application/pdf";
    pub const DOC: &str = "application/msword";
    pub const DOCX: &str =
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
    pub const JPEG: &str = "image/jpeg";
    pub const PNG: &str = "image/png";
    pub const GIF: &str = "image/gif";
    pub const WEBP: &str = "image/webp";
}

/// Accepted MIME types and size cap for one kind of upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadPolicy {
    pub allowed: &'static [&'static str],
    pub max_bytes: u64,
    pub rejection: &'static str,
}

impl UploadPolicy {
    pub fn documents(max_bytes: u64) -> UploadPolicy {
        UploadPolicy {
            allowed: &[mime::JPEG, mime::PNG, mime::GIF, mime::PDF, mime::WEBP],
            max_bytes,
            rejection: "Only image or PDF files are allowed!",
        }
    }

    pub fn submissions(max_bytes: u64) -> UploadPolicy {
        UploadPolicy {
            allowed: &[mime::PDF, mime::DOC, mime::DOCX],
            max_bytes,
            rejection: "Only PDF, DOC, or DOCX files are allowed!",
        }
    }

    pub fn profile_pictures(max_bytes: u64) -> UploadPolicy {
        UploadPolicy {
            allowed: &[mime::JPEG, mime::PNG, mime::GIF, mime::WEBP],
            max_bytes,
            rejection: "Only image files are allowed!",
        }
    }

    pub fn check(&self, mime: Option<&str>, size: u64) -> Result<(), Problem> {
        let mime = mime.unwrap_or_default();
        if !self.allowed.contains(&mime) {
            return Err(Problem::new_untyped(Status::BadRequest, self.rejection)
                .insert_str("contentType", mime)
                .clone());
        }

        if size > self.max_bytes {
            return Err(Problem::new_untyped(Status::BadRequest, "File too large.")
                .detail(format!(
                    "Files may be at most {} bytes, got {}.",
                    self.max_bytes, size
                ))
                .clone());
        }

        Ok(())
    }
}

/// Essence (`type/subtype`) of a temp file's content type.
pub fn mime_of(file: &TempFile<'_>) -> Option<String> {
    file.content_type()
        .map(|it| format!("{}/{}", it.top(), it.sub()).to_ascii_lowercase())
}

pub fn data_uri(mime: &str, bytes: &[u8]) -> String {
    format!(
        "data:{};base64,{}",
        mime,
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

/// A multipart file that passed its upload policy, read into memory.
#[derive(Debug, Clone)]
pub struct ReceivedFile {
    pub name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl ReceivedFile {
    pub async fn read(file: &TempFile<'_>, policy: &UploadPolicy) -> Result<ReceivedFile, Problem> {
        let mime = mime_of(file);
        policy.check(mime.as_deref(), file.len())?;

        let mut bytes = Vec::with_capacity(file.len() as usize);
        Box::pin(file.open().await?)
            .read_to_end(&mut bytes)
            .await?;

        Ok(ReceivedFile {
            name: file.name().unwrap_or("upload").to_string(),
            mime: mime.unwrap_or_default(),
            bytes,
        })
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn data_uri(&self) -> String {
        data_uri(&self.mime, &self.bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: u64 = 1024 * 1024;

    #[test]
    fn document_types_parse() {
        assert_eq!(
            "Marksheet".parse::<DocumentType>().unwrap(),
            DocumentType::Marksheet
        );
        assert_eq!(
            DocumentType::from_str("AadhaarCard").unwrap().as_str(),
            "AadhaarCard"
        );

        let problem = DocumentType::from_str("Passport").unwrap_err();
        assert_eq!(problem.status, Status::BadRequest);
        assert!(DocumentType::from_str("").is_err());
    }

    #[test]
    fn submission_policy_accepts_office_documents_only() {
        let policy = UploadPolicy::submissions(10 * MIB);

        assert!(policy.check(Some(mime::PDF), 1024).is_ok());
        assert!(policy.check(Some(mime::DOC), 1024).is_ok());
        assert!(policy.check(Some(mime::DOCX), 1024).is_ok());

        assert!(policy.check(Some(mime::PNG), 1024).is_err());
        assert!(policy.check(Some("text/plain"), 1024).is_err());
        assert!(policy.check(None, 1024).is_err());
    }

    #[test]
    fn size_limit_is_inclusive() {
        let policy = UploadPolicy::documents(10 * MIB);

        assert!(policy.check(Some(mime::JPEG), 10 * MIB).is_ok());

        let problem = policy.check(Some(mime::JPEG), 10 * MIB + 1).unwrap_err();
        assert_eq!(problem.status, Status::BadRequest);
        assert_eq!(problem.title, "File too large.");
    }

    #[test]
    fn profile_pictures_must_be_images() {
        let policy = UploadPolicy::profile_pictures(10 * MIB);

        assert!(policy.check(Some(mime::WEBP), 10).is_ok());
        assert!(policy.check(Some(mime::PDF), 10).is_err());
    }

    #[test]
    fn data_uri_embeds_mime_and_base64() {
        assert_eq!(
            data_uri(mime::PDF, b"%PDF-1.4"),
            "data:application/pdf;base64,JVBERi0xLjQ="
        );
    }

    #[test]
    fn upload_details_expose_hex_ids() {
        let upload = DocumentUpload::new(
            "238T1A4252",
            DocumentType::Certificate,
            "https://res.example.com/doc.pdf".to_string(),
            "student_documents/238T1A4252/Certificate/doc".to_string(),
        );
        let id = upload.id;

        let json = serde_json::to_value(UploadDetails::from(upload)).unwrap();
        assert_eq!(json["_id"], id.to_hex());
        assert_eq!(json["type"], "Certificate");
        assert_eq!(json["associateId"], "238T1A4252");
    }
}
