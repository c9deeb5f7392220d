use bson::doc;
use mongodb::options::IndexOptions;
use mongodb::{Collection, Database, IndexModel};

use super::{DocumentUpload, UPLOAD_COLLECTION_NAME};

pub trait UploadDbExt {
    fn document_uploads(&self) -> Collection<DocumentUpload>;

    async fn insert_document_upload(&self, upload: &DocumentUpload) -> mongodb::error::Result<()>;
    async fn ensure_upload_indexes(&self) -> mongodb::error::Result<()>;
}

impl UploadDbExt for Database {
    fn document_uploads(&self) -> Collection<DocumentUpload> {
        self.collection(UPLOAD_COLLECTION_NAME)
    }

    async fn insert_document_upload(&self, upload: &DocumentUpload) -> mongodb::error::Result<()> {
        self.document_uploads().insert_one(upload, None).await?;
        Ok(())
    }

    async fn ensure_upload_indexes(&self) -> mongodb::error::Result<()> {
        self.document_uploads()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "associateId": 1, "type": 1 })
                    .build(),
                None,
            )
            .await?;

        self.document_uploads()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "publicId": 1 })
                    .options(IndexOptions::builder().unique(true).build())
                    .build(),
                None,
            )
            .await?;

        Ok(())
    }
}
