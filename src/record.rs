//! Submission records and their key-value persistence.
//!
//! A record is stored as JSON under `resume:<id>`. It is written twice by a
//! successful submission: once with empty feedback (the provisional record,
//! so a crash mid-analysis still leaves a "pending" entry behind) and once
//! with the finished [`FeedbackReport`].

use crate::error::{ReviewError, StoreError};
use crate::feedback::FeedbackReport;
use crate::store::KvStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Key prefix of every submission record.
pub const RECORD_PREFIX: &str = "resume:";

/// `resume:<id>`
pub fn record_key(id: &str) -> String {
    format!("{RECORD_PREFIX}{id}")
}

/// Free-text job context supplied with a document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobContext {
    pub company_name: String,
    pub job_title: String,
    pub job_description: String,
}

impl JobContext {
    pub fn new(
        company_name: impl Into<String>,
        job_title: impl Into<String>,
        job_description: impl Into<String>,
    ) -> Self {
        Self {
            company_name: company_name.into(),
            job_title: job_title.into(),
            job_description: job_description.into(),
        }
    }
}

/// One document-plus-job-context submission and its eventual feedback.
///
/// `feedback` serialises as `""` while pending. Older records that used
/// `resumePath`/`imagePath` are read through aliases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionRecord {
    pub id: String,
    #[serde(default, alias = "resumePath")]
    pub raw_document_ref: String,
    #[serde(default, alias = "imagePath")]
    pub raster_image_ref: String,
    #[serde(default)]
    pub company_name: String,
    #[serde(default)]
    pub job_title: String,
    #[serde(default)]
    pub job_description: String,
    #[serde(default, with = "pending_feedback")]
    pub feedback: Option<FeedbackReport>,
}

impl SubmissionRecord {
    /// A provisional record: both artifacts stored, no feedback yet.
    pub fn provisional(
        id: impl Into<String>,
        raw_document_ref: impl Into<String>,
        raster_image_ref: impl Into<String>,
        context: &JobContext,
    ) -> Self {
        Self {
            id: id.into(),
            raw_document_ref: raw_document_ref.into(),
            raster_image_ref: raster_image_ref.into(),
            company_name: context.company_name.clone(),
            job_title: context.job_title.clone(),
            job_description: context.job_description.clone(),
            feedback: None,
        }
    }

    pub fn key(&self) -> String {
        record_key(&self.id)
    }

    pub fn is_pending(&self) -> bool {
        self.feedback.is_none()
    }

    pub fn job_context(&self) -> JobContext {
        JobContext::new(&self.company_name, &self.job_title, &self.job_description)
    }

    /// Attach feedback. Refused unless both artifacts are recorded.
    pub fn attach_feedback(&mut self, report: FeedbackReport) -> Result<(), ReviewError> {
        if self.raw_document_ref.is_empty() || self.raster_image_ref.is_empty() {
            return Err(ReviewError::Internal(format!(
                "record '{}' has no stored artifacts; refusing to attach feedback",
                self.id
            )));
        }
        self.feedback = Some(report);
        Ok(())
    }
}

/// `Option<FeedbackReport>` ⇄ `""` | object.
mod pending_feedback {
    use crate::feedback::FeedbackReport;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use serde_json::Value;

    pub fn serialize<S: Serializer>(
        feedback: &Option<FeedbackReport>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match feedback {
            Some(report) => report.serialize(serializer),
            None => serializer.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<FeedbackReport>, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::Null => Ok(None),
            Value::String(s) if s.trim().is_empty() => Ok(None),
            value @ Value::Object(_) => serde_json::from_value(value)
                .map(Some)
                .map_err(D::Error::custom),
            other => Err(D::Error::custom(format!(
                "feedback must be an object or empty string, got {other}"
            ))),
        }
    }
}

/// Reads and writes [`SubmissionRecord`]s in a [`KvStore`].
#[derive(Clone)]
pub struct RecordRepository {
    kv: Arc<dyn KvStore>,
}

impl RecordRepository {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    pub async fn load(&self, id: &str) -> Result<Option<SubmissionRecord>, StoreError> {
        match self.kv.get(&record_key(id)).await? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    pub async fn exists(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.kv.get(&record_key(id)).await?.is_some())
    }

    pub async fn save(&self, record: &SubmissionRecord) -> Result<(), StoreError> {
        let json = serde_json::to_string(record)?;
        self.kv.set(&record.key(), &json).await?;
        debug!(
            "Saved {} ({})",
            record.key(),
            if record.is_pending() { "pending" } else { "complete" }
        );
        Ok(())
    }

    /// Every record under `resume:*`. Entries that fail to parse are skipped.
    pub async fn list(&self) -> Result<Vec<SubmissionRecord>, StoreError> {
        let items = self.kv.list(&format!("{RECORD_PREFIX}*"), true).await?;
        Ok(items
            .into_iter()
            .filter_map(|item| {
                let value = item.value?;
                match serde_json::from_str(&value) {
                    Ok(record) => Some(record),
                    Err(e) => {
                        warn!("Skipping unreadable record {}: {}", item.key, e);
                        None
                    }
                }
            })
            .collect())
    }

    pub async fn flush(&self) -> Result<(), StoreError> {
        self.kv.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryKvStore;
    use serde_json::json;

    fn context() -> JobContext {
        JobContext::new("Acme", "Engineer", "Rust services")
    }

    #[test]
    fn provisional_record_serialises_empty_feedback() {
        let record = SubmissionRecord::provisional("42", "a-cv.pdf", "b-cv.png", &context());
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["feedback"], json!(""));
        assert_eq!(value["rawDocumentRef"], json!("a-cv.pdf"));
        assert_eq!(value["companyName"], json!("Acme"));
        assert_eq!(record.key(), "resume:42");
    }

    #[test]
    fn legacy_field_names_are_accepted() {
        let record: SubmissionRecord = serde_json::from_value(json!({
            "id": "7",
            "resumePath": "cv.pdf",
            "imagePath": "cv.png",
            "companyName": "Acme",
            "jobTitle": "Engineer",
            "jobDescription": "",
            "feedback": {"overallScore": 80}
        }))
        .unwrap();
        assert_eq!(record.raw_document_ref, "cv.pdf");
        assert_eq!(record.raster_image_ref, "cv.png");
        assert!(!record.is_pending());
    }

    #[test]
    fn non_object_feedback_is_rejected() {
        let err = serde_json::from_value::<SubmissionRecord>(json!({"id": "1", "feedback": 12}));
        assert!(err.is_err());
    }

    #[test]
    fn feedback_needs_stored_artifacts() {
        let mut record = SubmissionRecord::provisional("1", "", "", &context());
        assert!(record.attach_feedback(FeedbackReport::default()).is_err());
        assert!(record.is_pending());
    }

    #[tokio::test]
    async fn repository_round_trip_and_list() {
        let kv = Arc::new(MemoryKvStore::new());
        let repo = RecordRepository::new(kv.clone());
        let record = SubmissionRecord::provisional("1", "a", "b", &context());
        repo.save(&record).await.unwrap();
        kv.set("resume:broken", "{not json").await.unwrap();

        assert_eq!(repo.load("1").await.unwrap(), Some(record.clone()));
        assert!(repo.load("missing").await.unwrap().is_none());
        assert!(repo.exists("1").await.unwrap());
        assert_eq!(repo.list().await.unwrap(), vec![record]);
    }
}
