use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{error, warn};

use crate::models::{Student, StudentStatus};
use crate::store::{encode, Direction, DocumentStore, Fields, Query, StoreError};

pub const STUDENTS: &str = "students";

/// Name used when a student record is missing or unreadable.
pub const PLACEHOLDER_NAME: &str = "Student";

#[async_trait]
pub trait StudentDirectory: Send + Sync {
    async fn student_name(&self, student_id: &str) -> Result<Option<String>, StoreError>;

    async fn students(&self) -> Result<Vec<Student>, StoreError>;
}

/// Looks up a display name, falling back to the placeholder.
pub async fn resolve_name(directory: &dyn StudentDirectory, student_id: &str) -> String {
    match directory.student_name(student_id).await {
        Ok(Some(name)) => name,
        Ok(None) => {
            warn!(student_id, "student not found in directory");
            PLACEHOLDER_NAME.to_string()
        }
        Err(err) => {
            error!(student_id, error = %err, "failed to look up student name");
            PLACEHOLDER_NAME.to_string()
        }
    }
}

/// Directory backed by the `students` collection of a document store.
#[derive(Clone)]
pub struct StoreDirectory {
    store: Arc<dyn DocumentStore>,
}

impl StoreDirectory {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn put(&self, student: &Student) -> Result<(), StoreError> {
        self.store
            .put(STUDENTS, &student.id, encode(student)?)
            .await
    }

    /// Inserts a new active student or renames the one with this email.
    pub async fn upsert_by_email(&self, name: &str, email: &str) -> Result<String, StoreError> {
        let existing = self
            .store
            .query(STUDENTS, &Query::new().eq("email", email))
            .await?;

        if let Some(doc) = existing.into_iter().next() {
            let mut patch = Fields::new();
            patch.insert("name".to_string(), Value::String(name.to_string()));
            self.store.update(STUDENTS, &doc.id, patch).await?;
            return Ok(doc.id);
        }

        let student = Student {
            id: String::new(),
            name: name.to_string(),
            email: email.to_string(),
            status: StudentStatus::Active,
        };
        self.store.insert(STUDENTS, encode(&student)?).await
    }
}

#[async_trait]
impl StudentDirectory for StoreDirectory {
    async fn student_name(&self, student_id: &str) -> Result<Option<String>, StoreError> {
        let Some(doc) = self.store.get(STUDENTS, student_id).await? else {
            return Ok(None);
        };
        let student: Student = doc.decode()?;
        Ok(Some(student.name))
    }

    async fn students(&self) -> Result<Vec<Student>, StoreError> {
        let query = Query::new().order_by("name", Direction::Asc);
        self.store
            .query(STUDENTS, &query)
            .await?
            .into_iter()
            .map(|doc| doc.decode())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn upsert_reuses_existing_email() {
        let store = Arc::new(MemoryStore::new());
        let directory = StoreDirectory::new(store.clone());

        let first = directory
            .upsert_by_email("Ana Souza", "ana@academy.test")
            .await
            .unwrap();
        let second = directory
            .upsert_by_email("Ana S. Souza", "ana@academy.test")
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(store.count(STUDENTS).await, 1);
        assert_eq!(
            directory.student_name(&first).await.unwrap().as_deref(),
            Some("Ana S. Souza")
        );
    }

    #[tokio::test]
    async fn missing_or_failing_lookups_use_placeholder() {
        let store = Arc::new(MemoryStore::new());
        let directory = StoreDirectory::new(store.clone());
        assert_eq!(resolve_name(&directory, "ghost").await, PLACEHOLDER_NAME);

        let id = directory
            .upsert_by_email("Bruno Lima", "bruno@academy.test")
            .await
            .unwrap();
        store.set_unavailable(true);
        assert_eq!(resolve_name(&directory, &id).await, PLACEHOLDER_NAME);
    }

    #[tokio::test]
    async fn students_are_listed_by_name() {
        let store = Arc::new(MemoryStore::new());
        let directory = StoreDirectory::new(store);
        directory.upsert_by_email("Carla", "c@academy.test").await.unwrap();
        directory.upsert_by_email("Alice", "a@academy.test").await.unwrap();

        let names: Vec<String> = directory
            .students()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["Alice", "Carla"]);
    }
}
