use crate::{
    data::{
        StudentStore,
        student::{Student, StudentFields, StudentQuery},
    },
    error::{EmailTakenSnafu, EscolaResult},
};
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Inner {
    last_id: i64,
    students: BTreeMap<i64, Student>,
}

impl Inner {
    fn email_taken(&self, email: &str, except: Option<i64>) -> bool {
        self.students
            .values()
            .any(|student| student.email == email && Some(student.id) != except)
    }
}

#[derive(Debug, Default)]
pub struct MemoryStudentStore {
    inner: RwLock<Inner>,
}

impl MemoryStudentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StudentStore for MemoryStudentStore {
    async fn list(&self, query: &StudentQuery) -> EscolaResult<(u64, Vec<Student>)> {
        let inner = self.inner.read().await;

        let mut matching: Vec<&Student> = inner
            .students
            .values()
            .filter(|student| query.matches(student))
            .collect();
        matching.sort_by(|a, b| query.compare(a, b));

        let count = matching.len() as u64;
        let (offset, limit) = query
            .window
            .map_or((0, usize::MAX), |window| {
                (
                    usize::try_from(window.offset).unwrap_or(usize::MAX),
                    usize::try_from(window.limit).unwrap_or(usize::MAX),
                )
            });

        Ok((
            count,
            matching
                .into_iter()
                .skip(offset)
                .take(limit)
                .cloned()
                .collect(),
        ))
    }

    async fn get(&self, id: i64) -> EscolaResult<Option<Student>> {
        Ok(self.inner.read().await.students.get(&id).cloned())
    }

    async fn insert(&self, fields: StudentFields) -> EscolaResult<Student> {
        let mut inner = self.inner.write().await;
        if inner.email_taken(&fields.email, None) {
            return EmailTakenSnafu.fail();
        }

        inner.last_id += 1;
        let student = Student::from_fields(inner.last_id, fields);
        inner.students.insert(student.id, student.clone());
        info!(id = student.id, "Added student");
        Ok(student)
    }

    async fn update(&self, id: i64, fields: StudentFields) -> EscolaResult<Option<Student>> {
        let mut inner = self.inner.write().await;
        if !inner.students.contains_key(&id) {
            return Ok(None);
        }
        if inner.email_taken(&fields.email, Some(id)) {
            return EmailTakenSnafu.fail();
        }

        let student = Student::from_fields(id, fields);
        inner.students.insert(id, student.clone());
        info!(id, "Updated student");
        Ok(Some(student))
    }

    async fn remove(&self, id: i64) -> EscolaResult<bool> {
        let removed = self.inner.write().await.students.remove(&id).is_some();
        if removed {
            info!(id, "Removed student");
        }
        Ok(removed)
    }

    async fn close(&self) {}
}
