use crate::{
    data::student::{Student, StudentFields, StudentQuery},
    error::EscolaResult,
};
use async_trait::async_trait;
use std::fmt::Debug;

pub mod memory;
pub mod postgres;
pub mod student;

/// Storage for students. Implementations must keep emails unique, reporting a clash as
/// [`crate::error::EscolaError::EmailTaken`].
#[async_trait]
pub trait StudentStore: Send + Sync + Debug {
    /// Returns the number of students matching the query (ignoring its window), and the matching
    /// students inside the window.
    async fn list(&self, query: &StudentQuery) -> EscolaResult<(u64, Vec<Student>)>;
    async fn get(&self, id: i64) -> EscolaResult<Option<Student>>;
    async fn insert(&self, fields: StudentFields) -> EscolaResult<Student>;
    async fn update(&self, id: i64, fields: StudentFields) -> EscolaResult<Option<Student>>;
    async fn remove(&self, id: i64) -> EscolaResult<bool>;
    async fn close(&self);
}
