//! In-memory [`BookRepository`] for handler tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use bookshelf_db::DbError;

use super::models::{Book, BookFilter, NewBook};
use super::repository::BookRepository;

#[derive(Default)]
pub struct InMemoryBookRepository {
    books: Mutex<BTreeMap<i64, Book>>,
    next_id: Mutex<i64>,
    offline: AtomicBool,
}

impl InMemoryBookRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every call as if the database were unreachable.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.books.lock().unwrap().len()
    }

    fn check_online(&self) -> Result<(), DbError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(DbError::Closed)
        } else {
            Ok(())
        }
    }
}

fn contains_ignore_case(haystack: &str, needle: Option<&str>) -> bool {
    needle.map_or(true, |needle| {
        haystack.to_lowercase().contains(&needle.to_lowercase())
    })
}

#[async_trait]
impl BookRepository for InMemoryBookRepository {
    async fn list(&self, filter: BookFilter) -> Result<Vec<Book>, DbError> {
        self.check_online()?;
        Ok(self
            .books
            .lock()
            .unwrap()
            .values()
            .filter(|book| contains_ignore_case(&book.title, filter.title.as_deref()))
            .filter(|book| contains_ignore_case(&book.author, filter.author.as_deref()))
            .cloned()
            .collect())
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Book>, DbError> {
        self.check_online()?;
        Ok(self.books.lock().unwrap().get(&id).cloned())
    }

    async fn create(&self, book: NewBook) -> Result<Book, DbError> {
        self.check_online()?;
        let id = {
            let mut next_id = self.next_id.lock().unwrap();
            *next_id += 1;
            *next_id
        };
        let book = book.into_book(id);
        self.books.lock().unwrap().insert(id, book.clone());
        Ok(book)
    }

    async fn update(&self, id: i64, book: NewBook) -> Result<Option<Book>, DbError> {
        self.check_online()?;
        let mut books = self.books.lock().unwrap();
        let Some(existing) = books.get_mut(&id) else {
            return Ok(None);
        };
        *existing = book.into_book(id);
        Ok(Some(existing.clone()))
    }

    async fn remove(&self, id: i64) -> Result<bool, DbError> {
        self.check_online()?;
        Ok(self.books.lock().unwrap().remove(&id).is_some())
    }
}
