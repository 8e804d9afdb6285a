//! Book persistence.
//!
//! Handlers talk to [`BookRepository`]; [`PgBookRepository`] is the
//! PostgreSQL implementation built on the shared [`Database`].

use std::sync::Arc;

use async_trait::async_trait;
use bookshelf_db::{Database, DbError, Statement, StatementBuilder};

use super::models::{Book, BookFilter, NewBook};

const COLUMNS: &str = "id, title, author, description, published, pages";

#[async_trait]
pub trait BookRepository: Send + Sync {
    /// Books matching `filter`, ascending by id.
    async fn list(&self, filter: BookFilter) -> Result<Vec<Book>, DbError>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Book>, DbError>;

    async fn create(&self, book: NewBook) -> Result<Book, DbError>;

    /// Replace every mutable field; `None` when no book has `id`.
    async fn update(&self, id: i64, book: NewBook) -> Result<Option<Book>, DbError>;

    /// `true` when a book was deleted.
    async fn remove(&self, id: i64) -> Result<bool, DbError>;
}

pub struct PgBookRepository {
    db: Arc<Database>,
}

impl PgBookRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl BookRepository for PgBookRepository {
    async fn list(&self, filter: BookFilter) -> Result<Vec<Book>, DbError> {
        self.db.execute(&list_statement(&filter)).await?.decode()
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Book>, DbError> {
        self.db.execute(&get_statement(id)).await?.decode_first()
    }

    async fn create(&self, book: NewBook) -> Result<Book, DbError> {
        self.db
            .execute(&insert_statement(&book))
            .await?
            .decode_first()?
            .ok_or(DbError::NoRows)
    }

    // Two round trips; a concurrent write can land between them.
    async fn update(&self, id: i64, book: NewBook) -> Result<Option<Book>, DbError> {
        let result = self.db.execute(&update_statement(id, &book)).await?;
        if result.rows_affected == 0 {
            return Ok(None);
        }
        self.get_by_id(id).await
    }

    async fn remove(&self, id: i64) -> Result<bool, DbError> {
        let result = self.db.execute(&delete_statement(id)).await?;
        Ok(result.rows_affected > 0)
    }
}

fn list_statement(filter: &BookFilter) -> Statement {
    let mut builder = StatementBuilder::query(format!("SELECT {COLUMNS} FROM books"));

    let conditions = [("title", filter.title.as_deref()), ("author", filter.author.as_deref())];
    let mut first = true;
    for (column, value) in conditions {
        let Some(value) = value else { continue };
        builder
            .push(if first { " WHERE " } else { " AND " })
            .push(column)
            .push(" ILIKE ")
            .push_bind(like_pattern(value))
            .push(" ESCAPE '\\'");
        first = false;
    }

    builder.push(" ORDER BY id ASC");
    builder.build()
}

fn get_statement(id: i64) -> Statement {
    let mut builder = StatementBuilder::query(format!("SELECT {COLUMNS} FROM books WHERE id = "));
    builder.push_bind(id);
    builder.build()
}

fn insert_statement(book: &NewBook) -> Statement {
    let mut builder = StatementBuilder::query(
        "INSERT INTO books (title, author, description, published, pages) VALUES (",
    );
    builder
        .push_bind(book.title.as_str())
        .push(", ")
        .push_bind(book.author.as_str())
        .push(", ")
        .push_bind(book.description.as_str())
        .push(", ")
        .push_bind(book.published)
        .push(", ")
        .push_bind(book.pages)
        .push(&format!(") RETURNING {COLUMNS}"));
    builder.build()
}

fn update_statement(id: i64, book: &NewBook) -> Statement {
    let mut builder = StatementBuilder::command("UPDATE books SET title = ");
    builder
        .push_bind(book.title.as_str())
        .push(", author = ")
        .push_bind(book.author.as_str())
        .push(", description = ")
        .push_bind(book.description.as_str())
        .push(", published = ")
        .push_bind(book.published)
        .push(", pages = ")
        .push_bind(book.pages)
        .push(" WHERE id = ")
        .push_bind(id);
    builder.build()
}

fn delete_statement(id: i64) -> Statement {
    let mut builder = StatementBuilder::command("DELETE FROM books WHERE id = ");
    builder.push_bind(id);
    builder.build()
}

/// `%value%` with LIKE metacharacters escaped.
fn like_pattern(value: &str) -> String {
    let mut pattern = String::with_capacity(value.len() + 2);
    pattern.push('%');
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

#[cfg(test)]
mod tests {
    use super::*;
    use bookshelf_db::BindValue;
    use chrono::NaiveDate;

    fn dune() -> NewBook {
        NewBook {
            title: "Dune".into(),
            author: "Frank Herbert".into(),
            description: "Sci-fi".into(),
            published: NaiveDate::from_ymd_opt(1965, 8, 1).unwrap(),
            pages: 412,
        }
    }

    #[test]
    fn unfiltered_list_orders_by_id() {
        let statement = list_statement(&BookFilter::default());
        assert_eq!(
            statement.sql(),
            "SELECT id, title, author, description, published, pages FROM books ORDER BY id ASC"
        );
        assert!(statement.params().is_empty());
        assert!(statement.returns_rows());
    }

    #[test]
    fn filters_are_and_combined() {
        let statement = list_statement(&BookFilter {
            title: Some("dune".into()),
            author: Some("herbert".into()),
        });
        assert_eq!(
            statement.sql(),
            "SELECT id, title, author, description, published, pages FROM books \
             WHERE title ILIKE $1 ESCAPE '\\' AND author ILIKE $2 ESCAPE '\\' ORDER BY id ASC"
        );
        assert_eq!(
            statement.params(),
            &[BindValue::Text("%dune%".into()), BindValue::Text("%herbert%".into())]
        );
    }

    #[test]
    fn author_only_filter_starts_the_where_clause() {
        let statement = list_statement(&BookFilter {
            title: None,
            author: Some("le guin".into()),
        });
        assert!(statement.sql().contains(" WHERE author ILIKE $1 "));
        assert!(!statement.sql().contains(" AND "));
    }

    #[test]
    fn like_metacharacters_are_literal() {
        assert_eq!(like_pattern("100%_done\\"), "%100\\%\\_done\\\\%");
        assert_eq!(like_pattern("plain"), "%plain%");
    }

    #[test]
    fn insert_returns_the_row() {
        let statement = insert_statement(&dune());
        assert_eq!(
            statement.sql(),
            "INSERT INTO books (title, author, description, published, pages) \
             VALUES ($1, $2, $3, $4, $5) RETURNING id, title, author, description, published, pages"
        );
        assert_eq!(statement.params().len(), 5);
        assert_eq!(statement.params()[4], BindValue::Int(412));
        assert!(statement.returns_rows());
    }

    #[test]
    fn update_binds_id_last() {
        let statement = update_statement(7, &dune());
        assert_eq!(
            statement.sql(),
            "UPDATE books SET title = $1, author = $2, description = $3, \
             published = $4, pages = $5 WHERE id = $6"
        );
        assert_eq!(statement.params()[5], BindValue::BigInt(7));
        assert!(!statement.returns_rows());
    }

    #[test]
    fn get_and_delete_bind_the_id() {
        let get = get_statement(3);
        assert!(get.sql().ends_with("FROM books WHERE id = $1"));
        assert_eq!(get.params(), &[BindValue::BigInt(3)]);

        let delete = delete_statement(3);
        assert_eq!(delete.sql(), "DELETE FROM books WHERE id = $1");
        assert!(!delete.returns_rows());
    }

    mod postgres {
        use super::*;
        use crate::modules::books::{memory::InMemoryBookRepository, BooksModule};
        use bookshelf_kernel::settings::Settings;
        use bookshelf_kernel::Module;

        async fn repository() -> PgBookRepository {
            let settings = Settings::load().unwrap();
            let db = Arc::new(Database::init(&settings.database).await.unwrap());
            let module = BooksModule::new(Arc::new(InMemoryBookRepository::new()));
            let migrations: Vec<_> = module
                .migrations()
                .into_iter()
                .map(|m| (module.name().to_string(), m))
                .collect();
            bookshelf_db::run_migrations(&db, &migrations).await.unwrap();
            PgBookRepository::new(db)
        }

        #[tokio::test]
        #[ignore = "requires database"]
        async fn create_get_update_delete() {
            let repo = repository().await;

            let created = repo.create(dune()).await.unwrap();
            assert!(created.id > 0);
            assert_eq!(repo.get_by_id(created.id).await.unwrap(), Some(created.clone()));

            let revised = NewBook {
                pages: 896,
                ..dune()
            };
            let updated = repo.update(created.id, revised).await.unwrap().unwrap();
            assert_eq!(updated.pages, Some(896));

            let found = repo
                .list(BookFilter {
                    title: Some("DUN".into()),
                    author: None,
                })
                .await
                .unwrap();
            assert!(found.iter().any(|b| b.id == created.id));

            assert!(repo.remove(created.id).await.unwrap());
            assert!(!repo.remove(created.id).await.unwrap());
            assert_eq!(repo.update(created.id, dune()).await.unwrap(), None);
        }
    }
}
