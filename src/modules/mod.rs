pub mod books;

use std::sync::Arc;

use bookshelf_db::Database;
use bookshelf_kernel::ModuleRegistry;

use books::{repository::PgBookRepository, BooksModule};

/// Register all project-specific modules with the registry
pub fn register_all(registry: &mut ModuleRegistry, db: Arc<Database>) -> anyhow::Result<()> {
    let books = BooksModule::new(Arc::new(PgBookRepository::new(db)));
    registry.register(Arc::new(books))?;
    Ok(())
}
