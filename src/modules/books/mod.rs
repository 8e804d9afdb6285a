pub mod handlers;
pub mod models;
pub mod repository;

#[cfg(test)]
pub(crate) mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use bookshelf_kernel::{InitCtx, Migration, Module};
use serde_json::json;

use repository::BookRepository;

/// Book catalogue: CRUD over the `books` table.
pub struct BooksModule {
    repo: Arc<dyn BookRepository>,
}

impl BooksModule {
    pub fn new(repo: Arc<dyn BookRepository>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl Module for BooksModule {
    fn name(&self) -> &'static str {
        "books"
    }

    async fn init(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!(
            module = self.name(),
            environment = ?ctx.settings.environment,
            "books module initialized"
        );
        Ok(())
    }

    fn routes(&self) -> Router {
        handlers::router(self.repo.clone())
    }

    fn openapi(&self) -> Option<serde_json::Value> {
        let error = |description: &str| {
            json!({
                "description": description,
                "content": {
                    "application/json": {
                        "schema": { "$ref": "#/components/schemas/ErrorResponse" }
                    }
                }
            })
        };
        let book = |description: &str| {
            json!({
                "description": description,
                "content": {
                    "application/json": {
                        "schema": { "$ref": "#/components/schemas/Book" }
                    }
                }
            })
        };
        let id_param = json!({
            "name": "id",
            "in": "path",
            "required": true,
            "schema": { "type": "integer", "format": "int64" }
        });
        let body = json!({
            "required": true,
            "content": {
                "application/json": {
                    "schema": { "$ref": "#/components/schemas/BookInput" }
                }
            }
        });

        Some(json!({
            "paths": {
                "/": {
                    "get": {
                        "summary": "List books",
                        "tags": ["Books"],
                        "parameters": [
                            { "name": "title", "in": "query", "required": false, "schema": { "type": "string" } },
                            { "name": "author", "in": "query", "required": false, "schema": { "type": "string" } }
                        ],
                        "responses": {
                            "200": {
                                "description": "Books ordered by id",
                                "content": {
                                    "application/json": {
                                        "schema": {
                                            "type": "array",
                                            "items": { "$ref": "#/components/schemas/Book" }
                                        }
                                    }
                                }
                            },
                            "500": error("Internal server error")
                        }
                    },
                    "post": {
                        "summary": "Create a book",
                        "tags": ["Books"],
                        "requestBody": body.clone(),
                        "responses": {
                            "201": book("Created book"),
                            "400": error("Missing or malformed fields"),
                            "500": error("Internal server error")
                        }
                    }
                },
                "/{id}": {
                    "get": {
                        "summary": "Get a book",
                        "tags": ["Books"],
                        "parameters": [id_param.clone()],
                        "responses": {
                            "200": book("The book"),
                            "400": error("Invalid book ID"),
                            "404": error("Book not found"),
                            "500": error("Internal server error")
                        }
                    },
                    "put": {
                        "summary": "Replace a book",
                        "tags": ["Books"],
                        "parameters": [id_param.clone()],
                        "requestBody": body,
                        "responses": {
                            "200": book("Updated book"),
                            "400": error("Invalid book ID or missing fields"),
                            "404": error("Book not found"),
                            "500": error("Internal server error")
                        }
                    },
                    "delete": {
                        "summary": "Delete a book",
                        "tags": ["Books"],
                        "parameters": [id_param],
                        "responses": {
                            "200": {
                                "description": "Book deleted",
                                "content": {
                                    "application/json": {
                                        "schema": {
                                            "type": "object",
                                            "properties": { "message": { "type": "string" } }
                                        }
                                    }
                                }
                            },
                            "400": error("Invalid book ID"),
                            "404": error("Book not found"),
                            "500": error("Internal server error")
                        }
                    }
                },
                "/health": {
                    "get": {
                        "summary": "Books health check",
                        "tags": ["Books"],
                        "responses": {
                            "200": {
                                "description": "OK",
                                "content": { "text/plain": { "schema": { "type": "string" } } }
                            }
                        }
                    }
                }
            },
            "components": {
                "schemas": {
                    "Book": {
                        "type": "object",
                        "properties": {
                            "id": { "type": "integer", "format": "int64" },
                            "title": { "type": "string" },
                            "author": { "type": "string" },
                            "description": { "type": "string", "nullable": true },
                            "published": { "type": "string", "format": "date", "nullable": true },
                            "pages": { "type": "integer", "format": "int32", "nullable": true }
                        },
                        "required": ["id", "title", "author"]
                    },
                    "BookInput": {
                        "type": "object",
                        "properties": {
                            "title": { "type": "string" },
                            "author": { "type": "string" },
                            "description": { "type": "string" },
                            "published": { "type": "string", "format": "date" },
                            "pages": { "type": "integer", "minimum": 1 }
                        },
                        "required": ["title", "author", "description", "published", "pages"]
                    }
                }
            }
        }))
    }

    fn migrations(&self) -> Vec<Migration> {
        vec![Migration {
            id: "001_create_books",
            up: r#"
                CREATE TABLE IF NOT EXISTS books (
                    id          BIGSERIAL PRIMARY KEY,
                    title       TEXT NOT NULL,
                    author      TEXT NOT NULL,
                    description TEXT,
                    published   DATE,
                    pages       INTEGER
                );
                "#,
        }]
    }

    async fn start(&self, _ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!(module = self.name(), "books module started");
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        tracing::info!(module = self.name(), "books module stopped");
        Ok(())
    }
}
