//! Storage gateway for blog posts.
//!
//! [`PostStore`] hides the document store behind five primitives keyed by
//! [`PostId`]. The service handler holds one store for the lifetime of the
//! process and never talks to a driver directly.
//!
//! ## Implementations
//!
//! - [`mongo::MongoStore`] - a MongoDB collection behind a pooled client.
//! - [`memory::MemoryStore`] - a process-local map for tests and benchmarks.

pub mod memory;
pub mod mongo;

use crate::server::config::{ServerConfig, StorageBackend};
use blog_tonic_core::{Result, proto::Blog, types::PostId};
use futures::stream::BoxStream;
use serde::Serialize;
use std::sync::Arc;

/// The content fields of a post that has not been stored yet.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct NewPost {
    pub author_id: String,
    pub title: String,
    pub content: String,
}

/// A stored post.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlogPost {
    pub id: PostId,
    pub author_id: String,
    pub title: String,
    pub content: String,
}

impl BlogPost {
    pub fn from_new(id: PostId, post: NewPost) -> Self {
        Self {
            id,
            author_id: post.author_id,
            title: post.title,
            content: post.content,
        }
    }

    /// Overwrites every content field. Nothing of the previous content
    /// survives.
    pub fn replace_content(&mut self, post: NewPost) {
        self.author_id = post.author_id;
        self.title = post.title;
        self.content = post.content;
    }
}

/// Takes the content fields of a wire message. The id is ignored.
impl From<Blog> for NewPost {
    fn from(blog: Blog) -> Self {
        Self {
            author_id: blog.author_id,
            title: blog.title,
            content: blog.content,
        }
    }
}

impl From<BlogPost> for Blog {
    fn from(post: BlogPost) -> Self {
        Self {
            id: post.id.to_hex(),
            author_id: post.author_id,
            title: post.title,
            content: post.content,
        }
    }
}

/// Lazily decoded sequence of every stored post. Dropping it releases the
/// underlying cursor.
pub type PostStream = BoxStream<'static, Result<BlogPost>>;

/// Document-store primitives used by the service handler.
///
/// Every failure of the backing store surfaces as
/// [`Error::Storage`](blog_tonic_core::Error::Storage); absence is reported
/// through the return value, never as an error.
#[async_trait::async_trait]
pub trait PostStore: Send + Sync + 'static {
    /// Stores a new post and returns it with the id assigned by the store.
    async fn insert(&self, post: NewPost) -> Result<BlogPost>;

    async fn find_by_id(&self, id: PostId) -> Result<Option<BlogPost>>;

    /// Replaces the whole document stored under `post.id`. Returns `false`
    /// when no document matched.
    async fn replace_by_id(&self, post: &BlogPost) -> Result<bool>;

    /// Returns `false` when no document was removed.
    async fn delete_by_id(&self, id: PostId) -> Result<bool>;

    /// Opens a cursor over the whole collection.
    async fn find_all(&self) -> Result<PostStream>;
}

/// Builds the store selected by `config`.
///
/// For MongoDB this establishes and verifies the connection, bounded by
/// [`ServerConfig::connect_timeout`].
pub async fn connect(config: &ServerConfig) -> anyhow::Result<Arc<dyn PostStore>> {
    let store: Arc<dyn PostStore> = match config.storage {
        StorageBackend::Mongo => Arc::new(mongo::MongoStore::connect(config).await?),
        StorageBackend::Memory => Arc::new(memory::MemoryStore::new()),
    };
    Ok(store)
}
