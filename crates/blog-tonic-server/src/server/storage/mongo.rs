use super::{BlogPost, NewPost, PostStore, PostStream};
use crate::server::config::ServerConfig;
use anyhow::Context;
use blog_tonic_core::{Error, Result, types::PostId};
use futures::{StreamExt, TryStreamExt};
use mongodb::{
    Client, Collection,
    bson::{doc, oid::ObjectId},
    options::ClientOptions,
};
use serde::{Deserialize, Serialize};

/// Shape of a post inside the collection.
#[derive(Debug, Serialize, Deserialize)]
struct PostDocument {
    #[serde(rename = "_id")]
    id: ObjectId,
    author_id: String,
    title: String,
    content: String,
}

impl From<PostDocument> for BlogPost {
    fn from(doc: PostDocument) -> Self {
        Self {
            id: PostId::from(doc.id),
            author_id: doc.author_id,
            title: doc.title,
            content: doc.content,
        }
    }
}

impl From<&BlogPost> for PostDocument {
    fn from(post: &BlogPost) -> Self {
        Self {
            id: post.id.object_id(),
            author_id: post.author_id.clone(),
            title: post.title.clone(),
            content: post.content.clone(),
        }
    }
}

/// A [`PostStore`] backed by a MongoDB collection.
///
/// Holds a single [`Client`] for the lifetime of the process. The driver pools
/// connections internally and re-establishes them after transient failures,
/// so a lost connection fails only the requests in flight at that moment.
#[derive(Clone)]
pub struct MongoStore {
    posts: Collection<PostDocument>,
}

impl MongoStore {
    /// Connects to the configured deployment and verifies it answers a `ping`
    /// within [`ServerConfig::connect_timeout`].
    ///
    /// # Errors
    ///
    /// Fails if the URI is malformed, the deadline expires, or the server
    /// rejects the ping.
    pub async fn connect(config: &ServerConfig) -> anyhow::Result<Self> {
        let mut options = ClientOptions::parse(&config.mongodb_uri)
            .await
            .context("invalid MongoDB connection string")?;
        options.app_name = Some(env!("CARGO_PKG_NAME").to_owned());
        options.connect_timeout = Some(config.connect_timeout);
        options.server_selection_timeout = Some(config.connect_timeout);

        let client = Client::with_options(options).context("failed to build MongoDB client")?;
        let database = client.database(&config.mongodb_database);

        tokio::time::timeout(
            config.connect_timeout,
            database.run_command(doc! { "ping": 1 }),
        )
        .await
        .with_context(|| {
            format!(
                "timed out after {:?} connecting to MongoDB",
                config.connect_timeout
            )
        })?
        .context("failed to connect to MongoDB")?;

        #[cfg(feature = "tracing")]
        tracing::info!(
            database = %config.mongodb_database,
            collection = %config.mongodb_collection,
            "Connected to MongoDB"
        );

        Ok(Self {
            posts: database.collection(&config.mongodb_collection),
        })
    }
}

#[async_trait::async_trait]
impl PostStore for MongoStore {
    async fn insert(&self, post: NewPost) -> Result<BlogPost> {
        let inserted = self
            .posts
            .clone_with_type::<NewPost>()
            .insert_one(&post)
            .await
            .map_err(Error::storage)?;

        let oid = inserted.inserted_id.as_object_id().ok_or_else(|| {
            Error::storage(format!(
                "cannot convert inserted id {} to an ObjectId",
                inserted.inserted_id
            ))
        })?;

        Ok(BlogPost::from_new(PostId::from(oid), post))
    }

    async fn find_by_id(&self, id: PostId) -> Result<Option<BlogPost>> {
        let found = self
            .posts
            .find_one(doc! { "_id": id.object_id() })
            .await
            .map_err(Error::storage)?;
        Ok(found.map(BlogPost::from))
    }

    async fn replace_by_id(&self, post: &BlogPost) -> Result<bool> {
        let result = self
            .posts
            .replace_one(doc! { "_id": post.id.object_id() }, PostDocument::from(post))
            .await
            .map_err(Error::storage)?;
        Ok(result.matched_count > 0)
    }

    async fn delete_by_id(&self, id: PostId) -> Result<bool> {
        let result = self
            .posts
            .delete_one(doc! { "_id": id.object_id() })
            .await
            .map_err(Error::storage)?;
        Ok(result.deleted_count > 0)
    }

    async fn find_all(&self) -> Result<PostStream> {
        let cursor = self.posts.find(doc! {}).await.map_err(Error::storage)?;
        Ok(cursor
            .map_ok(BlogPost::from)
            .map_err(Error::storage)
            .boxed())
    }
}
