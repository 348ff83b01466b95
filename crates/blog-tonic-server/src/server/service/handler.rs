//! gRPC service implementation for blog posts.
//!
//! This module defines [`PostService`], the concrete implementation of the
//! [`BlogService`] gRPC service defined in the protobuf schema. Each RPC parses
//! the incoming identifier, performs one or two [`PostStore`] calls and shapes
//! the result or error into the typed response.
//!
//! ## Responsibilities
//!
//! - Translate between wire messages and stored posts.
//! - Classify failures: malformed id, missing post, storage failure.
//! - Stream `ListBlog` results from a store cursor via [`forward_posts`].
//! - Refuse work and drain open streams during shutdown.

use crate::server::{
    config::ServerConfig,
    storage::{NewPost, PostStore},
    streaming::{coordinator::forward_posts, tracker::StreamTracker},
    telemetry::{
        increment_errors, increment_posts_streamed, increment_requests, record_stream_duration,
    },
};
use blog_tonic_core::{
    Error,
    proto::{
        Blog, CreateBlogRequest, CreateBlogResponse, DeleteBlogRequest, DeleteBlogResponse,
        GetBlogRequest, GetBlogResponse, ListBlogRequest, ListBlogResponse, UpdateBlogRequest,
        UpdateBlogResponse, blog_service_server::BlogService,
    },
    types::PostId,
};
use core::{future::Future, pin::Pin};
use futures::TryStreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::{Stream, wrappers::ReceiverStream};
use tonic::{Request, Response, Status};

/// gRPC service exposing create, read, update, delete and list over a single
/// collection of blog posts.
///
/// The store is injected once and shared by every request; the service holds
/// no other mutable state apart from the stream tracker used for shutdown.
/// Concurrent writers to the same post are not coordinated: the last write
/// wins.
#[derive(Clone)]
pub struct PostService {
    config: ServerConfig,
    store: Arc<dyn PostStore>,
    streams: Arc<StreamTracker>,
}

impl PostService {
    pub fn new(config: ServerConfig, store: Arc<dyn PostStore>) -> Self {
        let streams = Arc::new(StreamTracker::new(config.shutdown_timeout));
        Self {
            config,
            store,
            streams,
        }
    }

    /// Initiates a graceful shutdown.
    ///
    /// New requests are refused with `UNAVAILABLE`, open `ListBlog` streams get
    /// up to the configured shutdown timeout to finish, and the rest are
    /// cancelled.
    pub async fn shutdown(&self) {
        self.streams.shutdown().await;
    }

    /// Runs one RPC body: counts it, rejects it during shutdown, and converts
    /// its error into a status.
    async fn observe<T>(
        &self,
        method: &'static str,
        body: impl Future<Output = Result<T, Error>>,
    ) -> Result<T, Status> {
        increment_requests(method);

        let result = match self.streams.ensure_accepting() {
            Ok(()) => body.await,
            Err(e) => Err(e),
        };

        result.map_err(|err| {
            #[cfg(feature = "tracing")]
            {
                if matches!(err, Error::Storage { .. } | Error::ChannelError { .. }) {
                    tracing::error!(method, "{err}");
                } else {
                    tracing::debug!(method, "{err}");
                }
            }
            let status = Status::from(err);
            increment_errors(method, &status);
            status
        })
    }

    async fn create(&self, blog: Blog) -> Result<Blog, Error> {
        let post = self.store.insert(NewPost::from(blog)).await?;

        #[cfg(feature = "tracing")]
        tracing::debug!(blog_id = %post.id, "Created blog");

        Ok(Blog::from(post))
    }

    async fn read(&self, blog_id: &str) -> Result<Blog, Error> {
        let id = PostId::parse(blog_id)?;
        self.store
            .find_by_id(id)
            .await?
            .map(Blog::from)
            .ok_or_else(|| Error::NotFound { id: id.to_hex() })
    }

    /// Read-then-replace. Every content field comes from `blog`; nothing is
    /// merged with the stored version.
    async fn update(&self, blog: Blog) -> Result<Blog, Error> {
        let id = PostId::parse(&blog.id)?;
        let not_found = || Error::NotFound { id: id.to_hex() };

        let mut post = self.store.find_by_id(id).await?.ok_or_else(not_found)?;
        post.replace_content(NewPost::from(blog));

        // The post may have been deleted between the read and the write.
        if !self.store.replace_by_id(&post).await? {
            return Err(not_found());
        }

        Ok(Blog::from(post))
    }

    async fn delete(&self, blog_id: String) -> Result<String, Error> {
        let id = PostId::parse(&blog_id)?;
        if self.store.delete_by_id(id).await? {
            Ok(blog_id)
        } else {
            Err(Error::NotFound { id: id.to_hex() })
        }
    }
}

#[tonic::async_trait]
impl BlogService for PostService {
    type ListBlogStream = Pin<Box<dyn Stream<Item = Result<ListBlogResponse, Status>> + Send>>;

    /// Stores a new post; the server assigns its id. A missing `blog` message
    /// creates a post with empty fields.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    async fn create_blog(
        &self,
        req: Request<CreateBlogRequest>,
    ) -> Result<Response<CreateBlogResponse>, Status> {
        let blog = req.into_inner().blog.unwrap_or_default();
        let blog = self.observe("CreateBlog", self.create(blog)).await?;
        Ok(Response::new(CreateBlogResponse { blog: Some(blog) }))
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(blog_id = %req.get_ref().blog_id)))]
    async fn get_blog(
        &self,
        req: Request<GetBlogRequest>,
    ) -> Result<Response<GetBlogResponse>, Status> {
        let blog = self
            .observe("GetBlog", self.read(&req.get_ref().blog_id))
            .await?;
        Ok(Response::new(GetBlogResponse { blog: Some(blog) }))
    }

    /// Replaces all three content fields of an existing post. A missing
    /// `blog` message carries an empty id and is rejected as malformed.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    async fn update_blog(
        &self,
        req: Request<UpdateBlogRequest>,
    ) -> Result<Response<UpdateBlogResponse>, Status> {
        let blog = req.into_inner().blog.unwrap_or_default();
        let blog = self.observe("UpdateBlog", self.update(blog)).await?;
        Ok(Response::new(UpdateBlogResponse { blog: Some(blog) }))
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(blog_id = %req.get_ref().blog_id)))]
    async fn delete_blog(
        &self,
        req: Request<DeleteBlogRequest>,
    ) -> Result<Response<DeleteBlogResponse>, Status> {
        let blog_id = req.into_inner().blog_id;
        let blog_id = self.observe("DeleteBlog", self.delete(blog_id)).await?;
        Ok(Response::new(DeleteBlogResponse { blog_id }))
    }

    /// Streams every stored post.
    ///
    /// The cursor is opened before the response starts, so a store failure at
    /// that point is returned as a plain `INTERNAL` status. Afterwards posts are
    /// forwarded one at a time by a background task; a cursor or decode error
    /// ends the stream with `INTERNAL`, and a client disconnect or shutdown
    /// closes the cursor.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    async fn list_blog(
        &self,
        _req: Request<ListBlogRequest>,
    ) -> Result<Response<Self::ListBlogStream>, Status> {
        let start = std::time::Instant::now();

        let (guard, posts) = self
            .observe("ListBlog", async {
                let guard = self.streams.begin()?;
                let posts = self.store.find_all().await?;
                Ok::<_, Error>((guard, posts))
            })
            .await?;

        let (resp_tx, resp_rx) =
            mpsc::channel::<Result<ListBlogResponse, Status>>(self.config.stream_buffer_size);
        let shutdown = self.streams.cancellation();

        let fut = async move {
            // Held until the cursor is released.
            let _guard = guard;
            match forward_posts(posts, resp_tx, shutdown).await {
                Ok(_count) => {
                    record_stream_duration(start.elapsed().as_millis() as f64);
                    #[cfg(feature = "tracing")]
                    tracing::debug!("Streamed {} posts", _count);
                }
                Err(e) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!("Stream ended early: {}", e);
                    increment_errors("ListBlog", &Status::from(e));
                }
            }
        };
        #[cfg(feature = "tracing")]
        let fut = {
            use tracing::Instrument;
            let span = tracing::info_span!("streaming");
            fut.instrument(span)
        };

        tokio::spawn(fut);

        let stream = ReceiverStream::new(resp_rx).inspect_ok(|_| increment_posts_streamed(1));

        Ok(Response::new(Box::pin(stream)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::storage::{BlogPost, PostStream, memory::MemoryStore};
    use blog_tonic_core::proto::blog_service_client::BlogServiceClient;
    use futures::StreamExt;
    use std::collections::HashSet;
    use tokio::net::TcpListener;
    use tokio_stream::wrappers::TcpListenerStream;
    use tonic::{Code, transport::Server};

    fn service() -> PostService {
        PostService::new(ServerConfig::in_memory(), Arc::new(MemoryStore::new()))
    }

    fn blog(author: &str, title: &str, content: &str) -> Blog {
        Blog {
            id: String::new(),
            author_id: author.into(),
            title: title.into(),
            content: content.into(),
        }
    }

    async fn create(svc: &PostService, blog: Blog) -> Blog {
        svc.create_blog(Request::new(CreateBlogRequest { blog: Some(blog) }))
            .await
            .unwrap()
            .into_inner()
            .blog
            .unwrap()
    }

    async fn read(svc: &PostService, blog_id: &str) -> Result<Blog, Status> {
        svc.get_blog(Request::new(GetBlogRequest {
            blog_id: blog_id.into(),
        }))
        .await
        .map(|resp| resp.into_inner().blog.unwrap())
    }

    async fn update(svc: &PostService, blog: Option<Blog>) -> Result<Blog, Status> {
        svc.update_blog(Request::new(UpdateBlogRequest { blog }))
            .await
            .map(|resp| resp.into_inner().blog.unwrap())
    }

    async fn delete(svc: &PostService, blog_id: &str) -> Result<String, Status> {
        svc.delete_blog(Request::new(DeleteBlogRequest {
            blog_id: blog_id.into(),
        }))
        .await
        .map(|resp| resp.into_inner().blog_id)
    }

    async fn list(svc: &PostService) -> Vec<Result<ListBlogResponse, Status>> {
        svc.list_blog(Request::new(ListBlogRequest {}))
            .await
            .unwrap()
            .into_inner()
            .collect()
            .await
    }

    /// Store whose cursor yields one post and then fails, and whose other
    /// operations always fail.
    struct BrokenStore;

    #[async_trait::async_trait]
    impl PostStore for BrokenStore {
        async fn insert(&self, _post: NewPost) -> blog_tonic_core::Result<BlogPost> {
            Err(Error::storage("connection refused"))
        }

        async fn find_by_id(&self, _id: PostId) -> blog_tonic_core::Result<Option<BlogPost>> {
            Err(Error::storage("connection refused"))
        }

        async fn replace_by_id(&self, _post: &BlogPost) -> blog_tonic_core::Result<bool> {
            Err(Error::storage("connection refused"))
        }

        async fn delete_by_id(&self, _id: PostId) -> blog_tonic_core::Result<bool> {
            Err(Error::storage("connection refused"))
        }

        async fn find_all(&self) -> blog_tonic_core::Result<PostStream> {
            let first = BlogPost::from_new(PostId::new(), NewPost::default());
            Ok(futures::stream::iter(vec![
                Ok(first),
                Err(Error::storage("error while decoding data")),
            ])
            .boxed())
        }
    }

    #[tokio::test]
    async fn create_assigns_distinct_well_formed_ids() {
        let svc = service();
        let mut ids = HashSet::new();
        for i in 0..16 {
            let mut input = blog("A", "T", "C");
            input.id = format!("client supplied {i}");
            let created = create(&svc, input).await;

            assert!(PostId::parse(&created.id).is_ok());
            assert!(ids.insert(created.id));
        }
    }

    #[tokio::test]
    async fn read_after_create_returns_identical_fields() {
        let svc = service();
        let created = create(&svc, blog("A", "T", "C")).await;

        let fetched = read(&svc, &created.id).await.unwrap();
        assert_eq!(fetched, created);
        assert_eq!(fetched.author_id, "A");
        assert_eq!(fetched.title, "T");
        assert_eq!(fetched.content, "C");
    }

    #[tokio::test]
    async fn create_without_blog_stores_empty_post() {
        let svc = service();
        let created = svc
            .create_blog(Request::new(CreateBlogRequest { blog: None }))
            .await
            .unwrap()
            .into_inner()
            .blog
            .unwrap();

        assert_eq!(read(&svc, &created.id).await.unwrap(), created);
        assert_eq!(created.title, "");
    }

    #[tokio::test]
    async fn read_rejects_malformed_and_unknown_ids() {
        let svc = service();
        create(&svc, blog("A", "T", "C")).await;

        let malformed = read(&svc, "not-an-id").await.unwrap_err();
        assert_eq!(malformed.code(), Code::InvalidArgument);

        let unknown = read(&svc, &PostId::new().to_hex()).await.unwrap_err();
        assert_eq!(unknown.code(), Code::NotFound);
    }

    #[tokio::test]
    async fn update_replaces_all_content_fields() {
        let svc = service();
        let created = create(&svc, blog("A", "T", "C")).await;

        let mut replacement = blog("B", "New title", "");
        replacement.id = created.id.clone();
        let updated = update(&svc, Some(replacement.clone())).await.unwrap();
        assert_eq!(updated, replacement);

        let fetched = read(&svc, &created.id).await.unwrap();
        assert_eq!(fetched.author_id, "B");
        assert_eq!(fetched.title, "New title");
        assert_eq!(fetched.content, "");
    }

    #[tokio::test]
    async fn update_classifies_bad_ids() {
        let svc = service();

        let mut malformed = blog("A", "T", "C");
        malformed.id = "xyz".into();
        assert_eq!(
            update(&svc, Some(malformed)).await.unwrap_err().code(),
            Code::InvalidArgument
        );

        assert_eq!(
            update(&svc, None).await.unwrap_err().code(),
            Code::InvalidArgument
        );

        let mut unknown = blog("A", "T", "C");
        unknown.id = PostId::new().to_hex();
        assert_eq!(
            update(&svc, Some(unknown)).await.unwrap_err().code(),
            Code::NotFound
        );
    }

    #[tokio::test]
    async fn create_delete_read_scenario() {
        let svc = service();
        let created = create(&svc, blog("A", "T", "C")).await;
        assert_eq!(
            (created.author_id.as_str(), created.title.as_str(), created.content.as_str()),
            ("A", "T", "C")
        );

        assert_eq!(delete(&svc, &created.id).await.unwrap(), created.id);
        assert_eq!(
            read(&svc, &created.id).await.unwrap_err().code(),
            Code::NotFound
        );
        assert_eq!(
            delete(&svc, &created.id).await.unwrap_err().code(),
            Code::NotFound
        );
        assert_eq!(
            delete(&svc, "12345").await.unwrap_err().code(),
            Code::InvalidArgument
        );
    }

    #[tokio::test]
    async fn list_returns_every_post_once() {
        let svc = service();
        assert!(list(&svc).await.is_empty());

        let mut expected = HashSet::new();
        for title in ["one", "two", "three"] {
            expected.insert(create(&svc, blog("A", title, "C")).await.id);
        }
        let removed = create(&svc, blog("A", "gone", "C")).await;
        delete(&svc, &removed.id).await.unwrap();

        let listed: Vec<Blog> = list(&svc)
            .await
            .into_iter()
            .map(|item| item.unwrap().blog.unwrap())
            .collect();
        let listed_ids: HashSet<_> = listed.iter().map(|b| b.id.clone()).collect();
        assert_eq!(listed.len(), 3);
        assert_eq!(listed_ids, expected);
    }

    #[tokio::test]
    async fn storage_failures_are_internal() {
        let svc = PostService::new(ServerConfig::in_memory(), Arc::new(BrokenStore));

        let err = svc
            .create_blog(Request::new(CreateBlogRequest {
                blog: Some(blog("A", "T", "C")),
            }))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::Internal);
        assert!(err.message().contains("connection refused"));

        let id = PostId::new().to_hex();
        assert_eq!(read(&svc, &id).await.unwrap_err().code(), Code::Internal);
        assert_eq!(delete(&svc, &id).await.unwrap_err().code(), Code::Internal);
        // Parsing happens before any store access.
        assert_eq!(
            read(&svc, "bad").await.unwrap_err().code(),
            Code::InvalidArgument
        );
    }

    /// Store that reads from memory but whose writes either fail outright or
    /// match nothing, as if the post vanished between read and write.
    struct FailingWrites {
        inner: MemoryStore,
        write_error: bool,
    }

    impl FailingWrites {
        fn new(write_error: bool) -> Self {
            Self {
                inner: MemoryStore::new(),
                write_error,
            }
        }

        fn outcome(&self) -> blog_tonic_core::Result<bool> {
            if self.write_error {
                Err(Error::storage("write concern timed out"))
            } else {
                Ok(false)
            }
        }
    }

    #[async_trait::async_trait]
    impl PostStore for FailingWrites {
        async fn insert(&self, post: NewPost) -> blog_tonic_core::Result<BlogPost> {
            self.inner.insert(post).await
        }

        async fn find_by_id(&self, id: PostId) -> blog_tonic_core::Result<Option<BlogPost>> {
            self.inner.find_by_id(id).await
        }

        async fn replace_by_id(&self, _post: &BlogPost) -> blog_tonic_core::Result<bool> {
            self.outcome()
        }

        async fn delete_by_id(&self, _id: PostId) -> blog_tonic_core::Result<bool> {
            self.outcome()
        }

        async fn find_all(&self) -> blog_tonic_core::Result<PostStream> {
            self.inner.find_all().await
        }
    }

    #[tokio::test]
    async fn failed_writes_are_internal() {
        let svc = PostService::new(ServerConfig::in_memory(), Arc::new(FailingWrites::new(true)));
        let mut created = create(&svc, blog("A", "T", "C")).await;

        created.title = "New title".into();
        let err = update(&svc, Some(created.clone())).await.unwrap_err();
        assert_eq!(err.code(), Code::Internal);
        assert!(err.message().contains("write concern timed out"));

        assert_eq!(
            delete(&svc, &created.id).await.unwrap_err().code(),
            Code::Internal
        );
        // The stored post is untouched.
        assert_eq!(read(&svc, &created.id).await.unwrap().title, "T");
    }

    #[tokio::test]
    async fn update_of_post_deleted_mid_write_is_not_found() {
        let svc = PostService::new(ServerConfig::in_memory(), Arc::new(FailingWrites::new(false)));
        let mut created = create(&svc, blog("A", "T", "C")).await;

        created.content = "changed".into();
        assert_eq!(
            update(&svc, Some(created)).await.unwrap_err().code(),
            Code::NotFound
        );
    }

    #[tokio::test]
    async fn list_error_terminates_stream() {
        let svc = PostService::new(ServerConfig::in_memory(), Arc::new(BrokenStore));

        let items = list(&svc).await;
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert_eq!(items[1].as_ref().unwrap_err().code(), Code::Internal);
    }

    #[tokio::test]
    async fn requests_after_shutdown_are_unavailable() {
        let svc = service();
        let created = create(&svc, blog("A", "T", "C")).await;
        svc.shutdown().await;

        assert_eq!(
            read(&svc, &created.id).await.unwrap_err().code(),
            Code::Unavailable
        );
        let err = svc
            .list_blog(Request::new(ListBlogRequest {}))
            .await
            .err()
            .unwrap();
        assert_eq!(err.code(), Code::Unavailable);
    }

    #[tokio::test]
    async fn serves_crud_over_grpc() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(
            Server::builder()
                .add_service(crate::build_blog_service(service()))
                .serve_with_incoming(TcpListenerStream::new(listener)),
        );

        let mut client = BlogServiceClient::connect(format!("http://{addr}"))
            .await
            .unwrap();

        let created = client
            .create_blog(CreateBlogRequest {
                blog: Some(blog("A", "T", "C")),
            })
            .await
            .unwrap()
            .into_inner()
            .blog
            .unwrap();
        create_and_list_over_wire(&mut client, &created).await;

        let deleted = client
            .delete_blog(DeleteBlogRequest {
                blog_id: created.id.clone(),
            })
            .await
            .unwrap()
            .into_inner();
        assert_eq!(deleted.blog_id, created.id);

        let err = client
            .get_blog(GetBlogRequest {
                blog_id: created.id.clone(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::NotFound);
    }

    async fn create_and_list_over_wire(
        client: &mut BlogServiceClient<tonic::transport::Channel>,
        created: &Blog,
    ) {
        let fetched = client
            .get_blog(GetBlogRequest {
                blog_id: created.id.clone(),
            })
            .await
            .unwrap()
            .into_inner()
            .blog
            .unwrap();
        assert_eq!(&fetched, created);

        let listed: Vec<ListBlogResponse> = client
            .list_blog(ListBlogRequest {})
            .await
            .unwrap()
            .into_inner()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].blog.as_ref(), Some(created));
    }
}
