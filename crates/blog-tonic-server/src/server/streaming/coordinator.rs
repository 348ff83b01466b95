use crate::server::storage::PostStream;
use blog_tonic_core::{
    Error,
    proto::{Blog, ListBlogResponse},
};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tonic::Status;

/// Drains a store cursor into a `ListBlog` response channel.
///
/// Each post is decoded and forwarded as soon as the cursor yields it, so the
/// client observes the collection incrementally and at most the channel's
/// capacity of posts is buffered at once.
///
/// # Arguments
///
/// - `posts`: Cursor over the collection. It is owned here and dropped on
///   every return path, which releases it on the store side.
/// - `resp_tx`: Channel feeding the gRPC response stream.
/// - `shutdown`: Cancelled when the service stops waiting for open streams.
///
/// # Behavior
///
/// - Returns the number of posts forwarded once the cursor is exhausted.
/// - A cursor or decode error is forwarded as a terminal status, after which
///   nothing else is sent.
/// - Exits as soon as the client disconnects, even while waiting on the
///   cursor.
/// - On shutdown, makes a best effort to tell the client before exiting.
pub async fn forward_posts(
    mut posts: PostStream,
    resp_tx: mpsc::Sender<Result<ListBlogResponse, Status>>,
    shutdown: CancellationToken,
) -> blog_tonic_core::Result<usize> {
    let mut forwarded = 0;

    loop {
        let next = tokio::select! {
            biased;
            () = shutdown.cancelled() => {
                let err = Error::ServiceShutdown;
                if let Err(_e) = resp_tx.send(Err(err.clone().into())).await {
                    #[cfg(feature = "tracing")]
                    tracing::debug!("Failed to forward shutdown: {}", _e);
                }
                return Err(err);
            }
            () = resp_tx.closed() => {
                return Err(Error::ChannelError {
                    context: format!("client disconnected after {forwarded} posts"),
                });
            }
            next = posts.next() => next,
        };

        match next {
            Some(Ok(post)) => {
                let msg = ListBlogResponse {
                    blog: Some(Blog::from(post)),
                };
                if let Err(e) = resp_tx.send(Ok(msg)).await {
                    return Err(Error::ChannelError {
                        context: format!("Failed to forward post: {e}"),
                    });
                }
                forwarded += 1;
            }
            Some(Err(e)) => {
                // Best effort: the client may already be gone, in which case
                // the original error is still reported upstream.
                if let Err(_e) = resp_tx.send(Err(e.clone().into())).await {
                    #[cfg(feature = "tracing")]
                    tracing::warn!("Failed to forward err: {}", _e);
                }
                return Err(e);
            }
            None => return Ok(forwarded),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::storage::{BlogPost, NewPost};
    use blog_tonic_core::types::PostId;
    use core::pin::Pin;
    use core::sync::atomic::{AtomicBool, Ordering};
    use core::task::{Context, Poll};
    use std::sync::Arc;
    use tonic::Code;

    fn post(title: &str) -> BlogPost {
        BlogPost::from_new(
            PostId::new(),
            NewPost {
                title: title.into(),
                ..NewPost::default()
            },
        )
    }

    /// A cursor that never yields, like a slow store. Flags when dropped.
    struct PendingCursor {
        dropped: Arc<AtomicBool>,
    }

    impl futures::Stream for PendingCursor {
        type Item = blog_tonic_core::Result<BlogPost>;

        fn poll_next(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
            Poll::Pending
        }
    }

    impl Drop for PendingCursor {
        fn drop(&mut self) {
            self.dropped.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn forwards_every_post_then_closes() {
        let posts = futures::stream::iter(vec![Ok(post("a")), Ok(post("b"))]).boxed();
        let (tx, mut rx) = mpsc::channel(4);

        let forwarded = forward_posts(posts, tx, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(forwarded, 2);

        let mut titles = Vec::new();
        while let Some(msg) = rx.recv().await {
            titles.push(msg.unwrap().blog.unwrap().title);
        }
        assert_eq!(titles, ["a", "b"]);
    }

    #[tokio::test]
    async fn cursor_error_terminates_stream() {
        let posts = futures::stream::iter(vec![
            Ok(post("a")),
            Err(Error::storage("decode failure")),
            Ok(post("never sent")),
        ])
        .boxed();
        let (tx, mut rx) = mpsc::channel(4);

        let result = forward_posts(posts, tx, CancellationToken::new()).await;
        assert!(matches!(result, Err(Error::Storage { .. })));

        assert!(rx.recv().await.unwrap().is_ok());
        assert_eq!(rx.recv().await.unwrap().unwrap_err().code(), Code::Internal);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn client_disconnect_releases_cursor() {
        let dropped = Arc::new(AtomicBool::new(false));
        let posts = PendingCursor {
            dropped: Arc::clone(&dropped),
        }
        .boxed();
        let (tx, rx) = mpsc::channel(1);

        let task = tokio::spawn(forward_posts(posts, tx, CancellationToken::new()));
        drop(rx);

        let result = task.await.unwrap();
        assert!(matches!(result, Err(Error::ChannelError { .. })));
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn shutdown_stops_stream_with_unavailable() {
        let posts = futures::stream::pending().boxed();
        let (tx, mut rx) = mpsc::channel(1);
        let token = CancellationToken::new();
        token.cancel();

        let result = forward_posts(posts, tx, token).await;
        assert_eq!(result, Err(Error::ServiceShutdown));
        assert_eq!(rx.recv().await.unwrap().unwrap_err().code(), Code::Unavailable);
    }
}
