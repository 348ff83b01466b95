use super::{BlogPost, NewPost, PostStore, PostStream};
use blog_tonic_core::{Result, types::PostId};
use futures::StreamExt;
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// A [`PostStore`] kept in process memory.
///
/// Ids come from the same generator MongoDB drivers use, so they have the same
/// shape as ids issued by [`MongoStore`](super::mongo::MongoStore). Listing
/// works on a snapshot taken when the cursor is opened.
#[derive(Default)]
pub struct MemoryStore {
    posts: RwLock<BTreeMap<PostId, BlogPost>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.posts.read().len()
    }
}

#[async_trait::async_trait]
impl PostStore for MemoryStore {
    async fn insert(&self, post: NewPost) -> Result<BlogPost> {
        let stored = BlogPost::from_new(PostId::new(), post);
        self.posts.write().insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn find_by_id(&self, id: PostId) -> Result<Option<BlogPost>> {
        Ok(self.posts.read().get(&id).cloned())
    }

    async fn replace_by_id(&self, post: &BlogPost) -> Result<bool> {
        let mut posts = self.posts.write();
        match posts.get_mut(&post.id) {
            Some(existing) => {
                *existing = post.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_by_id(&self, id: PostId) -> Result<bool> {
        Ok(self.posts.write().remove(&id).is_some())
    }

    async fn find_all(&self) -> Result<PostStream> {
        let snapshot: Vec<BlogPost> = self.posts.read().values().cloned().collect();
        Ok(futures::stream::iter(snapshot.into_iter().map(Ok)).boxed())
    }
}
