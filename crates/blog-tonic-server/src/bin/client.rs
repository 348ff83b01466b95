//! Walks a running `blog-tonic-server` through every RPC: create a post, read
//! it back, update it, list the collection, then delete the post again.

use anyhow::Context;
use blog_tonic_core::proto::{
    Blog, CreateBlogRequest, DeleteBlogRequest, GetBlogRequest, ListBlogRequest,
    UpdateBlogRequest, blog_service_client::BlogServiceClient,
};
use clap::Parser;
use tokio_stream::StreamExt;
use tonic::{codec::CompressionEncoding, transport::Channel};

#[derive(Parser, Debug)]
#[command(
    name = "blog-tonic-client",
    version,
    about = "Exercises every RPC of a running blog service"
)]
struct ClientArgs {
    /// Server endpoint.
    ///
    /// Environment variable: `BLOG_SERVER_ADDR`
    #[arg(long, env = "BLOG_SERVER_ADDR", default_value_t = String::from("http://127.0.0.1:50051"))]
    addr: String,

    /// Compress requests with zstd.
    #[arg(long, default_value_t = false)]
    zstd: bool,

    /// Keep the created post instead of deleting it at the end.
    #[arg(long, default_value_t = false)]
    keep: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let args = ClientArgs::parse();

    let channel = Channel::from_shared(args.addr.clone())
        .context("invalid server address")?
        .connect()
        .await
        .with_context(|| format!("could not connect to {}", args.addr))?;
    let mut client = BlogServiceClient::new(channel);
    if args.zstd {
        client = client
            .send_compressed(CompressionEncoding::Zstd)
            .accept_compressed(CompressionEncoding::Zstd);
    }

    println!("Creating a blog post...");
    let created = client
        .create_blog(CreateBlogRequest {
            blog: Some(Blog {
                id: String::new(),
                author_id: "Ada".into(),
                title: "Notes on the Analytical Engine".into(),
                content: "The engine weaves algebraic patterns.".into(),
            }),
        })
        .await
        .context("CreateBlog failed")?
        .into_inner()
        .blog
        .context("CreateBlog returned no blog")?;
    println!("Created: {created:?}");

    println!("Reading it back...");
    let read = client
        .get_blog(GetBlogRequest {
            blog_id: created.id.clone(),
        })
        .await
        .context("GetBlog failed")?
        .into_inner();
    println!("Read: {:?}", read.blog);

    println!("Updating it...");
    let updated = client
        .update_blog(UpdateBlogRequest {
            blog: Some(Blog {
                id: created.id.clone(),
                author_id: "Ada Lovelace".into(),
                title: "Sketch of the Analytical Engine".into(),
                content: "With notes by the translator.".into(),
            }),
        })
        .await
        .context("UpdateBlog failed")?
        .into_inner();
    println!("Updated: {:?}", updated.blog);

    println!("Listing all blog posts...");
    let mut stream = client
        .list_blog(ListBlogRequest {})
        .await
        .context("ListBlog failed")?
        .into_inner();
    let mut listed = 0;
    while let Some(item) = stream.next().await {
        let item = item.context("ListBlog stream failed")?;
        listed += 1;
        println!("  {:?}", item.blog);
    }
    println!("Listed {listed} posts");

    if !args.keep {
        println!("Deleting it...");
        let deleted = client
            .delete_blog(DeleteBlogRequest {
                blog_id: created.id.clone(),
            })
            .await
            .context("DeleteBlog failed")?
            .into_inner();
        println!("Deleted: {}", deleted.blog_id);

        match client
            .get_blog(GetBlogRequest {
                blog_id: created.id,
            })
            .await
        {
            Err(status) => println!("Read after delete: {:?}", status.code()),
            Ok(resp) => anyhow::bail!("post survived deletion: {:?}", resp.into_inner()),
        }
    }

    Ok(())
}
