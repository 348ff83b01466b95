use anyhow::bail;
use clap::{Parser, ValueEnum};
use core::time::Duration;

/// Backing store for blog posts.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    /// A MongoDB collection (production).
    Mongo,
    /// A process-local map. Contents are lost on exit.
    Memory,
}

/// Runtime configuration for the `blog-tonic-server` binary.
///
/// All values are parsed from CLI arguments or environment variables (a `.env`
/// file is honored). The defaults reproduce a single local deployment: the
/// service on `0.0.0.0:50051` backed by the `blog` collection of the `mydb`
/// database on `mongodb://localhost:27017`.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "blog-tonic-server",
    version,
    about = "A gRPC service for blog posts backed by MongoDB"
)]
pub struct CliArgs {
    /// Address to listen on (TCP or Unix socket path; use --uds for Unix socket).
    ///
    /// Example: "0.0.0.0:50051" or "/tmp/blog-uds.sock"
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("0.0.0.0:50051"))]
    pub server_addr: String,

    /// Listen on a Unix socket instead of TCP. If set, `SERVER_ADDR` must be a file path.
    #[arg(short, long, default_value_t = false)]
    pub uds: bool,

    /// Where posts are stored.
    ///
    /// Environment variable: `STORAGE`
    #[arg(long, env = "STORAGE", value_enum, default_value_t = StorageBackend::Mongo)]
    pub storage: StorageBackend,

    /// MongoDB connection string.
    ///
    /// Environment variable: `MONGODB_URI`
    #[arg(long, env = "MONGODB_URI", default_value_t = String::from("mongodb://localhost:27017"))]
    pub mongodb_uri: String,

    /// Database holding the posts collection.
    ///
    /// Environment variable: `MONGODB_DATABASE`
    #[arg(long, env = "MONGODB_DATABASE", default_value_t = String::from("mydb"))]
    pub mongodb_database: String,

    /// Collection holding one document per post.
    ///
    /// Environment variable: `MONGODB_COLLECTION`
    #[arg(long, env = "MONGODB_COLLECTION", default_value_t = String::from("blog"))]
    pub mongodb_collection: String,

    /// Upper bound (in seconds) on establishing the initial store connection.
    /// Startup fails if the store cannot be reached in time.
    ///
    /// Environment variable: `CONNECT_TIMEOUT_SECS`
    #[arg(long, env = "CONNECT_TIMEOUT_SECS", default_value_t = 20)]
    pub connect_timeout_secs: u64,

    /// Capacity of the buffer between the store cursor and a `ListBlog`
    /// response stream.
    ///
    /// Lower values keep fewer decoded posts in memory per slow client; higher
    /// values let the cursor run ahead of the client.
    ///
    /// Environment variable: `STREAM_BUFFER_SIZE`
    #[arg(long, env = "STREAM_BUFFER_SIZE", default_value_t = 16)]
    pub stream_buffer_size: usize,

    /// Seconds to wait for in-flight `ListBlog` streams to finish on shutdown
    /// before they are cancelled.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT`
    #[arg(long, env = "SHUTDOWN_TIMEOUT", default_value_t = 5)]
    pub shutdown_timeout: u64,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub server_addr: String,
    pub uds: bool,
    pub storage: StorageBackend,
    pub mongodb_uri: String,
    pub mongodb_database: String,
    pub mongodb_collection: String,
    pub connect_timeout: Duration,
    pub stream_buffer_size: usize,
    pub shutdown_timeout: Duration,
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.mongodb_database.trim().is_empty() {
            bail!("MONGODB_DATABASE must not be empty");
        }

        if args.mongodb_collection.trim().is_empty() {
            bail!("MONGODB_COLLECTION must not be empty");
        }

        if args.connect_timeout_secs == 0 {
            bail!("CONNECT_TIMEOUT_SECS must be greater than 0");
        }

        if args.stream_buffer_size == 0 {
            bail!("STREAM_BUFFER_SIZE must be greater than 0");
        }

        Ok(Self {
            server_addr: args.server_addr,
            uds: args.uds,
            storage: args.storage,
            mongodb_uri: args.mongodb_uri,
            mongodb_database: args.mongodb_database,
            mongodb_collection: args.mongodb_collection,
            connect_timeout: Duration::from_secs(args.connect_timeout_secs),
            stream_buffer_size: args.stream_buffer_size,
            shutdown_timeout: Duration::from_secs(args.shutdown_timeout),
        })
    }
}

impl ServerConfig {
    /// Configuration for an in-memory store, used by tests.
    #[cfg(test)]
    pub fn in_memory() -> Self {
        Self::try_from(CliArgs::parse_from(["blog-tonic-server", "--storage", "memory"]))
            .expect("default config is valid")
    }
}
