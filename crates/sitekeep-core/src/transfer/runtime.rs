use std::sync::LazyLock;

/// Shared tokio runtime for bridging the synchronous pipeline onto the
/// async SSH/SFTP client.
pub static ASYNC_RUNTIME: LazyLock<tokio::runtime::Runtime> = LazyLock::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("failed to initialize async runtime")
});
