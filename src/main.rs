use compression_service::auth::TokenService;
use compression_service::compression::{
    ArtifactProcessor, HybridBackend, LocalImageBackend, RemotePdfBackend,
};
use compression_service::config::Config;
use compression_service::pipeline::UploadPipeline;
use compression_service::storage::{CredentialStore, JsonCredentialStore};
use compression_service::{router, AppState};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::from_env();

    let store: Arc<dyn CredentialStore> = Arc::new(
        JsonCredentialStore::new(config.users_file.clone()).expect("Failed to initialize storage"),
    );

    let backend = HybridBackend::new(
        LocalImageBackend::new(config.output_dir.clone()),
        RemotePdfBackend::new(
            config.pdf_api_url.clone(),
            config.pdf_api_key.clone(),
            Duration::from_secs(config.remote_timeout_secs),
        )
        .expect("Failed to initialize PDF backend"),
    );
    let processor = ArtifactProcessor::new(Arc::new(backend));
    let pipeline = UploadPipeline::new(processor, store.clone());
    let tokens = TokenService::new(&config);

    let bind_addr = config.bind_addr.clone();
    let state = Arc::new(AppState {
        config,
        store,
        tokens,
        pipeline,
    });

    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("Failed to bind listener");

    println!("🚀 Compression service running on http://{bind_addr}");
    println!("📋 Endpoints:");
    println!("   POST   /user/register      - Create an account");
    println!("   POST   /user/login         - Log in, receive token pair");
    println!("   POST   /user/logout        - Log out (auth)");
    println!("   POST   /user/refresh-token - Rotate token pair");
    println!("   GET    /user/profile       - Display name (auth)");
    println!("   GET    /user/getlinks      - Compression history (auth)");
    println!("   DELETE /user/links/:id     - Delete a history entry (auth)");
    println!("   POST   /image/optimize-img - Compress image(s)");
    println!("   POST   /pdf/compress-pdf   - Compress a PDF");

    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}
