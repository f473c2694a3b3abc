mod handlers;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use handlers::AppState;
use std::path::PathBuf;
use std::sync::Arc;
use synthcore::TemplateStore;
use synthruntime::{Config, MemoryTemplateStore};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting dataset workflow server");

    let config_path = std::env::var_os("SYNTH_CONFIG").map(PathBuf::from);
    let config = Config::load(config_path.as_deref())?;

    let templates: Arc<dyn TemplateStore> = match std::env::var_os("SYNTH_TEMPLATES").map(PathBuf::from) {
        Some(path) => Arc::new(MemoryTemplateStore::from_file(&path)?),
        None => Arc::new(MemoryTemplateStore::new()),
    };

    let runtime = synthnodes::build_runtime(&config, templates)?;
    info!(generation_url = %config.generation.base_url, "Runtime initialized");

    let app_state = web::Data::new(AppState {
        runtime: Arc::new(runtime),
    });

    let bind_address = config.server.bind_address.clone();
    info!("Server starting on http://{}", bind_address);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(app_state.clone())
            .app_data(web::JsonConfig::default().limit(4 * 1024 * 1024))
            .wrap(cors)
            .wrap(actix_web::middleware::Logger::default())
            .configure(handlers::configure)
    })
    .bind(&bind_address)?
    .run()
    .await?;

    Ok(())
}
