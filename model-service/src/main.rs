use std::{net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use env_logger::Env;

use model_service::{
    config::Settings, grpc::ModelGrpcServer, router::app_router, service::ModelService,
    state::AppState,
};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init_from_env(Env::default().default_filter_or("info"));

    let settings = Settings::from_env().context("invalid environment")?;
    log::info!("Settings: {:?}", &settings);

    let service = Arc::new(ModelService::from_settings(&settings)?);
    let resumed = service
        .resume_deployments()
        .await
        .context("failed to resume deployments")?;
    log::info!("Resumed {} deployment(s)", resumed);

    let app = app_router(settings.max_upload_bytes)
        .with_state(AppState::shared(Arc::clone(&service)));
    let listen_addr = SocketAddr::from((settings.host, settings.port));
    let grpc_addr = SocketAddr::from((settings.host, settings.grpc_port));

    let http = async {
        log::info!("Listening on {}", listen_addr);
        axum::Server::bind(&listen_addr)
            .serve(app.into_make_service())
            .await
            .context("failed to start axum server")
    };
    let grpc = async move {
        log::info!("Serving gRPC on {}", grpc_addr);
        tonic::transport::Server::builder()
            .add_service(ModelGrpcServer::new(service).into_service())
            .serve(grpc_addr)
            .await
            .context("failed to start gRPC server")
    };
    tokio::try_join!(http, grpc)?;

    Ok(())
}
