use jsonrpc2_transport::{
    calculator,
    config::{Config, Transport},
    logging, CallContext, HttpServer, Server, StdioServer, TcpServer,
};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_logging();

    let config = Config::from_env()?;
    let ctx = CallContext::background();

    let shutdown = ctx.clone();
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for ctrl-c");
            return;
        }
        info!("shutdown requested");
        shutdown.cancel();
    });

    info!(transport = %config.transport, "server starting");

    match config.transport {
        Transport::Http => {
            let mut server = HttpServer::bind(config.bind_socket()?, config.rpc_path.clone()).await?;
            calculator::register_methods(&mut server);
            info!(
                bind_addr = %config.bind_addr,
                bind_port = config.bind_port,
                path = %config.rpc_path,
                "serving json-rpc over http"
            );
            server.run(ctx).await?;
        }
        Transport::Tcp => {
            let mut server = TcpServer::bind(config.bind_socket()?).await?;
            calculator::register_methods(&mut server);
            info!(
                bind_addr = %config.bind_addr,
                bind_port = config.bind_port,
                "serving json-rpc over tcp"
            );
            server.run(ctx).await?;
        }
        Transport::Stdio => {
            let mut server = StdioServer::new();
            calculator::register_methods(&mut server);
            server.run(ctx).await?;
        }
    }

    Ok(())
}
