use clap::Parser;
use dotenv::dotenv;
use pg_graphql_gateway::{Gateway, GatewayOptions};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() {
    dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let opts = GatewayOptions::parse();

    tracing::info!("Configuration:");
    tracing::info!("  Database URL: {}", sensitive_url(&opts.database_url));
    tracing::info!("  Schemas: {}", opts.schemas.join(","));
    tracing::info!("  Secret: {}", if opts.secret.is_some() { "set" } else { "unset" });
    tracing::info!("  Listen: {}:{}", opts.host, opts.port);
    tracing::info!("  Max Connections: {}", opts.max_connections);
    tracing::info!("  Default Role: {:?}", opts.default_role);
    tracing::info!("  Credential Setting: {}", opts.credential_setting);
    tracing::info!("  Static Settings: {}", opts.settings.len());
    tracing::info!("  Header Settings: {}", opts.header_settings.len());

    let gateway = Gateway::new(opts);
    if let Err(err) = gateway.run().await {
        tracing::error!("Gateway failed: {:#}", err);
        std::process::exit(1);
    }
}

fn sensitive_url(url: &str) -> String {
    if let Some(auth_start) = url.find("://") {
        if let Some(auth_end) = url[auth_start + 3..].find('@') {
            let prefix = &url[0..auth_start + 3];
            let suffix = &url[auth_start + 3 + auth_end..];
            return format!("{}***REDACTED***{}", prefix, suffix);
        }
    }
    url.to_string()
}
