//! windrelay server
//!
//! Runs a relay on one address, verifying clients with a shared-secret
//! JWT. Every flag can also be set through the environment.
//!
//! ```text
//! WINDRELAY_JWT_SECRET=... windrelay-server --addr 0.0.0.0:8080
//! ```

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use windrelay::prelude::*;

// =============================================================================
// CLI Arguments
// =============================================================================

/// Real-time relay for multiplayer flight
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// WebSocket bind address
    #[arg(long, env = "WINDRELAY_ADDR", default_value = "0.0.0.0:8080")]
    addr: String,

    /// HMAC secret the identity provider signs tokens with
    #[arg(long, env = "WINDRELAY_JWT_SECRET", hide_env_values = true)]
    jwt_secret: String,

    /// Require this `aud` claim in every token
    #[arg(long, env = "WINDRELAY_JWT_AUDIENCE")]
    jwt_audience: Option<String>,

    /// Interest cell edge length in world units
    #[arg(long, env = "WINDRELAY_CELL_SIZE", default_value_t = 256.0)]
    cell_size: f64,

    /// World seed pushed to clients after they authenticate
    #[arg(long, env = "WINDRELAY_WORLD_SEED", default_value_t = 12345)]
    world_seed: u64,

    /// Refuse a second connection for an already connected identity
    /// instead of replacing the first
    #[arg(long, env = "WINDRELAY_REJECT_DUPLICATES")]
    reject_duplicates: bool,

    /// Log filter (trace, debug, info, warn, error, or a full directive)
    #[arg(long, env = "WINDRELAY_LOG", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "WINDRELAY_LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    init_logging(&args);

    info!("Starting windrelay");
    info!("  Version: {}", env!("CARGO_PKG_VERSION"));
    info!("  Address: {}", args.addr);
    info!("  Cell size: {}", args.cell_size);

    let mut verifier = JwtVerifier::new(&args.jwt_secret).inspect_err(|e| {
        error!(error = %e, "cannot start without a token secret");
    })?;
    if let Some(audience) = &args.jwt_audience {
        verifier = verifier.with_audience(audience);
    }

    let mut config = ServerConfig {
        cell_size: args.cell_size,
        ..ServerConfig::default()
    };
    config.world_seed.seed = args.world_seed;
    if args.reject_duplicates {
        config.duplicate_policy = DuplicateIdentityPolicy::RejectNew;
    }

    let server = WindrelayServer::<JwtVerifier, JsonCodec>::builder()
        .bind(&args.addr)
        .config(config)
        .build(verifier)
        .await?;

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }

    info!("windrelay stopped");
    Ok(())
}

// =============================================================================
// Logging
// =============================================================================

fn init_logging(args: &Args) {
    let filter = EnvFilter::try_new(&args.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let filter = match "tungstenite=warn".parse::<Directive>() {
        Ok(directive) => filter.add_directive(directive),
        Err(_) => filter,
    };

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_defaults() {
        let args =
            Args::try_parse_from(["windrelay-server", "--jwt-secret", "s"])
                .unwrap();
        assert_eq!(args.addr, "0.0.0.0:8080");
        assert_eq!(args.cell_size, 256.0);
        assert_eq!(args.world_seed, 12345);
        assert!(args.jwt_audience.is_none());
        assert!(!args.reject_duplicates);
        assert!(!args.log_json);
    }

    #[test]
    fn test_args_overrides() {
        let args = Args::try_parse_from([
            "windrelay-server",
            "--jwt-secret",
            "s",
            "--addr",
            "127.0.0.1:9000",
            "--cell-size",
            "512",
            "--jwt-audience",
            "authenticated",
            "--reject-duplicates",
        ])
        .unwrap();
        assert_eq!(args.addr, "127.0.0.1:9000");
        assert_eq!(args.cell_size, 512.0);
        assert_eq!(args.jwt_audience.as_deref(), Some("authenticated"));
        assert!(args.reject_duplicates);
    }
}
