use anyhow::Context;
use radio_resolver_rs::{app_state::AppState, config::Config, http, logging::init_logger};
use serde_json::json;
use std::env;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let logger = init_logger("radio-resolver-rs");

    let config = Config::load().context("failed to load configuration")?;
    let args: Vec<String> = env::args().skip(1).collect();

    if matches!(args.first().map(String::as_str), Some("check-config")) {
        logger.info(
            "config.check_passed",
            serde_json::to_value(&config).unwrap_or_else(|_| json!({ "status": "ok" })),
        );
        return Ok(());
    }

    let state = AppState::initialize(config.clone(), logger.clone())
        .context("failed to initialize application state")?;

    match args.first().map(String::as_str) {
        Some("resolve") => {
            let country = args[1..].join(" ");
            if country.trim().is_empty() {
                anyhow::bail!("usage: radio-resolver-rs resolve <country>");
            }
            let stations = state.resolver.resolve(&country).await;
            println!("{}", serde_json::to_string_pretty(&stations)?);
            Ok(())
        }
        Some("countries") => {
            let countries = state.resolver.list_countries().await;
            println!("{}", serde_json::to_string_pretty(&countries)?);
            Ok(())
        }
        Some(other) => anyhow::bail!("unknown command `{other}`"),
        None => {
            logger.info(
                "server.initialized",
                json!({
                    "port": config.port,
                    "store": state.resolver.store().backend_name(),
                }),
            );
            http::serve(state).await.context("http server failed")
        }
    }
}
