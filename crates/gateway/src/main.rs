use std::process::ExitCode;

use anyhow::{Context, Result};
use log::{error, info};

use pigateway::{Gateway, GatewayConfig, GatewayError, MqttBroker};
use pigateway_radio::UdpRadio;

const USAGE: &str = "Use:\n Simply use it without args :D\n";

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    if let Err(usage) = check_args(std::env::args_os()) {
        eprint!("{}", usage);
        return ExitCode::from(1);
    }

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{:#}", err);
            let code = err
                .downcast_ref::<GatewayError>()
                .map(GatewayError::exit_code)
                .unwrap_or(1);
            ExitCode::from(code)
        }
    }
}

/// The gateway takes no arguments; anything after the program name gets the
/// usage text back.
fn check_args<I: IntoIterator>(args: I) -> Result<(), &'static str> {
    match args.into_iter().nth(1) {
        Some(_) => Err(USAGE),
        None => Ok(()),
    }
}

async fn run() -> Result<()> {
    let config = GatewayConfig::load().context("loading configuration")?;
    log::debug!("Configuration: {:?}", config);

    let broker = MqttBroker::connect(&config.broker)
        .await
        .map_err(GatewayError::from)
        .context("connect() failure")?;

    let radio = UdpRadio::bind(config.radio.clone())
        .map_err(GatewayError::from)
        .context("radio init failure")?;

    let mut gateway = Gateway::new(radio, broker, &config);
    gateway.subscribe_commands(&config.command_topics)?;

    info!("Gateway running");
    gateway.run().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_arguments_required() {
        assert!(check_args(["pigateway"]).is_ok());
        assert!(check_args(Vec::<String>::new()).is_ok());
        assert_eq!(check_args(["pigateway", "--help"]), Err(USAGE));
        assert_eq!(check_args(["pigateway", "a", "b"]), Err(USAGE));
    }
}
