use std::error::Error;
use std::io;

use arm_msi::authenticator::HttpAuthenticator;
use arm_msi::commands::retrieve_token::RetrieveTokenCommand;
use arm_msi::commands::run_lifecycle::RunLifecycleCommand;
use arm_msi::config::{IdentityEndpoint, LifecycleConfig, environment_from_env};
use arm_msi::http::client::HttpClient;
use arm_msi::lifecycle::{AutoConfirm, LineConfirmation};
use arm_msi::parameters::{Commands, OutPutTokenFormat};
use arm_msi::resource::key_vault::VaultOptions;
use clap::Parser;
use tracing::{Level, debug};

#[derive(Parser, Debug)]
#[command(name = "arm-msi-cli")]
struct Cli {
    /// Verbosity of the diagnostics written to stderr
    #[arg(long, global = true, default_value = "info")]
    log_level: Level,

    #[command(subcommand)]
    command: Commands,
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli_command = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(cli_command.log_level)
        .with_writer(io::stderr)
        .init();

    // Values already present in the process environment win over the file.
    match dotenvy::dotenv() {
        Ok(path) => debug!(path = %path.display(), "environment loaded from file"),
        Err(e) if e.not_found() => debug!("no .env file found"),
        Err(e) => return Err(format!("error loading .env file: {}", e).into()),
    }

    match cli_command.command {
        Commands::RunLifecycle {
            identity,
            vault_name,
            location,
            yes,
        } => {
            let mut config = LifecycleConfig::try_from_env()?.with_selector(identity.selector());
            if let Some(endpoint) = identity.endpoint_override() {
                config = config.with_endpoint(endpoint);
            }
            if let Some(environment) = identity.environment()? {
                config = config.with_environment(environment);
            }

            let http_client = HttpClient::new(identity.http_config()?)
                .map_err(|e| format!("error creating http client: {}", e))?;
            let command = RunLifecycleCommand::new(http_client);
            let vault = VaultOptions {
                name: vault_name,
                location,
            };

            let mut stdout = io::stdout().lock();
            if yes {
                command.run(&config, &vault, AutoConfirm, &mut stdout)?;
            } else {
                command.run(&config, &vault, LineConfirmation::stdin(), &mut stdout)?;
            }
            Ok(())
        }
        Commands::RetrieveToken {
            identity,
            output_token_format,
        } => {
            let endpoint = match identity.endpoint_override() {
                Some(endpoint) => endpoint,
                None => IdentityEndpoint::try_from_env()?,
            };
            let environment = match identity.environment()? {
                Some(environment) => environment,
                None => environment_from_env()?,
            };

            let http_client = HttpClient::new(identity.http_config()?)
                .map_err(|e| format!("error creating http client: {}", e))?;
            let http_authenticator = HttpAuthenticator::new(http_client, endpoint);
            let retrieve_token_command = RetrieveTokenCommand::new(http_authenticator);
            let token = retrieve_token_command
                .retrieve_token(environment.token_audience(), identity.selector())?;
            match output_token_format {
                OutPutTokenFormat::Plain => {
                    println!("{}", token.access_token());
                }
                OutPutTokenFormat::Json => {
                    let output = serde_json::to_string_pretty(&token)?;
                    println!("{}", output);
                }
            }
            Ok(())
        }
    }
}
