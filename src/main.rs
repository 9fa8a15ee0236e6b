use clap::{CommandFactory, Parser};
use clap_complete::aot::generate;
use previewrig::cli::{Cli, Commands};
use previewrig::commands;
use previewrig::PreviewError;

#[tokio::main]
async fn main() {
    // Initialize tracing subscriber with env-filter support.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_file = cli.global.config_file.as_deref();

    let result = match cli.command {
        Commands::Start { preview, user, env } => {
            commands::preview::run_start(config_file, &preview.project, &preview.session, user, env)
                .await
        }
        Commands::Status { preview, json } => {
            commands::preview::run_status(config_file, &preview.project, &preview.session, json)
                .await
        }
        Commands::Stop { preview } => {
            commands::preview::run_stop(config_file, &preview.project, &preview.session).await
        }
        Commands::Destroy { preview } => {
            commands::preview::run_destroy(config_file, &preview.project, &preview.session).await
        }
        Commands::Urls { project, json } => commands::urls::run(config_file, &project, json).await,
        Commands::Cleanup { threshold, watch } => {
            commands::cleanup::run(config_file, threshold, watch).await
        }
        Commands::Validate { manifest } => commands::validate::run(config_file, manifest).await,
        Commands::Doctor => commands::doctor::run(config_file).await,
        Commands::Completions { shell } => {
            generate(shell, &mut Cli::command(), "previewrig", &mut std::io::stdout());
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        // Bad input exits 2, infrastructure trouble exits 1.
        let client_error = e
            .downcast_ref::<PreviewError>()
            .is_some_and(PreviewError::is_client_error);
        std::process::exit(if client_error { 2 } else { 1 });
    }
}
