use anyhow::{Context, Result};
use clap::Parser;
use labs_portal::{
    constants, openai::OpenAiBackend, web_server, CompletionDriver, RequestConfig,
};
use std::{net::IpAddr, net::SocketAddr, sync::Arc};
use tracing::{error, info};

mod chat;

// Define the command-line interface structure using clap
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Start the portal web server.
    Start {
        #[arg(long, default_value_t = constants::DEFAULT_PORT, help = "Port for the web server.")]
        port: u16,
        #[arg(long, default_value = "0.0.0.0", help = "Address to bind the web server to.")]
        bind: IpAddr,
        #[command(flatten)]
        backend: BackendArgs,
        #[arg(long, env = "PORTAL_TEMPLATES_DIR", default_value_t = constants::TEMPLATES_DIR.clone(), help = "Directory holding index.html.")]
        templates_dir: String,
        #[arg(long, env = "PORTAL_STATIC_DIR", default_value_t = constants::STATIC_DIR.clone(), help = "Directory served under /static.")]
        static_dir: String,
    },
    /// Chat with the assistant from the terminal.
    Chat {
        #[command(flatten)]
        backend: BackendArgs,
        #[arg(long, default_value = constants::DEFAULT_MODEL, help = "Model display name.")]
        model: String,
        #[arg(long, default_value_t = constants::DEFAULT_TEMPERATURE, help = "Sampling temperature (0.0-2.0).")]
        temperature: f32,
        #[arg(long, default_value = constants::DEFAULT_SYSTEM_PROMPT, help = "System prompt sent with every request.")]
        system_prompt: String,
    },
}

#[derive(clap::Args, Debug)]
struct BackendArgs {
    #[arg(long, env = "PORTAL_API_BASE", default_value_t = constants::API_BASE.clone(), help = "Base URL of the completion API.")]
    api_base: String,
}

impl BackendArgs {
    fn driver(&self) -> CompletionDriver {
        CompletionDriver::new(Arc::new(OpenAiBackend::new(self.api_base.clone())))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Deployment settings only; the API key is always entered interactively.
    dotenvy::dotenv().ok();

    // Reads log level from RUST_LOG (e.g. RUST_LOG=info,labs_portal=debug)
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    info!("Portal starting with command: {:?}", cli.command);

    match cli.command {
        Commands::Start {
            port,
            bind,
            backend,
            templates_dir,
            static_dir,
        } => {
            let settings = web_server::ServerSettings {
                addr: SocketAddr::new(bind, port),
                templates_dir,
                static_dir,
            };
            info!("Starting portal on {} (completion API {})", settings.addr, backend.api_base);

            let mut web_server_handle = tokio::spawn(web_server::start_web_server(settings, backend.driver()));

            let ctrl_c = tokio::signal::ctrl_c();
            tokio::pin!(ctrl_c);

            tokio::select! {
                _ = &mut ctrl_c => {
                    info!("Ctrl-C received, initiating shutdown...");
                }
                res = &mut web_server_handle => {
                    match res {
                        Ok(Ok(())) => info!("Web server task completed unexpectedly."),
                        Ok(Err(e)) => error!("Web server failed: {:?}", e),
                        Err(e) if e.is_panic() => error!("Web server task panicked: {:?}", e),
                        Err(e) => error!("Web server task failed: {:?}", e),
                    }
                }
            }

            if !web_server_handle.is_finished() {
                info!("Aborting web server task...");
                web_server_handle.abort();
            }
            info!("Shutdown complete.");
        }
        Commands::Chat {
            backend,
            model,
            temperature,
            system_prompt,
        } => {
            let config = RequestConfig::new(model, temperature, system_prompt)
                .context("Invalid chat settings")?;
            info!("Starting interactive chat session...");
            chat::run_terminal_chat(backend.driver(), config)
                .await
                .context("Chat session failed")?;
            info!("Chat session finished.");
        }
    }

    Ok(())
}
