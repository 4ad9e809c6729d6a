use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "xpanel", version, about = "Subscription links and engine config for an Xray panel")]
struct Cli {
    /// Path to config file
    #[arg(short = 'c', long = "config", default_value = "config.yaml")]
    config: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the subscription for a subscription id
    Sub {
        sub_id: String,
        /// Address clients should connect to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        /// Print the links as one base64 blob
        #[arg(long, default_value_t = false)]
        base64: bool,
    },
    /// Print the synthesized engine config
    Config,
    /// Run the engine supervisor until Ctrl-C
    Run,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = xpanel::config::load_config(&cli.config)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log.level)),
        )
        .with_writer(std::io::stderr)
        .init();
    info!(path = %cli.config, "config loaded");

    let app = xpanel::app::App::new(config)?;
    match cli.command {
        Command::Sub {
            sub_id,
            host,
            base64,
        } => {
            let sub = app.subscriptions().get_subscription(&sub_id, &host).await?;
            println!("{}", sub.header);
            if base64 {
                println!("{}", sub.body_base64());
            } else {
                println!("{}", sub.body());
            }
        }
        Command::Config => {
            let config = app.engine_config().await?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Command::Run => app.run().await?,
    }

    Ok(())
}
