use clap::Parser;
use homestead_daemon::cli::Cli;
use homestead_daemon::daemon::DaemonBuilder;
use log::error;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match DaemonBuilder::build(cli).await {
        Ok(daemon) => daemon.run().await,
        Err(err) => {
            error!("{err:#}");
            Err(err)
        }
    }
}
