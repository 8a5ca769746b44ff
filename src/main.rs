use std::process::ExitCode;

use mysql_sniff::capture::{FlowSource, PcapFlowSource, QUEUE_CAPACITY};
use mysql_sniff::dispatcher::{Dispatcher, StdoutSink};
use mysql_sniff::pairer::Pairer;
use mysql_sniff::Opts;

#[tokio::main]
async fn main() -> ExitCode {
    color_eyre::install().expect("failed to install error report handler");
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let opts = Opts::parse_args();
    tracing::info!(interface = %opts.interface, port = opts.port, "starting capture");

    let (announce_tx, mut announce_rx) = tokio::sync::mpsc::channel(QUEUE_CAPACITY);

    let source = PcapFlowSource {
        interface: opts.interface.clone(),
        port: opts.port,
    };
    let capture_task = tokio::task::spawn_blocking(move || source.run(announce_tx));

    let server_port = opts.port;
    let pairer_task = tokio::spawn(async move {
        let mut pairer = Pairer::new();
        while let Some(half) = announce_rx.recv().await {
            if let Some(pair) = pairer.register(half, server_port) {
                tokio::spawn(Dispatcher::new(StdoutSink).run(pair.client, pair.server));
            }
        }
    });

    let capture_result = capture_task.await;
    pairer_task.abort();

    match capture_result {
        Ok(Ok(())) => ExitCode::SUCCESS,
        Ok(Err(err)) => {
            tracing::error!(%err, "capture failed");
            ExitCode::FAILURE
        }
        Err(join_err) => {
            tracing::error!(%join_err, "capture task panicked");
            ExitCode::FAILURE
        }
    }
}
