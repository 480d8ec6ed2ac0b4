//! Service run loop: picks the stream, runs the lifecycle and maps the outcome to an exit code

use bar_stream::{exit_code, BarStream, LifecycleController, MockBarStream, WsBarStream};
use tracing::{error, info};

use crate::config::ServiceConfig;

/// Run the bar stream until shutdown and return the process exit code
pub async fn run_service(config: ServiceConfig) -> u8 {
    let controller = LifecycleController::new(config.lifecycle.clone());
    let interrupt = controller.listen_for_interrupt();

    let code = if config.service.mock {
        info!(
            "Using synthetic feed for {:?} every {:?}",
            config.stream.symbols,
            config.service.mock_interval()
        );
        let stream =
            MockBarStream::synthetic(config.stream.symbols.clone(), config.service.mock_interval());
        run_stream(&controller, stream).await
    } else {
        info!("Using {} feed for {:?}", config.stream.feed, config.stream.symbols);
        run_stream(&controller, WsBarStream::new(config.stream.clone())).await
    };

    // The scope is cancelled by now, so the listener is already on its way out.
    let _ = interrupt.await;
    code
}

async fn run_stream<S: BarStream>(controller: &LifecycleController, stream: S) -> u8 {
    info!("Bar stream is starting. Press Ctrl+C to stop.");

    let result = controller.run(stream).await;
    match &result {
        Ok(report) => {
            info!(
                "Shutdown complete: {:?}, {} bars received",
                report.reason, report.bars_received
            );
        }
        Err(e) => {
            error!("{}", e);
            eprintln!("Program exited with error '{}'", e.cause());
        }
    }

    exit_code(&result)
}
