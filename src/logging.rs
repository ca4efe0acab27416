use tracing::Level;
use tracing_subscriber::FmtSubscriber;

pub(crate) fn max_level(verbose: bool) -> Level {
    if verbose { Level::DEBUG } else { Level::INFO }
}

/// Install the global fmt subscriber. Log lines go to stderr so command
/// output on stdout stays machine-readable.
pub(crate) fn init(verbose: bool) {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(max_level(verbose))
        .with_writer(std::io::stderr)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok(); // Already set in tests
}
