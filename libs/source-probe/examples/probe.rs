use std::env;

use source_probe::{ProbeConfig, SourceProbe, SourceProber};
use tokio_util::sync::CancellationToken;

/// Probes one playlist URL and prints the resulting stats.
///
/// Usage: probe <m3u8-url> [proxy-base]
#[tokio::main]
async fn main() {
    env_logger::init();

    let mut args = env::args().skip(1);
    let url = match args.next() {
        Some(url) => url,
        None => {
            eprintln!("usage: probe <m3u8-url> [proxy-base]");
            std::process::exit(2);
        }
    };

    let config = ProbeConfig {
        proxy_base: args.next(),
        ..ProbeConfig::default()
    };
    let prober = SourceProber::new(config);
    let token = CancellationToken::new();

    let stats = prober.probe(&url, None, &token).await;
    println!("quality:    {}", stats.quality);
    println!("load speed: {}", stats.load_speed);
    println!("ping:       {} ms", stats.ping_time_ms);
    println!("error:      {}", stats.has_error);
}
