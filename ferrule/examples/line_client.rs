//! Example: sends lines to a server and prints the replies.
//!
//! ```text
//! cargo run --example line_client -- 127.0.0.1 7000 hello world
//! ```
//!
//! Set `FERRULE_TLS=1` to upgrade the connection with the system trust
//! roots before sending.

use ferrule::net;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[ferrule::main]
async fn main() -> ferrule::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "line_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut args = std::env::args().skip(1).collect::<Vec<_>>().into_iter();
    let host = args.next().unwrap_or_else(|| "127.0.0.1".into());
    let port = args
        .next()
        .and_then(|p| p.parse().ok())
        .unwrap_or(7000);

    let stream = if std::env::var_os("FERRULE_TLS").is_some() {
        net::connect_tcp_tls(&host, port, None).await?
    } else {
        net::connect_tcp(&host, port).await?
    };

    tracing::info!(peer = %stream.peer_addr()?, tls = stream.is_tls(), "connected");

    for word in args {
        stream.send_all(format!("{word}\n").as_bytes()).await?;

        let reply = stream.receive_until(b"\n", 64 * 1024).await?;
        println!("{}", String::from_utf8_lossy(&reply));
    }

    stream.close().await;

    Ok(())
}
