//! Example: line echo server, optionally over TLS.
//!
//! ```text
//! cargo run --example echo_server -- 127.0.0.1:7000
//! cargo run --example echo_server -- 127.0.0.1:7443 cert.pem key.pem
//! ```

use ferrule::net::{self, Address, ByteStream, ListenOptions, TlsContext};
use ferrule::{Error, task};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[ferrule::main]
async fn main() -> ferrule::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "echo_server=info,ferrule=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut args = std::env::args().skip(1).collect::<Vec<_>>().into_iter();
    let address: Address = args.next().as_deref().unwrap_or("127.0.0.1:7000").parse()?;

    let listener = match (args.next(), args.next()) {
        (Some(cert), Some(key)) => {
            let context = TlsContext::server_from_pem(cert, key)?;
            net::listen_tcp_tls(address, context, ListenOptions::new()).await?
        }
        _ => net::listen_tcp(address, ListenOptions::new()).await?,
    };

    tracing::info!(address = %listener.address()?, "echo server listening");

    let mut incoming = listener.accept_connections();

    while let Some(stream) = incoming.next().await {
        match stream {
            Ok(stream) => {
                task::spawn(handle_client(stream));
            }
            Err(err) => tracing::warn!(error = %err, "accept failed"),
        }
    }

    Ok(())
}

// Echoes every line back until the client leaves.
async fn handle_client(stream: ByteStream) {
    let peer = stream.peer_addr().map(|a| a.to_string()).unwrap_or_default();
    let mut lines = stream.receive_delimited_chunks(b"\n", 64 * 1024);

    while let Some(line) = lines.next().await {
        let mut line = match line {
            Ok(line) => line,
            Err(Error::IncompleteRead(rest)) => rest,
            Err(err) => {
                tracing::warn!(%peer, error = %err, "read failed");
                break;
            }
        };

        line.push(b'\n');

        if let Err(err) = stream.send_all(&line).await {
            tracing::warn!(%peer, error = %err, "write failed");
            break;
        }
    }

    tracing::info!(%peer, "client disconnected");
    stream.close().await;
}
