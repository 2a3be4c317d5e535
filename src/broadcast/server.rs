//! Viewer WebSocket endpoint.

use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::protocol::Message;

use crate::engine::AlertEngine;
use crate::error::Result;

/// Accept viewers forever. Each connection runs on its own task.
pub async fn serve(listener: TcpListener, engine: Arc<AlertEngine>) -> Result<()> {
    info!("Viewer WebSocket listening on {}", listener.local_addr()?);
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!("Failed to accept viewer connection: {}", e);
                continue;
            }
        };
        let engine = engine.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_viewer(stream, peer, engine).await {
                debug!("Viewer {} connection ended with error: {}", peer, e);
            }
        });
    }
}

async fn handle_viewer(stream: TcpStream, peer: SocketAddr, engine: Arc<AlertEngine>) -> Result<()> {
    let ws = accept_async(stream).await?;
    info!("Viewer connected from {}", peer);

    let (mut ws_sender, mut ws_receiver) = ws.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let viewer_id = engine.subscribe(tx).await;

    let result: Result<()> = loop {
        tokio::select! {
            outgoing = rx.recv() => match outgoing {
                Some(json) => {
                    if let Err(e) = ws_sender.send(Message::Text(json)).await {
                        break Err(e.into());
                    }
                }
                // Hub dropped us.
                None => break Ok(()),
            },
            incoming = ws_receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => break Ok(()),
                Some(Ok(_)) => {}
                Some(Err(e)) => break Err(e.into()),
            },
        }
    };

    engine.unsubscribe(viewer_id).await;
    match &result {
        Ok(()) => info!("Viewer {} disconnected", peer),
        Err(e) => error!("Viewer {} dropped: {}", peer, e),
    }
    result
}
