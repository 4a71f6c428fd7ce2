// Copyright (c) MySocial Team
// SPDX-License-Identifier: Apache-2.0

//! WebSocket fan-out of the event bus. Clients pick channels with
//! `?channels=messages,detections,backfill` (default: messages).

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

use crate::bus::DomainEvent;
use crate::engine::Engine;

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    pub channels: Option<String>,
}

pub async fn stream(
    ws: WebSocketUpgrade,
    State(engine): State<Arc<Engine>>,
    Query(query): Query<StreamQuery>,
) -> impl IntoResponse {
    let channels: Vec<String> = query
        .channels
        .unwrap_or_else(|| "messages".to_string())
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    ws.on_upgrade(move |socket| handle_socket(socket, engine, channels))
}

async fn handle_socket(socket: WebSocket, engine: Arc<Engine>, channels: Vec<String>) {
    let (mut sink, mut source) = socket.split();

    // One pump task per subscribed channel feeding a single outbound queue.
    let (tx, mut rx) = mpsc::channel::<DomainEvent>(256);
    let mut pumps = Vec::new();
    for channel in channels {
        let mut stream = engine.bus.subscribe(&channel).await;
        let tx = tx.clone();
        pumps.push(tokio::spawn(async move {
            while let Some(event) = stream.recv().await {
                if tx.send(event).await.is_err() {
                    break;
                }
            }
        }));
    }
    drop(tx);

    let forward = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let payload = event.to_json().to_string();
            if sink.send(Message::Text(payload)).await.is_err() {
                break;
            }
        }
    });

    // Drain the client side until it goes away.
    while let Some(incoming) = source.next().await {
        match incoming {
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(error = %e, "WebSocket receive error");
                break;
            }
        }
    }

    forward.abort();
    for pump in pumps {
        pump.abort();
    }
}
